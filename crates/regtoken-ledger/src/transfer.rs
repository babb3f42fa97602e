//! # Balance Operations
//!
//! `transfer`, `transfer_from`, `approve`, `mint` and `burn`.
//!
//! ## Endpoint Resolution
//!
//! Issuer authorities never hold balances. A transfer sent by an active
//! authority address (permitted for [`IssuerAction::Transfer`]) debits the
//! treasury; a transfer addressed to an authority address or to the
//! treasury credits the treasury. The treasury itself has no key and
//! cannot send directly.
//!
//! ## Counter Upkeep
//!
//! The ledger reports the aggregate balance change of every investor
//! involved. Each change maps to at most one counter transition:
//!
//! ```text
//! before > 0, after = 0   ─▶ Divest
//! before = 0, after > 0   ─▶ Admit (classification from the clearance)
//! both > 0, class changed ─▶ Reclassify (limits of the new bucket apply)
//! ```
//!
//! The batch is applied all-or-nothing before balances are committed.
//! Registrar updates made through the engine wrappers reclassify holders
//! at once; the transfer-time move catches records changed through
//! `registrar_mut` or resolved by a different registrar.
//!
//! ## Locks
//!
//! A token lock or the issuer's global lock stops transfers sent from
//! investor accounts and module supply changes. Transfers out of the
//! treasury are unaffected.

use regtoken_core::{
    Address, AuthorizationError, Clock, DenialReason, InvestorId, IssuerId, RegtokenError, TokenId,
    ValidationError,
};
use regtoken_policy::{CounterTransition, PolicyStore};

use crate::compliance::{Clearance, Endpoint, Holdings, TransferCheck};
use crate::engine::{Engine, Result};
use crate::issuer::{Issuer, IssuerAction};
use crate::ledger::{AggregateChange, Posting};
use crate::receipt::{SupplyReceipt, TransferReceipt};

/// Allowance consumed by a `transfer_from`.
struct Spend<'a> {
    owner: &'a Address,
    spender: &'a Address,
    remaining: u64,
}

/// Log recoverable failures at debug. Invariant violations were already
/// logged at error when raised.
fn observe<T>(operation: &'static str, token: &TokenId, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        if err.is_recoverable() {
            tracing::debug!(operation, token = %token, error = %err, "operation rejected");
        }
    }
    result
}

/// Counter transitions implied by a posting's aggregate changes.
fn counter_batch(
    policy: &PolicyStore,
    issuer: &IssuerId,
    clearance: &Clearance,
    aggregates: &[AggregateChange],
) -> Result<Vec<CounterTransition>> {
    let mut batch = Vec::with_capacity(aggregates.len());
    for change in aggregates {
        let class = [&clearance.sender, &clearance.receiver]
            .into_iter()
            .filter_map(|party| party.investor())
            .find(|party| party.investor == change.investor)
            .map(|party| party.class)
            .ok_or_else(|| {
                RegtokenError::invariant(format!("posting touched {} outside the clearance", change.investor))
            })?;
        let investor = change.investor.clone();
        match (change.before > 0, change.after > 0) {
            (true, false) => batch.push(CounterTransition::Divest { investor }),
            (false, true) => batch.push(CounterTransition::Admit { investor, class }),
            (true, true) if policy.classification(issuer, &investor) != Some(class) => {
                policy.check_reclassification(issuer, &investor, class)?;
                batch.push(CounterTransition::Reclassify { investor, class });
            }
            _ => {}
        }
    }
    Ok(batch)
}

fn check_unlocked(issuer: &Issuer, token: &TokenId, locked: bool) -> Result<()> {
    if locked || issuer.is_globally_locked() {
        return Err(DenialReason::TokenLocked(token.clone()).into());
    }
    Ok(())
}

impl<C: Clock> Engine<C> {
    /// Where a transfer addressed to `to` lands.
    fn destination<'a>(issuer: &Issuer, to: &'a Address) -> Endpoint<'a> {
        if to == issuer.treasury() || issuer.is_authority_address(to) {
            Endpoint::Treasury
        } else {
            Endpoint::Account(to)
        }
    }

    fn check_distinct(issuer: &Issuer, from: Endpoint<'_>, to: Endpoint<'_>) -> Result<()> {
        match (from, to) {
            (Endpoint::Treasury, Endpoint::Treasury) => {
                Err(ValidationError::SelfTransfer(issuer.treasury().clone()).into())
            }
            (Endpoint::Account(a), Endpoint::Account(b)) if a == b => Err(ValidationError::SelfTransfer(a.clone()).into()),
            _ => Ok(()),
        }
    }

    /// Investor an address belongs to: its pin if funded, otherwise the
    /// first linked registrar that knows it.
    fn investor_of(&self, issuer: &Issuer, address: &Address) -> Option<InvestorId> {
        if let Some(pinned) = self.ledger.book(issuer.id()).pinned_investor(address) {
            return Some(pinned.clone());
        }
        self.linked_registrars(issuer)
            .into_iter()
            .find_map(|registrar| registrar.investor_id(address).cloned())
    }

    /// Move `amount` of `token` from `caller` to `to`.
    pub fn transfer(&mut self, caller: &Address, token: &TokenId, to: &Address, amount: u64) -> Result<TransferReceipt> {
        let result = self.try_transfer(caller, token, to, amount);
        observe("transfer", token, result)
    }

    fn try_transfer(&mut self, caller: &Address, token_id: &TokenId, to: &Address, amount: u64) -> Result<TransferReceipt> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let now = self.now();
        let token = self.ledger.token(token_id)?;
        let issuer = self.issuer(token.issuer())?;

        if caller == issuer.treasury() {
            return Err(AuthorizationError::UnknownCaller(caller.clone()).into());
        }
        let from = if issuer.is_authority_address(caller) {
            issuer.authorize(caller, now, IssuerAction::Transfer)?;
            Endpoint::Treasury
        } else {
            Endpoint::Account(caller)
        };
        let dest = Self::destination(issuer, to);
        Self::check_distinct(issuer, from, dest)?;
        if matches!(from, Endpoint::Account(_)) {
            check_unlocked(issuer, token_id, token.is_locked())?;
        }

        self.execute(token_id, from, dest, amount, None)
    }

    /// Move `amount` of `token` from `owner` to `to` on behalf of `caller`.
    ///
    /// An issuer authority address needs [`IssuerAction::TransferFrom`] and
    /// no allowance. Another address of the owner's own investor needs no
    /// allowance either. Anyone else must hold an allowance covering
    /// `amount`, decremented on commit. Funds of the treasury or of an
    /// authority address can only be moved by a permitted authority.
    pub fn transfer_from(
        &mut self,
        caller: &Address,
        token: &TokenId,
        owner: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<TransferReceipt> {
        let result = self.try_transfer_from(caller, token, owner, to, amount);
        observe("transfer_from", token, result)
    }

    fn try_transfer_from(
        &mut self,
        spender: &Address,
        token_id: &TokenId,
        owner: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<TransferReceipt> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let now = self.now();
        let token = self.ledger.token(token_id)?;
        let issuer = self.issuer(token.issuer())?;

        let from = if owner == issuer.treasury() || issuer.is_authority_address(owner) {
            issuer.authorize(spender, now, IssuerAction::TransferFrom)?;
            Endpoint::Treasury
        } else {
            Endpoint::Account(owner)
        };
        let dest = Self::destination(issuer, to);
        Self::check_distinct(issuer, from, dest)?;
        if matches!(from, Endpoint::Account(_)) {
            check_unlocked(issuer, token_id, token.is_locked())?;
        }

        let spend = match from {
            Endpoint::Treasury => None,
            Endpoint::Account(owner) => {
                let privileged = issuer.is_authority_address(spender);
                if privileged {
                    issuer.authorize(spender, now, IssuerAction::TransferFrom)?;
                }
                let same_investor = || match (self.investor_of(issuer, owner), self.investor_of(issuer, spender)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                };
                if privileged || same_investor() {
                    None
                } else {
                    let available = token.allowance(owner, spender);
                    let remaining = available.checked_sub(amount).ok_or(DenialReason::InsufficientAllowance {
                        available,
                        requested: amount,
                    })?;
                    Some(remaining)
                }
            }
        };

        let spend = spend.map(|remaining| Spend {
            owner,
            spender,
            remaining,
        });
        self.execute(token_id, from, dest, amount, spend)
    }

    /// Clear, prepare and commit one posting.
    fn execute(
        &mut self,
        token_id: &TokenId,
        from: Endpoint<'_>,
        to: Endpoint<'_>,
        amount: u64,
        spend: Option<Spend<'_>>,
    ) -> Result<TransferReceipt> {
        let now = self.now();
        let (issuer_id, prepared, batch, debit, credit) = {
            let token = self.ledger.token(token_id)?;
            let issuer = self.issuer(token.issuer())?;
            let treasury = issuer.treasury();
            let debit = match from {
                Endpoint::Treasury => treasury,
                Endpoint::Account(address) => address,
            };
            let credit = match to {
                Endpoint::Treasury => treasury,
                Endpoint::Account(address) => address,
            };
            let registrars = self.linked_registrars(issuer);
            let check = TransferCheck {
                issuer: issuer.id(),
                registrars: &registrars,
                policy: &self.policy,
                blocked: issuer.blocked(),
                holdings: self.ledger.book(issuer.id()),
                now,
            };
            let clearance = check.check_transfer(from, to, amount, token.balance_of(debit))?;

            let mut prepared = self.ledger.prepare(Posting {
                token: token_id,
                debit,
                credit,
                amount,
                debit_holder: clearance.sender.investor().map(|party| &party.investor),
                credit_holder: clearance.receiver.investor().map(|party| &party.investor),
            })?;
            if let Some(spend) = &spend {
                prepared = prepared.with_allowance(spend.owner, spend.spender, spend.remaining);
            }
            let batch = counter_batch(&self.policy, issuer.id(), &clearance, prepared.aggregates())?;
            (issuer.id().clone(), prepared, batch, debit.clone(), credit.clone())
        };

        self.policy.apply(&issuer_id, &batch)?;
        let from_balance = prepared.balance_after(&debit).unwrap_or(0);
        let to_balance = prepared.balance_after(&credit).unwrap_or(0);
        self.ledger.commit(prepared);

        let receipt = TransferReceipt {
            token: token_id.clone(),
            from: debit,
            to: credit,
            amount,
            from_balance,
            to_balance,
            total_investors: self.policy.total_investors(&issuer_id),
        };
        tracing::info!(
            token = %receipt.token,
            from = %receipt.from,
            to = %receipt.to,
            amount,
            total_investors = receipt.total_investors,
            "transfer committed"
        );
        Ok(receipt)
    }

    /// Let `spender` move up to `amount` of `caller`'s balance. Zero
    /// revokes.
    pub fn approve(&mut self, caller: &Address, token: &TokenId, spender: &Address, amount: u64) -> Result<()> {
        if caller == spender {
            return Err(ValidationError::SelfTransfer(caller.clone()).into());
        }
        self.ledger.token_mut(token)?.set_allowance(caller, spender, amount);
        tracing::info!(token = %token, owner = %caller, spender = %spender, amount, "allowance approved");
        Ok(())
    }

    /// Mint `amount` into the treasury. Callable only by an attached module.
    pub fn mint(&mut self, module: &Address, token: &TokenId, amount: u64) -> Result<SupplyReceipt> {
        let result = self.try_supply(module, token, amount, true);
        observe("mint", token, result)
    }

    /// Burn `amount` from the treasury. Callable only by an attached module.
    pub fn burn(&mut self, module: &Address, token: &TokenId, amount: u64) -> Result<SupplyReceipt> {
        let result = self.try_supply(module, token, amount, false);
        observe("burn", token, result)
    }

    fn try_supply(&mut self, module: &Address, token_id: &TokenId, amount: u64, mint: bool) -> Result<SupplyReceipt> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let token = self.ledger.token(token_id)?;
        let issuer = self.issuer(token.issuer())?;
        self.modules.authorize(issuer.id(), module)?;
        check_unlocked(issuer, token_id, token.is_locked())?;

        let treasury = issuer.treasury().clone();
        let held = token.balance_of(&treasury);
        let (total, balance) = if mint {
            let total = token.check_mint(amount)?;
            let balance = held
                .checked_add(amount)
                .ok_or_else(|| RegtokenError::invariant(format!("treasury balance of {token_id} would overflow")))?;
            (total, balance)
        } else {
            let balance = held.checked_sub(amount).ok_or(DenialReason::InsufficientTreasuryBalance {
                available: held,
                requested: amount,
            })?;
            let total = token
                .total_supply()
                .checked_sub(amount)
                .ok_or_else(|| RegtokenError::invariant(format!("total supply of {token_id} would underflow")))?;
            (total, balance)
        };

        let token = self.ledger.token_mut(token_id)?;
        token.set_total_supply(total);
        token.set_balance(&treasury, balance);
        let operation = if mint { "mint" } else { "burn" };
        tracing::info!(token = %token_id, module = %module, amount, total_supply = total, operation, "supply changed");
        Ok(SupplyReceipt {
            token: token_id.clone(),
            module: module.clone(),
            amount,
            total_supply: total,
            treasury_balance: balance,
        })
    }
}
