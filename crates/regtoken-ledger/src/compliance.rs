//! # Compliance Engine
//!
//! Stateless decision function for a proposed transfer. It reads the
//! issuer's linked registrars, the policy store and the holder book, and
//! returns either a [`Clearance`] describing both parties or the first
//! failing check.
//!
//! ## Decision Sequence
//!
//! Short-circuits on the first failure:
//!
//! 1. `amount > 0` (validation error, not a denial)
//! 2. sender balance covers `amount`
//! 3. sender verified by some linked registrar
//! 4. receiver verified by some linked registrar
//! 5. neither investor blocked by the issuer
//! 6. receiver country permitted and rating at least the minimum
//! 7. if the receiver's investor currently holds nothing: admission limits,
//!    counted as if a sender sending its whole holding had already left
//!
//! The issuer treasury skips 3 to 7 on its own side. The sender side is
//! never subject to country or limit checks: an investor can always divest.

use std::collections::BTreeSet;

use serde::Serialize;

use regtoken_core::{
    Address, DenialReason, InvestorId, IssuerId, RegtokenError, Timestamp, ValidationError,
};
use regtoken_kyc::{KycRegistrar, KycStatus};
use regtoken_policy::{Classification, PolicyStore};

/// Read access to the holder book, as needed by the decision.
pub trait Holdings {
    /// Investor an address was pinned to when it first held a balance.
    fn pinned_investor(&self, address: &Address) -> Option<&InvestorId>;

    /// Aggregate balance of an investor across every token and address of
    /// the issuer.
    fn investor_balance(&self, investor: &InvestorId) -> u64;
}

/// One side of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    /// The issuer treasury.
    Treasury,
    /// An investor-held account.
    Account(&'a Address),
}

/// A verified investor taking part in a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counterparty {
    /// The account address.
    pub address: Address,
    /// The investor the address belongs to.
    pub investor: InvestorId,
    /// Current KYC classification.
    pub class: Classification,
    /// Investor aggregate balance before the transfer.
    pub prior_balance: u64,
}

/// A cleared party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Party {
    /// The issuer treasury. Always eligible; never counted.
    Treasury,
    /// A verified investor.
    Investor(Counterparty),
}

impl Party {
    /// The investor, if this is not the treasury.
    pub fn investor(&self) -> Option<&Counterparty> {
        match self {
            Self::Treasury => None,
            Self::Investor(counterparty) => Some(counterparty),
        }
    }
}

/// Successful verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clearance {
    /// Sending side.
    pub sender: Party,
    /// Receiving side.
    pub receiver: Party,
    /// Whether the transfer takes the receiver's investor from zero to
    /// nonzero.
    pub admits_receiver: bool,
}

/// Resolve an address against registrars in link order.
///
/// The first registrar that verifies the address wins. If none does, the
/// most specific failure is reported (restricted, then expired, then
/// unregistered).
pub fn resolve_status(registrars: &[&KycRegistrar], address: &Address, now: Timestamp) -> KycStatus {
    let mut best = KycStatus::Unregistered;
    for registrar in registrars {
        let status = registrar.status(address, now);
        if status.is_verified() {
            return status;
        }
        if status.failure_rank() > best.failure_rank() {
            best = status;
        }
    }
    best
}

#[derive(Clone, Copy)]
enum Side {
    Sender,
    Receiver,
}

impl Side {
    fn denial(self, status: &KycStatus, address: &Address) -> DenialReason {
        let address = address.clone();
        match (self, status) {
            (Self::Sender, KycStatus::Restricted) => DenialReason::SenderRestricted(address),
            (Self::Sender, KycStatus::Expired) => DenialReason::SenderExpired(address),
            (Self::Sender, _) => DenialReason::SenderUnverified(address),
            (Self::Receiver, KycStatus::Restricted) => DenialReason::ReceiverRestricted(address),
            (Self::Receiver, KycStatus::Expired) => DenialReason::ReceiverExpired(address),
            (Self::Receiver, _) => DenialReason::ReceiverUnverified(address),
        }
    }
}

/// Inputs of one transfer decision.
pub struct TransferCheck<'a> {
    /// The issuer of the token.
    pub issuer: &'a IssuerId,
    /// Linked registrars, in link order.
    pub registrars: &'a [&'a KycRegistrar],
    /// Policy and counters.
    pub policy: &'a PolicyStore,
    /// Investors blocked by the issuer.
    pub blocked: &'a BTreeSet<InvestorId>,
    /// Holder book of the issuer.
    pub holdings: &'a dyn Holdings,
    /// Verification time.
    pub now: Timestamp,
}

impl TransferCheck<'_> {
    /// Decide a transfer of `amount` from `from` (holding `available`) to
    /// `to`.
    pub fn check_transfer(
        &self,
        from: Endpoint<'_>,
        to: Endpoint<'_>,
        amount: u64,
        available: u64,
    ) -> Result<Clearance, RegtokenError> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        if available < amount {
            return Err(DenialReason::InsufficientBalance {
                available,
                requested: amount,
            }
            .into());
        }

        let sender = self.party(from, Side::Sender)?;
        let receiver = self.party(to, Side::Receiver)?;

        if let Some(s) = sender.investor() {
            if self.blocked.contains(&s.investor) {
                return Err(DenialReason::SenderBlockedByIssuer(s.investor.clone()).into());
            }
        }

        let mut admits_receiver = false;
        if let Some(r) = receiver.investor() {
            if self.blocked.contains(&r.investor) {
                return Err(DenialReason::ReceiverBlockedByIssuer(r.investor.clone()).into());
            }
            self.policy.check_eligibility(self.issuer, r.class)?;
            if r.prior_balance == 0 {
                let vacating = sender
                    .investor()
                    .filter(|s| s.prior_balance == amount)
                    .map(|s| &s.investor);
                self.policy
                    .check_admission_vacating(self.issuer, r.class, vacating)?;
                admits_receiver = true;
            }
        }

        Ok(Clearance {
            sender,
            receiver,
            admits_receiver,
        })
    }

    fn party(&self, endpoint: Endpoint<'_>, side: Side) -> Result<Party, DenialReason> {
        let address = match endpoint {
            Endpoint::Treasury => return Ok(Party::Treasury),
            Endpoint::Account(address) => address,
        };
        match resolve_status(self.registrars, address, self.now) {
            KycStatus::Verified(record) => {
                let investor = self
                    .holdings
                    .pinned_investor(address)
                    .cloned()
                    .unwrap_or(record.investor_id);
                let prior_balance = self.holdings.investor_balance(&investor);
                Ok(Party::Investor(Counterparty {
                    address: address.clone(),
                    investor,
                    class: Classification {
                        country: record.country,
                        rating: record.rating,
                    },
                    prior_balance,
                }))
            }
            status => Err(side.denial(&status, address)),
        }
    }
}
