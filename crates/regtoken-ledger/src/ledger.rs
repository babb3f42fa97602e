//! # Ledger
//!
//! Owns every token and, per issuer, the holder book: which investor each
//! funded address is pinned to and the aggregate balance of each investor
//! across every token and address of the issuer.
//!
//! ## Address Pinning
//!
//! When an address first receives a balance it is pinned to the investor
//! it resolved to at that moment. The pin lasts until the address holds
//! nothing in any of the issuer's tokens. Counter transitions are computed
//! from pinned ids, so a registrar re-binding an address cannot strand a
//! counted holder.
//!
//! ## Two-Phase Postings
//!
//! [`Ledger::prepare`] computes every new balance and aggregate with
//! checked arithmetic and reports the aggregate changes. Nothing is
//! written. [`Ledger::commit`] then applies the prepared values and cannot
//! fail.

use std::collections::BTreeMap;

use regtoken_core::{Address, DuplicateError, InvestorId, IssuerId, NotFoundError, RegtokenError, TokenId};

use crate::compliance::Holdings;
use crate::token::Token;

type Result<T> = std::result::Result<T, RegtokenError>;

#[derive(Debug, Clone)]
struct Pin {
    investor: InvestorId,
    balance: u64,
}

/// Per-issuer holder book.
#[derive(Debug, Clone)]
pub struct HolderBook {
    pins: BTreeMap<Address, Pin>,
    investors: BTreeMap<InvestorId, u64>,
}

static EMPTY_BOOK: HolderBook = HolderBook::empty();

impl HolderBook {
    const fn empty() -> Self {
        Self {
            pins: BTreeMap::new(),
            investors: BTreeMap::new(),
        }
    }

    /// Investors with a nonzero aggregate balance.
    pub fn holders(&self) -> impl Iterator<Item = (&InvestorId, u64)> {
        self.investors.iter().map(|(id, balance)| (id, *balance))
    }
}

impl Holdings for HolderBook {
    fn pinned_investor(&self, address: &Address) -> Option<&InvestorId> {
        self.pins.get(address).map(|pin| &pin.investor)
    }

    fn investor_balance(&self, investor: &InvestorId) -> u64 {
        self.investors.get(investor).copied().unwrap_or(0)
    }
}

/// A balance move inside one token.
#[derive(Debug, Clone, Copy)]
pub struct Posting<'a> {
    /// Token.
    pub token: &'a TokenId,
    /// Account debited.
    pub debit: &'a Address,
    /// Account credited.
    pub credit: &'a Address,
    /// Amount moved.
    pub amount: u64,
    /// Investor owning the debited account; `None` for the treasury.
    pub debit_holder: Option<&'a InvestorId>,
    /// Investor owning the credited account; `None` for the treasury.
    pub credit_holder: Option<&'a InvestorId>,
}

/// Aggregate balance change of one investor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateChange {
    /// The investor.
    pub investor: InvestorId,
    /// Aggregate before the posting.
    pub before: u64,
    /// Aggregate after the posting.
    pub after: u64,
}

/// A validated posting, ready to commit.
#[derive(Debug, Clone)]
pub struct Prepared {
    token: TokenId,
    issuer: IssuerId,
    balances: Vec<(Address, u64)>,
    pins: Vec<(Address, Option<Pin>)>,
    aggregates: Vec<AggregateChange>,
    allowance: Option<(Address, Address, u64)>,
}

impl Prepared {
    /// Aggregate changes, one per investor involved.
    pub fn aggregates(&self) -> &[AggregateChange] {
        &self.aggregates
    }

    /// New token balance of `address` after commit.
    pub fn balance_after(&self, address: &Address) -> Option<u64> {
        self.balances
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, balance)| *balance)
    }

    /// Also set the `owner`/`spender` allowance on commit.
    pub fn with_allowance(mut self, owner: &Address, spender: &Address, remaining: u64) -> Self {
        self.allowance = Some((owner.clone(), spender.clone(), remaining));
        self
    }
}

/// Tokens and holder books.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    tokens: BTreeMap<TokenId, Token>,
    books: BTreeMap<IssuerId, HolderBook>,
}

impl Ledger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token.
    pub fn add_token(&mut self, token: Token) -> Result<()> {
        if self.tokens.contains_key(token.id()) {
            return Err(DuplicateError::Token(token.id().clone()).into());
        }
        self.tokens.insert(token.id().clone(), token);
        Ok(())
    }

    /// Look up a token.
    pub fn token(&self, id: &TokenId) -> Result<&Token> {
        self.tokens
            .get(id)
            .ok_or_else(|| NotFoundError::Token(id.clone()).into())
    }

    pub(crate) fn token_mut(&mut self, id: &TokenId) -> Result<&mut Token> {
        self.tokens
            .get_mut(id)
            .ok_or_else(|| NotFoundError::Token(id.clone()).into())
    }

    /// Whether a token exists.
    pub fn has_token(&self, id: &TokenId) -> bool {
        self.tokens.contains_key(id)
    }

    /// Tokens of an issuer, ordered by id.
    pub fn tokens_of<'a>(&'a self, issuer: &'a IssuerId) -> impl Iterator<Item = &'a Token> + 'a {
        self.tokens.values().filter(move |t| t.issuer() == issuer)
    }

    /// Holder book of an issuer. Empty if the issuer never moved a balance.
    pub fn book(&self, issuer: &IssuerId) -> &HolderBook {
        self.books.get(issuer).unwrap_or(&EMPTY_BOOK)
    }

    /// Aggregate balance of an investor across the issuer's tokens.
    pub fn investor_balance(&self, issuer: &IssuerId, investor: &InvestorId) -> u64 {
        self.book(issuer).investor_balance(investor)
    }

    /// Validate a posting and compute its effects without writing.
    pub fn prepare(&self, posting: Posting<'_>) -> Result<Prepared> {
        let token = self.token(posting.token)?;
        if posting.debit == posting.credit {
            return Err(RegtokenError::invariant(format!(
                "posting debits and credits the same account {}",
                posting.debit
            )));
        }
        let amount = posting.amount;
        let debit_balance = token
            .balance_of(posting.debit)
            .checked_sub(amount)
            .ok_or_else(|| RegtokenError::invariant(format!("balance of {} would underflow", posting.debit)))?;
        let credit_balance = token
            .balance_of(posting.credit)
            .checked_add(amount)
            .ok_or_else(|| RegtokenError::invariant(format!("balance of {} would overflow", posting.credit)))?;

        let book = self.book(token.issuer());
        let mut pins = Vec::with_capacity(2);
        if let Some(investor) = posting.debit_holder {
            let pin = book
                .pins
                .get(posting.debit)
                .filter(|pin| &pin.investor == investor)
                .ok_or_else(|| {
                    RegtokenError::invariant(format!("{} is not pinned to {investor}", posting.debit))
                })?;
            let balance = pin
                .balance
                .checked_sub(amount)
                .ok_or_else(|| RegtokenError::invariant(format!("holding of {} would underflow", posting.debit)))?;
            let next = (balance > 0).then(|| Pin {
                investor: investor.clone(),
                balance,
            });
            pins.push((posting.debit.clone(), next));
        }
        if let Some(investor) = posting.credit_holder {
            let current = match book.pins.get(posting.credit) {
                Some(pin) if &pin.investor != investor => {
                    return Err(RegtokenError::invariant(format!(
                        "{} is pinned to {}, not {investor}",
                        posting.credit, pin.investor
                    )));
                }
                Some(pin) => pin.balance,
                None => 0,
            };
            let balance = current
                .checked_add(amount)
                .ok_or_else(|| RegtokenError::invariant(format!("holding of {} would overflow", posting.credit)))?;
            pins.push((
                posting.credit.clone(),
                Some(Pin {
                    investor: investor.clone(),
                    balance,
                }),
            ));
        }

        let mut aggregates: Vec<AggregateChange> = Vec::with_capacity(2);
        for (investor, debit) in [(posting.debit_holder, true), (posting.credit_holder, false)] {
            let Some(investor) = investor else { continue };
            let index = match aggregates.iter().position(|c| &c.investor == investor) {
                Some(index) => index,
                None => {
                    let before = book.investor_balance(investor);
                    aggregates.push(AggregateChange {
                        investor: investor.clone(),
                        before,
                        after: before,
                    });
                    aggregates.len() - 1
                }
            };
            let change = &mut aggregates[index];
            let next = if debit {
                change.after.checked_sub(amount)
            } else {
                change.after.checked_add(amount)
            };
            change.after =
                next.ok_or_else(|| RegtokenError::invariant(format!("aggregate of {investor} out of range")))?;
        }

        Ok(Prepared {
            token: posting.token.clone(),
            issuer: token.issuer().clone(),
            balances: vec![
                (posting.debit.clone(), debit_balance),
                (posting.credit.clone(), credit_balance),
            ],
            pins,
            aggregates,
            allowance: None,
        })
    }

    /// Apply a prepared posting.
    pub fn commit(&mut self, prepared: Prepared) {
        if let Some(token) = self.tokens.get_mut(&prepared.token) {
            for (address, balance) in &prepared.balances {
                token.set_balance(address, *balance);
            }
            if let Some((owner, spender, remaining)) = &prepared.allowance {
                token.set_allowance(owner, spender, *remaining);
            }
        }
        let book = self
            .books
            .entry(prepared.issuer)
            .or_insert_with(HolderBook::empty);
        for (address, pin) in prepared.pins {
            match pin {
                Some(pin) => book.pins.insert(address, pin),
                None => book.pins.remove(&address),
            };
        }
        for change in prepared.aggregates {
            if change.after == 0 {
                book.investors.remove(&change.investor);
            } else {
                book.investors.insert(change.investor, change.after);
            }
        }
    }
}
