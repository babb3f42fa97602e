//! Token accounts: balances, allowances and supply of one token.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use regtoken_core::{Address, IssuerId, TokenId, ValidationError};

/// A fungible token issued by one issuer.
#[derive(Debug, Clone)]
pub struct Token {
    id: TokenId,
    issuer: IssuerId,
    name: String,
    symbol: String,
    total_supply: u64,
    authorized_supply: Option<u64>,
    locked: bool,
    balances: BTreeMap<Address, u64>,
    allowances: BTreeMap<(Address, Address), u64>,
}

/// Read model of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Token id.
    pub id: TokenId,
    /// Issuer.
    pub issuer: IssuerId,
    /// Display name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Sum of every balance.
    pub total_supply: u64,
    /// Minting ceiling; `None` means uncapped.
    pub authorized_supply: Option<u64>,
    /// Token-level lock.
    pub locked: bool,
}

impl Token {
    /// A new token with its whole initial supply held by `treasury`.
    pub fn new(
        id: TokenId,
        issuer: IssuerId,
        name: impl Into<String>,
        symbol: impl Into<String>,
        treasury: &Address,
        initial_supply: u64,
    ) -> Self {
        let mut balances = BTreeMap::new();
        if initial_supply > 0 {
            balances.insert(treasury.clone(), initial_supply);
        }
        Self {
            id,
            issuer,
            name: name.into(),
            symbol: symbol.into(),
            total_supply: initial_supply,
            authorized_supply: None,
            locked: false,
            balances,
            allowances: BTreeMap::new(),
        }
    }

    /// Token id.
    pub fn id(&self) -> &TokenId {
        &self.id
    }

    /// Issuer id.
    pub fn issuer(&self) -> &IssuerId {
        &self.issuer
    }

    /// Sum of every balance.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Minting ceiling.
    pub fn authorized_supply(&self) -> Option<u64> {
        self.authorized_supply
    }

    /// Whether the token-level lock is set.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Balance of an address.
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Remaining allowance granted by `owner` to `spender`.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Nonzero balances, ordered by address.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, u64)> {
        self.balances.iter().map(|(address, balance)| (address, *balance))
    }

    /// Read model.
    pub fn info(&self) -> TokenInfo {
        TokenInfo {
            id: self.id.clone(),
            issuer: self.issuer.clone(),
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            total_supply: self.total_supply,
            authorized_supply: self.authorized_supply,
            locked: self.locked,
        }
    }

    /// Validate a mint of `amount` against the supply ceiling and return the
    /// new total.
    pub fn check_mint(&self, amount: u64) -> Result<u64, ValidationError> {
        let exceeds = ValidationError::ExceedsAuthorizedSupply {
            total: self.total_supply,
            requested: amount,
            authorized: self.authorized_supply.unwrap_or(u64::MAX),
        };
        let total = self.total_supply.checked_add(amount).ok_or(exceeds.clone())?;
        match self.authorized_supply {
            Some(authorized) if total > authorized => Err(exceeds),
            _ => Ok(total),
        }
    }

    /// Validate a new supply ceiling.
    pub fn check_authorized_supply(&self, authorized: u64) -> Result<(), ValidationError> {
        if authorized < self.total_supply {
            return Err(ValidationError::AuthorizedBelowTotal {
                authorized,
                total: self.total_supply,
            });
        }
        Ok(())
    }

    pub(crate) fn set_authorized_supply(&mut self, authorized: u64) {
        self.authorized_supply = Some(authorized);
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub(crate) fn set_allowance(&mut self, owner: &Address, spender: &Address, amount: u64) {
        let key = (owner.clone(), spender.clone());
        if amount == 0 {
            self.allowances.remove(&key);
        } else {
            self.allowances.insert(key, amount);
        }
    }

    pub(crate) fn set_balance(&mut self, address: &Address, balance: u64) {
        if balance == 0 {
            self.balances.remove(address);
        } else {
            self.balances.insert(address.clone(), balance);
        }
    }

    pub(crate) fn set_total_supply(&mut self, total: u64) {
        self.total_supply = total;
    }
}
