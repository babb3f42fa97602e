//! Receipts returned by committed balance changes.

use serde::{Deserialize, Serialize};

use regtoken_core::{Address, TokenId};

/// A committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Token moved.
    pub token: TokenId,
    /// Account debited (the treasury for authority-initiated transfers).
    pub from: Address,
    /// Account credited (the treasury for transfers to authorities).
    pub to: Address,
    /// Amount moved.
    pub amount: u64,
    /// Debited account balance after the transfer.
    pub from_balance: u64,
    /// Credited account balance after the transfer.
    pub to_balance: u64,
    /// Issuer-wide investor count after the transfer.
    pub total_investors: u64,
}

/// A committed mint or burn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyReceipt {
    /// Token.
    pub token: TokenId,
    /// Module that made the call.
    pub module: Address,
    /// Amount minted or burned.
    pub amount: u64,
    /// Total supply afterwards.
    pub total_supply: u64,
    /// Treasury balance afterwards.
    pub treasury_balance: u64,
}
