//! # Investor Records
//!
//! Defines the stored [`InvestorRecord`], the [`InvestorProfile`] submitted
//! when creating or updating one, and the [`KycStatus`] an address resolves
//! to at a given instant.

use serde::{Deserialize, Serialize};

use regtoken_core::{AuthorityId, CountryCode, InvestorId, Rating, Timestamp};

/// Classification data submitted by a registrar authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorProfile {
    /// Jurisdiction.
    pub country: CountryCode,
    /// Eligibility tier.
    pub rating: Rating,
    /// The record is valid strictly before this instant.
    pub expiry: Timestamp,
}

/// A verified-investor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorRecord {
    /// Stable investor identifier.
    pub investor_id: InvestorId,
    /// Jurisdiction.
    pub country: CountryCode,
    /// Eligibility tier. Higher is more permissive.
    pub rating: Rating,
    /// The record is valid strictly before this instant.
    pub expiry: Timestamp,
    /// Explicit freeze, independent of expiry.
    pub restricted: bool,
    /// Authority responsible for this record.
    pub managed_by: AuthorityId,
}

impl InvestorRecord {
    /// Whether the record has expired at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expiry
    }
}

/// What a registrar says about an address at a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum KycStatus {
    /// Bound, current and unrestricted.
    Verified(InvestorRecord),
    /// Bound, but the record reached its expiry.
    Expired,
    /// Bound, but the record, the address binding, or the managing
    /// authority is restricted.
    Restricted,
    /// The address is not bound to any investor.
    Unregistered,
}

impl KycStatus {
    /// Whether the address is verified.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    /// The verified record, if any.
    pub fn record(&self) -> Option<&InvestorRecord> {
        match self {
            Self::Verified(record) => Some(record),
            _ => None,
        }
    }

    /// Ranking used when several registrars disagree about a failing
    /// address. Higher is more specific.
    pub fn failure_rank(&self) -> u8 {
        match self {
            Self::Verified(_) => 3,
            Self::Restricted => 2,
            Self::Expired => 1,
            Self::Unregistered => 0,
        }
    }
}
