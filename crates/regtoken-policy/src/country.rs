//! Country policy and issuer-wide limit types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use regtoken_core::{Rating, ValidationError};

/// Eligibility rules for one country of one issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryPolicy {
    /// A disallowed country behaves like a missing entry.
    pub permitted: bool,
    /// Minimum receiver rating.
    pub min_rating: Rating,
    /// Maximum distinct investors from this country with a nonzero
    /// aggregate balance. Enforced on admission only.
    ///
    /// Zero is a real limit, not "unlimited": a permitted country with a
    /// zero limit admits nobody new, though its existing holders may keep
    /// trading. Use a large value for an uncapped country.
    pub investor_limit: u64,
    /// Optional per-rating caps within this country.
    #[serde(default)]
    pub rating_limits: BTreeMap<Rating, u64>,
}

impl CountryPolicy {
    /// A permitted country with no per-rating caps.
    pub fn new(min_rating: Rating, investor_limit: u64) -> Self {
        Self {
            permitted: true,
            min_rating,
            investor_limit,
            rating_limits: BTreeMap::new(),
        }
    }
}

/// Issuer-wide investor caps. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorLimits {
    /// Cap on distinct investors across every country.
    #[serde(default)]
    pub total: Option<u64>,
    /// Caps on distinct investors of a given rating across every country.
    #[serde(default)]
    pub per_rating: BTreeMap<Rating, u64>,
}

/// Read model returned by `country_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryInfo {
    /// Current investors from the country.
    pub count: u64,
    /// Configured limit; zero when the country has no policy.
    pub limit: u64,
    /// Configured minimum rating, if the country has a policy.
    pub min_rating: Option<Rating>,
    /// Whether transfers to investors of the country are allowed.
    pub permitted: bool,
}

/// Check that parallel arrays of a batch policy update agree in length.
pub fn check_lengths(countries: usize, min_ratings: usize, limits: usize) -> Result<(), ValidationError> {
    if min_ratings != countries {
        return Err(ValidationError::LengthMismatch {
            field: "min_ratings",
            expected: countries,
            actual: min_ratings,
        });
    }
    if limits != countries {
        return Err(ValidationError::LengthMismatch {
            field: "limits",
            expected: countries,
            actual: limits,
        });
    }
    Ok(())
}
