//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier the ledger handles. Each namespace
//! is a distinct type, so an [`AuthorityId`] can never be bound where an
//! [`InvestorId`] is expected.
//!
//! ## Validation
//!
//! String identifiers validate their contents at construction and again at
//! deserialization (through the same `new()` path). [`CountryCode`] and
//! [`Rating`] reject zero: zero is the "unset" value in the classification
//! scheme and is never a valid classification.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

const MAX_IDENTIFIER_LEN: usize = 128;

/// Routes deserialization through the validating constructor so invalid
/// values are rejected instead of silently accepted.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

macro_rules! string_identifier {
    ($(#[$meta:meta])* $ty:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $ty(String);

        impl $ty {
            /// Create a validated identifier.
            pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
                let raw = raw.into();
                validate_identifier($kind, &raw)?;
                Ok(Self(raw))
            }

            /// Access the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl_validating_deserialize!($ty);
    };
}

string_identifier!(
    /// An account or contract address. Opaque to the ledger.
    Address,
    "address"
);

string_identifier!(
    /// Identifier of a real-world investor, stable across all of their
    /// addresses within one registrar.
    InvestorId,
    "investor id"
);

string_identifier!(
    /// Identifier of a multisig authority (a registrar or issuer operator).
    AuthorityId,
    "authority id"
);

string_identifier!(
    /// Identifier of an issuing entity.
    IssuerId,
    "issuer id"
);

string_identifier!(
    /// Identifier of an independently operated KYC registrar.
    RegistrarId,
    "registrar id"
);

string_identifier!(
    /// Identifier of a token issued by an issuer.
    TokenId,
    "token id"
);

impl Address {
    /// Derive a deterministic `0x`-prefixed address from a label.
    ///
    /// Used for ledger-owned accounts (issuer treasuries) and by tooling
    /// that names accounts symbolically.
    pub fn derive(label: &str) -> Self {
        Self(format!("0x{}", short_hex(label.as_bytes(), 20)))
    }
}

impl AuthorityId {
    /// Derive the id of an authority from its founding address.
    pub fn derive(founder: &Address) -> Self {
        let mut input = b"authority:".to_vec();
        input.extend_from_slice(founder.as_str().as_bytes());
        Self(format!("auth-{}", short_hex(&input, 8)))
    }
}

impl IssuerId {
    /// Derive the id of an issuer from the founding address of its owner
    /// authority.
    pub fn derive(founder: &Address) -> Self {
        let mut input = b"issuer:".to_vec();
        input.extend_from_slice(founder.as_str().as_bytes());
        Self(format!("issuer-{}", short_hex(&input, 8)))
    }

    /// The treasury address owned by this issuer.
    pub fn treasury(&self) -> Address {
        Address::derive(&format!("treasury:{}", self.0))
    }
}

/// First `len` bytes of the SHA-256 of `input`, as lowercase hex.
fn short_hex(input: &[u8], len: usize) -> String {
    let hash = Sha256::digest(input);
    hash.iter().take(len).map(|b| format!("{b:02x}")).collect()
}

fn validate_identifier(kind: &'static str, raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::MalformedIdentifier {
            kind,
            value: raw.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if raw.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::MalformedIdentifier {
            kind,
            value: raw.chars().take(32).collect(),
            reason: format!("longer than {MAX_IDENTIFIER_LEN} characters"),
        });
    }
    if let Some(bad) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
    {
        return Err(ValidationError::MalformedIdentifier {
            kind,
            value: raw.to_string(),
            reason: format!("invalid character {bad:?}"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Classification primitives
// ---------------------------------------------------------------------------

/// Numeric country code of an investor's jurisdiction. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CountryCode(u16);

impl CountryCode {
    /// Create a country code, rejecting zero.
    pub fn new(code: u16) -> Result<Self, ValidationError> {
        if code == 0 {
            return Err(ValidationError::ZeroCountry);
        }
        Ok(Self(code))
    }

    /// The numeric value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for CountryCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u16::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Ordinal eligibility tier of an investor. Higher is more permissive.
/// Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    /// Create a rating, rejecting zero.
    pub fn new(rating: u8) -> Result<Self, ValidationError> {
        if rating == 0 {
            return Err(ValidationError::ZeroRating);
        }
        Ok(Self(rating))
    }

    /// The numeric tier.
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}
