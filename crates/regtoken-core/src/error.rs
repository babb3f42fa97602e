//! # Error Types: Structured Error Hierarchy
//!
//! Every mutating operation in the workspace returns [`RegtokenError`]. The
//! six families are fixed:
//!
//! - [`ValidationError`]: malformed input (zero amount, zero country,
//!   repeated address in a set, bad threshold).
//! - [`NotFoundError`]: unknown investor, authority, registrar, issuer,
//!   token or module.
//! - [`DuplicateError`]: an address or entity is already bound elsewhere.
//! - [`DenialReason`]: the compliance engine refused a balance change.
//! - [`AuthorizationError`]: the caller lacks the role, the module is not
//!   attached, or the caller already signed a pending call.
//! - `InvariantViolation`: internal bookkeeping disagreed with itself. The
//!   operation is halted before anything is written.
//!
//! All families except `InvariantViolation` are recoverable: they leave
//! state untouched and carry enough detail to tell causes apart.

use thiserror::Error;

use crate::identity::{Address, AuthorityId, CountryCode, InvestorId, IssuerId, Rating, RegistrarId, TokenId};

/// Top-level error type for the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegtokenError {
    /// Malformed input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Entity or binding already exists.
    #[error("duplicate: {0}")]
    Duplicate(#[from] DuplicateError),

    /// The compliance engine denied the balance change.
    #[error("compliance denied: {0}")]
    ComplianceDenied(DenialReason),

    /// The caller is not allowed to perform the operation.
    #[error("authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    /// Internal bookkeeping inconsistency. Never expected in a correct build.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl RegtokenError {
    /// Whether the caller may retry with different inputs. Invariant
    /// violations are fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvariantViolation(_))
    }

    /// The compliance denial reason, if this is a denial.
    pub fn denial(&self) -> Option<&DenialReason> {
        match self {
            Self::ComplianceDenied(reason) => Some(reason),
            _ => None,
        }
    }

    /// Build an invariant violation, logging it at error level.
    pub fn invariant(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(detail = %detail, "ledger invariant violated, operation halted");
        Self::InvariantViolation(detail)
    }
}

impl From<DenialReason> for RegtokenError {
    fn from(reason: DenialReason) -> Self {
        Self::ComplianceDenied(reason)
    }
}

/// Malformed input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Amounts must be strictly positive.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Country code zero is the unset value.
    #[error("country code must be non-zero")]
    ZeroCountry,

    /// Rating zero is the unset value.
    #[error("rating must be non-zero")]
    ZeroRating,

    /// An identifier failed format validation.
    #[error("malformed {kind} {value:?}: {reason}")]
    MalformedIdentifier {
        /// Identifier namespace.
        kind: &'static str,
        /// The rejected value (possibly truncated).
        value: String,
        /// What was wrong.
        reason: String,
    },

    /// Epoch seconds outside the representable range.
    #[error("invalid unix timestamp: {0}")]
    InvalidTimestamp(i64),

    /// Timestamp string was not RFC 3339 with a Z suffix.
    #[error("malformed timestamp: {0:?}")]
    MalformedTimestamp(String),

    /// An address set was empty where at least one address is required.
    #[error("address set must not be empty")]
    EmptyAddressSet,

    /// The same address appeared twice in one address set.
    #[error("address {0} appears more than once")]
    RepeatedAddress(Address),

    /// Multisig threshold of zero.
    #[error("threshold must be at least one")]
    ZeroThreshold,

    /// Multisig threshold above the number of signing addresses.
    #[error("threshold {threshold} exceeds {signers} signing addresses")]
    ThresholdTooHigh {
        /// Requested threshold.
        threshold: u32,
        /// Active signing addresses available.
        signers: usize,
    },

    /// Restricting these addresses would leave fewer active signers than
    /// the authority's threshold.
    #[error("authority {authority} would drop below its threshold of {threshold}")]
    BelowThreshold {
        /// The authority.
        authority: AuthorityId,
        /// Its threshold.
        threshold: u32,
    },

    /// Parallel input arrays disagree in length.
    #[error("{field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        /// Offending field.
        field: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Minting would exceed the token's authorized supply.
    #[error("minting {requested} would exceed authorized supply {authorized} (total {total})")]
    ExceedsAuthorizedSupply {
        /// Current total supply.
        total: u64,
        /// Requested mint.
        requested: u64,
        /// Authorized ceiling.
        authorized: u64,
    },

    /// Authorized supply may not be set below the current total supply.
    #[error("authorized supply {authorized} is below total supply {total}")]
    AuthorizedBelowTotal {
        /// Requested authorized supply.
        authorized: u64,
        /// Current total supply.
        total: u64,
    },

    /// The address is already in the requested restriction state.
    #[error("address {0} is already restricted")]
    AlreadyRestricted(Address),

    /// Sender and receiver are the same address.
    #[error("cannot transfer from {0} to itself")]
    SelfTransfer(Address),
}

/// Referenced entity does not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    /// No investor record with this id.
    #[error("investor {0}")]
    Investor(InvestorId),

    /// No authority with this id.
    #[error("authority {0}")]
    Authority(AuthorityId),

    /// No registrar with this id.
    #[error("registrar {0}")]
    Registrar(RegistrarId),

    /// No issuer with this id.
    #[error("issuer {0}")]
    Issuer(IssuerId),

    /// No token with this id.
    #[error("token {0}")]
    Token(TokenId),

    /// The issuer has no policy for this country.
    #[error("country {country} policy on issuer {issuer}")]
    CountryPolicy {
        /// The issuer.
        issuer: IssuerId,
        /// The country.
        country: CountryCode,
    },

    /// The module has no attachment record for this issuer.
    #[error("module {module} on issuer {issuer}")]
    Module {
        /// The issuer.
        issuer: IssuerId,
        /// The module address.
        module: Address,
    },

    /// The address is not bound to the expected investor or authority.
    #[error("address {address} is not bound to {owner}")]
    AddressBinding {
        /// The address.
        address: Address,
        /// The owner it was expected to be bound to.
        owner: String,
    },
}

/// Entity or binding already exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DuplicateError {
    /// The address is already bound to a different investor or authority.
    #[error("address {address} is already bound to {owner}")]
    AddressBound {
        /// The address.
        address: Address,
        /// Current owner (investor or authority id).
        owner: String,
    },

    /// Authority already exists.
    #[error("authority {0} already exists")]
    Authority(AuthorityId),

    /// Registrar already exists or is already linked to the issuer.
    #[error("registrar {0} already exists")]
    Registrar(RegistrarId),

    /// Issuer already exists.
    #[error("issuer {0} already exists")]
    Issuer(IssuerId),

    /// Token already exists.
    #[error("token {0} already exists")]
    Token(TokenId),
}

/// Why the compliance engine denied a balance change.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DenialReason {
    /// Sender balance below the requested amount.
    #[error("insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance {
        /// Balance available.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// Spender allowance below the requested amount.
    #[error("insufficient allowance: {available} approved, {requested} requested")]
    InsufficientAllowance {
        /// Approved allowance.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// Treasury balance below the requested burn.
    #[error("insufficient treasury balance: {available} available, {requested} requested")]
    InsufficientTreasuryBalance {
        /// Treasury balance.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// No linked registrar knows the sender.
    #[error("sender {0} is not verified by any linked registrar")]
    SenderUnverified(Address),

    /// Sender record or address is restricted at the registrar.
    #[error("sender {0} is restricted by its registrar")]
    SenderRestricted(Address),

    /// Sender KYC has expired.
    #[error("sender {0} KYC has expired")]
    SenderExpired(Address),

    /// No linked registrar knows the receiver.
    #[error("receiver {0} is not verified by any linked registrar")]
    ReceiverUnverified(Address),

    /// Receiver record or address is restricted at the registrar.
    #[error("receiver {0} is restricted by its registrar")]
    ReceiverRestricted(Address),

    /// Receiver KYC has expired.
    #[error("receiver {0} KYC has expired")]
    ReceiverExpired(Address),

    /// The issuer has blocked the sender's investor id.
    #[error("sender investor {0} is blocked by the issuer")]
    SenderBlockedByIssuer(InvestorId),

    /// The issuer has blocked the receiver's investor id.
    #[error("receiver investor {0} is blocked by the issuer")]
    ReceiverBlockedByIssuer(InvestorId),

    /// The receiver's country has no permitting policy.
    #[error("country {0} is not permitted")]
    CountryNotPermitted(CountryCode),

    /// The receiver's rating is below the country minimum.
    #[error("rating {rating} is below the minimum {min_rating} for country {country}")]
    RatingTooLow {
        /// Receiver country.
        country: CountryCode,
        /// Receiver rating.
        rating: Rating,
        /// Policy minimum.
        min_rating: Rating,
    },

    /// Admitting the receiver would exceed the country investor limit.
    #[error("country {country} investor limit {limit} reached")]
    InvestorLimitExceeded {
        /// Receiver country.
        country: CountryCode,
        /// Configured limit.
        limit: u64,
    },

    /// Admitting the receiver would exceed the country limit for its rating.
    #[error("country {country} rating {rating} investor limit {limit} reached")]
    CountryRatingLimitExceeded {
        /// Receiver country.
        country: CountryCode,
        /// Receiver rating.
        rating: Rating,
        /// Configured limit.
        limit: u64,
    },

    /// Admitting the receiver would exceed the issuer-wide investor limit.
    #[error("total investor limit {limit} reached")]
    TotalInvestorLimitExceeded {
        /// Configured limit.
        limit: u64,
    },

    /// Admitting the receiver would exceed the issuer-wide limit for its rating.
    #[error("total investor limit {limit} for rating {rating} reached")]
    TotalRatingLimitExceeded {
        /// Receiver rating.
        rating: Rating,
        /// Configured limit.
        limit: u64,
    },

    /// The token (or every token of the issuer) is locked.
    #[error("token {0} is locked")]
    TokenLocked(TokenId),
}

/// The caller is not allowed to perform the operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The caller address belongs to no authority.
    #[error("caller {0} is not an authority address")]
    UnknownCaller(Address),

    /// The caller address was restricted by its authority.
    #[error("caller {0} is a restricted authority address")]
    RestrictedCaller(Address),

    /// The operation is reserved for the owner authority.
    #[error("caller {0} is not an owner address")]
    NotOwner(Address),

    /// The caller's authority is not permitted to perform this action.
    #[error("authority {authority} is not permitted to {action}")]
    NotPermitted {
        /// The authority.
        authority: AuthorityId,
        /// The action attempted.
        action: String,
    },

    /// The caller's authority may not administer investors of this country.
    #[error("authority {authority} is not permitted for country {country}")]
    CountryNotPermitted {
        /// The authority.
        authority: AuthorityId,
        /// The country.
        country: CountryCode,
    },

    /// The caller's authority is restricted as a whole.
    #[error("authority {0} is restricted")]
    AuthorityRestricted(AuthorityId),

    /// The caller's authority approval window has closed.
    #[error("authority {0} approval has expired")]
    AuthorityExpired(AuthorityId),

    /// The owner authority cannot be restricted.
    #[error("the owner authority {0} cannot be restricted")]
    OwnerRestriction(AuthorityId),

    /// The caller already signed this pending call.
    #[error("caller {0} already signed this call")]
    RepeatCaller(Address),

    /// Privileged call from a module that is not attached to the issuer.
    #[error("module {module} is not attached to issuer {issuer}")]
    ModuleNotAttached {
        /// The issuer.
        issuer: IssuerId,
        /// The module address.
        module: Address,
    },
}
