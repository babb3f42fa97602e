//! # regtoken-core: Foundational Types for the Compliance-Gated Ledger
//!
//! This crate is the leaf of the regtoken workspace. It defines the
//! primitives every other crate builds on and depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `Address`, `InvestorId`,
//!    `AuthorityId`, `IssuerId`, `RegistrarId`, `TokenId`, `CountryCode`,
//!    `Rating`: all newtypes with validated constructors. An authority id
//!    cannot be passed where an investor id is expected.
//!
//! 2. **One error taxonomy.** [`RegtokenError`] has exactly six families
//!    (validation, not-found, duplicate, compliance denial, authorization,
//!    invariant violation). Every mutating call in the workspace returns it.
//!
//! 3. **Externally supplied time.** Expiry checks read a [`Clock`]; tests
//!    pin it with [`FixedClock`].
//!
//! 4. **Multisig as data.** Administrative approval is an explicit
//!    accumulator ([`MultiSig`]) keyed by authority and [`ActionDigest`],
//!    not implicit call state.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `regtoken-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;
pub mod multisig;
pub mod temporal;

pub use digest::{action_digest, ActionDigest};
pub use error::{
    AuthorizationError, DenialReason, DuplicateError, NotFoundError, RegtokenError,
    ValidationError,
};
pub use identity::{
    Address, AuthorityId, CountryCode, InvestorId, IssuerId, Rating, RegistrarId, TokenId,
};
pub use multisig::{Approval, Authority, MultiSig};
pub use temporal::{Clock, FixedClock, SystemClock, Timestamp};

/// Result alias used across the workspace.
pub type Result<T, E = RegtokenError> = std::result::Result<T, E>;
