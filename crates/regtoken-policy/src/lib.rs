//! # regtoken-policy: Jurisdiction Policy and Investor Counters
//!
//! The [`PolicyStore`] owns, per issuer:
//!
//! - **Country policies** (`country.rs`): whether a country is permitted,
//!   the minimum rating, the investor limit and optional per-rating limits.
//!   A country with no entry is disallowed.
//! - **Issuer-wide limits**: an optional cap on total investors and
//!   optional per-rating caps.
//! - **Investor counters** (`counters.rs`): the set of current holders
//!   with the classification each was counted under, and the derived
//!   `(country, rating)` buckets.
//!
//! ## Counter Discipline
//!
//! Counters are a cached projection of nonzero balances. The ledger is the
//! only writer, and it writes through [`PolicyStore::apply`] with a batch of
//! [`CounterTransition`]s computed from the pre- and post-balances of one
//! operation. The batch is validated in full before any of it is applied,
//! so a bookkeeping disagreement halts the operation with nothing written.

pub mod country;
pub mod counters;
pub mod store;

pub use country::{CountryInfo, CountryPolicy, InvestorLimits};
pub use counters::{BucketCount, Classification, CounterSnapshot, CounterTransition};
pub use store::PolicyStore;
