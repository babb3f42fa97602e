//! # regtoken-kyc: Investor Identity Registrar
//!
//! A [`KycRegistrar`] is an independently operated store of verified-investor
//! records. Issuers link one or more registrars and treat an address as
//! verified if *any* linked registrar holds a current record for it.
//!
//! ## Records
//!
//! - **Investor** (`record.rs`): one [`InvestorRecord`] per real-world
//!   investor, holding country, rating, expiry and a restriction flag. Records
//!   are never deleted; deactivation is restriction or expiry.
//! - **Address binding**: each address maps to at most one investor within a
//!   registrar. An investor may hold many addresses, and each binding can be
//!   restricted on its own.
//!
//! ## Administration
//!
//! Every mutation is gated by the registrar's [`MultiSig`](regtoken_core::MultiSig).
//! The owner authority can do everything. Other authorities are scoped to
//! the countries they are permitted for.

pub mod record;
pub mod registrar;

pub use record::{InvestorProfile, InvestorRecord, KycStatus};
pub use registrar::KycRegistrar;
