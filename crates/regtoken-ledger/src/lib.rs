//! # regtoken-ledger: Compliance-Gated Token Ledger
//!
//! Ties the identity registrars and the policy store into a ledger where
//! every balance change is first cleared by the compliance engine.
//!
//! ## Components
//!
//! - **Compliance** (`compliance.rs`): stateless transfer decision. Reads
//!   registrars, policy and holdings; returns a [`Clearance`] or a typed
//!   denial.
//! - **Ledger** (`ledger.rs`, `token.rs`): tokens, balances, allowances,
//!   supply, and the per-issuer holder book that aggregates balances per
//!   investor across every token and address.
//! - **Modules** (`modules.rs`): capability table of privileged extensions
//!   attached to an issuer.
//! - **Issuers** (`issuer.rs`): multisig administration, authority
//!   permissions, registrar links and issuer-side restrictions.
//!   `issuer_kyc.rs` lets an issuer run its own registrar behind its
//!   multisig.
//! - **Engine** (`engine.rs`, `admin.rs`, `transfer.rs`): the facade. One
//!   `&mut self` call is one indivisible step that commits fully or not at
//!   all.
//! - **Shared** (`shared.rs`): a mutex-serialized handle for concurrent
//!   callers.
//!
//! ## Commit Protocol
//!
//! ```text
//! validate ─▶ compliance ─▶ prepare (checked arithmetic, counter batch)
//!          ─▶ policy.apply(batch)  (all-or-nothing)
//!          ─▶ ledger.commit(prepared)  (infallible)
//! ```
//!
//! Any failure before `ledger.commit` leaves balances and counters exactly
//! as they were.

pub mod admin;
pub mod compliance;
pub mod engine;
pub mod issuer;
pub mod issuer_kyc;
pub mod ledger;
pub mod modules;
pub mod receipt;
pub mod shared;
pub mod token;
pub mod transfer;

pub use compliance::{resolve_status, Clearance, Counterparty, Endpoint, Holdings, Party, TransferCheck};
pub use engine::Engine;
pub use issuer::{Issuer, IssuerAction};
pub use issuer_kyc::{issuer_registrar_id, KycCall};
pub use ledger::Ledger;
pub use modules::{ModuleAttachment, ModuleRegistry};
pub use receipt::{SupplyReceipt, TransferReceipt};
pub use shared::SharedEngine;
pub use token::{Token, TokenInfo};
