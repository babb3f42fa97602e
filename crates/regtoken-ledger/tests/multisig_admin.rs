//! # Multisig Administration Tests
//!
//! Pending approvals never touch balances, counters or policy; the call is
//! applied exactly once, when the threshold is met.

mod common;

use common::*;
use regtoken_core::{Approval, AuthorizationError, FixedClock, RegistrarId, RegtokenError};
use regtoken_kyc::InvestorProfile;
use regtoken_ledger::Engine;

fn two_of_two() -> (Engine<FixedClock>, regtoken_core::IssuerId) {
    let mut engine = Engine::with_clock(FixedClock::at_epoch(START).unwrap());
    let issuer = engine
        .create_issuer(&[addr("o1"), addr("o2")], 2)
        .unwrap();
    (engine, issuer)
}

#[test]
fn test_add_token_needs_both_owners() {
    let (mut e, issuer) = two_of_two();
    let first = e.add_token(&addr("o1"), &issuer, "Fund", "FND", 500).unwrap();
    assert_eq!(
        first,
        Approval::Pending {
            signatures: 1,
            threshold: 2
        }
    );
    assert!(e.tokens(&issuer).is_empty());

    assert_eq!(
        e.add_token(&addr("o1"), &issuer, "Fund", "FND", 500)
            .unwrap_err(),
        AuthorizationError::RepeatCaller(addr("o1")).into()
    );

    let token = e
        .add_token(&addr("o2"), &issuer, "Fund", "FND", 500)
        .unwrap()
        .executed()
        .unwrap();
    assert_eq!(e.total_supply(&token).unwrap(), 500);
    assert_eq!(e.tokens(&issuer).len(), 1);
}

#[test]
fn test_different_arguments_do_not_combine() {
    let (mut e, issuer) = two_of_two();
    e.set_countries(&addr("o1"), &issuer, &[country(1)], &[rating(1)], &[10])
        .unwrap();
    let other = e
        .set_countries(&addr("o2"), &issuer, &[country(1)], &[rating(1)], &[11])
        .unwrap();
    assert!(!other.is_executed());
    assert_eq!(e.country_investor_limit(&issuer, country(1)), 0);

    e.set_countries(&addr("o1"), &issuer, &[country(1)], &[rating(1)], &[11])
        .unwrap();
    assert_eq!(e.country_investor_limit(&issuer, country(1)), 11);
}

#[test]
fn test_pending_registrar_write_does_not_verify() {
    let mut f = Fixture::new(1_000);
    let strict = RegistrarId::new("kyc-strict").unwrap();
    f.engine
        .create_registrar(strict.clone(), &[addr("k1"), addr("k2")], 2)
        .unwrap();
    f.engine.add_registrar(&f.owner, &f.issuer, &strict).unwrap();

    let profile = InvestorProfile {
        country: country(1),
        rating: rating(1),
        expiry: ts(FAR_FUTURE),
    };
    let pending = f
        .engine
        .add_investor(&addr("k1"), &strict, &inv("investor-a"), profile, &[addr("a")])
        .unwrap();
    assert!(!pending.is_executed());
    assert!(f.engine.transfer(&f.owner, &f.token, &addr("a"), 1).is_err());

    f.engine
        .add_investor(&addr("k2"), &strict, &inv("investor-a"), profile, &[addr("a")])
        .unwrap();
    f.fund("a", 1);
    assert_eq!(f.total_investors(), 1);
}

#[test]
fn test_pending_detach_keeps_module_working() {
    let (mut e, issuer) = two_of_two();
    let module = addr("module");
    e.attach_module(&addr("o1"), &issuer, &module).unwrap();
    e.attach_module(&addr("o2"), &issuer, &module).unwrap();
    e.add_token(&addr("o1"), &issuer, "Fund", "FND", 0).unwrap();
    let token = e
        .add_token(&addr("o2"), &issuer, "Fund", "FND", 0)
        .unwrap()
        .executed()
        .unwrap();

    e.detach_module(&addr("o1"), &issuer, &module).unwrap();
    e.mint(&module, &token, 10).unwrap();
    e.detach_module(&addr("o2"), &issuer, &module).unwrap();
    assert!(matches!(
        e.mint(&module, &token, 10),
        Err(RegtokenError::Authorization(AuthorizationError::ModuleNotAttached { .. }))
    ));
    assert_eq!(e.total_supply(&token).unwrap(), 10);
}

#[test]
fn test_raised_threshold_applies_to_next_call() {
    let mut e = Engine::with_clock(FixedClock::at_epoch(START).unwrap());
    let issuer = e.create_issuer(&[addr("o1"), addr("o2")], 1).unwrap();
    let owner = e.issuer(&issuer).unwrap().multisig().owner_id().clone();
    e.set_authority_threshold(&addr("o1"), &issuer, &owner, 2)
        .unwrap();
    let pending = e.set_global_restriction(&addr("o1"), &issuer, true).unwrap();
    assert!(!pending.is_executed());
    assert!(!e.issuer(&issuer).unwrap().is_globally_locked());
    e.set_global_restriction(&addr("o2"), &issuer, true).unwrap();
    assert!(e.issuer(&issuer).unwrap().is_globally_locked());
}
