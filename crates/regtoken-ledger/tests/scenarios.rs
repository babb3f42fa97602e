//! # End-to-End Ledger Scenarios
//!
//! Issuer, registrar, policy, token and module wired together through the
//! engine facade.

mod common;

use common::*;
use regtoken_core::{AuthorizationError, DenialReason, RegtokenError};

// ---- supply ----

#[test]
fn test_mint_burn_then_detach() {
    let mut f = Fixture::new(1_000_000);
    assert_eq!(f.treasury(), 1_000_000);

    let minted = f.engine.mint(&f.module, &f.token, 1_000_000).unwrap();
    assert_eq!(minted.treasury_balance, 2_000_000);
    assert_eq!(f.treasury(), 2_000_000);
    assert_eq!(f.engine.total_supply(&f.token).unwrap(), 2_000_000);

    let burned = f.engine.burn(&f.module, &f.token, 1_500_000).unwrap();
    assert_eq!(burned.total_supply, 500_000);
    assert_eq!(f.treasury(), 500_000);

    f.engine.detach_module(&f.owner, &f.issuer, &f.module).unwrap();
    let err = f.engine.burn(&f.module, &f.token, 500_000).unwrap_err();
    assert!(matches!(
        err,
        RegtokenError::Authorization(AuthorizationError::ModuleNotAttached { .. })
    ));
    assert_eq!(f.treasury(), 500_000);
    assert_eq!(f.engine.total_supply(&f.token).unwrap(), 500_000);

    f.engine.attach_module(&f.owner, &f.issuer, &f.module).unwrap();
    f.engine.burn(&f.module, &f.token, 500_000).unwrap();
    assert_eq!(f.engine.total_supply(&f.token).unwrap(), 0);
}

#[test]
fn test_burn_beyond_treasury_denied() {
    let mut f = Fixture::new(100);
    let err = f.engine.burn(&f.module, &f.token, 101).unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&DenialReason::InsufficientTreasuryBalance {
            available: 100,
            requested: 101
        })
    );
}

#[test]
fn test_mint_respects_authorized_supply() {
    let mut f = Fixture::new(0);
    f.engine
        .modify_authorized_supply(&f.owner, &f.token, 10_000)
        .unwrap();
    assert!(f.engine.mint(&f.module, &f.token, 20_000).is_err());
    f.engine.mint(&f.module, &f.token, 6_000).unwrap();
    assert!(f.engine.mint(&f.module, &f.token, 6_000).is_err());
    f.engine.mint(&f.module, &f.token, 4_000).unwrap();
    assert!(f.engine.mint(&f.module, &f.token, 1).is_err());
    assert_eq!(f.engine.total_supply(&f.token).unwrap(), 10_000);
}

#[test]
fn test_unattached_module_cannot_mint() {
    let mut f = Fixture::new(0);
    let err = f.engine.mint(&addr("rogue"), &f.token, 1).unwrap_err();
    assert!(matches!(err, RegtokenError::Authorization(_)));
}

// ---- investor counts ----

#[test]
fn test_investor_count_follows_zero_transitions() {
    let mut f = Fixture::new(1_000_000);
    f.enrol("investor-a", 1, 1, FAR_FUTURE, &["a"]);
    f.enrol("investor-b", 1, 2, FAR_FUTURE, &["b"]);

    f.fund("a", 100);
    assert_eq!(f.total_investors(), 1);
    f.fund("b", 400);
    assert_eq!(f.total_investors(), 2);
    assert_eq!(f.engine.country_investor_count(&f.issuer, country(1), None), 2);
    assert_eq!(
        f.engine
            .country_investor_count(&f.issuer, country(1), Some(rating(2))),
        1
    );

    let receipt = f.engine.transfer(&addr("a"), &f.token, &addr("b"), 100).unwrap();
    assert_eq!(receipt.from_balance, 0);
    assert_eq!(receipt.to_balance, 500);
    assert_eq!(receipt.total_investors, 1);
    assert_eq!(f.total_investors(), 1);
    assert_eq!(
        f.engine
            .country_investor_count(&f.issuer, country(1), Some(rating(1))),
        0
    );
}

#[test]
fn test_returning_to_treasury_divests() {
    let mut f = Fixture::new(1_000);
    f.enrol("investor-a", 1, 1, FAR_FUTURE, &["a"]);
    f.fund("a", 100);
    let treasury = f.engine.issuer(&f.issuer).unwrap().treasury().clone();
    let receipt = f.engine.transfer(&addr("a"), &f.token, &treasury, 100).unwrap();
    assert_eq!(receipt.to, treasury);
    assert_eq!(f.total_investors(), 0);
    assert_eq!(f.treasury(), 1_000);
}

#[test]
fn test_transfer_to_authority_address_credits_treasury() {
    let mut f = Fixture::new(1_000);
    f.enrol("investor-a", 1, 1, FAR_FUTURE, &["a"]);
    f.fund("a", 100);
    let owner = f.owner.clone();
    f.engine.transfer(&addr("a"), &f.token, &owner, 40).unwrap();
    assert_eq!(f.engine.balance_of(&f.token, &owner).unwrap(), 0);
    assert_eq!(f.treasury(), 940);
    assert_eq!(f.total_investors(), 1);
}

#[test]
fn test_investor_count_spans_tokens_and_addresses() {
    let mut f = Fixture::new(1_000);
    f.enrol("investor-a", 1, 1, FAR_FUTURE, &["a1", "a2"]);
    let second = f
        .engine
        .add_token(&f.owner, &f.issuer, "Second", "TWO", 1_000)
        .unwrap()
        .executed()
        .unwrap();

    f.fund("a1", 10);
    f.engine
        .transfer(&f.owner, &second, &addr("a2"), 10)
        .unwrap();
    assert_eq!(f.total_investors(), 1);
    assert_eq!(f.engine.investor_balance(&f.issuer, &inv("investor-a")), 20);

    let treasury = f.engine.issuer(&f.issuer).unwrap().treasury().clone();
    f.engine.transfer(&addr("a1"), &f.token, &treasury, 10).unwrap();
    assert_eq!(f.total_investors(), 1);
    f.engine.transfer(&addr("a2"), &second, &treasury, 10).unwrap();
    assert_eq!(f.total_investors(), 0);
}

// ---- registrar links ----

#[test]
fn test_no_registrar_denies_until_linked() {
    let mut f = Fixture::unlinked(1_000);
    f.enrol("investor-a", 1, 1, FAR_FUTURE, &["a"]);

    for amount in [1, 500, 1_000] {
        let err = f
            .engine
            .transfer(&f.owner, &f.token, &addr("a"), amount)
            .unwrap_err();
        assert_eq!(err.denial(), Some(&DenialReason::ReceiverUnverified(addr("a"))));
    }
    assert_eq!(f.treasury(), 1_000);

    f.engine.add_registrar(&f.owner, &f.issuer, &f.kyc).unwrap();
    f.fund("a", 500);
    assert_eq!(f.balance("a"), 500);
}

#[test]
fn test_second_registrar_is_or_combined() {
    let mut f = Fixture::new(1_000);
    f.enrol("investor-a", 1, 1, START + 10, &["a"]);

    let backup = regtoken_core::RegistrarId::new("kyc-backup").unwrap();
    f.engine
        .create_registrar(backup.clone(), &[addr("backup-owner")], 1)
        .unwrap();
    f.engine
        .add_investor(
            &addr("backup-owner"),
            &backup,
            &inv("investor-a"),
            regtoken_kyc::InvestorProfile {
                country: country(1),
                rating: rating(1),
                expiry: ts(FAR_FUTURE),
            },
            &[addr("a")],
        )
        .unwrap();

    f.engine.clock().advance(20);
    assert!(f.engine.transfer(&f.owner, &f.token, &addr("a"), 1).is_err());
    f.engine.add_registrar(&f.owner, &f.issuer, &backup).unwrap();
    f.fund("a", 1);
}
