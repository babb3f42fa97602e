//! # Transfer Rule Tests
//!
//! Identity status, issuer restrictions, locks, limits and allowances as
//! seen through `transfer` and `transfer_from`. Every denial must leave
//! balances and counters untouched.

mod common;

use std::collections::BTreeMap;

use common::*;
use regtoken_core::{AuthorizationError, DenialReason, RegtokenError, ValidationError};
use regtoken_kyc::InvestorProfile;
use regtoken_ledger::{IssuerAction, KycCall};
use regtoken_policy::InvestorLimits;

fn funded_pair() -> Fixture {
    let mut f = Fixture::new(100_000);
    f.enrol("investor-1", 1, 1, FAR_FUTURE, &["one"]);
    f.enrol("investor-2", 1, 1, FAR_FUTURE, &["two"]);
    f.fund("one", 1_000);
    f
}

fn assert_untouched(f: &Fixture, one: u64, two: u64, investors: u64) {
    assert_eq!(f.balance("one"), one);
    assert_eq!(f.balance("two"), two);
    assert_eq!(f.total_investors(), investors);
}

// ---- validation ----

#[test]
fn test_zero_amount_rejected() {
    let mut f = funded_pair();
    let err = f.engine.transfer(&addr("one"), &f.token, &addr("two"), 0).unwrap_err();
    assert_eq!(err, ValidationError::ZeroAmount.into());
}

#[test]
fn test_insufficient_balance() {
    let mut f = funded_pair();
    let err = f
        .engine
        .transfer(&addr("one"), &f.token, &addr("two"), 1_001)
        .unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&DenialReason::InsufficientBalance {
            available: 1_000,
            requested: 1_001
        })
    );
    assert_untouched(&f, 1_000, 0, 1);
}

#[test]
fn test_self_transfer_rejected() {
    let mut f = funded_pair();
    assert!(matches!(
        f.engine.transfer(&addr("one"), &f.token, &addr("one"), 1),
        Err(RegtokenError::Validation(ValidationError::SelfTransfer(_)))
    ));
}

#[test]
fn test_treasury_cannot_send_directly() {
    let mut f = funded_pair();
    let treasury = f.engine.issuer(&f.issuer).unwrap().treasury().clone();
    assert_eq!(
        f.engine
            .transfer(&treasury, &f.token, &addr("two"), 1)
            .unwrap_err(),
        AuthorizationError::UnknownCaller(treasury).into()
    );
}

// ---- identity status ----

#[test]
fn test_expired_sender_and_receiver() {
    let mut f = Fixture::new(100_000);
    f.enrol("investor-1", 1, 1, START + 100, &["one"]);
    f.enrol("investor-2", 1, 1, FAR_FUTURE, &["two"]);
    f.fund("one", 1_000);

    f.engine.clock().advance(100);
    let err = f
        .engine
        .transfer(&addr("one"), &f.token, &addr("two"), 10)
        .unwrap_err();
    assert_eq!(err.denial(), Some(&DenialReason::SenderExpired(addr("one"))));

    let err = f
        .engine
        .transfer(&addr("two"), &f.token, &addr("one"), 10)
        .unwrap_err();
    assert!(matches!(err.denial(), Some(DenialReason::InsufficientBalance { .. })));

    f.fund("two", 50);
    let err = f
        .engine
        .transfer(&addr("two"), &f.token, &addr("one"), 10)
        .unwrap_err();
    assert_eq!(err.denial(), Some(&DenialReason::ReceiverExpired(addr("one"))));
    assert_untouched(&f, 1_000, 50, 2);

    f.engine
        .update_expiry(&f.kyc_owner, &f.kyc, &inv("investor-1"), ts(FAR_FUTURE))
        .unwrap();
    f.engine.transfer(&addr("one"), &f.token, &addr("two"), 10).unwrap();
}

#[test]
fn test_restricted_at_registrar() {
    let mut f = funded_pair();
    f.engine
        .set_restricted(&f.kyc_owner, &f.kyc, &inv("investor-1"), true)
        .unwrap();
    let err = f
        .engine
        .transfer(&addr("one"), &f.token, &addr("two"), 10)
        .unwrap_err();
    assert_eq!(err.denial(), Some(&DenialReason::SenderRestricted(addr("one"))));
    let err = f.engine.transfer(&f.owner, &f.token, &addr("one"), 10).unwrap_err();
    assert_eq!(err.denial(), Some(&DenialReason::ReceiverRestricted(addr("one"))));
    assert_untouched(&f, 1_000, 0, 1);

    f.engine
        .set_restricted(&f.kyc_owner, &f.kyc, &inv("investor-1"), false)
        .unwrap();
    f.engine.transfer(&addr("one"), &f.token, &addr("two"), 10).unwrap();
}

#[test]
fn test_restricted_address_at_registrar() {
    let mut f = funded_pair();
    let owner = f.kyc_owner.clone();
    let kyc = f.kyc.clone();
    f.engine
        .registrar_mut(&kyc)
        .unwrap()
        .restrict_addresses(&owner, ts(START), &inv("investor-1"), &[addr("one")])
        .unwrap();
    let err = f
        .engine
        .transfer(&addr("one"), &f.token, &addr("two"), 10)
        .unwrap_err();
    assert_eq!(err.denial(), Some(&DenialReason::SenderRestricted(addr("one"))));
}

#[test]
fn test_issuer_entity_restriction() {
    let mut f = funded_pair();
    f.engine
        .set_entity_restriction(&f.owner, &f.issuer, &inv("investor-1"), true)
        .unwrap();
    let err = f
        .engine
        .transfer(&addr("one"), &f.token, &addr("two"), 10)
        .unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&DenialReason::SenderBlockedByIssuer(inv("investor-1")))
    );
    let err = f.engine.transfer(&f.owner, &f.token, &addr("one"), 10).unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&DenialReason::ReceiverBlockedByIssuer(inv("investor-1")))
    );

    f.engine
        .set_entity_restriction(&f.owner, &f.issuer, &inv("investor-1"), false)
        .unwrap();
    f.engine.transfer(&addr("one"), &f.token, &addr("two"), 10).unwrap();
}

// ---- country policy ----

#[test]
fn test_receiver_country_and_rating() {
    let mut f = funded_pair();
    f.enrol("investor-3", 2, 1, FAR_FUTURE, &["three"]);
    let err = f.engine.transfer(&f.owner, &f.token, &addr("three"), 10).unwrap_err();
    assert_eq!(err.denial(), Some(&DenialReason::CountryNotPermitted(country(2))));

    f.engine
        .set_countries(&f.owner, &f.issuer, &[country(1)], &[rating(2)], &[100])
        .unwrap();
    let err = f.engine.transfer(&f.owner, &f.token, &addr("two"), 10).unwrap_err();
    assert!(matches!(err.denial(), Some(DenialReason::RatingTooLow { .. })));

    let err = f
        .engine
        .transfer(&addr("one"), &f.token, &addr("two"), 10)
        .unwrap_err();
    assert!(matches!(err.denial(), Some(DenialReason::RatingTooLow { .. })));
}

// ---- limits ----

#[test]
fn test_country_investor_limit() {
    let mut f = funded_pair();
    f.set_limit(1);

    let err = f.engine.transfer(&f.owner, &f.token, &addr("two"), 1_000).unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&DenialReason::InvestorLimitExceeded {
            country: country(1),
            limit: 1
        })
    );
    let err = f
        .engine
        .transfer(&addr("one"), &f.token, &addr("two"), 500)
        .unwrap_err();
    assert!(matches!(err.denial(), Some(DenialReason::InvestorLimitExceeded { .. })));
    assert_untouched(&f, 1_000, 0, 1);

    f.fund("one", 1_000);
    f.engine
        .transfer(&addr("one"), &f.token, &addr("two"), 2_000)
        .unwrap();
    assert_untouched(&f, 0, 2_000, 1);
}

#[test]
fn test_lowered_limit_evicts_nobody() {
    let mut f = funded_pair();
    f.fund("two", 10);
    f.set_limit(1);
    assert_eq!(f.total_investors(), 2);
    f.engine.transfer(&addr("one"), &f.token, &addr("two"), 5).unwrap();
    f.engine.transfer(&addr("two"), &f.token, &addr("one"), 15).unwrap();
    assert_eq!(f.total_investors(), 1);
    let err = f.engine.transfer(&f.owner, &f.token, &addr("two"), 1).unwrap_err();
    assert!(matches!(err.denial(), Some(DenialReason::InvestorLimitExceeded { .. })));
}

#[test]
fn test_country_rating_limit() {
    let mut f = funded_pair();
    f.engine
        .set_country_rating_limit(&f.owner, &f.issuer, country(1), rating(1), Some(1))
        .unwrap();
    let err = f.engine.transfer(&f.owner, &f.token, &addr("two"), 10).unwrap_err();
    assert!(matches!(
        err.denial(),
        Some(DenialReason::CountryRatingLimitExceeded { .. })
    ));

    f.engine
        .update_rating(&f.kyc_owner, &f.kyc, &inv("investor-2"), rating(2))
        .unwrap();
    f.fund("two", 10);
    assert_eq!(f.total_investors(), 2);
}

#[test]
fn test_total_investor_limit() {
    let mut f = funded_pair();
    f.engine
        .set_investor_limits(
            &f.owner,
            &f.issuer,
            InvestorLimits {
                total: Some(1),
                per_rating: BTreeMap::new(),
            },
        )
        .unwrap();
    let err = f.engine.transfer(&f.owner, &f.token, &addr("two"), 10).unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&DenialReason::TotalInvestorLimitExceeded { limit: 1 })
    );
    f.fund("one", 10);
    f.engine
        .transfer(&addr("one"), &f.token, &addr("two"), 1_010)
        .unwrap();
    assert_untouched(&f, 0, 1_010, 1);
}

// ---- reclassification ----

/// Country 1 with room for 100, country 2 with room for 1; alice holds in
/// country 1 and bob fills country 2.
fn two_countries() -> Fixture {
    let mut f = Fixture::new(100_000);
    f.engine
        .set_countries(&f.owner, &f.issuer, &[country(1), country(2)], &[rating(1), rating(1)], &[100, 1])
        .unwrap();
    f.enrol("alice", 1, 1, FAR_FUTURE, &["alice"]);
    f.enrol("bob", 2, 1, FAR_FUTURE, &["bob"]);
    f.fund("alice", 10);
    f.fund("bob", 10);
    f
}

fn country_counts(f: &Fixture) -> (u64, u64) {
    (
        f.engine.country_investor_count(&f.issuer, country(1), None),
        f.engine.country_investor_count(&f.issuer, country(2), None),
    )
}

#[test]
fn test_country_update_moves_holder_at_once() {
    let mut f = two_countries();
    assert_eq!(country_counts(&f), (1, 1));

    f.engine
        .update_country(&f.kyc_owner, &f.kyc, &inv("alice"), country(2))
        .unwrap();
    assert_eq!(country_counts(&f), (0, 2));
    assert_eq!(f.total_investors(), 2);
    let snapshot = f.engine.counters(&f.issuer);
    assert_eq!(snapshot.buckets.len(), 1);
    assert_eq!(snapshot.buckets[0].count, 2);

    // Already over the limit, like a lowered limit: existing holders stay,
    // nobody new gets in, and topping up a holder changes no count.
    f.fund("alice", 1);
    assert_eq!(country_counts(&f), (0, 2));
    f.enrol("carol", 2, 1, FAR_FUTURE, &["carol"]);
    let err = f.engine.transfer(&f.owner, &f.token, &addr("carol"), 1).unwrap_err();
    assert!(matches!(err.denial(), Some(DenialReason::InvestorLimitExceeded { .. })));
}

#[test]
fn test_rating_update_moves_holder_at_once() {
    let mut f = two_countries();
    f.engine
        .update_rating(&f.kyc_owner, &f.kyc, &inv("alice"), rating(3))
        .unwrap();
    assert_eq!(f.engine.country_investor_count(&f.issuer, country(1), Some(rating(1))), 0);
    assert_eq!(f.engine.country_investor_count(&f.issuer, country(1), Some(rating(3))), 1);
    assert_eq!(f.engine.rating_investor_count(&f.issuer, rating(3)), 1);

    // A non-holder update changes no count.
    f.enrol("carol", 1, 1, FAR_FUTURE, &["carol"]);
    f.engine
        .update_country(&f.kyc_owner, &f.kyc, &inv("carol"), country(2))
        .unwrap();
    assert_eq!(country_counts(&f), (1, 1));
}

#[test]
fn test_transfer_time_reclassification_respects_limits() {
    let mut f = two_countries();
    let owner = f.kyc_owner.clone();
    let kyc = f.kyc.clone();
    f.engine
        .registrar_mut(&kyc)
        .unwrap()
        .update_country(&owner, ts(START), &inv("alice"), country(2))
        .unwrap();
    assert_eq!(country_counts(&f), (1, 1));

    let err = f.engine.transfer(&f.owner, &f.token, &addr("alice"), 1).unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&DenialReason::InvestorLimitExceeded {
            country: country(2),
            limit: 1
        })
    );
    let err = f.engine.transfer(&addr("alice"), &f.token, &addr("bob"), 5).unwrap_err();
    assert!(matches!(err.denial(), Some(DenialReason::InvestorLimitExceeded { .. })));
    assert_eq!(f.balance("alice"), 10);
    assert_eq!(country_counts(&f), (1, 1));

    // Sending the whole holding divests without a move.
    f.engine.transfer(&addr("alice"), &f.token, &addr("bob"), 10).unwrap();
    assert_eq!(country_counts(&f), (0, 1));
    assert_eq!(f.balance("bob"), 20);
}

// ---- issuer-run KYC ----

#[test]
fn test_issuer_verified_investors_trade_and_count() {
    let mut f = Fixture::unlinked(100_000);
    f.engine
        .set_countries(&f.owner, &f.issuer, &[country(1), country(2)], &[rating(1), rating(1)], &[100, 100])
        .unwrap();
    f.engine.enable_issuer_kyc(&f.owner, &f.issuer).unwrap();
    let profile = InvestorProfile {
        country: country(1),
        rating: rating(1),
        expiry: ts(FAR_FUTURE),
    };
    for id in ["dave", "erin"] {
        let call = KycCall::AddInvestor {
            id: inv(id),
            profile,
            addresses: vec![addr(id)],
        };
        f.engine.issuer_kyc(&f.owner, &f.issuer, &call).unwrap();
    }
    f.fund("dave", 10);
    f.engine.transfer(&addr("dave"), &f.token, &addr("erin"), 4).unwrap();
    assert_eq!(f.total_investors(), 2);

    let moved = KycCall::UpdateCountry {
        id: inv("dave"),
        country: country(2),
    };
    f.engine.issuer_kyc(&f.owner, &f.issuer, &moved).unwrap();
    assert_eq!(f.engine.country_investor_count(&f.issuer, country(2), None), 1);

    let restrict = KycCall::SetRestricted {
        id: inv("erin"),
        restricted: true,
    };
    f.engine.issuer_kyc(&f.owner, &f.issuer, &restrict).unwrap();
    let err = f
        .engine
        .transfer(&addr("dave"), &f.token, &addr("erin"), 1)
        .unwrap_err();
    assert_eq!(err.denial(), Some(&DenialReason::ReceiverRestricted(addr("erin"))));
}

// ---- locks ----

#[test]
fn test_token_lock_stops_investor_transfers() {
    let mut f = funded_pair();
    f.engine.set_token_restriction(&f.owner, &f.token, true).unwrap();
    let err = f
        .engine
        .transfer(&addr("one"), &f.token, &addr("two"), 10)
        .unwrap_err();
    assert_eq!(err.denial(), Some(&DenialReason::TokenLocked(f.token.clone())));
    f.fund("one", 10);
    assert!(f.engine.mint(&f.module, &f.token, 10).is_err());

    f.engine.set_token_restriction(&f.owner, &f.token, false).unwrap();
    f.engine.transfer(&addr("one"), &f.token, &addr("two"), 10).unwrap();
}

#[test]
fn test_global_lock_stops_investor_transfers() {
    let mut f = funded_pair();
    f.engine.set_global_restriction(&f.owner, &f.issuer, true).unwrap();
    let owner = f.owner.clone();
    let err = f
        .engine
        .transfer(&addr("one"), &f.token, &owner, 10)
        .unwrap_err();
    assert!(matches!(err.denial(), Some(DenialReason::TokenLocked(_))));
    f.fund("one", 10);

    f.engine.set_global_restriction(&f.owner, &f.issuer, false).unwrap();
    f.engine.transfer(&addr("one"), &f.token, &owner, 10).unwrap();
}

// ---- authority transfers ----

#[test]
fn test_authority_transfer_permission() {
    let mut f = funded_pair();
    let operator = f
        .engine
        .add_authority(&f.owner, &f.issuer, &[addr("operator")], &[IssuerAction::Transfer], None, 1)
        .unwrap()
        .executed()
        .unwrap();
    f.engine
        .transfer(&addr("operator"), &f.token, &addr("two"), 10)
        .unwrap();
    assert_eq!(f.treasury(), 100_000 - 1_010);

    f.engine
        .set_authority_permissions(&f.owner, &f.issuer, &operator, &[IssuerAction::Transfer], false)
        .unwrap();
    assert!(matches!(
        f.engine.transfer(&addr("operator"), &f.token, &addr("two"), 10),
        Err(RegtokenError::Authorization(AuthorizationError::NotPermitted { .. }))
    ));
}

#[test]
fn test_restricted_authority_address_cannot_send() {
    let mut f = funded_pair();
    let owner_id = f.engine.issuer(&f.issuer).unwrap().multisig().owner_id().clone();
    f.engine
        .add_authority_addresses(&f.owner, &f.issuer, &owner_id, &[addr("owner-2")])
        .unwrap();
    f.engine.transfer(&addr("owner-2"), &f.token, &addr("one"), 1).unwrap();
    f.engine
        .restrict_authority_addresses(&f.owner, &f.issuer, &owner_id, &[addr("owner-2")])
        .unwrap();
    assert_eq!(
        f.engine
            .transfer(&addr("owner-2"), &f.token, &addr("one"), 1)
            .unwrap_err(),
        AuthorizationError::RestrictedCaller(addr("owner-2")).into()
    );
}

// ---- transfer_from ----

#[test]
fn test_transfer_from_consumes_allowance() {
    let mut f = funded_pair();
    f.engine.approve(&addr("one"), &f.token, &addr("spender"), 500).unwrap();
    assert_eq!(f.engine.allowance(&f.token, &addr("one"), &addr("spender")).unwrap(), 500);

    f.engine
        .transfer_from(&addr("spender"), &f.token, &addr("one"), &addr("two"), 400)
        .unwrap();
    assert_eq!(f.engine.allowance(&f.token, &addr("one"), &addr("spender")).unwrap(), 100);
    f.engine
        .transfer_from(&addr("spender"), &f.token, &addr("one"), &addr("two"), 100)
        .unwrap();
    assert_eq!(f.engine.allowance(&f.token, &addr("one"), &addr("spender")).unwrap(), 0);
    assert_untouched(&f, 500, 500, 2);
}

#[test]
fn test_transfer_from_insufficient_allowance() {
    let mut f = funded_pair();
    let err = f
        .engine
        .transfer_from(&addr("spender"), &f.token, &addr("one"), &addr("two"), 1_000)
        .unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&DenialReason::InsufficientAllowance {
            available: 0,
            requested: 1_000
        })
    );
    f.engine.approve(&addr("one"), &f.token, &addr("spender"), 500).unwrap();
    assert!(f
        .engine
        .transfer_from(&addr("spender"), &f.token, &addr("one"), &addr("two"), 1_000)
        .is_err());
    assert_eq!(f.engine.allowance(&f.token, &addr("one"), &addr("spender")).unwrap(), 500);
}

#[test]
fn test_transfer_from_same_investor_needs_no_allowance() {
    let mut f = funded_pair();
    let owner = f.kyc_owner.clone();
    let kyc = f.kyc.clone();
    f.engine
        .registrar_mut(&kyc)
        .unwrap()
        .register_addresses(&owner, ts(START), &inv("investor-1"), &[addr("one-b")])
        .unwrap();
    f.engine
        .transfer_from(&addr("one-b"), &f.token, &addr("one"), &addr("two"), 500)
        .unwrap();
    assert_untouched(&f, 500, 500, 2);
}

#[test]
fn test_issuer_transfer_from() {
    let mut f = funded_pair();
    let owner = f.owner.clone();
    f.engine
        .transfer_from(&owner, &f.token, &addr("one"), &addr("two"), 1_000)
        .unwrap();
    assert_untouched(&f, 0, 1_000, 1);
}

#[test]
fn test_authority_transfer_from_permission() {
    let mut f = funded_pair();
    let agent = f
        .engine
        .add_authority(
            &f.owner,
            &f.issuer,
            &[addr("agent")],
            &[IssuerAction::TransferFrom],
            Some(ts(FAR_FUTURE)),
            1,
        )
        .unwrap()
        .executed()
        .unwrap();
    f.engine
        .transfer_from(&addr("agent"), &f.token, &addr("one"), &addr("two"), 500)
        .unwrap();
    f.engine
        .set_authority_permissions(&f.owner, &f.issuer, &agent, &[IssuerAction::TransferFrom], false)
        .unwrap();
    assert!(matches!(
        f.engine
            .transfer_from(&addr("agent"), &f.token, &addr("one"), &addr("two"), 500),
        Err(RegtokenError::Authorization(AuthorizationError::NotPermitted { .. }))
    ));
}
