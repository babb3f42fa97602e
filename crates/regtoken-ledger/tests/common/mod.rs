//! Shared fixture for the ledger integration tests.

#![allow(dead_code)]

use regtoken_core::{
    Address, CountryCode, FixedClock, InvestorId, IssuerId, Rating, RegistrarId, Timestamp, TokenId,
};
use regtoken_kyc::InvestorProfile;
use regtoken_ledger::{Engine, TransferReceipt};

pub const START: i64 = 1_000;
pub const FAR_FUTURE: i64 = 2_000_000_000;

pub fn addr(label: &str) -> Address {
    Address::derive(label)
}

pub fn inv(id: &str) -> InvestorId {
    InvestorId::new(id).unwrap()
}

pub fn country(c: u16) -> CountryCode {
    CountryCode::new(c).unwrap()
}

pub fn rating(r: u8) -> Rating {
    Rating::new(r).unwrap()
}

pub fn ts(secs: i64) -> Timestamp {
    Timestamp::from_epoch_secs(secs).unwrap()
}

/// One issuer with one token, one KYC registrar and one attached module.
pub struct Fixture {
    pub engine: Engine<FixedClock>,
    pub owner: Address,
    pub issuer: IssuerId,
    pub kyc: RegistrarId,
    pub kyc_owner: Address,
    pub token: TokenId,
    pub module: Address,
}

impl Fixture {
    /// Country 1 permitted with minimum rating 1 and room for 100
    /// investors; the registrar is linked.
    pub fn new(initial_supply: u64) -> Self {
        let mut fixture = Self::unlinked(initial_supply);
        fixture
            .engine
            .add_registrar(&fixture.owner, &fixture.issuer, &fixture.kyc)
            .unwrap();
        fixture
    }

    /// As [`Fixture::new`] but without linking the registrar.
    pub fn unlinked(initial_supply: u64) -> Self {
        let mut engine = Engine::with_clock(FixedClock::at_epoch(START).unwrap());
        let owner = addr("issuer-owner");
        let issuer = engine.create_issuer(&[owner.clone()], 1).unwrap();

        let kyc = RegistrarId::new("kyc").unwrap();
        let kyc_owner = addr("kyc-owner");
        engine.create_registrar(kyc.clone(), &[kyc_owner.clone()], 1).unwrap();

        engine
            .set_countries(&owner, &issuer, &[country(1)], &[rating(1)], &[100])
            .unwrap();
        let token = engine
            .add_token(&owner, &issuer, "Security", "SEC", initial_supply)
            .unwrap()
            .executed()
            .unwrap();
        let module = addr("mint-burn-module");
        engine.attach_module(&owner, &issuer, &module).unwrap();

        Self {
            engine,
            owner,
            issuer,
            kyc,
            kyc_owner,
            token,
            module,
        }
    }

    /// Register an investor whose addresses are the given labels.
    pub fn enrol(&mut self, id: &str, c: u16, r: u8, expiry: i64, labels: &[&str]) {
        let addresses: Vec<Address> = labels.iter().map(|l| addr(l)).collect();
        self.engine
            .add_investor(
                &self.kyc_owner,
                &self.kyc,
                &inv(id),
                InvestorProfile {
                    country: country(c),
                    rating: rating(r),
                    expiry: ts(expiry),
                },
                &addresses,
            )
            .unwrap();
    }

    /// Treasury to `label`, initiated by the issuer owner.
    pub fn fund(&mut self, label: &str, amount: u64) -> TransferReceipt {
        self.engine
            .transfer(&self.owner, &self.token, &addr(label), amount)
            .unwrap()
    }

    pub fn balance(&self, label: &str) -> u64 {
        self.engine.balance_of(&self.token, &addr(label)).unwrap()
    }

    pub fn treasury(&self) -> u64 {
        self.engine.treasury_supply(&self.token).unwrap()
    }

    pub fn total_investors(&self) -> u64 {
        self.engine.total_investors(&self.issuer)
    }

    pub fn set_limit(&mut self, limit: u64) {
        self.engine
            .set_countries(&self.owner, &self.issuer, &[country(1)], &[rating(1)], &[limit])
            .unwrap();
    }
}
