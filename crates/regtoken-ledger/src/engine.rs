//! # Engine
//!
//! The facade over every store. Registrars, issuers, policy, modules and
//! the ledger are owned fields, so several issuers coexist with isolated
//! state and every test starts from a fresh engine.
//!
//! Each `&mut self` method is one indivisible step: it validates, decides,
//! and then either commits fully or returns an error with nothing written.
//! Time comes from the injected [`Clock`].
//!
//! Issuer administration lives in `admin.rs`; balance-moving operations in
//! `transfer.rs`.

use std::collections::BTreeMap;

use regtoken_core::{
    Address, Approval, Clock, CountryCode, DuplicateError, InvestorId, IssuerId, NotFoundError,
    Rating, RegistrarId, RegtokenError, SystemClock, Timestamp, TokenId,
};
use regtoken_kyc::{InvestorProfile, KycRegistrar, KycStatus};
use regtoken_policy::{Classification, CounterSnapshot, CountryInfo, InvestorLimits, PolicyStore};

use crate::compliance::resolve_status;
use crate::issuer::Issuer;
use crate::ledger::Ledger;
use crate::modules::ModuleRegistry;
use crate::token::TokenInfo;

pub(crate) type Result<T> = std::result::Result<T, RegtokenError>;

/// The compliance-gated ledger.
#[derive(Debug)]
pub struct Engine<C: Clock = SystemClock> {
    clock: C,
    pub(crate) registrars: BTreeMap<RegistrarId, KycRegistrar>,
    pub(crate) issuers: BTreeMap<IssuerId, Issuer>,
    pub(crate) policy: PolicyStore,
    pub(crate) modules: ModuleRegistry,
    pub(crate) ledger: Ledger,
}

impl Engine<SystemClock> {
    /// An engine reading wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Engine<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Engine<C> {
    /// An engine reading time from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            registrars: BTreeMap::new(),
            issuers: BTreeMap::new(),
            policy: PolicyStore::new(),
            modules: ModuleRegistry::new(),
            ledger: Ledger::new(),
        }
    }

    /// Current verification time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The injected clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ─── Registrars ──────────────────────────────────────────────────

    /// Create a registrar administered by `owners`.
    pub fn create_registrar(&mut self, id: RegistrarId, owners: &[Address], threshold: u32) -> Result<()> {
        if self.registrars.contains_key(&id) {
            return Err(DuplicateError::Registrar(id).into());
        }
        let registrar = KycRegistrar::new(id.clone(), owners, threshold)?;
        tracing::info!(registrar = %id, threshold, "registrar created");
        self.registrars.insert(id, registrar);
        Ok(())
    }

    /// Look up a registrar.
    pub fn registrar(&self, id: &RegistrarId) -> Result<&KycRegistrar> {
        self.registrars
            .get(id)
            .ok_or_else(|| NotFoundError::Registrar(id.clone()).into())
    }

    /// Mutable access for registrar administration beyond the shortcuts
    /// below. Record changes made here reach issuer counters only on the
    /// holder's next transfer; the investor shortcuts apply them at once.
    pub fn registrar_mut(&mut self, id: &RegistrarId) -> Result<&mut KycRegistrar> {
        self.registrars
            .get_mut(id)
            .ok_or_else(|| NotFoundError::Registrar(id.clone()).into())
    }

    /// Create or update an investor record at a registrar.
    pub fn add_investor(
        &mut self,
        caller: &Address,
        registrar: &RegistrarId,
        id: &InvestorId,
        profile: InvestorProfile,
        addresses: &[Address],
    ) -> Result<Approval<()>> {
        let now = self.now();
        let approval = self
            .registrar_mut(registrar)?
            .add_investor(caller, now, id, profile, addresses)?;
        self.follow_reclassification(registrar, id, &approval)?;
        Ok(approval)
    }

    /// Restrict or unrestrict an investor record at a registrar.
    pub fn set_restricted(
        &mut self,
        caller: &Address,
        registrar: &RegistrarId,
        id: &InvestorId,
        restricted: bool,
    ) -> Result<Approval<()>> {
        let now = self.now();
        self.registrar_mut(registrar)?
            .set_restricted(caller, now, id, restricted)
    }

    /// Change an investor's rating at a registrar.
    pub fn update_rating(
        &mut self,
        caller: &Address,
        registrar: &RegistrarId,
        id: &InvestorId,
        rating: Rating,
    ) -> Result<Approval<()>> {
        let now = self.now();
        let approval = self.registrar_mut(registrar)?.update_rating(caller, now, id, rating)?;
        self.follow_reclassification(registrar, id, &approval)?;
        Ok(approval)
    }

    /// Change an investor's country at a registrar.
    pub fn update_country(
        &mut self,
        caller: &Address,
        registrar: &RegistrarId,
        id: &InvestorId,
        country: CountryCode,
    ) -> Result<Approval<()>> {
        let now = self.now();
        let approval = self.registrar_mut(registrar)?.update_country(caller, now, id, country)?;
        self.follow_reclassification(registrar, id, &approval)?;
        Ok(approval)
    }

    /// Change an investor's expiry at a registrar.
    pub fn update_expiry(
        &mut self,
        caller: &Address,
        registrar: &RegistrarId,
        id: &InvestorId,
        expiry: Timestamp,
    ) -> Result<Approval<()>> {
        let now = self.now();
        self.registrar_mut(registrar)?
            .update_expiry(caller, now, id, expiry)
    }

    /// After an executed registrar write, move the investor to their new
    /// bucket at every issuer that links the registrar and counts them.
    pub(crate) fn follow_reclassification(
        &mut self,
        registrar: &RegistrarId,
        investor: &InvestorId,
        approval: &Approval<()>,
    ) -> Result<()> {
        if !approval.is_executed() {
            return Ok(());
        }
        let moves: Vec<(IssuerId, Classification)> = self
            .issuers
            .values()
            .filter(|issuer| issuer.registrars().contains(registrar))
            .filter(|issuer| self.policy.classification(issuer.id(), investor).is_some())
            .filter_map(|issuer| {
                let record = self
                    .linked_registrars(issuer)
                    .into_iter()
                    .find_map(|linked| linked.investor(investor))?;
                let class = Classification {
                    country: record.country,
                    rating: record.rating,
                };
                Some((issuer.id().clone(), class))
            })
            .collect();
        for (issuer, class) in moves {
            self.policy.reclassify(&issuer, investor, class)?;
        }
        Ok(())
    }

    // ─── Issuers ─────────────────────────────────────────────────────

    /// Create an issuer administered by `owners`. Returns its derived id.
    pub fn create_issuer(&mut self, owners: &[Address], threshold: u32) -> Result<IssuerId> {
        let issuer = Issuer::new(owners, threshold)?;
        let id = issuer.id().clone();
        if self.issuers.contains_key(&id) {
            return Err(DuplicateError::Issuer(id).into());
        }
        tracing::info!(issuer = %id, treasury = %issuer.treasury(), threshold, "issuer created");
        self.issuers.insert(id.clone(), issuer);
        Ok(id)
    }

    /// Look up an issuer.
    pub fn issuer(&self, id: &IssuerId) -> Result<&Issuer> {
        self.issuers
            .get(id)
            .ok_or_else(|| NotFoundError::Issuer(id.clone()).into())
    }

    pub(crate) fn issuer_mut(&mut self, id: &IssuerId) -> Result<&mut Issuer> {
        self.issuers
            .get_mut(id)
            .ok_or_else(|| NotFoundError::Issuer(id.clone()).into())
    }

    pub(crate) fn linked_registrars(&self, issuer: &Issuer) -> Vec<&KycRegistrar> {
        issuer
            .registrars()
            .iter()
            .filter_map(|id| self.registrars.get(id))
            .collect()
    }

    /// KYC status of an address as seen by an issuer's linked registrars.
    pub fn kyc_status(&self, issuer: &IssuerId, address: &Address) -> Result<KycStatus> {
        let issuer = self.issuer(issuer)?;
        let registrars = self.linked_registrars(issuer);
        Ok(resolve_status(&registrars, address, self.now()))
    }

    // ─── Policy reads ────────────────────────────────────────────────

    /// Count, limit, minimum rating and permission of a country.
    pub fn country_info(&self, issuer: &IssuerId, country: CountryCode) -> CountryInfo {
        self.policy.country_info(issuer, country)
    }

    /// Investors of a country, optionally narrowed to one rating.
    pub fn country_investor_count(&self, issuer: &IssuerId, country: CountryCode, rating: Option<Rating>) -> u64 {
        self.policy.country_investor_count(issuer, country, rating)
    }

    /// Investor limit of a country.
    pub fn country_investor_limit(&self, issuer: &IssuerId, country: CountryCode) -> u64 {
        self.policy.country_investor_limit(issuer, country)
    }

    /// Distinct investors with a nonzero aggregate balance.
    pub fn total_investors(&self, issuer: &IssuerId) -> u64 {
        self.policy.total_investors(issuer)
    }

    /// Investors of a rating across every country.
    pub fn rating_investor_count(&self, issuer: &IssuerId, rating: Rating) -> u64 {
        self.policy.rating_investor_count(issuer, rating)
    }

    /// Issuer-wide investor limits.
    pub fn investor_limits(&self, issuer: &IssuerId) -> InvestorLimits {
        self.policy.investor_limits(issuer)
    }

    /// Counter snapshot of an issuer.
    pub fn counters(&self, issuer: &IssuerId) -> CounterSnapshot {
        self.policy.counters(issuer)
    }

    /// The policy store.
    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    // ─── Ledger reads ────────────────────────────────────────────────

    /// The ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Balance of an address. Issuer authority addresses always read zero;
    /// their transfers settle against the treasury.
    pub fn balance_of(&self, token: &TokenId, address: &Address) -> Result<u64> {
        Ok(self.ledger.token(token)?.balance_of(address))
    }

    /// Total supply of a token.
    pub fn total_supply(&self, token: &TokenId) -> Result<u64> {
        Ok(self.ledger.token(token)?.total_supply())
    }

    /// Treasury balance of a token.
    pub fn treasury_supply(&self, token: &TokenId) -> Result<u64> {
        let token = self.ledger.token(token)?;
        let issuer = self.issuer(token.issuer())?;
        Ok(token.balance_of(issuer.treasury()))
    }

    /// Minting ceiling of a token.
    pub fn authorized_supply(&self, token: &TokenId) -> Result<Option<u64>> {
        Ok(self.ledger.token(token)?.authorized_supply())
    }

    /// Read model of a token.
    pub fn token_info(&self, token: &TokenId) -> Result<TokenInfo> {
        Ok(self.ledger.token(token)?.info())
    }

    /// Tokens of an issuer.
    pub fn tokens(&self, issuer: &IssuerId) -> Vec<TokenInfo> {
        self.ledger.tokens_of(issuer).map(|t| t.info()).collect()
    }

    /// Remaining allowance granted by `owner` to `spender`.
    pub fn allowance(&self, token: &TokenId, owner: &Address, spender: &Address) -> Result<u64> {
        Ok(self.ledger.token(token)?.allowance(owner, spender))
    }

    /// Aggregate balance of an investor across every token and address of
    /// an issuer.
    pub fn investor_balance(&self, issuer: &IssuerId, investor: &InvestorId) -> u64 {
        self.ledger.investor_balance(issuer, investor)
    }

    // ─── Module reads ────────────────────────────────────────────────

    /// Whether a module is attached to an issuer.
    pub fn is_attached(&self, issuer: &IssuerId, module: &Address) -> bool {
        self.modules.is_attached(issuer, module)
    }

    /// Modules currently attached to an issuer.
    pub fn attached_modules(&self, issuer: &IssuerId) -> Vec<Address> {
        self.modules.attached_modules(issuer)
    }

    /// The module registry.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }
}
