//! # Issuer Administration
//!
//! Every mutation here is multisig gated on the issuer's authorities:
//!
//! ```text
//! authorize(caller, action) ─▶ validate ─▶ gate(digest of action + args)
//!     ├─ Pending  ─▶ return, nothing applied
//!     └─ Executed ─▶ apply
//! ```
//!
//! Validation runs before the signature is recorded, so a call that could
//! never apply does not collect signatures. Signatures on different
//! arguments accumulate separately.

use serde::Serialize;

use regtoken_core::{
    Address, Approval, AuthorityId, Clock, CountryCode, DuplicateError, InvestorId, IssuerId,
    NotFoundError, Rating, RegistrarId, Timestamp, TokenId,
};
use regtoken_policy::country::check_lengths;
use regtoken_policy::InvestorLimits;

use crate::compliance::Holdings;
use crate::engine::{Engine, Result};
use crate::issuer::IssuerAction;
use crate::token::Token;

impl<C: Clock> Engine<C> {
    fn authorize(&self, caller: &Address, issuer: &IssuerId, action: IssuerAction) -> Result<AuthorityId> {
        self.issuer(issuer)?.authorize(caller, self.now(), action)
    }

    fn sign<A: Serialize>(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        action: IssuerAction,
        args: &A,
    ) -> Result<Approval<()>> {
        let now = self.now();
        self.issuer_mut(issuer)?.gate(caller, now, action, args)
    }

    fn token_issuer(&self, token: &TokenId) -> Result<IssuerId> {
        Ok(self.ledger.token(token)?.issuer().clone())
    }

    /// Authority addresses settle against the treasury. They must not be
    /// the treasury itself, hold a pinned balance, or belong to an investor
    /// at any linked registrar.
    fn check_authority_addresses(&self, issuer: &IssuerId, addresses: &[Address]) -> Result<()> {
        let issuer_state = self.issuer(issuer)?;
        let treasury = issuer_state.treasury();
        let book = self.ledger.book(issuer);
        let registrars = self.linked_registrars(issuer_state);
        for address in addresses {
            if address == treasury {
                return Err(DuplicateError::AddressBound {
                    address: address.clone(),
                    owner: "treasury".to_string(),
                }
                .into());
            }
            let investor = book
                .pinned_investor(address)
                .or_else(|| registrars.iter().find_map(|r| r.investor_id(address)));
            if let Some(investor) = investor {
                return Err(DuplicateError::AddressBound {
                    address: address.clone(),
                    owner: investor.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    // ─── Registrar links ─────────────────────────────────────────────

    /// Trust an existing registrar. Linked registrars are OR-combined in
    /// link order.
    pub fn add_registrar(&mut self, caller: &Address, issuer: &IssuerId, registrar: &RegistrarId) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageRegistrars)?;
        if !self.registrars.contains_key(registrar) {
            return Err(NotFoundError::Registrar(registrar.clone()).into());
        }
        if self.issuer(issuer)?.registrars().contains(registrar) {
            return Err(DuplicateError::Registrar(registrar.clone()).into());
        }
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageRegistrars, &("link", registrar))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?.link_registrar(registrar);
        tracing::info!(issuer = %issuer, registrar = %registrar, "registrar linked");
        Ok(Approval::Executed(()))
    }

    /// Stop trusting a registrar.
    pub fn remove_registrar(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        registrar: &RegistrarId,
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageRegistrars)?;
        if !self.issuer(issuer)?.registrars().contains(registrar) {
            return Err(NotFoundError::Registrar(registrar.clone()).into());
        }
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageRegistrars, &("unlink", registrar))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?.unlink_registrar(registrar);
        tracing::info!(issuer = %issuer, registrar = %registrar, "registrar unlinked");
        Ok(Approval::Executed(()))
    }

    // ─── Country policy ──────────────────────────────────────────────

    /// Replace the policies of several countries, marking each permitted.
    /// Lowering a limit never evicts existing holders.
    pub fn set_countries(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        countries: &[CountryCode],
        min_ratings: &[Rating],
        limits: &[u64],
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::SetCountries)?;
        check_lengths(countries.len(), min_ratings.len(), limits.len())?;
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::SetCountries, &(countries, min_ratings, limits))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.policy.set_countries(issuer, countries, min_ratings, limits)?;
        Ok(Approval::Executed(()))
    }

    /// Allow or disallow countries without changing their limits.
    pub fn set_country_permitted(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        countries: &[CountryCode],
        permitted: bool,
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::SetCountries)?;
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::SetCountries, &("permit", countries, permitted))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.policy.set_country_permitted(issuer, countries, permitted);
        Ok(Approval::Executed(()))
    }

    /// Set (`Some`) or clear (`None`) the cap on one rating within a
    /// country.
    pub fn set_country_rating_limit(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        country: CountryCode,
        rating: Rating,
        limit: Option<u64>,
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::SetLimits)?;
        if self.policy.policy(issuer, country).is_none() {
            return Err(NotFoundError::CountryPolicy {
                issuer: issuer.clone(),
                country,
            }
            .into());
        }
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::SetLimits, &(country, rating, limit))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.policy.set_country_rating_limit(issuer, country, rating, limit)?;
        Ok(Approval::Executed(()))
    }

    /// Replace the issuer-wide investor limits.
    pub fn set_investor_limits(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        limits: InvestorLimits,
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::SetLimits)?;
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::SetLimits, &limits)?
            .into_pending()
        {
            return Ok(pending);
        }
        self.policy.set_investor_limits(issuer, limits);
        Ok(Approval::Executed(()))
    }

    // ─── Tokens ──────────────────────────────────────────────────────

    /// Create a token whose initial supply is held by the treasury. The
    /// token id is `<issuer>.<symbol>`.
    pub fn add_token(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        name: &str,
        symbol: &str,
        initial_supply: u64,
    ) -> Result<Approval<TokenId>> {
        self.authorize(caller, issuer, IssuerAction::AddToken)?;
        let id = TokenId::new(format!("{issuer}.{symbol}"))?;
        if self.ledger.has_token(&id) {
            return Err(DuplicateError::Token(id).into());
        }
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::AddToken, &(name, symbol, initial_supply))?
            .into_pending()
        {
            return Ok(pending);
        }
        let treasury = self.issuer(issuer)?.treasury().clone();
        self.ledger.add_token(Token::new(
            id.clone(),
            issuer.clone(),
            name,
            symbol,
            &treasury,
            initial_supply,
        ))?;
        tracing::info!(issuer = %issuer, token = %id, initial_supply, "token added");
        Ok(Approval::Executed(id))
    }

    /// Cap future minting. The cap cannot go below the current supply.
    pub fn modify_authorized_supply(
        &mut self,
        caller: &Address,
        token: &TokenId,
        authorized: u64,
    ) -> Result<Approval<()>> {
        let issuer = self.token_issuer(token)?;
        self.authorize(caller, &issuer, IssuerAction::ModifySupply)?;
        self.ledger.token(token)?.check_authorized_supply(authorized)?;
        if let Some(pending) = self
            .sign(caller, &issuer, IssuerAction::ModifySupply, &(token, authorized))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.ledger.token_mut(token)?.set_authorized_supply(authorized);
        tracing::info!(token = %token, authorized, "authorized supply modified");
        Ok(Approval::Executed(()))
    }

    // ─── Modules ─────────────────────────────────────────────────────

    /// Attach a module. Re-attaching an attached module changes nothing.
    pub fn attach_module(&mut self, caller: &Address, issuer: &IssuerId, module: &Address) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageModules)?;
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageModules, &("attach", module))?
            .into_pending()
        {
            return Ok(pending);
        }
        if self.modules.attach(issuer, module) {
            tracing::info!(issuer = %issuer, module = %module, "module attached");
        }
        Ok(Approval::Executed(()))
    }

    /// Detach a module. Its next privileged call fails.
    pub fn detach_module(&mut self, caller: &Address, issuer: &IssuerId, module: &Address) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageModules)?;
        self.modules.check_detach(issuer, module)?;
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageModules, &("detach", module))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.modules.detach(issuer, module)?;
        tracing::info!(issuer = %issuer, module = %module, "module detached");
        Ok(Approval::Executed(()))
    }

    // ─── Restrictions ────────────────────────────────────────────────

    /// Block or unblock an investor across every token of the issuer,
    /// independently of KYC.
    pub fn set_entity_restriction(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        investor: &InvestorId,
        blocked: bool,
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::Restrict)?;
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::Restrict, &("entity", investor, blocked))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?.set_blocked(investor, blocked);
        tracing::info!(issuer = %issuer, investor = %investor, blocked, "entity restriction set");
        Ok(Approval::Executed(()))
    }

    /// Lock or unlock one token.
    pub fn set_token_restriction(&mut self, caller: &Address, token: &TokenId, locked: bool) -> Result<Approval<()>> {
        let issuer = self.token_issuer(token)?;
        self.authorize(caller, &issuer, IssuerAction::Restrict)?;
        if let Some(pending) = self
            .sign(caller, &issuer, IssuerAction::Restrict, &("token", token, locked))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.ledger.token_mut(token)?.set_locked(locked);
        tracing::info!(token = %token, locked, "token restriction set");
        Ok(Approval::Executed(()))
    }

    /// Lock or unlock every token of the issuer.
    pub fn set_global_restriction(&mut self, caller: &Address, issuer: &IssuerId, locked: bool) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::Restrict)?;
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::Restrict, &("global", locked))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?.set_global_lock(locked);
        tracing::info!(issuer = %issuer, locked, "global restriction set");
        Ok(Approval::Executed(()))
    }

    // ─── Authorities ─────────────────────────────────────────────────

    /// Add an operator authority with the given permissions. Owner only.
    pub fn add_authority(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        addresses: &[Address],
        permissions: &[IssuerAction],
        approved_until: Option<Timestamp>,
        threshold: u32,
    ) -> Result<Approval<AuthorityId>> {
        self.authorize(caller, issuer, IssuerAction::ManageAuthorities)?;
        self.issuer(issuer)?
            .multisig()
            .check_new_authority(addresses, threshold)?;
        self.check_authority_addresses(issuer, addresses)?;
        let args = ("add", addresses, permissions, approved_until, threshold);
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageAuthorities, &args)?
            .into_pending()
        {
            return Ok(pending);
        }
        let state = self.issuer_mut(issuer)?;
        let id = state
            .multisig_mut()
            .add_authority(addresses, threshold, approved_until)?;
        state.set_permissions(&id, permissions, true);
        tracing::info!(issuer = %issuer, authority = %id, threshold, "issuer authority added");
        Ok(Approval::Executed(id))
    }

    fn require_authority(&self, issuer: &IssuerId, authority: &AuthorityId) -> Result<()> {
        self.issuer(issuer)?
            .multisig()
            .authority(authority)
            .map(|_| ())
            .ok_or_else(|| NotFoundError::Authority(authority.clone()).into())
    }

    /// Grant or revoke actions of a non-owner authority. Owner only.
    pub fn set_authority_permissions(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        authority: &AuthorityId,
        actions: &[IssuerAction],
        allowed: bool,
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageAuthorities)?;
        self.require_authority(issuer, authority)?;
        let args = ("permissions", authority, actions, allowed);
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageAuthorities, &args)?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?
            .set_permissions(authority, actions, allowed);
        tracing::info!(issuer = %issuer, authority = %authority, allowed, "authority permissions set");
        Ok(Approval::Executed(()))
    }

    /// Change an authority's signature threshold. Owner only.
    pub fn set_authority_threshold(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        authority: &AuthorityId,
        threshold: u32,
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageAuthorities)?;
        self.issuer(issuer)?
            .multisig()
            .check_threshold(authority, threshold)?;
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageAuthorities, &("threshold", authority, threshold))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?
            .multisig_mut()
            .set_threshold(authority, threshold)?;
        tracing::info!(issuer = %issuer, authority = %authority, threshold, "authority threshold set");
        Ok(Approval::Executed(()))
    }

    /// Set or clear the end of an authority's approval window. Owner only.
    pub fn set_authority_approval(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        authority: &AuthorityId,
        approved_until: Option<Timestamp>,
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageAuthorities)?;
        self.require_authority(issuer, authority)?;
        let args = ("approval", authority, approved_until);
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageAuthorities, &args)?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?
            .multisig_mut()
            .set_approved_until(authority, approved_until)?;
        tracing::info!(issuer = %issuer, authority = %authority, ?approved_until, "authority approval window set");
        Ok(Approval::Executed(()))
    }

    /// Restrict or re-enable a non-owner authority. Owner only.
    pub fn set_authority_restriction(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        authority: &AuthorityId,
        restricted: bool,
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageAuthorities)?;
        self.issuer(issuer)?
            .multisig()
            .check_restriction(authority)?;
        let args = ("restriction", authority, restricted);
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageAuthorities, &args)?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?
            .multisig_mut()
            .set_restricted(authority, restricted)?;
        tracing::info!(issuer = %issuer, authority = %authority, restricted, "authority restriction set");
        Ok(Approval::Executed(()))
    }

    /// Add signing addresses to an authority. Owner only.
    pub fn add_authority_addresses(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        authority: &AuthorityId,
        addresses: &[Address],
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageAuthorities)?;
        self.issuer(issuer)?
            .multisig()
            .check_add_addresses(authority, addresses)?;
        self.check_authority_addresses(issuer, addresses)?;
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageAuthorities, &("add_addresses", authority, addresses))?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?
            .multisig_mut()
            .add_addresses(authority, addresses)?;
        tracing::info!(issuer = %issuer, authority = %authority, count = addresses.len(), "authority addresses added");
        Ok(Approval::Executed(()))
    }

    /// Restrict signing addresses of an authority. Owner only.
    pub fn restrict_authority_addresses(
        &mut self,
        caller: &Address,
        issuer: &IssuerId,
        authority: &AuthorityId,
        addresses: &[Address],
    ) -> Result<Approval<()>> {
        self.authorize(caller, issuer, IssuerAction::ManageAuthorities)?;
        self.issuer(issuer)?
            .multisig()
            .check_restrict_addresses(authority, addresses)?;
        let args = ("restrict_addresses", authority, addresses);
        if let Some(pending) = self
            .sign(caller, issuer, IssuerAction::ManageAuthorities, &args)?
            .into_pending()
        {
            return Ok(pending);
        }
        self.issuer_mut(issuer)?
            .multisig_mut()
            .restrict_addresses(authority, addresses)?;
        tracing::info!(issuer = %issuer, authority = %authority, count = addresses.len(), "authority addresses restricted");
        Ok(Approval::Executed(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regtoken_core::{AuthorizationError, FixedClock, RegtokenError, ValidationError};

    fn addr(label: &str) -> Address {
        Address::derive(label)
    }

    fn setup(owners: &[&str], threshold: u32) -> (Engine<FixedClock>, IssuerId) {
        let mut engine = Engine::with_clock(FixedClock::at_epoch(1_000).unwrap());
        let owners: Vec<Address> = owners.iter().map(|o| addr(o)).collect();
        let issuer = engine.create_issuer(&owners, threshold).unwrap();
        (engine, issuer)
    }

    fn country(c: u16) -> CountryCode {
        CountryCode::new(c).unwrap()
    }

    fn rating(r: u8) -> Rating {
        Rating::new(r).unwrap()
    }

    // ---- multisig gating ----

    #[test]
    fn test_pending_until_threshold() {
        let (mut e, issuer) = setup(&["o1", "o2"], 2);
        let first = e
            .set_countries(&addr("o1"), &issuer, &[country(1)], &[rating(1)], &[10])
            .unwrap();
        assert_eq!(first, Approval::Pending { signatures: 1, threshold: 2 });
        assert!(e.policy().policy(&issuer, country(1)).is_none());

        let second = e
            .set_countries(&addr("o2"), &issuer, &[country(1)], &[rating(1)], &[10])
            .unwrap();
        assert!(second.is_executed());
        assert_eq!(e.country_investor_limit(&issuer, country(1)), 10);
    }

    #[test]
    fn test_invalid_call_collects_no_signature() {
        let (mut e, issuer) = setup(&["o1", "o2"], 2);
        let err = e
            .set_countries(&addr("o1"), &issuer, &[country(1)], &[], &[10])
            .unwrap_err();
        assert!(matches!(err, RegtokenError::Validation(ValidationError::LengthMismatch { .. })));
        let pending = e
            .set_countries(&addr("o1"), &issuer, &[country(1)], &[rating(1)], &[10])
            .unwrap();
        assert_eq!(pending, Approval::Pending { signatures: 1, threshold: 2 });
    }

    #[test]
    fn test_stranger_cannot_administer() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let err = e
            .set_global_restriction(&addr("stranger"), &issuer, true)
            .unwrap_err();
        assert_eq!(err, AuthorizationError::UnknownCaller(addr("stranger")).into());
    }

    // ---- registrars ----

    #[test]
    fn test_add_registrar_requires_existing_and_unlinked() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let kyc = RegistrarId::new("kyc").unwrap();
        assert!(matches!(
            e.add_registrar(&addr("owner"), &issuer, &kyc),
            Err(RegtokenError::NotFound(NotFoundError::Registrar(_)))
        ));
        e.create_registrar(kyc.clone(), &[addr("kyc-owner")], 1).unwrap();
        assert!(e.add_registrar(&addr("owner"), &issuer, &kyc).unwrap().is_executed());
        assert_eq!(
            e.add_registrar(&addr("owner"), &issuer, &kyc).unwrap_err(),
            DuplicateError::Registrar(kyc.clone()).into()
        );
        e.remove_registrar(&addr("owner"), &issuer, &kyc).unwrap();
        assert!(e.issuer(&issuer).unwrap().registrars().is_empty());
    }

    // ---- tokens ----

    #[test]
    fn test_add_token_credits_treasury() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let token = e
            .add_token(&addr("owner"), &issuer, "Fund", "FND", 1_000)
            .unwrap()
            .executed()
            .unwrap();
        assert_eq!(token.as_str(), format!("{issuer}.FND"));
        assert_eq!(e.treasury_supply(&token).unwrap(), 1_000);
        assert_eq!(e.total_supply(&token).unwrap(), 1_000);
        assert_eq!(e.authorized_supply(&token).unwrap(), None);
        assert_eq!(
            e.add_token(&addr("owner"), &issuer, "Fund", "FND", 1).unwrap_err(),
            DuplicateError::Token(token).into()
        );
    }

    #[test]
    fn test_authorized_supply_not_below_total() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let token = e
            .add_token(&addr("owner"), &issuer, "Fund", "FND", 1_000)
            .unwrap()
            .executed()
            .unwrap();
        assert!(matches!(
            e.modify_authorized_supply(&addr("owner"), &token, 999),
            Err(RegtokenError::Validation(ValidationError::AuthorizedBelowTotal { .. }))
        ));
        e.modify_authorized_supply(&addr("owner"), &token, 5_000).unwrap();
        assert_eq!(e.authorized_supply(&token).unwrap(), Some(5_000));
    }

    // ---- modules ----

    #[test]
    fn test_attach_is_idempotent_and_detach_checked() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let module = addr("mint-burn");
        e.attach_module(&addr("owner"), &issuer, &module).unwrap();
        e.attach_module(&addr("owner"), &issuer, &module).unwrap();
        assert_eq!(e.attached_modules(&issuer), vec![module.clone()]);
        e.detach_module(&addr("owner"), &issuer, &module).unwrap();
        assert!(matches!(
            e.detach_module(&addr("owner"), &issuer, &module),
            Err(RegtokenError::NotFound(NotFoundError::Module { .. }))
        ));
    }

    // ---- authorities ----

    #[test]
    fn test_operator_limited_to_granted_actions() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let operator = e
            .add_authority(&addr("owner"), &issuer, &[addr("op")], &[IssuerAction::SetCountries], None, 1)
            .unwrap()
            .executed()
            .unwrap();

        e.set_countries(&addr("op"), &issuer, &[country(2)], &[rating(1)], &[5])
            .unwrap();
        assert!(matches!(
            e.set_global_restriction(&addr("op"), &issuer, true),
            Err(RegtokenError::Authorization(AuthorizationError::NotPermitted { .. }))
        ));
        assert_eq!(
            e.add_authority(&addr("op"), &issuer, &[addr("x")], &[], None, 1)
                .unwrap_err(),
            AuthorizationError::NotOwner(addr("op")).into()
        );

        e.set_authority_permissions(&addr("owner"), &issuer, &operator, &[IssuerAction::Restrict], true)
            .unwrap();
        assert!(e.set_global_restriction(&addr("op"), &issuer, true).is_ok());
    }

    #[test]
    fn test_operator_approval_window() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let until = Timestamp::from_epoch_secs(1_100).unwrap();
        e.add_authority(&addr("owner"), &issuer, &[addr("op")], &[IssuerAction::SetLimits], Some(until), 1)
            .unwrap();
        e.set_investor_limits(&addr("op"), &issuer, InvestorLimits::default())
            .unwrap();
        e.clock().advance(100);
        assert!(matches!(
            e.set_investor_limits(&addr("op"), &issuer, InvestorLimits::default()),
            Err(RegtokenError::Authorization(AuthorizationError::AuthorityExpired(_)))
        ));
    }

    #[test]
    fn test_owner_cannot_be_restricted() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let owner = e.issuer(&issuer).unwrap().multisig().owner_id().clone();
        assert_eq!(
            e.set_authority_restriction(&addr("owner"), &issuer, &owner, true)
                .unwrap_err(),
            AuthorizationError::OwnerRestriction(owner).into()
        );
    }

    #[test]
    fn test_treasury_cannot_become_authority_address() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let treasury = e.issuer(&issuer).unwrap().treasury().clone();
        assert!(matches!(
            e.add_authority(&addr("owner"), &issuer, &[treasury], &[], None, 1),
            Err(RegtokenError::Duplicate(DuplicateError::AddressBound { .. }))
        ));
    }

    #[test]
    fn test_registered_investor_cannot_become_authority_address() {
        let (mut e, issuer) = setup(&["owner"], 1);
        let kyc = RegistrarId::new("kyc").unwrap();
        e.create_registrar(kyc.clone(), &[addr("kyc-owner")], 1).unwrap();
        let profile = regtoken_kyc::InvestorProfile {
            country: country(1),
            rating: rating(1),
            expiry: Timestamp::from_epoch_secs(2_000_000_000).unwrap(),
        };
        let alice = InvestorId::new("alice").unwrap();
        e.add_investor(&addr("kyc-owner"), &kyc, &alice, profile, &[addr("alice")])
            .unwrap();

        // Not yet linked: the registrar's bindings are not the issuer's concern.
        e.add_authority(&addr("owner"), &issuer, &[addr("ops")], &[], None, 1)
            .unwrap();
        e.add_registrar(&addr("owner"), &issuer, &kyc).unwrap();

        let expected = DuplicateError::AddressBound {
            address: addr("alice"),
            owner: alice.to_string(),
        };
        assert_eq!(
            e.add_authority(&addr("owner"), &issuer, &[addr("alice")], &[], None, 1)
                .unwrap_err(),
            expected.clone().into()
        );
        let owner = e.issuer(&issuer).unwrap().multisig().owner_id().clone();
        assert_eq!(
            e.add_authority_addresses(&addr("owner"), &issuer, &owner, &[addr("alice")])
                .unwrap_err(),
            expected.into()
        );
        assert!(!e.issuer(&issuer).unwrap().is_authority_address(&addr("alice")));
    }
}
