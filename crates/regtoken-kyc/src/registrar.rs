//! # KYC Registrar
//!
//! Stores investor records and address bindings for one registrar, and
//! answers verification queries for the compliance engine.
//!
//! ## Authorization
//!
//! Every mutating call takes the authenticated `caller` and the current
//! time. The call is validated in full, then submitted to the registrar's
//! multisig. Until the caller's authority reaches its threshold on the
//! identical call, the result is [`Approval::Pending`] and nothing changes.
//!
//! | Operation                        | Who may call                         |
//! |----------------------------------|--------------------------------------|
//! | investor and address mutations   | owner, or an authority permitted for the investor's country |
//! | authority administration         | owner only                           |
//! | authority address administration | owner, or the authority itself       |
//!
//! ## Verification
//!
//! An address is verified at `now` iff it is bound, its binding is active,
//! the record is unrestricted, the managing authority is unrestricted, and
//! `now < expiry`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use regtoken_core::{
    action_digest, Address, Approval, Authority, AuthorityId, AuthorizationError, CountryCode,
    DuplicateError, InvestorId, MultiSig, NotFoundError, Rating, RegistrarId, RegtokenError,
    Timestamp, ValidationError,
};

use crate::record::{InvestorProfile, InvestorRecord, KycStatus};

type Result<T> = std::result::Result<T, RegtokenError>;

#[derive(Debug, Clone)]
struct AddressBinding {
    investor: InvestorId,
    active: bool,
}

/// Administrative calls, digested to key pending multisig approvals.
#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RegistrarAction<'a> {
    AddInvestor {
        id: &'a InvestorId,
        profile: &'a InvestorProfile,
        addresses: &'a [Address],
    },
    SetRestricted {
        id: &'a InvestorId,
        restricted: bool,
    },
    UpdateRating {
        id: &'a InvestorId,
        rating: Rating,
    },
    UpdateCountry {
        id: &'a InvestorId,
        country: CountryCode,
    },
    UpdateExpiry {
        id: &'a InvestorId,
        expiry: Timestamp,
    },
    RegisterAddresses {
        id: &'a InvestorId,
        addresses: &'a [Address],
    },
    RestrictAddresses {
        id: &'a InvestorId,
        addresses: &'a [Address],
    },
    SetInvestorAuthority {
        authority: &'a AuthorityId,
        ids: &'a [InvestorId],
    },
    AddAuthority {
        addresses: &'a [Address],
        countries: &'a [CountryCode],
        threshold: u32,
    },
    SetAuthorityThreshold {
        authority: &'a AuthorityId,
        threshold: u32,
    },
    SetAuthorityCountries {
        authority: &'a AuthorityId,
        countries: &'a [CountryCode],
        permitted: bool,
    },
    SetAuthorityRestriction {
        authority: &'a AuthorityId,
        restricted: bool,
    },
    AddAuthorityAddresses {
        authority: &'a AuthorityId,
        addresses: &'a [Address],
    },
    RestrictAuthorityAddresses {
        authority: &'a AuthorityId,
        addresses: &'a [Address],
    },
}

/// An independently administered identity registry.
#[derive(Debug, Clone)]
pub struct KycRegistrar {
    id: RegistrarId,
    multisig: MultiSig,
    countries: BTreeMap<AuthorityId, BTreeSet<CountryCode>>,
    investors: BTreeMap<InvestorId, InvestorRecord>,
    bindings: HashMap<Address, AddressBinding>,
}

impl KycRegistrar {
    /// Create a registrar administered by an owner authority.
    pub fn new(id: RegistrarId, owners: &[Address], threshold: u32) -> Result<Self> {
        Ok(Self {
            id,
            multisig: MultiSig::new(owners, threshold)?,
            countries: BTreeMap::new(),
            investors: BTreeMap::new(),
            bindings: HashMap::new(),
        })
    }

    /// Registrar id.
    pub fn id(&self) -> &RegistrarId {
        &self.id
    }

    /// The owner authority id.
    pub fn owner_authority(&self) -> &AuthorityId {
        self.multisig.owner_id()
    }

    // ─── Investor records ────────────────────────────────────────────

    /// Create or update an investor record and bind `addresses` to it.
    ///
    /// Creating a record requires at least one address. Updating keeps the
    /// record's restriction flag and managing authority.
    pub fn add_investor(
        &mut self,
        caller: &Address,
        now: Timestamp,
        id: &InvestorId,
        profile: InvestorProfile,
        addresses: &[Address],
    ) -> Result<Approval<()>> {
        check_unique(addresses)?;
        let existing_country = self.investors.get(id).map(|r| r.country);
        if existing_country.is_none() && addresses.is_empty() {
            return Err(ValidationError::EmptyAddressSet.into());
        }
        let authority = self.require_country(caller, now, profile.country)?;
        if let Some(country) = existing_country {
            self.require_country(caller, now, country)?;
        }
        self.check_bindable(id, addresses)?;

        let approval = self.gate(
            caller,
            now,
            &RegistrarAction::AddInvestor {
                id,
                profile: &profile,
                addresses,
            },
        )?;
        if !approval.is_executed() {
            return Ok(approval);
        }

        match self.investors.get_mut(id) {
            Some(record) => {
                record.country = profile.country;
                record.rating = profile.rating;
                record.expiry = profile.expiry;
            }
            None => {
                self.investors.insert(
                    id.clone(),
                    InvestorRecord {
                        investor_id: id.clone(),
                        country: profile.country,
                        rating: profile.rating,
                        expiry: profile.expiry,
                        restricted: false,
                        managed_by: authority,
                    },
                );
            }
        }
        self.bind(id, addresses);
        tracing::info!(
            registrar = %self.id,
            investor = %id,
            country = %profile.country,
            rating = %profile.rating,
            expiry = %profile.expiry,
            "investor record written"
        );
        Ok(approval)
    }

    /// Restrict or unrestrict an investor record.
    pub fn set_restricted(
        &mut self,
        caller: &Address,
        now: Timestamp,
        id: &InvestorId,
        restricted: bool,
    ) -> Result<Approval<()>> {
        self.authorize_investor(caller, now, id)?;
        let approval = self.gate(caller, now, &RegistrarAction::SetRestricted { id, restricted })?;
        if approval.is_executed() {
            self.record_mut(id)?.restricted = restricted;
            tracing::info!(registrar = %self.id, investor = %id, restricted, "investor restriction set");
        }
        Ok(approval)
    }

    /// Change an investor's rating.
    pub fn update_rating(
        &mut self,
        caller: &Address,
        now: Timestamp,
        id: &InvestorId,
        rating: Rating,
    ) -> Result<Approval<()>> {
        self.authorize_investor(caller, now, id)?;
        let approval = self.gate(caller, now, &RegistrarAction::UpdateRating { id, rating })?;
        if approval.is_executed() {
            self.record_mut(id)?.rating = rating;
            tracing::info!(registrar = %self.id, investor = %id, rating = %rating, "investor rating updated");
        }
        Ok(approval)
    }

    /// Move an investor to another country. The caller must be permitted
    /// for both the current and the new country.
    pub fn update_country(
        &mut self,
        caller: &Address,
        now: Timestamp,
        id: &InvestorId,
        country: CountryCode,
    ) -> Result<Approval<()>> {
        self.authorize_investor(caller, now, id)?;
        self.require_country(caller, now, country)?;
        let approval = self.gate(caller, now, &RegistrarAction::UpdateCountry { id, country })?;
        if approval.is_executed() {
            self.record_mut(id)?.country = country;
            tracing::info!(registrar = %self.id, investor = %id, country = %country, "investor country updated");
        }
        Ok(approval)
    }

    /// Change an investor's expiry.
    pub fn update_expiry(
        &mut self,
        caller: &Address,
        now: Timestamp,
        id: &InvestorId,
        expiry: Timestamp,
    ) -> Result<Approval<()>> {
        self.authorize_investor(caller, now, id)?;
        let approval = self.gate(caller, now, &RegistrarAction::UpdateExpiry { id, expiry })?;
        if approval.is_executed() {
            self.record_mut(id)?.expiry = expiry;
            tracing::info!(registrar = %self.id, investor = %id, expiry = %expiry, "investor expiry updated");
        }
        Ok(approval)
    }

    /// Bind extra addresses to an existing investor, or re-enable addresses
    /// of that investor restricted earlier.
    pub fn register_addresses(
        &mut self,
        caller: &Address,
        now: Timestamp,
        id: &InvestorId,
        addresses: &[Address],
    ) -> Result<Approval<()>> {
        check_non_empty(addresses)?;
        self.authorize_investor(caller, now, id)?;
        self.check_bindable(id, addresses)?;
        let approval = self.gate(caller, now, &RegistrarAction::RegisterAddresses { id, addresses })?;
        if approval.is_executed() {
            self.bind(id, addresses);
            tracing::info!(registrar = %self.id, investor = %id, count = addresses.len(), "investor addresses registered");
        }
        Ok(approval)
    }

    /// Restrict individual addresses of an investor. The investor's other
    /// addresses are unaffected.
    pub fn restrict_addresses(
        &mut self,
        caller: &Address,
        now: Timestamp,
        id: &InvestorId,
        addresses: &[Address],
    ) -> Result<Approval<()>> {
        check_non_empty(addresses)?;
        self.authorize_investor(caller, now, id)?;
        for address in addresses {
            match self.bindings.get(address) {
                Some(binding) if &binding.investor == id => {
                    if !binding.active {
                        return Err(ValidationError::AlreadyRestricted(address.clone()).into());
                    }
                }
                _ => {
                    return Err(NotFoundError::AddressBinding {
                        address: address.clone(),
                        owner: id.to_string(),
                    }
                    .into())
                }
            }
        }
        let approval = self.gate(caller, now, &RegistrarAction::RestrictAddresses { id, addresses })?;
        if approval.is_executed() {
            for address in addresses {
                if let Some(binding) = self.bindings.get_mut(address) {
                    binding.active = false;
                }
            }
            tracing::info!(registrar = %self.id, investor = %id, count = addresses.len(), "investor addresses restricted");
        }
        Ok(approval)
    }

    /// Reassign the managing authority of a set of investors. Owner only.
    pub fn set_investor_authority(
        &mut self,
        caller: &Address,
        now: Timestamp,
        authority: &AuthorityId,
        ids: &[InvestorId],
    ) -> Result<Approval<()>> {
        self.multisig.require_owner(caller, now)?;
        self.authority_exists(authority)?;
        for id in ids {
            self.record(id)?;
        }
        let approval = self.gate(caller, now, &RegistrarAction::SetInvestorAuthority { authority, ids })?;
        if approval.is_executed() {
            for id in ids {
                self.record_mut(id)?.managed_by = authority.clone();
            }
            tracing::info!(registrar = %self.id, authority = %authority, count = ids.len(), "investor authority reassigned");
        }
        Ok(approval)
    }

    // ─── Authority administration ────────────────────────────────────

    /// Create an authority scoped to `countries`. Owner only.
    pub fn add_authority(
        &mut self,
        caller: &Address,
        now: Timestamp,
        addresses: &[Address],
        countries: &[CountryCode],
        threshold: u32,
    ) -> Result<Approval<AuthorityId>> {
        self.multisig.require_owner(caller, now)?;
        let id = self.multisig.check_new_authority(addresses, threshold)?;
        self.check_not_investor_bound(addresses)?;
        let approval = self.gate(
            caller,
            now,
            &RegistrarAction::AddAuthority {
                addresses,
                countries,
                threshold,
            },
        )?;
        if !approval.is_executed() {
            return Ok(approval.map(|_| id));
        }
        self.multisig.add_authority(addresses, threshold, None)?;
        self.countries
            .insert(id.clone(), countries.iter().copied().collect());
        tracing::info!(registrar = %self.id, authority = %id, threshold, "registrar authority added");
        Ok(Approval::Executed(id))
    }

    /// Change an authority's threshold. Owner only.
    pub fn set_authority_threshold(
        &mut self,
        caller: &Address,
        now: Timestamp,
        authority: &AuthorityId,
        threshold: u32,
    ) -> Result<Approval<()>> {
        self.multisig.require_owner(caller, now)?;
        self.multisig.check_threshold(authority, threshold)?;
        let approval = self.gate(
            caller,
            now,
            &RegistrarAction::SetAuthorityThreshold {
                authority,
                threshold,
            },
        )?;
        if approval.is_executed() {
            self.multisig.set_threshold(authority, threshold)?;
            tracing::info!(registrar = %self.id, authority = %authority, threshold, "authority threshold set");
        }
        Ok(approval)
    }

    /// Grant or revoke countries for an authority. Owner only.
    pub fn set_authority_countries(
        &mut self,
        caller: &Address,
        now: Timestamp,
        authority: &AuthorityId,
        countries: &[CountryCode],
        permitted: bool,
    ) -> Result<Approval<()>> {
        self.multisig.require_owner(caller, now)?;
        self.authority_exists(authority)?;
        let approval = self.gate(
            caller,
            now,
            &RegistrarAction::SetAuthorityCountries {
                authority,
                countries,
                permitted,
            },
        )?;
        if approval.is_executed() {
            let granted = self.countries.entry(authority.clone()).or_default();
            for country in countries {
                if permitted {
                    granted.insert(*country);
                } else {
                    granted.remove(country);
                }
            }
            tracing::info!(registrar = %self.id, authority = %authority, permitted, "authority countries set");
        }
        Ok(approval)
    }

    /// Restrict or unrestrict an authority as a whole. Owner only; the
    /// owner authority itself cannot be restricted.
    pub fn set_authority_restriction(
        &mut self,
        caller: &Address,
        now: Timestamp,
        authority: &AuthorityId,
        restricted: bool,
    ) -> Result<Approval<()>> {
        self.multisig.require_owner(caller, now)?;
        self.multisig.check_restriction(authority)?;
        let approval = self.gate(
            caller,
            now,
            &RegistrarAction::SetAuthorityRestriction {
                authority,
                restricted,
            },
        )?;
        if approval.is_executed() {
            self.multisig.set_restricted(authority, restricted)?;
            tracing::info!(registrar = %self.id, authority = %authority, restricted, "authority restriction set");
        }
        Ok(approval)
    }

    /// Add or re-enable signing addresses of an authority.
    pub fn add_authority_addresses(
        &mut self,
        caller: &Address,
        now: Timestamp,
        authority: &AuthorityId,
        addresses: &[Address],
    ) -> Result<Approval<()>> {
        self.require_self_or_owner(caller, now, authority)?;
        self.multisig.check_add_addresses(authority, addresses)?;
        self.check_not_investor_bound(addresses)?;
        let approval = self.gate(
            caller,
            now,
            &RegistrarAction::AddAuthorityAddresses {
                authority,
                addresses,
            },
        )?;
        if approval.is_executed() {
            self.multisig.add_addresses(authority, addresses)?;
            tracing::info!(registrar = %self.id, authority = %authority, count = addresses.len(), "authority addresses added");
        }
        Ok(approval)
    }

    /// Restrict signing addresses of an authority.
    pub fn restrict_authority_addresses(
        &mut self,
        caller: &Address,
        now: Timestamp,
        authority: &AuthorityId,
        addresses: &[Address],
    ) -> Result<Approval<()>> {
        self.require_self_or_owner(caller, now, authority)?;
        self.multisig.check_restrict_addresses(authority, addresses)?;
        let approval = self.gate(
            caller,
            now,
            &RegistrarAction::RestrictAuthorityAddresses {
                authority,
                addresses,
            },
        )?;
        if approval.is_executed() {
            self.multisig.restrict_addresses(authority, addresses)?;
            tracing::info!(registrar = %self.id, authority = %authority, count = addresses.len(), "authority addresses restricted");
        }
        Ok(approval)
    }

    // ─── Reads ───────────────────────────────────────────────────────

    /// The record an address is bound to, regardless of its status.
    pub fn lookup(&self, address: &Address) -> Option<&InvestorRecord> {
        self.bindings
            .get(address)
            .and_then(|binding| self.investors.get(&binding.investor))
    }

    /// Resolve the verification status of an address at `now`.
    pub fn status(&self, address: &Address, now: Timestamp) -> KycStatus {
        let Some(binding) = self.bindings.get(address) else {
            return KycStatus::Unregistered;
        };
        let Some(record) = self.investors.get(&binding.investor) else {
            return KycStatus::Unregistered;
        };
        let authority_restricted = self
            .multisig
            .authority(&record.managed_by)
            .map_or(false, |a| a.restricted);
        if !binding.active || record.restricted || authority_restricted {
            KycStatus::Restricted
        } else if record.is_expired_at(now) {
            KycStatus::Expired
        } else {
            KycStatus::Verified(record.clone())
        }
    }

    /// Whether the address is verified at `now`.
    pub fn is_verified(&self, address: &Address, now: Timestamp) -> bool {
        self.status(address, now).is_verified()
    }

    /// The investor an address is bound to.
    pub fn investor_id(&self, address: &Address) -> Option<&InvestorId> {
        self.bindings.get(address).map(|binding| &binding.investor)
    }

    /// An investor record by id.
    pub fn investor(&self, id: &InvestorId) -> Option<&InvestorRecord> {
        self.investors.get(id)
    }

    /// Whether the address is bound to any investor.
    pub fn is_registered(&self, address: &Address) -> bool {
        self.bindings.contains_key(address)
    }

    /// Addresses bound to an investor, with their active flag.
    pub fn addresses_of(&self, id: &InvestorId) -> Vec<(Address, bool)> {
        let mut out: Vec<_> = self
            .bindings
            .iter()
            .filter(|(_, binding)| &binding.investor == id)
            .map(|(address, binding)| (address.clone(), binding.active))
            .collect();
        out.sort();
        out
    }

    /// The authority an address signs for.
    pub fn authority_id(&self, address: &Address) -> Option<&AuthorityId> {
        self.multisig.authority_of(address)
    }

    /// An authority by id.
    pub fn authority(&self, id: &AuthorityId) -> Option<&Authority> {
        self.multisig.authority(id)
    }

    /// Countries an authority is permitted for. The owner is permitted for
    /// every country and has no explicit entry.
    pub fn authority_countries(&self, id: &AuthorityId) -> Vec<CountryCode> {
        self.countries
            .get(id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `address` is an active signer of an unrestricted authority
    /// permitted for `country`.
    pub fn is_approved_authority(&self, address: &Address, country: CountryCode) -> bool {
        let Some(authority) = self
            .multisig
            .authority_of(address)
            .and_then(|id| self.multisig.authority(id))
        else {
            return false;
        };
        if !authority.is_active_address(address) || authority.restricted {
            return false;
        }
        self.multisig.is_owner(&authority.id)
            || self
                .countries
                .get(&authority.id)
                .map_or(false, |set| set.contains(&country))
    }

    /// Number of investor records.
    pub fn investor_count(&self) -> usize {
        self.investors.len()
    }

    // ─── Internals ───────────────────────────────────────────────────

    fn gate(
        &mut self,
        caller: &Address,
        now: Timestamp,
        action: &RegistrarAction<'_>,
    ) -> Result<Approval<()>> {
        let digest = action_digest(&format!("registrar:{}", self.id), action)?;
        self.multisig.approve(caller, now, digest)
    }

    fn require_country(&self, caller: &Address, now: Timestamp, country: CountryCode) -> Result<AuthorityId> {
        let authority = self.multisig.caller_authority(caller, now)?;
        let permitted = self.multisig.is_owner(&authority.id)
            || self
                .countries
                .get(&authority.id)
                .map_or(false, |set| set.contains(&country));
        if !permitted {
            return Err(AuthorizationError::CountryNotPermitted {
                authority: authority.id.clone(),
                country,
            }
            .into());
        }
        Ok(authority.id.clone())
    }

    fn require_self_or_owner(&self, caller: &Address, now: Timestamp, target: &AuthorityId) -> Result<()> {
        let authority = self.multisig.caller_authority(caller, now)?;
        if &authority.id != target && !self.multisig.is_owner(&authority.id) {
            return Err(AuthorizationError::NotOwner(caller.clone()).into());
        }
        Ok(())
    }

    fn authorize_investor(&self, caller: &Address, now: Timestamp, id: &InvestorId) -> Result<()> {
        let country = self.record(id)?.country;
        self.require_country(caller, now, country)?;
        Ok(())
    }

    fn authority_exists(&self, id: &AuthorityId) -> Result<()> {
        self.multisig
            .authority(id)
            .map(|_| ())
            .ok_or_else(|| NotFoundError::Authority(id.clone()).into())
    }

    fn record(&self, id: &InvestorId) -> Result<&InvestorRecord> {
        self.investors
            .get(id)
            .ok_or_else(|| NotFoundError::Investor(id.clone()).into())
    }

    fn record_mut(&mut self, id: &InvestorId) -> Result<&mut InvestorRecord> {
        self.investors
            .get_mut(id)
            .ok_or_else(|| NotFoundError::Investor(id.clone()).into())
    }

    /// Addresses may be bound to `id` if they are unknown or already bound
    /// to `id`.
    fn check_bindable(&self, id: &InvestorId, addresses: &[Address]) -> Result<()> {
        for address in addresses {
            if let Some(authority) = self.multisig.authority_of(address) {
                return Err(DuplicateError::AddressBound {
                    address: address.clone(),
                    owner: authority.to_string(),
                }
                .into());
            }
            if let Some(binding) = self.bindings.get(address) {
                if &binding.investor != id {
                    return Err(DuplicateError::AddressBound {
                        address: address.clone(),
                        owner: binding.investor.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn check_not_investor_bound(&self, addresses: &[Address]) -> Result<()> {
        for address in addresses {
            if let Some(binding) = self.bindings.get(address) {
                return Err(DuplicateError::AddressBound {
                    address: address.clone(),
                    owner: binding.investor.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn bind(&mut self, id: &InvestorId, addresses: &[Address]) {
        for address in addresses {
            self.bindings.insert(
                address.clone(),
                AddressBinding {
                    investor: id.clone(),
                    active: true,
                },
            );
        }
    }
}

fn check_non_empty(addresses: &[Address]) -> Result<()> {
    if addresses.is_empty() {
        return Err(ValidationError::EmptyAddressSet.into());
    }
    Ok(())
}

fn check_unique(addresses: &[Address]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for address in addresses {
        if !seen.insert(address) {
            return Err(ValidationError::RepeatedAddress(address.clone()).into());
        }
    }
    Ok(())
}
