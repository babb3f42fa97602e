//! # Multisig Approval Accumulator
//!
//! Administrative mutations on registrars and issuers are gated by
//! authorities. An authority is a set of signing addresses plus a
//! threshold. A call becomes effective only once `threshold` distinct
//! active addresses of the *same* authority have submitted the identical
//! call (same [`ActionDigest`]).
//!
//! ## Lifecycle of a call
//!
//! ```text
//! approve(caller, digest)
//!   ├── caller unknown / restricted / authority restricted ─▶ Err
//!   ├── caller already signed this digest ──────────────────▶ Err(RepeatCaller)
//!   ├── signatures < threshold ─────────────────────────────▶ Pending { signatures, threshold }
//!   └── signatures == threshold ────────────────────────────▶ Executed, pending entry cleared
//! ```
//!
//! Pending entries are pure bookkeeping. They never touch balances,
//! counters or policy; the owning subsystem applies the mutation only when
//! `approve` returns [`Approval::Executed`].
//!
//! A signature only counts while its address stays active. Restricting an
//! address withdraws it from every pending call of its authority;
//! restricting an authority or changing its threshold discards all of that
//! authority's pending calls.
//!
//! The first authority created is the *owner* authority. Only the owner may
//! administer other authorities, and it can never be restricted.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::digest::ActionDigest;
use crate::error::{AuthorizationError, DuplicateError, NotFoundError, RegtokenError, ValidationError};
use crate::identity::{Address, AuthorityId};
use crate::temporal::Timestamp;

/// Outcome of a multisig-gated call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Approval<T> {
    /// Not enough signatures yet. Nothing was applied.
    Pending {
        /// Distinct signers so far.
        signatures: u32,
        /// Signers required.
        threshold: u32,
    },
    /// The threshold was met and the call was applied.
    Executed(T),
}

impl<T> Approval<T> {
    /// Whether the call was applied.
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed(_))
    }

    /// The applied result, if any.
    pub fn executed(self) -> Option<T> {
        match self {
            Self::Executed(value) => Some(value),
            Self::Pending { .. } => None,
        }
    }

    /// The pending state re-typed, or `None` if the call was applied.
    pub fn into_pending<U>(self) -> Option<Approval<U>> {
        match self {
            Self::Pending {
                signatures,
                threshold,
            } => Some(Approval::Pending {
                signatures,
                threshold,
            }),
            Self::Executed(_) => None,
        }
    }

    /// Map the applied result.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Approval<U> {
        match self {
            Self::Executed(value) => Approval::Executed(f(value)),
            Self::Pending {
                signatures,
                threshold,
            } => Approval::Pending {
                signatures,
                threshold,
            },
        }
    }
}

/// A multisig authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authority {
    /// Authority id, derived from the founding address.
    pub id: AuthorityId,
    /// Signing addresses; `true` while the address is active.
    addresses: BTreeMap<Address, bool>,
    /// Distinct signatures required.
    pub threshold: u32,
    /// Whether the authority as a whole is restricted.
    pub restricted: bool,
    /// End of the authority's approval window, if it has one.
    pub approved_until: Option<Timestamp>,
}

impl Authority {
    /// Number of active signing addresses.
    pub fn active_signers(&self) -> usize {
        self.addresses.values().filter(|active| **active).count()
    }

    /// Whether `address` is an active signing address of this authority.
    pub fn is_active_address(&self, address: &Address) -> bool {
        self.addresses.get(address).copied().unwrap_or(false)
    }

    /// All signing addresses with their active flag.
    pub fn addresses(&self) -> impl Iterator<Item = (&Address, bool)> {
        self.addresses.iter().map(|(a, active)| (a, *active))
    }

    /// Whether the approval window is open at `now`.
    pub fn is_approved_at(&self, now: Timestamp) -> bool {
        self.approved_until.map_or(true, |until| now < until)
    }
}

/// The set of authorities for one registrar or issuer, plus their pending
/// calls.
#[derive(Debug, Clone)]
pub struct MultiSig {
    owner: AuthorityId,
    authorities: BTreeMap<AuthorityId, Authority>,
    address_index: HashMap<Address, AuthorityId>,
    pending: HashMap<(AuthorityId, ActionDigest), BTreeSet<Address>>,
}

impl MultiSig {
    /// Create the accumulator with its owner authority.
    pub fn new(owners: &[Address], threshold: u32) -> Result<Self, RegtokenError> {
        let mut multisig = Self {
            owner: AuthorityId::derive(first(owners)?),
            authorities: BTreeMap::new(),
            address_index: HashMap::new(),
            pending: HashMap::new(),
        };
        multisig.owner = multisig.add_authority(owners, threshold, None)?;
        Ok(multisig)
    }

    /// The owner authority id.
    pub fn owner_id(&self) -> &AuthorityId {
        &self.owner
    }

    /// Whether `id` is the owner authority.
    pub fn is_owner(&self, id: &AuthorityId) -> bool {
        &self.owner == id
    }

    /// Look up an authority.
    pub fn authority(&self, id: &AuthorityId) -> Option<&Authority> {
        self.authorities.get(id)
    }

    /// Iterate over all authorities.
    pub fn authorities(&self) -> impl Iterator<Item = &Authority> {
        self.authorities.values()
    }

    /// The authority an address belongs to, active or not.
    pub fn authority_of(&self, address: &Address) -> Option<&AuthorityId> {
        self.address_index.get(address)
    }

    /// Whether any authority knows this address.
    pub fn knows_address(&self, address: &Address) -> bool {
        self.address_index.contains_key(address)
    }

    /// Resolve the authority on whose behalf `caller` acts.
    pub fn caller_authority(
        &self,
        caller: &Address,
        now: Timestamp,
    ) -> Result<&Authority, AuthorizationError> {
        let id = self
            .address_index
            .get(caller)
            .ok_or_else(|| AuthorizationError::UnknownCaller(caller.clone()))?;
        let authority = self
            .authorities
            .get(id)
            .ok_or_else(|| AuthorizationError::UnknownCaller(caller.clone()))?;
        if !authority.is_active_address(caller) {
            return Err(AuthorizationError::RestrictedCaller(caller.clone()));
        }
        if authority.restricted {
            return Err(AuthorizationError::AuthorityRestricted(authority.id.clone()));
        }
        if !authority.is_approved_at(now) {
            return Err(AuthorizationError::AuthorityExpired(authority.id.clone()));
        }
        Ok(authority)
    }

    /// Resolve `caller` and require the owner authority.
    pub fn require_owner(&self, caller: &Address, now: Timestamp) -> Result<&Authority, AuthorizationError> {
        let authority = self.caller_authority(caller, now)?;
        if !self.is_owner(&authority.id) {
            return Err(AuthorizationError::NotOwner(caller.clone()));
        }
        Ok(authority)
    }

    /// Record `caller`'s signature on `digest`.
    ///
    /// Callers must finish validating the action *before* calling this, so
    /// that an `Executed` result can be applied without further failure.
    pub fn approve(
        &mut self,
        caller: &Address,
        now: Timestamp,
        digest: ActionDigest,
    ) -> Result<Approval<()>, RegtokenError> {
        let (id, threshold) = {
            let authority = self.caller_authority(caller, now)?;
            (authority.id.clone(), authority.threshold)
        };
        let key = (id, digest);
        let signers = self.pending.entry(key.clone()).or_default();
        if signers.contains(caller) {
            return Err(AuthorizationError::RepeatCaller(caller.clone()).into());
        }
        signers.insert(caller.clone());
        let signatures = u32::try_from(signers.len()).unwrap_or(u32::MAX);
        if signatures >= threshold {
            self.pending.remove(&key);
            tracing::debug!(authority = %key.0, action = %digest, "multisig call approved");
            Ok(Approval::Executed(()))
        } else {
            tracing::debug!(
                authority = %key.0,
                action = %digest,
                signatures,
                threshold,
                "multisig call pending"
            );
            Ok(Approval::Pending {
                signatures,
                threshold,
            })
        }
    }

    /// Signatures collected so far for a pending call.
    pub fn pending_signatures(&self, authority: &AuthorityId, digest: &ActionDigest) -> usize {
        self.pending
            .get(&(authority.clone(), *digest))
            .map_or(0, BTreeSet::len)
    }

    // ─── Authority administration ────────────────────────────────────

    /// Validate a prospective authority without creating it.
    pub fn check_new_authority(&self, addresses: &[Address], threshold: u32) -> Result<AuthorityId, RegtokenError> {
        let id = AuthorityId::derive(first(addresses)?);
        if self.authorities.contains_key(&id) {
            return Err(DuplicateError::Authority(id).into());
        }
        check_unique(addresses)?;
        for address in addresses {
            if let Some(owner) = self.address_index.get(address) {
                return Err(DuplicateError::AddressBound {
                    address: address.clone(),
                    owner: owner.to_string(),
                }
                .into());
            }
        }
        check_threshold(threshold, addresses.len())?;
        Ok(id)
    }

    /// Create an authority.
    pub fn add_authority(
        &mut self,
        addresses: &[Address],
        threshold: u32,
        approved_until: Option<Timestamp>,
    ) -> Result<AuthorityId, RegtokenError> {
        let id = self.check_new_authority(addresses, threshold)?;
        for address in addresses {
            self.address_index.insert(address.clone(), id.clone());
        }
        self.authorities.insert(
            id.clone(),
            Authority {
                id: id.clone(),
                addresses: addresses.iter().map(|a| (a.clone(), true)).collect(),
                threshold,
                restricted: false,
                approved_until,
            },
        );
        Ok(id)
    }

    /// Validate a threshold change.
    pub fn check_threshold(&self, id: &AuthorityId, threshold: u32) -> Result<(), RegtokenError> {
        let authority = self.get(id)?;
        check_threshold(threshold, authority.active_signers())
    }

    /// Change an authority's threshold.
    pub fn set_threshold(&mut self, id: &AuthorityId, threshold: u32) -> Result<(), RegtokenError> {
        self.check_threshold(id, threshold)?;
        self.get_mut(id)?.threshold = threshold;
        self.discard_pending(id);
        Ok(())
    }

    /// Validate a whole-authority restriction change.
    pub fn check_restriction(&self, id: &AuthorityId) -> Result<(), RegtokenError> {
        self.get(id)?;
        if self.is_owner(id) {
            return Err(AuthorizationError::OwnerRestriction(id.clone()).into());
        }
        Ok(())
    }

    /// Restrict or unrestrict an authority as a whole.
    pub fn set_restricted(&mut self, id: &AuthorityId, restricted: bool) -> Result<(), RegtokenError> {
        self.check_restriction(id)?;
        self.get_mut(id)?.restricted = restricted;
        if restricted {
            self.discard_pending(id);
        }
        Ok(())
    }

    /// Change the approval window of an authority.
    pub fn set_approved_until(&mut self, id: &AuthorityId, until: Option<Timestamp>) -> Result<(), RegtokenError> {
        self.get_mut(id)?.approved_until = until;
        Ok(())
    }

    /// Validate adding (or re-enabling) signing addresses.
    ///
    /// An address restricted earlier on the *same* authority may be
    /// re-enabled; any other known address is a duplicate.
    pub fn check_add_addresses(&self, id: &AuthorityId, addresses: &[Address]) -> Result<(), RegtokenError> {
        let authority = self.get(id)?;
        first(addresses)?;
        check_unique(addresses)?;
        for address in addresses {
            match self.address_index.get(address) {
                None => {}
                Some(owner) if owner == id && !authority.is_active_address(address) => {}
                Some(owner) => {
                    return Err(DuplicateError::AddressBound {
                        address: address.clone(),
                        owner: owner.to_string(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }

    /// Add or re-enable signing addresses.
    pub fn add_addresses(&mut self, id: &AuthorityId, addresses: &[Address]) -> Result<(), RegtokenError> {
        self.check_add_addresses(id, addresses)?;
        for address in addresses {
            self.address_index.insert(address.clone(), id.clone());
        }
        let authority = self.get_mut(id)?;
        for address in addresses {
            authority.addresses.insert(address.clone(), true);
        }
        Ok(())
    }

    /// Validate restricting signing addresses.
    pub fn check_restrict_addresses(&self, id: &AuthorityId, addresses: &[Address]) -> Result<(), RegtokenError> {
        let authority = self.get(id)?;
        first(addresses)?;
        check_unique(addresses)?;
        for address in addresses {
            match authority.addresses.get(address) {
                None => {
                    return Err(NotFoundError::AddressBinding {
                        address: address.clone(),
                        owner: id.to_string(),
                    }
                    .into())
                }
                Some(false) => return Err(ValidationError::AlreadyRestricted(address.clone()).into()),
                Some(true) => {}
            }
        }
        let remaining = authority.active_signers() - addresses.len();
        if remaining < authority.threshold as usize {
            return Err(ValidationError::BelowThreshold {
                authority: id.clone(),
                threshold: authority.threshold,
            }
            .into());
        }
        Ok(())
    }

    /// Restrict signing addresses. They stay bound to the authority so they
    /// cannot be reused elsewhere.
    pub fn restrict_addresses(&mut self, id: &AuthorityId, addresses: &[Address]) -> Result<(), RegtokenError> {
        self.check_restrict_addresses(id, addresses)?;
        let authority = self.get_mut(id)?;
        for address in addresses {
            authority.addresses.insert(address.clone(), false);
        }
        self.withdraw_signatures(id, addresses);
        Ok(())
    }

    /// Number of calls of an authority still waiting for signatures.
    pub fn pending_calls(&self, authority: &AuthorityId) -> usize {
        self.pending.keys().filter(|(id, _)| id == authority).count()
    }

    fn withdraw_signatures(&mut self, id: &AuthorityId, addresses: &[Address]) {
        self.pending.retain(|(authority, digest), signers| {
            if authority != id {
                return true;
            }
            let before = signers.len();
            signers.retain(|signer| !addresses.contains(signer));
            if signers.len() < before {
                tracing::debug!(authority = %id, action = %digest, remaining = signers.len(), "signatures withdrawn");
            }
            !signers.is_empty()
        });
    }

    fn discard_pending(&mut self, id: &AuthorityId) {
        let before = self.pending.len();
        self.pending.retain(|(authority, _), _| authority != id);
        let discarded = before - self.pending.len();
        if discarded > 0 {
            tracing::debug!(authority = %id, discarded, "pending calls discarded");
        }
    }

    fn get(&self, id: &AuthorityId) -> Result<&Authority, RegtokenError> {
        self.authorities
            .get(id)
            .ok_or_else(|| NotFoundError::Authority(id.clone()).into())
    }

    fn get_mut(&mut self, id: &AuthorityId) -> Result<&mut Authority, RegtokenError> {
        self.authorities
            .get_mut(id)
            .ok_or_else(|| NotFoundError::Authority(id.clone()).into())
    }
}

fn first(addresses: &[Address]) -> Result<&Address, RegtokenError> {
    addresses
        .first()
        .ok_or_else(|| ValidationError::EmptyAddressSet.into())
}

fn check_unique(addresses: &[Address]) -> Result<(), RegtokenError> {
    let mut seen = BTreeSet::new();
    for address in addresses {
        if !seen.insert(address) {
            return Err(ValidationError::RepeatedAddress(address.clone()).into());
        }
    }
    Ok(())
}

fn check_threshold(threshold: u32, signers: usize) -> Result<(), RegtokenError> {
    if threshold == 0 {
        return Err(ValidationError::ZeroThreshold.into());
    }
    if threshold as usize > signers {
        return Err(ValidationError::ThresholdTooHigh { threshold, signers }.into());
    }
    Ok(())
}
