//! # Issuer
//!
//! An issuing entity: its multisig authorities, what each non-owner
//! authority may do, the registrars it trusts, and issuer-side
//! restrictions. The treasury address is derived from the issuer id and
//! owned by no key; it is debited only through authority-initiated
//! transfers and burns.
//!
//! ## Permissions
//!
//! The owner authority may perform every [`IssuerAction`]. Other
//! authorities may perform the actions they were granted, while their
//! approval window is open. Authority administration is owner-only and
//! cannot be granted.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use regtoken_core::{
    action_digest, Address, Approval, Authority, AuthorityId, AuthorizationError, InvestorId,
    IssuerId, MultiSig, RegistrarId, RegtokenError, Timestamp, ValidationError,
};

type Result<T> = std::result::Result<T, RegtokenError>;

/// Administrative actions an issuer authority can be permitted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuerAction {
    /// Link and unlink registrars.
    ManageRegistrars,
    /// Set country policies.
    SetCountries,
    /// Set per-rating and issuer-wide investor limits.
    SetLimits,
    /// Create tokens.
    AddToken,
    /// Change a token's authorized supply.
    ModifySupply,
    /// Attach and detach modules.
    ManageModules,
    /// Set investor, token and global restrictions.
    Restrict,
    /// Write investor records at the issuer's own registrar.
    ManageInvestors,
    /// Move treasury funds with `transfer`.
    Transfer,
    /// Move investor funds with `transfer_from` without an allowance.
    TransferFrom,
    /// Administer authorities. Owner only.
    ManageAuthorities,
}

impl IssuerAction {
    /// Whether only the owner authority may perform this action.
    pub fn is_owner_only(self) -> bool {
        matches!(self, Self::ManageAuthorities)
    }

    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManageRegistrars => "manage_registrars",
            Self::SetCountries => "set_countries",
            Self::SetLimits => "set_limits",
            Self::AddToken => "add_token",
            Self::ModifySupply => "modify_supply",
            Self::ManageModules => "manage_modules",
            Self::Restrict => "restrict",
            Self::ManageInvestors => "manage_investors",
            Self::Transfer => "transfer",
            Self::TransferFrom => "transfer_from",
            Self::ManageAuthorities => "manage_authorities",
        }
    }
}

impl std::fmt::Display for IssuerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issuing entity.
#[derive(Debug, Clone)]
pub struct Issuer {
    id: IssuerId,
    treasury: Address,
    multisig: MultiSig,
    permissions: BTreeMap<AuthorityId, BTreeSet<IssuerAction>>,
    registrars: Vec<RegistrarId>,
    blocked: BTreeSet<InvestorId>,
    global_lock: bool,
}

impl Issuer {
    /// Create an issuer. Its id is derived from the first owner address.
    pub fn new(owners: &[Address], threshold: u32) -> Result<Self> {
        let founder = owners.first().ok_or(ValidationError::EmptyAddressSet)?;
        let id = IssuerId::derive(founder);
        Ok(Self {
            treasury: id.treasury(),
            id,
            multisig: MultiSig::new(owners, threshold)?,
            permissions: BTreeMap::new(),
            registrars: Vec::new(),
            blocked: BTreeSet::new(),
            global_lock: false,
        })
    }

    /// Issuer id.
    pub fn id(&self) -> &IssuerId {
        &self.id
    }

    /// Treasury address.
    pub fn treasury(&self) -> &Address {
        &self.treasury
    }

    /// Authorities and pending approvals.
    pub fn multisig(&self) -> &MultiSig {
        &self.multisig
    }

    pub(crate) fn multisig_mut(&mut self) -> &mut MultiSig {
        &mut self.multisig
    }

    /// Linked registrars, in link order.
    pub fn registrars(&self) -> &[RegistrarId] {
        &self.registrars
    }

    /// Investors blocked by the issuer.
    pub fn blocked(&self) -> &BTreeSet<InvestorId> {
        &self.blocked
    }

    /// Whether every token of the issuer is locked.
    pub fn is_globally_locked(&self) -> bool {
        self.global_lock
    }

    /// Actions granted to a non-owner authority.
    pub fn permissions(&self, authority: &AuthorityId) -> Vec<IssuerAction> {
        self.permissions
            .get(authority)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether an address signs for any of the issuer's authorities,
    /// active or not.
    pub fn is_authority_address(&self, address: &Address) -> bool {
        self.multisig.knows_address(address)
    }

    /// The authority `caller` acts for, if the caller is an active signer
    /// of an unrestricted, unexpired authority.
    pub fn acting_authority(&self, caller: &Address, now: Timestamp) -> Option<&Authority> {
        self.multisig.caller_authority(caller, now).ok()
    }

    /// Require that `caller` may perform `action`.
    pub fn authorize(&self, caller: &Address, now: Timestamp, action: IssuerAction) -> Result<AuthorityId> {
        let authority = self.multisig.caller_authority(caller, now)?;
        if self.multisig.is_owner(&authority.id) {
            return Ok(authority.id.clone());
        }
        if action.is_owner_only() {
            return Err(AuthorizationError::NotOwner(caller.clone()).into());
        }
        let granted = self
            .permissions
            .get(&authority.id)
            .map_or(false, |set| set.contains(&action));
        if !granted {
            return Err(AuthorizationError::NotPermitted {
                authority: authority.id.clone(),
                action: action.to_string(),
            }
            .into());
        }
        Ok(authority.id.clone())
    }

    /// Submit `caller`'s signature on `action` with `args`.
    pub(crate) fn gate<A: Serialize>(
        &mut self,
        caller: &Address,
        now: Timestamp,
        action: IssuerAction,
        args: &A,
    ) -> Result<Approval<()>> {
        let digest = action_digest(&format!("issuer:{}", self.id), &(action, args))?;
        self.multisig.approve(caller, now, digest)
    }

    pub(crate) fn set_permissions(&mut self, authority: &AuthorityId, actions: &[IssuerAction], allowed: bool) {
        let granted = self.permissions.entry(authority.clone()).or_default();
        for action in actions.iter().filter(|a| !a.is_owner_only()) {
            if allowed {
                granted.insert(*action);
            } else {
                granted.remove(action);
            }
        }
    }

    pub(crate) fn link_registrar(&mut self, registrar: &RegistrarId) {
        self.registrars.push(registrar.clone());
    }

    pub(crate) fn unlink_registrar(&mut self, registrar: &RegistrarId) {
        self.registrars.retain(|r| r != registrar);
    }

    pub(crate) fn set_blocked(&mut self, investor: &InvestorId, blocked: bool) {
        if blocked {
            self.blocked.insert(investor.clone());
        } else {
            self.blocked.remove(investor);
        }
    }

    pub(crate) fn set_global_lock(&mut self, locked: bool) {
        self.global_lock = locked;
    }
}
