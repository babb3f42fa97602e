//! # Issuer-Run KYC
//!
//! An issuer may verify investors itself instead of, or alongside,
//! independent registrars. Its registrar is an ordinary [`KycRegistrar`]
//! with a derived id, owned by the keyless treasury and linked to the
//! issuer like any other. Writes go through the issuer's own multisig under
//! [`IssuerAction::ManageInvestors`]:
//!
//! ```text
//! authorize(caller, ManageInvestors) ─▶ run the call on a copy of the registrar
//!     ─▶ gate(digest of call) ─┬─ Pending  ─▶ copy discarded
//!                              └─ Executed ─▶ copy replaces the registrar,
//!                                             counters follow reclassification
//! ```
//!
//! Running the call on a copy first means a write that could never apply
//! collects no signatures. Issuer authority addresses can never be bound
//! as investor addresses here.

use serde::{Deserialize, Serialize};

use regtoken_core::{
    Address, Approval, Clock, CountryCode, DuplicateError, InvestorId, IssuerId, NotFoundError,
    Rating, RegistrarId, Timestamp,
};
use regtoken_kyc::{InvestorProfile, KycRegistrar};

use crate::engine::{Engine, Result};
use crate::issuer::IssuerAction;

/// A write against the issuer's own registrar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum KycCall {
    /// Create or update a record and bind addresses to it.
    AddInvestor {
        id: InvestorId,
        profile: InvestorProfile,
        addresses: Vec<Address>,
    },
    SetRestricted { id: InvestorId, restricted: bool },
    UpdateRating { id: InvestorId, rating: Rating },
    UpdateCountry { id: InvestorId, country: CountryCode },
    UpdateExpiry { id: InvestorId, expiry: Timestamp },
    /// Bind more addresses, or re-enable restricted ones.
    RegisterAddresses { id: InvestorId, addresses: Vec<Address> },
    RestrictAddresses { id: InvestorId, addresses: Vec<Address> },
}

impl KycCall {
    /// The investor the call writes.
    pub fn investor(&self) -> &InvestorId {
        match self {
            Self::AddInvestor { id, .. }
            | Self::SetRestricted { id, .. }
            | Self::UpdateRating { id, .. }
            | Self::UpdateCountry { id, .. }
            | Self::UpdateExpiry { id, .. }
            | Self::RegisterAddresses { id, .. }
            | Self::RestrictAddresses { id, .. } => id,
        }
    }

    fn binds(&self) -> &[Address] {
        match self {
            Self::AddInvestor { addresses, .. } | Self::RegisterAddresses { addresses, .. } => addresses,
            _ => &[],
        }
    }

    fn apply(&self, registrar: &mut KycRegistrar, signer: &Address, now: Timestamp) -> Result<Approval<()>> {
        match self {
            Self::AddInvestor { id, profile, addresses } => {
                registrar.add_investor(signer, now, id, *profile, addresses)
            }
            Self::SetRestricted { id, restricted } => registrar.set_restricted(signer, now, id, *restricted),
            Self::UpdateRating { id, rating } => registrar.update_rating(signer, now, id, *rating),
            Self::UpdateCountry { id, country } => registrar.update_country(signer, now, id, *country),
            Self::UpdateExpiry { id, expiry } => registrar.update_expiry(signer, now, id, *expiry),
            Self::RegisterAddresses { id, addresses } => registrar.register_addresses(signer, now, id, addresses),
            Self::RestrictAddresses { id, addresses } => registrar.restrict_addresses(signer, now, id, addresses),
        }
    }
}

/// Id of the registrar an issuer runs itself.
pub fn issuer_registrar_id(issuer: &IssuerId) -> Result<RegistrarId> {
    Ok(RegistrarId::new(format!("{issuer}.kyc"))?)
}

impl<C: Clock> Engine<C> {
    /// Start verifying investors in-house: create the issuer's registrar on
    /// first use and link it. Re-enabling after an unlink keeps the records.
    pub fn enable_issuer_kyc(&mut self, caller: &Address, issuer: &IssuerId) -> Result<Approval<RegistrarId>> {
        let now = self.now();
        self.issuer(issuer)?.authorize(caller, now, IssuerAction::ManageRegistrars)?;
        let id = issuer_registrar_id(issuer)?;
        let treasury = self.issuer(issuer)?.treasury().clone();
        let foreign = self
            .registrars
            .get(&id)
            .map_or(false, |r| r.authority_id(&treasury).is_none());
        if foreign || self.issuer(issuer)?.registrars().contains(&id) {
            return Err(DuplicateError::Registrar(id).into());
        }
        if let Some(pending) = self
            .issuer_mut(issuer)?
            .gate(caller, now, IssuerAction::ManageRegistrars, &("issuer_kyc", &id))?
            .into_pending()
        {
            return Ok(pending);
        }
        if !self.registrars.contains_key(&id) {
            let registrar = KycRegistrar::new(id.clone(), &[treasury], 1)?;
            self.registrars.insert(id.clone(), registrar);
        }
        self.issuer_mut(issuer)?.link_registrar(&id);
        tracing::info!(issuer = %issuer, registrar = %id, "issuer registrar linked");
        Ok(Approval::Executed(id))
    }

    /// Write an investor record at the issuer's own registrar.
    pub fn issuer_kyc(&mut self, caller: &Address, issuer: &IssuerId, call: &KycCall) -> Result<Approval<()>> {
        let now = self.now();
        let issuer_state = self.issuer(issuer)?;
        issuer_state.authorize(caller, now, IssuerAction::ManageInvestors)?;
        let treasury = issuer_state.treasury().clone();
        for address in call.binds() {
            if issuer_state.is_authority_address(address) || address == &treasury {
                let owner = issuer_state
                    .multisig()
                    .authority_of(address)
                    .map_or_else(|| "treasury".to_string(), |a| a.to_string());
                return Err(DuplicateError::AddressBound {
                    address: address.clone(),
                    owner,
                }
                .into());
            }
        }
        let id = issuer_registrar_id(issuer)?;
        let mut trial = self
            .registrars
            .get(&id)
            .cloned()
            .ok_or_else(|| NotFoundError::Registrar(id.clone()))?;
        call.apply(&mut trial, &treasury, now)?;

        if let Some(pending) = self
            .issuer_mut(issuer)?
            .gate(caller, now, IssuerAction::ManageInvestors, call)?
            .into_pending()
        {
            return Ok(pending);
        }
        self.registrars.insert(id.clone(), trial);
        tracing::info!(issuer = %issuer, investor = %call.investor(), "issuer kyc write applied");
        let executed = Approval::Executed(());
        self.follow_reclassification(&id, call.investor(), &executed)?;
        Ok(executed)
    }
}
