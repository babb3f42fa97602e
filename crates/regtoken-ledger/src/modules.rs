//! # Module Registry
//!
//! Capability table of privileged extensions. A module may call restricted
//! ledger operations (mint, burn) for an issuer only while its attachment
//! record for that issuer is active. Detachment takes effect on the next
//! call; attachment records are kept, never deleted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use regtoken_core::{Address, AuthorizationError, IssuerId, NotFoundError};

/// One `(issuer, module)` attachment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAttachment {
    /// The issuer.
    pub issuer: IssuerId,
    /// The module address.
    pub module: Address,
    /// Whether the module is currently attached.
    pub attached: bool,
}

/// Attachment records of every issuer.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    records: BTreeMap<IssuerId, BTreeMap<Address, bool>>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a module. Returns `false` if it was already attached.
    pub fn attach(&mut self, issuer: &IssuerId, module: &Address) -> bool {
        let state = self
            .records
            .entry(issuer.clone())
            .or_default()
            .entry(module.clone())
            .or_insert(false);
        let changed = !*state;
        *state = true;
        changed
    }

    /// Validate a detachment.
    pub fn check_detach(&self, issuer: &IssuerId, module: &Address) -> Result<(), NotFoundError> {
        if self.is_attached(issuer, module) {
            Ok(())
        } else {
            Err(NotFoundError::Module {
                issuer: issuer.clone(),
                module: module.clone(),
            })
        }
    }

    /// Detach a module that is currently attached.
    pub fn detach(&mut self, issuer: &IssuerId, module: &Address) -> Result<(), NotFoundError> {
        self.check_detach(issuer, module)?;
        if let Some(state) = self
            .records
            .get_mut(issuer)
            .and_then(|modules| modules.get_mut(module))
        {
            *state = false;
        }
        Ok(())
    }

    /// Whether a module is attached to an issuer.
    pub fn is_attached(&self, issuer: &IssuerId, module: &Address) -> bool {
        self.records
            .get(issuer)
            .and_then(|modules| modules.get(module))
            .copied()
            .unwrap_or(false)
    }

    /// Require an attached module.
    pub fn authorize(&self, issuer: &IssuerId, module: &Address) -> Result<(), AuthorizationError> {
        if self.is_attached(issuer, module) {
            Ok(())
        } else {
            Err(AuthorizationError::ModuleNotAttached {
                issuer: issuer.clone(),
                module: module.clone(),
            })
        }
    }

    /// Currently attached modules of an issuer.
    pub fn attached_modules(&self, issuer: &IssuerId) -> Vec<Address> {
        self.records
            .get(issuer)
            .map(|modules| {
                modules
                    .iter()
                    .filter(|(_, attached)| **attached)
                    .map(|(module, _)| module.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every attachment record of an issuer, attached or not.
    pub fn records(&self, issuer: &IssuerId) -> Vec<ModuleAttachment> {
        self.records
            .get(issuer)
            .map(|modules| {
                modules
                    .iter()
                    .map(|(module, attached)| ModuleAttachment {
                        issuer: issuer.clone(),
                        module: module.clone(),
                        attached: *attached,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
