//! # Scenario Files
//!
//! A scenario is a YAML document describing the initial deployment
//! (registrars, investors, issuers with their countries, tokens, modules and
//! authorities) followed by a list of steps replayed in order.
//!
//! ## References
//!
//! Addresses are plain labels and are derived deterministically, so the
//! same label always names the same account. A label of the form
//! `@issuer` names that issuer's treasury. Tokens are referenced as
//! `issuer.SYMBOL` using the issuer's scenario name.
//!
//! ```yaml
//! start: 1700000000
//! registrars:
//!   - id: kyc
//!     owners: [kyc-owner]
//! investors:
//!   - registrar: kyc
//!     id: alice
//!     country: 1
//!     rating: 1
//!     expiry: 2000000000
//!     addresses: [alice]
//! issuers:
//!   - name: acme
//!     owners: [acme-owner]
//!     registrars: [kyc]
//!     countries:
//!       - { code: 1, min_rating: 1, limit: 100 }
//!     modules: [mint-burn]
//!     tokens:
//!       - { symbol: SEC, name: Security, initial_supply: 1000 }
//! steps:
//!   - transfer: { caller: acme-owner, token: acme.SEC, to: alice, amount: 100 }
//!     expect: committed
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use regtoken_core::{CountryCode, Rating};
use regtoken_ledger::IssuerAction;
use regtoken_policy::InvestorLimits;

/// A whole scenario document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Clock start in epoch seconds.
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub registrars: Vec<RegistrarEntry>,
    #[serde(default)]
    pub investors: Vec<InvestorEntry>,
    #[serde(default)]
    pub issuers: Vec<IssuerEntry>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrarEntry {
    pub id: String,
    pub owners: Vec<String>,
    #[serde(default = "one")]
    pub threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvestorEntry {
    pub registrar: String,
    pub id: String,
    pub country: u16,
    pub rating: u8,
    /// Epoch seconds.
    pub expiry: i64,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuerEntry {
    /// Scenario-local name used in references.
    pub name: String,
    pub owners: Vec<String>,
    #[serde(default = "one")]
    pub threshold: u32,
    #[serde(default)]
    pub registrars: Vec<String>,
    #[serde(default)]
    pub countries: Vec<CountryEntry>,
    #[serde(default)]
    pub limits: Option<InvestorLimits>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
    #[serde(default)]
    pub authorities: Vec<AuthorityEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountryEntry {
    pub code: u16,
    pub min_rating: u8,
    pub limit: u64,
    /// Per-rating caps within the country.
    #[serde(default)]
    pub rating_limits: BTreeMap<u8, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenEntry {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub initial_supply: u64,
    #[serde(default)]
    pub authorized_supply: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorityEntry {
    pub addresses: Vec<String>,
    pub permissions: Vec<IssuerAction>,
    #[serde(default = "one")]
    pub threshold: u32,
    /// Epoch seconds; absent means no expiry.
    #[serde(default)]
    pub approved_until: Option<i64>,
}

fn one() -> u32 {
    1
}

/// One replayed call and the outcome the author expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub expect: Option<Expect>,
}

/// Expected outcome of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    Committed,
    Pending,
    Rejected,
}

/// Calls a step can make.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Transfer {
        caller: String,
        token: String,
        to: String,
        amount: u64,
    },
    TransferFrom {
        caller: String,
        token: String,
        from: String,
        to: String,
        amount: u64,
    },
    Approve {
        caller: String,
        token: String,
        spender: String,
        amount: u64,
    },
    Mint {
        module: String,
        token: String,
        amount: u64,
    },
    Burn {
        module: String,
        token: String,
        amount: u64,
    },
    AttachModule {
        caller: String,
        issuer: String,
        module: String,
    },
    DetachModule {
        caller: String,
        issuer: String,
        module: String,
    },
    LockToken {
        caller: String,
        token: String,
        locked: bool,
    },
    LockIssuer {
        caller: String,
        issuer: String,
        locked: bool,
    },
    SetRestricted {
        caller: String,
        registrar: String,
        investor: String,
        restricted: bool,
    },
    UpdateRating {
        caller: String,
        registrar: String,
        investor: String,
        rating: u8,
    },
    UpdateCountry {
        caller: String,
        registrar: String,
        investor: String,
        country: u16,
    },
    UpdateExpiry {
        caller: String,
        registrar: String,
        investor: String,
        expiry: i64,
    },
    /// Move the clock forward.
    Advance { seconds: u32 },
}

impl Action {
    /// Step name as written in the file.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "transfer",
            Self::TransferFrom { .. } => "transfer_from",
            Self::Approve { .. } => "approve",
            Self::Mint { .. } => "mint",
            Self::Burn { .. } => "burn",
            Self::AttachModule { .. } => "attach_module",
            Self::DetachModule { .. } => "detach_module",
            Self::LockToken { .. } => "lock_token",
            Self::LockIssuer { .. } => "lock_issuer",
            Self::SetRestricted { .. } => "set_restricted",
            Self::UpdateRating { .. } => "update_rating",
            Self::UpdateCountry { .. } => "update_country",
            Self::UpdateExpiry { .. } => "update_expiry",
            Self::Advance { .. } => "advance",
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────

/// Failure to read or parse a scenario file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

impl Scenario {
    /// Parse a scenario from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Read and parse a scenario file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| LoadError::Parse { path: display, source })
    }
}

// ─── Structural checks ───────────────────────────────────────────────

/// A structural problem found by [`Scenario::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioIssue {
    #[error("{what} `{name}` is defined more than once")]
    Duplicate { what: &'static str, name: String },
    #[error("{what} `{name}` is not defined")]
    Undefined { what: &'static str, name: String },
    #[error("{context}: threshold {threshold} needs between 1 and {signers} signers")]
    Threshold {
        context: String,
        threshold: u32,
        signers: usize,
    },
    #[error("{context}: {detail}")]
    Invalid { context: String, detail: String },
}

impl Scenario {
    /// Check references, thresholds and value ranges without running
    /// anything. Returns every problem found.
    pub fn validate(&self) -> Vec<ScenarioIssue> {
        let mut issues = Vec::new();

        let registrars = unique(
            self.registrars.iter().map(|r| r.id.as_str()),
            "registrar",
            &mut issues,
        );
        for r in &self.registrars {
            check_signers(&format!("registrar {}", r.id), &r.owners, r.threshold, &mut issues);
        }

        let mut investors = BTreeMap::<&str, BTreeSet<&str>>::new();
        for i in &self.investors {
            let context = format!("investor {}", i.id);
            if !registrars.contains(i.registrar.as_str()) {
                issues.push(undefined("registrar", &i.registrar));
            }
            investors.entry(i.registrar.as_str()).or_default().insert(i.id.as_str());
            check_country(&context, i.country, &mut issues);
            check_rating(&context, i.rating, &mut issues);
            if i.addresses.is_empty() {
                issues.push(invalid(&context, "at least one address is required"));
            }
        }

        let issuers = unique(self.issuers.iter().map(|i| i.name.as_str()), "issuer", &mut issues);
        let mut tokens = BTreeSet::new();
        for issuer in &self.issuers {
            let context = format!("issuer {}", issuer.name);
            check_signers(&context, &issuer.owners, issuer.threshold, &mut issues);
            for r in &issuer.registrars {
                if !registrars.contains(r.as_str()) {
                    issues.push(undefined("registrar", r));
                }
            }
            for c in &issuer.countries {
                check_country(&context, c.code, &mut issues);
                check_rating(&context, c.min_rating, &mut issues);
                for rating in c.rating_limits.keys() {
                    check_rating(&context, *rating, &mut issues);
                }
            }
            let symbols = unique(
                issuer.tokens.iter().map(|t| t.symbol.as_str()),
                "token symbol",
                &mut issues,
            );
            for t in &issuer.tokens {
                if t.symbol.trim().is_empty() || t.name.trim().is_empty() {
                    issues.push(invalid(&context, "token name and symbol must be non-empty"));
                }
                if t.authorized_supply.is_some_and(|cap| cap < t.initial_supply) {
                    issues.push(invalid(
                        &format!("token {}.{}", issuer.name, t.symbol),
                        "authorized supply is below the initial supply",
                    ));
                }
            }
            tokens.extend(symbols.into_iter().map(|s| format!("{}.{}", issuer.name, s)));
            for a in &issuer.authorities {
                check_signers(&format!("{context} authority"), &a.addresses, a.threshold, &mut issues);
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            let context = format!("step {} ({})", index + 1, step.action.name());
            let token_ref = |t: &str, issues: &mut Vec<ScenarioIssue>| {
                if !tokens.contains(t) {
                    issues.push(undefined("token", t));
                }
            };
            let issuer_ref = |i: &str, issues: &mut Vec<ScenarioIssue>| {
                if !issuers.contains(i) {
                    issues.push(undefined("issuer", i));
                }
            };
            let investor_ref = |r: &str, id: &str, issues: &mut Vec<ScenarioIssue>| {
                if !registrars.contains(r) {
                    issues.push(undefined("registrar", r));
                } else if !investors.get(r).is_some_and(|ids| ids.contains(id)) {
                    issues.push(undefined("investor", id));
                }
            };
            match &step.action {
                Action::Transfer { token, to, .. } => {
                    token_ref(token, &mut issues);
                    treasury_ref(to, &issuers, &mut issues);
                }
                Action::TransferFrom { token, from, to, .. } => {
                    token_ref(token, &mut issues);
                    treasury_ref(from, &issuers, &mut issues);
                    treasury_ref(to, &issuers, &mut issues);
                }
                Action::Approve { token, .. }
                | Action::Mint { token, .. }
                | Action::Burn { token, .. }
                | Action::LockToken { token, .. } => token_ref(token, &mut issues),
                Action::AttachModule { issuer, .. }
                | Action::DetachModule { issuer, .. }
                | Action::LockIssuer { issuer, .. } => issuer_ref(issuer, &mut issues),
                Action::SetRestricted {
                    registrar, investor, ..
                }
                | Action::UpdateExpiry {
                    registrar, investor, ..
                } => investor_ref(registrar, investor, &mut issues),
                Action::UpdateRating {
                    registrar,
                    investor,
                    rating,
                    ..
                } => {
                    investor_ref(registrar, investor, &mut issues);
                    check_rating(&context, *rating, &mut issues);
                }
                Action::UpdateCountry {
                    registrar,
                    investor,
                    country,
                    ..
                } => {
                    investor_ref(registrar, investor, &mut issues);
                    check_country(&context, *country, &mut issues);
                }
                Action::Advance { .. } => {}
            }
        }

        issues
    }
}

fn unique<'a>(
    names: impl Iterator<Item = &'a str>,
    what: &'static str,
    issues: &mut Vec<ScenarioIssue>,
) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            issues.push(ScenarioIssue::Duplicate {
                what,
                name: name.to_string(),
            });
        }
    }
    seen
}

fn undefined(what: &'static str, name: &str) -> ScenarioIssue {
    ScenarioIssue::Undefined {
        what,
        name: name.to_string(),
    }
}

fn invalid(context: &str, detail: impl Into<String>) -> ScenarioIssue {
    ScenarioIssue::Invalid {
        context: context.to_string(),
        detail: detail.into(),
    }
}

fn check_signers(context: &str, signers: &[String], threshold: u32, issues: &mut Vec<ScenarioIssue>) {
    let distinct: BTreeSet<&String> = signers.iter().collect();
    if distinct.len() != signers.len() {
        issues.push(invalid(context, "signer addresses repeat"));
    }
    if threshold == 0 || threshold as usize > signers.len() {
        issues.push(ScenarioIssue::Threshold {
            context: context.to_string(),
            threshold,
            signers: signers.len(),
        });
    }
}

fn check_country(context: &str, code: u16, issues: &mut Vec<ScenarioIssue>) {
    if let Err(e) = CountryCode::new(code) {
        issues.push(invalid(context, e.to_string()));
    }
}

fn check_rating(context: &str, rating: u8, issues: &mut Vec<ScenarioIssue>) {
    if let Err(e) = Rating::new(rating) {
        issues.push(invalid(context, e.to_string()));
    }
}

fn treasury_ref(label: &str, issuers: &BTreeSet<&str>, issues: &mut Vec<ScenarioIssue>) {
    if let Some(name) = label.strip_prefix('@') {
        if !issuers.contains(name) {
            issues.push(undefined("issuer", name));
        }
    }
}
