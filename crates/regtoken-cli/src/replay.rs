//! # Scenario Replay
//!
//! Builds a fresh [`Engine`] on a [`FixedClock`] from a scenario's
//! deployment section, then runs each step and records its outcome.
//!
//! ## Deployment
//!
//! ```text
//! registrars ─▶ investors ─▶ issuers
//!                              ├── link registrars
//!                              ├── countries, rating limits, investor limits
//!                              ├── tokens (+ authorized supply)
//!                              ├── modules
//!                              └── authorities
//! ```
//!
//! Multisig-gated deployment calls are co-signed by the owners in listed
//! order until the threshold is met. Any deployment failure aborts the
//! replay. Steps never abort it: a rejected step is an outcome.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use regtoken_core::{
    Address, Approval, CountryCode, FixedClock, InvestorId, IssuerId, Rating, RegistrarId, RegtokenError,
    Timestamp, TokenId,
};
use regtoken_kyc::InvestorProfile;
use regtoken_ledger::{Engine, TokenInfo};
use regtoken_policy::CounterSnapshot;

use crate::scenario::{Action, Expect, IssuerEntry, RegistrarEntry, Scenario};

// ─── Outcomes ────────────────────────────────────────────────────────

/// What a step did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Applied. Carries the receipt for balance changes.
    Committed {
        #[serde(skip_serializing_if = "Option::is_none")]
        receipt: Option<serde_json::Value>,
    },
    /// Signed but below threshold.
    Pending { signatures: u32, threshold: u32 },
    /// Refused; nothing changed.
    Rejected { kind: &'static str, reason: String },
}

impl Outcome {
    fn committed<T: Serialize>(receipt: &T) -> Self {
        Self::Committed {
            receipt: serde_json::to_value(receipt).ok(),
        }
    }

    fn rejected(err: &RegtokenError) -> Self {
        let kind = match err {
            RegtokenError::Validation(_) => "validation",
            RegtokenError::NotFound(_) => "not_found",
            RegtokenError::Duplicate(_) => "duplicate",
            RegtokenError::ComplianceDenied(_) => "compliance_denied",
            RegtokenError::Authorization(_) => "authorization",
            RegtokenError::InvariantViolation(_) => "invariant_violation",
        };
        Self::Rejected {
            kind,
            reason: err.to_string(),
        }
    }

    fn approval(approval: Approval<()>) -> Self {
        match approval {
            Approval::Pending { signatures, threshold } => Self::Pending { signatures, threshold },
            Approval::Executed(()) => Self::Committed { receipt: None },
        }
    }

    /// The [`Expect`] this outcome satisfies.
    pub fn kind(&self) -> Expect {
        match self {
            Self::Committed { .. } => Expect::Committed,
            Self::Pending { .. } => Expect::Pending,
            Self::Rejected { .. } => Expect::Rejected,
        }
    }
}

fn settle<T>(result: Result<T, RegtokenError>, ok: impl FnOnce(T) -> Outcome) -> Outcome {
    match result {
        Ok(value) => ok(value),
        Err(err) => Outcome::rejected(&err),
    }
}

// ─── Report ──────────────────────────────────────────────────────────

/// One replayed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// 1-based position in the file.
    pub index: usize,
    pub action: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Expect>,
    /// False only when an expectation was given and not met.
    pub matched: bool,
}

/// End state of one token.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSummary {
    #[serde(flatten)]
    pub info: TokenInfo,
    pub treasury_balance: u64,
    /// Nonzero balances by scenario label.
    pub holders: BTreeMap<String, u64>,
}

/// End state of one issuer.
#[derive(Debug, Clone, Serialize)]
pub struct IssuerSummary {
    pub name: String,
    pub id: IssuerId,
    pub treasury: Address,
    pub counters: CounterSnapshot,
    pub modules: Vec<Address>,
    pub tokens: Vec<TokenSummary>,
}

/// Full result of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Clock at the start of the steps, epoch seconds.
    pub start: i64,
    pub steps: Vec<StepReport>,
    pub mismatches: usize,
    pub issuers: Vec<IssuerSummary>,
}

// ─── Replay ──────────────────────────────────────────────────────────

/// An engine deployed from a scenario, plus the label tables that map
/// scenario names onto engine ids.
pub struct Replay {
    engine: Engine<FixedClock>,
    start: i64,
    issuers: BTreeMap<String, IssuerId>,
    tokens: BTreeMap<String, TokenId>,
    labels: BTreeSet<String>,
}

impl Replay {
    /// Deploy the scenario's initial state with the clock at `start`.
    pub fn deploy(scenario: &Scenario, start: i64) -> Result<Self> {
        let clock = FixedClock::at_epoch(start).context("invalid start time")?;
        let mut replay = Self {
            engine: Engine::with_clock(clock),
            start,
            issuers: BTreeMap::new(),
            tokens: BTreeMap::new(),
            labels: BTreeSet::new(),
        };

        for r in &scenario.registrars {
            let id = RegistrarId::new(r.id.as_str())?;
            let owners = addresses(&r.owners);
            replay
                .engine
                .create_registrar(id, &owners, r.threshold)
                .with_context(|| format!("creating registrar {}", r.id))?;
        }

        for i in &scenario.investors {
            let registrar = RegistrarId::new(i.registrar.as_str())?;
            let owners = registrar_owners(&scenario.registrars, &i.registrar)?;
            let id = InvestorId::new(i.id.as_str())?;
            let profile = InvestorProfile {
                country: CountryCode::new(i.country)?,
                rating: Rating::new(i.rating)?,
                expiry: Timestamp::from_epoch_secs(i.expiry)?,
            };
            let bound = addresses(&i.addresses);
            replay.labels.extend(i.addresses.iter().cloned());
            let engine = &mut replay.engine;
            co_sign(&owners, |caller| {
                engine.add_investor(caller, &registrar, &id, profile, &bound)
            })
            .with_context(|| format!("adding investor {}", i.id))?;
        }

        for issuer in &scenario.issuers {
            replay
                .deploy_issuer(issuer)
                .with_context(|| format!("deploying issuer {}", issuer.name))?;
        }

        tracing::info!(
            start,
            issuers = replay.issuers.len(),
            tokens = replay.tokens.len(),
            "scenario deployed"
        );
        Ok(replay)
    }

    fn deploy_issuer(&mut self, entry: &IssuerEntry) -> Result<()> {
        let owners = addresses(&entry.owners);
        let engine = &mut self.engine;
        let issuer = engine.create_issuer(&owners, entry.threshold)?;

        for r in &entry.registrars {
            let registrar = RegistrarId::new(r.as_str())?;
            co_sign(&owners, |caller| engine.add_registrar(caller, &issuer, &registrar))?;
        }

        if !entry.countries.is_empty() {
            let mut codes = Vec::new();
            let mut ratings = Vec::new();
            let mut limits = Vec::new();
            for c in &entry.countries {
                codes.push(CountryCode::new(c.code)?);
                ratings.push(Rating::new(c.min_rating)?);
                limits.push(c.limit);
            }
            co_sign(&owners, |caller| {
                engine.set_countries(caller, &issuer, &codes, &ratings, &limits)
            })?;
            for c in &entry.countries {
                let country = CountryCode::new(c.code)?;
                for (rating, limit) in &c.rating_limits {
                    let rating = Rating::new(*rating)?;
                    co_sign(&owners, |caller| {
                        engine.set_country_rating_limit(caller, &issuer, country, rating, Some(*limit))
                    })?;
                }
            }
        }

        if let Some(limits) = &entry.limits {
            co_sign(&owners, |caller| {
                engine.set_investor_limits(caller, &issuer, limits.clone())
            })?;
        }

        for t in &entry.tokens {
            let token = co_sign(&owners, |caller| {
                engine.add_token(caller, &issuer, &t.name, &t.symbol, t.initial_supply)
            })?;
            if let Some(cap) = t.authorized_supply {
                co_sign(&owners, |caller| engine.modify_authorized_supply(caller, &token, cap))?;
            }
            self.tokens.insert(format!("{}.{}", entry.name, t.symbol), token);
        }

        for m in &entry.modules {
            let module = Address::derive(m);
            co_sign(&owners, |caller| engine.attach_module(caller, &issuer, &module))?;
        }

        for a in &entry.authorities {
            let members = addresses(&a.addresses);
            let until = a.approved_until.map(Timestamp::from_epoch_secs).transpose()?;
            co_sign(&owners, |caller| {
                engine.add_authority(caller, &issuer, &members, &a.permissions, until, a.threshold)
            })?;
        }

        self.issuers.insert(entry.name.clone(), issuer);
        Ok(())
    }

    fn collect_labels(&mut self, action: &Action) {
        let mut add = |label: &String| {
            if !label.starts_with('@') {
                self.labels.insert(label.clone());
            }
        };
        match action {
            Action::Transfer { caller, to, .. } => {
                add(caller);
                add(to);
            }
            Action::TransferFrom { caller, from, to, .. } => {
                add(caller);
                add(from);
                add(to);
            }
            Action::Approve { caller, spender, .. } => {
                add(caller);
                add(spender);
            }
            _ => {}
        }
    }

    /// The deployed engine.
    pub fn engine(&self) -> &Engine<FixedClock> {
        &self.engine
    }

    fn token(&self, reference: &str) -> Result<TokenId> {
        self.tokens
            .get(reference)
            .cloned()
            .with_context(|| format!("token `{reference}` is not defined"))
    }

    fn issuer(&self, name: &str) -> Result<IssuerId> {
        self.issuers
            .get(name)
            .cloned()
            .with_context(|| format!("issuer `{name}` is not defined"))
    }

    /// `@issuer` resolves to the treasury; anything else is a label.
    fn address(&self, label: &str) -> Result<Address> {
        match label.strip_prefix('@') {
            Some(name) => Ok(self.engine.issuer(&self.issuer(name)?)?.treasury().clone()),
            None => Ok(Address::derive(label)),
        }
    }

    /// Run one step. Engine refusals become [`Outcome::Rejected`]; only an
    /// unresolvable reference is an error.
    pub fn step(&mut self, action: &Action) -> Result<Outcome> {
        let outcome = match action {
            Action::Transfer {
                caller,
                token,
                to,
                amount,
            } => {
                let (caller, token, to) = (self.address(caller)?, self.token(token)?, self.address(to)?);
                settle(self.engine.transfer(&caller, &token, &to, *amount), |r| {
                    Outcome::committed(&r)
                })
            }
            Action::TransferFrom {
                caller,
                token,
                from,
                to,
                amount,
            } => {
                let (caller, token) = (self.address(caller)?, self.token(token)?);
                let (from, to) = (self.address(from)?, self.address(to)?);
                settle(
                    self.engine.transfer_from(&caller, &token, &from, &to, *amount),
                    |r| Outcome::committed(&r),
                )
            }
            Action::Approve {
                caller,
                token,
                spender,
                amount,
            } => {
                let (caller, token, spender) = (self.address(caller)?, self.token(token)?, self.address(spender)?);
                settle(self.engine.approve(&caller, &token, &spender, *amount), |()| {
                    Outcome::Committed { receipt: None }
                })
            }
            Action::Mint { module, token, amount } => {
                let (module, token) = (Address::derive(module), self.token(token)?);
                settle(self.engine.mint(&module, &token, *amount), |r| Outcome::committed(&r))
            }
            Action::Burn { module, token, amount } => {
                let (module, token) = (Address::derive(module), self.token(token)?);
                settle(self.engine.burn(&module, &token, *amount), |r| Outcome::committed(&r))
            }
            Action::AttachModule { caller, issuer, module } => {
                let (caller, issuer) = (Address::derive(caller), self.issuer(issuer)?);
                settle(
                    self.engine.attach_module(&caller, &issuer, &Address::derive(module)),
                    Outcome::approval,
                )
            }
            Action::DetachModule { caller, issuer, module } => {
                let (caller, issuer) = (Address::derive(caller), self.issuer(issuer)?);
                settle(
                    self.engine.detach_module(&caller, &issuer, &Address::derive(module)),
                    Outcome::approval,
                )
            }
            Action::LockToken { caller, token, locked } => {
                let (caller, token) = (Address::derive(caller), self.token(token)?);
                settle(
                    self.engine.set_token_restriction(&caller, &token, *locked),
                    Outcome::approval,
                )
            }
            Action::LockIssuer { caller, issuer, locked } => {
                let (caller, issuer) = (Address::derive(caller), self.issuer(issuer)?);
                settle(
                    self.engine.set_global_restriction(&caller, &issuer, *locked),
                    Outcome::approval,
                )
            }
            Action::SetRestricted {
                caller,
                registrar,
                investor,
                restricted,
            } => {
                let (registrar, investor) = (RegistrarId::new(registrar.as_str())?, InvestorId::new(investor.as_str())?);
                settle(
                    self.engine
                        .set_restricted(&Address::derive(caller), &registrar, &investor, *restricted),
                    Outcome::approval,
                )
            }
            Action::UpdateRating {
                caller,
                registrar,
                investor,
                rating,
            } => {
                let (registrar, investor) = (RegistrarId::new(registrar.as_str())?, InvestorId::new(investor.as_str())?);
                let rating = Rating::new(*rating)?;
                settle(
                    self.engine
                        .update_rating(&Address::derive(caller), &registrar, &investor, rating),
                    Outcome::approval,
                )
            }
            Action::UpdateCountry {
                caller,
                registrar,
                investor,
                country,
            } => {
                let (registrar, investor) = (RegistrarId::new(registrar.as_str())?, InvestorId::new(investor.as_str())?);
                let country = CountryCode::new(*country)?;
                settle(
                    self.engine
                        .update_country(&Address::derive(caller), &registrar, &investor, country),
                    Outcome::approval,
                )
            }
            Action::UpdateExpiry {
                caller,
                registrar,
                investor,
                expiry,
            } => {
                let (registrar, investor) = (RegistrarId::new(registrar.as_str())?, InvestorId::new(investor.as_str())?);
                let expiry = Timestamp::from_epoch_secs(*expiry)?;
                settle(
                    self.engine
                        .update_expiry(&Address::derive(caller), &registrar, &investor, expiry),
                    Outcome::approval,
                )
            }
            Action::Advance { seconds } => {
                self.engine.clock().advance(*seconds);
                tracing::debug!(seconds, now = %self.engine.now(), "clock advanced");
                Outcome::Committed { receipt: None }
            }
        };
        Ok(outcome)
    }

    /// Run every step of `scenario` and summarize the end state.
    pub fn run(mut self, scenario: &Scenario) -> Result<RunReport> {
        for step in &scenario.steps {
            self.collect_labels(&step.action);
        }
        let mut steps = Vec::with_capacity(scenario.steps.len());
        for (i, step) in scenario.steps.iter().enumerate() {
            let outcome = self
                .step(&step.action)
                .with_context(|| format!("step {}", i + 1))?;
            let matched = step.expect.map_or(true, |e| e == outcome.kind());
            if !matched {
                tracing::warn!(step = i + 1, action = step.action.name(), ?outcome, "unexpected outcome");
            }
            steps.push(StepReport {
                index: i + 1,
                action: step.action.name(),
                outcome,
                expected: step.expect,
                matched,
            });
        }
        let mismatches = steps.iter().filter(|s| !s.matched).count();
        Ok(RunReport {
            start: self.start,
            steps,
            mismatches,
            issuers: self.summarize()?,
        })
    }

    fn summarize(&self) -> Result<Vec<IssuerSummary>> {
        let mut out = Vec::new();
        for (name, id) in &self.issuers {
            let issuer = self.engine.issuer(id)?;
            let mut tokens = Vec::new();
            for info in self.engine.tokens(id) {
                let mut holders = BTreeMap::new();
                for label in &self.labels {
                    let balance = self.engine.balance_of(&info.id, &Address::derive(label))?;
                    if balance > 0 {
                        holders.insert(label.clone(), balance);
                    }
                }
                tokens.push(TokenSummary {
                    treasury_balance: self.engine.treasury_supply(&info.id)?,
                    info,
                    holders,
                });
            }
            out.push(IssuerSummary {
                name: name.clone(),
                id: id.clone(),
                treasury: issuer.treasury().clone(),
                counters: self.engine.counters(id),
                modules: self.engine.attached_modules(id),
                tokens,
            });
        }
        Ok(out)
    }
}

fn registrar_owners(registrars: &[RegistrarEntry], id: &str) -> Result<Vec<Address>> {
    match registrars.iter().find(|r| r.id == id) {
        Some(r) => Ok(addresses(&r.owners)),
        None => bail!("registrar `{id}` is not defined"),
    }
}

fn addresses(labels: &[String]) -> Vec<Address> {
    labels.iter().map(|l| Address::derive(l)).collect()
}

/// Submit the same call from each owner in turn until it executes.
fn co_sign<T>(
    owners: &[Address],
    mut call: impl FnMut(&Address) -> Result<Approval<T>, RegtokenError>,
) -> Result<T> {
    for owner in owners {
        if let Approval::Executed(value) = call(owner)? {
            return Ok(value);
        }
    }
    bail!("threshold not reached after {} signatures", owners.len())
}
