//! # Policy Store
//!
//! Owned per-issuer policy and counter state. Passed by reference into the
//! compliance engine and written by the ledger; never a process-wide
//! singleton, so any number of issuers coexist with isolated state.
//!
//! ## Admission Checks
//!
//! ```text
//! check_eligibility   country permitted ─▶ rating ≥ min_rating
//! check_admission     country limit ─▶ country/rating limit ─▶ total limit ─▶ total/rating limit
//! ```
//!
//! Eligibility applies to every incoming transfer. Admission applies only
//! when the transfer takes the receiving investor from zero to nonzero. A
//! holder divesting in the same transfer frees their slot first.
//! Limits are enforced going forward: lowering a limit below the current
//! count evicts nobody.
//!
//! A transfer that moves a holder into another `(country, rating)` bucket
//! passes [`PolicyStore::check_reclassification`]: every limit whose count
//! the move raises must have room. A registrar changing a holder's KYC
//! record is not an issuer decision; [`PolicyStore::reclassify`] follows it
//! unconditionally, the same way a lowered limit evicts nobody.

use std::collections::BTreeMap;

use regtoken_core::{
    CountryCode, DenialReason, InvestorId, IssuerId, NotFoundError, Rating, RegtokenError,
};

use crate::country::{check_lengths, CountryInfo, CountryPolicy, InvestorLimits};
use crate::counters::{Classification, CounterSnapshot, CounterTransition, Counters};

#[derive(Debug, Clone, Default)]
struct IssuerPolicy {
    countries: BTreeMap<CountryCode, CountryPolicy>,
    limits: InvestorLimits,
    counters: Counters,
}

/// Country policies, investor limits and investor counters for every
/// issuer.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    issuers: BTreeMap<IssuerId, IssuerPolicy>,
}

impl PolicyStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Policy writes ───────────────────────────────────────────────

    /// Replace the policy of one country. Per-rating limits already set on
    /// the country are kept unless `policy` carries its own.
    pub fn set_country_policy(&mut self, issuer: &IssuerId, country: CountryCode, policy: CountryPolicy) {
        let state = self.issuers.entry(issuer.clone()).or_default();
        let mut policy = policy;
        if policy.rating_limits.is_empty() {
            if let Some(previous) = state.countries.get(&country) {
                policy.rating_limits = previous.rating_limits.clone();
            }
        }
        tracing::info!(
            issuer = %issuer,
            country = %country,
            min_rating = %policy.min_rating,
            limit = policy.investor_limit,
            permitted = policy.permitted,
            "country policy set"
        );
        state.countries.insert(country, policy);
    }

    /// Replace the policies of several countries at once, marking each
    /// permitted. The three slices are parallel.
    pub fn set_countries(
        &mut self,
        issuer: &IssuerId,
        countries: &[CountryCode],
        min_ratings: &[Rating],
        limits: &[u64],
    ) -> Result<(), RegtokenError> {
        check_lengths(countries.len(), min_ratings.len(), limits.len())?;
        for ((country, min_rating), limit) in countries.iter().zip(min_ratings).zip(limits) {
            self.set_country_policy(issuer, *country, CountryPolicy::new(*min_rating, *limit));
        }
        Ok(())
    }

    /// Allow or disallow countries without touching their other settings.
    /// Disallowing a country with no policy is a no-op.
    pub fn set_country_permitted(&mut self, issuer: &IssuerId, countries: &[CountryCode], permitted: bool) {
        let state = self.issuers.entry(issuer.clone()).or_default();
        for country in countries {
            if let Some(policy) = state.countries.get_mut(country) {
                policy.permitted = permitted;
                tracing::info!(issuer = %issuer, country = %country, permitted, "country permission set");
            }
        }
    }

    /// Set or clear the cap for one rating within a country.
    pub fn set_country_rating_limit(
        &mut self,
        issuer: &IssuerId,
        country: CountryCode,
        rating: Rating,
        limit: Option<u64>,
    ) -> Result<(), RegtokenError> {
        let policy = self
            .issuers
            .get_mut(issuer)
            .and_then(|state| state.countries.get_mut(&country))
            .ok_or_else(|| NotFoundError::CountryPolicy {
                issuer: issuer.clone(),
                country,
            })?;
        match limit {
            Some(limit) => policy.rating_limits.insert(rating, limit),
            None => policy.rating_limits.remove(&rating),
        };
        tracing::info!(issuer = %issuer, country = %country, rating = %rating, ?limit, "country rating limit set");
        Ok(())
    }

    /// Replace the issuer-wide investor limits.
    pub fn set_investor_limits(&mut self, issuer: &IssuerId, limits: InvestorLimits) {
        tracing::info!(issuer = %issuer, total = ?limits.total, "investor limits set");
        self.issuers.entry(issuer.clone()).or_default().limits = limits;
    }

    // ─── Decisions ───────────────────────────────────────────────────

    /// Country permitted and rating high enough.
    pub fn check_eligibility(&self, issuer: &IssuerId, class: Classification) -> Result<(), DenialReason> {
        let policy = self
            .policy(issuer, class.country)
            .filter(|p| p.permitted)
            .ok_or(DenialReason::CountryNotPermitted(class.country))?;
        if class.rating < policy.min_rating {
            return Err(DenialReason::RatingTooLow {
                country: class.country,
                rating: class.rating,
                min_rating: policy.min_rating,
            });
        }
        Ok(())
    }

    /// Room for one more investor of this classification.
    pub fn check_admission(&self, issuer: &IssuerId, class: Classification) -> Result<(), DenialReason> {
        self.check_admission_vacating(issuer, class, None)
    }

    /// Room for one more investor of this classification once `vacating`,
    /// a current holder divesting in the same step, has left.
    pub fn check_admission_vacating(
        &self,
        issuer: &IssuerId,
        class: Classification,
        vacating: Option<&InvestorId>,
    ) -> Result<(), DenialReason> {
        let policy = self
            .policy(issuer, class.country)
            .filter(|p| p.permitted)
            .ok_or(DenialReason::CountryNotPermitted(class.country))?;
        let Some(state) = self.issuers.get(issuer) else {
            return Err(DenialReason::CountryNotPermitted(class.country));
        };
        let counters = &state.counters;
        let freed = vacating.and_then(|investor| counters.classification(investor));
        let less = |count: u64, matches: bool| if matches { count.saturating_sub(1) } else { count };

        let country_count = less(counters.country(class.country), freed.map_or(false, |f| f.country == class.country));
        if country_count >= policy.investor_limit {
            return Err(DenialReason::InvestorLimitExceeded {
                country: class.country,
                limit: policy.investor_limit,
            });
        }
        if let Some(limit) = policy.rating_limits.get(&class.rating) {
            if less(counters.bucket(class), freed == Some(class)) >= *limit {
                return Err(DenialReason::CountryRatingLimitExceeded {
                    country: class.country,
                    rating: class.rating,
                    limit: *limit,
                });
            }
        }
        if let Some(limit) = state.limits.total {
            if less(counters.total(), freed.is_some()) >= limit {
                return Err(DenialReason::TotalInvestorLimitExceeded { limit });
            }
        }
        if let Some(limit) = state.limits.per_rating.get(&class.rating) {
            if less(counters.rating(class.rating), freed.map_or(false, |f| f.rating == class.rating)) >= *limit {
                return Err(DenialReason::TotalRatingLimitExceeded {
                    rating: class.rating,
                    limit: *limit,
                });
            }
        }
        Ok(())
    }

    /// Room for a current holder to move into `class`. Only limits whose
    /// count the move raises are consulted; the issuer-wide total never
    /// changes.
    pub fn check_reclassification(
        &self,
        issuer: &IssuerId,
        investor: &InvestorId,
        class: Classification,
    ) -> Result<(), DenialReason> {
        let Some(state) = self.issuers.get(issuer) else {
            return Err(DenialReason::CountryNotPermitted(class.country));
        };
        let counters = &state.counters;
        let Some(old) = counters.classification(investor) else {
            return self.check_admission(issuer, class);
        };
        if old == class {
            return Ok(());
        }
        let policy = self
            .policy(issuer, class.country)
            .filter(|p| p.permitted)
            .ok_or(DenialReason::CountryNotPermitted(class.country))?;

        if old.country != class.country && counters.country(class.country) >= policy.investor_limit {
            return Err(DenialReason::InvestorLimitExceeded {
                country: class.country,
                limit: policy.investor_limit,
            });
        }
        if let Some(limit) = policy.rating_limits.get(&class.rating) {
            if counters.bucket(class) >= *limit {
                return Err(DenialReason::CountryRatingLimitExceeded {
                    country: class.country,
                    rating: class.rating,
                    limit: *limit,
                });
            }
        }
        if old.rating != class.rating {
            if let Some(limit) = state.limits.per_rating.get(&class.rating) {
                if counters.rating(class.rating) >= *limit {
                    return Err(DenialReason::TotalRatingLimitExceeded {
                        rating: class.rating,
                        limit: *limit,
                    });
                }
            }
        }
        Ok(())
    }

    /// `check_eligibility` and `check_admission` together.
    pub fn can_admit(&self, issuer: &IssuerId, class: Classification) -> bool {
        self.check_eligibility(issuer, class).is_ok() && self.check_admission(issuer, class).is_ok()
    }

    // ─── Counter writes ──────────────────────────────────────────────

    /// Apply a batch of holder transitions, all or nothing.
    pub fn apply(&mut self, issuer: &IssuerId, batch: &[CounterTransition]) -> Result<(), RegtokenError> {
        if batch.is_empty() {
            return Ok(());
        }
        let state = self.issuers.entry(issuer.clone()).or_default();
        state.counters.apply(batch)?;
        tracing::debug!(
            issuer = %issuer,
            transitions = batch.len(),
            total_investors = state.counters.total(),
            "investor counters updated"
        );
        Ok(())
    }

    /// Record that an investor's aggregate balance became nonzero.
    pub fn on_balance_becomes_nonzero(
        &mut self,
        issuer: &IssuerId,
        investor: &InvestorId,
        class: Classification,
    ) -> Result<(), RegtokenError> {
        self.apply(
            issuer,
            &[CounterTransition::Admit {
                investor: investor.clone(),
                class,
            }],
        )
    }

    /// Move a current holder to the bucket of their new KYC
    /// classification without consulting limits. Returns whether anything
    /// changed; an investor that holds nothing is left alone.
    pub fn reclassify(
        &mut self,
        issuer: &IssuerId,
        investor: &InvestorId,
        class: Classification,
    ) -> Result<bool, RegtokenError> {
        match self.classification(issuer, investor) {
            Some(old) if old != class => {
                self.apply(
                    issuer,
                    &[CounterTransition::Reclassify {
                        investor: investor.clone(),
                        class,
                    }],
                )?;
                tracing::info!(
                    issuer = %issuer,
                    investor = %investor,
                    country = %class.country,
                    rating = %class.rating,
                    "holder reclassified"
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Record that an investor's aggregate balance became zero.
    pub fn on_balance_becomes_zero(&mut self, issuer: &IssuerId, investor: &InvestorId) -> Result<(), RegtokenError> {
        self.apply(
            issuer,
            &[CounterTransition::Divest {
                investor: investor.clone(),
            }],
        )
    }

    // ─── Reads ───────────────────────────────────────────────────────

    /// The policy of one country, if set.
    pub fn policy(&self, issuer: &IssuerId, country: CountryCode) -> Option<&CountryPolicy> {
        self.issuers.get(issuer)?.countries.get(&country)
    }

    /// Count, limit, minimum rating and permission of one country.
    pub fn country_info(&self, issuer: &IssuerId, country: CountryCode) -> CountryInfo {
        let policy = self.policy(issuer, country);
        CountryInfo {
            count: self.country_investor_count(issuer, country, None),
            limit: policy.map_or(0, |p| p.investor_limit),
            min_rating: policy.map(|p| p.min_rating),
            permitted: policy.map_or(false, |p| p.permitted),
        }
    }

    /// Investors of a country, optionally narrowed to one rating.
    pub fn country_investor_count(&self, issuer: &IssuerId, country: CountryCode, rating: Option<Rating>) -> u64 {
        let Some(state) = self.issuers.get(issuer) else {
            return 0;
        };
        match rating {
            Some(rating) => state.counters.bucket(Classification { country, rating }),
            None => state.counters.country(country),
        }
    }

    /// Investor limit of a country; zero when the country has no policy.
    pub fn country_investor_limit(&self, issuer: &IssuerId, country: CountryCode) -> u64 {
        self.policy(issuer, country).map_or(0, |p| p.investor_limit)
    }

    /// Distinct investors with a nonzero aggregate balance.
    pub fn total_investors(&self, issuer: &IssuerId) -> u64 {
        self.issuers.get(issuer).map_or(0, |s| s.counters.total())
    }

    /// Investors of a rating across every country.
    pub fn rating_investor_count(&self, issuer: &IssuerId, rating: Rating) -> u64 {
        self.issuers.get(issuer).map_or(0, |s| s.counters.rating(rating))
    }

    /// Issuer-wide limits.
    pub fn investor_limits(&self, issuer: &IssuerId) -> InvestorLimits {
        self.issuers
            .get(issuer)
            .map(|s| s.limits.clone())
            .unwrap_or_default()
    }

    /// Classification a holder is currently counted under.
    pub fn classification(&self, issuer: &IssuerId, investor: &InvestorId) -> Option<Classification> {
        self.issuers.get(issuer)?.counters.classification(investor)
    }

    /// Counter snapshot of an issuer.
    pub fn counters(&self, issuer: &IssuerId) -> CounterSnapshot {
        self.issuers
            .get(issuer)
            .map(|s| s.counters.snapshot())
            .unwrap_or_default()
    }

    /// Configured countries of an issuer, ordered by code.
    pub fn countries(&self, issuer: &IssuerId) -> Vec<(CountryCode, CountryPolicy)> {
        self.issuers
            .get(issuer)
            .map(|s| s.countries.iter().map(|(c, p)| (*c, p.clone())).collect())
            .unwrap_or_default()
    }
}
