//! # Investor Counters
//!
//! The holder set of one issuer and the `(country, rating)` buckets derived
//! from it. `total_investors` is the size of the holder set; each bucket is
//! the number of holders counted under that classification.
//!
//! Each holder remembers the classification it was counted under, so a
//! divestment always decrements the bucket that was incremented, even if
//! the investor's KYC record changed in between.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use regtoken_core::{CountryCode, InvestorId, Rating, RegtokenError};

/// The `(country, rating)` an investor is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Classification {
    /// Jurisdiction.
    pub country: CountryCode,
    /// Eligibility tier.
    pub rating: Rating,
}

/// A change to the holder set caused by one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CounterTransition {
    /// The investor's aggregate balance went from zero to nonzero.
    Admit {
        /// The investor.
        investor: InvestorId,
        /// Classification to count them under.
        class: Classification,
    },
    /// The investor's aggregate balance went from nonzero to zero.
    Divest {
        /// The investor.
        investor: InvestorId,
    },
    /// A current holder's KYC classification changed.
    Reclassify {
        /// The investor.
        investor: InvestorId,
        /// New classification.
        class: Classification,
    },
}

impl CounterTransition {
    /// The investor this transition concerns.
    pub fn investor(&self) -> &InvestorId {
        match self {
            Self::Admit { investor, .. }
            | Self::Divest { investor }
            | Self::Reclassify { investor, .. } => investor,
        }
    }
}

/// Count of holders in one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCount {
    /// Jurisdiction.
    pub country: CountryCode,
    /// Eligibility tier.
    pub rating: Rating,
    /// Holders counted here.
    pub count: u64,
}

/// Point-in-time view of an issuer's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Distinct investors with a nonzero aggregate balance.
    pub total_investors: u64,
    /// Nonzero buckets, ordered by country then rating.
    pub buckets: Vec<BucketCount>,
}

/// Holder set and bucket projection of one issuer.
#[derive(Debug, Clone, Default)]
pub(crate) struct Counters {
    holders: BTreeMap<InvestorId, Classification>,
    buckets: BTreeMap<Classification, u64>,
}

impl Counters {
    pub(crate) fn total(&self) -> u64 {
        self.holders.len() as u64
    }

    pub(crate) fn classification(&self, investor: &InvestorId) -> Option<Classification> {
        self.holders.get(investor).copied()
    }

    pub(crate) fn bucket(&self, class: Classification) -> u64 {
        self.buckets.get(&class).copied().unwrap_or(0)
    }

    pub(crate) fn country(&self, country: CountryCode) -> u64 {
        self.buckets
            .iter()
            .filter(|(class, _)| class.country == country)
            .map(|(_, count)| *count)
            .sum()
    }

    pub(crate) fn rating(&self, rating: Rating) -> u64 {
        self.buckets
            .iter()
            .filter(|(class, _)| class.rating == rating)
            .map(|(_, count)| *count)
            .sum()
    }

    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_investors: self.total(),
            buckets: self
                .buckets
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(class, count)| BucketCount {
                    country: class.country,
                    rating: class.rating,
                    count: *count,
                })
                .collect(),
        }
    }

    /// Validate a batch against the current state, then apply it.
    ///
    /// Transitions are evaluated in order, each against the state left by
    /// the previous ones. Nothing is written unless the whole batch holds.
    pub(crate) fn apply(&mut self, batch: &[CounterTransition]) -> Result<(), RegtokenError> {
        let mut overlay: BTreeMap<&InvestorId, Option<Classification>> = BTreeMap::new();
        let mut deltas: BTreeMap<Classification, i64> = BTreeMap::new();

        for transition in batch {
            let investor = transition.investor();
            let current = match overlay.get(investor) {
                Some(state) => *state,
                None => self.holders.get(investor).copied(),
            };
            let next = match (transition, current) {
                (CounterTransition::Admit { class, .. }, None) => {
                    *deltas.entry(*class).or_default() += 1;
                    Some(*class)
                }
                (CounterTransition::Admit { .. }, Some(_)) => {
                    return Err(RegtokenError::invariant(format!(
                        "investor {investor} admitted while already counted"
                    )));
                }
                (CounterTransition::Divest { .. }, Some(old)) => {
                    *deltas.entry(old).or_default() -= 1;
                    None
                }
                (CounterTransition::Reclassify { class, .. }, Some(old)) => {
                    *deltas.entry(old).or_default() -= 1;
                    *deltas.entry(*class).or_default() += 1;
                    Some(*class)
                }
                (_, None) => {
                    return Err(RegtokenError::invariant(format!(
                        "investor {investor} divested or reclassified while not counted"
                    )));
                }
            };
            overlay.insert(investor, next);
        }

        for (class, delta) in &deltas {
            let current = i64::try_from(self.bucket(*class))
                .map_err(|_| RegtokenError::invariant("bucket count out of range"))?;
            if current + delta < 0 {
                return Err(RegtokenError::invariant(format!(
                    "bucket ({}, {}) would underflow",
                    class.country, class.rating
                )));
            }
        }

        for (investor, state) in overlay {
            match state {
                Some(class) => self.holders.insert(investor.clone(), class),
                None => self.holders.remove(investor),
            };
        }
        for (class, delta) in deltas {
            let entry = self.buckets.entry(class).or_default();
            *entry = entry.saturating_add_signed(delta);
            if *entry == 0 {
                self.buckets.remove(&class);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn class(c: u16, r: u8) -> Classification {
        Classification {
            country: CountryCode::new(c).unwrap(),
            rating: Rating::new(r).unwrap(),
        }
    }

    fn inv(id: &str) -> InvestorId {
        InvestorId::new(id).unwrap()
    }

    #[test]
    fn test_admit_and_divest() {
        let mut counters = Counters::default();
        counters
            .apply(&[CounterTransition::Admit {
                investor: inv("a"),
                class: class(1, 1),
            }])
            .unwrap();
        assert_eq!(counters.total(), 1);
        assert_eq!(counters.bucket(class(1, 1)), 1);
        assert_eq!(counters.country(CountryCode::new(1).unwrap()), 1);

        counters
            .apply(&[CounterTransition::Divest { investor: inv("a") }])
            .unwrap();
        assert_eq!(counters.total(), 0);
        assert!(counters.snapshot().buckets.is_empty());
    }

    #[test]
    fn test_double_admit_is_invariant_violation_and_writes_nothing() {
        let mut counters = Counters::default();
        let batch = [
            CounterTransition::Admit {
                investor: inv("a"),
                class: class(1, 1),
            },
            CounterTransition::Admit {
                investor: inv("a"),
                class: class(1, 1),
            },
        ];
        let err = counters.apply(&batch).unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(counters.total(), 0);
    }

    #[test]
    fn test_divest_unknown_is_invariant_violation() {
        let mut counters = Counters::default();
        let err = counters
            .apply(&[CounterTransition::Divest { investor: inv("ghost") }])
            .unwrap_err();
        assert!(matches!(err, RegtokenError::InvariantViolation(_)));
    }

    #[test]
    fn test_divest_uses_remembered_classification() {
        let mut counters = Counters::default();
        counters
            .apply(&[CounterTransition::Admit {
                investor: inv("a"),
                class: class(1, 2),
            }])
            .unwrap();
        counters
            .apply(&[CounterTransition::Reclassify {
                investor: inv("a"),
                class: class(3, 1),
            }])
            .unwrap();
        assert_eq!(counters.bucket(class(1, 2)), 0);
        assert_eq!(counters.bucket(class(3, 1)), 1);
        counters
            .apply(&[CounterTransition::Divest { investor: inv("a") }])
            .unwrap();
        assert_eq!(counters.bucket(class(3, 1)), 0);
    }

    #[test]
    fn test_batch_divest_then_admit_same_investor() {
        let mut counters = Counters::default();
        counters
            .apply(&[CounterTransition::Admit {
                investor: inv("a"),
                class: class(1, 1),
            }])
            .unwrap();
        counters
            .apply(&[
                CounterTransition::Divest { investor: inv("a") },
                CounterTransition::Admit {
                    investor: inv("a"),
                    class: class(2, 1),
                },
            ])
            .unwrap();
        assert_eq!(counters.total(), 1);
        assert_eq!(counters.classification(&inv("a")), Some(class(2, 1)));
    }

    proptest! {
        /// Buckets always equal an independent count over the holder model.
        #[test]
        fn prop_buckets_match_model(ops in proptest::collection::vec((0u8..6, 1u16..4, 1u8..4, any::<bool>()), 1..60)) {
            let mut counters = Counters::default();
            let mut model: BTreeMap<String, Classification> = BTreeMap::new();
            for (who, c, r, admit) in ops {
                let id = format!("inv-{who}");
                let investor = inv(&id);
                let transition = if admit {
                    CounterTransition::Admit { investor, class: class(c, r) }
                } else {
                    CounterTransition::Divest { investor }
                };
                let expected_ok = admit != model.contains_key(&id);
                let result = counters.apply(&[transition]);
                prop_assert_eq!(result.is_ok(), expected_ok);
                if expected_ok {
                    if admit {
                        model.insert(id, class(c, r));
                    } else {
                        model.remove(&id);
                    }
                }
                prop_assert_eq!(counters.total(), model.len() as u64);
                let classes: BTreeSet<Classification> = model.values().copied().collect();
                for k in classes {
                    let expected = model.values().filter(|v| **v == k).count() as u64;
                    prop_assert_eq!(counters.bucket(k), expected);
                }
            }
        }
    }
}
