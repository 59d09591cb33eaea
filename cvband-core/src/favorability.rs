//! Favorability ranking — caller-declared preferences over hyperparameters.
//!
//! A ranker is configuration-as-data: one rule per parameter name, declared
//! once and immutable afterward. Candidates are ordered by the weighted sum
//! of per-parameter favorability; parameters a candidate does not declare a
//! rule for are ignored, and requesting a restriction to an undeclared
//! parameter is an error rather than a silent no-op.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::results::{ParamMap, ParamValue};

// ─── Rules ───────────────────────────────────────────────────────────

/// How one parameter's values are ordered by preference.
///
/// Untagged serde: a config writes `true` / `false` for the monotone form
/// or a value list (least to most favorable) for the explicit form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderSpec {
    /// `true`: ascending — smaller raw values are more favorable.
    /// `false`: descending — larger raw values are more favorable.
    Monotone(bool),
    /// Values enumerated from least to most favorable.
    Explicit(Vec<ParamValue>),
}

/// Preference rule for one parameter: an ordering plus a weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavorabilityRule {
    pub order: OrderSpec,
    pub weight: f64,
}

impl FavorabilityRule {
    pub fn monotone(lower_is_better: bool, weight: f64) -> Self {
        Self {
            order: OrderSpec::Monotone(lower_is_better),
            weight,
        }
    }

    pub fn explicit(order: Vec<ParamValue>, weight: f64) -> Self {
        Self {
            order: OrderSpec::Explicit(order),
            weight,
        }
    }
}

/// Ranking failures: bad declarations or undefined favorability requests.
#[derive(Debug, Error, PartialEq)]
pub enum RankError {
    #[error("weight for parameter `{param}` must be finite and non-negative, got {weight}")]
    InvalidWeight { param: String, weight: f64 },
    #[error("value {value} of parameter `{param}` is not in the declared favorability order")]
    ValueNotInOrder { param: String, value: String },
    #[error("parameter `{param}` has non-numeric value {value}; a monotone rule needs numbers")]
    NonNumericValue { param: String, value: String },
    #[error("parameter `{param}` is not declared in the favorability rules")]
    UndeclaredParam { param: String },
    #[error("favorability rules are empty; promotion needs at least one declared parameter")]
    NoRules,
}

// ─── Ranker ──────────────────────────────────────────────────────────

/// Orders candidate hyperparameter mappings from most to least favorable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavorabilityRanker {
    rules: BTreeMap<String, FavorabilityRule>,
}

impl FavorabilityRanker {
    /// Declare the rule set. Weights are validated here so a bad
    /// configuration fails before any selection runs.
    pub fn new(rules: BTreeMap<String, FavorabilityRule>) -> Result<Self, RankError> {
        let ranker = Self { rules };
        ranker.validate()?;
        Ok(ranker)
    }

    /// Re-check declared weights; needed for rankers built through serde,
    /// which bypasses [`FavorabilityRanker::new`].
    pub fn validate(&self) -> Result<(), RankError> {
        for (param, rule) in &self.rules {
            if !(rule.weight.is_finite() && rule.weight >= 0.0) {
                return Err(RankError::InvalidWeight {
                    param: param.clone(),
                    weight: rule.weight,
                });
            }
        }
        Ok(())
    }

    pub fn rules(&self) -> &BTreeMap<String, FavorabilityRule> {
        &self.rules
    }

    pub fn declares(&self, param: &str) -> bool {
        self.rules.contains_key(param)
    }

    /// Aggregate favorability of one candidate: weighted sum over declared
    /// parameters present in its mapping.
    pub fn score(&self, params: &ParamMap) -> Result<f64, RankError> {
        self.score_restricted(params, None)
    }

    fn score_restricted(
        &self,
        params: &ParamMap,
        focus: Option<&[String]>,
    ) -> Result<f64, RankError> {
        let mut total = 0.0;
        for (param, rule) in &self.rules {
            if let Some(focus) = focus {
                if !focus.iter().any(|f| f == param) {
                    continue;
                }
            }
            let Some(value) = params.get(param) else {
                continue;
            };
            total += per_param_score(param, value, rule)?;
        }
        Ok(total)
    }

    /// Candidate positions from most to least favorable; ties keep the
    /// original order (stable sort).
    pub fn rank(&self, candidates: &[ParamMap]) -> Result<Vec<usize>, RankError> {
        self.rank_with_focus(candidates, None)
    }

    /// Like [`FavorabilityRanker::rank`] but scoring only the given
    /// parameters. Every focus parameter must be declared.
    pub fn rank_restricted(
        &self,
        candidates: &[ParamMap],
        focus: &[String],
    ) -> Result<Vec<usize>, RankError> {
        for param in focus {
            if !self.declares(param) {
                return Err(RankError::UndeclaredParam {
                    param: param.clone(),
                });
            }
        }
        self.rank_with_focus(candidates, Some(focus))
    }

    fn rank_with_focus(
        &self,
        candidates: &[ParamMap],
        focus: Option<&[String]>,
    ) -> Result<Vec<usize>, RankError> {
        let mut scores = Vec::with_capacity(candidates.len());
        for params in candidates {
            scores.push(self.score_restricted(params, focus)?);
        }
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(order)
    }
}

impl fmt::Display for FavorabilityRanker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "favorability(")?;
        for (i, (param, rule)) in self.rules.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &rule.order {
                OrderSpec::Monotone(true) => write!(f, "{param}: asc")?,
                OrderSpec::Monotone(false) => write!(f, "{param}: desc")?,
                OrderSpec::Explicit(order) => write!(f, "{param}: {} values", order.len())?,
            }
            write!(f, " x{}", rule.weight)?;
        }
        write!(f, ")")
    }
}

fn per_param_score(param: &str, value: &ParamValue, rule: &FavorabilityRule) -> Result<f64, RankError> {
    match &rule.order {
        OrderSpec::Monotone(lower_is_better) => {
            let Some(v) = value.as_f64() else {
                return Err(RankError::NonNumericValue {
                    param: param.to_string(),
                    value: value.to_string(),
                });
            };
            let signed = if *lower_is_better { -v } else { v };
            Ok(signed * rule.weight)
        }
        OrderSpec::Explicit(order) => {
            let Some(position) = order.iter().position(|v| v.same_value(value)) else {
                return Err(RankError::ValueNotInOrder {
                    param: param.to_string(),
                    value: value.to_string(),
                });
            };
            Ok(position as f64 * rule.weight)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranker(rules: Vec<(&str, FavorabilityRule)>) -> FavorabilityRanker {
        FavorabilityRanker::new(
            rules
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
        .unwrap()
    }

    fn params(entries: Vec<(&str, ParamValue)>) -> ParamMap {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    // ─── Ordering semantics ──────────────────────────────────────

    #[test]
    fn mixed_monotone_and_explicit_order() {
        let ranker = ranker(vec![
            ("param1", FavorabilityRule::monotone(true, 1.0)),
            (
                "param2",
                FavorabilityRule::explicit(
                    vec![
                        ParamValue::Str("low".into()),
                        ParamValue::Str("medium".into()),
                        ParamValue::Str("high".into()),
                    ],
                    1.0,
                ),
            ),
        ]);
        let candidates = vec![
            params(vec![
                ("param1", ParamValue::Int(10)),
                ("param2", ParamValue::Str("low".into())),
            ]),
            params(vec![
                ("param1", ParamValue::Int(5)),
                ("param2", ParamValue::Str("medium".into())),
            ]),
            params(vec![
                ("param1", ParamValue::Int(1)),
                ("param2", ParamValue::Str("high".into())),
            ]),
        ];
        assert_eq!(ranker.rank(&candidates).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn descending_monotone_prefers_large_values() {
        let ranker = ranker(vec![("C", FavorabilityRule::monotone(false, 1.0))]);
        let candidates = vec![
            params(vec![("C", ParamValue::Float(0.1))]),
            params(vec![("C", ParamValue::Float(10.0))]),
        ];
        assert_eq!(ranker.rank(&candidates).unwrap(), vec![1, 0]);
    }

    #[test]
    fn weights_scale_contributions() {
        // param a prefers candidate 0, param b prefers candidate 1; the
        // heavier weight on b decides.
        let ranker = ranker(vec![
            ("a", FavorabilityRule::monotone(true, 1.0)),
            ("b", FavorabilityRule::monotone(true, 3.0)),
        ]);
        let candidates = vec![
            params(vec![("a", ParamValue::Int(1)), ("b", ParamValue::Int(5))]),
            params(vec![("a", ParamValue::Int(2)), ("b", ParamValue::Int(1))]),
        ];
        assert_eq!(ranker.rank(&candidates).unwrap(), vec![1, 0]);
    }

    #[test]
    fn ties_keep_original_order() {
        let ranker = ranker(vec![("a", FavorabilityRule::monotone(true, 1.0))]);
        let candidates = vec![
            params(vec![("a", ParamValue::Int(3))]),
            params(vec![("a", ParamValue::Int(3))]),
            params(vec![("a", ParamValue::Int(1))]),
        ];
        assert_eq!(ranker.rank(&candidates).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn undeclared_candidate_params_ignored() {
        let ranker = ranker(vec![("a", FavorabilityRule::monotone(true, 1.0))]);
        let candidates = vec![
            params(vec![("a", ParamValue::Int(2)), ("other", ParamValue::Str("x".into()))]),
            params(vec![("a", ParamValue::Int(1))]),
        ];
        assert_eq!(ranker.rank(&candidates).unwrap(), vec![1, 0]);
    }

    #[test]
    fn explicit_order_unifies_int_and_float() {
        let ranker = ranker(vec![(
            "n",
            FavorabilityRule::explicit(
                vec![ParamValue::Int(4), ParamValue::Int(8), ParamValue::Int(12)],
                2.0,
            ),
        )]);
        let candidates = vec![
            params(vec![("n", ParamValue::Float(4.0))]),
            params(vec![("n", ParamValue::Float(12.0))]),
        ];
        assert_eq!(ranker.rank(&candidates).unwrap(), vec![1, 0]);
    }

    // ─── Errors ──────────────────────────────────────────────────

    #[test]
    fn value_outside_explicit_order_is_error() {
        let ranker = ranker(vec![(
            "n",
            FavorabilityRule::explicit(vec![ParamValue::Int(4), ParamValue::Int(8)], 1.0),
        )]);
        let candidates = vec![params(vec![("n", ParamValue::Int(16))])];
        assert!(matches!(
            ranker.rank(&candidates),
            Err(RankError::ValueNotInOrder { .. })
        ));
    }

    #[test]
    fn non_numeric_value_under_monotone_is_error() {
        let ranker = ranker(vec![("kernel", FavorabilityRule::monotone(true, 1.0))]);
        let candidates = vec![params(vec![("kernel", ParamValue::Str("rbf".into()))])];
        assert!(matches!(
            ranker.rank(&candidates),
            Err(RankError::NonNumericValue { .. })
        ));
    }

    #[test]
    fn restriction_to_undeclared_param_is_error() {
        let ranker = ranker(vec![("a", FavorabilityRule::monotone(true, 1.0))]);
        let candidates = vec![params(vec![("a", ParamValue::Int(1))])];
        assert_eq!(
            ranker.rank_restricted(&candidates, &["b".to_string()]),
            Err(RankError::UndeclaredParam { param: "b".into() })
        );
    }

    #[test]
    fn restriction_limits_scored_params() {
        // Unrestricted, param b dominates; restricted to a, the order flips.
        let ranker = ranker(vec![
            ("a", FavorabilityRule::monotone(true, 1.0)),
            ("b", FavorabilityRule::monotone(true, 10.0)),
        ]);
        let candidates = vec![
            params(vec![("a", ParamValue::Int(1)), ("b", ParamValue::Int(9))]),
            params(vec![("a", ParamValue::Int(2)), ("b", ParamValue::Int(1))]),
        ];
        assert_eq!(ranker.rank(&candidates).unwrap(), vec![1, 0]);
        assert_eq!(
            ranker.rank_restricted(&candidates, &["a".to_string()]).unwrap(),
            vec![0, 1]
        );
    }

    #[test]
    fn negative_weight_rejected_at_construction() {
        let result = FavorabilityRanker::new(
            [(
                "a".to_string(),
                FavorabilityRule::monotone(true, -1.0),
            )]
            .into_iter()
            .collect(),
        );
        assert!(matches!(result, Err(RankError::InvalidWeight { .. })));
    }

    #[test]
    fn config_form_round_trips() {
        let ranker = ranker(vec![
            ("n", FavorabilityRule::monotone(true, 2.0)),
            (
                "kernel",
                FavorabilityRule::explicit(
                    vec![ParamValue::Str("poly".into()), ParamValue::Str("rbf".into())],
                    1.0,
                ),
            ),
        ]);
        let json = serde_json::to_string(&ranker).unwrap();
        let back: FavorabilityRanker = serde_json::from_str(&json).unwrap();
        assert_eq!(ranker, back);
    }
}
