//! Selection orchestration — extract, band, filter, resolve.
//!
//! A `ModelSelector` runs the full pipeline over one result-table snapshot:
//! build the score grid, compute the acceptance band, keep the candidates
//! whose mean falls inside it, then resolve the survivors either by
//! favorability ("promote") or by simplicity ("constrain"). Each call is
//! independent; nothing is cached or mutated across calls.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::band::{BandRule, RuleError, ScoreBand};
use crate::favorability::{FavorabilityRanker, RankError};
use crate::fingerprint::{params_hash, ParamsHash};
use crate::grid::{extract, GridError, ScoreSummary};
use crate::results::{CvResults, ParamMap};

// ─── Simplicity ──────────────────────────────────────────────────────

/// Monotone complexity ordering over a candidate's declared
/// hyperparameter magnitudes; lower complexity = simpler model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimplicityMetric {
    /// Sum of |value| over numeric parameters.
    #[default]
    MagnitudeSum,
    /// Largest |value| among numeric parameters.
    MagnitudeMax,
    /// Number of non-null parameters.
    ParamCount,
}

impl SimplicityMetric {
    pub fn complexity(&self, params: &ParamMap) -> f64 {
        let magnitudes = params.values().filter_map(|v| v.as_f64().map(f64::abs));
        match self {
            SimplicityMetric::MagnitudeSum => magnitudes.sum(),
            SimplicityMetric::MagnitudeMax => magnitudes.fold(0.0, f64::max),
            SimplicityMetric::ParamCount => params
                .values()
                .filter(|v| !matches!(v, crate::results::ParamValue::Null))
                .count() as f64,
        }
    }
}

// ─── Resolution strategies ───────────────────────────────────────────

/// How to pick one survivor from the banded set.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Favorability-driven: rank survivors by the declared preference rules
    /// (optionally restricted to the `focus` parameters) and take the top.
    Favor {
        ranker: FavorabilityRanker,
        focus: Option<Vec<String>>,
    },
    /// Scoring-driven: take the simplest survivor; ties break toward the
    /// higher mean score, then toward the original candidate order.
    Simplify { simplicity: SimplicityMetric },
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Anything that can stop a selection; upstream errors pass through
/// unchanged.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Rank(#[from] RankError),
    /// Defensive: the band rules keep the best mean inside the band, so an
    /// empty survivor set means inconsistent inputs (e.g. a fixed window
    /// above every observed mean).
    #[error("no candidate mean falls inside the score band {band}")]
    EmptyBand { band: ScoreBand },
}

// ─── Selection ───────────────────────────────────────────────────────

/// Outcome of one selection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Position of the chosen candidate in the original table.
    pub selected_index: usize,
    pub selected_params: ParamMap,
    pub params_hash: ParamsHash,
    /// Mean score of the chosen candidate.
    pub mean_score: f64,
    pub band: ScoreBand,
    /// Candidates whose mean fell inside the band, in table order.
    pub survivors: Vec<usize>,
    /// Non-fatal diagnostics from band computation.
    pub warnings: Vec<String>,
}

/// One configured selection strategy: band rule + resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelector {
    scoring: Option<String>,
    rule: BandRule,
    resolution: Resolution,
}

impl ModelSelector {
    /// Validates the rule (and ranker, for favor resolution) up front so a
    /// bad configuration fails before any table is touched.
    pub fn new(rule: BandRule, resolution: Resolution) -> Result<Self, SelectError> {
        rule.validate()?;
        if let Resolution::Favor { ranker, .. } = &resolution {
            ranker.validate()?;
        }
        Ok(Self {
            scoring: None,
            rule,
            resolution,
        })
    }

    /// Name the metric whose fold scores drive the band. Required for
    /// multi-metric tables.
    pub fn with_scoring(mut self, metric: impl Into<String>) -> Self {
        self.scoring = Some(metric.into());
        self
    }

    pub fn rule(&self) -> &BandRule {
        &self.rule
    }

    /// Run the pipeline over one table snapshot.
    pub fn select(&self, results: &CvResults) -> Result<Selection, SelectError> {
        let (grid, summary) = extract(results, self.scoring.as_deref())?;
        let outcome = self.rule.compute(&grid, &summary, grid.n_folds())?;
        let survivors = filter_band(&summary, &outcome.band);
        if survivors.is_empty() {
            return Err(SelectError::EmptyBand { band: outcome.band });
        }

        let selected_index = match &self.resolution {
            Resolution::Favor { ranker, focus } => {
                let pool: Vec<ParamMap> = survivors
                    .iter()
                    .map(|&i| results.params[i].clone())
                    .collect();
                let order = match focus {
                    Some(focus) => ranker.rank_restricted(&pool, focus)?,
                    None => ranker.rank(&pool)?,
                };
                survivors[order[0]]
            }
            Resolution::Simplify { simplicity } => {
                simplest_survivor(&survivors, results, &summary, *simplicity)
            }
        };

        let selected_params = results.params[selected_index].clone();
        Ok(Selection {
            selected_index,
            params_hash: params_hash(&selected_params),
            selected_params,
            mean_score: summary.means[selected_index].unwrap_or(f64::NAN),
            band: outcome.band,
            survivors,
            warnings: outcome.warnings,
        })
    }
}

/// Indices whose real mean lies inclusively inside the band, with the
/// observed range substituted for unbounded sides.
fn filter_band(summary: &ScoreSummary, band: &ScoreBand) -> Vec<usize> {
    let lo = band.lower.unwrap_or_else(|| summary.min_mean());
    let hi = band.upper.unwrap_or_else(|| summary.max_mean());
    summary
        .means
        .iter()
        .enumerate()
        .filter_map(|(i, mean)| match mean {
            Some(mean) if *mean >= lo && *mean <= hi => Some(i),
            _ => None,
        })
        .collect()
}

fn simplest_survivor(
    survivors: &[usize],
    results: &CvResults,
    summary: &ScoreSummary,
    metric: SimplicityMetric,
) -> usize {
    let mut chosen = survivors[0];
    let mut chosen_complexity = metric.complexity(&results.params[chosen]);
    let mut chosen_mean = summary.means[chosen].unwrap_or(f64::NAN);
    for &candidate in &survivors[1..] {
        let complexity = metric.complexity(&results.params[candidate]);
        let mean = summary.means[candidate].unwrap_or(f64::NAN);
        let simpler = complexity < chosen_complexity;
        let tie_better_score = complexity == chosen_complexity && mean > chosen_mean;
        if simpler || tie_better_score {
            chosen = candidate;
            chosen_complexity = complexity;
            chosen_mean = mean;
        }
    }
    chosen
}

// ─── Refit callables ─────────────────────────────────────────────────

/// Favorability-driven refit strategy: band the candidates, then promote
/// the most favorable survivor. Configuration is validated here, before
/// any search results exist.
pub fn promote(
    rule: BandRule,
    ranker: FavorabilityRanker,
) -> Result<impl Fn(&CvResults) -> Result<usize, SelectError>, SelectError> {
    if ranker.rules().is_empty() {
        return Err(RankError::NoRules.into());
    }
    let selector = ModelSelector::new(rule, Resolution::Favor { ranker, focus: None })?;
    Ok(move |results: &CvResults| selector.select(results).map(|s| s.selected_index))
}

/// Like [`promote`], restricted to the given focus parameters; each must be
/// declared in the ranker.
pub fn promote_restricted(
    rule: BandRule,
    ranker: FavorabilityRanker,
    focus: Vec<String>,
) -> Result<impl Fn(&CvResults) -> Result<usize, SelectError>, SelectError> {
    if ranker.rules().is_empty() {
        return Err(RankError::NoRules.into());
    }
    let selector = ModelSelector::new(
        rule,
        Resolution::Favor {
            ranker,
            focus: Some(focus),
        },
    )?;
    Ok(move |results: &CvResults| selector.select(results).map(|s| s.selected_index))
}

/// Scoring-driven refit strategy: band the candidates on the named metric,
/// then constrain to the simplest survivor.
pub fn constrain(
    rule: BandRule,
    scoring: impl Into<String>,
) -> Result<impl Fn(&CvResults) -> Result<usize, SelectError>, SelectError> {
    let selector = ModelSelector::new(
        rule,
        Resolution::Simplify {
            simplicity: SimplicityMetric::default(),
        },
    )?
    .with_scoring(scoring);
    Ok(move |results: &CvResults| selector.select(results).map(|s| s.selected_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favorability::FavorabilityRule;
    use crate::results::ParamValue;
    use std::collections::BTreeMap;

    /// 6 candidates × 3 folds; means 0.958, 0.95, 0.925, 0.875, 0.825, 0.475.
    fn fixture() -> CvResults {
        let rows: [&[f64]; 6] = [
            &[0.95, 1.0, 0.925],
            &[0.95, 0.95, 0.95],
            &[0.9, 0.95, 0.925],
            &[0.85, 0.9, 0.875],
            &[0.8, 0.85, 0.825],
            &[0.45, 0.5, 0.475],
        ];
        let n_components = [12, 4, 8, 4, 8, 12];
        let c_values = [1.0, 1.0, 0.1, 0.1, 1.0, 0.1];

        let params = (0..6)
            .map(|i| {
                let mut m = ParamMap::new();
                m.insert("n_components".into(), ParamValue::Int(n_components[i]));
                m.insert("C".into(), ParamValue::Float(c_values[i]));
                m
            })
            .collect();
        let mut columns = BTreeMap::new();
        for fold in 0..3 {
            columns.insert(
                format!("split{fold}_test_score"),
                rows.iter().map(|r| Some(r[fold])).collect(),
            );
        }
        columns.insert(
            "mean_test_score".to_string(),
            rows.iter()
                .map(|r| Some(r.iter().sum::<f64>() / 3.0))
                .collect(),
        );
        CvResults::new(params, columns)
    }

    fn lower_components_ranker() -> FavorabilityRanker {
        FavorabilityRanker::new(
            [(
                "n_components".to_string(),
                FavorabilityRule::monotone(true, 2.0),
            )]
            .into_iter()
            .collect(),
        )
        .unwrap()
    }

    // ─── Promote ─────────────────────────────────────────────────

    #[test]
    fn promote_prefers_favorable_survivor() {
        // sigma=1 band keeps candidates 0 and 1; candidate 1 has fewer
        // components and wins promotion despite the lower mean.
        let refit = promote(
            BandRule::standard_error(1.0).unwrap(),
            lower_components_ranker(),
        )
        .unwrap();
        assert_eq!(refit(&fixture()).unwrap(), 1);
    }

    #[test]
    fn promote_keeps_best_when_it_is_most_favorable() {
        let ranker = FavorabilityRanker::new(
            [(
                "n_components".to_string(),
                FavorabilityRule::monotone(false, 1.0),
            )]
            .into_iter()
            .collect(),
        )
        .unwrap();
        let refit = promote(BandRule::standard_error(1.0).unwrap(), ranker).unwrap();
        assert_eq!(refit(&fixture()).unwrap(), 0);
    }

    #[test]
    fn promote_without_rules_is_rejected() {
        let ranker = FavorabilityRanker::new(BTreeMap::new()).unwrap();
        assert!(matches!(
            promote(BandRule::standard_error(1.0).unwrap(), ranker),
            Err(SelectError::Rank(RankError::NoRules))
        ));
    }

    #[test]
    fn promote_restricted_to_undeclared_param_fails() {
        let refit = promote_restricted(
            BandRule::standard_error(1.0).unwrap(),
            lower_components_ranker(),
            vec!["max_depth".to_string()],
        )
        .unwrap();
        assert!(matches!(
            refit(&fixture()),
            Err(SelectError::Rank(RankError::UndeclaredParam { .. }))
        ));
    }

    // ─── Constrain ───────────────────────────────────────────────

    #[test]
    fn constrain_picks_simplest_survivor() {
        // Survivors 0 and 1; magnitudes 13.0 vs 5.0.
        let refit = constrain(BandRule::standard_error(1.0).unwrap(), "score").unwrap();
        assert_eq!(refit(&fixture()).unwrap(), 1);
    }

    #[test]
    fn constrain_unknown_metric_fails() {
        let refit = constrain(BandRule::standard_error(1.0).unwrap(), "roc_auc").unwrap();
        assert!(matches!(
            refit(&fixture()),
            Err(SelectError::Grid(GridError::UnknownMetric { .. }))
        ));
    }

    #[test]
    fn constrain_complexity_tie_breaks_to_higher_mean() {
        let mut results = fixture();
        // Give candidates 0 and 1 identical complexity; candidate 0 keeps
        // the higher mean and must win.
        results.params[1].insert("n_components".into(), ParamValue::Int(12));
        let refit = constrain(BandRule::standard_error(1.0).unwrap(), "score").unwrap();
        assert_eq!(refit(&results).unwrap(), 0);
    }

    // ─── Pipeline behavior ───────────────────────────────────────

    #[test]
    fn best_candidate_always_survives() {
        let results = fixture();
        for rule in [
            BandRule::standard_error(1.0).unwrap(),
            BandRule::signed_rank(0.01).unwrap(),
            BandRule::percentile_rank(0.68).unwrap(),
            BandRule::fixed_window(Some(0.9), None).unwrap(),
        ] {
            let selector = ModelSelector::new(
                rule,
                Resolution::Simplify {
                    simplicity: SimplicityMetric::default(),
                },
            )
            .unwrap();
            let selection = selector.select(&results).unwrap();
            assert!(
                selection.survivors.contains(&0),
                "best index missing for {}",
                selector.rule()
            );
        }
    }

    #[test]
    fn selection_is_deterministic() {
        let results = fixture();
        let selector = ModelSelector::new(
            BandRule::standard_error(1.0).unwrap(),
            Resolution::Favor {
                ranker: lower_components_ranker(),
                focus: None,
            },
        )
        .unwrap();
        let a = selector.select(&results).unwrap();
        let b = selector.select(&results).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn window_above_every_mean_is_a_logic_error() {
        let selector = ModelSelector::new(
            BandRule::fixed_window(Some(0.98), Some(0.99)).unwrap(),
            Resolution::Simplify {
                simplicity: SimplicityMetric::default(),
            },
        )
        .unwrap();
        assert!(matches!(
            selector.select(&fixture()),
            Err(SelectError::EmptyBand { .. })
        ));
    }

    #[test]
    fn unbounded_window_keeps_everyone() {
        let selector = ModelSelector::new(
            BandRule::fixed_window(None, None).unwrap(),
            Resolution::Simplify {
                simplicity: SimplicityMetric::default(),
            },
        )
        .unwrap();
        let selection = selector.select(&fixture()).unwrap();
        assert_eq!(selection.survivors, vec![0, 1, 2, 3, 4, 5]);
        // simplest overall: candidate 3 (4 + 0.1)
        assert_eq!(selection.selected_index, 3);
    }

    #[test]
    fn selection_report_carries_fingerprint_and_band() {
        let selector = ModelSelector::new(
            BandRule::standard_error(1.0).unwrap(),
            Resolution::Favor {
                ranker: lower_components_ranker(),
                focus: None,
            },
        )
        .unwrap();
        let selection = selector.select(&fixture()).unwrap();
        assert_eq!(selection.selected_index, 1);
        assert!((selection.mean_score - 0.95).abs() < 1e-12);
        assert_eq!(
            selection.params_hash,
            crate::fingerprint::params_hash(&selection.selected_params)
        );
        // upper bound is the best mean for the standard-error rule
        let best_mean = (0.95 + 1.0 + 0.925) / 3.0;
        assert!((selection.band.upper.unwrap() - best_mean).abs() < 1e-12);
    }

    // ─── Simplicity metrics ──────────────────────────────────────

    #[test]
    fn simplicity_metrics_differ() {
        let mut params = ParamMap::new();
        params.insert("a".into(), ParamValue::Int(-3));
        params.insert("b".into(), ParamValue::Float(2.0));
        params.insert("kernel".into(), ParamValue::Str("rbf".into()));
        params.insert("unused".into(), ParamValue::Null);

        assert!((SimplicityMetric::MagnitudeSum.complexity(&params) - 5.0).abs() < 1e-12);
        assert!((SimplicityMetric::MagnitudeMax.complexity(&params) - 3.0).abs() < 1e-12);
        assert!((SimplicityMetric::ParamCount.complexity(&params) - 3.0).abs() < 1e-12);
    }
}
