//! Score bands — acceptance intervals of mean scores around the best.
//!
//! A `BandRule` turns the score grid and candidate summary into an
//! inclusive `[low, high]` interval of mean scores treated as equivalent to
//! the best. The family is a closed set of four strategies; configuration
//! errors are raised at construction (or at compute time for fold-count
//! requirements), and degenerate statistical inputs surface as warnings on
//! the outcome instead of aborting.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::grid::{ScoreGrid, ScoreSummary};
use crate::stats::{self, Alternative, SignedRankTest, ZeroMethod};

// ─── Band ────────────────────────────────────────────────────────────

/// Inclusive interval of mean scores; `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ScoreBand {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    /// Membership test with unbounded sides substituted by ±∞.
    pub fn contains(&self, mean: f64) -> bool {
        let lo = self.lower.unwrap_or(f64::NEG_INFINITY);
        let hi = self.upper.unwrap_or(f64::INFINITY);
        mean >= lo && mean <= hi
    }
}

impl fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lower {
            Some(lo) => write!(f, "[{lo}, ")?,
            None => write!(f, "[-inf, ")?,
        }
        match self.upper {
            Some(hi) => write!(f, "{hi}]"),
            None => write!(f, "+inf]"),
        }
    }
}

/// A computed band plus any non-fatal diagnostics gathered on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct BandOutcome {
    pub band: ScoreBand,
    pub warnings: Vec<String>,
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Invalid rule configuration.
#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("sigma must be positive, got {sigma}")]
    InvalidSigma { sigma: f64 },
    #[error("alpha must lie in (0, 1), got {alpha}")]
    InvalidAlpha { alpha: f64 },
    #[error("eta must lie in (0, 1), got {eta}")]
    InvalidEta { eta: f64 },
    #[error("min_cut {min_cut} exceeds max_cut {max_cut}")]
    InvertedWindow { min_cut: f64, max_cut: f64 },
    #[error("signed-rank banding requires at least {min} folds, got {n_folds}")]
    TooFewFolds { n_folds: usize, min: usize },
}

// ─── Rules ───────────────────────────────────────────────────────────

/// Closed family of band strategies.
///
/// Serde form is tagged for config files, e.g.
/// `{ name = "standard_error", sigma = 1.0 }`; unknown names fail to
/// deserialize. Values built through serde should still be checked with
/// [`BandRule::validate`] before use — the selector does this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum BandRule {
    /// `[best_mean − sigma·SE_best, best_mean]`, lower bound clipped up to
    /// the minimum observed mean.
    StandardError { sigma: f64 },
    /// Lower bound at the mean of the worst candidate whose fold scores are
    /// not significantly different from the best candidate's at `alpha`.
    SignedRank {
        alpha: f64,
        #[serde(default)]
        alternative: Alternative,
        #[serde(default)]
        zero_method: ZeroMethod,
    },
    /// `[quantile(means, 1 − eta), max(means)]`.
    PercentileRank { eta: f64 },
    /// Caller-supplied bounds, passed through verbatim.
    FixedWindow {
        #[serde(default)]
        min_cut: Option<f64>,
        #[serde(default)]
        max_cut: Option<f64>,
    },
}

impl BandRule {
    pub fn standard_error(sigma: f64) -> Result<Self, RuleError> {
        let rule = BandRule::StandardError { sigma };
        rule.validate()?;
        Ok(rule)
    }

    /// Signed-rank rule with the default two-sided alternative and zsplit
    /// zero handling.
    pub fn signed_rank(alpha: f64) -> Result<Self, RuleError> {
        Self::signed_rank_with(alpha, Alternative::default(), ZeroMethod::default())
    }

    pub fn signed_rank_with(
        alpha: f64,
        alternative: Alternative,
        zero_method: ZeroMethod,
    ) -> Result<Self, RuleError> {
        let rule = BandRule::SignedRank {
            alpha,
            alternative,
            zero_method,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn percentile_rank(eta: f64) -> Result<Self, RuleError> {
        let rule = BandRule::PercentileRank { eta };
        rule.validate()?;
        Ok(rule)
    }

    pub fn fixed_window(min_cut: Option<f64>, max_cut: Option<f64>) -> Result<Self, RuleError> {
        let rule = BandRule::FixedWindow { min_cut, max_cut };
        rule.validate()?;
        Ok(rule)
    }

    /// Check construction-time parameter ranges.
    pub fn validate(&self) -> Result<(), RuleError> {
        match *self {
            BandRule::StandardError { sigma } => {
                if !(sigma > 0.0 && sigma.is_finite()) {
                    return Err(RuleError::InvalidSigma { sigma });
                }
            }
            BandRule::SignedRank { alpha, .. } => {
                if !(alpha > 0.0 && alpha < 1.0) {
                    return Err(RuleError::InvalidAlpha { alpha });
                }
            }
            BandRule::PercentileRank { eta } => {
                if !(eta > 0.0 && eta < 1.0) {
                    return Err(RuleError::InvalidEta { eta });
                }
            }
            BandRule::FixedWindow { min_cut, max_cut } => {
                if let (Some(lo), Some(hi)) = (min_cut, max_cut) {
                    if lo > hi {
                        return Err(RuleError::InvertedWindow {
                            min_cut: lo,
                            max_cut: hi,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Compute the acceptance band for one extracted grid.
    pub fn compute(
        &self,
        grid: &ScoreGrid,
        summary: &ScoreSummary,
        n_folds: usize,
    ) -> Result<BandOutcome, RuleError> {
        self.validate()?;
        match *self {
            BandRule::StandardError { sigma } => Ok(standard_error_band(summary, sigma)),
            BandRule::SignedRank {
                alpha,
                alternative,
                zero_method,
            } => signed_rank_band(grid, summary, n_folds, alpha, alternative, zero_method),
            BandRule::PercentileRank { eta } => Ok(percentile_band(summary, eta)),
            BandRule::FixedWindow { min_cut, max_cut } => Ok(BandOutcome {
                band: ScoreBand::new(min_cut, max_cut),
                warnings: Vec::new(),
            }),
        }
    }
}

impl fmt::Display for BandRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandRule::StandardError { sigma } => write!(f, "standard_error(sigma={sigma})"),
            BandRule::SignedRank {
                alpha,
                alternative,
                zero_method,
            } => write!(
                f,
                "signed_rank(alpha={alpha}, alternative={alternative}, zero_method={zero_method})"
            ),
            BandRule::PercentileRank { eta } => write!(f, "percentile_rank(eta={eta})"),
            BandRule::FixedWindow { min_cut, max_cut } => {
                write!(f, "fixed_window(min_cut=")?;
                match min_cut {
                    Some(lo) => write!(f, "{lo}")?,
                    None => write!(f, "none")?,
                }
                write!(f, ", max_cut=")?;
                match max_cut {
                    Some(hi) => write!(f, "{hi}"),
                    None => write!(f, "none"),
                }?;
                write!(f, ")")
            }
        }
    }
}

// ─── Strategy implementations ────────────────────────────────────────

fn standard_error_band(summary: &ScoreSummary, sigma: f64) -> BandOutcome {
    let best_mean = summary.best_mean();
    let mut warnings = Vec::new();
    let se = match summary.std_errors[summary.best_index] {
        Some(se) => se,
        None => {
            warnings.push(
                "standard error of the best candidate is undefined (fewer than two \
                 evaluated folds); the band collapses to the best mean"
                    .to_string(),
            );
            0.0
        }
    };
    let lower = (best_mean - sigma * se).max(summary.min_mean());
    BandOutcome {
        band: ScoreBand::new(Some(lower), Some(best_mean)),
        warnings,
    }
}

fn percentile_band(summary: &ScoreSummary, eta: f64) -> BandOutcome {
    let means = summary.real_means();
    let lower = stats::quantile(&means, 1.0 - eta).unwrap_or(f64::NAN);
    BandOutcome {
        band: ScoreBand::new(Some(lower), Some(summary.max_mean())),
        warnings: Vec::new(),
    }
}

fn signed_rank_band(
    grid: &ScoreGrid,
    summary: &ScoreSummary,
    n_folds: usize,
    alpha: f64,
    alternative: Alternative,
    zero_method: ZeroMethod,
) -> Result<BandOutcome, RuleError> {
    if n_folds < 3 {
        return Err(RuleError::TooFewFolds { n_folds, min: 3 });
    }

    let best = summary.best_index;
    let best_row = grid.row(best);
    let best_mean = summary.best_mean();

    // Everyone below the best, in descending-mean order.
    let mut below: Vec<(usize, f64)> = summary
        .means
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.map(|m| (i, m)))
        .filter(|&(i, _)| i != best)
        .collect();
    below.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    // Paired tests are independent of one another; fan them out.
    let tests: Vec<SignedRankTest> = below
        .par_iter()
        .map(|&(candidate, _)| {
            let mut xs = Vec::with_capacity(n_folds);
            let mut ys = Vec::with_capacity(n_folds);
            for (x, y) in grid.row(candidate).iter().zip(best_row.iter()) {
                if let (Some(x), Some(y)) = (x, y) {
                    xs.push(*x);
                    ys.push(*y);
                }
            }
            if xs.is_empty() {
                return SignedRankTest {
                    statistic: 0.0,
                    p_value: 1.0,
                    n_pairs: 0,
                    warning: Some(
                        "no folds evaluated for both this candidate and the best".to_string(),
                    ),
                };
            }
            stats::wilcoxon_signed_rank(&xs, &ys, alternative, zero_method)
        })
        .collect();

    // Scan downward from the best; the band's lower end is the mean of the
    // worst candidate before the first significant difference.
    let mut lower = best_mean;
    let mut warnings = Vec::new();
    for (&(candidate, mean), test) in below.iter().zip(&tests) {
        if let Some(warning) = &test.warning {
            warnings.push(format!("candidate {candidate}: {warning}"));
        }
        if test.p_value < alpha {
            break;
        }
        lower = mean;
    }

    Ok(BandOutcome {
        band: ScoreBand::new(Some(lower), Some(best_mean)),
        warnings,
    })
}
