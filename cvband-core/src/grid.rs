//! Score-grid extraction — from result table to candidate × fold matrix.
//!
//! Fold columns follow the `split{i}_test_{metric}` naming scheme and must
//! be contiguous from fold 0. Single-metric tables resolve implicitly;
//! multi-metric tables require an explicit metric name. Reductions skip
//! missing cells and a candidate with no evaluated fold keeps a missing
//! mean rather than a fabricated one.

use thiserror::Error;

use crate::results::{CvResults, TableError};
use crate::stats;

// ─── Grid ────────────────────────────────────────────────────────────

/// Dense row-major candidate × fold score matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreGrid {
    cells: Vec<Option<f64>>,
    n_candidates: usize,
    n_folds: usize,
}

impl ScoreGrid {
    /// Build a grid directly from per-candidate fold rows.
    ///
    /// Useful when fold scores are already in hand without a full result
    /// table. Rows must have equal length.
    pub fn from_rows(rows: Vec<Vec<Option<f64>>>) -> Result<Self, GridError> {
        let n_candidates = rows.len();
        let n_folds = rows.first().map_or(0, Vec::len);
        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != n_folds {
                return Err(GridError::RaggedRow {
                    row,
                    len: cells.len(),
                    expected: n_folds,
                });
            }
        }
        Ok(Self {
            cells: rows.into_iter().flatten().collect(),
            n_candidates,
            n_folds,
        })
    }

    pub fn n_candidates(&self) -> usize {
        self.n_candidates
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// One candidate's fold scores.
    pub fn row(&self, candidate: usize) -> &[Option<f64>] {
        let start = candidate * self.n_folds;
        &self.cells[start..start + self.n_folds]
    }

    /// One candidate's evaluated fold scores, missing cells dropped.
    pub fn evaluated_row(&self, candidate: usize) -> Vec<f64> {
        self.row(candidate).iter().flatten().copied().collect()
    }
}

// ─── Summary ─────────────────────────────────────────────────────────

/// Per-candidate reductions over the grid.
///
/// `means[i]` is `None` when candidate `i` has no evaluated fold;
/// `std_errors[i]` is `None` below two evaluated folds. `ranks` are
/// 1-based positions by descending mean (ties and missing rows keep
/// original order, missing rows sort last).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    pub means: Vec<Option<f64>>,
    pub std_errors: Vec<Option<f64>>,
    pub ranks: Vec<usize>,
    pub best_index: usize,
    pub lowest_index: usize,
}

impl ScoreSummary {
    /// Means of candidates that evaluated at least one fold.
    pub fn real_means(&self) -> Vec<f64> {
        self.means.iter().flatten().copied().collect()
    }

    /// Mean of the best candidate. Real by construction of `extract`;
    /// NaN only if the summary was assembled by hand inconsistently.
    pub fn best_mean(&self) -> f64 {
        self.means[self.best_index].unwrap_or(f64::NAN)
    }

    pub fn lowest_mean(&self) -> f64 {
        self.means[self.lowest_index].unwrap_or(f64::NAN)
    }

    pub fn min_mean(&self) -> f64 {
        self.real_means()
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn max_mean(&self) -> f64 {
        self.real_means()
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Defects found while resolving and stacking fold scores.
#[derive(Debug, Error)]
pub enum GridError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("no per-fold score columns (`split{{i}}_test_...`) found in the result table")]
    MissingScores,
    #[error("metric `{metric}` has no per-fold score columns in the result table")]
    UnknownMetric { metric: String },
    #[error("multiple scoring metrics present ({found:?}); an explicit metric name is required")]
    AmbiguousMetric { found: Vec<String> },
    #[error("fold columns for metric `{metric}` are not contiguous from fold 0")]
    NonContiguousFolds { metric: String },
    #[error("fold row {row} has {len} scores, expected {expected}")]
    RaggedRow {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("every candidate is missing all fold scores")]
    AllScoresMissing,
}

// ─── Extraction ──────────────────────────────────────────────────────

/// `split{i}_test_{metric}` → `(i, metric)`.
fn parse_fold_column(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix("split")?;
    let (fold, metric) = rest.split_once("_test_")?;
    let fold: usize = fold.parse().ok()?;
    Some((fold, metric))
}

/// Build the score grid and candidate summary for one metric.
///
/// `scoring: None` resolves the metric implicitly when the table carries
/// exactly one; an explicitly requested metric must have fold columns.
pub fn extract(
    results: &CvResults,
    scoring: Option<&str>,
) -> Result<(ScoreGrid, ScoreSummary), GridError> {
    results.validate()?;

    let mut by_metric: std::collections::BTreeMap<&str, Vec<(usize, &str)>> =
        std::collections::BTreeMap::new();
    for name in results.columns.keys() {
        if let Some((fold, metric)) = parse_fold_column(name) {
            by_metric.entry(metric).or_default().push((fold, name));
        }
    }

    let metric: String = match scoring {
        Some(name) => {
            if !by_metric.contains_key(name) {
                return Err(GridError::UnknownMetric {
                    metric: name.to_string(),
                });
            }
            name.to_string()
        }
        None => {
            let mut names = by_metric.keys();
            match (names.next(), names.next()) {
                (None, _) => return Err(GridError::MissingScores),
                (Some(&only), None) => only.to_string(),
                (Some(_), Some(_)) => {
                    return Err(GridError::AmbiguousMetric {
                        found: by_metric.keys().map(|s| s.to_string()).collect(),
                    })
                }
            }
        }
    };

    let mut fold_cols = match by_metric.remove(metric.as_str()) {
        Some(cols) => cols,
        None => return Err(GridError::MissingScores),
    };
    fold_cols.sort_by_key(|&(fold, _)| fold);
    let contiguous = fold_cols
        .iter()
        .enumerate()
        .all(|(expected, &(fold, _))| fold == expected);
    if !contiguous {
        return Err(GridError::NonContiguousFolds { metric });
    }

    let n_candidates = results.n_candidates();
    let n_folds = fold_cols.len();
    let mut cells = Vec::with_capacity(n_candidates * n_folds);
    for candidate in 0..n_candidates {
        for &(_, name) in &fold_cols {
            cells.push(results.columns[name][candidate]);
        }
    }
    let grid = ScoreGrid {
        cells,
        n_candidates,
        n_folds,
    };
    let summary = summarize(&grid)?;
    Ok((grid, summary))
}

/// Reduce a grid to per-candidate means, standard errors, and rank order.
pub fn summarize(grid: &ScoreGrid) -> Result<ScoreSummary, GridError> {
    let n = grid.n_candidates();
    let sqrt_folds = (grid.n_folds() as f64).sqrt();

    let mut means = Vec::with_capacity(n);
    let mut std_errors = Vec::with_capacity(n);
    for candidate in 0..n {
        let evaluated = grid.evaluated_row(candidate);
        means.push(stats::mean(&evaluated));
        std_errors.push(stats::sample_std(&evaluated).map(|sd| sd / sqrt_folds));
    }

    // First occurrence wins ties via strict comparison.
    let mut best: Option<(usize, f64)> = None;
    let mut lowest: Option<(usize, f64)> = None;
    for (i, mean) in means.iter().enumerate() {
        let Some(mean) = *mean else { continue };
        if best.map_or(true, |(_, m)| mean > m) {
            best = Some((i, mean));
        }
        if lowest.map_or(true, |(_, m)| mean < m) {
            lowest = Some((i, mean));
        }
    }
    let (best_index, _) = best.ok_or(GridError::AllScoresMissing)?;
    let (lowest_index, _) = lowest.ok_or(GridError::AllScoresMissing)?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| match (means[a], means[b]) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    let mut ranks = vec![0usize; n];
    for (position, &candidate) in order.iter().enumerate() {
        ranks[candidate] = position + 1;
    }

    Ok(ScoreSummary {
        means,
        std_errors,
        ranks,
        best_index,
        lowest_index,
    })
}
