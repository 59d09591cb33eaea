//! Cross-validation result tables — the immutable input to selection.
//!
//! A `CvResults` table is produced by an external search driver after every
//! candidate/fold fit has completed. It holds one hyperparameter mapping per
//! candidate plus named numeric columns: `split{i}_test_{metric}` per-fold
//! scores and `mean_test_{metric}` precomputed means. Cells are
//! `Option<f64>`; a missing cell marks a fold that failed to evaluate and is
//! never coerced to a number.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ─── Parameter values ────────────────────────────────────────────────

/// One hyperparameter value.
///
/// Untagged serde: JSON `null`/`true`/`4`/`0.1`/`"rbf"` all deserialize
/// naturally. Integer and float forms of the same number compare equal via
/// [`ParamValue::same_value`] so explicit favorability orders written as
/// `[4, 8, 12]` match values that arrive as `4.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Numeric view; `None` for strings, bools, and nulls.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Equality with Int/Float unification: `Int(4)` matches `Float(4.0)`.
    pub fn same_value(&self, other: &ParamValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// One candidate's hyperparameter mapping.
///
/// `BTreeMap` for deterministic key ordering during serialization → hashing.
pub type ParamMap = BTreeMap<String, ParamValue>;

// ─── Result table ────────────────────────────────────────────────────

/// Finished sweep results: one row per candidate.
///
/// `params` attributes rows to candidates; `columns` holds every numeric
/// field keyed by name (`split0_test_score`, `mean_test_score`, ...). The
/// table is a read-only snapshot: selection derives everything else from it
/// and never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvResults {
    #[serde(default)]
    pub params: Vec<ParamMap>,
    #[serde(flatten)]
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

/// Structural defects in a result table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("result table has no `params` field; rows cannot be attributed to candidates")]
    MissingParams,
    #[error("column `{column}` has {len} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        len: usize,
        expected: usize,
    },
    #[error("result table is empty")]
    Empty,
}

impl CvResults {
    pub fn new(params: Vec<ParamMap>, columns: BTreeMap<String, Vec<Option<f64>>>) -> Self {
        Self { params, columns }
    }

    /// Number of candidates (rows).
    pub fn n_candidates(&self) -> usize {
        self.params.len()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Check the equal-length invariant: every column must have exactly one
    /// value per candidate, and candidates must exist at all.
    pub fn validate(&self) -> Result<(), TableError> {
        if self.params.is_empty() {
            if self.columns.values().any(|c| !c.is_empty()) {
                return Err(TableError::MissingParams);
            }
            return Err(TableError::Empty);
        }
        let expected = self.params.len();
        for (name, column) in &self.columns {
            if column.len() != expected {
                return Err(TableError::RaggedColumn {
                    column: name.clone(),
                    len: column.len(),
                    expected,
                });
            }
        }
        Ok(())
    }
}
