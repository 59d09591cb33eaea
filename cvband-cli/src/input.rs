//! Result-table import and strategy config parsing.
//!
//! Tables load from JSON (the serde form of `CvResults`) or CSV. CSV
//! columns prefixed `param:` carry hyperparameter values with
//! bool/int/float/string inference; every other column is numeric, with
//! empty or `NaN` cells marking unevaluated folds. Strategy configs are
//! TOML with a tagged `[rule]` table and an optional `[favorability]`
//! table for promote mode.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use cvband_core::{
    BandRule, CvResults, FavorabilityRanker, FavorabilityRule, ModelSelector, ParamMap,
    ParamValue, Resolution, SimplicityMetric,
};

// ─── Strategy config ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Promote,
    Constrain,
}

/// TOML selection strategy, e.g.:
///
/// ```toml
/// mode = "promote"
/// scoring = "score"
///
/// [rule]
/// name = "standard_error"
/// sigma = 1.0
///
/// [favorability.n_components]
/// order = true
/// weight = 2.0
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectConfig {
    pub mode: Mode,
    pub rule: BandRule,
    #[serde(default)]
    pub scoring: Option<String>,
    #[serde(default)]
    pub favorability: BTreeMap<String, FavorabilityRule>,
    #[serde(default)]
    pub focus: Option<Vec<String>>,
    #[serde(default)]
    pub simplicity: SimplicityMetric,
}

pub fn load_config(path: &Path) -> Result<SelectConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Turn a parsed config into a ready selector; bad rule parameters and
/// empty promote rule sets fail here, before any table is read.
pub fn build_selector(config: SelectConfig) -> Result<ModelSelector> {
    let resolution = match config.mode {
        Mode::Promote => {
            if config.favorability.is_empty() {
                bail!("promote mode needs a [favorability] table with at least one parameter");
            }
            let ranker = FavorabilityRanker::new(config.favorability)?;
            Resolution::Favor {
                ranker,
                focus: config.focus,
            }
        }
        Mode::Constrain => Resolution::Simplify {
            simplicity: config.simplicity,
        },
    };
    let mut selector = ModelSelector::new(config.rule, resolution)?;
    if let Some(metric) = config.scoring {
        selector = selector.with_scoring(metric);
    }
    Ok(selector)
}

// ─── Table loading ───────────────────────────────────────────────────

pub fn load_results(path: &Path) -> Result<CvResults> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match extension.as_str() {
        "json" => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading results {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing results {}", path.display()))
        }
        "csv" => load_csv(path),
        other => bail!("unsupported results format `.{other}` (expected .json or .csv)"),
    }
}

fn load_csv(path: &Path) -> Result<CvResults> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("reading results {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV header")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut params: Vec<ParamMap> = Vec::new();
    let mut columns: BTreeMap<String, Vec<Option<f64>>> = headers
        .iter()
        .filter(|h| !h.starts_with("param:"))
        .map(|h| (h.clone(), Vec::new()))
        .collect();

    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading CSV row {row}"))?;
        let mut param_map = ParamMap::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            if let Some(name) = header.strip_prefix("param:") {
                param_map.insert(name.to_string(), parse_param_cell(cell));
            } else {
                let value = parse_score_cell(cell)
                    .with_context(|| format!("column `{header}`, row {row}"))?;
                columns
                    .get_mut(header)
                    .expect("columns seeded from headers")
                    .push(value);
            }
        }
        params.push(param_map);
    }

    Ok(CvResults::new(params, columns))
}

fn parse_param_cell(cell: &str) -> ParamValue {
    let cell = cell.trim();
    if cell.is_empty() {
        return ParamValue::Null;
    }
    if cell == "true" {
        return ParamValue::Bool(true);
    }
    if cell == "false" {
        return ParamValue::Bool(false);
    }
    if let Ok(i) = cell.parse::<i64>() {
        return ParamValue::Int(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return ParamValue::Float(f);
    }
    ParamValue::Str(cell.to_string())
}

fn parse_score_cell(cell: &str) -> Result<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value: f64 = cell
        .parse()
        .with_context(|| format!("expected a number, got `{cell}`"))?;
    Ok(Some(value))
}
