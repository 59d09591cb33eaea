//! cvband CLI — banded model selection over finished sweep results.
//!
//! Commands:
//! - `select` — apply a selection strategy to a results file (.json/.csv)
//!   and print the chosen candidate as a JSON report
//! - `inspect` — print the extracted score grid summary for a results file

mod input;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use cvband_core::{extract, BandRule, ModelSelector, Resolution, SimplicityMetric};
use input::{build_selector, load_config, load_results};

#[derive(Parser)]
#[command(
    name = "cvband",
    about = "cvband — pick the candidate worth refitting from a finished CV sweep"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the winning candidate from a finished sweep.
    Select {
        /// Path to the results table (.json or .csv).
        #[arg(long)]
        results: PathBuf,

        /// TOML strategy config (required for promote mode).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Band rule for inline constrain-style selection.
        #[arg(long, value_enum)]
        rule: Option<RuleKind>,

        /// Band width multiplier for standard-error. Defaults to 1.0.
        #[arg(long)]
        sigma: Option<f64>,

        /// Significance level for signed-rank. Defaults to 0.05.
        #[arg(long)]
        alpha: Option<f64>,

        /// Quantile span for percentile-rank.
        #[arg(long)]
        eta: Option<f64>,

        /// Lower bound for fixed-window.
        #[arg(long)]
        min_cut: Option<f64>,

        /// Upper bound for fixed-window.
        #[arg(long)]
        max_cut: Option<f64>,

        /// Metric name; required for multi-metric tables.
        #[arg(long)]
        scoring: Option<String>,

        /// Print only the selected index instead of the JSON report.
        #[arg(long, default_value_t = false)]
        index_only: bool,
    },
    /// Print the extracted grid summary for a results file.
    Inspect {
        /// Path to the results table (.json or .csv).
        #[arg(long)]
        results: PathBuf,

        /// Metric name; required for multi-metric tables.
        #[arg(long)]
        scoring: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RuleKind {
    StandardError,
    SignedRank,
    PercentileRank,
    FixedWindow,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Select {
            results,
            config,
            rule,
            sigma,
            alpha,
            eta,
            min_cut,
            max_cut,
            scoring,
            index_only,
        } => run_select(
            results, config, rule, sigma, alpha, eta, min_cut, max_cut, scoring, index_only,
        ),
        Commands::Inspect { results, scoring } => run_inspect(&results, scoring.as_deref()),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_select(
    results_path: PathBuf,
    config: Option<PathBuf>,
    rule: Option<RuleKind>,
    sigma: Option<f64>,
    alpha: Option<f64>,
    eta: Option<f64>,
    min_cut: Option<f64>,
    max_cut: Option<f64>,
    scoring: Option<String>,
    index_only: bool,
) -> Result<()> {
    let mut selector = match (config, rule) {
        (Some(path), None) => build_selector(load_config(&path)?)?,
        (None, Some(kind)) => inline_selector(kind, sigma, alpha, eta, min_cut, max_cut)?,
        (Some(_), Some(_)) => bail!("--config and --rule are mutually exclusive"),
        (None, None) => bail!("either --config or --rule is required"),
    };
    if let Some(metric) = scoring {
        selector = selector.with_scoring(metric);
    }

    let results = load_results(&results_path)?;
    let selection = selector.select(&results)?;

    for warning in &selection.warnings {
        eprintln!("warning: {warning}");
    }
    if index_only {
        println!("{}", selection.selected_index);
    } else {
        println!("{}", serde_json::to_string_pretty(&selection)?);
    }
    Ok(())
}

/// Inline flags cover constrain-style selection; promote needs the
/// favorability table a config file provides.
fn inline_selector(
    kind: RuleKind,
    sigma: Option<f64>,
    alpha: Option<f64>,
    eta: Option<f64>,
    min_cut: Option<f64>,
    max_cut: Option<f64>,
) -> Result<ModelSelector> {
    let rule = match kind {
        RuleKind::StandardError => BandRule::standard_error(sigma.unwrap_or(1.0))?,
        RuleKind::SignedRank => BandRule::signed_rank(alpha.unwrap_or(0.05))?,
        RuleKind::PercentileRank => match eta {
            Some(eta) => BandRule::percentile_rank(eta)?,
            None => bail!("--eta is required for percentile-rank"),
        },
        RuleKind::FixedWindow => {
            if min_cut.is_none() && max_cut.is_none() {
                bail!("fixed-window needs --min-cut and/or --max-cut");
            }
            BandRule::fixed_window(min_cut, max_cut)?
        }
    };
    Ok(ModelSelector::new(
        rule,
        Resolution::Simplify {
            simplicity: SimplicityMetric::default(),
        },
    )?)
}

fn run_inspect(results_path: &Path, scoring: Option<&str>) -> Result<()> {
    let results = load_results(results_path)?;
    let (grid, summary) = extract(&results, scoring)?;

    println!("candidates: {}", grid.n_candidates());
    println!("folds:      {}", grid.n_folds());
    println!(
        "best:       index {} (mean {:.6})",
        summary.best_index,
        summary.best_mean()
    );
    println!(
        "lowest:     index {} (mean {:.6})",
        summary.lowest_index,
        summary.lowest_mean()
    );
    println!();
    println!("{:>5} {:>5} {:>12} {:>12}", "idx", "rank", "mean", "se");
    for i in 0..grid.n_candidates() {
        let mean = summary.means[i]
            .map(|m| format!("{m:.6}"))
            .unwrap_or_else(|| "-".to_string());
        let se = summary.std_errors[i]
            .map(|s| format!("{s:.6}"))
            .unwrap_or_else(|| "-".to_string());
        println!("{:>5} {:>5} {:>12} {:>12}", i, summary.ranks[i], mean, se);
    }
    Ok(())
}
