//! cvband — post-hoc model selection over finished cross-validation sweeps.
//!
//! This crate re-ranks an already-computed table of candidate
//! configurations and returns the position of the one worth refitting:
//! - Result-table model with explicit missing-score cells
//! - Score-grid extraction and per-candidate reductions
//! - Four band rules (standard error, signed rank, percentile, fixed window)
//! - Favorability ranking over declared hyperparameter preferences
//! - `promote`/`constrain` refit callables tying it all together
//! - BLAKE3 fingerprints for chosen candidates

pub mod band;
pub mod favorability;
pub mod fingerprint;
pub mod grid;
pub mod results;
pub mod selector;
pub mod stats;

pub use band::{BandOutcome, BandRule, RuleError, ScoreBand};
pub use favorability::{FavorabilityRanker, FavorabilityRule, OrderSpec, RankError};
pub use fingerprint::{params_hash, ParamsHash};
pub use grid::{extract, summarize, GridError, ScoreGrid, ScoreSummary};
pub use results::{CvResults, ParamMap, ParamValue, TableError};
pub use selector::{
    constrain, promote, promote_restricted, ModelSelector, Resolution, SelectError, Selection,
    SimplicityMetric,
};
pub use stats::{wilcoxon_signed_rank, Alternative, SignedRankTest, ZeroMethod};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn table_types_are_send_sync() {
        assert_send::<CvResults>();
        assert_sync::<CvResults>();
        assert_send::<ParamValue>();
        assert_sync::<ParamValue>();
    }

    #[test]
    fn grid_types_are_send_sync() {
        assert_send::<ScoreGrid>();
        assert_sync::<ScoreGrid>();
        assert_send::<ScoreSummary>();
        assert_sync::<ScoreSummary>();
    }

    #[test]
    fn band_types_are_send_sync() {
        assert_send::<BandRule>();
        assert_sync::<BandRule>();
        assert_send::<ScoreBand>();
        assert_sync::<ScoreBand>();
        assert_send::<BandOutcome>();
        assert_sync::<BandOutcome>();
    }

    #[test]
    fn ranker_types_are_send_sync() {
        assert_send::<FavorabilityRanker>();
        assert_sync::<FavorabilityRanker>();
        assert_send::<FavorabilityRule>();
        assert_sync::<FavorabilityRule>();
    }

    #[test]
    fn selector_types_are_send_sync() {
        assert_send::<ModelSelector>();
        assert_sync::<ModelSelector>();
        assert_send::<Selection>();
        assert_sync::<Selection>();
        assert_send::<SimplicityMetric>();
        assert_sync::<SimplicityMetric>();
    }

    #[test]
    fn error_types_are_send_sync() {
        assert_send::<SelectError>();
        assert_sync::<SelectError>();
        assert_send::<GridError>();
        assert_sync::<GridError>();
        assert_send::<RuleError>();
        assert_sync::<RuleError>();
        assert_send::<RankError>();
        assert_sync::<RankError>();
        assert_send::<TableError>();
        assert_sync::<TableError>();
    }

    #[test]
    fn fingerprint_is_send_sync() {
        assert_send::<ParamsHash>();
        assert_sync::<ParamsHash>();
    }
}
