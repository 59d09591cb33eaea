//! Candidate fingerprinting — deterministic identity for parameter maps.
//!
//! The hash covers the canonical JSON serialization of a candidate's
//! hyperparameter mapping; `BTreeMap` key ordering makes the serialization
//! deterministic, so identical mappings hash identically across runs and
//! platforms.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::results::ParamMap;

/// BLAKE3 hex digest of one candidate's parameter mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamsHash(pub String);

impl ParamsHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }
}

impl fmt::Display for ParamsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fingerprint a candidate's hyperparameters.
pub fn params_hash(params: &ParamMap) -> ParamsHash {
    // serde_json over a BTreeMap produces deterministic key order
    let json = serde_json::to_string(params).expect("param map must serialize");
    ParamsHash::from_bytes(json.as_bytes())
}
