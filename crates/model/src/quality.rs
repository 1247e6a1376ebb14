//! Quality sample schema (spec §3, §4.3). Append-only.

use serde::{Deserialize, Serialize};

use crate::symbol::Venue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Finiteness,
    Freshness,
    PriceAnomaly,
    VolumeSanity,
    OhlcInvariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySample {
    pub ts_ms: i64,
    pub symbol: String,
    pub venue: Venue,
    pub check_kind: CheckKind,
    pub outcome: Outcome,
    pub reason: Option<String>,
    pub quality_score: f64,
}
