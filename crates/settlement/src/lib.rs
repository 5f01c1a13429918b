/// LiveSignals — Settlement
/// End-of-day reconciliation of dispatched signals against final results.
/// Reads the event log only; outcomes go to separate artifacts.

pub mod evaluate;
pub mod report;
pub mod rules;

pub use evaluate::{dedup_records, settle_records, summarize, EvaluatedRecord, Summary};
pub use report::{format_empty_day, format_summary, write_evaluated, write_summary};
pub use rules::{pick_bucket, settle, FixtureOutcome, Outcome};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("settlement output failed at {path}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settlement output encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}
