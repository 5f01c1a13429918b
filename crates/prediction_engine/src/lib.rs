//! LiveSignals — Prediction Engine
//! Live football statistics → candidate signals.
//! Rule-based heuristics instead of AI/ML; pure functions, no I/O.

pub mod config;
pub mod evaluators;
pub mod extract;
pub mod model;

pub use config::{
    BttsConfig, ConfidenceBand, DnbConfig, EngineConfig, LateGoalConfig, NextGoalConfig, OverConfig,
    RatioThresholds,
};
pub use evaluators::{
    dominant_side, evaluate_all, evaluate_btts, evaluate_dnb, evaluate_late_goal, evaluate_next_goal,
    evaluate_over, sort_for_dispatch, Dominance,
};
pub use extract::{bundle, extract, Metric};
pub use model::{
    format_line, CandidateSignal, FinalResult, Fixture, FixtureStatus, MarketKind, RawStat, RawStatistics,
    Selection, Side, StatisticBundle, TeamStats, UnknownMarket,
};
