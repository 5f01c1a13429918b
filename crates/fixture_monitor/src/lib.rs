/// LiveSignals — Fixture Monitor
///
/// Data-source side of the engine: the `DataSource` collaborator trait, the
/// API-Football adapter behind it, odds tables, bounded retry and the daily
/// quota budget every outgoing call is charged against.

pub mod api_football;
pub mod odds;
pub mod quota;
pub mod retry;

pub use api_football::{ApiFootballClient, ApiFootballConfig};
pub use odds::{Bookmaker, OddsMarket, OddsTable, Quote};
pub use quota::{QuotaBudget, QuotaError};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use prediction_engine::{FinalResult, Fixture, RawStatistics};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    /// Network, timeout, 5xx. The fixture is skipped this cycle.
    #[error("transient failure on {endpoint}: {message}")]
    Transient { endpoint: String, message: String },

    #[error("rate limited on {endpoint} after {attempts} attempt(s)")]
    RateLimited { endpoint: String, attempts: u32 },

    /// Day budget or cycle allowance used up; nothing was sent.
    #[error("call budget exhausted")]
    QuotaExhausted,

    #[error("undecodable response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl FetchError {
    pub fn is_quota(&self) -> bool {
        matches!(self, FetchError::QuotaExhausted)
    }
}

/// Live football data. "No data" is `Ok(None)`, never an error.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn live_fixtures(&self) -> Result<Vec<Fixture>, FetchError>;

    async fn statistics(&self, fixture_id: &str) -> Result<Option<RawStatistics>, FetchError>;

    async fn live_odds(&self, fixture_id: &str) -> Result<Option<OddsTable>, FetchError>;

    async fn final_result(&self, fixture_id: &str) -> Result<Option<FinalResult>, FetchError>;

    /// Whether a player has been sent off. Sources without event data say no.
    async fn red_card_flag(&self, _fixture_id: &str) -> Result<bool, FetchError> {
        Ok(false)
    }
}
