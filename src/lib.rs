/// LiveSignals — live football signal engine
///
/// Polls live fixtures, turns in-play statistics into market signals, guards
/// against duplicates, logs every dispatched signal and settles the day
/// afterwards. The library crates under `crates/` hold the pieces; this
/// package wires them together.

pub mod config;
pub mod daily;
pub mod guard;
pub mod history_db;
pub mod league_filter;
pub mod orchestrator;

pub use config::{Config, ConfigError, NotifyBackend};
pub use daily::{settle_day, DaySettlement};
pub use guard::{DedupGuard, DedupKey, GuardRejection};
pub use history_db::HistoryDb;
pub use league_filter::{normalize_text, LeagueFilter};
pub use orchestrator::{format_signal, rank_fixtures, AdminCommand, CycleReport, LoopState, Orchestrator};

use logger::{LogSink, NotificationSink, NtfySink, TelegramSink};
use std::sync::Arc;

/// (signal sink, operator sink) for the configured backend.
pub fn build_sinks(cfg: &config::NotifyConfig) -> (Arc<dyn NotificationSink>, Arc<dyn NotificationSink>) {
    match cfg.backend {
        NotifyBackend::Telegram => (
            Arc::new(TelegramSink::new(cfg.telegram_token.clone(), cfg.chat_id.clone())),
            Arc::new(TelegramSink::new(cfg.telegram_token.clone(), cfg.admin_chat_id.clone())),
        ),
        NotifyBackend::Ntfy => {
            let sink: Arc<dyn NotificationSink> = Arc::new(NtfySink::new(cfg.ntfy_url.clone(), "LiveSignals"));
            (Arc::clone(&sink), sink)
        }
        NotifyBackend::Log => (Arc::new(LogSink), Arc::new(LogSink)),
    }
}
