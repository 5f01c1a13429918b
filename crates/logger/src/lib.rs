/// LiveSignals — Logger
/// Signal event log (append-only, one file per day), operational JSONL stream,
/// day clock and operator notification sinks.

pub mod clock;
pub mod event_log;
pub mod notify;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event_log::{LogError, SignalLog, SignalRecord};
pub use notify::{CommandFeed, InboundMessage, LogSink, NotificationSink, NtfySink, TelegramSink, TelegramUpdates};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Operational stream: heartbeats and provider status, one JSONL file per UTC day.
pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ───────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct CycleHeartbeatEvent {
    pub ts:                 String,
    pub event:              &'static str,   // "CYCLE_HEARTBEAT"
    pub state:              String,         // "POLLING" | "THROTTLED" | "IDLE"
    pub live_fixtures:      usize,
    pub selected:           usize,
    pub stats_fetched:      usize,
    pub candidates:         usize,
    pub dispatched:         usize,
    pub quota_used:         u64,
    pub quota_remaining:    u64,
    pub next_poll_secs:     u64,
}

#[derive(Serialize, Debug)]
pub struct ProviderStatusEvent {
    pub ts:          String,
    pub event:       &'static str,    // "PROVIDER_STATUS"
    pub endpoint:    String,
    pub ok:          bool,
    pub status_code: Option<u16>,
    pub attempts:    u32,
    pub message:     String,
}
