#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fixture_monitor::{DataSource, FetchError, OddsTable, QuotaBudget};
use live_signals::{Config, Orchestrator};
use logger::{Clock, CommandFeed, InboundMessage, ManualClock, NotificationSink};
use parking_lot::Mutex;
use prediction_engine::{FinalResult, Fixture, FixtureStatus, RawStat, RawStatistics};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Fake data source ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSource {
    pub fixtures:     Mutex<Vec<Fixture>>,
    pub stats:        Mutex<HashMap<String, RawStatistics>>,
    pub odds:         Mutex<HashMap<String, OddsTable>>,
    pub finals:       Mutex<HashMap<String, FinalResult>>,
    pub red_cards:    Mutex<HashSet<String>>,
    pub fail_listing: AtomicBool,
    /// Slows down `live_fixtures` to mimic a provider that takes a while.
    pub listing_delay: Mutex<Option<Duration>>,
    pub calls:        AtomicUsize,
}

impl FakeSource {
    pub fn set_fixtures(&self, fixtures: Vec<Fixture>) {
        for f in &fixtures {
            self.stats.lock().entry(f.id.clone()).or_insert_with(pressing_stats);
        }
        *self.fixtures.lock() = fixtures;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn live_fixtures(&self) -> Result<Vec<Fixture>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(FetchError::Transient { endpoint: "fixtures".into(), message: "timeout".into() });
        }
        let delay = *self.listing_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.fixtures.lock().clone())
    }

    async fn statistics(&self, fixture_id: &str) -> Result<Option<RawStatistics>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stats.lock().get(fixture_id).cloned())
    }

    async fn live_odds(&self, fixture_id: &str) -> Result<Option<OddsTable>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.odds.lock().get(fixture_id).cloned())
    }

    async fn final_result(&self, fixture_id: &str) -> Result<Option<FinalResult>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.finals.lock().get(fixture_id).cloned())
    }

    async fn red_card_flag(&self, fixture_id: &str) -> Result<bool, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.red_cards.lock().contains(fixture_id))
    }
}

/// Enough shots, shots on target and xG for an OVER signal.
pub fn pressing_stats() -> RawStatistics {
    RawStatistics {
        home: vec![
            RawStat::new("Total Shots", json!(10)),
            RawStat::new("Shots on Goal", json!(4)),
            RawStat::new("expected_goals", json!("1.00")),
        ],
        away: vec![
            RawStat::new("Total Shots", json!(4)),
            RawStat::new("Shots on Goal", json!(1)),
            RawStat::new("expected_goals", json!("0.30")),
        ],
    }
}

pub fn fixture(id: &str, minute: u32, home_goals: u32, away_goals: u32) -> Fixture {
    Fixture {
        id:           id.into(),
        league:       "Eredivisie".into(),
        country:      "Netherlands".into(),
        home:         format!("Home {id}"),
        away:         format!("Away {id}"),
        home_team_id: Some(1),
        away_team_id: Some(2),
        minute:       Some(minute),
        home_goals,
        away_goals,
        status:       FixtureStatus::new(if minute < 46 { "1H" } else { "2H" }),
    }
}

// ── Recording sink ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("sink offline");
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}

// ── Scripted admin chat ──────────────────────────────────────────────────────

/// Hands out queued messages once, like a getUpdates offset would.
#[derive(Default)]
pub struct ScriptedFeed {
    pub pending: Mutex<Vec<InboundMessage>>,
}

impl ScriptedFeed {
    pub fn push(&self, chat_id: &str, text: &str) {
        self.pending.lock().push(InboundMessage { chat_id: chat_id.into(), text: text.into() });
    }
}

#[async_trait]
impl CommandFeed for ScriptedFeed {
    async fn poll(&self) -> anyhow::Result<Vec<InboundMessage>> {
        Ok(std::mem::take(&mut *self.pending.lock()))
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 4, 16, 0, 0).unwrap()
}

/// OVER only, odds off, always active, no quota pings; `extra` overrides.
pub fn config(data_root: &Path, extra: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = [
        ("RAPIDAPI_KEY", "test"),
        ("TIMEZONE", "UTC"),
        ("START_HOUR", "0"),
        ("END_HOUR", "24"),
        ("ODDS_MODE", "off"),
        ("BTTS_ENABLED", "false"),
        ("NEXT_GOAL_ENABLED", "false"),
        ("DNB_ENABLED", "false"),
        ("LATE_GOAL_ENABLED", "false"),
        ("QUOTA_PING_EVERY_MIN", "0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    env.insert("DATA_DIR".into(), data_root.join("data").display().to_string());
    env.insert("LOGS_DIR".into(), data_root.join("logs").display().to_string());
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(&move |k| env.get(k).cloned()).unwrap()
}

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub sink:   Arc<RecordingSink>,
    pub admin:  Arc<RecordingSink>,
    pub clock:  Arc<ManualClock>,
    pub quota:  Arc<QuotaBudget>,
    pub orch:   Orchestrator,
}

impl Harness {
    pub fn new(cfg: Config) -> Self {
        Self::with_source(cfg, Arc::new(FakeSource::default()), Arc::new(ManualClock::new(t0(), chrono_tz::UTC)))
    }

    pub fn with_source(cfg: Config, source: Arc<FakeSource>, clock: Arc<ManualClock>) -> Self {
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let quota = Arc::new(QuotaBudget::open(
            cfg.quota.usage_file.clone(),
            cfg.quota.daily_limit,
            cfg.quota.safety_reserve,
            Arc::clone(&dyn_clock),
        ));
        let sink = Arc::new(RecordingSink::default());
        let admin = Arc::new(RecordingSink::default());
        let orch = Orchestrator::new(cfg, source.clone(), Arc::clone(&quota), dyn_clock, sink.clone())
            .with_admin_sink(admin.clone());
        Self { source, sink, admin, clock, quota, orch }
    }
}
