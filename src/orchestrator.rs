//! Cycle orchestrator: one live listing per cycle, ranked statistics lookups,
//! evaluators, odds, guard, log, dispatch. Owns the per-process state.

use crate::config::Config;
use crate::daily::settle_day;
use crate::guard::DedupGuard;
use crate::league_filter::LeagueFilter;
use chrono::{DateTime, NaiveDate, Utc};
use fixture_monitor::{DataSource, FetchError, OddsTable, QuotaBudget};
use futures_util::stream::{self, StreamExt};
use logger::{
    now_iso, Clock, CommandFeed, CycleHeartbeatEvent, EventLogger, NotificationSink, SignalLog, SignalRecord,
};
use odds_qualifier::{OddsQualifier, Qualification};
use prediction_engine::{bundle, evaluate_all, sort_for_dispatch, CandidateSignal, Fixture};
use settlement::report::html_escape;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    /// Outside active hours.
    #[default]
    Idle,
    Polling,
    /// Remaining budget is inside the safety reserve.
    Throttled,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopState::Idle      => "IDLE",
            LoopState::Polling   => "POLLING",
            LoopState::Throttled => "THROTTLED",
        }
    }
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub state:         LoopState,
    pub live_fixtures: usize,
    pub selected:      usize,
    pub stats_fetched: usize,
    pub candidates:    usize,
    pub dispatched:    Vec<SignalRecord>,
    /// The live listing could not be fetched.
    pub failed:        bool,
    /// A stop request cut the cycle short.
    pub interrupted:   bool,
}

/// Operator commands accepted from the admin chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// `/kvota`: today's quota report.
    Quota,
    /// `/summary`: settle today and send the summary.
    Summary,
}

impl AdminCommand {
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        let word = lower.split_whitespace().next()?;
        // "/summary@SomeBot" in group chats
        let word = word.split('@').next().unwrap_or(word);
        match word {
            "/kvota" | "/kv\u{f3}ta" | "/quota" => Some(AdminCommand::Quota),
            "/summary" => Some(AdminCommand::Summary),
            _ => None,
        }
    }
}

struct AdminCommands {
    feed:    Arc<dyn CommandFeed>,
    /// Empty accepts every chat.
    chat_id: String,
}

/// Stop requests as seen from inside a cycle. Without a receiver it never fires.
struct StopSignal(Option<watch::Receiver<bool>>);

impl StopSignal {
    fn requested(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once stop is set or its sender is gone.
    async fn wait(&mut self) {
        match &mut self.0 {
            Some(rx) => {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

enum StatsFetch {
    Fetched { fixture: Fixture, candidates: Vec<CandidateSignal> },
    Empty { fixture_id: String },
    Failed { fixture_id: String, error: FetchError },
}

#[derive(Default)]
struct NoticeState {
    last_quota_notice: Option<DateTime<Utc>>,
    failed_cycles:     u32,
    failure_notified:  bool,
}

pub struct Orchestrator {
    cfg:        Config,
    source:     Arc<dyn DataSource>,
    quota:      Arc<QuotaBudget>,
    clock:      Arc<dyn Clock>,
    signals:    Arc<dyn NotificationSink>,
    admin:      Arc<dyn NotificationSink>,
    guard:      DedupGuard,
    qualifier:  OddsQualifier,
    leagues:    LeagueFilter,
    log:        SignalLog,
    ops:        Option<EventLogger>,
    commands:   Option<AdminCommands>,
    /// fixture id → last successful statistics fetch
    stats_seen: HashMap<String, DateTime<Utc>>,
    /// Signals dispatched on the given local day.
    daily:      (NaiveDate, u32),
    notices:    NoticeState,
}

impl Orchestrator {
    pub fn new(
        cfg:     Config,
        source:  Arc<dyn DataSource>,
        quota:   Arc<QuotaBudget>,
        clock:   Arc<dyn Clock>,
        signals: Arc<dyn NotificationSink>,
    ) -> Self {
        let today = clock.today();
        Self {
            guard:      DedupGuard::new(cfg.guard.clone()),
            qualifier:  OddsQualifier::new(cfg.odds.clone()),
            leagues:    LeagueFilter::load(&cfg.leagues),
            log:        SignalLog::new(cfg.data_dir.clone()),
            admin:      Arc::clone(&signals),
            ops:        None,
            commands:   None,
            stats_seen: HashMap::new(),
            daily:      (today, 0),
            notices:    NoticeState::default(),
            cfg,
            source,
            quota,
            clock,
            signals,
        }
    }

    /// Operator notices go here instead of the signal sink.
    pub fn with_admin_sink(mut self, admin: Arc<dyn NotificationSink>) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_ops_log(mut self, ops: EventLogger) -> Self {
        self.ops = Some(ops);
        self
    }

    /// Admin commands are read from `feed` once per cycle and accepted from
    /// `admin_chat_id` only.
    pub fn with_command_feed(mut self, feed: Arc<dyn CommandFeed>, admin_chat_id: impl Into<String>) -> Self {
        self.commands = Some(AdminCommands { feed, chat_id: admin_chat_id.into() });
        self
    }

    pub fn with_league_filter(mut self, leagues: LeagueFilter) -> Self {
        self.leagues = leagues;
        self
    }

    pub fn guard(&self) -> &DedupGuard {
        &self.guard
    }

    pub fn signal_log(&self) -> &SignalLog {
        &self.log
    }

    pub fn dispatched_today(&self) -> u32 {
        self.daily.1
    }

    /// Loads today's event log into the guard and the daily counter, so a
    /// restart does not re-alert what was already sent.
    pub fn reseed_from_log(&mut self) -> anyhow::Result<usize> {
        let today = self.clock.today();
        let records = self.log.read_for_date(today)?;
        self.guard.reseed(&records);
        self.daily = (today, records.len() as u32);
        info!(date = %today, records = records.len(), "guard reseeded from event log");
        Ok(records.len())
    }

    pub fn state(&self) -> LoopState {
        if !self.cfg.schedule.is_active(self.clock.local_hour()) {
            LoopState::Idle
        } else if self.quota.is_low() {
            LoopState::Throttled
        } else {
            LoopState::Polling
        }
    }

    /// Pause before the next cycle: peak cadence inside the peak window,
    /// the low-budget cadence once throttled, the normal one otherwise.
    pub fn next_poll(&self) -> Duration {
        let s = &self.cfg.schedule;
        match self.state() {
            LoopState::Throttled => s.low_budget_poll.max(s.poll),
            LoopState::Polling if s.is_peak(self.clock.local_hour()) => s.peak_poll,
            _ => s.poll,
        }
    }

    /// Runs cycles until `stop` flips to true, its sender goes away, or the
    /// configured run duration is over. A stop request cuts both the pause and
    /// a running cycle short; a signal already logged is still sent.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> anyhow::Result<()> {
        let started = tokio::time::Instant::now();
        let mut in_cycle = StopSignal(Some(stop.clone()));
        loop {
            if *stop.borrow() {
                break;
            }
            if let Some(limit) = self.cfg.schedule.run_for {
                if started.elapsed() >= limit {
                    info!("run duration reached, stopping");
                    break;
                }
            }

            let report = self.cycle(&mut in_cycle).await;
            if report.interrupted || *stop.borrow() {
                break;
            }
            let mut pause = self.next_poll();
            if let Some(limit) = self.cfg.schedule.run_for {
                pause = pause.min(limit.saturating_sub(started.elapsed()));
            }
            info!(
                state = report.state.as_str(),
                dispatched = report.dispatched.len(),
                pause_secs = pause.as_secs(),
                "cycle done"
            );

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("orchestrator stopped");
        Ok(())
    }

    /// One full cycle. Collaborator failures never escape: they end the
    /// cycle early and are counted towards the operator failure notice.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle(&mut StopSignal(None)).await
    }

    async fn cycle(&mut self, stop: &mut StopSignal) -> CycleReport {
        self.handle_commands().await;

        let now = self.clock.now();
        let today = self.clock.today();
        if self.daily.0 != today {
            self.daily = (today, 0);
        }
        self.guard.cleanup(now);
        let stats_cutoff = now - self.cfg.cycle.stats_cooldown;
        self.stats_seen.retain(|_, ts| *ts > stats_cutoff);

        let mut report = CycleReport { state: self.state(), ..CycleReport::default() };
        if report.state == LoopState::Idle {
            debug!(hour = self.clock.local_hour(), "outside active hours");
            self.heartbeat(&report);
            return report;
        }

        self.quota_notice(now).await;

        let allowance = self.quota.begin_cycle(self.cfg.cycle.max_calls);
        if allowance == 0 {
            warn!(remaining = self.quota.remaining(), "no call budget left for this cycle");
            self.quota.end_cycle();
            self.heartbeat(&report);
            return report;
        }

        let listing = tokio::select! {
            r = self.source.live_fixtures() => Some(r),
            _ = stop.wait() => None,
        };
        let Some(listing) = listing else {
            return self.interrupted(report);
        };
        let fixtures = match listing {
            Ok(f) => f,
            Err(e) => {
                warn!("live fixtures unavailable: {e}");
                report.failed = true;
                self.quota.end_cycle();
                self.collaborator_failed().await;
                self.heartbeat(&report);
                return report;
            }
        };
        self.collaborator_recovered().await;
        report.live_fixtures = fixtures.len();

        let selected = self.select_fixtures(fixtures);
        report.selected = selected.len();

        let Some((fetched, candidates)) = self.fetch_and_evaluate(&selected, now, stop).await else {
            return self.interrupted(report);
        };
        report.stats_fetched = fetched;
        report.candidates = candidates.len();

        let by_id: HashMap<&str, &Fixture> = selected.iter().map(|f| (f.id.as_str(), f)).collect();
        report.dispatched = self.dispatch(candidates, &by_id, stop).await;
        if stop.requested() {
            return self.interrupted(report);
        }

        self.quota.end_cycle();
        info!(
            live = report.live_fixtures,
            selected = report.selected,
            stats = report.stats_fetched,
            candidates = report.candidates,
            dispatched = report.dispatched.len(),
            quota_used = self.quota.used(),
            quota_remaining = self.quota.remaining(),
            "cycle summary"
        );
        self.heartbeat(&report);
        report
    }

    fn interrupted(&self, mut report: CycleReport) -> CycleReport {
        info!(dispatched = report.dispatched.len(), "stop requested, cycle cut short");
        report.interrupted = true;
        self.quota.end_cycle();
        self.heartbeat(&report);
        report
    }

    /// In-play, inside the minute window, allowed league; then ranked and capped.
    fn select_fixtures(&self, fixtures: Vec<Fixture>) -> Vec<Fixture> {
        let c = &self.cfg.cycle;
        let today = self.clock.today();
        let mut eligible: Vec<Fixture> = fixtures
            .into_iter()
            .filter(|f| f.status.is_in_play())
            .filter(|f| matches!(f.minute, Some(m) if m >= c.min_minute && m <= c.max_minute))
            .filter(|f| self.leagues.allows(f, today))
            .collect();
        rank_fixtures(&mut eligible);
        eligible.truncate(c.max_fixtures);
        eligible
    }

    /// `None` when a stop request arrived before the lookups finished.
    async fn fetch_and_evaluate(
        &mut self,
        selected: &[Fixture],
        now:      DateTime<Utc>,
        stop:     &mut StopSignal,
    ) -> Option<(usize, Vec<CandidateSignal>)> {
        let to_fetch: Vec<Fixture> = selected
            .iter()
            .filter(|f| !self.stats_seen.contains_key(&f.id))
            .take(self.cfg.cycle.max_stats_lookups)
            .cloned()
            .collect();

        let source = &self.source;
        let engine = &self.cfg.engine;
        let lookups = stream::iter(to_fetch)
            .map(move |fixture| async move {
                match source.statistics(&fixture.id).await {
                    Ok(Some(raw)) => {
                        let stats = bundle(&raw);
                        let mut candidates = evaluate_all(&fixture, &stats, false, engine);
                        if engine.red_card_veto && !candidates.is_empty() {
                            match source.red_card_flag(&fixture.id).await {
                                Ok(true) => {
                                    debug!(fixture = %fixture.id, "send-off reported, fixture vetoed");
                                    candidates.clear();
                                }
                                Ok(false) => {}
                                Err(e) => debug!(fixture = %fixture.id, "send-off lookup failed: {e}"),
                            }
                        }
                        StatsFetch::Fetched { fixture, candidates }
                    }
                    Ok(None) => StatsFetch::Empty { fixture_id: fixture.id },
                    Err(error) => StatsFetch::Failed { fixture_id: fixture.id, error },
                }
            })
            .buffer_unordered(self.cfg.cycle.concurrency)
            .collect::<Vec<StatsFetch>>();
        let finished = tokio::select! {
            r = lookups => Some(r),
            _ = stop.wait() => None,
        };
        let results = finished?;

        let mut fetched = 0;
        let mut candidates = Vec::new();
        for r in results {
            match r {
                StatsFetch::Fetched { fixture, candidates: found } => {
                    fetched += 1;
                    self.stats_seen.insert(fixture.id.clone(), now);
                    candidates.extend(found);
                }
                StatsFetch::Empty { fixture_id } => {
                    self.stats_seen.insert(fixture_id, now);
                }
                StatsFetch::Failed { fixture_id, error } if error.is_quota() => {
                    debug!(fixture = %fixture_id, "statistics skipped: {error}");
                }
                StatsFetch::Failed { fixture_id, error } => {
                    warn!(fixture = %fixture_id, "statistics unavailable: {error}");
                }
            }
        }
        sort_for_dispatch(&mut candidates);
        Some((fetched, candidates))
    }

    async fn dispatch(
        &mut self,
        candidates: Vec<CandidateSignal>,
        fixtures:   &HashMap<&str, &Fixture>,
        stop:       &mut StopSignal,
    ) -> Vec<SignalRecord> {
        let mut dispatched = Vec::new();
        let mut odds: HashMap<String, Option<OddsTable>> = HashMap::new();
        let mut odds_lookups = 0usize;

        for candidate in candidates {
            if stop.requested() {
                break;
            }
            if self.daily.1 >= self.cfg.daily_signal_cap {
                info!(cap = self.cfg.daily_signal_cap, "daily signal cap reached");
                break;
            }
            let Some(fixture) = fixtures.get(candidate.fixture_id.as_str()).copied() else {
                continue;
            };

            let now = self.clock.now();
            if let Err(why) = self.guard.would_admit(&candidate, now) {
                debug!(fixture = %candidate.fixture_id, pick = %candidate.pick, "guard: {why}");
                continue;
            }

            let table = if self.qualifier.wants_quotes() {
                if !odds.contains_key(&candidate.fixture_id) && odds_lookups < self.cfg.cycle.max_odds_lookups {
                    odds_lookups += 1;
                    let lookup = tokio::select! {
                        r = self.source.live_odds(&candidate.fixture_id) => Some(r),
                        _ = stop.wait() => None,
                    };
                    let Some(lookup) = lookup else {
                        break;
                    };
                    let fetched = match lookup {
                        Ok(t) => t,
                        Err(e) => {
                            debug!(fixture = %candidate.fixture_id, "odds unavailable: {e}");
                            None
                        }
                    };
                    odds.insert(candidate.fixture_id.clone(), fetched);
                }
                odds.get(&candidate.fixture_id).and_then(|t| t.as_ref())
            } else {
                None
            };

            let candidate = match self.qualifier.qualify(candidate, table) {
                Qualification::Qualified(c) => c,
                Qualification::Rejected(why) => {
                    debug!(fixture = %fixture.id, "odds: {why}");
                    continue;
                }
            };

            if !self.quota.ledger_healthy() {
                error!("quota ledger is not writable, dispatch suspended for this cycle");
                break;
            }

            let now = self.clock.now();
            let key = match self.guard.try_admit(&candidate, now) {
                Ok(key) => key,
                Err(why) => {
                    debug!(fixture = %fixture.id, pick = %candidate.pick, "guard: {why}");
                    continue;
                }
            };

            let record = SignalRecord {
                ts:         now,
                local_time: self.clock.local_stamp(now),
                date:       now.with_timezone(&self.clock.tz()).date_naive(),
                fixture_id: fixture.id.clone(),
                league:     fixture.league.clone(),
                country:    fixture.country.clone(),
                home:       fixture.home.clone(),
                away:       fixture.away.clone(),
                minute:     Some(candidate.minute),
                score_home: candidate.score_home,
                score_away: candidate.score_away,
                market:     candidate.market.as_str().to_string(),
                selection:  key.selection.clone(),
                pick:       candidate.pick.clone(),
                confidence: candidate.confidence,
                price:      candidate.price,
                bucket:     key.bucket,
                details:    candidate.details.clone(),
            };

            // Logged first: an unlogged signal is never sent. No stop check
            // from here to the send.
            if let Err(e) = self.log.append(&record) {
                error!(fixture = %fixture.id, key = %key, "event log write failed, dispatch suspended: {e}");
                break;
            }

            if let Err(e) = self.signals.send(&format_signal(fixture, &candidate)).await {
                warn!(fixture = %fixture.id, pick = %candidate.pick, "signal logged but not delivered: {e}");
            }
            info!(
                fixture = %fixture.id,
                market = candidate.market.as_str(),
                pick = %candidate.pick,
                confidence = candidate.confidence,
                price = ?candidate.price,
                "signal dispatched"
            );
            self.daily.1 += 1;
            dispatched.push(record);
        }
        dispatched
    }

    async fn quota_notice(&mut self, now: DateTime<Utc>) {
        let last = self.notices.last_quota_notice;
        let periodic = match (self.cfg.notices.quota_ping_every, last) {
            (Some(_), None) => true,
            (Some(every), Some(at)) => now - at >= every,
            (None, _) => false,
        };
        let low = self.quota.is_low() && last.map_or(true, |at| now - at >= self.cfg.notices.low_quota_every);
        if !(periodic || low) {
            return;
        }

        let text = self.quota_text(low);
        match self.admin.send(&text).await {
            Ok(()) => self.notices.last_quota_notice = Some(now),
            Err(e) => warn!("quota notice not delivered: {e}"),
        }
    }

    fn quota_text(&self, low: bool) -> String {
        format!(
            "{} <b>API quota</b>\nUsed today: {} / {}\nRemaining: {}{}",
            if low { "⚠️" } else { "📉" },
            self.quota.used(),
            self.quota.limit(),
            self.quota.remaining(),
            if low { "\nBudget is inside the safety reserve, polling slowed down." } else { "" },
        )
    }

    /// Reply to `/kvota`: the quota notice plus reserve and cadence.
    fn quota_report(&self) -> String {
        let s = &self.cfg.schedule;
        let limit = self.quota.limit().max(1) as f64;
        format!(
            "{}\nShare used: {:.1}%\nSafety reserve: {}\nPolling: {}s, {}s on a low budget",
            self.quota_text(self.quota.is_low()),
            self.quota.used() as f64 * 100.0 / limit,
            self.quota.reserve(),
            s.poll.as_secs(),
            s.low_budget_poll.as_secs(),
        )
    }

    async fn handle_commands(&mut self) {
        let Some(commands) = &self.commands else { return };
        let admin_chat = commands.chat_id.clone();
        let messages = match commands.feed.poll().await {
            Ok(m) => m,
            Err(e) => {
                debug!("admin command poll failed: {e}");
                return;
            }
        };

        for msg in messages {
            if !admin_chat.is_empty() && msg.chat_id != admin_chat {
                debug!(chat = %msg.chat_id, "command from another chat ignored");
                continue;
            }
            match AdminCommand::parse(&msg.text) {
                Some(AdminCommand::Quota) => {
                    let text = self.quota_report();
                    self.reply(&text).await;
                }
                Some(AdminCommand::Summary) => {
                    self.reply("📊 Running the daily summary...").await;
                    let today = self.clock.today();
                    let text = match settle_day(&*self.source, &self.cfg.data_dir, today).await {
                        Ok(day) => day.text,
                        Err(e) => format!("⚠️ /summary failed: {}", html_escape(&format!("{e:#}"))),
                    };
                    self.reply(&text).await;
                }
                None => debug!(text = %msg.text, "not a command"),
            }
        }
    }

    async fn reply(&self, text: &str) {
        if let Err(e) = self.admin.send(text).await {
            warn!("command reply not delivered: {e}");
        }
    }

    async fn collaborator_failed(&mut self) {
        self.notices.failed_cycles += 1;
        let n = self.notices.failed_cycles;
        if n >= self.cfg.notices.failure_notice_after && !self.notices.failure_notified {
            let text = format!("⚠️ <b>Data source failing</b>\n{n} consecutive cycles without a live listing.");
            match self.admin.send(&text).await {
                Ok(()) => self.notices.failure_notified = true,
                Err(e) => warn!("failure notice not delivered: {e}"),
            }
        }
    }

    async fn collaborator_recovered(&mut self) {
        if self.notices.failure_notified {
            if let Err(e) = self.admin.send("✅ <b>Data source recovered</b>").await {
                warn!("recovery notice not delivered: {e}");
            }
        }
        self.notices.failed_cycles = 0;
        self.notices.failure_notified = false;
    }

    fn heartbeat(&self, report: &CycleReport) {
        let Some(ops) = &self.ops else { return };
        let event = CycleHeartbeatEvent {
            ts:              now_iso(),
            event:           "CYCLE_HEARTBEAT",
            state:           report.state.as_str().to_string(),
            live_fixtures:   report.live_fixtures,
            selected:        report.selected,
            stats_fetched:   report.stats_fetched,
            candidates:      report.candidates,
            dispatched:      report.dispatched.len(),
            quota_used:      self.quota.used(),
            quota_remaining: self.quota.remaining(),
            next_poll_secs:  self.next_poll().as_secs(),
        };
        if let Err(e) = ops.log(&event) {
            warn!("heartbeat not written: {e}");
        }
    }
}

/// Lookup order: fewer goals first, then mid/late minutes, later minute
/// breaking ties, fixture id last for a stable order.
pub fn rank_fixtures(fixtures: &mut [Fixture]) {
    fn minute_band(minute: u32) -> u8 {
        match minute {
            55..=80 => 0,
            30..=54 => 1,
            0..=29 => 3,
            _ => 2,
        }
    }
    fixtures.sort_by(|a, b| {
        let ma = a.minute.unwrap_or(0);
        let mb = b.minute.unwrap_or(0);
        a.total_goals()
            .min(4)
            .cmp(&b.total_goals().min(4))
            .then_with(|| minute_band(ma).cmp(&minute_band(mb)))
            .then_with(|| mb.cmp(&ma))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Telegram HTML text of one dispatched signal.
pub fn format_signal(fixture: &Fixture, c: &CandidateSignal) -> String {
    let league = if fixture.country.is_empty() {
        html_escape(&fixture.league)
    } else {
        format!("{} – {}", html_escape(&fixture.country), html_escape(&fixture.league))
    };
    let price = c.price.map_or_else(|| "n/a".to_string(), |p| format!("{p:.2}"));
    let mut text = format!(
        "⚡ <b>{market} signal</b>\n\
         🏟️ {home} – {away} ({h}-{a}, {minute}')\n\
         🏆 {league}\n\
         🎯 Pick: <b>{pick}</b>\n\
         📊 Confidence: {conf:.0}%\n\
         💰 Odds: {price}",
        market = c.market.as_str(),
        home = html_escape(&fixture.home),
        away = html_escape(&fixture.away),
        h = c.score_home,
        a = c.score_away,
        minute = c.minute,
        pick = html_escape(&c.pick),
        conf = c.confidence * 100.0,
    );
    if !c.details.is_empty() {
        text.push_str(&format!("\n🧩 {}", html_escape(&c.details)));
    }
    text
}
