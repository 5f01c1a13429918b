//! API-Football (v3, via RapidAPI) adapter for `DataSource`.
//!
//! Every request claims a slot from the `QuotaBudget` before it goes out and
//! is counted against the day only once a response arrives. Rate-limit
//! answers are retried through `RetryPolicy`; anything else that fails is
//! "no data this cycle".

use crate::odds::OddsTable;
use crate::quota::QuotaBudget;
use crate::retry::RetryPolicy;
use crate::{DataSource, FetchError};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use logger::{now_iso, EventLogger, ProviderStatusEvent};
use parking_lot::Mutex;
use prediction_engine::{FinalResult, Fixture, FixtureStatus, RawStat, RawStatistics};
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

// ── Transport ────────────────────────────────────────────────────────────────

/// Status and body of a request the provider answered.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body:   String,
}

/// The HTTP exchange under the client. `Err` means no answer came back
/// (connect error, timeout), so the provider never counted the request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)], query: &[(&str, String)]) -> Result<HttpReply, String>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(&str, &str)], query: &[(&str, String)]) -> Result<HttpReply, String> {
        let mut req = self.client.get(url).query(query);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        // An unreadable body still came from the provider; it fails decoding.
        let body = resp.text().await.unwrap_or_default();
        Ok(HttpReply { status, body })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiFootballConfig {
    pub base_url:     String,
    pub api_key:      String,
    pub api_host:     String,
    pub timeout:      Duration,
    /// Minimum spacing between two outgoing requests.
    pub min_interval: Duration,
}

impl Default for ApiFootballConfig {
    fn default() -> Self {
        Self {
            base_url:     "https://api-football-v1.p.rapidapi.com/v3".into(),
            api_key:      String::new(),
            api_host:     "api-football-v1.p.rapidapi.com".into(),
            timeout:      Duration::from_secs(15),
            min_interval: Duration::from_millis(250),
        }
    }
}

pub struct ApiFootballClient {
    http:    Arc<dyn Transport>,
    cfg:     ApiFootballConfig,
    quota:   Arc<QuotaBudget>,
    retry:   RetryPolicy,
    limiter: DefaultDirectRateLimiter,
    ops:     Option<EventLogger>,
    /// fixture id → (home team id, away team id), from the last live listing.
    teams:   Mutex<HashMap<String, (Option<u64>, Option<u64>)>>,
}

impl ApiFootballClient {
    pub fn new(cfg: ApiFootballConfig, quota: Arc<QuotaBudget>, retry: RetryPolicy) -> Self {
        let pace = Quota::with_period(cfg.min_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));
        Self {
            http: Arc::new(ReqwestTransport::new(cfg.timeout)),
            cfg,
            quota,
            retry,
            limiter: RateLimiter::direct(pace),
            ops: None,
            teams: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_transport(mut self, http: Arc<dyn Transport>) -> Self {
        self.http = http;
        self
    }

    /// Provider status events also go to the operational JSONL stream.
    pub fn with_ops_log(mut self, ops: EventLogger) -> Self {
        self.ops = Some(ops);
        self
    }

    pub fn quota(&self) -> &Arc<QuotaBudget> {
        &self.quota
    }

    /// GET `<base>/<path>` and return its `response` array.
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<Value>, FetchError> {
        let out = self.retry.run(path, |attempt| self.attempt(path, params, attempt)).await;
        match &out {
            Ok(items) => debug!(endpoint = path, items = items.len(), "provider ok"),
            Err(e) => {
                warn!(endpoint = path, "provider call failed: {e}");
                let attempts = match e {
                    FetchError::RateLimited { attempts, .. } => *attempts,
                    _ => 1,
                };
                self.log_status(path, false, None, attempts, &e.to_string());
            }
        }
        out
    }

    async fn attempt(&self, path: &str, params: &[(&str, String)], attempt: u32) -> Result<Vec<Value>, FetchError> {
        if !self.quota.try_reserve() {
            return Err(FetchError::QuotaExhausted);
        }
        self.limiter.until_ready().await;

        let url = format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path);
        let headers = [
            ("x-rapidapi-key", self.cfg.api_key.as_str()),
            ("x-rapidapi-host", self.cfg.api_host.as_str()),
        ];
        let reply = self
            .http
            .get(&url, &headers, params)
            .await
            .map_err(|message| FetchError::Transient { endpoint: path.to_string(), message })?;

        // The provider saw the request, so it counts.
        if let Err(e) = self.quota.consume(1) {
            error!("quota ledger not persisted: {e}");
        }

        if reply.status == 429 {
            return Err(FetchError::RateLimited { endpoint: path.to_string(), attempts: attempt });
        }
        if !(200..300).contains(&reply.status) {
            let snippet: String = reply.body.chars().take(120).collect();
            self.log_status(path, false, Some(reply.status), attempt, &snippet);
            return Err(FetchError::Transient { endpoint: path.to_string(), message: format!("http {}", reply.status) });
        }

        let body: Value = serde_json::from_str(&reply.body)
            .map_err(|e| FetchError::Decode { endpoint: path.to_string(), message: e.to_string() })?;
        provider_errors(path, &body, attempt)?;

        let items = body
            .get("response")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| FetchError::Decode { endpoint: path.to_string(), message: "missing response array".into() })?;
        Ok(items)
    }

    fn log_status(&self, endpoint: &str, ok: bool, status_code: Option<u16>, attempts: u32, message: &str) {
        let Some(ops) = &self.ops else { return };
        let event = ProviderStatusEvent {
            ts: now_iso(),
            event: "PROVIDER_STATUS",
            endpoint: endpoint.to_string(),
            ok,
            status_code,
            attempts,
            message: message.to_string(),
        };
        if let Err(e) = ops.log(&event) {
            debug!(endpoint, "provider status not written: {e}");
        }
    }
}

/// API-Football reports quota and rate problems inside a 200 body.
fn provider_errors(endpoint: &str, body: &Value, attempt: u32) -> Result<(), FetchError> {
    let Some(errors) = body.get("errors").and_then(Value::as_object) else {
        return Ok(());
    };
    if errors.contains_key("rateLimit") {
        return Err(FetchError::RateLimited { endpoint: endpoint.to_string(), attempts: attempt });
    }
    if errors.contains_key("requests") {
        return Err(FetchError::QuotaExhausted);
    }
    if let Some((k, v)) = errors.iter().next() {
        return Err(FetchError::Transient { endpoint: endpoint.to_string(), message: format!("{k}: {v}") });
    }
    Ok(())
}

#[async_trait]
impl DataSource for ApiFootballClient {
    async fn live_fixtures(&self) -> Result<Vec<Fixture>, FetchError> {
        let resp = self.get("fixtures", &[("live", "all".to_string())]).await?;
        let fixtures: Vec<Fixture> = resp.iter().filter_map(parse_fixture).collect();

        {
            let mut teams = self.teams.lock();
            teams.clear();
            for f in &fixtures {
                teams.insert(f.id.clone(), (f.home_team_id, f.away_team_id));
            }
        }
        self.log_status("fixtures", true, Some(200), 1, &format!("{} live", fixtures.len()));
        Ok(fixtures)
    }

    async fn statistics(&self, fixture_id: &str) -> Result<Option<RawStatistics>, FetchError> {
        let resp = self.get("fixtures/statistics", &[("fixture", fixture_id.to_string())]).await?;
        let ids = self.teams.lock().get(fixture_id).copied().unwrap_or((None, None));
        Ok(parse_statistics(&resp, ids))
    }

    async fn live_odds(&self, fixture_id: &str) -> Result<Option<OddsTable>, FetchError> {
        let params = [("fixture", fixture_id.to_string())];
        let live = self.get("odds/live", &params).await?;
        if let Some(t) = live.first().and_then(OddsTable::from_block) {
            return Ok(Some(t));
        }
        let prematch = self.get("odds", &params).await?;
        Ok(prematch.first().and_then(OddsTable::from_block))
    }

    async fn final_result(&self, fixture_id: &str) -> Result<Option<FinalResult>, FetchError> {
        let resp = self.get("fixtures", &[("id", fixture_id.to_string())]).await?;
        Ok(resp.first().and_then(parse_fixture).map(|f| FinalResult {
            status:     f.status,
            home_goals: f.home_goals,
            away_goals: f.away_goals,
        }))
    }

    async fn red_card_flag(&self, fixture_id: &str) -> Result<bool, FetchError> {
        let resp = self.get("fixtures/events", &[("fixture", fixture_id.to_string())]).await?;
        Ok(has_send_off(&resp))
    }
}

// ── Response parsing ─────────────────────────────────────────────────────────

fn u64_at(v: &Value, ptr: &str) -> Option<u64> {
    v.pointer(ptr).and_then(Value::as_u64)
}

fn str_at<'a>(v: &'a Value, ptr: &str) -> Option<&'a str> {
    v.pointer(ptr).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_fixture(v: &Value) -> Option<Fixture> {
    let id = u64_at(v, "/fixture/id")?;
    Some(Fixture {
        id:           id.to_string(),
        league:       str_at(v, "/league/name").unwrap_or("-").to_string(),
        country:      str_at(v, "/league/country").unwrap_or("").to_string(),
        home:         str_at(v, "/teams/home/name").unwrap_or("Home").to_string(),
        away:         str_at(v, "/teams/away/name").unwrap_or("Away").to_string(),
        home_team_id: u64_at(v, "/teams/home/id"),
        away_team_id: u64_at(v, "/teams/away/id"),
        minute:       u64_at(v, "/fixture/status/elapsed").map(|m| m as u32),
        home_goals:   u64_at(v, "/goals/home").unwrap_or(0) as u32,
        away_goals:   u64_at(v, "/goals/away").unwrap_or(0) as u32,
        status:       FixtureStatus::new(str_at(v, "/fixture/status/short").unwrap_or("")),
    })
}

/// Assigns the two statistic blocks by team id when known, else by order.
pub fn parse_statistics(resp: &[Value], (home_id, away_id): (Option<u64>, Option<u64>)) -> Option<RawStatistics> {
    let mut out = RawStatistics::default();
    let mut unassigned: Vec<Vec<RawStat>> = Vec::new();

    for team in resp {
        let stats: Vec<RawStat> = team
            .get("statistics")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|s| {
                        let name = s.get("type").and_then(Value::as_str)?.trim();
                        Some(RawStat::new(name, s.get("value").cloned().unwrap_or(Value::Null)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        if stats.is_empty() {
            continue;
        }
        let team_id = u64_at(team, "/team/id");
        match team_id {
            Some(id) if Some(id) == home_id && out.home.is_empty() => out.home = stats,
            Some(id) if Some(id) == away_id && out.away.is_empty() => out.away = stats,
            _ => unassigned.push(stats),
        }
    }

    for stats in unassigned {
        if out.home.is_empty() {
            out.home = stats;
        } else if out.away.is_empty() {
            out.away = stats;
        }
    }

    if out.home.is_empty() && out.away.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Straight red or second yellow.
pub fn has_send_off(events: &[Value]) -> bool {
    events.iter().any(|e| {
        let kind = str_at(e, "/type").unwrap_or("").to_lowercase();
        let detail = str_at(e, "/detail").unwrap_or("").to_lowercase();
        kind == "card" && (detail.contains("red") || detail.contains("second yellow"))
    })
}
