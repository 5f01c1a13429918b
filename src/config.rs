//! Flat environment configuration. Every tunable has a default; a value that
//! is present but unparsable, or that breaks a constraint, refuses startup.

use chrono::Duration;
use chrono_tz::Tz;
use fixture_monitor::{ApiFootballConfig, RetryPolicy};
use odds_qualifier::{MinPrices, OddsConfig};
use prediction_engine::{ConfidenceBand, EngineConfig, RatioThresholds};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue { field: field.into(), reason: reason.into() }
}

// ── Groups ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// Active hours, local time, `[start_hour, end_hour)`.
    pub start_hour:      u32,
    pub end_hour:        u32,
    /// Faster polling inside `[peak_start_hour, peak_end_hour)`.
    pub peak_start_hour: u32,
    pub peak_end_hour:   u32,
    pub poll:            std::time::Duration,
    pub peak_poll:       std::time::Duration,
    pub low_budget_poll: std::time::Duration,
    /// Stop after this long; `None` runs until stopped.
    pub run_for:         Option<std::time::Duration>,
}

impl ScheduleConfig {
    pub fn is_active(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }

    pub fn is_peak(&self, hour: u32) -> bool {
        hour >= self.peak_start_hour && hour < self.peak_end_hour
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaConfig {
    pub daily_limit:    u64,
    pub safety_reserve: u64,
    pub usage_file:     PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleConfig {
    pub max_fixtures:      usize,
    pub max_stats_lookups: usize,
    pub max_odds_lookups:  usize,
    /// Provider calls one cycle may spend, listing included.
    pub max_calls:         u64,
    /// A fixture's statistics are not fetched again within this window.
    pub stats_cooldown:    Duration,
    pub concurrency:       usize,
    pub min_minute:        u32,
    pub max_minute:        u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeagueConfig {
    pub whitelist_only:    bool,
    pub whitelist_file:    PathBuf,
    /// `date,league,home,away` rows; when non-empty it replaces the league whitelist.
    pub fixture_list_file: PathBuf,
    pub excluded_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    pub fixture_cooldown: Duration,
    pub market_cooldown:  Duration,
    /// Width of the minute bucket in the dedup key.
    pub bucket_minutes:   u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyBackend {
    Telegram,
    Ntfy,
    Log,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifyConfig {
    pub backend:        NotifyBackend,
    pub telegram_token: String,
    pub chat_id:        String,
    /// Operator notices; the signal chat when unset.
    pub admin_chat_id:  String,
    pub ntfy_url:       String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoticeConfig {
    pub send_online_on_start: bool,
    /// Periodic quota report; `None` disables it.
    pub quota_ping_every:     Option<Duration>,
    /// Minimum gap between two low-budget warnings.
    pub low_quota_every:      Duration,
    /// Consecutive failed cycles before the operator hears about it.
    pub failure_notice_after: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub timezone:         Tz,
    pub schedule:         ScheduleConfig,
    pub quota:            QuotaConfig,
    pub cycle:            CycleConfig,
    pub leagues:          LeagueConfig,
    pub guard:            GuardConfig,
    pub daily_signal_cap: u32,
    pub engine:           EngineConfig,
    pub odds:             OddsConfig,
    pub retry:            RetryPolicy,
    pub api:              ApiFootballConfig,
    pub data_dir:         PathBuf,
    pub logs_dir:         PathBuf,
    pub notify:           NotifyConfig,
    pub notices:          NoticeConfig,
}

// ── Reading ──────────────────────────────────────────────────────────────────

struct Vars<'a> {
    get: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.get)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            None => Ok(default),
            Some(v) => v.parse::<T>().map_err(|e| invalid(key, format!("'{v}': {e}"))),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.raw(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(invalid(key, format!("'{v}' is not a boolean"))),
            },
        }
    }

    /// Non-negative whole count of `unit`-long periods.
    fn span(&self, key: &str, default: i64, unit: fn(i64) -> Duration) -> Result<Duration, ConfigError> {
        let n: i64 = self.parse(key, default)?;
        if n < 0 {
            return Err(invalid(key, format!("{n} is negative")));
        }
        Ok(unit(n))
    }

    fn secs(&self, key: &str, default: u64) -> Result<std::time::Duration, ConfigError> {
        Ok(std::time::Duration::from_secs(self.parse(key, default)?))
    }

    fn list(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.raw(key) {
            None => default.iter().map(|s| s.to_string()).collect(),
            Some(v) => v
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    fn band(&self, prefix: &str, default: ConfidenceBand) -> Result<ConfidenceBand, ConfigError> {
        Ok(ConfidenceBand {
            low:  self.parse(&format!("{prefix}_CONF_LOW"), default.low)?,
            high: self.parse(&format!("{prefix}_CONF_HIGH"), default.high)?,
        })
    }

    fn ratios(&self, prefix: &str, default: RatioThresholds) -> Result<RatioThresholds, ConfigError> {
        Ok(RatioThresholds {
            attacks:           self.parse(&format!("{prefix}_ATTACK_RATIO"), default.attacks)?,
            shots:             self.parse(&format!("{prefix}_SHOTS_RATIO"), default.shots)?,
            xg:                self.parse(&format!("{prefix}_XG_RATIO"), default.xg)?,
            require_xg:        self.flag(&format!("{prefix}_REQUIRE_XG"), default.require_xg)?,
            min_attacks_total: self.parse(&format!("{prefix}_MIN_ATTACKS"), default.min_attacks_total)?,
        })
    }
}

impl Config {
    /// Reads the process environment (after `dotenv`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Builds and validates a configuration from any key lookup.
    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let v = Vars { get };

        let tz_name = v.string("TIMEZONE", "Europe/Budapest");
        let timezone: Tz = tz_name
            .parse()
            .map_err(|_| invalid("TIMEZONE", format!("unknown timezone '{tz_name}'")))?;

        let run_minutes: u64 = v.parse("RUN_MINUTES", 0)?;
        let schedule = ScheduleConfig {
            start_hour:      v.parse("START_HOUR", 5)?,
            end_hour:        v.parse("END_HOUR", 23)?,
            peak_start_hour: v.parse("PEAK_START_HOUR", 18)?,
            peak_end_hour:   v.parse("PEAK_END_HOUR", 22)?,
            poll:            v.secs("POLL_SECONDS", 120)?,
            peak_poll:       v.secs("PEAK_POLL_SECONDS", 90)?,
            low_budget_poll: v.secs("LOW_BUDGET_POLL_SECONDS", 300)?,
            run_for:         (run_minutes > 0).then(|| std::time::Duration::from_secs(run_minutes * 60)),
        };

        let data_dir = PathBuf::from(v.string("DATA_DIR", "data"));
        let logs_dir = PathBuf::from(v.string("LOGS_DIR", "logs"));

        let quota = QuotaConfig {
            daily_limit:    v.parse("RAPIDAPI_DAILY_LIMIT", 7500)?,
            safety_reserve: v.parse("RAPIDAPI_SAFETY_RESERVE", 150)?,
            usage_file:     v
                .raw("API_USAGE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| logs_dir.join("api_usage.json")),
        };

        let cycle = CycleConfig {
            max_fixtures:      v.parse("MAX_FIXTURES_PER_CYCLE", 24)?,
            max_stats_lookups: v.parse("MAX_STATS_LOOKUPS_PER_CYCLE", 12)?,
            max_odds_lookups:  v.parse("MAX_ODDS_LOOKUPS_PER_CYCLE", 16)?,
            max_calls:         v.parse("MAX_CALLS_PER_CYCLE", 30)?,
            stats_cooldown:    v.span("STATS_COOLDOWN_SECONDS", 240, Duration::seconds)?,
            concurrency:       v.parse("FETCH_CONCURRENCY", 4)?,
            min_minute:        v.parse("MIN_MINUTE", 10)?,
            max_minute:        v.parse("MAX_MINUTE", 88)?,
        };

        let leagues = LeagueConfig {
            whitelist_only:    v.flag("LEAGUE_WHITELIST_ONLY", false)?,
            whitelist_file:    PathBuf::from(v.string("LEAGUE_WHITELIST_FILE", "config/leagues.txt")),
            fixture_list_file: PathBuf::from(v.string("FIXTURE_LIST_FILE", "config/fixtures.csv")),
            excluded_keywords: v.list(
                "EXCLUDED_LEAGUE_KEYWORDS",
                &["friendly", "u21", "u23", "reserve", "youth", "women"],
            ),
        };

        let guard = GuardConfig {
            fixture_cooldown: v.span("FIXTURE_COOLDOWN_MIN", 10, Duration::minutes)?,
            market_cooldown:  v.span("MARKET_COOLDOWN_MIN", 30, Duration::minutes)?,
            bucket_minutes:   v.parse("DEDUP_BUCKET_MIN", 5)?,
        };

        let engine = read_engine(&v)?;

        let odds_mode = v.string("ODDS_MODE", "real").to_ascii_lowercase();
        let odds_enabled = match odds_mode.as_str() {
            "real" => true,
            "off" | "none" => false,
            other => return Err(invalid("ODDS_MODE", format!("'{other}' is not one of real/off"))),
        };
        let defaults = MinPrices::default();
        let odds = OddsConfig {
            enabled:             odds_enabled,
            require_odds:        v.flag("ODDS_REQUIRED", false)?,
            preferred_bookmaker: v.raw("ODDS_BOOKMAKER"),
            min_price:           MinPrices {
                over:      v.parse("OVER_MIN_ODDS", defaults.over)?,
                btts:      v.parse("BTTS_MIN_ODDS", defaults.btts)?,
                next_goal: v.parse("NEXT_GOAL_MIN_ODDS", defaults.next_goal)?,
                dnb:       v.parse("DNB_MIN_ODDS", defaults.dnb)?,
                late_goal: v.parse("LATE_GOAL_MIN_ODDS", defaults.late_goal)?,
            },
            value_floor:         v.parse("VALUE_THRESHOLD", 1.05)?,
        };

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts:       v.parse("RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts)?,
            initial_delay:      std::time::Duration::from_millis(
                v.parse("RETRY_INITIAL_DELAY_MS", retry_defaults.initial_delay.as_millis() as u64)?,
            ),
            max_delay:          std::time::Duration::from_millis(
                v.parse("RETRY_MAX_DELAY_MS", retry_defaults.max_delay.as_millis() as u64)?,
            ),
            backoff_multiplier: v.parse("RETRY_BACKOFF_MULTIPLIER", retry_defaults.backoff_multiplier)?,
        };

        let api_defaults = ApiFootballConfig::default();
        let api_host = v.string("RAPIDAPI_HOST", &api_defaults.api_host);
        let api = ApiFootballConfig {
            base_url:     v.raw("API_BASE_URL").unwrap_or_else(|| format!("https://{api_host}/v3")),
            api_key:      v.raw("RAPIDAPI_KEY").ok_or_else(|| ConfigError::MissingField {
                field: "RAPIDAPI_KEY".into(),
            })?,
            api_host,
            timeout:      v.secs("HTTP_TIMEOUT_SECONDS", api_defaults.timeout.as_secs())?,
            min_interval: std::time::Duration::from_millis(
                v.parse("API_MIN_INTERVAL_MS", api_defaults.min_interval.as_millis() as u64)?,
            ),
        };

        let notify = read_notify(&v)?;

        let ping_min: u64 = v.parse("QUOTA_PING_EVERY_MIN", 180)?;
        let notices = NoticeConfig {
            send_online_on_start: v.flag("SEND_ONLINE_ON_START", true)?,
            quota_ping_every:     (ping_min > 0).then(|| Duration::minutes(ping_min as i64)),
            low_quota_every:      v.span("LOW_QUOTA_NOTICE_MIN", 15, Duration::minutes)?,
            failure_notice_after: v.parse("FAILURE_NOTICE_AFTER_CYCLES", 5)?,
        };

        let cfg = Config {
            timezone,
            schedule,
            quota,
            cycle,
            leagues,
            guard,
            daily_signal_cap: v.parse("DAILY_SIGNAL_CAP", 40)?,
            engine,
            odds,
            retry,
            api,
            data_dir,
            logs_dir,
            notify,
            notices,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.schedule;
        if s.end_hour > 24 || s.start_hour >= s.end_hour {
            return Err(invalid("START_HOUR", format!("active hours {}..{} are not a window inside 0..=24", s.start_hour, s.end_hour)));
        }
        if s.peak_end_hour > 24 || s.peak_start_hour > s.peak_end_hour {
            return Err(invalid("PEAK_START_HOUR", format!("peak hours {}..{} are not a window inside 0..=24", s.peak_start_hour, s.peak_end_hour)));
        }
        for (field, d) in [("POLL_SECONDS", s.poll), ("PEAK_POLL_SECONDS", s.peak_poll), ("LOW_BUDGET_POLL_SECONDS", s.low_budget_poll)] {
            if d.is_zero() {
                return Err(invalid(field, "must be at least 1 second"));
            }
        }

        if self.quota.daily_limit == 0 {
            return Err(invalid("RAPIDAPI_DAILY_LIMIT", "must be greater than 0"));
        }

        let c = &self.cycle;
        if c.min_minute > c.max_minute {
            return Err(invalid("MIN_MINUTE", format!("{} > MAX_MINUTE {}", c.min_minute, c.max_minute)));
        }
        if c.max_calls == 0 {
            return Err(invalid("MAX_CALLS_PER_CYCLE", "must be greater than 0"));
        }
        if c.concurrency == 0 {
            return Err(invalid("FETCH_CONCURRENCY", "must be greater than 0"));
        }

        if self.guard.bucket_minutes == 0 {
            return Err(invalid("DEDUP_BUCKET_MIN", "must be greater than 0"));
        }

        if let Err((field, reason)) = self.engine.validate() {
            return Err(invalid(field, reason));
        }

        let p = &self.odds.min_price;
        for (field, price) in [
            ("OVER_MIN_ODDS", p.over),
            ("BTTS_MIN_ODDS", p.btts),
            ("NEXT_GOAL_MIN_ODDS", p.next_goal),
            ("DNB_MIN_ODDS", p.dnb),
            ("LATE_GOAL_MIN_ODDS", p.late_goal),
        ] {
            if !(price.is_finite() && price >= 1.0) {
                return Err(invalid(field, format!("price floor {price} is below 1.0")));
            }
        }
        if !(self.odds.value_floor.is_finite() && self.odds.value_floor > 0.0) {
            return Err(invalid("VALUE_THRESHOLD", format!("{} must be positive", self.odds.value_floor)));
        }

        let r = &self.retry;
        if r.max_attempts == 0 {
            return Err(invalid("RETRY_MAX_ATTEMPTS", "must be at least 1"));
        }
        if !(r.backoff_multiplier.is_finite() && r.backoff_multiplier >= 1.0) {
            return Err(invalid("RETRY_BACKOFF_MULTIPLIER", format!("{} must be at least 1.0", r.backoff_multiplier)));
        }
        if r.initial_delay > r.max_delay {
            return Err(invalid("RETRY_INITIAL_DELAY_MS", "exceeds RETRY_MAX_DELAY_MS"));
        }

        Ok(())
    }
}

fn read_engine(v: &Vars<'_>) -> Result<EngineConfig, ConfigError> {
    let mut e = EngineConfig { red_card_veto: v.flag("RED_CARD_VETO", true)?, ..EngineConfig::default() };

    let o = &mut e.over;
    o.enabled         = v.flag("OVER_ENABLED", o.enabled)?;
    o.min_minute      = v.parse("OVER_MIN_MINUTE", o.min_minute)?;
    o.max_minute      = v.parse("OVER_MAX_MINUTE", o.max_minute)?;
    o.nil_nil_cutoff  = v.parse("OVER_NIL_NIL_CUTOFF", o.nil_nil_cutoff)?;
    o.shots_ref       = v.parse("OVER_SHOTS_REF", o.shots_ref)?;
    o.sot_ref         = v.parse("OVER_SOT_REF", o.sot_ref)?;
    o.xg_ref          = v.parse("OVER_XG_REF", o.xg_ref)?;
    o.min_pressure    = v.parse("OVER_MIN_PRESSURE", o.min_pressure)?;
    o.first_half_step = v.flag("OVER_FIRST_HALF_STEP", o.first_half_step)?;
    o.max_line        = v.parse("OVER_MAX_LINE", o.max_line)?;
    o.min_confidence  = v.parse("OVER_MIN_CONF", o.min_confidence)?;
    o.band            = v.band("OVER", o.band)?;

    let b = &mut e.btts;
    b.enabled        = v.flag("BTTS_ENABLED", b.enabled)?;
    b.min_minute     = v.parse("BTTS_MIN_MINUTE", b.min_minute)?;
    b.max_minute     = v.parse("BTTS_MAX_MINUTE", b.max_minute)?;
    b.min_sot_each   = v.parse("BTTS_MIN_SOT_EACH", b.min_sot_each)?;
    b.min_sot_total  = v.parse("BTTS_MIN_SOT_TOTAL", b.min_sot_total)?;
    b.min_confidence = v.parse("BTTS_MIN_CONF", b.min_confidence)?;
    b.band           = v.band("BTTS", b.band)?;

    let n = &mut e.next_goal;
    n.enabled        = v.flag("NEXT_GOAL_ENABLED", n.enabled)?;
    n.min_minute     = v.parse("NEXT_GOAL_MIN_MINUTE", n.min_minute)?;
    n.max_minute     = v.parse("NEXT_GOAL_MAX_MINUTE", n.max_minute)?;
    n.ratios         = v.ratios("NEXT_GOAL", n.ratios.clone())?;
    n.min_confidence = v.parse("NEXT_GOAL_MIN_CONF", n.min_confidence)?;
    n.band           = v.band("NEXT_GOAL", n.band)?;

    let d = &mut e.dnb;
    d.enabled        = v.flag("DNB_ENABLED", d.enabled)?;
    d.min_minute     = v.parse("DNB_MIN_MINUTE", d.min_minute)?;
    d.max_minute     = v.parse("DNB_MAX_MINUTE", d.max_minute)?;
    d.max_deficit    = v.parse("DNB_MAX_DEFICIT", d.max_deficit)?;
    d.ratios         = v.ratios("DNB", d.ratios.clone())?;
    d.min_confidence = v.parse("DNB_MIN_CONF", d.min_confidence)?;
    d.band           = v.band("DNB", d.band)?;

    let l = &mut e.late_goal;
    l.enabled           = v.flag("LATE_GOAL_ENABLED", l.enabled)?;
    l.min_minute        = v.parse("LATE_GOAL_MIN_MINUTE", l.min_minute)?;
    l.max_minute        = v.parse("LATE_GOAL_MAX_MINUTE", l.max_minute)?;
    l.min_xg_total      = v.parse("LATE_GOAL_MIN_XG", l.min_xg_total)?;
    l.require_xg        = v.flag("LATE_GOAL_REQUIRE_XG", l.require_xg)?;
    l.min_shots_total   = v.parse("LATE_GOAL_MIN_SHOTS", l.min_shots_total)?;
    l.min_attacks_total = v.parse("LATE_GOAL_MIN_ATTACKS", l.min_attacks_total)?;
    l.decisive_ratio    = v.parse("LATE_GOAL_DECISIVE_RATIO", l.decisive_ratio)?;
    l.min_confidence    = v.parse("LATE_GOAL_MIN_CONF", l.min_confidence)?;
    l.band              = v.band("LATE_GOAL", l.band)?;

    Ok(e)
}

fn read_notify(v: &Vars<'_>) -> Result<NotifyConfig, ConfigError> {
    let telegram_token = v.string("TELEGRAM_BOT_TOKEN", "");
    let chat_id = v.string("TELEGRAM_CHAT_ID", "");
    let admin_chat_id = v.raw("TELEGRAM_ADMIN_CHAT_ID").unwrap_or_else(|| chat_id.clone());
    let ntfy_url = v.string("NTFY_URL", "");

    let backend = match v.raw("NOTIFY_BACKEND").map(|b| b.to_ascii_lowercase()).as_deref() {
        Some("telegram") => NotifyBackend::Telegram,
        Some("ntfy") => NotifyBackend::Ntfy,
        Some("log") => NotifyBackend::Log,
        Some(other) => return Err(invalid("NOTIFY_BACKEND", format!("'{other}' is not one of telegram/ntfy/log"))),
        None if !telegram_token.is_empty() => NotifyBackend::Telegram,
        None => NotifyBackend::Log,
    };

    match backend {
        NotifyBackend::Telegram if telegram_token.is_empty() => {
            return Err(ConfigError::MissingField { field: "TELEGRAM_BOT_TOKEN".into() });
        }
        NotifyBackend::Telegram if chat_id.is_empty() => {
            return Err(ConfigError::MissingField { field: "TELEGRAM_CHAT_ID".into() });
        }
        NotifyBackend::Ntfy if ntfy_url.is_empty() => {
            return Err(ConfigError::MissingField { field: "NTFY_URL".into() });
        }
        _ => {}
    }

    Ok(NotifyConfig { backend, telegram_token, chat_id, admin_chat_id, ntfy_url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let mut env: HashMap<String, String> = HashMap::new();
        env.insert("RAPIDAPI_KEY".into(), "k".into());
        for (k, v) in pairs {
            env.insert(k.to_string(), v.to_string());
        }
        Config::from_lookup(&move |k| env.get(k).cloned())
    }

    #[test]
    fn defaults_load() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.timezone, chrono_tz::Europe::Budapest);
        assert_eq!((cfg.schedule.start_hour, cfg.schedule.end_hour), (5, 23));
        assert_eq!(cfg.quota.daily_limit, 7500);
        assert_eq!(cfg.quota.usage_file, PathBuf::from("logs/api_usage.json"));
        assert_eq!(cfg.guard.fixture_cooldown, Duration::minutes(10));
        assert!(cfg.engine.red_card_veto);
        assert_eq!(cfg.notify.backend, NotifyBackend::Log);
        assert!(cfg.schedule.run_for.is_none());
        assert_eq!(cfg.leagues.excluded_keywords.len(), 6);
    }

    #[test]
    fn same_environment_loads_equal_configs() {
        let a = load(&[("FIXTURE_LIST_FILE", "cfg/today.csv")]).unwrap();
        let b = load(&[("FIXTURE_LIST_FILE", "cfg/today.csv")]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.leagues.fixture_list_file, PathBuf::from("cfg/today.csv"));

        let mut c = b.clone();
        c.api.api_key = "other".into();
        assert_ne!(a.api, c.api);
        assert_ne!(a, c);
    }

    #[test]
    fn missing_api_key_is_reported() {
        let err = Config::from_lookup(&|_| None).unwrap_err();
        assert_eq!(err, ConfigError::MissingField { field: "RAPIDAPI_KEY".into() });
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = load(&[
            ("OVER_MIN_ODDS", "1.55"),
            ("NEXT_GOAL_REQUIRE_XG", "yes"),
            ("RUN_MINUTES", "30"),
            ("EXCLUDED_LEAGUE_KEYWORDS", "Friendly, U19 ,"),
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "c"),
        ])
        .unwrap();
        assert_eq!(cfg.odds.min_price.over, 1.55);
        assert!(cfg.engine.next_goal.ratios.require_xg);
        assert_eq!(cfg.schedule.run_for, Some(std::time::Duration::from_secs(1800)));
        assert_eq!(cfg.leagues.excluded_keywords, vec!["friendly", "u19"]);
        assert_eq!(cfg.notify.backend, NotifyBackend::Telegram);
        assert_eq!(cfg.notify.admin_chat_id, "c");
    }

    #[test]
    fn negative_cooldown_refuses_start() {
        let err = load(&[("MARKET_COOLDOWN_MIN", "-5")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "MARKET_COOLDOWN_MIN"));
    }

    #[test]
    fn constraint_violations_refuse_start() {
        for pairs in [
            vec![("START_HOUR", "23"), ("END_HOUR", "5")],
            vec![("END_HOUR", "25")],
            vec![("BTTS_MIN_ODDS", "0.9")],
            vec![("OVER_CONF_LOW", "0.9"), ("OVER_CONF_HIGH", "0.4")],
            vec![("RAPIDAPI_DAILY_LIMIT", "0")],
            vec![("RETRY_MAX_ATTEMPTS", "0")],
            vec![("DEDUP_BUCKET_MIN", "0")],
            vec![("MIN_MINUTE", "70"), ("MAX_MINUTE", "20")],
            vec![("POLL_SECONDS", "abc")],
            vec![("ODDS_MODE", "fake")],
            vec![("TIMEZONE", "Mars/Olympus")],
            vec![("NOTIFY_BACKEND", "ntfy")],
        ] {
            assert!(load(&pairs).is_err(), "{pairs:?} should be rejected");
        }
    }
}
