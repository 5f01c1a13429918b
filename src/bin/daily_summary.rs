/// LiveSignals — daily summary
///
/// Settles one day's event log against final results:
///   1. Reads data/<date>/events.jsonl (SUMMARY_DATE, default today)
///   2. Dedups, looks up each fixture once, applies the market rules
///   3. Writes events_evaluated.jsonl + summary.json next to the log
///   4. Records the day in data/history.db and sends the summary
///
/// Run:
///   cargo run --bin daily-summary

use anyhow::{Context, Result};
use chrono::NaiveDate;
use dotenv::dotenv;
use fixture_monitor::{ApiFootballClient, QuotaBudget};
use live_signals::{build_sinks, settle_day, Config};
use logger::{Clock, EventLogger, SystemClock};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cfg = Config::from_env().context("invalid configuration")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(cfg.timezone));

    let date = match env::var("SUMMARY_DATE") {
        Ok(v) if !v.trim().is_empty() => NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
            .with_context(|| format!("SUMMARY_DATE '{v}' is not YYYY-MM-DD"))?,
        _ => clock.today(),
    };
    info!("=== LiveSignals daily summary — {date} ===");

    let quota = Arc::new(QuotaBudget::open(
        &cfg.quota.usage_file,
        cfg.quota.daily_limit,
        cfg.quota.safety_reserve,
        Arc::clone(&clock),
    ));
    let client = ApiFootballClient::new(cfg.api.clone(), Arc::clone(&quota), cfg.retry.clone())
        .with_ops_log(EventLogger::new(&cfg.logs_dir));

    let day = settle_day(&client, &cfg.data_dir, date).await?;
    info!("Saved: {} | {}", day.evaluated_file.display(), day.summary_file.display());

    let (signals, _) = build_sinks(&cfg.notify);
    if let Err(e) = signals.send(&day.text).await {
        warn!("summary not delivered: {e}");
    }
    Ok(())
}
