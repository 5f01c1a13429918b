/// LiveSignals — live loop
///
/// What it does:
///   1. Polls live football fixtures inside the active hours
///   2. Fetches in-play statistics for the most promising ones
///   3. Runs the market evaluators, checks live odds and the dedup guard
///   4. Logs every accepted signal, then sends it to Telegram/ntfy
///
/// Run:
///   cargo run --bin live-signals

use anyhow::{Context, Result};
use dotenv::dotenv;
use fixture_monitor::{ApiFootballClient, QuotaBudget};
use live_signals::{build_sinks, Config, NotifyBackend, Orchestrator};
use logger::{Clock, EventLogger, SystemClock, TelegramUpdates};
use std::env;
use std::fs::File;
use std::sync::Arc;
use tokio::sync::watch;
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

    info!("=== LiveSignals — live football signals ===");
    info!(
        "Active hours: {:02}:00–{:02}:00 {} | poll {}s (peak {}s, low budget {}s)",
        cfg.schedule.start_hour,
        cfg.schedule.end_hour,
        cfg.timezone,
        cfg.schedule.poll.as_secs(),
        cfg.schedule.peak_poll.as_secs(),
        cfg.schedule.low_budget_poll.as_secs(),
    );
    info!("Data: {} | Logs: {}", cfg.data_dir.display(), cfg.logs_dir.display());

    // Single instance lock
    let lock_file_path = env::temp_dir().join("livesignals.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of live-signals is already running! Exiting.");
            return Ok(());
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(cfg.timezone));
    let quota = Arc::new(QuotaBudget::open(
        &cfg.quota.usage_file,
        cfg.quota.daily_limit,
        cfg.quota.safety_reserve,
        Arc::clone(&clock),
    ));
    info!(
        "API quota today: used {} / {} (reserve {})",
        quota.used(),
        quota.limit(),
        quota.reserve()
    );

    let client = ApiFootballClient::new(cfg.api.clone(), Arc::clone(&quota), cfg.retry.clone())
        .with_ops_log(EventLogger::new(&cfg.logs_dir));
    let (signals, admin) = build_sinks(&cfg.notify);

    let send_online = cfg.notices.send_online_on_start;
    let ops = EventLogger::new(&cfg.logs_dir);
    let commands = (cfg.notify.backend == NotifyBackend::Telegram)
        .then(|| (TelegramUpdates::new(cfg.notify.telegram_token.clone()), cfg.notify.admin_chat_id.clone()));
    let mut orchestrator = Orchestrator::new(cfg, Arc::new(client), Arc::clone(&quota), Arc::clone(&clock), signals)
        .with_admin_sink(Arc::clone(&admin))
        .with_ops_log(ops);
    if let Some((feed, admin_chat)) = commands {
        info!("Admin commands enabled: /kvota, /summary");
        orchestrator = orchestrator.with_command_feed(Arc::new(feed), admin_chat);
    }

    let reseeded = orchestrator.reseed_from_log().context("read today's event log")?;
    info!("{} signal(s) already sent today", reseeded);

    if send_online {
        let text = format!("✅ LiveSignals online\n🕒 {}", clock.local_stamp(clock.now()));
        if let Err(e) = admin.send(&text).await {
            warn!("online notice not delivered: {e}");
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current step");
            stop_tx.send(true).ok();
        }
        // sender must outlive the loop
        std::future::pending::<()>().await;
    });

    info!("🚀 READY: starting live loop.");
    orchestrator.run(stop_rx).await
}
