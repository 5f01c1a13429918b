//! Settles one day's event log: evaluated records and summary next to the
//! log, the day recorded in the history DB, and the operator text. Shared by
//! the `daily-summary` binary and the `/summary` admin command.

use crate::history_db::HistoryDb;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use fixture_monitor::DataSource;
use logger::SignalLog;
use settlement::{format_empty_day, format_summary, settle_records, summarize, write_evaluated, write_summary, Summary};
use std::path::{Path, PathBuf};
use tracing::info;

/// Markets and leagues listed in the summary text.
pub const TOP_N: usize = 3;

pub const HISTORY_DB_FILE: &str = "history.db";

#[derive(Debug)]
pub struct DaySettlement {
    pub summary:          Summary,
    /// Raw records read from the day's log, before dedup.
    pub raw_records:      usize,
    pub new_history_rows: usize,
    pub evaluated_file:   PathBuf,
    pub summary_file:     PathBuf,
    /// Telegram HTML for the operator.
    pub text:             String,
}

/// An empty day still gets its (empty) artifacts and history row; its text
/// says nothing was logged.
pub async fn settle_day(source: &dyn DataSource, data_dir: &Path, date: NaiveDate) -> Result<DaySettlement> {
    let records = SignalLog::new(data_dir).read_for_date(date).context("read event log")?;
    let evaluated = if records.is_empty() {
        Vec::new()
    } else {
        settle_records(source, &records).await
    };
    let summary = summarize(date, &evaluated, TOP_N);

    let evaluated_file = write_evaluated(data_dir, date, &evaluated).context("write evaluated records")?;
    let summary_file = write_summary(data_dir, date, &summary).context("write summary")?;

    let mut history = HistoryDb::open(&data_dir.join(HISTORY_DB_FILE))?;
    let new_history_rows = history.record_day(&evaluated, &summary)?;

    let text = if records.is_empty() {
        format_empty_day(date)
    } else {
        format_summary(&summary)
    };

    info!(
        %date,
        raw = records.len(),
        settled = evaluated.len(),
        win = summary.win,
        loss = summary.loss,
        pending = summary.pending,
        new_history_rows,
        "day settled"
    );
    Ok(DaySettlement {
        summary,
        raw_records: records.len(),
        new_history_rows,
        evaluated_file,
        summary_file,
        text,
    })
}
