//! Settlement artifacts next to the day's event log, and the operator text.

use crate::evaluate::{EvaluatedRecord, Summary};
use crate::SettlementError;
use chrono::NaiveDate;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const EVALUATED_FILE: &str = "events_evaluated.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

fn day_dir(root: &Path, date: NaiveDate) -> Result<PathBuf, SettlementError> {
    let dir = root.join(date.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&dir).map_err(|source| SettlementError::Io { path: dir.clone(), source })?;
    Ok(dir)
}

/// Rewrites the whole day's evaluated file.
pub fn write_evaluated(root: &Path, date: NaiveDate, evaluated: &[EvaluatedRecord]) -> Result<PathBuf, SettlementError> {
    let path = day_dir(root, date)?.join(EVALUATED_FILE);
    let mut body = Vec::new();
    for e in evaluated {
        serde_json::to_writer(&mut body, e)?;
        body.push(b'\n');
    }
    let tmp = path.with_extension("jsonl.tmp");
    let mut f = fs::File::create(&tmp).map_err(|source| SettlementError::Io { path: tmp.clone(), source })?;
    f.write_all(&body)
        .and_then(|_| f.sync_data())
        .map_err(|source| SettlementError::Io { path: tmp.clone(), source })?;
    fs::rename(&tmp, &path).map_err(|source| SettlementError::Io { path: path.clone(), source })?;
    Ok(path)
}

pub fn write_summary(root: &Path, date: NaiveDate, summary: &Summary) -> Result<PathBuf, SettlementError> {
    let path = day_dir(root, date)?.join(SUMMARY_FILE);
    let body = serde_json::to_string_pretty(summary)?;
    fs::write(&path, body).map_err(|source| SettlementError::Io { path: path.clone(), source })?;
    Ok(path)
}

fn fmt_top(items: &[(String, usize)]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items
        .iter()
        .map(|(name, n)| format!("{} ({n})", html_escape(if name.is_empty() { "?" } else { name })))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Telegram HTML summary of one settled day.
pub fn format_summary(summary: &Summary) -> String {
    format!(
        "🧾 <b>Daily summary – {date}</b>\n\
         Signals: {total}\n\
         ✅ Won: {win}\n\
         ❌ Lost: {loss}\n\
         ↔️ Void: {void}\n\
         ⏳ Pending: {pending}\n\
         ❔ Unsupported: {unsupported}\n\n\
         Top markets: {markets}\n\
         Top leagues: {leagues}\n\
         Success rate (void/pending excluded): {rate:.1}%\n",
        date = summary.date.format("%Y-%m-%d"),
        total = summary.total,
        win = summary.win,
        loss = summary.loss,
        void = summary.void,
        pending = summary.pending,
        unsupported = summary.unsupported,
        markets = fmt_top(&summary.top_markets),
        leagues = fmt_top(&summary.top_leagues),
        rate = summary.success_rate * 100.0,
    )
}

pub fn format_empty_day(date: NaiveDate) -> String {
    format!("🧾 <b>Daily summary – {}</b>\nNo signals were logged that day.", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Outcome;
    use chrono::{TimeZone, Utc};
    use logger::SignalRecord;

    fn summary() -> Summary {
        Summary {
            date: NaiveDate::from_ymd_opt(2024, 4, 6).unwrap(),
            total: 4,
            win: 2,
            loss: 1,
            void: 0,
            pending: 1,
            unsupported: 0,
            success_rate: 2.0 / 3.0,
            top_markets: vec![("OVER".into(), 3), ("BTTS".into(), 1)],
            top_leagues: vec![("Ligue 1 & Co".into(), 4)],
        }
    }

    #[test]
    fn summary_text() {
        let text = format_summary(&summary());
        assert!(text.contains("Daily summary – 2024-04-06"));
        assert!(text.contains("Top markets: OVER (3), BTTS (1)"));
        assert!(text.contains("Ligue 1 &amp; Co (4)"));
        assert!(text.contains("66.7%"));
    }

    #[test]
    fn evaluated_file_is_rewritten_not_appended() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 4, 6).unwrap();
        let e = EvaluatedRecord {
            record: SignalRecord {
                ts: Utc.with_ymd_and_hms(2024, 4, 6, 15, 0, 0).unwrap(),
                local_time: String::new(),
                date,
                fixture_id: "1".into(),
                league: "L".into(),
                country: String::new(),
                home: "H".into(),
                away: "A".into(),
                minute: Some(40),
                score_home: 0,
                score_away: 0,
                market: "OVER".into(),
                selection: "over_1.5".into(),
                pick: "Over 1.5 (live)".into(),
                confidence: 0.6,
                price: Some(1.9),
                bucket: 8,
                details: String::new(),
            },
            pick_bucket: "Over 1.5".into(),
            outcome: Outcome::Win,
        };
        let path = write_evaluated(dir.path(), date, &[e.clone(), e.clone()]).unwrap();
        write_evaluated(dir.path(), date, &[e.clone()]).unwrap();
        let body = fs::read_to_string(&path).unwrap();
        assert_eq!(body.lines().count(), 1);
        let back: EvaluatedRecord = serde_json::from_str(body.lines().next().unwrap()).unwrap();
        assert_eq!(back, e);

        let s = write_summary(dir.path(), date, &summary()).unwrap();
        assert!(fs::read_to_string(s).unwrap().contains("\"success_rate\""));
    }
}
