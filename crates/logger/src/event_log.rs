//! Append-only signal log. One JSONL file per calendar day under
//! `<root>/<YYYY-MM-DD>/events.jsonl`; a line is written once and never edited.
//! Settlement reads it out of band and writes its results next to it.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("event log write failed at {path}: {source}")]
    Write {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event log read failed at {path}: {source}")]
    Read {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event record encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted form of one dispatched signal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignalRecord {
    /// Dispatch time.
    pub ts:          DateTime<Utc>,
    /// Dispatch time rendered in the configured timezone.
    pub local_time:  String,
    /// Calendar day the record belongs to (configured timezone).
    pub date:        NaiveDate,
    pub fixture_id:  String,
    pub league:      String,
    #[serde(default)]
    pub country:     String,
    pub home:        String,
    pub away:        String,
    pub minute:      Option<u32>,
    pub score_home:  u32,
    pub score_away:  u32,
    /// "OVER" | "BTTS" | "NEXT_GOAL" | "DNB" | "LATE_GOAL" (older logs may hold others)
    pub market:      String,
    /// Side-or-kind label, e.g. "over_2.5", "yes", "home".
    pub selection:   String,
    pub pick:        String,
    pub confidence:  f64,
    pub price:       Option<f64>,
    /// Five-minute bucket index the signal was deduplicated under.
    pub bucket:      u32,
    #[serde(default)]
    pub details:     String,
}

pub struct SignalLog {
    root:  PathBuf,
    write: Mutex<()>,
}

impl SignalLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), write: Mutex::new(()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format("%Y-%m-%d").to_string())
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.day_dir(date).join("events.jsonl")
    }

    /// Appends one record to the file of `record.date`. The line is encoded
    /// up front and written with a single `write_all`, then synced, so a
    /// reader never observes half a record.
    pub fn append(&self, record: &SignalRecord) -> Result<(), LogError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let dir  = self.day_dir(record.date);
        let path = self.path_for(record.date);

        let _guard = self.write.lock();
        fs::create_dir_all(&dir).map_err(|source| LogError::Write { path: dir.clone(), source })?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::Write { path: path.clone(), source })?;
        f.write_all(line.as_bytes())
            .and_then(|_| f.sync_data())
            .map_err(|source| LogError::Write { path, source })?;
        Ok(())
    }

    /// All records of one day in file order. A missing file is an empty day;
    /// undecodable lines are skipped with a warning.
    pub fn read_for_date(&self, date: NaiveDate) -> Result<Vec<SignalRecord>, LogError> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let f = fs::File::open(&path).map_err(|source| LogError::Read { path: path.clone(), source })?;

        let mut out = Vec::new();
        for (idx, line) in BufReader::new(f).lines().enumerate() {
            let line = line.map_err(|source| LogError::Read { path: path.clone(), source })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SignalRecord>(&line) {
                Ok(rec) => out.push(rec),
                Err(e)  => warn!(path = %path.display(), line = idx + 1, "skipping malformed event record: {e}"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(fixture: &str, pick: &str, minute: u32) -> SignalRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 15, minute, 0).unwrap();
        SignalRecord {
            ts,
            local_time: "2024-03-09 16:00:00".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            fixture_id: fixture.into(),
            league: "Premier League".into(),
            country: "England".into(),
            home: "Home FC".into(),
            away: "Away FC".into(),
            minute: Some(minute),
            score_home: 1,
            score_away: 0,
            market: "OVER".into(),
            selection: "over_2.5".into(),
            pick: pick.into(),
            confidence: 0.71,
            price: Some(1.85),
            bucket: minute / 5,
            details: String::new(),
        }
    }

    #[test]
    fn append_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = SignalLog::new(dir.path());
        let a = record("100", "Over 2.5 (live)", 30);
        let b = record("200", "Over 1.5 (live)", 41);
        log.append(&a).unwrap();
        log.append(&b).unwrap();

        let back = log.read_for_date(a.date).unwrap();
        assert_eq!(back, vec![a, b]);
    }

    #[test]
    fn missing_day_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = SignalLog::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert!(log.read_for_date(day).unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = SignalLog::new(dir.path());
        let a = record("100", "Over 2.5 (live)", 30);
        log.append(&a).unwrap();

        let mut f = OpenOptions::new().append(true).open(log.path_for(a.date)).unwrap();
        writeln!(f, "{{not json").unwrap();
        drop(f);
        log.append(&a).unwrap();

        assert_eq!(log.read_for_date(a.date).unwrap().len(), 2);
    }

    #[test]
    fn unwritable_root_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"file, not a directory").unwrap();
        let log = SignalLog::new(&blocker);

        let err = log.append(&record("1", "Over 0.5 (live)", 10)).unwrap_err();
        assert!(matches!(err, LogError::Write { .. }));
    }
}
