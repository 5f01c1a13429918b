//! Cross-day settlement history in SQLite. Re-running a day's settlement
//! never duplicates rows: signals are unique on (ts, fixture, market, pick
//! bucket), and a re-settled signal gets its outcome refreshed.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use settlement::{EvaluatedRecord, Summary};
use std::path::Path;

pub struct HistoryDb {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayRow {
    pub date:         String,
    pub total:        i64,
    pub win:          i64,
    pub loss:         i64,
    pub success_rate: f64,
}

impl HistoryDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path).with_context(|| format!("open history db at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Inserts new signals and refreshes the outcome of known ones.
    /// Returns how many rows were new.
    pub fn record_day(&mut self, evaluated: &[EvaluatedRecord], summary: &Summary) -> Result<usize> {
        let tx = self.conn.transaction().context("begin history tx")?;
        let mut inserted = 0;
        {
            let mut insert = tx.prepare(
                r#"INSERT OR IGNORE INTO signals
                   (ts, date, fixture_id, league, home, away, minute, market, pick, pick_bucket, confidence, price, outcome)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            )?;
            let mut refresh = tx.prepare(
                "UPDATE signals SET outcome = ?5 WHERE ts = ?1 AND fixture_id = ?2 AND market = ?3 AND pick_bucket = ?4",
            )?;
            for e in evaluated {
                let r = &e.record;
                let ts = r.ts.to_rfc3339();
                let outcome = e.outcome.as_str();
                let n = insert.execute(params![
                    ts,
                    r.date.to_string(),
                    r.fixture_id,
                    r.league,
                    r.home,
                    r.away,
                    r.minute,
                    r.market,
                    r.pick,
                    e.pick_bucket,
                    r.confidence,
                    r.price,
                    outcome,
                ])?;
                if n == 0 {
                    refresh.execute(params![ts, r.fixture_id, r.market, e.pick_bucket, outcome])?;
                }
                inserted += n;
            }

            tx.execute(
                r#"INSERT INTO daily_summary (date, total, win, loss, void, pending, unsupported, success_rate)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                   ON CONFLICT(date) DO UPDATE SET
                     total = excluded.total, win = excluded.win, loss = excluded.loss,
                     void = excluded.void, pending = excluded.pending,
                     unsupported = excluded.unsupported, success_rate = excluded.success_rate"#,
                params![
                    summary.date.to_string(),
                    summary.total as i64,
                    summary.win as i64,
                    summary.loss as i64,
                    summary.void as i64,
                    summary.pending as i64,
                    summary.unsupported as i64,
                    summary.success_rate,
                ],
            )?;
        }
        tx.commit().context("commit history tx")?;
        Ok(inserted)
    }

    pub fn signal_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(1) FROM signals", [], |r| r.get(0))
            .context("count signals")
    }

    /// (outcome, count), most frequent first.
    pub fn outcome_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT outcome, COUNT(1) AS n FROM signals GROUP BY outcome ORDER BY n DESC, outcome ASC")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("read outcome counts")
    }

    /// (market, win, loss) over every settled day.
    pub fn market_record(&self) -> Result<Vec<(String, i64, i64)>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT market,
                      SUM(CASE WHEN outcome = 'win' THEN 1 ELSE 0 END),
                      SUM(CASE WHEN outcome = 'loss' THEN 1 ELSE 0 END)
               FROM signals GROUP BY market ORDER BY market ASC"#,
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("read market record")
    }

    pub fn last_day(&self) -> Result<Option<DayRow>> {
        self.conn
            .query_row(
                "SELECT date, total, win, loss, success_rate FROM daily_summary ORDER BY date DESC LIMIT 1",
                [],
                |r| {
                    Ok(DayRow {
                        date:         r.get(0)?,
                        total:        r.get(1)?,
                        win:          r.get(2)?,
                        loss:         r.get(3)?,
                        success_rate: r.get(4)?,
                    })
                },
            )
            .optional()
            .context("read last settled day")
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            ts          TEXT NOT NULL,
            date        TEXT NOT NULL,
            fixture_id  TEXT NOT NULL,
            league      TEXT NOT NULL,
            home        TEXT NOT NULL,
            away        TEXT NOT NULL,
            minute      INTEGER,
            market      TEXT NOT NULL,
            pick        TEXT NOT NULL,
            pick_bucket TEXT NOT NULL,
            confidence  REAL NOT NULL,
            price       REAL,
            outcome     TEXT NOT NULL,
            UNIQUE(ts, fixture_id, market, pick_bucket)
        );
        CREATE INDEX IF NOT EXISTS idx_signals_date ON signals(date);

        CREATE TABLE IF NOT EXISTS daily_summary (
            date         TEXT PRIMARY KEY,
            total        INTEGER NOT NULL,
            win          INTEGER NOT NULL,
            loss         INTEGER NOT NULL,
            void         INTEGER NOT NULL,
            pending      INTEGER NOT NULL,
            unsupported  INTEGER NOT NULL,
            success_rate REAL NOT NULL
        );
        "#,
    )
    .context("init history schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use logger::SignalRecord;
    use settlement::{summarize, Outcome};

    fn evaluated(fixture: &str, pick_bucket: &str, outcome: Outcome) -> EvaluatedRecord {
        EvaluatedRecord {
            record: SignalRecord {
                ts:         Utc.with_ymd_and_hms(2024, 6, 1, 17, 5, 0).unwrap(),
                local_time: String::new(),
                date:       NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                fixture_id: fixture.into(),
                league:     "Eredivisie".into(),
                country:    "Netherlands".into(),
                home:       "H".into(),
                away:       "A".into(),
                minute:     Some(62),
                score_home: 1,
                score_away: 1,
                market:     "OVER".into(),
                selection:  "over_2.5".into(),
                pick:       format!("{pick_bucket} (live)"),
                confidence: 0.64,
                price:      Some(1.85),
                bucket:     12,
                details:    String::new(),
            },
            pick_bucket: pick_bucket.into(),
            outcome,
        }
    }

    #[test]
    fn rerun_does_not_duplicate_and_refreshes_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&dir.path().join("history.db")).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let first = vec![evaluated("1", "Over 2.5", Outcome::Pending), evaluated("2", "Over 1.5", Outcome::Win)];
        assert_eq!(db.record_day(&first, &summarize(date, &first, 3)).unwrap(), 2);

        let second = vec![evaluated("1", "Over 2.5", Outcome::Win), evaluated("2", "Over 1.5", Outcome::Win)];
        assert_eq!(db.record_day(&second, &summarize(date, &second, 3)).unwrap(), 0);

        assert_eq!(db.signal_count().unwrap(), 2);
        assert_eq!(db.outcome_counts().unwrap(), vec![("win".to_string(), 2)]);
        assert_eq!(db.market_record().unwrap(), vec![("OVER".to_string(), 2, 0)]);

        let day = db.last_day().unwrap().unwrap();
        assert_eq!(day.date, "2024-06-01");
        assert_eq!((day.total, day.win, day.loss), (2, 2, 0));
    }

    #[test]
    fn empty_db_has_no_last_day() {
        let dir = tempfile::tempdir().unwrap();
        let db = HistoryDb::open(&dir.path().join("nested/history.db")).unwrap();
        assert_eq!(db.signal_count().unwrap(), 0);
        assert!(db.last_day().unwrap().is_none());
    }
}
