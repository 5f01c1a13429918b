//! Day settlement: dedup the day's records, fetch each fixture's final state
//! once, apply the market rule per record and aggregate.

use crate::rules::{pick_bucket, settle, FixtureOutcome, Outcome};
use chrono::NaiveDate;
use fixture_monitor::DataSource;
use logger::SignalRecord;
use prediction_engine::{extract, Metric, Side};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

/// One settled record. The original record is carried unchanged; the
/// outcome lives next to it, never inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedRecord {
    #[serde(flatten)]
    pub record:      SignalRecord,
    pub pick_bucket: String,
    pub outcome:     Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub date:         NaiveDate,
    pub total:        usize,
    pub win:          usize,
    pub loss:         usize,
    pub void:         usize,
    pub pending:      usize,
    pub unsupported:  usize,
    /// win / (win + loss); 0 when nothing is decided.
    pub success_rate: f64,
    pub top_markets:  Vec<(String, usize)>,
    pub top_leagues:  Vec<(String, usize)>,
}

/// Keeps the earliest record per (fixture, market, normalised pick).
pub fn dedup_records(records: &[SignalRecord]) -> Vec<SignalRecord> {
    let mut sorted: Vec<&SignalRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.ts);

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|r| {
            seen.insert((
                r.fixture_id.trim().to_string(),
                r.market.trim().to_ascii_uppercase(),
                pick_bucket(&r.pick).to_lowercase(),
            ))
        })
        .cloned()
        .collect()
}

fn needs_corners(records: &[&SignalRecord]) -> bool {
    records.iter().any(|r| r.market.trim().eq_ignore_ascii_case("CORNERS"))
}

async fn fixture_outcome(source: &dyn DataSource, fixture_id: &str, want_corners: bool) -> FixtureOutcome {
    let result = match source.final_result(fixture_id).await {
        Ok(r) => r,
        Err(e) => {
            warn!(fixture = fixture_id, "final result unavailable: {e}");
            None
        }
    };

    let corners = if want_corners {
        match source.statistics(fixture_id).await {
            Ok(Some(raw)) => {
                let home = extract(&raw, Side::Home, Metric::Corners);
                let away = extract(&raw, Side::Away, Metric::Corners);
                match (home, away) {
                    (None, None) => None,
                    (h, a) => Some((h.unwrap_or(0.0) + a.unwrap_or(0.0)).round() as u32),
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(fixture = fixture_id, "corner statistics unavailable: {e}");
                None
            }
        }
    } else {
        None
    };

    FixtureOutcome { result, corners }
}

/// Settles one day's records. Each distinct fixture is looked up once; a
/// failed lookup leaves its records pending.
pub async fn settle_records(source: &dyn DataSource, records: &[SignalRecord]) -> Vec<EvaluatedRecord> {
    let deduped = dedup_records(records);

    let mut by_fixture: BTreeMap<&str, Vec<&SignalRecord>> = BTreeMap::new();
    for r in &deduped {
        by_fixture.entry(r.fixture_id.trim()).or_default().push(r);
    }

    let mut outcomes: HashMap<&str, FixtureOutcome> = HashMap::with_capacity(by_fixture.len());
    for (fid, recs) in &by_fixture {
        let fx = if fid.is_empty() || fid.eq_ignore_ascii_case("none") {
            FixtureOutcome::default()
        } else {
            fixture_outcome(source, fid, needs_corners(recs)).await
        };
        outcomes.insert(*fid, fx);
    }

    let empty = FixtureOutcome::default();
    let evaluated: Vec<EvaluatedRecord> = deduped
        .iter()
        .map(|r| {
            let bucket = pick_bucket(&r.pick);
            let fx = outcomes.get(r.fixture_id.trim()).unwrap_or(&empty);
            EvaluatedRecord {
                outcome: settle(r, &bucket, fx),
                pick_bucket: bucket,
                record: r.clone(),
            }
        })
        .collect();

    info!(
        raw = records.len(),
        deduped = deduped.len(),
        fixtures = by_fixture.len(),
        "settled day"
    );
    evaluated
}

fn top_k(counts: HashMap<String, usize>, k: usize) -> Vec<(String, usize)> {
    let mut v: Vec<(String, usize)> = counts.into_iter().collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v.truncate(k);
    v
}

pub fn summarize(date: NaiveDate, evaluated: &[EvaluatedRecord], top_n: usize) -> Summary {
    let count = |o: Outcome| evaluated.iter().filter(|e| e.outcome == o).count();
    let (win, loss) = (count(Outcome::Win), count(Outcome::Loss));
    let decided = win + loss;

    let mut markets: HashMap<String, usize> = HashMap::new();
    let mut leagues: HashMap<String, usize> = HashMap::new();
    for e in evaluated {
        *markets.entry(e.record.market.trim().to_ascii_uppercase()).or_default() += 1;
        *leagues.entry(e.record.league.trim().to_string()).or_default() += 1;
    }

    Summary {
        date,
        total: evaluated.len(),
        win,
        loss,
        void: count(Outcome::Void),
        pending: count(Outcome::Pending),
        unsupported: count(Outcome::Unsupported),
        success_rate: if decided == 0 { 0.0 } else { win as f64 / decided as f64 },
        top_markets: top_k(markets, top_n),
        top_leagues: top_k(leagues, top_n),
    }
}
