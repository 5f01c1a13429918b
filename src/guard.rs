//! Dedup/cooldown guard. Decides and records under one lock, so two
//! candidates for the same fixture can never both pass.

use crate::config::GuardConfig;
use chrono::{DateTime, Duration, Utc};
use logger::SignalRecord;
use parking_lot::Mutex;
use prediction_engine::CandidateSignal;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// fixture / market / selection / minute bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub fixture_id: String,
    pub market:     String,
    pub selection:  String,
    pub bucket:     u32,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}|{}", self.fixture_id, self.market, self.selection, self.bucket)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardRejection {
    FixtureCooldown { remaining: Duration },
    MarketCooldown { remaining: Duration },
    Duplicate(DedupKey),
}

impl fmt::Display for GuardRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardRejection::FixtureCooldown { remaining } => {
                write!(f, "fixture cooldown, {}s left", remaining.num_seconds())
            }
            GuardRejection::MarketCooldown { remaining } => {
                write!(f, "market cooldown, {}s left", remaining.num_seconds())
            }
            GuardRejection::Duplicate(key) => write!(f, "already sent {key}"),
        }
    }
}

#[derive(Default)]
struct GuardState {
    /// fixture id → last accepted signal
    fixture_last: HashMap<String, DateTime<Utc>>,
    /// (fixture id, market) → last accepted signal
    market_last:  HashMap<(String, String), DateTime<Utc>>,
    seen:         HashSet<DedupKey>,
}

pub struct DedupGuard {
    cfg:   GuardConfig,
    state: Mutex<GuardState>,
}

impl DedupGuard {
    pub fn new(cfg: GuardConfig) -> Self {
        Self { cfg, state: Mutex::new(GuardState::default()) }
    }

    pub fn bucket_for(&self, minute: u32) -> u32 {
        minute / self.cfg.bucket_minutes.max(1)
    }

    pub fn key_for(&self, c: &CandidateSignal) -> DedupKey {
        DedupKey {
            fixture_id: c.fixture_id.clone(),
            market:     c.market.as_str().to_string(),
            selection:  c.selection.label(),
            bucket:     self.bucket_for(c.minute),
        }
    }

    fn check(&self, st: &GuardState, key: &DedupKey, now: DateTime<Utc>) -> Result<(), GuardRejection> {
        if let Some(last) = st.fixture_last.get(&key.fixture_id) {
            let ready = *last + self.cfg.fixture_cooldown;
            if now < ready {
                return Err(GuardRejection::FixtureCooldown { remaining: ready - now });
            }
        }
        if let Some(last) = st.market_last.get(&(key.fixture_id.clone(), key.market.clone())) {
            let ready = *last + self.cfg.market_cooldown;
            if now < ready {
                return Err(GuardRejection::MarketCooldown { remaining: ready - now });
            }
        }
        if st.seen.contains(key) {
            return Err(GuardRejection::Duplicate(key.clone()));
        }
        Ok(())
    }

    /// Read-only pre-check, so odds are only fetched for candidates that
    /// could still pass. `try_admit` is the decision.
    pub fn would_admit(&self, c: &CandidateSignal, now: DateTime<Utc>) -> Result<(), GuardRejection> {
        let key = self.key_for(c);
        self.check(&self.state.lock(), &key, now)
    }

    /// Checks fixture cooldown, market cooldown and the dedup key in that
    /// order and, on success, records all three before the lock is released.
    pub fn try_admit(&self, c: &CandidateSignal, now: DateTime<Utc>) -> Result<DedupKey, GuardRejection> {
        let key = self.key_for(c);
        let mut st = self.state.lock();
        self.check(&st, &key, now)?;
        st.fixture_last.insert(key.fixture_id.clone(), now);
        st.market_last.insert((key.fixture_id.clone(), key.market.clone()), now);
        st.seen.insert(key.clone());
        Ok(key)
    }

    /// Replays already-dispatched records, e.g. today's event log at startup.
    pub fn reseed(&self, records: &[SignalRecord]) -> usize {
        let mut st = self.state.lock();
        for r in records {
            let market = r.market.trim().to_ascii_uppercase();
            let fixture_last = st.fixture_last.entry(r.fixture_id.clone()).or_insert(r.ts);
            if r.ts > *fixture_last {
                *fixture_last = r.ts;
            }
            let market_last = st.market_last.entry((r.fixture_id.clone(), market.clone())).or_insert(r.ts);
            if r.ts > *market_last {
                *market_last = r.ts;
            }
            st.seen.insert(DedupKey {
                fixture_id: r.fixture_id.clone(),
                market,
                selection: r.selection.clone(),
                bucket: r.bucket,
            });
        }
        st.seen.len()
    }

    /// Drops cooldown entries that can no longer block anything. Dedup keys
    /// stay for the process lifetime.
    pub fn cleanup(&self, now: DateTime<Utc>) {
        let fixture_cutoff = now - self.cfg.fixture_cooldown;
        let market_cutoff = now - self.cfg.market_cooldown;
        let mut st = self.state.lock();
        st.fixture_last.retain(|_, ts| *ts > fixture_cutoff);
        st.market_last.retain(|_, ts| *ts > market_cutoff);
    }

    pub fn tracked_fixtures(&self) -> usize {
        self.state.lock().fixture_last.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use prediction_engine::{MarketKind, Selection, Side};
    use std::sync::Arc;

    fn cfg() -> GuardConfig {
        GuardConfig {
            fixture_cooldown: Duration::minutes(10),
            market_cooldown:  Duration::minutes(30),
            bucket_minutes:   5,
        }
    }

    fn cand(fixture: &str, market: MarketKind, selection: Selection, minute: u32) -> CandidateSignal {
        CandidateSignal {
            market,
            selection,
            pick: selection.label(),
            confidence: 0.7,
            price: None,
            fixture_id: fixture.into(),
            minute,
            score_home: 0,
            score_away: 0,
            details: String::new(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 4, 16, 0, 0).unwrap()
    }

    #[test]
    fn fixture_cooldown_blocks_other_markets() {
        let g = DedupGuard::new(cfg());
        let over = cand("1", MarketKind::Over, Selection::Over { line: 2.5 }, 50);
        let btts = cand("1", MarketKind::Btts, Selection::BttsYes, 52);

        assert!(g.try_admit(&over, t0()).is_ok());
        assert!(matches!(
            g.try_admit(&btts, t0() + Duration::minutes(5)),
            Err(GuardRejection::FixtureCooldown { .. })
        ));
        assert!(g.try_admit(&btts, t0() + Duration::minutes(10)).is_ok());
    }

    #[test]
    fn market_cooldown_outlasts_fixture_cooldown() {
        let g = DedupGuard::new(cfg());
        let first = cand("1", MarketKind::Over, Selection::Over { line: 1.5 }, 30);
        let later = cand("1", MarketKind::Over, Selection::Over { line: 2.5 }, 45);

        g.try_admit(&first, t0()).unwrap();
        assert!(matches!(
            g.try_admit(&later, t0() + Duration::minutes(15)),
            Err(GuardRejection::MarketCooldown { .. })
        ));
        assert!(g.try_admit(&later, t0() + Duration::minutes(30)).is_ok());
    }

    #[test]
    fn same_key_is_never_admitted_twice() {
        let g = DedupGuard::new(GuardConfig {
            fixture_cooldown: Duration::zero(),
            market_cooldown:  Duration::zero(),
            bucket_minutes:   5,
        });
        let c = cand("9", MarketKind::NextGoal, Selection::NextGoal { side: Side::Home }, 61);
        let key = g.try_admit(&c, t0()).unwrap();
        assert_eq!(key.bucket, 12);
        assert!(matches!(g.try_admit(&c, t0() + Duration::hours(1)), Err(GuardRejection::Duplicate(_))));

        let next_bucket = cand("9", MarketKind::NextGoal, Selection::NextGoal { side: Side::Home }, 66);
        assert!(g.try_admit(&next_bucket, t0() + Duration::hours(1)).is_ok());
    }

    #[test]
    fn would_admit_does_not_record() {
        let g = DedupGuard::new(cfg());
        let c = cand("3", MarketKind::Btts, Selection::BttsYes, 40);
        assert!(g.would_admit(&c, t0()).is_ok());
        assert!(g.would_admit(&c, t0()).is_ok());
        assert!(g.try_admit(&c, t0()).is_ok());
        assert!(g.would_admit(&c, t0()).is_err());
    }

    #[test]
    fn concurrent_admits_let_exactly_one_through() {
        let g = Arc::new(DedupGuard::new(cfg()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let g = Arc::clone(&g);
                std::thread::spawn(move || {
                    let c = cand("5", MarketKind::Over, Selection::Over { line: 2.5 + i as f64 }, 50);
                    g.try_admit(&c, t0()).is_ok()
                })
            })
            .collect();
        let admitted = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(admitted, 1);
        assert_eq!(g.tracked_fixtures(), 1);
    }

    #[test]
    fn reseed_blocks_already_sent_combinations() {
        let g = DedupGuard::new(cfg());
        let sent = SignalRecord {
            ts:         t0(),
            local_time: String::new(),
            date:       NaiveDate::from_ymd_opt(2024, 5, 4).unwrap(),
            fixture_id: "7".into(),
            league:     "L".into(),
            country:    String::new(),
            home:       "H".into(),
            away:       "A".into(),
            minute:     Some(55),
            score_home: 1,
            score_away: 0,
            market:     "OVER".into(),
            selection:  "over_2.5".into(),
            pick:       "Over 2.5 (live)".into(),
            confidence: 0.6,
            price:      None,
            bucket:     11,
            details:    String::new(),
        };
        assert_eq!(g.reseed(&[sent]), 1);

        let again = cand("7", MarketKind::Over, Selection::Over { line: 2.5 }, 57);
        assert!(matches!(
            g.try_admit(&again, t0() + Duration::minutes(3)),
            Err(GuardRejection::FixtureCooldown { .. })
        ));
        assert!(matches!(
            g.try_admit(&again, t0() + Duration::hours(2)),
            Err(GuardRejection::Duplicate(_))
        ));
    }

    #[test]
    fn cleanup_forgets_expired_cooldowns() {
        let g = DedupGuard::new(cfg());
        g.try_admit(&cand("1", MarketKind::Btts, Selection::BttsYes, 40), t0()).unwrap();
        g.cleanup(t0() + Duration::minutes(5));
        assert_eq!(g.tracked_fixtures(), 1);
        g.cleanup(t0() + Duration::minutes(45));
        assert_eq!(g.tracked_fixtures(), 0);
    }
}
