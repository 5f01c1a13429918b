//! Daily external-call budget. The ledger is a JSON object date → consumed
//! calls (`logs/api_usage.json`), rewritten after every consumption so a
//! restart picks up where the last process stopped.

use chrono::{Duration, NaiveDate};
use logger::Clock;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Days kept in the ledger file; older keys are pruned on write.
const LEDGER_RETENTION_DAYS: i64 = 30;

#[derive(Error, Debug)]
pub enum QuotaError {
    #[error("quota ledger write failed at {path}: {source}")]
    Persist {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("quota ledger encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

struct LedgerState {
    days:        BTreeMap<NaiveDate, u64>,
    /// Calls still allowed in the current cycle; `None` outside a cycle.
    cycle_left:  Option<u64>,
    /// Last persist failed; cleared by the next successful write.
    persist_err: bool,
}

pub struct QuotaBudget {
    path:    PathBuf,
    limit:   u64,
    reserve: u64,
    clock:   Arc<dyn Clock>,
    state:   Mutex<LedgerState>,
}

impl QuotaBudget {
    /// Loads the ledger at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>, limit: u64, reserve: u64, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let days = load_ledger(&path);
        Self {
            path,
            limit,
            reserve,
            clock,
            state: Mutex::new(LedgerState { days, cycle_left: None, persist_err: false }),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn reserve(&self) -> u64 {
        self.reserve
    }

    pub fn used(&self) -> u64 {
        let today = self.today();
        self.state.lock().days.get(&today).copied().unwrap_or(0)
    }

    /// `max(0, limit − used today)`.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used())
    }

    /// Remaining budget is at or below the safety reserve.
    pub fn is_low(&self) -> bool {
        self.remaining() <= self.reserve
    }

    /// False while the last ledger write failed.
    pub fn ledger_healthy(&self) -> bool {
        !self.state.lock().persist_err
    }

    /// Records `n` calls that reached the provider and persists the ledger.
    /// The in-memory count is updated even when the write fails, so the
    /// process never under-counts.
    pub fn consume(&self, n: u64) -> Result<u64, QuotaError> {
        let today = self.today();
        let mut st = self.state.lock();
        let used = {
            let slot = st.days.entry(today).or_insert(0);
            *slot += n;
            *slot
        };

        let cutoff = today - Duration::days(LEDGER_RETENTION_DAYS);
        st.days.retain(|d, _| *d >= cutoff);

        match save_ledger(&self.path, &st.days) {
            Ok(()) => {
                st.persist_err = false;
                Ok(used)
            }
            Err(e) => {
                st.persist_err = true;
                Err(e)
            }
        }
    }

    /// Calls one cycle may spend, given `max` per cycle. Halved (rounded up)
    /// once the remaining budget is inside the reserve, and never more than
    /// what is left for the day.
    pub fn cycle_allowance(&self, max: u64) -> u64 {
        let remaining = self.remaining();
        if remaining == 0 {
            return 0;
        }
        if remaining <= self.reserve {
            return max.div_ceil(2).min(remaining);
        }
        max.min(remaining)
    }

    /// Starts a cycle with its call allowance and returns it.
    pub fn begin_cycle(&self, max: u64) -> u64 {
        let allowance = self.cycle_allowance(max);
        self.state.lock().cycle_left = Some(allowance);
        allowance
    }

    pub fn end_cycle(&self) {
        self.state.lock().cycle_left = None;
    }

    /// Claims one call slot before a request goes out. Checks the day budget
    /// and, inside a cycle, the cycle allowance under one lock so concurrent
    /// fetches can never overrun either.
    pub fn try_reserve(&self) -> bool {
        let today = self.today();
        let mut st = self.state.lock();
        let used = st.days.get(&today).copied().unwrap_or(0);
        if used >= self.limit {
            return false;
        }
        match st.cycle_left.as_mut() {
            Some(0) => false,
            Some(left) => {
                *left -= 1;
                true
            }
            None => true,
        }
    }

    pub fn cycle_left(&self) -> Option<u64> {
        self.state.lock().cycle_left
    }
}

fn load_ledger(path: &Path) -> BTreeMap<NaiveDate, u64> {
    match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), "quota ledger unreadable, starting empty: {e}");
            BTreeMap::new()
        }),
        Err(_) => BTreeMap::new(),
    }
}

fn save_ledger(path: &Path, days: &BTreeMap<NaiveDate, u64>) -> Result<(), QuotaError> {
    let body = serde_json::to_string_pretty(days)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| QuotaError::Persist { path: dir.to_path_buf(), source })?;
    }
    // Write-then-rename so a crash never leaves a truncated ledger.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).map_err(|source| QuotaError::Persist { path: tmp.clone(), source })?;
    fs::rename(&tmp, path).map_err(|source| QuotaError::Persist { path: path.to_path_buf(), source })?;
    Ok(())
}
