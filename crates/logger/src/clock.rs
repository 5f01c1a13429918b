//! Wall clock with a configured timezone. "Today" is the calendar day in that
//! timezone, so the event log, quota ledger and daily caps all roll over at
//! local midnight.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn tz(&self) -> Tz;

    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.tz()).date_naive()
    }

    fn local_hour(&self) -> u32 {
        self.now().with_timezone(&self.tz()).hour()
    }

    /// `%Y-%m-%d %H:%M:%S` in local time, used in operator messages and records.
    fn local_stamp(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz()).format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn tz(&self) -> Tz {
        self.tz
    }
}

/// Clock that only moves when told to. Used by replays and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    tz:  Tz,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>, tz: Tz) -> Self {
        Self { now: Mutex::new(start), tz }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn tz(&self) -> Tz {
        self.tz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn today_follows_local_midnight() {
        // 22:30 UTC on 1 July is already 2 July in Budapest (UTC+2).
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2024, 7, 1, 22, 30, 0).unwrap(),
            chrono_tz::Europe::Budapest,
        );
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 7, 2).unwrap());
        assert_eq!(clock.local_hour(), 0);

        clock.advance(Duration::hours(-1));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(clock.local_hour(), 23);
    }
}
