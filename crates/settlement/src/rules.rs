//! Market-specific settlement rules. Every rule is a pure function of the
//! normalised pick and the fixture's final state.

use logger::SignalRecord;
use prediction_engine::{FinalResult, Side};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Void,
    Pending,
    Unsupported,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win         => "win",
            Outcome::Loss        => "loss",
            Outcome::Void        => "void",
            Outcome::Pending     => "pending",
            Outcome::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What settlement knows about one fixture. Fetched once per fixture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureOutcome {
    pub result:  Option<FinalResult>,
    /// Total corners of both sides, when the statistic was available.
    pub corners: Option<u32>,
}

impl FixtureOutcome {
    fn finished(&self) -> Option<&FinalResult> {
        self.result.as_ref().filter(|r| r.status.is_finished())
    }
}

// ── Pick normalisation ───────────────────────────────────────────────────────

static LIVE_SUFFIX: OnceLock<Option<Regex>> = OnceLock::new();
static OVER_LINE:   OnceLock<Option<Regex>> = OnceLock::new();
static TEAM_OVER:   OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// "Over 2.5 (live)" → "Over 2.5". Inner whitespace is collapsed.
pub fn pick_bucket(pick: &str) -> String {
    let collapsed = pick.split_whitespace().collect::<Vec<_>>().join(" ");
    match cached(&LIVE_SUFFIX, r"(?i)\s*\(live\)\s*$") {
        Some(re) => re.replace(&collapsed, "").trim().to_string(),
        None => collapsed,
    }
}

fn over_line(bucket: &str) -> Option<f64> {
    let caps = cached(&OVER_LINE, r"(?i)^over\s+(\d+(?:\.\d+)?)$")?.captures(bucket.trim())?;
    caps.get(1)?.as_str().parse().ok()
}

fn team_over_line(bucket: &str) -> Option<(Side, f64)> {
    let caps = cached(&TEAM_OVER, r"(?i)^(home|away)\s+over\s+(\d+(?:\.\d+)?)$")?.captures(bucket.trim())?;
    let side = parse_side(caps.get(1)?.as_str())?;
    Some((side, caps.get(2)?.as_str().parse().ok()?))
}

fn parse_side(s: &str) -> Option<Side> {
    match s.trim().to_ascii_lowercase().as_str() {
        "home" | "1" => Some(Side::Home),
        "away" | "2" => Some(Side::Away),
        _ => None,
    }
}

/// Side of a directional pick: the record's selection label first, then the
/// last word of the pick ("Next Goal Home", "DNB Away").
fn record_side(record: &SignalRecord, bucket: &str) -> Option<Side> {
    parse_side(&record.selection).or_else(|| bucket.split_whitespace().last().and_then(parse_side))
}

// ── Rules ────────────────────────────────────────────────────────────────────

pub fn settle_over(fx: &FixtureOutcome, bucket: &str) -> Outcome {
    let Some(line) = over_line(bucket) else {
        return Outcome::Unsupported;
    };
    match fx.finished() {
        None => Outcome::Pending,
        Some(r) if (r.home_goals + r.away_goals) as f64 > line => Outcome::Win,
        Some(_) => Outcome::Loss,
    }
}

pub fn settle_btts(fx: &FixtureOutcome) -> Outcome {
    match fx.finished() {
        None => Outcome::Pending,
        Some(r) if r.home_goals >= 1 && r.away_goals >= 1 => Outcome::Win,
        Some(_) => Outcome::Loss,
    }
}

pub fn settle_team_over(fx: &FixtureOutcome, bucket: &str) -> Outcome {
    let Some((side, line)) = team_over_line(bucket) else {
        return Outcome::Unsupported;
    };
    match fx.finished() {
        None => Outcome::Pending,
        Some(r) => {
            let goals = match side {
                Side::Home => r.home_goals,
                Side::Away => r.away_goals,
            };
            if goals as f64 > line { Outcome::Win } else { Outcome::Loss }
        }
    }
}

/// Pending while the corner statistic is missing, even for a finished match.
pub fn settle_corners(fx: &FixtureOutcome, bucket: &str) -> Outcome {
    let Some(line) = over_line(bucket) else {
        return Outcome::Unsupported;
    };
    match (fx.finished(), fx.corners) {
        (Some(_), Some(total)) if total as f64 > line => Outcome::Win,
        (Some(_), Some(_)) => Outcome::Loss,
        _ => Outcome::Pending,
    }
}

/// Win if the side wins, void on a draw.
pub fn settle_dnb(fx: &FixtureOutcome, side: Option<Side>) -> Outcome {
    let Some(side) = side else {
        return Outcome::Unsupported;
    };
    let Some(r) = fx.finished() else {
        return Outcome::Pending;
    };
    let (own, other) = match side {
        Side::Home => (r.home_goals, r.away_goals),
        Side::Away => (r.away_goals, r.home_goals),
    };
    match own.cmp(&other) {
        std::cmp::Ordering::Greater => Outcome::Win,
        std::cmp::Ordering::Equal   => Outcome::Void,
        std::cmp::Ordering::Less    => Outcome::Loss,
    }
}

/// Next goal after the signal, judged from the score at signal time and the
/// final score. Goals by both sides after the signal leave the order unknown.
pub fn settle_next_goal(fx: &FixtureOutcome, side: Option<Side>, at_signal: (u32, u32)) -> Outcome {
    let Some(side) = side else {
        return Outcome::Unsupported;
    };
    let Some(r) = fx.finished() else {
        return Outcome::Pending;
    };
    let (sh, sa) = at_signal;
    if r.home_goals < sh || r.away_goals < sa {
        return Outcome::Unsupported;
    }
    let (dh, da) = (r.home_goals - sh, r.away_goals - sa);
    match (dh, da) {
        (0, 0) => Outcome::Loss,
        (_, 0) => if side == Side::Home { Outcome::Win } else { Outcome::Loss },
        (0, _) => if side == Side::Away { Outcome::Win } else { Outcome::Loss },
        _ => Outcome::Unsupported,
    }
}

/// Applies the rule for the record's market. Unknown markets are
/// `Unsupported`.
pub fn settle(record: &SignalRecord, bucket: &str, fx: &FixtureOutcome) -> Outcome {
    let at_signal = (record.score_home, record.score_away);
    match record.market.trim().to_ascii_uppercase().as_str() {
        "OVER"      => settle_over(fx, bucket),
        "BTTS"      => settle_btts(fx),
        "TEAM_OVER" => settle_team_over(fx, bucket),
        "CORNERS"   => settle_corners(fx, bucket),
        "DNB"       => settle_dnb(fx, record_side(record, bucket)),
        "NEXT_GOAL" => settle_next_goal(fx, record_side(record, bucket), at_signal),
        "LATE_GOAL" => {
            let inner = strip_late_goal(bucket);
            if over_line(inner).is_some() {
                settle_over(fx, inner)
            } else {
                settle_next_goal(fx, record_side(record, inner), at_signal)
            }
        }
        _ => Outcome::Unsupported,
    }
}

fn strip_late_goal(bucket: &str) -> &str {
    let b = bucket.trim();
    match b.get(..10) {
        Some(prefix) if prefix.eq_ignore_ascii_case("late goal:") => b[10..].trim(),
        _ => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use prediction_engine::FixtureStatus;

    fn fx(status: &str, home: u32, away: u32) -> FixtureOutcome {
        FixtureOutcome {
            result: Some(FinalResult { status: FixtureStatus::new(status), home_goals: home, away_goals: away }),
            corners: None,
        }
    }

    fn record(market: &str, selection: &str, pick: &str, at: (u32, u32)) -> SignalRecord {
        SignalRecord {
            ts: Utc.with_ymd_and_hms(2024, 4, 6, 16, 0, 0).unwrap(),
            local_time: "2024-04-06 18:00:00".into(),
            date: NaiveDate::from_ymd_opt(2024, 4, 6).unwrap(),
            fixture_id: "5".into(),
            league: "Serie A".into(),
            country: "Italy".into(),
            home: "Roma".into(),
            away: "Lazio".into(),
            minute: Some(60),
            score_home: at.0,
            score_away: at.1,
            market: market.into(),
            selection: selection.into(),
            pick: pick.into(),
            confidence: 0.7,
            price: None,
            bucket: 12,
            details: String::new(),
        }
    }

    #[test]
    fn bucket_strips_live_suffix() {
        assert_eq!(pick_bucket("Over 2.5 (live)"), "Over 2.5");
        assert_eq!(pick_bucket("  BTTS   Yes (LIVE) "), "BTTS Yes");
        assert_eq!(pick_bucket("Over 1.5"), "Over 1.5");
    }

    #[test]
    fn over_on_a_two_one_finish() {
        let f = fx("FT", 2, 1);
        assert_eq!(settle_over(&f, "Over 1.5"), Outcome::Win);
        assert_eq!(settle_over(&f, "Over 2.5"), Outcome::Win);
        assert_eq!(settle_over(&f, "Over 3.5"), Outcome::Loss);
        assert_eq!(settle_over(&f, "Under 2.5"), Outcome::Unsupported);
    }

    #[test]
    fn unfinished_is_pending_whatever_the_pick() {
        let f = fx("2H", 2, 1);
        assert_eq!(settle_over(&f, "Over 1.5"), Outcome::Pending);
        assert_eq!(settle_btts(&f), Outcome::Pending);
        assert_eq!(settle_dnb(&f, Some(Side::Home)), Outcome::Pending);
        assert_eq!(settle_over(&FixtureOutcome::default(), "Over 0.5"), Outcome::Pending);
    }

    #[test]
    fn btts_and_team_over() {
        assert_eq!(settle_btts(&fx("AET", 1, 1)), Outcome::Win);
        assert_eq!(settle_btts(&fx("FT", 3, 0)), Outcome::Loss);
        assert_eq!(settle_team_over(&fx("FT", 3, 0), "Home Over 2.5"), Outcome::Win);
        assert_eq!(settle_team_over(&fx("FT", 3, 0), "away over 0.5"), Outcome::Loss);
    }

    #[test]
    fn corners_need_the_statistic() {
        let mut f = fx("FT", 0, 0);
        assert_eq!(settle_corners(&f, "Over 9.5"), Outcome::Pending);
        f.corners = Some(11);
        assert_eq!(settle_corners(&f, "Over 9.5"), Outcome::Win);
        assert_eq!(settle_corners(&f, "Over 11.5"), Outcome::Loss);
    }

    #[test]
    fn dnb_void_on_draw() {
        assert_eq!(settle_dnb(&fx("FT", 1, 1), Some(Side::Away)), Outcome::Void);
        assert_eq!(settle_dnb(&fx("FT", 1, 2), Some(Side::Away)), Outcome::Win);
        assert_eq!(settle_dnb(&fx("FT", 1, 2), Some(Side::Home)), Outcome::Loss);
    }

    #[test]
    fn next_goal_from_signal_time_score() {
        assert_eq!(settle_next_goal(&fx("FT", 2, 0), Some(Side::Home), (1, 0)), Outcome::Win);
        assert_eq!(settle_next_goal(&fx("FT", 1, 1), Some(Side::Home), (1, 0)), Outcome::Loss);
        assert_eq!(settle_next_goal(&fx("FT", 1, 0), Some(Side::Home), (1, 0)), Outcome::Loss);
        assert_eq!(settle_next_goal(&fx("FT", 2, 1), Some(Side::Home), (1, 0)), Outcome::Unsupported);
    }

    #[test]
    fn dispatch_by_market() {
        let f = fx("FT", 2, 1);
        let r = record("OVER", "over_1.5", "Over 1.5 (live)", (1, 0));
        assert_eq!(settle(&r, &pick_bucket(&r.pick), &f), Outcome::Win);

        let r = record("LATE_GOAL", "over_2.5", "Late Goal: Over 2.5 (live)", (1, 1));
        assert_eq!(settle(&r, &pick_bucket(&r.pick), &f), Outcome::Win);

        let r = record("LATE_GOAL", "away", "Late Goal: Next Goal Away (live)", (2, 0));
        assert_eq!(settle(&r, &pick_bucket(&r.pick), &f), Outcome::Win);

        let r = record("DNB", "home", "DNB Home (live)", (0, 1));
        assert_eq!(settle(&r, &pick_bucket(&r.pick), &f), Outcome::Win);

        let r = record("ASIAN_HANDICAP", "", "AH -1 (live)", (0, 0));
        assert_eq!(settle(&r, &pick_bucket(&r.pick), &f), Outcome::Unsupported);
    }
}
