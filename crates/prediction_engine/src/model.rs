//! Live match model: fixture snapshots, per-side statistics, candidate signals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Side::Home => "Home",
            Side::Away => "Away",
        }
    }
}

/// Provider short status code ("1H", "HT", "2H", "FT", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureStatus(pub String);

impl FixtureStatus {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_ascii_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Match is being played (or in a break) and live statistics still move.
    pub fn is_in_play(&self) -> bool {
        matches!(self.0.as_str(), "1H" | "HT" | "2H" | "ET" | "BT" | "LIVE")
    }

    /// Result is final. Abandoned/awarded/walkover count as final: the
    /// provider will not report further goals for them.
    pub fn is_finished(&self) -> bool {
        matches!(self.0.as_str(), "FT" | "AET" | "PEN" | "ABD" | "AWD" | "WO")
    }
}

/// One poll's view of a live match. A new poll yields a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id:           String,
    pub league:       String,
    pub country:      String,
    pub home:         String,
    pub away:         String,
    pub home_team_id: Option<u64>,
    pub away_team_id: Option<u64>,
    pub minute:       Option<u32>,
    pub home_goals:   u32,
    pub away_goals:   u32,
    pub status:       FixtureStatus,
}

impl Fixture {
    pub fn total_goals(&self) -> u32 {
        self.home_goals + self.away_goals
    }

    pub fn goals(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home_goals,
            Side::Away => self.away_goals,
        }
    }

    pub fn team(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    pub fn score_label(&self) -> String {
        format!("{}:{}", self.home_goals, self.away_goals)
    }
}

/// Final state of a fixture as reported for settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub status:     FixtureStatus,
    pub home_goals: u32,
    pub away_goals: u32,
}

// ── Raw provider statistics ──────────────────────────────────────────────────

/// One provider statistic entry, name and value exactly as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStat {
    pub name:  String,
    pub value: serde_json::Value,
}

impl RawStat {
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self { name: name.into(), value }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatistics {
    pub home: Vec<RawStat>,
    pub away: Vec<RawStat>,
}

impl RawStatistics {
    pub fn side(&self, side: Side) -> &[RawStat] {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }
}

// ── Canonical statistics ─────────────────────────────────────────────────────

/// Canonical metrics for one side. `None` means the provider did not report
/// the metric, which is different from a reported zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub shots_on_target:   Option<u32>,
    pub shots_off_target:  Option<u32>,
    pub total_shots:       Option<u32>,
    pub dangerous_attacks: Option<u32>,
    pub expected_goals:    Option<f64>,
    pub possession:        Option<f64>,
    pub corners:           Option<u32>,
    pub red_cards:         Option<u32>,
}

impl TeamStats {
    /// Total shots if reported, otherwise on + off target from whatever is present.
    pub fn shot_volume(&self) -> Option<u32> {
        if let Some(total) = self.total_shots {
            return Some(total);
        }
        match (self.shots_on_target, self.shots_off_target) {
            (None, None) => None,
            (on, off) => Some(on.unwrap_or(0) + off.unwrap_or(0)),
        }
    }
}

/// Statistics of both sides for one fixture and one poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticBundle {
    pub home: TeamStats,
    pub away: TeamStats,
}

impl StatisticBundle {
    pub fn side(&self, side: Side) -> &TeamStats {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    /// Sum over both sides, absent if either side is absent.
    pub fn combined<T, F>(&self, f: F) -> Option<T>
    where
        T: std::ops::Add<Output = T>,
        F: Fn(&TeamStats) -> Option<T>,
    {
        Some(f(&self.home)? + f(&self.away)?)
    }

    pub fn any_red_card(&self) -> Option<bool> {
        match (self.home.red_cards, self.away.red_cards) {
            (None, None) => None,
            (h, a) => Some(h.unwrap_or(0) + a.unwrap_or(0) > 0),
        }
    }
}

// ── Signals ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketKind {
    Over,
    Btts,
    NextGoal,
    Dnb,
    LateGoal,
}

impl MarketKind {
    pub const ALL: [MarketKind; 5] = [
        MarketKind::LateGoal,
        MarketKind::NextGoal,
        MarketKind::Dnb,
        MarketKind::Over,
        MarketKind::Btts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MarketKind::Over     => "OVER",
            MarketKind::Btts     => "BTTS",
            MarketKind::NextGoal => "NEXT_GOAL",
            MarketKind::Dnb      => "DNB",
            MarketKind::LateGoal => "LATE_GOAL",
        }
    }

    /// Dispatch order within a cycle, lower first.
    pub fn priority(self) -> u8 {
        match self {
            MarketKind::LateGoal => 0,
            MarketKind::NextGoal => 1,
            MarketKind::Dnb      => 2,
            MarketKind::Over     => 3,
            MarketKind::Btts     => 4,
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown market kind: {0}")]
pub struct UnknownMarket(pub String);

impl FromStr for MarketKind {
    type Err = UnknownMarket;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OVER"                   => Ok(MarketKind::Over),
            "BTTS"                   => Ok(MarketKind::Btts),
            "NEXT_GOAL" | "NEXTGOAL" => Ok(MarketKind::NextGoal),
            "DNB"                    => Ok(MarketKind::Dnb),
            "LATE_GOAL" | "LATEGOAL" => Ok(MarketKind::LateGoal),
            other => Err(UnknownMarket(other.to_string())),
        }
    }
}

/// What is being backed, independent of which evaluator proposed it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    Over { line: f64 },
    BttsYes,
    NextGoal { side: Side },
    DrawNoBet { side: Side },
}

impl Selection {
    /// Side-or-kind label used in dedup keys and event records.
    pub fn label(&self) -> String {
        match self {
            Selection::Over { line }        => format!("over_{}", format_line(*line)),
            Selection::BttsYes              => "yes".to_string(),
            Selection::NextGoal { side }    => side.label().to_string(),
            Selection::DrawNoBet { side }   => side.label().to_string(),
        }
    }
}

/// "2.5" for half lines, "2" for whole ones.
pub fn format_line(line: f64) -> String {
    if line.fract() == 0.0 {
        format!("{}", line as i64)
    } else {
        format!("{line}")
    }
}

/// A proposed, not yet dispatched alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub market:     MarketKind,
    pub selection:  Selection,
    pub pick:       String,
    pub confidence: f64,
    pub price:      Option<f64>,
    pub fixture_id: String,
    pub minute:     u32,
    pub score_home: u32,
    pub score_away: u32,
    /// Short evidence summary for the operator message.
    pub details:    String,
}

impl CandidateSignal {
    pub fn with_price(self, price: f64) -> Self {
        Self { price: Some(price), ..self }
    }

    /// price × confidence, when priced.
    pub fn expected_value(&self) -> Option<f64> {
        self.price.map(|p| p * self.confidence)
    }
}
