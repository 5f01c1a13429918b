//! Statistic extractor. Providers name the same metric differently
//! ("Shots on Goal" vs "Shots on Target") and encode values as numbers,
//! numeric strings or percentages; this module maps them onto `TeamStats`.

use crate::model::{RawStat, RawStatistics, Side, StatisticBundle, TeamStats};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    ShotsOnTarget,
    ShotsOffTarget,
    TotalShots,
    DangerousAttacks,
    ExpectedGoals,
    Possession,
    Corners,
    RedCards,
}

/// Canonical metric → accepted provider field names. Compared
/// case-insensitively after trimming; earlier names win.
const ALIASES: &[(Metric, &[&str])] = &[
    (Metric::ShotsOnTarget,    &["Shots on Goal", "Shots on Target", "On Target", "shots_on_target"]),
    (Metric::ShotsOffTarget,   &["Shots off Goal", "Shots off Target", "Off Target", "shots_off_target"]),
    (Metric::TotalShots,       &["Total Shots", "Shots Total", "Shots", "total_shots"]),
    (Metric::DangerousAttacks, &["Dangerous Attacks", "Dangerous attacks", "dangerous_attacks"]),
    (Metric::ExpectedGoals,    &["expected_goals", "Expected Goals", "xG", "Expected goals (xG)"]),
    (Metric::Possession,       &["Ball Possession", "Possession", "Possession %", "ball_possession"]),
    (Metric::Corners,          &["Corner Kicks", "Corners", "Total Corners", "corner_kicks"]),
    (Metric::RedCards,         &["Red Cards", "red_cards"]),
];

impl Metric {
    pub fn aliases(self) -> &'static [&'static str] {
        ALIASES
            .iter()
            .find(|(m, _)| *m == self)
            .map(|(_, names)| *names)
            .unwrap_or(&[])
    }
}

/// Reads one metric for one side. Returns `None` when no alias is reported
/// (or none carries a readable value); never returns a negative number.
/// A reported `null` means "none recorded" and reads as zero.
pub fn extract(raw: &RawStatistics, side: Side, metric: Metric) -> Option<f64> {
    extract_from(raw.side(side), metric)
}

fn extract_from(entries: &[RawStat], metric: Metric) -> Option<f64> {
    metric.aliases().iter().find_map(|alias| {
        entries
            .iter()
            .filter(|e| e.name.trim().eq_ignore_ascii_case(alias))
            .find_map(|e| numeric(&e.value))
    })
}

fn numeric(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Null      => 0.0,
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim().trim_end_matches('%').trim();
            if s.is_empty() {
                return None;
            }
            // "made/attempted" reads as the made count
            let s = match s.split_once('/') {
                Some((made, _)) => made.trim(),
                None => s,
            };
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    if !v.is_finite() {
        return None;
    }
    Some(v.max(0.0))
}

fn count(entries: &[RawStat], metric: Metric) -> Option<u32> {
    extract_from(entries, metric).map(|v| v.round() as u32)
}

pub fn team_stats(entries: &[RawStat]) -> TeamStats {
    TeamStats {
        shots_on_target:   count(entries, Metric::ShotsOnTarget),
        shots_off_target:  count(entries, Metric::ShotsOffTarget),
        total_shots:       count(entries, Metric::TotalShots),
        dangerous_attacks: count(entries, Metric::DangerousAttacks),
        expected_goals:    extract_from(entries, Metric::ExpectedGoals),
        possession:        extract_from(entries, Metric::Possession),
        corners:           count(entries, Metric::Corners),
        red_cards:         count(entries, Metric::RedCards),
    }
}

/// Builds the canonical bundle for both sides. Done once per fixture per poll.
pub fn bundle(raw: &RawStatistics) -> StatisticBundle {
    StatisticBundle {
        home: team_stats(&raw.home),
        away: team_stats(&raw.away),
    }
}
