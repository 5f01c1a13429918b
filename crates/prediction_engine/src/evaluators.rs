//! Market evaluators. Each one is a pure function of one fixture snapshot, its
//! statistics and its own tunables, returning at most one candidate.

use crate::config::{BttsConfig, DnbConfig, EngineConfig, LateGoalConfig, NextGoalConfig, OverConfig, RatioThresholds};
use crate::model::{format_line, CandidateSignal, Fixture, MarketKind, Selection, Side, StatisticBundle};
use std::cmp::Ordering;

/// Runs every enabled evaluator for one fixture and returns the candidates in
/// dispatch order: market priority first, then higher confidence.
///
/// `red_card` is the data source's send-off flag; a red card in the
/// statistics counts as well. Either one vetoes the fixture when
/// `red_card_veto` is on.
pub fn evaluate_all(
    fixture:  &Fixture,
    stats:    &StatisticBundle,
    red_card: bool,
    cfg:      &EngineConfig,
) -> Vec<CandidateSignal> {
    if cfg.red_card_veto && (red_card || stats.any_red_card() == Some(true)) {
        return Vec::new();
    }

    let mut out: Vec<CandidateSignal> = [
        evaluate_late_goal(fixture, stats, &cfg.late_goal),
        evaluate_next_goal(fixture, stats, &cfg.next_goal),
        evaluate_dnb(fixture, stats, &cfg.dnb),
        evaluate_over(fixture, stats, &cfg.over),
        evaluate_btts(fixture, stats, &cfg.btts),
    ]
    .into_iter()
    .flatten()
    .collect();

    sort_for_dispatch(&mut out);
    out
}

pub fn sort_for_dispatch(candidates: &mut [CandidateSignal]) {
    candidates.sort_by(|a, b| {
        a.market
            .priority()
            .cmp(&b.market.priority())
            .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal))
    });
}

fn candidate(
    fixture:    &Fixture,
    minute:     u32,
    market:     MarketKind,
    selection:  Selection,
    pick:       String,
    confidence: f64,
    details:    String,
) -> CandidateSignal {
    CandidateSignal {
        market,
        selection,
        pick,
        confidence,
        price: None,
        fixture_id: fixture.id.clone(),
        minute,
        score_home: fixture.home_goals,
        score_away: fixture.away_goals,
        details,
    }
}

// ── OVER ─────────────────────────────────────────────────────────────────────

/// Mean of the pressure ratios that are available. `None` if nothing is.
fn pressure(stats: &StatisticBundle, cfg: &OverConfig) -> Option<f64> {
    let parts: Vec<f64> = [
        stats.combined(|s| s.shot_volume()).map(|v| v as f64 / cfg.shots_ref),
        stats.combined(|s| s.shots_on_target).map(|v| v as f64 / cfg.sot_ref),
        stats.combined(|s| s.expected_goals).map(|v| v / cfg.xg_ref),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().sum::<f64>() / parts.len() as f64)
}

pub fn evaluate_over(fixture: &Fixture, stats: &StatisticBundle, cfg: &OverConfig) -> Option<CandidateSignal> {
    if !cfg.enabled {
        return None;
    }
    let minute = fixture.minute?;
    if minute < cfg.min_minute || minute >= cfg.max_minute {
        return None;
    }
    let total = fixture.total_goals();
    if total == 0 && minute >= cfg.nil_nil_cutoff {
        return None;
    }

    let p = pressure(stats, cfg)?;
    if p < cfg.min_pressure {
        return None;
    }

    // Always the next unresolved half line above the current total.
    let step = if cfg.first_half_step && minute < 45 { 1.5 } else { 0.5 };
    let line = total as f64 + step;
    if line > cfg.max_line {
        return None;
    }

    let remaining = 90u32.saturating_sub(minute) as f64 / 90.0;
    let raw = 0.30
        + 0.20 * p.min(2.5)
        + 0.25 * remaining
        + 0.03 * total.min(4) as f64
        - 0.12 * (line - total as f64 - 0.5);
    let confidence = cfg.band.clip(raw);
    if confidence < cfg.min_confidence {
        return None;
    }

    let details = format!(
        "pressure {:.2} · shots {} · SOT {} · xG {}",
        p,
        opt(stats.combined(|s| s.shot_volume())),
        opt(stats.combined(|s| s.shots_on_target)),
        stats.combined(|s| s.expected_goals).map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".into()),
    );
    Some(candidate(
        fixture,
        minute,
        MarketKind::Over,
        Selection::Over { line },
        format!("Over {} (live)", format_line(line)),
        confidence,
        details,
    ))
}

fn opt(v: Option<u32>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

// ── BTTS ─────────────────────────────────────────────────────────────────────

pub fn evaluate_btts(fixture: &Fixture, stats: &StatisticBundle, cfg: &BttsConfig) -> Option<CandidateSignal> {
    if !cfg.enabled {
        return None;
    }
    if fixture.home_goals > 0 && fixture.away_goals > 0 {
        return None;
    }
    let minute = fixture.minute?;
    if minute < cfg.min_minute || minute > cfg.max_minute {
        return None;
    }

    let sot_h = stats.home.shots_on_target?;
    let sot_a = stats.away.shots_on_target?;
    if sot_h < cfg.min_sot_each || sot_a < cfg.min_sot_each || sot_h + sot_a < cfg.min_sot_total {
        return None;
    }

    let mut raw = 0.30;
    raw += match minute {
        m if m < 35 => -0.10,
        m if m < 55 => 0.05,
        m if m < 75 => 0.10,
        _ => 0.05,
    };
    if sot_h >= 2 && sot_a >= 2 {
        raw += 0.20;
    } else if sot_h >= 3 || sot_a >= 3 {
        raw += 0.12;
    }
    let shots = stats.combined(|s| s.shot_volume()).unwrap_or(0);
    raw += shots.min(16) as f64 * 0.008;

    let confidence = cfg.band.clip(raw);
    if confidence < cfg.min_confidence {
        return None;
    }

    Some(candidate(
        fixture,
        minute,
        MarketKind::Btts,
        Selection::BttsYes,
        "BTTS Yes (live)".to_string(),
        confidence,
        format!("SOT {sot_h}-{sot_a} · shots {shots}"),
    ))
}

// ── Dominance (NEXT_GOAL / DNB) ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dominance {
    pub side:     Side,
    /// Weakest ratio relative to its threshold; ≥ 1.0 by construction.
    pub strength: f64,
    pub attacks:  f64,
    pub shots:    f64,
    pub xg:       Option<f64>,
}

impl Dominance {
    fn describe(&self, fixture: &Fixture) -> String {
        let mut s = format!(
            "{} attacks {:.1}x · shots {:.1}x",
            fixture.team(self.side),
            self.attacks,
            self.shots
        );
        if let Some(xg) = self.xg {
            s.push_str(&format!(" · xG {xg:.1}x"));
        }
        s
    }
}

/// The side that clears every configured ratio at once, if any. Ratios are
/// smoothed so a side with zero of a metric does not divide by zero.
pub fn dominant_side(stats: &StatisticBundle, t: &RatioThresholds) -> Option<Dominance> {
    let att_h = stats.home.dangerous_attacks? as f64;
    let att_a = stats.away.dangerous_attacks? as f64;
    if ((att_h + att_a) as u32) < t.min_attacks_total {
        return None;
    }
    let sh_h = stats.home.shot_volume()? as f64;
    let sh_a = stats.away.shot_volume()? as f64;

    let xg = match (stats.home.expected_goals, stats.away.expected_goals) {
        (Some(h), Some(a)) => Some((h + 0.1) / (a + 0.1)),
        _ if t.require_xg => return None,
        _ => None,
    };

    let attacks = (att_h + 1.0) / (att_a + 1.0);
    let shots = (sh_h + 1.0) / (sh_a + 1.0);

    for side in [Side::Home, Side::Away] {
        let orient = |r: f64| if side == Side::Home { r } else { 1.0 / r };
        let (a, s, x) = (orient(attacks), orient(shots), xg.map(orient));

        if a < t.attacks || s < t.shots || x.is_some_and(|x| x < t.xg) {
            continue;
        }
        let mut strength = (a / t.attacks).min(s / t.shots);
        if let Some(x) = x {
            strength = strength.min(x / t.xg);
        }
        return Some(Dominance { side, strength, attacks: a, shots: s, xg: x });
    }
    None
}

fn dominance_confidence(d: &Dominance) -> f64 {
    let mut raw = 0.50 + 0.15 * (d.strength - 1.0);
    if d.xg.is_some() {
        raw += 0.05;
    }
    raw
}

pub fn evaluate_next_goal(fixture: &Fixture, stats: &StatisticBundle, cfg: &NextGoalConfig) -> Option<CandidateSignal> {
    if !cfg.enabled {
        return None;
    }
    let minute = fixture.minute?;
    if minute < cfg.min_minute || minute > cfg.max_minute {
        return None;
    }
    let d = dominant_side(stats, &cfg.ratios)?;
    let confidence = cfg.band.clip(dominance_confidence(&d));
    if confidence < cfg.min_confidence {
        return None;
    }
    Some(candidate(
        fixture,
        minute,
        MarketKind::NextGoal,
        Selection::NextGoal { side: d.side },
        format!("Next Goal {} (live)", d.side.title()),
        confidence,
        d.describe(fixture),
    ))
}

pub fn evaluate_dnb(fixture: &Fixture, stats: &StatisticBundle, cfg: &DnbConfig) -> Option<CandidateSignal> {
    if !cfg.enabled {
        return None;
    }
    let minute = fixture.minute?;
    if minute < cfg.min_minute || minute > cfg.max_minute {
        return None;
    }
    let d = dominant_side(stats, &cfg.ratios)?;

    // Only the "losing but dominating" pattern.
    let own = fixture.goals(d.side);
    let other = fixture.goals(d.side.other());
    if own >= other || other - own > cfg.max_deficit {
        return None;
    }

    let deficit_penalty = 0.05 * (other - own - 1) as f64;
    let confidence = cfg.band.clip(dominance_confidence(&d) - deficit_penalty);
    if confidence < cfg.min_confidence {
        return None;
    }
    Some(candidate(
        fixture,
        minute,
        MarketKind::Dnb,
        Selection::DrawNoBet { side: d.side },
        format!("DNB {} (live)", d.side.title()),
        confidence,
        format!("trailing {} · {}", fixture.score_label(), d.describe(fixture)),
    ))
}

// ── LATE_GOAL ────────────────────────────────────────────────────────────────

pub fn evaluate_late_goal(fixture: &Fixture, stats: &StatisticBundle, cfg: &LateGoalConfig) -> Option<CandidateSignal> {
    if !cfg.enabled {
        return None;
    }
    let minute = fixture.minute?;
    if minute < cfg.min_minute || minute > cfg.max_minute {
        return None;
    }

    let xg = stats.combined(|s| s.expected_goals);
    match xg {
        Some(x) if x < cfg.min_xg_total => return None,
        None if cfg.require_xg => return None,
        _ => {}
    }
    let shots = stats.combined(|s| s.shot_volume())?;
    let attacks = stats.combined(|s| s.dangerous_attacks)?;
    if shots < cfg.min_shots_total || attacks < cfg.min_attacks_total {
        return None;
    }

    let excess = |v: f64, min: f64| if min > 0.0 { (v / min - 1.0).clamp(0.0, 1.0) } else { 0.0 };
    let mut raw = 0.55
        + 0.10 * xg.map(|x| excess(x, cfg.min_xg_total)).unwrap_or(0.0)
        + 0.05 * excess(shots as f64, cfg.min_shots_total as f64)
        + 0.05 * excess(attacks as f64, cfg.min_attacks_total as f64);

    let decisive = RatioThresholds {
        attacks:           cfg.decisive_ratio,
        shots:             cfg.decisive_ratio,
        xg:                cfg.decisive_ratio,
        require_xg:        false,
        min_attacks_total: 0,
    };
    let mut evidence = format!(
        "xG {} · shots {shots} · attacks {attacks}",
        xg.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".into())
    );

    let (selection, pick) = match dominant_side(stats, &decisive) {
        Some(d) => {
            raw += 0.05;
            evidence = format!("{evidence} · {}", d.describe(fixture));
            (
                Selection::NextGoal { side: d.side },
                format!("Late Goal: Next Goal {} (live)", d.side.title()),
            )
        }
        None => {
            let line = fixture.total_goals() as f64 + 0.5;
            (
                Selection::Over { line },
                format!("Late Goal: Over {} (live)", format_line(line)),
            )
        }
    };

    let confidence = cfg.band.clip(raw);
    if confidence < cfg.min_confidence {
        return None;
    }
    Some(candidate(fixture, minute, MarketKind::LateGoal, selection, pick, confidence, evidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FixtureStatus, TeamStats};

    fn fixture(minute: u32, home_goals: u32, away_goals: u32) -> Fixture {
        Fixture {
            id: "1001".into(),
            league: "Premier League".into(),
            country: "England".into(),
            home: "Arsenal".into(),
            away: "Chelsea".into(),
            home_team_id: Some(42),
            away_team_id: Some(49),
            minute: Some(minute),
            home_goals,
            away_goals,
            status: FixtureStatus::new("2H"),
        }
    }

    fn side(sot: u32, shots: u32, attacks: u32, xg: Option<f64>) -> TeamStats {
        TeamStats {
            shots_on_target: Some(sot),
            total_shots: Some(shots),
            dangerous_attacks: Some(attacks),
            expected_goals: xg,
            red_cards: Some(0),
            ..TeamStats::default()
        }
    }

    fn busy() -> StatisticBundle {
        StatisticBundle {
            home: side(5, 12, 45, Some(1.3)),
            away: side(4, 9, 38, Some(0.9)),
        }
    }

    #[test]
    fn over_line_is_above_current_total() {
        let cfg = OverConfig::default();
        for goals in 0..=4u32 {
            for minute in [22u32, 44, 46, 60, 84] {
                let f = fixture(minute, goals, 0);
                if let Some(c) = evaluate_over(&f, &busy(), &cfg) {
                    match c.selection {
                        Selection::Over { line } => assert!(line >= goals as f64 + 0.5),
                        other => panic!("unexpected selection {other:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn over_two_goals_second_half_is_two_and_a_half() {
        let c = evaluate_over(&fixture(60, 1, 1), &busy(), &OverConfig::default()).unwrap();
        assert_eq!(c.selection, Selection::Over { line: 2.5 });
        assert_eq!(c.pick, "Over 2.5 (live)");
        assert!(c.confidence >= 0.55 && c.confidence <= 0.95);
    }

    #[test]
    fn over_first_half_steps_an_extra_goal() {
        let c = evaluate_over(&fixture(30, 1, 0), &busy(), &OverConfig::default()).unwrap();
        assert_eq!(c.selection, Selection::Over { line: 2.5 });
    }

    #[test]
    fn over_respects_window_and_late_nil_nil() {
        let cfg = OverConfig::default();
        assert!(evaluate_over(&fixture(15, 0, 0), &busy(), &cfg).is_none());
        assert!(evaluate_over(&fixture(85, 1, 0), &busy(), &cfg).is_none());
        assert!(evaluate_over(&fixture(78, 0, 0), &busy(), &cfg).is_none());
        assert!(evaluate_over(&fixture(78, 1, 0), &busy(), &cfg).is_some());
    }

    #[test]
    fn over_without_any_pressure_metric_is_silent() {
        let f = fixture(60, 1, 0);
        assert!(evaluate_over(&f, &StatisticBundle::default(), &OverConfig::default()).is_none());
    }

    #[test]
    fn over_confidence_grows_with_pressure() {
        let cfg = OverConfig { min_confidence: 0.0, ..OverConfig::default() };
        let f = fixture(60, 1, 0);
        let low = evaluate_over(&f, &busy(), &cfg).unwrap();
        let mut hot = busy();
        hot.home.total_shots = Some(20);
        hot.home.shots_on_target = Some(9);
        let high = evaluate_over(&f, &hot, &cfg).unwrap();
        assert!(high.confidence > low.confidence);
    }

    #[test]
    fn btts_never_fires_once_both_scored() {
        let cfg = BttsConfig::default();
        for minute in 30..=80 {
            assert!(evaluate_btts(&fixture(minute, 1, 1), &busy(), &cfg).is_none());
            assert!(evaluate_btts(&fixture(minute, 2, 3), &busy(), &cfg).is_none());
        }
    }

    #[test]
    fn btts_fires_mid_match_with_shots_on_both_sides() {
        let c = evaluate_btts(&fixture(60, 1, 0), &busy(), &BttsConfig::default()).unwrap();
        assert_eq!(c.market, MarketKind::Btts);
        assert_eq!(c.pick, "BTTS Yes (live)");
        // 0.30 + 0.10 + 0.20 + 16 * 0.008
        assert!((c.confidence - 0.728).abs() < 1e-9);
    }

    #[test]
    fn btts_needs_both_sides_on_target() {
        let mut s = busy();
        s.away.shots_on_target = Some(1);
        assert!(evaluate_btts(&fixture(60, 0, 0), &s, &BttsConfig::default()).is_none());
        s.away.shots_on_target = None;
        assert!(evaluate_btts(&fixture(60, 0, 0), &s, &BttsConfig::default()).is_none());
    }

    fn lopsided(home_on_top: bool) -> StatisticBundle {
        let strong = side(7, 16, 60, Some(1.9));
        let weak = side(1, 4, 18, Some(0.3));
        if home_on_top {
            StatisticBundle { home: strong, away: weak }
        } else {
            StatisticBundle { home: weak, away: strong }
        }
    }

    #[test]
    fn dominance_is_symmetric() {
        let t = RatioThresholds::default();
        assert_eq!(dominant_side(&lopsided(true), &t).map(|d| d.side), Some(Side::Home));
        assert_eq!(dominant_side(&lopsided(false), &t).map(|d| d.side), Some(Side::Away));
        assert!(dominant_side(&busy(), &t).is_none());
    }

    #[test]
    fn dominance_requires_every_ratio_in_the_same_direction() {
        let mut s = lopsided(true);
        s.away.expected_goals = Some(2.5);
        assert!(dominant_side(&s, &RatioThresholds::default()).is_none());
    }

    #[test]
    fn missing_xg_only_blocks_when_required() {
        let mut s = lopsided(true);
        s.home.expected_goals = None;
        let mut t = RatioThresholds::default();
        assert!(dominant_side(&s, &t).is_some());
        t.require_xg = true;
        assert!(dominant_side(&s, &t).is_none());
    }

    #[test]
    fn next_goal_picks_the_dominant_side() {
        let c = evaluate_next_goal(&fixture(55, 0, 0), &lopsided(false), &NextGoalConfig::default()).unwrap();
        assert_eq!(c.selection, Selection::NextGoal { side: Side::Away });
        assert_eq!(c.pick, "Next Goal Away (live)");
    }

    #[test]
    fn dnb_only_for_the_trailing_dominant_side() {
        let cfg = DnbConfig::default();
        let s = lopsided(true);
        let c = evaluate_dnb(&fixture(60, 0, 1), &s, &cfg).unwrap();
        assert_eq!(c.selection, Selection::DrawNoBet { side: Side::Home });
        assert!(evaluate_dnb(&fixture(60, 1, 1), &s, &cfg).is_none());
        assert!(evaluate_dnb(&fixture(60, 1, 0), &s, &cfg).is_none());
        assert!(evaluate_dnb(&fixture(60, 0, 2), &s, &cfg).is_none());
    }

    #[test]
    fn late_goal_generic_and_directional() {
        let cfg = LateGoalConfig::default();
        let even = StatisticBundle {
            home: side(5, 11, 52, Some(1.1)),
            away: side(4, 9, 47, Some(0.9)),
        };
        let c = evaluate_late_goal(&fixture(80, 1, 1), &even, &cfg).unwrap();
        assert_eq!(c.market, MarketKind::LateGoal);
        assert_eq!(c.selection, Selection::Over { line: 2.5 });
        assert_eq!(c.pick, "Late Goal: Over 2.5 (live)");

        let tilted = StatisticBundle {
            home: side(8, 18, 80, Some(2.1)),
            away: side(1, 3, 20, Some(0.2)),
        };
        let c = evaluate_late_goal(&fixture(80, 0, 0), &tilted, &cfg).unwrap();
        assert_eq!(c.selection, Selection::NextGoal { side: Side::Home });

        assert!(evaluate_late_goal(&fixture(70, 1, 1), &even, &cfg).is_none());
        let mut no_xg = even.clone();
        no_xg.home.expected_goals = None;
        assert!(evaluate_late_goal(&fixture(80, 1, 1), &no_xg, &cfg).is_none());
    }

    #[test]
    fn red_card_vetoes_everything() {
        let cfg = EngineConfig { red_card_veto: true, ..EngineConfig::default() };
        let f = fixture(60, 0, 1);
        assert!(!evaluate_all(&f, &lopsided(true), false, &cfg).is_empty());
        assert!(evaluate_all(&f, &lopsided(true), true, &cfg).is_empty());

        let mut carded = lopsided(true);
        carded.away.red_cards = Some(1);
        assert!(evaluate_all(&f, &carded, false, &cfg).is_empty());

        let off = EngineConfig { red_card_veto: false, ..EngineConfig::default() };
        assert!(!evaluate_all(&f, &carded, true, &off).is_empty());
    }

    #[test]
    fn candidates_come_out_in_priority_order() {
        let cfg = EngineConfig::default();
        let out = evaluate_all(&fixture(60, 0, 1), &lopsided(true), false, &cfg);
        let kinds: Vec<MarketKind> = out.iter().map(|c| c.market).collect();
        let mut sorted = kinds.clone();
        sorted.sort_by_key(|k| k.priority());
        assert_eq!(kinds, sorted);
        assert_eq!(kinds.first(), Some(&MarketKind::NextGoal));
    }

    #[test]
    fn unknown_minute_proposes_nothing() {
        let mut f = fixture(60, 0, 1);
        f.minute = None;
        assert!(evaluate_all(&f, &lopsided(true), false, &EngineConfig::default()).is_empty());
    }
}
