//! Evaluator tunables. Every threshold is configuration; the defaults are one
//! reasonable set, not the only correct one.

use serde::{Deserialize, Serialize};

/// Confidence is clipped into `[low, high]` after it is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    pub low:  f64,
    pub high: f64,
}

impl ConfidenceBand {
    pub fn clip(&self, v: f64) -> f64 {
        v.clamp(self.low, self.high)
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.low) && (0.0..=1.0).contains(&self.high) && self.low <= self.high
    }
}

impl Default for ConfidenceBand {
    fn default() -> Self {
        Self { low: 0.05, high: 0.95 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverConfig {
    pub enabled:         bool,
    pub min_minute:      u32,
    /// Hard late-game cutoff, exclusive.
    pub max_minute:      u32,
    /// 0–0 at or after this minute proposes nothing.
    pub nil_nil_cutoff:  u32,
    /// Normalisers for the pressure score: one unit of pressure per reference.
    pub shots_ref:       f64,
    pub sot_ref:         f64,
    pub xg_ref:          f64,
    pub min_pressure:    f64,
    /// First half proposes total + 1.5 instead of total + 0.5.
    pub first_half_step: bool,
    pub max_line:        f64,
    pub min_confidence:  f64,
    pub band:            ConfidenceBand,
}

impl Default for OverConfig {
    fn default() -> Self {
        Self {
            enabled:         true,
            min_minute:      20,
            max_minute:      85,
            nil_nil_cutoff:  75,
            shots_ref:       10.0,
            sot_ref:         4.0,
            xg_ref:          1.2,
            min_pressure:    1.0,
            first_half_step: true,
            max_line:        5.5,
            min_confidence:  0.55,
            band:            ConfidenceBand::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BttsConfig {
    pub enabled:        bool,
    pub min_minute:     u32,
    pub max_minute:     u32,
    /// Each side must reach this many shots on target.
    pub min_sot_each:   u32,
    pub min_sot_total:  u32,
    pub min_confidence: f64,
    pub band:           ConfidenceBand,
}

impl Default for BttsConfig {
    fn default() -> Self {
        Self {
            enabled:        true,
            min_minute:     30,
            max_minute:     80,
            min_sot_each:   2,
            min_sot_total:  5,
            min_confidence: 0.55,
            band:           ConfidenceBand::default(),
        }
    }
}

/// Dominance ratios one side must clear over the other. The weaker side is
/// tested with the same thresholds on the reciprocal ratios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioThresholds {
    pub attacks:           f64,
    pub shots:             f64,
    pub xg:                f64,
    /// Reject when xG is not reported, instead of ignoring the xG ratio.
    pub require_xg:        bool,
    /// Combined dangerous attacks below this carry too little evidence.
    pub min_attacks_total: u32,
}

impl Default for RatioThresholds {
    fn default() -> Self {
        Self {
            attacks:           1.8,
            shots:             1.8,
            xg:                1.6,
            require_xg:        false,
            min_attacks_total: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextGoalConfig {
    pub enabled:        bool,
    pub min_minute:     u32,
    pub max_minute:     u32,
    pub ratios:         RatioThresholds,
    pub min_confidence: f64,
    pub band:           ConfidenceBand,
}

impl Default for NextGoalConfig {
    fn default() -> Self {
        Self {
            enabled:        true,
            min_minute:     20,
            max_minute:     80,
            ratios:         RatioThresholds::default(),
            min_confidence: 0.55,
            band:           ConfidenceBand::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnbConfig {
    pub enabled:        bool,
    pub min_minute:     u32,
    pub max_minute:     u32,
    /// Largest goal deficit of the dominating side still proposed.
    pub max_deficit:    u32,
    pub ratios:         RatioThresholds,
    pub min_confidence: f64,
    pub band:           ConfidenceBand,
}

impl Default for DnbConfig {
    fn default() -> Self {
        Self {
            enabled:        true,
            min_minute:     25,
            max_minute:     80,
            max_deficit:    1,
            ratios:         RatioThresholds::default(),
            min_confidence: 0.55,
            band:           ConfidenceBand::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LateGoalConfig {
    pub enabled:         bool,
    pub min_minute:      u32,
    pub max_minute:      u32,
    pub min_xg_total:    f64,
    pub require_xg:      bool,
    pub min_shots_total: u32,
    pub min_attacks_total: u32,
    /// Attack and shot ratio needed for a directional next-goal sub-pick.
    pub decisive_ratio:  f64,
    pub min_confidence:  f64,
    pub band:            ConfidenceBand,
}

impl Default for LateGoalConfig {
    fn default() -> Self {
        Self {
            enabled:           true,
            min_minute:        75,
            max_minute:        88,
            min_xg_total:      1.6,
            require_xg:        true,
            min_shots_total:   16,
            min_attacks_total: 70,
            decisive_ratio:    2.0,
            min_confidence:    0.55,
            band:              ConfidenceBand::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub over:          OverConfig,
    pub btts:          BttsConfig,
    pub next_goal:     NextGoalConfig,
    pub dnb:           DnbConfig,
    pub late_goal:     LateGoalConfig,
    /// A sent-off player on either side vetoes every market for the fixture.
    pub red_card_veto: bool,
}

impl EngineConfig {
    /// First violated constraint, as (field, reason).
    pub fn validate(&self) -> Result<(), (&'static str, String)> {
        let windows = [
            ("OVER", self.over.min_minute, self.over.max_minute),
            ("BTTS", self.btts.min_minute, self.btts.max_minute),
            ("NEXT_GOAL", self.next_goal.min_minute, self.next_goal.max_minute),
            ("DNB", self.dnb.min_minute, self.dnb.max_minute),
            ("LATE_GOAL", self.late_goal.min_minute, self.late_goal.max_minute),
        ];
        for (market, lo, hi) in windows {
            if lo > hi {
                return Err((market, format!("min minute {lo} > max minute {hi}")));
            }
        }
        let bands = [
            ("OVER", &self.over.band),
            ("BTTS", &self.btts.band),
            ("NEXT_GOAL", &self.next_goal.band),
            ("DNB", &self.dnb.band),
            ("LATE_GOAL", &self.late_goal.band),
        ];
        for (market, band) in bands {
            if !band.is_valid() {
                return Err((market, format!("confidence band [{}, {}] outside [0,1] or inverted", band.low, band.high)));
            }
        }
        for (name, v) in [
            ("OVER_SHOTS_REF", self.over.shots_ref),
            ("OVER_SOT_REF", self.over.sot_ref),
            ("OVER_XG_REF", self.over.xg_ref),
            ("NEXT_GOAL_ATTACK_RATIO", self.next_goal.ratios.attacks),
            ("NEXT_GOAL_SHOTS_RATIO", self.next_goal.ratios.shots),
            ("NEXT_GOAL_XG_RATIO", self.next_goal.ratios.xg),
            ("DNB_ATTACK_RATIO", self.dnb.ratios.attacks),
            ("DNB_SHOTS_RATIO", self.dnb.ratios.shots),
            ("DNB_XG_RATIO", self.dnb.ratios.xg),
            ("LATE_GOAL_DECISIVE_RATIO", self.late_goal.decisive_ratio),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err((name, format!("must be a positive number, got {v}")));
            }
        }
        Ok(())
    }
}
