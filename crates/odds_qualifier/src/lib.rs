/// LiveSignals — Odds Qualifier
/// Attaches a live price to a candidate and drops it when the price, or
/// price × confidence, is under the configured floor.
/// The qualifier is pure: the caller fetches the odds table.

use fixture_monitor::OddsTable;
use prediction_engine::{CandidateSignal, MarketKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinPrices {
    pub over:      f64,
    pub btts:      f64,
    pub next_goal: f64,
    pub dnb:       f64,
    pub late_goal: f64,
}

impl Default for MinPrices {
    fn default() -> Self {
        Self {
            over:      1.40,
            btts:      1.65,
            next_goal: 1.50,
            dnb:       1.50,
            late_goal: 1.50,
        }
    }
}

impl MinPrices {
    pub fn for_market(&self, market: MarketKind) -> f64 {
        match market {
            MarketKind::Over     => self.over,
            MarketKind::Btts     => self.btts,
            MarketKind::NextGoal => self.next_goal,
            MarketKind::Dnb      => self.dnb,
            MarketKind::LateGoal => self.late_goal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsConfig {
    pub enabled:             bool,
    /// No quote means reject instead of pass-through.
    pub require_odds:        bool,
    pub preferred_bookmaker: Option<String>,
    pub min_price:           MinPrices,
    /// Minimum price × confidence.
    pub value_floor:         f64,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            enabled:             true,
            require_odds:        false,
            preferred_bookmaker: None,
            min_price:           MinPrices::default(),
            value_floor:         1.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NoQuote,
    BelowMinPrice { price: f64, min: f64 },
    BelowValueFloor { value: f64, floor: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoQuote => f.write_str("no quote and odds are required"),
            Rejection::BelowMinPrice { price, min } => write!(f, "price {price:.2} < min {min:.2}"),
            Rejection::BelowValueFloor { value, floor } => write!(f, "value {value:.3} < floor {floor:.2}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Qualification {
    Qualified(CandidateSignal),
    Rejected(Rejection),
}

pub struct OddsQualifier {
    cfg: OddsConfig,
}

impl OddsQualifier {
    pub fn new(cfg: OddsConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &OddsConfig {
        &self.cfg
    }

    /// Whether the caller should fetch an odds table at all.
    pub fn wants_quotes(&self) -> bool {
        self.cfg.enabled
    }

    pub fn qualify(&self, candidate: CandidateSignal, table: Option<&OddsTable>) -> Qualification {
        if !self.cfg.enabled {
            return Qualification::Qualified(candidate);
        }

        let price = table.and_then(|t| t.price_for(&candidate.selection, self.cfg.preferred_bookmaker.as_deref()));
        let Some(price) = price else {
            if self.cfg.require_odds {
                debug!(fixture = %candidate.fixture_id, pick = %candidate.pick, "rejected: no quote");
                return Qualification::Rejected(Rejection::NoQuote);
            }
            return Qualification::Qualified(candidate);
        };

        let min = self.cfg.min_price.for_market(candidate.market);
        if price < min {
            debug!(fixture = %candidate.fixture_id, pick = %candidate.pick, price, min, "rejected: price under floor");
            return Qualification::Rejected(Rejection::BelowMinPrice { price, min });
        }

        let value = price * candidate.confidence;
        if value < self.cfg.value_floor {
            debug!(fixture = %candidate.fixture_id, pick = %candidate.pick, value, "rejected: value under floor");
            return Qualification::Rejected(Rejection::BelowValueFloor { value, floor: self.cfg.value_floor });
        }

        Qualification::Qualified(candidate.with_price(price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prediction_engine::Selection;
    use serde_json::json;

    fn over(confidence: f64) -> CandidateSignal {
        CandidateSignal {
            market: MarketKind::Over,
            selection: Selection::Over { line: 2.5 },
            pick: "Over 2.5 (live)".into(),
            confidence,
            price: None,
            fixture_id: "77".into(),
            minute: 58,
            score_home: 1,
            score_away: 1,
            details: String::new(),
        }
    }

    fn table(odd: &str) -> OddsTable {
        OddsTable::from_block(&json!({
            "bookmakers": [{"name": "Bet365", "bets": [
                {"name": "Goals Over/Under", "values": [{"value": "Over 2.5", "odd": odd}]}
            ]}]
        }))
        .unwrap()
    }

    #[test]
    fn attaches_price_when_it_clears_both_floors() {
        let q = OddsQualifier::new(OddsConfig::default());
        match q.qualify(over(0.70), Some(&table("1.80"))) {
            Qualification::Qualified(c) => assert_eq!(c.price, Some(1.80)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_low_price_and_low_value() {
        let q = OddsQualifier::new(OddsConfig::default());
        assert!(matches!(
            q.qualify(over(0.90), Some(&table("1.30"))),
            Qualification::Rejected(Rejection::BelowMinPrice { .. })
        ));
        // 1.50 × 0.60 = 0.90 < 1.05
        assert!(matches!(
            q.qualify(over(0.60), Some(&table("1.50"))),
            Qualification::Rejected(Rejection::BelowValueFloor { .. })
        ));
    }

    #[test]
    fn missing_quote_passes_unless_required() {
        let q = OddsQualifier::new(OddsConfig::default());
        assert_eq!(q.qualify(over(0.7), None), Qualification::Qualified(over(0.7)));

        let strict = OddsQualifier::new(OddsConfig { require_odds: true, ..OddsConfig::default() });
        assert_eq!(strict.qualify(over(0.7), None), Qualification::Rejected(Rejection::NoQuote));
    }

    #[test]
    fn disabled_passes_through_unpriced() {
        let q = OddsQualifier::new(OddsConfig { enabled: false, ..OddsConfig::default() });
        assert!(!q.wants_quotes());
        assert_eq!(q.qualify(over(0.7), Some(&table("1.10"))), Qualification::Qualified(over(0.7)));
    }
}
