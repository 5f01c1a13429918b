//! Price table for one fixture and selection lookup across bookmakers.
//! Two provider shapes are understood: the pre-match
//! `bookmakers[].bets[].values[]` block and the live `odds[].values[]` block.

use prediction_engine::{Selection, Side};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const OVER_UNDER_NAMES: &[&str] = &["goals over/under", "match goals", "total goals", "over/under", "over/under line"];
const BTTS_NAMES:       &[&str] = &["both teams to score", "both teams score", "btts", "gg/ng"];
const NEXT_GOAL_NAMES:  &[&str] = &["next goal", "team to score next", "which team will score next"];
const DNB_NAMES:        &[&str] = &["draw no bet", "home/away", "dnb"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub value:     String,
    pub handicap:  Option<String>,
    pub odd:       f64,
    #[serde(default)]
    pub suspended: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsMarket {
    pub name:   String,
    pub quotes: Vec<Quote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmaker {
    pub name:    String,
    pub markets: Vec<OddsMarket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OddsTable {
    pub books: Vec<Bookmaker>,
}

impl OddsTable {
    /// Parses one provider response element. `None` when it carries no quotes.
    pub fn from_block(block: &Value) -> Option<OddsTable> {
        let mut books = Vec::new();

        if let Some(bms) = block.get("bookmakers").and_then(Value::as_array) {
            for bm in bms {
                let name = str_field(bm, "name").unwrap_or_else(|| "unknown".into());
                let markets = parse_markets(bm.get("bets"));
                if !markets.is_empty() {
                    books.push(Bookmaker { name, markets });
                }
            }
        }

        // Live shape: one anonymous book.
        let live = parse_markets(block.get("odds"));
        if !live.is_empty() {
            books.push(Bookmaker { name: "live".into(), markets: live });
        }

        if books.is_empty() {
            None
        } else {
            Some(OddsTable { books })
        }
    }

    pub fn is_empty(&self) -> bool {
        self.books.iter().all(|b| b.markets.is_empty())
    }

    /// Price of `selection`, from `preferred` if it quotes it, otherwise from
    /// the first book that does. Suspended quotes are ignored.
    pub fn price_for(&self, selection: &Selection, preferred: Option<&str>) -> Option<f64> {
        let preferred = preferred.map(|p| p.trim().to_lowercase()).filter(|p| !p.is_empty());

        let mut order: Vec<&Bookmaker> = Vec::with_capacity(self.books.len());
        if let Some(p) = &preferred {
            order.extend(self.books.iter().filter(|b| b.name.trim().to_lowercase() == *p));
        }
        order.extend(
            self.books
                .iter()
                .filter(|b| preferred.as_ref().map_or(true, |p| b.name.trim().to_lowercase() != *p)),
        );

        order.into_iter().find_map(|book| book_price(book, selection))
    }
}

fn book_price(book: &Bookmaker, selection: &Selection) -> Option<f64> {
    let names = match selection {
        Selection::Over { .. }      => OVER_UNDER_NAMES,
        Selection::BttsYes          => BTTS_NAMES,
        Selection::NextGoal { .. }  => NEXT_GOAL_NAMES,
        Selection::DrawNoBet { .. } => DNB_NAMES,
    };
    book.markets
        .iter()
        .filter(|m| names.contains(&m.name.trim().to_lowercase().as_str()))
        .flat_map(|m| m.quotes.iter())
        .filter(|q| !q.suspended && q.odd > 1.0)
        .find(|q| quote_matches(q, selection))
        .map(|q| q.odd)
}

fn quote_matches(q: &Quote, selection: &Selection) -> bool {
    let v = q.value.trim().to_lowercase();
    match selection {
        Selection::Over { line } => over_line(&v, q.handicap.as_deref()).is_some_and(|l| (l - line).abs() < 1e-6),
        Selection::BttsYes => matches!(v.as_str(), "yes" | "y" | "gg"),
        Selection::NextGoal { side } | Selection::DrawNoBet { side } => match side {
            Side::Home => matches!(v.as_str(), "1" | "home"),
            Side::Away => matches!(v.as_str(), "2" | "away"),
        },
    }
}

/// "over 2.5", "2.5 over", or "over" with handicap "2.5".
fn over_line(value: &str, handicap: Option<&str>) -> Option<f64> {
    if let Some(rest) = value.strip_prefix("over") {
        let rest = rest.trim();
        if rest.is_empty() {
            return handicap?.trim().parse().ok();
        }
        return rest.parse().ok();
    }
    value.strip_suffix("over")?.trim().parse().ok()
}

fn parse_markets(bets: Option<&Value>) -> Vec<OddsMarket> {
    let Some(bets) = bets.and_then(Value::as_array) else {
        return Vec::new();
    };
    bets.iter()
        .filter_map(|bet| {
            let name = str_field(bet, "name")?;
            let quotes: Vec<Quote> = bet
                .get("values")
                .and_then(Value::as_array)
                .map(|vals| vals.iter().filter_map(parse_quote).collect())
                .unwrap_or_default();
            (!quotes.is_empty()).then_some(OddsMarket { name, quotes })
        })
        .collect()
}

fn parse_quote(v: &Value) -> Option<Quote> {
    let value = str_field(v, "value")?;
    let odd = match v.get("odd")? {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    Some(Quote {
        value,
        handicap: str_field(v, "handicap"),
        odd,
        suspended: v.get("suspended").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// String or number field rendered as a string.
fn str_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
