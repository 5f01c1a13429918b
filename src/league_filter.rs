//! League filters applied to the live listing before anything is ranked:
//! excluded keywords (friendlies, youth, reserves, ...) and, in whitelist
//! mode, a per-fixture list (`date,league,home,away` CSV) or else a file of
//! league names.

use crate::config::LeagueConfig;
use chrono::NaiveDate;
use prediction_engine::Fixture;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Compatibility decomposition, accents dropped, lower case, dash variants
/// folded to `-`, whitespace collapsed.
pub fn normalize_text(s: &str) -> String {
    let folded: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' | '\u{FF0D}' => '-',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One row of the fixture list, names already normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedFixture {
    /// `None` matches any day.
    pub date:   Option<NaiveDate>,
    pub league: String,
    pub home:   String,
    pub away:   String,
}

impl ListedFixture {
    pub fn new(date: Option<NaiveDate>, league: &str, home: &str, away: &str) -> Self {
        Self {
            date,
            league: normalize_text(league),
            home:   normalize_text(home),
            away:   normalize_text(away),
        }
    }

    fn matches(&self, fixture: &Fixture, today: NaiveDate) -> bool {
        self.date.map_or(true, |d| d == today)
            && self.league == normalize_text(&fixture.league)
            && self.home == normalize_text(&fixture.home)
            && self.away == normalize_text(&fixture.away)
    }
}

#[derive(Debug, Deserialize)]
struct FixtureRow {
    #[serde(default)]
    date:   String,
    #[serde(default)]
    league: String,
    #[serde(default)]
    home:   String,
    #[serde(default)]
    away:   String,
}

pub struct LeagueFilter {
    whitelist_only: bool,
    whitelist:      HashSet<String>,
    fixtures:       Vec<ListedFixture>,
    excluded:       Vec<String>,
}

impl LeagueFilter {
    pub fn new(whitelist_only: bool, whitelist: impl IntoIterator<Item = String>, excluded: &[String]) -> Self {
        Self {
            whitelist_only,
            whitelist: whitelist.into_iter().map(|l| normalize_text(&l)).filter(|l| !l.is_empty()).collect(),
            fixtures:  Vec::new(),
            excluded:  excluded.iter().map(|k| normalize_text(k)).filter(|k| !k.is_empty()).collect(),
        }
    }

    /// A non-empty fixture list takes precedence over the league whitelist.
    pub fn with_fixture_list(mut self, fixtures: Vec<ListedFixture>) -> Self {
        self.fixtures = fixtures;
        self
    }

    /// Reads the fixture list and the whitelist file when whitelist mode is
    /// on. Missing files leave the lists empty; with both empty nothing
    /// gets through.
    pub fn load(cfg: &LeagueConfig) -> Self {
        if !cfg.whitelist_only {
            return Self::new(false, Vec::new(), &cfg.excluded_keywords);
        }
        Self::new(true, read_whitelist(&cfg.whitelist_file), &cfg.excluded_keywords)
            .with_fixture_list(read_fixture_list(&cfg.fixture_list_file))
    }

    pub fn allows(&self, fixture: &Fixture, today: NaiveDate) -> bool {
        let league = normalize_text(&fixture.league);
        if self.excluded.iter().any(|k| league.contains(k.as_str())) {
            return false;
        }
        if !self.whitelist_only {
            return true;
        }
        if !self.fixtures.is_empty() {
            return self.fixtures.iter().any(|f| f.matches(fixture, today));
        }
        if self.whitelist.contains(&league) {
            return true;
        }
        let qualified = normalize_text(&format!("{} - {}", fixture.country, fixture.league));
        self.whitelist.contains(&qualified)
    }
}

fn read_whitelist(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(body) => {
            let names: Vec<String> = body
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect();
            info!(path = %path.display(), leagues = names.len(), "league whitelist loaded");
            names
        }
        Err(e) => {
            warn!(path = %path.display(), "league whitelist unreadable, no league will pass: {e}");
            Vec::new()
        }
    }
}

/// `date,league,home,away` with a header row. A blank date matches every
/// day; rows with an unreadable date are skipped.
fn read_fixture_list(path: &Path) -> Vec<ListedFixture> {
    if !path.exists() {
        return Vec::new();
    }
    let mut reader = match csv::ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_path(path) {
        Ok(r) => r,
        Err(e) => {
            warn!(path = %path.display(), "fixture list unreadable: {e}");
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for row in reader.deserialize::<FixtureRow>() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), "fixture list row skipped: {e}");
                continue;
            }
        };
        let date = if row.date.is_empty() {
            None
        } else {
            match NaiveDate::parse_from_str(&row.date, "%Y-%m-%d") {
                Ok(d) => Some(d),
                Err(_) => {
                    warn!(path = %path.display(), date = %row.date, "fixture list row skipped: bad date");
                    continue;
                }
            }
        };
        out.push(ListedFixture::new(date, &row.league, &row.home, &row.away));
    }
    info!(path = %path.display(), fixtures = out.len(), "fixture list loaded");
    out
}
