//! Quote snapshots and market grouping.
//!
//! A `QuoteSnapshot` is the immutable, validated input to one compute
//! cycle. Detectors never see raw quotes: inactive rows and unusable
//! prices are dropped here, and grouping always preserves first-seen
//! order so that detector output is deterministic for a given snapshot.

pub mod lines;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{debug, warn};

use crate::types::{MarketKey, Quote};

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Group quotes by an arbitrary key, keeping groups (and the quotes inside
/// them) in first-seen order.
pub fn group_ordered<'a, K, F, I>(quotes: I, key_fn: F) -> Vec<(K, Vec<&'a Quote>)>
where
    K: Eq + Hash + Clone,
    F: Fn(&Quote) -> K,
    I: IntoIterator<Item = &'a Quote>,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<&'a Quote>)> = Vec::new();

    for quote in quotes {
        let key = key_fn(quote);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(quote),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![quote]));
            }
        }
    }

    groups
}

/// All quotes for one (event, sport, match, market).
#[derive(Debug, Clone)]
pub struct MarketGroup<'a> {
    pub key: MarketKey,
    pub quotes: Vec<&'a Quote>,
}

impl<'a> MarketGroup<'a> {
    /// Distinct outcome labels in first-seen order.
    pub fn outcomes(&self) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        self.quotes
            .iter()
            .map(|q| q.outcome.as_str())
            .filter(|o| seen.insert(*o))
            .collect()
    }

    /// Highest-priced quote for an outcome. Ties go to the first seen.
    pub fn best_for(&self, outcome: &str) -> Option<&'a Quote> {
        self.quotes
            .iter()
            .copied()
            .filter(|q| q.outcome == outcome)
            .fold(None, |best: Option<&'a Quote>, q| match best {
                Some(b) if b.odds >= q.odds => Some(b),
                _ => Some(q),
            })
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable, timestamped set of usable quotes.
#[derive(Debug, Clone)]
pub struct QuoteSnapshot {
    taken_at: DateTime<Utc>,
    quotes: Vec<Quote>,
    skipped: usize,
}

/// Aggregate view of what a snapshot contains.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub total_quotes: usize,
    pub skipped_quotes: usize,
    pub sports: Vec<String>,
    pub bookmakers: Vec<String>,
    pub events: usize,
    pub markets: usize,
}

impl QuoteSnapshot {
    /// Build a snapshot, keeping only active quotes with usable odds.
    pub fn new(quotes: Vec<Quote>, taken_at: DateTime<Utc>) -> Self {
        let total = quotes.len();
        let mut inactive = 0usize;
        let mut bad_odds = 0usize;

        let quotes: Vec<Quote> = quotes
            .into_iter()
            .filter(|q| {
                if !q.is_active {
                    inactive += 1;
                    return false;
                }
                if !q.has_valid_odds() {
                    bad_odds += 1;
                    debug!(
                        event_id = %q.event_id,
                        bookmaker = %q.bookmaker,
                        outcome = %q.outcome,
                        odds = q.odds,
                        "Dropping quote with unusable odds"
                    );
                    return false;
                }
                true
            })
            .collect();

        if bad_odds > 0 {
            warn!(bad_odds, total, "Quotes with unusable odds skipped");
        }

        Self {
            taken_at,
            quotes,
            skipped: inactive + bad_odds,
        }
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    /// Number of input rows dropped (inactive or unusable odds).
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Quotes grouped by (event, sport, match, market).
    pub fn market_groups(&self) -> Vec<MarketGroup<'_>> {
        group_ordered(&self.quotes, Quote::market_key)
            .into_iter()
            .map(|(key, quotes)| MarketGroup { key, quotes })
            .collect()
    }

    /// Distinct sports in first-seen order.
    pub fn sports(&self) -> Vec<String> {
        distinct(self.quotes.iter().map(|q| q.sport.as_str()))
    }

    /// Distinct market labels, optionally restricted to one sport.
    pub fn markets(&self, sport: Option<&str>) -> Vec<String> {
        distinct(
            self.quotes
                .iter()
                .filter(|q| sport.map_or(true, |s| q.sport.eq_ignore_ascii_case(s)))
                .map(|q| q.market.as_str()),
        )
    }

    /// All quotes for a match label (case-insensitive).
    pub fn by_match(&self, match_label: &str) -> Vec<&Quote> {
        self.quotes
            .iter()
            .filter(|q| q.match_label.eq_ignore_ascii_case(match_label))
            .collect()
    }

    /// Quotes filtered by sport and/or market label (case-insensitive).
    pub fn filter(&self, sport: Option<&str>, market: Option<&str>) -> Vec<&Quote> {
        self.quotes
            .iter()
            .filter(|q| sport.map_or(true, |s| q.sport.eq_ignore_ascii_case(s)))
            .filter(|q| market.map_or(true, |m| q.market.eq_ignore_ascii_case(m)))
            .collect()
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            total_quotes: self.quotes.len(),
            skipped_quotes: self.skipped,
            sports: self.sports(),
            bookmakers: distinct(self.quotes.iter().map(|q| q.bookmaker.as_str())),
            events: distinct(self.quotes.iter().map(|q| q.event_id.as_str())).len(),
            markets: distinct(self.quotes.iter().map(|q| q.market.as_str())).len(),
        }
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| seen.insert(*v))
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
