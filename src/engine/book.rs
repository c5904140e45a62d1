//! The opportunity book: the single owned, versioned collection of every
//! opportunity the engine has produced.
//!
//! Entries are never deleted here. Expired and removed entries stay as
//! queryable history until a full reset; the only mutations are the expiry
//! sweep, the merge of fresh detections and the explicit mark-removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::types::{EngineError, Opportunity, OpportunityKind, OpportunityStatus};

/// Default result cap for feed queries.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Number of top entries reported in statistics.
const TOP_N: usize = 5;

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Feed query. Unset fields do not filter.
#[derive(Debug, Clone, PartialEq)]
pub struct OpportunityFilter {
    pub kind: Option<OpportunityKind>,
    /// Case-insensitive sport match.
    pub sport: Option<String>,
    pub min_roi: Option<f64>,
    /// Compared against `Opportunity::profit_percentage()`. Entries with no
    /// profit figure only pass a non-positive minimum.
    pub min_profit: Option<f64>,
    /// `None` returns every status.
    pub status: Option<OpportunityStatus>,
    pub limit: usize,
}

impl Default for OpportunityFilter {
    fn default() -> Self {
        Self {
            kind: None,
            sport: None,
            min_roi: None,
            min_profit: None,
            status: Some(OpportunityStatus::Active),
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl OpportunityFilter {
    pub fn kind(mut self, kind: OpportunityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn sport(mut self, sport: &str) -> Self {
        self.sport = Some(sport.to_string());
        self
    }

    pub fn min_roi(mut self, min_roi: f64) -> Self {
        self.min_roi = Some(min_roi);
        self
    }

    pub fn min_profit(mut self, min_profit: f64) -> Self {
        self.min_profit = Some(min_profit);
        self
    }

    pub fn status(mut self, status: Option<OpportunityStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, opp: &Opportunity) -> bool {
        if self.status.is_some_and(|s| s != opp.status) {
            return false;
        }
        if self.kind.is_some_and(|k| k != opp.kind()) {
            return false;
        }
        if let Some(sport) = &self.sport {
            if !opp.sport.eq_ignore_ascii_case(sport) {
                return false;
            }
        }
        if self.min_roi.is_some_and(|min| opp.roi < min) {
            return false;
        }
        if let Some(min) = self.min_profit {
            match opp.profit_percentage() {
                Some(profit) if profit >= min => {}
                None if min <= 0.0 => {}
                _ => return false,
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpportunityStats {
    pub total: usize,
    pub by_kind: BTreeMap<OpportunityKind, usize>,
    pub by_status: BTreeMap<OpportunityStatus, usize>,
    /// Mean roi across every entry; 0 when empty.
    pub avg_roi: f64,
    pub max_roi: f64,
    /// Highest-roi active entries.
    pub top: Vec<Opportunity>,
}

impl fmt::Display for OpportunityStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} opportunities (avg roi {:.2}%, max {:.2}%)",
            self.total, self.avg_roi, self.max_roi
        )?;
        for (kind, count) in &self.by_kind {
            write!(f, " {kind}={count}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityBook {
    /// Bumped on every committed change.
    pub version: u64,
    /// Insertion order is preserved and breaks roi ties in queries.
    pub entries: Vec<Opportunity>,
}

impl OpportunityBook {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flip every active entry whose expiry has passed at `now` to expired.
    /// Returns the number of entries flipped.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for opp in self.entries.iter_mut() {
            if opp.is_active() && opp.is_past_expiry(now) {
                opp.status = OpportunityStatus::Expired;
                expired += 1;
            }
        }
        if expired > 0 {
            debug!(expired, "Swept expired opportunities");
        }
        expired
    }

    /// Append freshly detected entries, skipping any whose content matches
    /// an entry that was already active before this merge. Duplicates
    /// within `fresh` are all kept. Returns the number added.
    pub fn merge(&mut self, fresh: Vec<Opportunity>) -> usize {
        let active: Vec<Opportunity> = self.entries.iter().filter(|o| o.is_active()).cloned().collect();

        let before = self.entries.len();
        for opp in fresh {
            if !active.iter().any(|existing| existing.same_content(&opp)) {
                self.entries.push(opp);
            }
        }
        self.entries.len() - before
    }

    /// Bump the version after a batch of changes.
    pub fn commit(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn get(&self, id: &str) -> Option<&Opportunity> {
        self.entries.iter().find(|o| o.id == id)
    }

    /// Filtered entries sorted by roi (highest first, ties in insertion
    /// order), capped at `filter.limit`.
    pub fn query(&self, filter: &OpportunityFilter) -> Vec<Opportunity> {
        let mut hits: Vec<&Opportunity> = self.entries.iter().filter(|o| filter.matches(o)).collect();
        hits.sort_by(|a, b| b.roi.total_cmp(&a.roi));
        hits.into_iter().take(filter.limit).cloned().collect()
    }

    /// Active arbitrages with at least `min_profit` percent profit, best
    /// first.
    pub fn arbitrage_feed(&self, min_profit: f64, limit: usize, sport: Option<&str>) -> Vec<Opportunity> {
        let mut hits: Vec<(&Opportunity, f64)> = self
            .entries
            .iter()
            .filter(|o| o.is_active())
            .filter(|o| sport.map_or(true, |s| o.sport.eq_ignore_ascii_case(s)))
            .filter_map(|o| o.as_arbitrage().map(|d| (o, d.profit_percentage)))
            .filter(|(_, profit)| *profit >= min_profit)
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.into_iter().take(limit).map(|(o, _)| o.clone()).collect()
    }

    /// Consume an active entry. Fails for unknown ids and for entries that
    /// have already expired or been removed.
    pub fn mark_removed(&mut self, id: &str) -> Result<(), EngineError> {
        let opp = self
            .entries
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| EngineError::OpportunityNotFound(id.to_string()))?;

        if !opp.status.can_transition_to(OpportunityStatus::Removed) {
            return Err(EngineError::OpportunityInactive {
                id: id.to_string(),
                status: opp.status,
            });
        }
        opp.status = OpportunityStatus::Removed;
        Ok(())
    }

    pub fn stats(&self) -> OpportunityStats {
        if self.entries.is_empty() {
            return OpportunityStats::default();
        }

        let mut by_kind = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        for opp in &self.entries {
            *by_kind.entry(opp.kind()).or_insert(0) += 1;
            *by_status.entry(opp.status).or_insert(0) += 1;
        }

        let total = self.entries.len();
        let avg_roi = self.entries.iter().map(|o| o.roi).sum::<f64>() / total as f64;
        let max_roi = self
            .entries
            .iter()
            .map(|o| o.roi)
            .fold(f64::NEG_INFINITY, f64::max);

        let top = self.query(&OpportunityFilter::default().limit(TOP_N));

        OpportunityStats {
            total,
            by_kind,
            by_status,
            avg_roi,
            max_roi,
            top,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
