//! Shared types for the ODDSEDGE engine.
//!
//! These types form the data model used across all modules: the quotes
//! consumed by the detectors, the tagged opportunities they produce, and
//! the error type surfaced to callers. They depend on nothing else in the
//! crate so that market, strategy, engine and storage modules can all use
//! them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// A single bookmaker price for one outcome of one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub event_id: String,
    pub sport: String,
    /// Match label, e.g. "Arsenal vs Chelsea".
    #[serde(rename = "match")]
    pub match_label: String,
    /// Market label, e.g. "Match Winner", "Total Goals".
    pub market: String,
    /// Optional market parameter such as a line ("2.5", "-1.5").
    #[serde(default)]
    pub market_params: Option<String>,
    pub bookmaker: String,
    pub outcome: String,
    /// Decimal odds (payout multiplier, > 1.0 for a usable price).
    pub odds: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | {} | {} @ {:.2} ({})",
            self.sport, self.match_label, self.market, self.outcome, self.odds, self.bookmaker,
        )
    }
}

impl Quote {
    /// Build an active quote stamped with the current time.
    pub fn new(
        event_id: &str,
        sport: &str,
        match_label: &str,
        market: &str,
        bookmaker: &str,
        outcome: &str,
        odds: f64,
    ) -> Self {
        Quote {
            event_id: event_id.to_string(),
            sport: sport.to_string(),
            match_label: match_label.to_string(),
            market: market.to_string(),
            market_params: None,
            bookmaker: bookmaker.to_string(),
            outcome: outcome.to_string(),
            odds,
            timestamp: Utc::now(),
            is_active: true,
        }
    }

    /// Attach a market parameter (line) to this quote.
    pub fn with_params(mut self, params: &str) -> Self {
        self.market_params = Some(params.to_string());
        self
    }

    /// Implied probability (1 / odds).
    pub fn implied_probability(&self) -> f64 {
        1.0 / self.odds
    }

    /// Whether the price is usable for detection: finite and above evens-of-nothing.
    pub fn has_valid_odds(&self) -> bool {
        self.odds.is_finite() && self.odds > 1.0
    }

    /// The (event, sport, match, market) key this quote groups under.
    pub fn market_key(&self) -> MarketKey {
        MarketKey {
            event_id: self.event_id.clone(),
            sport: self.sport.clone(),
            match_label: self.match_label.clone(),
            market: self.market.clone(),
        }
    }
}

/// Identity of a market group: the competing outcome set bookmakers price.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub event_id: String,
    pub sport: String,
    #[serde(rename = "match")]
    pub match_label: String,
    pub market: String,
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} [{}]", self.match_label, self.market, self.event_id)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The four classes of edge the engine detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Arbitrage,
    Middle,
    Ev,
    LowHold,
}

impl OpportunityKind {
    /// All known kinds (useful for iteration).
    pub const ALL: &'static [OpportunityKind] = &[
        OpportunityKind::Arbitrage,
        OpportunityKind::Middle,
        OpportunityKind::Ev,
        OpportunityKind::LowHold,
    ];
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpportunityKind::Arbitrage => write!(f, "arbitrage"),
            OpportunityKind::Middle => write!(f, "middle"),
            OpportunityKind::Ev => write!(f, "ev"),
            OpportunityKind::LowHold => write!(f, "low_hold"),
        }
    }
}

/// Parse a kind from a category string (case-insensitive).
impl std::str::FromStr for OpportunityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arbitrage" | "arb" | "surebet" => Ok(OpportunityKind::Arbitrage),
            "middle" | "middles" => Ok(OpportunityKind::Middle),
            "ev" | "+ev" | "value" => Ok(OpportunityKind::Ev),
            "low_hold" | "low" | "lows" | "lowhold" => Ok(OpportunityKind::LowHold),
            _ => Err(anyhow::anyhow!("Unknown opportunity kind: {s}")),
        }
    }
}

/// Lifecycle status of an opportunity.
///
/// Transitions only flow `Active -> Expired` or `Active -> Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Active,
    Expired,
    Removed,
}

impl OpportunityStatus {
    pub const ALL: &'static [OpportunityStatus] = &[
        OpportunityStatus::Active,
        OpportunityStatus::Expired,
        OpportunityStatus::Removed,
    ];

    /// Whether moving from `self` to `next` is a legal lifecycle transition.
    pub fn can_transition_to(&self, next: OpportunityStatus) -> bool {
        matches!(
            (self, next),
            (OpportunityStatus::Active, OpportunityStatus::Expired)
                | (OpportunityStatus::Active, OpportunityStatus::Removed)
        )
    }
}

impl fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpportunityStatus::Active => write!(f, "active"),
            OpportunityStatus::Expired => write!(f, "expired"),
            OpportunityStatus::Removed => write!(f, "removed"),
        }
    }
}

impl std::str::FromStr for OpportunityStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(OpportunityStatus::Active),
            "expired" => Ok(OpportunityStatus::Expired),
            "removed" => Ok(OpportunityStatus::Removed),
            _ => Err(anyhow::anyhow!("Unknown opportunity status: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Variant payloads
// ---------------------------------------------------------------------------

/// One side of an arbitrage: the best price found for an outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageLeg {
    pub outcome: String,
    pub bookmaker: String,
    pub odds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageDetails {
    pub market: String,
    /// 2 or 3 legs, one per distinct outcome.
    pub legs: Vec<ArbitrageLeg>,
    /// 100 * sum(1 / odds). Always < 100 for an emitted arbitrage.
    pub arb_percentage: f64,
    /// 100 - arb_percentage
    pub profit_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddleLeg {
    pub outcome: String,
    pub bookmaker: String,
    pub odds: f64,
    pub line: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddleDetails {
    pub market: String,
    pub first: MiddleLeg,
    pub second: MiddleLeg,
    /// Lower bound of the win-both range.
    pub range_low: f64,
    /// Upper bound of the win-both range.
    pub range_high: f64,
    /// |line1 - line2|
    pub gap: f64,
    pub max_profit_percentage: f64,
    pub worst_case_loss_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvDetails {
    pub market: String,
    pub outcome: String,
    pub bookmaker: String,
    pub offered_odds: f64,
    /// Consensus odds (mean of all quotes for the outcome).
    pub fair_odds: f64,
    /// Percent.
    pub fair_probability: f64,
    /// Percent.
    pub implied_probability: f64,
    /// Percent return per unit staked at fair probability.
    pub expected_value: f64,
    pub edge_percentage: f64,
    /// Clamped Kelly stake, percent of bankroll.
    pub recommended_stake: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowHoldOutcome {
    pub outcome: String,
    pub odds: f64,
    /// De-vigged probability estimate, percent.
    pub true_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowHoldDetails {
    pub market: String,
    pub bookmaker: String,
    pub outcomes: Vec<LowHoldOutcome>,
    /// Percent.
    pub total_implied_probability: f64,
    pub hold_percentage: f64,
}

impl LowHoldDetails {
    /// Sum of the true-probability estimates (percent). 100 by construction.
    pub fn true_probability_total(&self) -> f64 {
        self.outcomes.iter().map(|o| o.true_probability).sum()
    }
}

/// Variant-specific payload, tagged with the opportunity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpportunityDetails {
    Arbitrage(ArbitrageDetails),
    Middle(MiddleDetails),
    Ev(EvDetails),
    LowHold(LowHoldDetails),
}

impl OpportunityDetails {
    pub fn kind(&self) -> OpportunityKind {
        match self {
            OpportunityDetails::Arbitrage(_) => OpportunityKind::Arbitrage,
            OpportunityDetails::Middle(_) => OpportunityKind::Middle,
            OpportunityDetails::Ev(_) => OpportunityKind::Ev,
            OpportunityDetails::LowHold(_) => OpportunityKind::LowHold,
        }
    }

    pub fn market(&self) -> &str {
        match self {
            OpportunityDetails::Arbitrage(d) => &d.market,
            OpportunityDetails::Middle(d) => &d.market,
            OpportunityDetails::Ev(d) => &d.market,
            OpportunityDetails::LowHold(d) => &d.market,
        }
    }
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// A detected betting edge with its lifecycle stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub event_id: String,
    pub sport: String,
    #[serde(rename = "match")]
    pub match_label: String,
    /// Percent. Sort key for the feed.
    pub roi: f64,
    pub status: OpportunityStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub details: OpportunityDetails,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} | {} | roi={:.2}% ({})",
            self.kind(),
            self.sport,
            self.match_label,
            self.details.market(),
            self.roi,
            self.status,
        )
    }
}

impl Opportunity {
    /// Create a fresh, active opportunity for a market group.
    pub fn new(
        key: &MarketKey,
        roi: f64,
        details: OpportunityDetails,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Opportunity {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: key.event_id.clone(),
            sport: key.sport.clone(),
            match_label: key.match_label.clone(),
            roi,
            status: OpportunityStatus::Active,
            created_at,
            expires_at,
            details,
        }
    }

    pub fn kind(&self) -> OpportunityKind {
        self.details.kind()
    }

    pub fn is_active(&self) -> bool {
        self.status == OpportunityStatus::Active
    }

    /// Whether the expiry stamp has passed at `now`.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The profit figure used by the `min_profit` feed filter.
    /// Low-hold markets carry no profit figure.
    pub fn profit_percentage(&self) -> Option<f64> {
        match &self.details {
            OpportunityDetails::Arbitrage(d) => Some(d.profit_percentage),
            OpportunityDetails::Middle(d) => Some(d.max_profit_percentage),
            OpportunityDetails::Ev(d) => Some(d.edge_percentage),
            OpportunityDetails::LowHold(_) => None,
        }
    }

    /// Arbitrage payload, if this is an arbitrage.
    pub fn as_arbitrage(&self) -> Option<&ArbitrageDetails> {
        match &self.details {
            OpportunityDetails::Arbitrage(d) => Some(d),
            _ => None,
        }
    }

    /// Whether `other` describes the same detected edge, ignoring id,
    /// status and lifecycle stamps.
    pub fn same_content(&self, other: &Opportunity) -> bool {
        self.event_id == other.event_id
            && self.sport == other.sport
            && self.match_label == other.match_label
            && self.details == other.details
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of a single detect -> sweep -> merge compute cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    /// Opportunity-set version committed by this cycle.
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub quotes_considered: usize,
    pub quotes_skipped: usize,
    pub arbitrage: usize,
    pub middles: usize,
    pub ev: usize,
    pub low_hold: usize,
    /// Fresh entries actually added after content de-duplication.
    pub added: usize,
    /// Prior entries flipped to expired by this cycle's sweep.
    pub expired: usize,
    /// Size of the working set after the merge.
    pub total_entries: usize,
    /// Detectors that failed and were skipped for this cycle.
    pub failed_detectors: Vec<String>,
}

impl CycleReport {
    /// Total candidates produced by all detectors.
    pub fn detected(&self) -> usize {
        self.arbitrage + self.middles + self.ev + self.low_hold
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle v{}: quotes={} (skipped {}) arb={} middle={} ev={} low={} added={} expired={} total={}",
            self.version,
            self.quotes_considered,
            self.quotes_skipped,
            self.arbitrage,
            self.middles,
            self.ev,
            self.low_hold,
            self.added,
            self.expired,
            self.total_entries,
        )?;
        if !self.failed_detectors.is_empty() {
            write!(f, " failed=[{}]", self.failed_detectors.join(", "))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for ODDSEDGE.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Opportunity not found: {0}")]
    OpportunityNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid stake: {0} (must be greater than zero)")]
    InvalidStake(Decimal),

    #[error("Invalid odds for {outcome}: {odds}")]
    InvalidOdds { outcome: String, odds: f64 },

    #[error("Opportunity {id} is no longer active (status: {status})")]
    OpportunityInactive { id: String, status: OpportunityStatus },

    #[error("Opportunity set version conflict: expected v{expected}, found v{found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
