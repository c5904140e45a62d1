//! Arbitrage (surebet) detection.
//!
//! For a market with exactly two or three outcomes, take the best price for
//! each outcome across all bookmakers. If the summed implied probability of
//! those best prices is below 1, staking every outcome in proportion to its
//! implied probability locks in a profit whatever the result.
//!
//! Stake limits and liquidity at the quoted prices are not verified.

use tracing::debug;

use super::{DetectionContext, Detector};
use crate::market::{MarketGroup, QuoteSnapshot};
use crate::types::{
    ArbitrageDetails, ArbitrageLeg, EngineError, Opportunity, OpportunityDetails, OpportunityKind,
};

/// Outcome counts the detector models.
const MIN_OUTCOMES: usize = 2;
const MAX_OUTCOMES: usize = 3;

pub struct ArbitrageDetector;

impl Detector for ArbitrageDetector {
    fn kind(&self) -> OpportunityKind {
        OpportunityKind::Arbitrage
    }

    fn detect(
        &self,
        snapshot: &QuoteSnapshot,
        ctx: &DetectionContext<'_>,
    ) -> Result<Vec<Opportunity>, EngineError> {
        let found = snapshot
            .market_groups()
            .iter()
            .filter_map(|group| evaluate_group(group, ctx))
            .collect();

        Ok(found)
    }
}

/// Evaluate one market group. `None` for unmodelled outcome counts and for
/// groups whose best prices do not beat the book.
fn evaluate_group(group: &MarketGroup<'_>, ctx: &DetectionContext<'_>) -> Option<Opportunity> {
    let outcomes = group.outcomes();
    if !(MIN_OUTCOMES..=MAX_OUTCOMES).contains(&outcomes.len()) {
        return None;
    }

    let legs: Vec<ArbitrageLeg> = outcomes
        .iter()
        .filter_map(|outcome| group.best_for(outcome))
        .map(|q| ArbitrageLeg {
            outcome: q.outcome.clone(),
            bookmaker: q.bookmaker.clone(),
            odds: q.odds,
        })
        .collect();

    let combined: f64 = legs.iter().map(|leg| 1.0 / leg.odds).sum();
    let arb_percentage = combined * 100.0;
    if !(combined < 1.0 && arb_percentage < 100.0) {
        return None;
    }

    let profit_percentage = 100.0 - arb_percentage;

    debug!(
        market = %group.key,
        legs = legs.len(),
        arb_pct = format!("{:.3}%", arb_percentage),
        profit = format!("{:.3}%", profit_percentage),
        "Arbitrage found"
    );

    let details = ArbitrageDetails {
        market: group.key.market.clone(),
        legs,
        arb_percentage,
        profit_percentage,
    };

    Some(Opportunity::new(
        &group.key,
        profit_percentage,
        OpportunityDetails::Arbitrage(details),
        ctx.now,
        ctx.expires_at(),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
