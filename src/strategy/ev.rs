//! Positive expected value (EV+) detection.
//!
//! The consensus price for an outcome is the plain mean of every
//! bookmaker's quote for it. A quote priced sufficiently above that
//! consensus is flagged, with a clamped Kelly stake recommendation.

use tracing::debug;

use super::kelly::recommended_stake;
use super::{DetectionContext, Detector};
use crate::market::{group_ordered, QuoteSnapshot};
use crate::types::{
    EngineError, EvDetails, MarketKey, Opportunity, OpportunityDetails, OpportunityKind, Quote,
};

pub struct EvDetector;

impl Detector for EvDetector {
    fn kind(&self) -> OpportunityKind {
        OpportunityKind::Ev
    }

    fn detect(
        &self,
        snapshot: &QuoteSnapshot,
        ctx: &DetectionContext<'_>,
    ) -> Result<Vec<Opportunity>, EngineError> {
        ctx.config.validate_ev()?;

        let groups = group_ordered(snapshot.quotes(), |q| (q.market_key(), q.outcome.clone()));

        let mut found = Vec::new();
        for ((key, _outcome), quotes) in &groups {
            evaluate_outcome(key, quotes, ctx, &mut found);
        }

        Ok(found)
    }
}

/// Arithmetic mean of the quoted prices.
pub fn consensus_odds(quotes: &[&Quote]) -> Option<f64> {
    if quotes.is_empty() {
        return None;
    }
    Some(quotes.iter().map(|q| q.odds).sum::<f64>() / quotes.len() as f64)
}

fn evaluate_outcome(
    key: &MarketKey,
    quotes: &[&Quote],
    ctx: &DetectionContext<'_>,
    found: &mut Vec<Opportunity>,
) {
    let Some(fair_odds) = consensus_odds(quotes) else {
        return;
    };
    let fair_probability = 1.0 / fair_odds;

    for quote in quotes {
        let implied_probability = 1.0 / quote.odds;
        let expected_value = 100.0 * (quote.odds * fair_probability - 1.0);
        let edge = 100.0 * (1.0 - implied_probability / fair_probability);

        if edge < ctx.config.ev_min_edge {
            continue;
        }

        let stake = recommended_stake(quote.odds, fair_probability, ctx.config.ev_max_stake_pct);

        debug!(
            market = %key,
            outcome = %quote.outcome,
            bookmaker = %quote.bookmaker,
            offered = quote.odds,
            fair = format!("{:.3}", fair_odds),
            edge = format!("{:.2}%", edge),
            stake = format!("{:.2}%", stake),
            "EV bet found"
        );

        let details = EvDetails {
            market: key.market.clone(),
            outcome: quote.outcome.clone(),
            bookmaker: quote.bookmaker.clone(),
            offered_odds: quote.odds,
            fair_odds,
            fair_probability: fair_probability * 100.0,
            implied_probability: implied_probability * 100.0,
            expected_value,
            edge_percentage: edge,
            recommended_stake: stake,
        };

        found.push(Opportunity::new(
            key,
            edge,
            OpportunityDetails::Ev(details),
            ctx.now,
            ctx.expires_at(),
        ));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
