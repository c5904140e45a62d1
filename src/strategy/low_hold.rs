//! Low-hold market detection.
//!
//! Looks at each bookmaker's full outcome set for a market. The hold is
//! how far the summed implied probabilities exceed 100%; markets at or under
//! the configured maximum are reported with proportionally de-vigged
//! probability estimates.

use tracing::debug;

use super::{DetectionContext, Detector};
use crate::market::{group_ordered, QuoteSnapshot};
use crate::types::{
    EngineError, LowHoldDetails, LowHoldOutcome, MarketKey, Opportunity, OpportunityDetails,
    OpportunityKind, Quote,
};

pub struct LowHoldDetector;

impl Detector for LowHoldDetector {
    fn kind(&self) -> OpportunityKind {
        OpportunityKind::LowHold
    }

    fn detect(
        &self,
        snapshot: &QuoteSnapshot,
        ctx: &DetectionContext<'_>,
    ) -> Result<Vec<Opportunity>, EngineError> {
        ctx.config.validate_low_hold()?;

        let groups = group_ordered(snapshot.quotes(), |q| (q.market_key(), q.bookmaker.clone()));

        let found = groups
            .iter()
            .filter_map(|((key, bookmaker), quotes)| evaluate_book(key, bookmaker, quotes, ctx))
            .collect();

        Ok(found)
    }
}

/// One bookmaker's prices for one market. A repeated outcome keeps its
/// first-seen price; fewer than two outcomes is not a market.
fn evaluate_book(
    key: &MarketKey,
    bookmaker: &str,
    quotes: &[&Quote],
    ctx: &DetectionContext<'_>,
) -> Option<Opportunity> {
    let mut priced: Vec<&Quote> = Vec::with_capacity(quotes.len());
    for &quote in quotes {
        if !priced.iter().any(|p| p.outcome == quote.outcome) {
            priced.push(quote);
        }
    }
    if priced.len() < 2 {
        return None;
    }

    let total_implied: f64 = priced.iter().map(|q| 1.0 / q.odds).sum();
    let hold = 100.0 * (total_implied - 1.0);
    let max_hold = ctx.config.low_hold_max;

    if hold > max_hold {
        return None;
    }

    let outcomes = priced
        .iter()
        .map(|q| LowHoldOutcome {
            outcome: q.outcome.clone(),
            odds: q.odds,
            true_probability: 100.0 * (1.0 / q.odds) / total_implied,
        })
        .collect();

    let roi = (max_hold - hold) / 2.0;

    debug!(
        market = %key,
        bookmaker,
        hold = format!("{:.2}%", hold),
        "Low-hold market found"
    );

    let details = LowHoldDetails {
        market: key.market.clone(),
        bookmaker: bookmaker.to_string(),
        outcomes,
        total_implied_probability: total_implied * 100.0,
        hold_percentage: hold,
    };

    Some(Opportunity::new(
        key,
        roi,
        OpportunityDetails::LowHold(details),
        ctx.now,
        ctx.expires_at(),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
