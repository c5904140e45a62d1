//! Middle detection.
//!
//! A middle is two bets on the same line-based market (spread, total) at
//! different bookmakers and different lines. If the result lands between
//! the two lines, both bets win; otherwise one wins and the other loses.
//!
//! Every qualifying pair is reported. The pairwise scan is quadratic per
//! market, which is fine for the handful of bookmakers quoting any one line.

use tracing::debug;

use super::{DetectionContext, Detector};
use crate::market::group_ordered;
use crate::market::lines::extract_line;
use crate::market::QuoteSnapshot;
use crate::types::{
    EngineError, MarketKey, MiddleDetails, MiddleLeg, Opportunity, OpportunityDetails,
    OpportunityKind, Quote,
};

pub struct MiddleDetector;

impl Detector for MiddleDetector {
    fn kind(&self) -> OpportunityKind {
        OpportunityKind::Middle
    }

    fn detect(
        &self,
        snapshot: &QuoteSnapshot,
        ctx: &DetectionContext<'_>,
    ) -> Result<Vec<Opportunity>, EngineError> {
        let config = ctx.config;
        config.validate_middle()?;

        let keywords: Vec<String> = config
            .middle_market_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let line_markets = snapshot.quotes().iter().filter(|q| {
            let market = q.market.to_lowercase();
            keywords.iter().any(|k| market.contains(k.as_str()))
        });

        let mut found = Vec::new();
        for (key, rows) in group_ordered(line_markets, Quote::market_key) {
            scan_group(&key, &rows, ctx, &mut found);
        }

        Ok(found)
    }
}

/// Pairwise scan of one market group.
fn scan_group(
    key: &MarketKey,
    rows: &[&Quote],
    ctx: &DetectionContext<'_>,
    found: &mut Vec<Opportunity>,
) {
    let config = ctx.config;
    let lines: Vec<Option<f64>> = rows.iter().map(|q| extract_line(q)).collect();

    for i in 0..rows.len() {
        for j in (i + 1)..rows.len() {
            let (a, b) = (rows[i], rows[j]);
            if a.bookmaker == b.bookmaker {
                continue;
            }

            // Rows without a parseable line never pair
            let (Some(line_a), Some(line_b)) = (lines[i], lines[j]) else {
                continue;
            };

            let gap = (line_a - line_b).abs();
            if gap < config.middle_min_gap || gap > config.middle_max_gap {
                continue;
            }

            let worst_case = -100.0 * (1.0 / a.odds + 1.0 / b.odds - 1.0);
            let max_profit = 100.0 * (a.odds - 1.0).min(b.odds - 1.0);
            let roi = (max_profit + worst_case) / 2.0;

            debug!(
                market = %key,
                first = %a.bookmaker,
                second = %b.bookmaker,
                line_a,
                line_b,
                gap,
                roi = format!("{:.2}%", roi),
                "Middle found"
            );

            let details = MiddleDetails {
                market: key.market.clone(),
                first: leg(a, line_a),
                second: leg(b, line_b),
                range_low: line_a.min(line_b),
                range_high: line_a.max(line_b),
                gap,
                max_profit_percentage: max_profit,
                worst_case_loss_percentage: worst_case,
            };

            found.push(Opportunity::new(
                key,
                roi,
                OpportunityDetails::Middle(details),
                ctx.now,
                ctx.expires_at(),
            ));
        }
    }
}

fn leg(quote: &Quote, line: f64) -> MiddleLeg {
    MiddleLeg {
        outcome: quote.outcome.clone(),
        bookmaker: quote.bookmaker.clone(),
        odds: quote.odds,
        line,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
