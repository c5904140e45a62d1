//! Arbitrage stake calculator.
//!
//! Splits a total stake across the legs of an arbitrage in proportion to
//! each leg's implied probability, so that every leg pays out the same
//! amount. Money is handled in `Decimal` throughout and only rounded to
//! cents in the returned plan.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::types::{EngineError, Opportunity};

/// One leg of a stake plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeLeg {
    pub outcome: String,
    pub bookmaker: String,
    pub odds: f64,
    pub stake: Decimal,
    /// stake * odds, the return if this leg wins.
    pub payout: Decimal,
}

/// Proportional stake split for one arbitrage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakePlan {
    pub opportunity_id: String,
    pub legs: Vec<StakeLeg>,
    pub total_stake: Decimal,
    pub expected_return: Decimal,
    pub expected_profit: Decimal,
    pub profit_percentage: Decimal,
}

impl fmt::Display for StakePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stake ${} => return ${} (profit ${}, {}%):",
            self.total_stake, self.expected_return, self.expected_profit, self.profit_percentage
        )?;
        for leg in &self.legs {
            write!(f, " [{} @ {:.2} ({}) ${}]", leg.outcome, leg.odds, leg.bookmaker, leg.stake)?;
        }
        Ok(())
    }
}

/// Compute the per-leg stake split for an arbitrage opportunity.
///
/// Fails with `InvalidStake` for a non-positive total or one too large to
/// split without overflow, and with `OpportunityNotFound` when the
/// opportunity is not an arbitrage.
pub fn calculate_stakes(opportunity: &Opportunity, total_stake: Decimal) -> Result<StakePlan, EngineError> {
    if total_stake <= Decimal::ZERO {
        return Err(EngineError::InvalidStake(total_stake));
    }

    let details = opportunity
        .as_arbitrage()
        .filter(|d| !d.legs.is_empty())
        .ok_or_else(|| EngineError::OpportunityNotFound(opportunity.id.clone()))?;

    let mut priced = Vec::with_capacity(details.legs.len());
    for leg in &details.legs {
        let odds = Decimal::from_f64(leg.odds)
            .filter(|o| *o > Decimal::ONE)
            .ok_or_else(|| EngineError::InvalidOdds {
                outcome: leg.outcome.clone(),
                odds: leg.odds,
            })?;
        priced.push((leg, odds, Decimal::ONE / odds));
    }

    let total_implied: Decimal = priced.iter().map(|(_, _, implied)| *implied).sum();

    let mut legs = Vec::with_capacity(priced.len());
    let mut expected_return = Decimal::ZERO;
    for (i, (leg, odds, implied)) in priced.iter().enumerate() {
        let (stake, payout) = total_stake
            .checked_mul(*implied)
            .and_then(|v| v.checked_div(total_implied))
            .and_then(|stake| Some((stake, stake.checked_mul(*odds)?)))
            .ok_or(EngineError::InvalidStake(total_stake))?;
        if i == 0 {
            expected_return = payout;
        }
        legs.push(StakeLeg {
            outcome: leg.outcome.clone(),
            bookmaker: leg.bookmaker.clone(),
            odds: leg.odds,
            stake: stake.round_dp(2),
            payout: payout.round_dp(2),
        });
    }

    let expected_profit = expected_return - total_stake;
    let profit_percentage = expected_profit / total_stake * Decimal::ONE_HUNDRED;

    debug!(
        opportunity_id = %opportunity.id,
        total = %total_stake,
        expected_return = %expected_return.round_dp(2),
        "Stakes calculated"
    );

    Ok(StakePlan {
        opportunity_id: opportunity.id.clone(),
        legs,
        total_stake: total_stake.round_dp(2),
        expected_return: expected_return.round_dp(2),
        expected_profit: expected_profit.round_dp(2),
        profit_percentage: profit_percentage.round_dp(2),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
