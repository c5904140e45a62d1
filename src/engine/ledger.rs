//! Betting sessions and placed bets.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::strategy::stakes::StakePlan;
use crate::types::{EngineError, Opportunity};

const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
    /// One per placement, however many legs it had.
    pub total_bets: u32,
    pub total_stake: Decimal,
    pub total_expected_profit: Decimal,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session {} ({}): {} bets, staked ${}, expected profit ${}",
            self.session_id, self.user_name, self.total_bets, self.total_stake, self.total_expected_profit
        )
    }
}

/// One leg of a placement at one bookmaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedBet {
    pub bet_id: String,
    pub session_id: String,
    pub opportunity_id: String,
    pub bookmaker: String,
    pub outcome: String,
    pub stake: Decimal,
    pub odds: f64,
    pub expected_return: Decimal,
    /// Leg return minus the whole placement's stake.
    pub expected_profit: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetReceipt {
    pub bets: Vec<PlacedBet>,
    pub plan: StakePlan,
    pub sport: String,
    #[serde(rename = "match")]
    pub match_label: String,
    pub market: String,
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    sessions: Vec<Session>,
    bets: Vec<PlacedBet>,
}

impl Ledger {
    pub fn create_session(&mut self, user_name: &str, now: DateTime<Utc>) -> Session {
        let user_name = match user_name.trim() {
            "" => ANONYMOUS.to_string(),
            name => name.to_string(),
        };
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_name,
            created_at: now,
            total_bets: 0,
            total_stake: Decimal::ZERO,
            total_expected_profit: Decimal::ZERO,
        };
        info!(session_id = %session.session_id, user = %session.user_name, "Session created");
        self.sessions.push(session.clone());
        session
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Record one bet per leg of `plan` and roll the placement into the
    /// session totals.
    pub fn record(
        &mut self,
        session_id: &str,
        opportunity: &Opportunity,
        plan: &StakePlan,
        now: DateTime<Utc>,
    ) -> Result<BetReceipt, EngineError> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let bets: Vec<PlacedBet> = plan
            .legs
            .iter()
            .map(|leg| PlacedBet {
                bet_id: uuid::Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                opportunity_id: opportunity.id.clone(),
                bookmaker: leg.bookmaker.clone(),
                outcome: leg.outcome.clone(),
                stake: leg.stake,
                odds: leg.odds,
                expected_return: leg.payout,
                expected_profit: leg.payout - plan.total_stake,
                timestamp: now,
            })
            .collect();

        session.total_bets += 1;
        session.total_stake += plan.total_stake;
        session.total_expected_profit += plan.expected_profit;

        info!(
            session_id,
            opportunity_id = %opportunity.id,
            legs = bets.len(),
            stake = %plan.total_stake,
            expected_profit = %plan.expected_profit,
            "Bet placed"
        );

        self.bets.extend(bets.iter().cloned());

        Ok(BetReceipt {
            bets,
            plan: plan.clone(),
            sport: opportunity.sport.clone(),
            match_label: opportunity.match_label.clone(),
            market: opportunity.details.market().to_string(),
        })
    }

    pub fn bets_for_session(&self, session_id: &str) -> Vec<&PlacedBet> {
        self.bets.iter().filter(|b| b.session_id == session_id).collect()
    }

    pub fn bet(&self, bet_id: &str) -> Option<&PlacedBet> {
        self.bets.iter().find(|b| b.bet_id == bet_id)
    }

    pub fn bets(&self) -> &[PlacedBet] {
        &self.bets
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
        self.bets.clear();
    }
}
