//! Kelly criterion stake sizing for EV bets.
//!
//! The EV detector recommends a clamped full-Kelly fraction expressed as a
//! percent of bankroll. The clamp keeps recommendations conservative: no
//! negative stakes and never more than the configured cap.

use tracing::debug;

// ---------------------------------------------------------------------------
// Kelly fraction
// ---------------------------------------------------------------------------

/// Raw Kelly fraction for a decimal price and a win probability.
///
/// Kelly formula: f* = (bp - q) / b
/// where:
///   b = net odds (decimal odds - 1)
///   p = estimated win probability
///   q = 1 - p
///
/// which simplifies to (odds * p - 1) / (odds - 1). Returns 0.0 for prices
/// that pay nothing (odds <= 1.0).
pub fn kelly_fraction(odds: f64, win_prob: f64) -> f64 {
    let net_odds = odds - 1.0;
    if !(net_odds > 0.0) {
        return 0.0;
    }
    (odds * win_prob - 1.0) / net_odds
}

/// Recommended stake as a percent of bankroll, clamped to `[0, max_pct]`.
pub fn recommended_stake(odds: f64, win_prob: f64, max_pct: f64) -> f64 {
    let kelly = kelly_fraction(odds, win_prob);
    let stake = (kelly * 100.0).max(0.0).min(max_pct);

    if kelly * 100.0 > max_pct {
        debug!(
            odds,
            raw_kelly = format!("{:.2}%", kelly * 100.0),
            cap = max_pct,
            "Kelly stake capped"
        );
    }

    stake
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
