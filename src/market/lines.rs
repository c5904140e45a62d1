//! Numeric line extraction for spread/total markets.
//!
//! Lines come either from the quote's market parameter ("2.5", "-1.5") or,
//! failing that, from the outcome label ("Over 2.5", "Home +3.5"). Parsing
//! never fails loudly: anything that does not yield a finite number is
//! `None` and the caller skips the row.

use crate::types::Quote;

/// Extract the first signed numeric token from free text.
///
/// A token is a maximal run of digits, '.', '+' and '-' that contains at
/// least one digit. '+' signs are dropped, '-' is kept. Only the first such
/// token is considered; if it does not parse, the result is `None`.
pub fn parse_line(text: &str) -> Option<f64> {
    let token = text
        .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .find(|run| run.chars().any(|c| c.is_ascii_digit()))?;

    let cleaned: String = token.chars().filter(|c| *c != '+').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// The line a quote is priced at.
///
/// A non-empty market parameter is authoritative; the outcome label is only
/// consulted when no parameter is present.
pub fn extract_line(quote: &Quote) -> Option<f64> {
    match quote.market_params.as_deref().map(str::trim) {
        Some(params) if !params.is_empty() => parse_line(params),
        _ => parse_line(&quote.outcome),
    }
}
