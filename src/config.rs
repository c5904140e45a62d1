//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every field carries a default, so a partial (or empty) file is valid
//! and the detection thresholds can be overridden one at a time.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::types::EngineError;

/// Default config path, overridable with `ODDSEDGE_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    /// Directory holding the quote and opportunity documents.
    pub data_dir: String,
    /// Seconds between compute cycles. 0 runs a single cycle and exits.
    pub compute_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "ODDSEDGE-001".to_string(),
            data_dir: "data".to_string(),
            compute_interval_secs: 60,
        }
    }
}

/// Detector thresholds. Passed into every detector run so that tests and
/// callers can override them per cycle.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Smallest line gap that counts as a middle.
    pub middle_min_gap: f64,
    /// Largest line gap that counts as a middle.
    pub middle_max_gap: f64,
    /// Market labels containing any of these (case-insensitive) carry lines.
    pub middle_market_keywords: Vec<String>,
    /// Minimum edge (percent) for an EV bet.
    pub ev_min_edge: f64,
    /// Cap on the Kelly stake recommendation (percent of bankroll).
    pub ev_max_stake_pct: f64,
    /// Maximum hold (percent) for a low-hold market.
    pub low_hold_max: f64,
    /// Lifetime of a freshly detected opportunity.
    pub expiry_horizon_minutes: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            middle_min_gap: 0.5,
            middle_max_gap: 10.0,
            middle_market_keywords: vec![
                "spread".to_string(),
                "total".to_string(),
                "line".to_string(),
            ],
            ev_min_edge: 2.0,
            ev_max_stake_pct: 10.0,
            low_hold_max: 2.5,
            expiry_horizon_minutes: 120,
        }
    }
}

impl DetectionConfig {
    /// Expiry horizon as a chrono duration.
    pub fn expiry_horizon(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.expiry_horizon_minutes)
    }

    /// Validate the middle-detector section.
    pub fn validate_middle(&self) -> Result<(), EngineError> {
        if !self.middle_min_gap.is_finite() || self.middle_min_gap < 0.0 {
            return Err(EngineError::Config(format!(
                "middle_min_gap must be a non-negative number, got {}",
                self.middle_min_gap
            )));
        }
        if !self.middle_max_gap.is_finite() || self.middle_max_gap < self.middle_min_gap {
            return Err(EngineError::Config(format!(
                "middle_max_gap ({}) must be >= middle_min_gap ({})",
                self.middle_max_gap, self.middle_min_gap
            )));
        }
        if self.middle_market_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(EngineError::Config(
                "middle_market_keywords must contain at least one keyword".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate the EV-detector section.
    pub fn validate_ev(&self) -> Result<(), EngineError> {
        if !self.ev_min_edge.is_finite() {
            return Err(EngineError::Config(format!(
                "ev_min_edge must be finite, got {}",
                self.ev_min_edge
            )));
        }
        if !self.ev_max_stake_pct.is_finite() || self.ev_max_stake_pct < 0.0 {
            return Err(EngineError::Config(format!(
                "ev_max_stake_pct must be a non-negative number, got {}",
                self.ev_max_stake_pct
            )));
        }
        Ok(())
    }

    /// Validate the low-hold-detector section.
    pub fn validate_low_hold(&self) -> Result<(), EngineError> {
        if !self.low_hold_max.is_finite() {
            return Err(EngineError::Config(format!(
                "low_hold_max must be finite, got {}",
                self.low_hold_max
            )));
        }
        Ok(())
    }

    /// Validate the lifecycle section.
    pub fn validate_horizon(&self) -> Result<(), EngineError> {
        if self.expiry_horizon_minutes <= 0 {
            return Err(EngineError::Config(format!(
                "expiry_horizon_minutes must be positive, got {}",
                self.expiry_horizon_minutes
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load from `ODDSEDGE_CONFIG` (or `config.toml`), falling back to
    /// defaults when the file does not exist.
    pub fn load_or_default() -> Result<Self> {
        let path = std::env::var("ODDSEDGE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if std::path::Path::new(&path).exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}
