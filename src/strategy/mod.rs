//! Strategy engine: the four opportunity detectors and stake sizing.
//!
//! Each detector is a stateless, pure function of a `QuoteSnapshot`, the
//! detection thresholds and the cycle's wall-clock time. `DetectorSuite`
//! runs all of them over one snapshot and unions their output; a failing
//! detector is logged and skipped without affecting the others.

pub mod arbitrage;
pub mod ev;
pub mod kelly;
pub mod low_hold;
pub mod middle;
pub mod stakes;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

use crate::config::DetectionConfig;
use crate::market::QuoteSnapshot;
use crate::types::{EngineError, Opportunity, OpportunityKind};

pub use arbitrage::ArbitrageDetector;
pub use ev::EvDetector;
pub use low_hold::LowHoldDetector;
pub use middle::MiddleDetector;

// ---------------------------------------------------------------------------
// Detector abstraction
// ---------------------------------------------------------------------------

/// Per-run inputs shared by every detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    pub config: &'a DetectionConfig,
    /// Wall-clock time used to stamp `created_at`.
    pub now: DateTime<Utc>,
}

impl<'a> DetectionContext<'a> {
    pub fn new(config: &'a DetectionConfig, now: DateTime<Utc>) -> Self {
        Self { config, now }
    }

    /// Expiry stamp for opportunities created in this run.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.now + self.config.expiry_horizon()
    }
}

/// A single class of opportunity detection.
///
/// Implementors must be pure: the same snapshot, config and `now` always
/// yield the same candidates (ids aside). Unmodelled inputs are skipped,
/// not reported as errors; `Err` is reserved for a detector that cannot run
/// at all (e.g. its config section is invalid).
pub trait Detector: Send + Sync {
    fn kind(&self) -> OpportunityKind;

    fn detect(
        &self,
        snapshot: &QuoteSnapshot,
        ctx: &DetectionContext<'_>,
    ) -> Result<Vec<Opportunity>, EngineError>;
}

// ---------------------------------------------------------------------------
// Suite
// ---------------------------------------------------------------------------

/// Union of all detector output for one snapshot.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutput {
    /// Candidates in detector order, then emission order.
    pub opportunities: Vec<Opportunity>,
    pub counts: BTreeMap<OpportunityKind, usize>,
    /// Detectors that failed this run, with the reason.
    pub failures: Vec<(OpportunityKind, String)>,
}

impl DetectionOutput {
    pub fn count(&self, kind: OpportunityKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

/// Runs every registered detector over a snapshot with failure isolation.
pub struct DetectorSuite {
    detectors: Vec<Box<dyn Detector>>,
}

impl Default for DetectorSuite {
    fn default() -> Self {
        Self::standard()
    }
}

impl DetectorSuite {
    /// Arbitrage, middle, EV and low-hold, in that order.
    pub fn standard() -> Self {
        Self::with_detectors(vec![
            Box::new(ArbitrageDetector),
            Box::new(MiddleDetector),
            Box::new(EvDetector),
            Box::new(LowHoldDetector),
        ])
    }

    pub fn with_detectors(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// Run all detectors over `snapshot`, stamping with `now`.
    ///
    /// Only an invalid expiry horizon (shared by every detector) fails the
    /// whole run. Any single detector's error or panic is recorded in
    /// `failures` and the remaining detectors still run.
    pub fn run(
        &self,
        snapshot: &QuoteSnapshot,
        config: &DetectionConfig,
        now: DateTime<Utc>,
    ) -> Result<DetectionOutput, EngineError> {
        config.validate_horizon()?;
        let ctx = DetectionContext::new(config, now);
        let mut output = DetectionOutput::default();

        for detector in &self.detectors {
            let kind = detector.kind();
            let result = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(snapshot, &ctx)));

            match result {
                Ok(Ok(found)) => {
                    debug!(detector = %kind, found = found.len(), "Detector finished");
                    *output.counts.entry(kind).or_insert(0) += found.len();
                    output.opportunities.extend(found);
                }
                Ok(Err(e)) => {
                    warn!(detector = %kind, error = %e, "Detector failed, continuing without");
                    output.counts.entry(kind).or_insert(0);
                    output.failures.push((kind, e.to_string()));
                }
                Err(_) => {
                    warn!(detector = %kind, "Detector panicked, continuing without");
                    output.counts.entry(kind).or_insert(0);
                    output.failures.push((kind, "detector panicked".to_string()));
                }
            }
        }

        info!(
            quotes = snapshot.len(),
            candidates = output.opportunities.len(),
            failed = output.failures.len(),
            "Detection complete"
        );

        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
