//! End-to-end tests over the JSON file store.
//!
//! Each test gets its own scratch data directory under the system temp dir,
//! removed again when the guard drops.

mod betting;
mod cycle;

use std::path::PathBuf;

use oddsedge::config::DetectionConfig;
use oddsedge::engine::OpportunityService;
use oddsedge::storage::JsonFileStore;
use oddsedge::types::Quote;

pub struct ScratchDir(PathBuf);

impl ScratchDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("oddsedge-it-{}", uuid::Uuid::new_v4()));
        Self(path)
    }

    pub fn path(&self) -> &PathBuf {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

pub fn make_quotes() -> Vec<Quote> {
    vec![
        Quote::new("T1", "Tennis", "Sinner vs Alcaraz", "Match Winner", "Book1", "Sinner", 2.10),
        Quote::new("T1", "Tennis", "Sinner vs Alcaraz", "Match Winner", "Book2", "Alcaraz", 2.05),
        Quote::new("B1", "Basketball", "Lakers vs Celtics", "Total Points", "Book1", "Over 215.5", 1.95),
        Quote::new("B1", "Basketball", "Lakers vs Celtics", "Total Points", "Book2", "Under 218.5", 1.90),
    ]
}

pub fn make_service(dir: &ScratchDir) -> OpportunityService<JsonFileStore> {
    OpportunityService::new(JsonFileStore::new(dir.path()), DetectionConfig::default())
}
