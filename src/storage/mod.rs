//! Persistence layer.
//!
//! The engine reads and replaces whole collections: the quote snapshot and
//! the versioned opportunity book. `JsonFileStore` keeps one JSON document
//! per collection and writes through a temp file plus rename, so a failed
//! write leaves the previously committed document intact. `MemoryStore`
//! has the same semantics and backs tests and embedded use.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::engine::book::OpportunityBook;
use crate::types::{EngineError, Quote};

pub const QUOTES_FILE: &str = "quotes.json";
pub const OPPORTUNITIES_FILE: &str = "opportunities.json";

/// Whole-collection persistence for quotes and opportunities.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Every stored quote, in stored order. Empty when nothing is stored.
    async fn load_quotes(&self) -> Result<Vec<Quote>>;

    async fn replace_quotes(&self, quotes: &[Quote]) -> Result<()>;

    /// The committed book. An empty version-0 book when nothing is stored.
    async fn load_opportunities(&self) -> Result<OpportunityBook>;

    /// Replace the book, provided the stored version still equals
    /// `expected_version`. A stale base fails with `VersionConflict`.
    async fn replace_opportunities(&self, book: &OpportunityBook, expected_version: u64) -> Result<()>;

    /// Drop every stored quote and opportunity.
    async fn reset(&self) -> Result<()>;
}

fn check_version(found: u64, expected: u64) -> Result<()> {
    if found != expected {
        return Err(anyhow!(EngineError::VersionConflict { expected, found }));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn quotes_path(&self) -> PathBuf {
        self.dir.join(QUOTES_FILE)
    }

    fn opportunities_path(&self) -> PathBuf {
        self.dir.join(OPPORTUNITIES_FILE)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        let value = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    /// Serialise, write to a sibling temp file, then rename over the target.
    async fn write_json<T: serde::Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialise {}", path.display()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create data dir {}", self.dir.display()))?;

        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
        }

        debug!(path = %path.display(), bytes = json.len(), "Document written");
        Ok(())
    }

    async fn remove_if_exists(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn load_quotes(&self) -> Result<Vec<Quote>> {
        Ok(Self::read_json(&self.quotes_path()).await?.unwrap_or_default())
    }

    async fn replace_quotes(&self, quotes: &[Quote]) -> Result<()> {
        self.write_json(&self.quotes_path(), quotes).await?;
        info!(count = quotes.len(), "Quotes replaced");
        Ok(())
    }

    async fn load_opportunities(&self) -> Result<OpportunityBook> {
        Ok(Self::read_json(&self.opportunities_path()).await?.unwrap_or_default())
    }

    async fn replace_opportunities(&self, book: &OpportunityBook, expected_version: u64) -> Result<()> {
        let current = self.load_opportunities().await?;
        check_version(current.version, expected_version)?;
        self.write_json(&self.opportunities_path(), book).await?;
        debug!(version = book.version, entries = book.len(), "Opportunity book replaced");
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        // Book first: a failure part-way leaves quotes that re-detect it
        Self::remove_if_exists(&self.opportunities_path()).await?;
        Self::remove_if_exists(&self.quotes_path()).await?;
        info!(dir = %self.dir.display(), "Data reset");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    quotes: RwLock<Vec<Quote>>,
    book: RwLock<OpportunityBook>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quotes(quotes: Vec<Quote>) -> Self {
        Self {
            quotes: RwLock::new(quotes),
            book: RwLock::new(OpportunityBook::default()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_quotes(&self) -> Result<Vec<Quote>> {
        Ok(self.quotes.read().await.clone())
    }

    async fn replace_quotes(&self, quotes: &[Quote]) -> Result<()> {
        *self.quotes.write().await = quotes.to_vec();
        Ok(())
    }

    async fn load_opportunities(&self) -> Result<OpportunityBook> {
        Ok(self.book.read().await.clone())
    }

    async fn replace_opportunities(&self, book: &OpportunityBook, expected_version: u64) -> Result<()> {
        let mut stored = self.book.write().await;
        check_version(stored.version, expected_version)?;
        *stored = book.clone();
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.quotes.write().await.clear();
        *self.book.write().await = OpportunityBook::default();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
