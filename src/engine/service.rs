//! Opportunity service: the serialized compute cycle and everything that
//! reads or mutates the opportunity book.
//!
//! Every read-modify-write of the book (compute cycle, mark-removed, bet
//! placement, reset) runs while holding one async mutex, which also guards
//! the session ledger. Reads go straight to the store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::book::{OpportunityBook, OpportunityFilter, OpportunityStats};
use super::ledger::{BetReceipt, Ledger, PlacedBet, Session};
use crate::config::DetectionConfig;
use crate::market::QuoteSnapshot;
use crate::storage::Store;
use crate::strategy::stakes::{self, StakePlan};
use crate::strategy::DetectorSuite;
use crate::types::{CycleReport, EngineError, Opportunity, OpportunityKind, Quote};

/// Map a store failure, surfacing domain errors (version conflicts) as-is.
fn storage_error(e: anyhow::Error) -> EngineError {
    match e.downcast::<EngineError>() {
        Ok(domain) => domain,
        Err(e) => EngineError::Storage(e),
    }
}

pub struct OpportunityService<S: Store> {
    store: S,
    config: DetectionConfig,
    suite: DetectorSuite,
    /// Cycle lock. Held across every book write.
    ledger: Mutex<Ledger>,
}

impl<S: Store> OpportunityService<S> {
    pub fn new(store: S, config: DetectionConfig) -> Self {
        Self::with_suite(store, config, DetectorSuite::standard())
    }

    pub fn with_suite(store: S, config: DetectionConfig, suite: DetectorSuite) -> Self {
        Self {
            store,
            config,
            suite,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    // -- Quotes --

    /// Replace the stored quote set. Takes effect on the next cycle.
    pub async fn replace_quotes(&self, quotes: &[Quote]) -> Result<(), EngineError> {
        let _guard = self.ledger.lock().await;
        self.store.replace_quotes(quotes).await.map_err(storage_error)
    }

    /// Validated view of the stored quotes.
    pub async fn snapshot(&self) -> Result<QuoteSnapshot, EngineError> {
        let quotes = self.store.load_quotes().await.map_err(storage_error)?;
        Ok(QuoteSnapshot::new(quotes, Utc::now()))
    }

    // -- Compute cycle --

    pub async fn compute_cycle(&self) -> Result<CycleReport, EngineError> {
        self.compute_cycle_at(Utc::now()).await
    }

    /// Detect over the stored quotes, sweep expired entries, merge and
    /// persist, all as one critical section stamped with `now`.
    pub async fn compute_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, EngineError> {
        let _guard = self.ledger.lock().await;

        let quotes = self.store.load_quotes().await.map_err(storage_error)?;
        let snapshot = QuoteSnapshot::new(quotes, now);
        let mut output = self.suite.run(&snapshot, &self.config, now)?;

        let mut book = self.store.load_opportunities().await.map_err(storage_error)?;
        let base_version = book.version;
        let expired = book.sweep(now);
        let added = book.merge(std::mem::take(&mut output.opportunities));
        let version = book.commit();

        self.store
            .replace_opportunities(&book, base_version)
            .await
            .map_err(storage_error)?;

        let report = CycleReport {
            version,
            timestamp: now,
            quotes_considered: snapshot.len(),
            quotes_skipped: snapshot.skipped(),
            arbitrage: output.count(OpportunityKind::Arbitrage),
            middles: output.count(OpportunityKind::Middle),
            ev: output.count(OpportunityKind::Ev),
            low_hold: output.count(OpportunityKind::LowHold),
            added,
            expired,
            total_entries: book.len(),
            failed_detectors: output.failures.iter().map(|(kind, _)| kind.to_string()).collect(),
        };

        if !report.failed_detectors.is_empty() {
            warn!(failed = ?report.failed_detectors, "Cycle completed with failed detectors");
        }
        info!(
            version,
            arbitrage = report.arbitrage,
            middles = report.middles,
            ev = report.ev,
            low_hold = report.low_hold,
            added,
            expired,
            total = report.total_entries,
            "Cycle complete"
        );

        Ok(report)
    }

    // -- Queries --

    pub async fn book(&self) -> Result<OpportunityBook, EngineError> {
        self.store.load_opportunities().await.map_err(storage_error)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Opportunity>, EngineError> {
        Ok(self.book().await?.get(id).cloned())
    }

    pub async fn query(&self, filter: &OpportunityFilter) -> Result<Vec<Opportunity>, EngineError> {
        Ok(self.book().await?.query(filter))
    }

    pub async fn arbitrage_feed(
        &self,
        min_profit: f64,
        limit: usize,
        sport: Option<&str>,
    ) -> Result<Vec<Opportunity>, EngineError> {
        Ok(self.book().await?.arbitrage_feed(min_profit, limit, sport))
    }

    pub async fn stats(&self) -> Result<OpportunityStats, EngineError> {
        Ok(self.book().await?.stats())
    }

    // -- Mutations --

    pub async fn mark_removed(&self, id: &str) -> Result<(), EngineError> {
        let _guard = self.ledger.lock().await;
        let mut book = self.book().await?;
        let base_version = book.version;
        book.mark_removed(id)?;
        book.commit();
        self.store
            .replace_opportunities(&book, base_version)
            .await
            .map_err(storage_error)?;
        info!(opportunity_id = id, "Opportunity removed");
        Ok(())
    }

    /// Stake split for a known arbitrage, whatever its status.
    pub async fn calculate_stakes(&self, id: &str, total_stake: Decimal) -> Result<StakePlan, EngineError> {
        if total_stake <= Decimal::ZERO {
            return Err(EngineError::InvalidStake(total_stake));
        }
        let opp = self
            .get(id)
            .await?
            .ok_or_else(|| EngineError::OpportunityNotFound(id.to_string()))?;
        stakes::calculate_stakes(&opp, total_stake)
    }

    /// Full dataset reset: quotes, opportunities, sessions and bets.
    pub async fn reset(&self) -> Result<(), EngineError> {
        let mut ledger = self.ledger.lock().await;
        self.store.reset().await.map_err(storage_error)?;
        ledger.clear();
        warn!("All engine data reset");
        Ok(())
    }

    // -- Sessions and bets --

    pub async fn create_session(&self, user_name: &str) -> Session {
        self.ledger.lock().await.create_session(user_name, Utc::now())
    }

    pub async fn session(&self, session_id: &str) -> Option<Session> {
        self.ledger.lock().await.session(session_id).cloned()
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.ledger.lock().await.sessions().to_vec()
    }

    /// Stake an active arbitrage for a session, consuming the opportunity.
    ///
    /// Checks run in order: stake, session, opportunity, status. The book is
    /// persisted before the bets are recorded, so a store failure leaves
    /// neither side changed.
    pub async fn place_bet(
        &self,
        session_id: &str,
        opportunity_id: &str,
        total_stake: Decimal,
    ) -> Result<BetReceipt, EngineError> {
        if total_stake <= Decimal::ZERO {
            return Err(EngineError::InvalidStake(total_stake));
        }

        let mut ledger = self.ledger.lock().await;
        if ledger.session(session_id).is_none() {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }

        let mut book = self.book().await?;
        let opp = book
            .get(opportunity_id)
            .filter(|o| o.as_arbitrage().is_some())
            .cloned()
            .ok_or_else(|| EngineError::OpportunityNotFound(opportunity_id.to_string()))?;
        if !opp.is_active() {
            return Err(EngineError::OpportunityInactive {
                id: opp.id.clone(),
                status: opp.status,
            });
        }

        let plan = stakes::calculate_stakes(&opp, total_stake)?;

        let base_version = book.version;
        book.mark_removed(opportunity_id)?;
        book.commit();
        self.store
            .replace_opportunities(&book, base_version)
            .await
            .map_err(storage_error)?;

        ledger.record(session_id, &opp, &plan, Utc::now())
    }

    pub async fn bets_for_session(&self, session_id: &str) -> Vec<PlacedBet> {
        self.ledger
            .lock()
            .await
            .bets_for_session(session_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn bet(&self, bet_id: &str) -> Option<PlacedBet> {
        self.ledger.lock().await.bet(bet_id).cloned()
    }

    pub async fn bets(&self) -> Vec<PlacedBet> {
        self.ledger.lock().await.bets().to_vec()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, MockStore};
    use crate::strategy::{ArbitrageDetector, DetectionContext, Detector};
    use crate::types::{OpportunityStatus, Quote};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn make_quotes() -> Vec<Quote> {
        vec![
            Quote::new("T1", "Tennis", "Sinner vs Alcaraz", "Match Winner", "Book1", "Sinner", 2.10),
            Quote::new("T1", "Tennis", "Sinner vs Alcaraz", "Match Winner", "Book2", "Alcaraz", 2.05),
            Quote::new("B1", "Basketball", "Lakers vs Celtics", "Total Points", "Book1", "Over 215.5", 1.95),
            Quote::new("B1", "Basketball", "Lakers vs Celtics", "Total Points", "Book2", "Under 218.5", 1.90),
        ]
    }

    fn make_service() -> OpportunityService<MemoryStore> {
        OpportunityService::new(MemoryStore::with_quotes(make_quotes()), DetectionConfig::default())
    }

    async fn arbitrage_id(service: &OpportunityService<MemoryStore>) -> String {
        let hits = service
            .query(&OpportunityFilter::default().kind(OpportunityKind::Arbitrage))
            .await
            .unwrap();
        hits[0].id.clone()
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn kind(&self) -> OpportunityKind {
            OpportunityKind::Ev
        }

        fn detect(
            &self,
            _snapshot: &QuoteSnapshot,
            _ctx: &DetectionContext<'_>,
        ) -> Result<Vec<Opportunity>, EngineError> {
            panic!("boom")
        }
    }

    // -- Compute cycle --

    #[tokio::test]
    async fn test_compute_cycle_detects_and_persists() {
        let service = make_service();
        let report = service.compute_cycle().await.unwrap();

        assert_eq!(report.version, 1);
        assert_eq!(report.quotes_considered, 4);
        assert_eq!(report.arbitrage, 1);
        assert_eq!(report.middles, 1);
        assert_eq!(report.added, 2);
        assert_eq!(report.total_entries, 2);
        assert!(report.failed_detectors.is_empty());

        let book = service.book().await.unwrap();
        assert_eq!(book.version, 1);
        assert_eq!(book.len(), 2);
    }

    #[tokio::test]
    async fn test_immediate_rerun_is_idempotent() {
        let service = make_service();
        let now = Utc::now();

        service.compute_cycle_at(now).await.unwrap();
        let first = service.query(&OpportunityFilter::default()).await.unwrap();

        let report = service.compute_cycle_at(now).await.unwrap();
        let second = service.query(&OpportunityFilter::default()).await.unwrap();

        assert_eq!(report.added, 0);
        assert_eq!(report.expired, 0);
        assert_eq!(report.version, 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_duplicate_quote_rows_keep_every_middle() {
        let row = Quote::new("B1", "Basketball", "Lakers vs Celtics", "Total Points", "Book2", "Under 218.5", 1.90);
        let quotes = vec![
            Quote::new("B1", "Basketball", "Lakers vs Celtics", "Total Points", "Book1", "Over 215.5", 1.95),
            row.clone(),
            row,
        ];
        let service = OpportunityService::new(MemoryStore::with_quotes(quotes), DetectionConfig::default());
        let now = Utc::now();

        let report = service.compute_cycle_at(now).await.unwrap();
        assert_eq!(report.middles, 2);
        assert_eq!(report.added, 2);
        assert_eq!(service.book().await.unwrap().len(), 2);

        let report = service.compute_cycle_at(now).await.unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.total_entries, 2);
    }

    #[tokio::test]
    async fn test_cycle_expires_stale_entries() {
        let service = make_service();
        let now = Utc::now();
        service.compute_cycle_at(now).await.unwrap();

        service.replace_quotes(&[]).await.unwrap();
        let report = service.compute_cycle_at(now + Duration::hours(3)).await.unwrap();

        assert_eq!(report.expired, 2);
        assert_eq!(report.added, 0);
        assert_eq!(report.total_entries, 2);
        assert!(service.query(&OpportunityFilter::default()).await.unwrap().is_empty());

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.by_status[&OpportunityStatus::Expired], 2);
    }

    #[tokio::test]
    async fn test_detector_panic_does_not_block_others() {
        let suite = DetectorSuite::with_detectors(vec![Box::new(PanickingDetector), Box::new(ArbitrageDetector)]);
        let service = OpportunityService::with_suite(
            MemoryStore::with_quotes(make_quotes()),
            DetectionConfig::default(),
            suite,
        );
        let report = service.compute_cycle().await.unwrap();
        assert_eq!(report.failed_detectors, vec!["ev".to_string()]);
        assert_eq!(report.arbitrage, 1);
        assert_eq!(service.book().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_horizon_aborts_cycle_without_writing() {
        let config = DetectionConfig { expiry_horizon_minutes: 0, ..DetectionConfig::default() };
        let service = OpportunityService::new(MemoryStore::with_quotes(make_quotes()), config);
        assert!(matches!(service.compute_cycle().await, Err(EngineError::Config(_))));
        assert_eq!(service.book().await.unwrap().version, 0);
    }

    // -- Store failures --

    #[tokio::test]
    async fn test_quote_load_failure_is_reported() {
        let mut store = MockStore::new();
        store
            .expect_load_quotes()
            .returning(|| Err(anyhow::anyhow!("disk on fire")));
        store.expect_replace_opportunities().times(0);

        let service = OpportunityService::new(store, DetectionConfig::default());
        match service.compute_cycle().await {
            Err(EngineError::Storage(e)) => assert!(e.to_string().contains("disk on fire")),
            other => panic!("expected storage error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_book_write_failure_is_reported() {
        let mut store = MockStore::new();
        store.expect_load_quotes().returning(|| Ok(make_quotes()));
        store
            .expect_load_opportunities()
            .returning(|| Ok(OpportunityBook::default()));
        store
            .expect_replace_opportunities()
            .withf(|book, expected| book.version == 1 && *expected == 0)
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("write failed")));

        let service = OpportunityService::new(store, DetectionConfig::default());
        assert!(matches!(service.compute_cycle().await, Err(EngineError::Storage(_))));
    }

    #[tokio::test]
    async fn test_version_conflict_surfaces_as_domain_error() {
        let mut store = MockStore::new();
        store.expect_load_quotes().returning(|| Ok(Vec::new()));
        store
            .expect_load_opportunities()
            .returning(|| Ok(OpportunityBook::default()));
        store.expect_replace_opportunities().returning(|_, expected| {
            Err(anyhow::anyhow!(EngineError::VersionConflict { expected, found: expected + 1 }))
        });

        let service = OpportunityService::new(store, DetectionConfig::default());
        assert!(matches!(
            service.compute_cycle().await,
            Err(EngineError::VersionConflict { expected: 0, found: 1 })
        ));
    }

    // -- Lookups and mutations --

    #[tokio::test]
    async fn test_get_and_mark_removed() {
        let service = make_service();
        service.compute_cycle().await.unwrap();
        let id = arbitrage_id(&service).await;

        assert!(service.get(&id).await.unwrap().is_some());
        assert!(service.get("missing").await.unwrap().is_none());

        service.mark_removed(&id).await.unwrap();
        let opp = service.get(&id).await.unwrap().unwrap();
        assert_eq!(opp.status, OpportunityStatus::Removed);
        assert!(matches!(
            service.mark_removed(&id).await,
            Err(EngineError::OpportunityInactive { .. })
        ));
        assert!(service.arbitrage_feed(0.0, 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_calculate_stakes() {
        let service = make_service();
        service.compute_cycle().await.unwrap();
        let id = arbitrage_id(&service).await;

        let plan = service.calculate_stakes(&id, dec!(100)).await.unwrap();
        assert_eq!(plan.legs[0].stake, dec!(49.40));
        assert_eq!(plan.legs[1].stake, dec!(50.60));

        assert!(matches!(
            service.calculate_stakes("missing", dec!(100)).await,
            Err(EngineError::OpportunityNotFound(_))
        ));
        assert!(matches!(
            service.calculate_stakes("missing", dec!(0)).await,
            Err(EngineError::InvalidStake(_))
        ));

        let middle = service
            .query(&OpportunityFilter::default().kind(OpportunityKind::Middle))
            .await
            .unwrap();
        assert!(matches!(
            service.calculate_stakes(&middle[0].id, dec!(100)).await,
            Err(EngineError::OpportunityNotFound(_))
        ));
    }

    // -- Bets --

    #[tokio::test]
    async fn test_place_bet_consumes_opportunity() {
        let service = make_service();
        service.compute_cycle().await.unwrap();
        let id = arbitrage_id(&service).await;
        let session = service.create_session("pierre").await;

        let receipt = service.place_bet(&session.session_id, &id, dec!(100)).await.unwrap();
        assert_eq!(receipt.bets.len(), 2);
        assert_eq!(receipt.plan.expected_return, dec!(103.73));

        let opp = service.get(&id).await.unwrap().unwrap();
        assert_eq!(opp.status, OpportunityStatus::Removed);

        let session = service.session(&session.session_id).await.unwrap();
        assert_eq!(session.total_bets, 1);
        assert_eq!(session.total_stake, dec!(100));
        assert_eq!(service.bets_for_session(&session.session_id).await.len(), 2);
        assert!(service.bet(&receipt.bets[0].bet_id).await.is_some());

        // Consumed opportunities cannot be bet again
        assert!(matches!(
            service.place_bet(&session.session_id, &id, dec!(100)).await,
            Err(EngineError::OpportunityInactive { .. })
        ));
        assert_eq!(service.bets().await.len(), 2);
    }

    #[tokio::test]
    async fn test_place_bet_validation_order() {
        let service = make_service();
        service.compute_cycle().await.unwrap();
        let id = arbitrage_id(&service).await;
        let session = service.create_session("").await;

        assert!(matches!(
            service.place_bet("missing", "missing", dec!(-1)).await,
            Err(EngineError::InvalidStake(_))
        ));
        assert!(matches!(
            service.place_bet("missing", &id, dec!(100)).await,
            Err(EngineError::SessionNotFound(_))
        ));
        assert!(matches!(
            service.place_bet(&session.session_id, "missing", dec!(100)).await,
            Err(EngineError::OpportunityNotFound(_))
        ));
        assert!(service.bets().await.is_empty());
        assert!(service.get(&id).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_place_bet_on_expired_opportunity() {
        let service = make_service();
        let now = Utc::now();
        service.compute_cycle_at(now).await.unwrap();
        let id = arbitrage_id(&service).await;
        let session = service.create_session("pierre").await;

        service.compute_cycle_at(now + Duration::hours(3)).await.unwrap();
        assert!(matches!(
            service.place_bet(&session.session_id, &id, dec!(100)).await,
            Err(EngineError::OpportunityInactive { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let service = make_service();
        service.compute_cycle().await.unwrap();
        service.create_session("pierre").await;

        service.reset().await.unwrap();
        assert!(service.book().await.unwrap().is_empty());
        assert!(service.snapshot().await.unwrap().is_empty());
        assert!(service.sessions().await.is_empty());
    }
}
