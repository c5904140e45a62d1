use chrono::{Duration, Utc};

use oddsedge::engine::OpportunityFilter;
use oddsedge::storage::{JsonFileStore, Store, OPPORTUNITIES_FILE, QUOTES_FILE};
use oddsedge::types::{OpportunityKind, OpportunityStatus};

use crate::{make_quotes, make_service, ScratchDir};

#[tokio::test]
async fn test_cycle_writes_both_files() {
    let dir = ScratchDir::new();
    let service = make_service(&dir);
    service.replace_quotes(&make_quotes()).await.unwrap();

    let report = service.compute_cycle().await.unwrap();
    assert_eq!(report.arbitrage, 1);
    assert_eq!(report.middles, 1);
    assert_eq!(report.added, 2);

    assert!(dir.path().join(QUOTES_FILE).exists());
    assert!(dir.path().join(OPPORTUNITIES_FILE).exists());
}

#[tokio::test]
async fn test_book_survives_a_restart() {
    let dir = ScratchDir::new();
    let now = Utc::now();

    let first = make_service(&dir);
    first.replace_quotes(&make_quotes()).await.unwrap();
    first.compute_cycle_at(now).await.unwrap();
    let before = first.query(&OpportunityFilter::default()).await.unwrap();
    drop(first);

    let second = make_service(&dir);
    let book = second.book().await.unwrap();
    assert_eq!(book.version, 1);
    assert_eq!(second.query(&OpportunityFilter::default()).await.unwrap(), before);

    // Same quotes, same instant: nothing new after a reload from disk
    let report = second.compute_cycle_at(now).await.unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(report.version, 2);
    assert_eq!(report.total_entries, 2);
}

#[tokio::test]
async fn test_expired_entries_stay_on_disk() {
    let dir = ScratchDir::new();
    let service = make_service(&dir);
    let now = Utc::now();

    service.replace_quotes(&make_quotes()).await.unwrap();
    service.compute_cycle_at(now).await.unwrap();
    service.replace_quotes(&[]).await.unwrap();
    let report = service.compute_cycle_at(now + Duration::hours(3)).await.unwrap();
    assert_eq!(report.expired, 2);

    let reloaded = JsonFileStore::new(dir.path()).load_opportunities().await.unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded
        .entries
        .iter()
        .all(|o| o.status == OpportunityStatus::Expired));

    let history = service
        .query(&OpportunityFilter::default().status(None))
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_reappearing_quotes_open_a_new_entry() {
    let dir = ScratchDir::new();
    let service = make_service(&dir);
    let now = Utc::now();

    service.replace_quotes(&make_quotes()).await.unwrap();
    service.compute_cycle_at(now).await.unwrap();

    let later = now + Duration::hours(3);
    let report = service.compute_cycle_at(later).await.unwrap();
    assert_eq!(report.expired, 2);
    assert_eq!(report.added, 2);
    assert_eq!(report.total_entries, 4);
    assert_eq!(service.query(&OpportunityFilter::default()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_feed_and_stats_over_file_store() {
    let dir = ScratchDir::new();
    let service = make_service(&dir);
    service.replace_quotes(&make_quotes()).await.unwrap();
    service.compute_cycle().await.unwrap();

    let feed = service.arbitrage_feed(0.0, 10, Some("Tennis")).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert!((feed[0].roi - 3.7349).abs() < 1e-3);
    assert!(service.arbitrage_feed(0.0, 10, Some("Soccer")).await.unwrap().is_empty());

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_kind[&OpportunityKind::Arbitrage], 1);
    assert_eq!(stats.by_kind[&OpportunityKind::Middle], 1);
}

#[tokio::test]
async fn test_mark_removed_persists() {
    let dir = ScratchDir::new();
    let service = make_service(&dir);
    service.replace_quotes(&make_quotes()).await.unwrap();
    service.compute_cycle().await.unwrap();

    let id = service.arbitrage_feed(0.0, 1, None).await.unwrap()[0].id.clone();
    service.mark_removed(&id).await.unwrap();

    let reopened = make_service(&dir);
    let opp = reopened.get(&id).await.unwrap().unwrap();
    assert_eq!(opp.status, OpportunityStatus::Removed);
}

#[tokio::test]
async fn test_reset_clears_the_data_dir() {
    let dir = ScratchDir::new();
    let service = make_service(&dir);
    service.replace_quotes(&make_quotes()).await.unwrap();
    service.compute_cycle().await.unwrap();

    service.reset().await.unwrap();
    assert!(service.snapshot().await.unwrap().is_empty());
    assert_eq!(service.book().await.unwrap().version, 0);
    assert!(!dir.path().join(OPPORTUNITIES_FILE).exists());
}
