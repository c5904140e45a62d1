use rust_decimal_macros::dec;

use oddsedge::types::{EngineError, OpportunityStatus};

use crate::{make_quotes, make_service, ScratchDir};

#[tokio::test]
async fn test_place_bet_end_to_end() {
    let dir = ScratchDir::new();
    let service = make_service(&dir);
    service.replace_quotes(&make_quotes()).await.unwrap();
    service.compute_cycle().await.unwrap();

    let id = service.arbitrage_feed(0.0, 1, None).await.unwrap()[0].id.clone();
    let plan = service.calculate_stakes(&id, dec!(100)).await.unwrap();
    assert_eq!(plan.total_stake, dec!(100.00));
    assert_eq!(plan.expected_profit, dec!(3.73));

    let session = service.create_session("alice").await;
    let receipt = service.place_bet(&session.session_id, &id, dec!(100)).await.unwrap();
    assert_eq!(receipt.bets.len(), 2);
    assert_eq!(receipt.plan, plan);
    assert_eq!(receipt.sport, "Tennis");

    let session = service.session(&session.session_id).await.unwrap();
    assert_eq!(session.total_bets, 1);
    assert_eq!(session.total_stake, dec!(100.00));
    assert_eq!(service.bets_for_session(&session.session_id).await.len(), 2);

    // Consumed on disk, not just in memory
    let reopened = make_service(&dir);
    let opp = reopened.get(&id).await.unwrap().unwrap();
    assert_eq!(opp.status, OpportunityStatus::Removed);
}

#[tokio::test]
async fn test_second_placement_is_rejected() {
    let dir = ScratchDir::new();
    let service = make_service(&dir);
    service.replace_quotes(&make_quotes()).await.unwrap();
    service.compute_cycle().await.unwrap();

    let id = service.arbitrage_feed(0.0, 1, None).await.unwrap()[0].id.clone();
    let session = service.create_session("bob").await;
    service.place_bet(&session.session_id, &id, dec!(50)).await.unwrap();

    let err = service
        .place_bet(&session.session_id, &id, dec!(50))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::OpportunityInactive { status: OpportunityStatus::Removed, .. }
    ));
    assert_eq!(service.bets().await.len(), 2);

    // Stakes can still be worked out for the consumed entry
    assert!(service.calculate_stakes(&id, dec!(50)).await.is_ok());
}

#[tokio::test]
async fn test_consumed_arbitrage_returns_as_fresh_entry() {
    let dir = ScratchDir::new();
    let service = make_service(&dir);
    service.replace_quotes(&make_quotes()).await.unwrap();
    service.compute_cycle().await.unwrap();

    let id = service.arbitrage_feed(0.0, 1, None).await.unwrap()[0].id.clone();
    let session = service.create_session("carol").await;
    service.place_bet(&session.session_id, &id, dec!(20)).await.unwrap();

    // The removed entry no longer blocks its content key, so the
    // still-standing arbitrage comes back as a fresh entry.
    let report = service.compute_cycle().await.unwrap();
    assert_eq!(report.added, 1);
    let feed = service.arbitrage_feed(0.0, 10, None).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_ne!(feed[0].id, id);
}
