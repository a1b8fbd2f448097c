//! Ledger integration tests: the economic scenarios agents actually
//! exercise, plus the snapshot round-trip law.

use agentos::{Ledger, TransactionKind};
use tempfile::TempDir;

#[tokio::test]
async fn charge_and_refund_round_trip() {
    let ledger = Ledger::new();
    ledger.create_account("A", 10.0).await.unwrap();

    let ok = ledger
        .charge("A", 3.5, TransactionKind::ApiCall, "x")
        .await
        .unwrap();
    assert!(ok);
    assert!((ledger.balance("A").await - 6.5).abs() < 1e-9);
    assert!((ledger.total_expenditure().await - 3.5).abs() < 1e-9);

    ledger
        .credit("A", 1.0, TransactionKind::Refund, "y")
        .await
        .unwrap();
    assert!((ledger.balance("A").await - 7.5).abs() < 1e-9);
    // Credits do not reduce recorded expenditure.
    assert!((ledger.total_expenditure().await - 3.5).abs() < 1e-9);
}

#[tokio::test]
async fn charging_the_exact_balance_empties_the_account() {
    let ledger = Ledger::new();
    ledger.create_account("A", 1.25).await.unwrap();
    let ok = ledger
        .charge("A", 1.25, TransactionKind::ToolUsage, "everything")
        .await
        .unwrap();
    assert!(ok);
    assert_eq!(ledger.balance("A").await, 0.0);

    // The very next charge is denied and leaves a forensic marker.
    let ok = ledger
        .charge("A", 0.01, TransactionKind::ApiCall, "one more")
        .await
        .unwrap();
    assert!(!ok);
    let history = ledger.transaction_history("A").await;
    assert_eq!(
        history.last().unwrap().kind,
        TransactionKind::AgentDeath
    );
}

#[tokio::test]
async fn snapshot_save_then_load_reproduces_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");

    let ledger = Ledger::new();
    ledger.create_account("A", 10.0).await.unwrap();
    ledger.create_account("B", 2.0).await.unwrap();
    ledger
        .charge("A", 4.0, TransactionKind::SpawnAgent, "spawn")
        .await
        .unwrap();
    ledger.transfer("A", "B", 1.0, "top-up").await.unwrap();
    ledger.save_to_file(&path).await.unwrap();

    let restored = Ledger::new();
    restored.load_from_file(&path).await.unwrap();
    assert_eq!(restored.balance("A").await, ledger.balance("A").await);
    assert_eq!(restored.balance("B").await, ledger.balance("B").await);
    assert_eq!(
        restored.total_expenditure().await,
        ledger.total_expenditure().await
    );
    assert_eq!(
        restored.transaction_history("A").await.len(),
        ledger.transaction_history("A").await.len()
    );
}

#[tokio::test]
async fn loading_a_missing_snapshot_starts_empty() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::new();
    ledger
        .load_from_file(&dir.path().join("absent.json"))
        .await
        .unwrap();
    assert_eq!(ledger.total_expenditure().await, 0.0);
}
