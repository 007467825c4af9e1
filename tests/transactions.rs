//! Transaction integration tests
//!
//! Exercise the manager with its reaper task running, through the public API.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use vibemq_delivery::config::TransactionConfig;
use vibemq_delivery::message::Message;
use vibemq_delivery::selector::Value;
use vibemq_delivery::transaction::{
    MemoryDestination, TransactionError, TransactionManager, TransactionState,
};

fn manager(expiry: Duration) -> Arc<TransactionManager> {
    let manager = TransactionManager::new(TransactionConfig {
        expiry,
        reaper_interval: Duration::from_millis(10),
        ..TransactionConfig::default()
    });
    manager.start();
    manager
}

fn order(sequence: i64) -> Message {
    Message::builder(0).data("sequence", sequence).build()
}

fn sequences(destination: &MemoryDestination) -> Vec<i64> {
    destination
        .messages()
        .iter()
        .filter_map(|m| match m.data("sequence") {
            Some(Value::Int(n)) => Some(*n),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_commit_applies_writes_in_order() {
    let manager = manager(Duration::from_secs(30));
    let orders = Arc::new(MemoryDestination::new("orders"));
    let audit = Arc::new(MemoryDestination::new("audit"));

    let tx = manager.start_transaction("checkout-1").unwrap();
    for n in 1..=5 {
        tx.add(orders.clone(), order(n)).unwrap();
        if n % 2 == 0 {
            tx.add(audit.clone(), order(n * 10)).unwrap();
        }
    }
    assert_eq!(tx.pending_writes(), 7);
    assert!(orders.is_empty());

    assert_eq!(tx.commit().await.unwrap(), 7);
    assert_eq!(sequences(&orders), vec![1, 2, 3, 4, 5]);
    assert_eq!(sequences(&audit), vec![20, 40]);
    assert_eq!(tx.state(), TransactionState::Committed);
    assert!(manager.is_empty());

    manager.stop();
}

#[tokio::test]
async fn test_expired_transaction_cannot_commit() {
    let manager = manager(Duration::from_millis(30));
    let orders = Arc::new(MemoryDestination::new("orders"));

    let tx = manager.start_transaction("slow-client").unwrap();
    tx.add(orders.clone(), order(1)).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(manager.find("slow-client").is_none());
    assert_eq!(tx.state(), TransactionState::Aborted);
    match tx.commit().await {
        Err(TransactionError::AlreadyClosed(id)) => assert_eq!(id, "slow-client"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(orders.is_empty());

    // The id is free again once the stale transaction is gone
    let retry = manager.start_transaction("slow-client").unwrap();
    retry.add(orders.clone(), order(2)).unwrap();
    assert_eq!(retry.commit().await.unwrap(), 1);
    assert_eq!(sequences(&orders), vec![2]);

    manager.stop();
}

#[tokio::test]
async fn test_concurrent_transactions_are_isolated() {
    let manager = manager(Duration::from_secs(30));
    let orders = Arc::new(MemoryDestination::new("orders"));

    let mut handles = Vec::new();
    for client in 0..4i64 {
        let manager = manager.clone();
        let orders = orders.clone();
        handles.push(tokio::spawn(async move {
            let tx = manager
                .start_transaction(&format!("client-{}", client))
                .unwrap();
            for n in 0..10 {
                tx.add(orders.clone(), order(client * 100 + n)).unwrap();
            }
            if client % 2 == 0 {
                tx.commit().await.map(|_| ())
            } else {
                tx.abort()
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut committed = sequences(&orders);
    assert_eq!(committed.len(), 20);
    committed.sort_unstable();
    assert!(committed.iter().all(|n| n / 100 == 0 || n / 100 == 2));
    assert!(manager.is_empty());

    manager.stop();
}
