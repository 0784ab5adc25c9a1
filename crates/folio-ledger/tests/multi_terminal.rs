//! Several terminals sharing one store file.
//!
//! Each terminal has its own pool and its own gate, so only the store's
//! write lock keeps them apart.
//!
//! Run with: cargo test -p folio-ledger --test multi_terminal

mod common;

use std::collections::HashSet;

use folio_core::OperationKind;

use common::{configured, ticket_a, totals, TestStore};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn terminals_never_share_a_number() {
    let store = TestStore::new();
    let bar = store.service("pos-bar").await;
    let terrace = store.service("pos-terrace").await;
    let key = configured(&bar, ticket_a()).await;
    let per_terminal = 20;

    let mut handles = Vec::new();
    for service in [bar.clone(), terrace.clone()] {
        for _ in 0..per_terminal {
            let service = service.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let allocation = service.allocate_next(&key, "cashier").await.unwrap();
                (allocation.number, allocation.terminal_origin)
            }));
        }
    }

    let mut numbers = HashSet::new();
    let mut by_terminal = 0;
    for handle in handles {
        let (number, terminal) = handle.await.unwrap();
        assert!(numbers.insert(number), "number {number} handed out twice");
        if terminal == "pos-terrace" {
            by_terminal += 1;
        }
    }

    let total = 2 * per_terminal;
    assert_eq!(numbers, (1..=total).collect::<HashSet<i64>>());
    assert_eq!(by_terminal, per_terminal);

    let counter = terrace.get_series(&key).await.unwrap().unwrap();
    assert_eq!(counter.current_value, total + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn one_step_issue_across_terminals_leaves_no_gaps() {
    let store = TestStore::new();
    let bar = store.service("pos-bar").await;
    let terrace = store.service("pos-terrace").await;
    let key = configured(&bar, ticket_a()).await;

    let mut handles = Vec::new();
    for service in [bar.clone(), terrace.clone()] {
        for i in 0..10 {
            let service = service.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                service
                    .issue_next(&key, totals(1_000 + i, 100), "cashier")
                    .await
                    .unwrap()
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let report = bar.verify_integrity(&key).await.unwrap();
    assert_eq!(report.checked, 20);
    assert!(report.is_clean());
    assert_eq!(report.first_number, Some(1));
    assert_eq!(report.last_number, Some(20));
}

#[tokio::test]
async fn cache_of_idle_terminal_is_stale_but_allocation_is_not() {
    let store = TestStore::new();
    let bar = store.service("pos-bar").await;
    let terrace = store.service("pos-terrace").await;
    let key = configured(&bar, ticket_a()).await;

    // Warm the terrace cache, then let the bar move the counter.
    assert_eq!(terrace.get_series(&key).await.unwrap().unwrap().current_value, 1);
    for _ in 0..3 {
        bar.allocate_next(&key, "cashier").await.unwrap();
    }

    assert_eq!(terrace.get_series(&key).await.unwrap().unwrap().current_value, 1);
    assert_eq!(terrace.allocate_next(&key, "cashier").await.unwrap().number, 4);
    assert_eq!(terrace.get_series(&key).await.unwrap().unwrap().current_value, 5);
}

#[tokio::test]
async fn operation_log_records_each_terminal() {
    let store = TestStore::new();
    let bar = store.service("pos-bar").await;
    let terrace = store.service("pos-terrace").await;
    let key = configured(&bar, ticket_a()).await;

    bar.allocate_next(&key, "cashier").await.unwrap();
    terrace.allocate_next(&key, "cashier").await.unwrap();

    let terminals: HashSet<String> = bar
        .operation_history(&key, 10)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.operation == OperationKind::Allocate)
        .map(|r| r.terminal_origin)
        .collect();

    assert_eq!(
        terminals,
        HashSet::from(["pos-bar".to_string(), "pos-terrace".to_string()])
    );
}
