//! Allocation behavior through the public service.
//!
//! Run with: cargo test -p folio-ledger --test allocation

mod common;

use std::collections::HashSet;
use std::time::Duration;

use folio_core::{DocumentType, FolioError, OperationKind, SeriesDefinition, SeriesKey};
use folio_ledger::{FolioService, ServiceSettings};

use common::{configured, memory_service, ticket_a, totals, TestStore, CASHIER};

// =============================================================================
// Sequential
// =============================================================================

#[tokio::test]
async fn first_ticket_is_formatted() {
    let service = memory_service().await;
    let key = configured(&service, ticket_a()).await;

    let allocation = service.allocate_next(&key, CASHIER).await.unwrap();

    assert_eq!(allocation.number, 1);
    assert_eq!(allocation.formatted_number, "TKT-A-000001");
    assert_eq!(allocation.document_type, DocumentType::Ticket);
    assert_eq!(allocation.series, "A");
}

#[tokio::test]
async fn sequential_allocations_are_contiguous() {
    let service = memory_service().await;
    let key = configured(
        &service,
        SeriesDefinition {
            start: Some(40),
            ..ticket_a()
        },
    )
    .await;

    let mut numbers = Vec::new();
    for _ in 0..25 {
        numbers.push(service.allocate_next(&key, CASHIER).await.unwrap().number);
    }

    assert_eq!(numbers, (40..65).collect::<Vec<_>>());
}

#[tokio::test]
async fn series_are_numbered_independently() {
    let service = memory_service().await;
    let a = configured(&service, ticket_a()).await;
    let b = configured(
        &service,
        SeriesDefinition {
            series: "B".to_string(),
            ..ticket_a()
        },
    )
    .await;

    service.allocate_next(&a, CASHIER).await.unwrap();
    service.allocate_next(&a, CASHIER).await.unwrap();
    let first_b = service.allocate_next(&b, CASHIER).await.unwrap();

    assert_eq!(first_b.number, 1);
    assert_eq!(first_b.formatted_number, "TKT-B-000001");
}

#[tokio::test]
async fn allocation_is_logged() {
    let service = memory_service().await;
    let key = configured(&service, ticket_a()).await;

    service.allocate_next(&key, CASHIER).await.unwrap();
    service.allocate_next(&key, CASHIER).await.unwrap();

    let history = service.operation_history(&key, 10).await.unwrap();
    let allocations: Vec<_> = history
        .iter()
        .filter(|r| r.operation == OperationKind::Allocate)
        .collect();
    assert_eq!(allocations.len(), 2);

    let second = allocations
        .iter()
        .find(|r| r.new_number == Some(2))
        .unwrap();
    assert_eq!(second.prev_number, Some(1));
    assert_eq!(second.actor, CASHIER);
    assert_eq!(second.terminal_origin, "pos-01");
}

// =============================================================================
// Concurrent
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_concurrent_callers_get_one_through_five() {
    let store = TestStore::new();
    let service = store.service("pos-01").await;
    let key = configured(&service, ticket_a()).await;

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let service = service.clone();
            let key = key.clone();
            tokio::spawn(async move { service.allocate_next(&key, CASHIER).await })
        })
        .collect();

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap().number);
    }
    numbers.sort_unstable();

    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    let counter = service.get_series(&key).await.unwrap().unwrap();
    assert_eq!(counter.current_value, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_concurrent_callers_never_share_a_number() {
    let store = TestStore::new();
    let service = store.service("pos-01").await;
    let key = configured(&service, ticket_a()).await;
    let callers = 64;

    let handles: Vec<_> = (0..callers)
        .map(|i| {
            let service = service.clone();
            let key = key.clone();
            tokio::spawn(async move {
                service
                    .allocate_next(&key, &format!("cashier-{i}"))
                    .await
                    .unwrap()
                    .number
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        assert!(seen.insert(handle.await.unwrap()), "number handed out twice");
    }

    let expected: HashSet<i64> = (1..=callers).collect();
    assert_eq!(seen, expected);
}

// =============================================================================
// Bounds and Failures
// =============================================================================

#[tokio::test]
async fn exhausted_series_recovers_after_raising_max() {
    let service = memory_service().await;
    let key = configured(
        &service,
        SeriesDefinition {
            max: 3,
            ..ticket_a()
        },
    )
    .await;

    for expected in 1..=3 {
        assert_eq!(service.allocate_next(&key, CASHIER).await.unwrap().number, expected);
    }

    let err = service.allocate_next(&key, CASHIER).await.unwrap_err();
    assert!(matches!(
        err.as_folio(),
        Some(FolioError::SequenceExhausted { current: 4, max: 3, .. })
    ));
    assert_eq!(
        service.get_series(&key).await.unwrap().unwrap().current_value,
        4
    );

    let raised = service.raise_max(&key, 10, "admin").await.unwrap();
    assert_eq!(raised.max_value, 10);
    assert_eq!(service.allocate_next(&key, CASHIER).await.unwrap().number, 4);

    let history = service.operation_history(&key, 20).await.unwrap();
    assert!(history.iter().any(|r| r.operation == OperationKind::Error
        && r.description.starts_with("SEQUENCE_EXHAUSTED")));
    assert!(history.iter().any(|r| r.operation == OperationKind::Recover
        && r.prev_number == Some(3)
        && r.new_number == Some(10)));
}

#[tokio::test]
async fn max_cannot_be_lowered() {
    let service = memory_service().await;
    let key = configured(&service, ticket_a()).await;

    assert!(service.raise_max(&key, 10, "admin").await.is_err());
    assert!(service.raise_max(&key, 10_000_000, "admin").await.is_err());
    assert_eq!(
        service.get_series(&key).await.unwrap().unwrap().max_value,
        999_999
    );
}

#[tokio::test]
async fn unknown_series_is_rejected() {
    let service = memory_service().await;
    let key = SeriesKey::new(DocumentType::CreditNote, "R1");

    let err = service.allocate_next(&key, CASHIER).await.unwrap_err();
    assert!(matches!(err.as_folio(), Some(FolioError::UnknownSeries { .. })));
    assert_eq!(err.code(), "UNKNOWN_SERIES");
}

#[tokio::test]
async fn blank_actor_is_rejected_before_the_gate() {
    let service = memory_service().await;
    let key = configured(&service, ticket_a()).await;

    let err = service.allocate_next(&key, "  ").await.unwrap_err();
    assert!(matches!(err.as_folio(), Some(FolioError::Validation(_))));
    assert_eq!(
        service.get_series(&key).await.unwrap().unwrap().current_value,
        1
    );
}

#[tokio::test]
async fn queued_caller_times_out_without_consuming() {
    let store = TestStore::new();
    let db = store.open().await;
    let service = FolioService::new(
        db,
        ServiceSettings::new("pos-01").gate_timeout(Duration::from_millis(30)),
    );
    let key = configured(&service, ticket_a()).await;

    let held = service.allocator().gate().acquire(&key, None).await.unwrap();
    let err = service.allocate_next(&key, CASHIER).await.unwrap_err();
    assert!(matches!(err.as_folio(), Some(FolioError::GateTimeout { .. })));
    drop(held);

    assert_eq!(service.allocate_next(&key, CASHIER).await.unwrap().number, 1);
}

#[tokio::test]
async fn per_call_timeout_applies_without_a_service_default() {
    let service = memory_service().await;
    let key = configured(&service, ticket_a()).await;
    assert_eq!(service.allocator().gate_timeout(), None);

    let held = service.allocator().gate().acquire(&key, None).await.unwrap();
    let err = service
        .allocate_next_within(&key, CASHIER, Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err.as_folio(), Some(FolioError::GateTimeout { .. })));
    let err = service
        .issue_next_within(&key, totals(100, 10), CASHIER, Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "GATE_TIMEOUT");
    drop(held);

    let allocation = service
        .allocate_next_within(&key, CASHIER, Duration::from_millis(20))
        .await
        .unwrap();
    assert_eq!(allocation.number, 1);

    let history = service.operation_history(&key, 10).await.unwrap();
    assert_eq!(
        history
            .iter()
            .filter(|r| r.description.starts_with("GATE_TIMEOUT"))
            .count(),
        2
    );
}
