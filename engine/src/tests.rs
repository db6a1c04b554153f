//! Unit tests for the engine crate.

use super::*;

fn record(order_id: u64, quantity: i64, unit_price: f64) -> Record {
    Record::new(order_id, quantity, unit_price)
}

fn size(n: usize) -> ChunkSize {
    ChunkSize::new(n).expect("non-zero chunk size")
}

/// The worked example used throughout: two valid records, one negative
/// quantity, one more valid record.
fn mixed_records() -> Vec<Record> {
    vec![
        record(1, 2, 10.0),
        record(2, 3, 5.0),
        record(3, -1, 20.0),
        record(4, 4, 2.0),
    ]
}

#[test]
fn chunk_revenue_sums_valid_records() {
    let records = [record(1, 2, 10.0), record(2, 3, 5.0)];
    let revenue = chunk_revenue(ChunkIndex::new(0), 0, &records).expect("valid chunk");
    assert_eq!(revenue, 35.0);
}

#[test]
fn chunk_revenue_reports_global_indices() {
    let records = [record(3, -1, 20.0), record(4, 4, 2.0)];
    let failure = chunk_revenue(ChunkIndex::new(1), 2, &records).expect_err("invalid chunk");

    assert_eq!(failure.chunk(), ChunkIndex::new(1));
    assert_eq!(
        failure.violations(),
        &[RecordViolation {
            record: 2,
            kind: ViolationKind::NegativeQuantity { quantity: -1 },
        }]
    );
}

#[test]
fn chunk_revenue_lists_every_violation() {
    let records = [record(1, -2, 3.0), record(2, 1, 1.0), record(3, -1, -4.5)];
    let failure = chunk_revenue(ChunkIndex::new(0), 0, &records).expect_err("invalid chunk");

    // Record 2 violates both fields and contributes one violation per field.
    assert_eq!(failure.violations().len(), 3);
    assert_eq!(failure.violations()[0].record, 0);
    assert_eq!(failure.violations()[1].record, 2);
    assert_eq!(failure.violations()[2].record, 2);
    assert_eq!(
        failure.violations()[2].kind,
        ViolationKind::NegativeUnitPrice { unit_price: -4.5 }
    );
}

#[tokio::test]
async fn total_matches_sequential_sum() {
    let records: Vec<Record> = (0..100).map(|i| record(i, i as i64, 0.5)).collect();
    let sequential: f64 = records.iter().map(Record::revenue).sum();

    let outcome = aggregate(records, size(7)).await;
    assert_eq!(outcome, AggregateOutcome::Total(sequential));
}

#[tokio::test]
async fn empty_input_totals_zero() {
    let outcome = aggregate(Vec::new(), ChunkSize::DEFAULT).await;
    assert_eq!(outcome, AggregateOutcome::Total(0.0));
}

#[tokio::test]
async fn chunk_size_larger_than_input_still_totals() {
    let records = vec![record(1, 2, 10.0), record(2, 3, 5.0)];
    let outcome = aggregate(records, size(100)).await;
    assert_eq!(outcome, AggregateOutcome::Total(35.0));
}

#[tokio::test]
async fn negative_quantity_fails_owning_chunk() {
    let outcome = aggregate(mixed_records(), size(2)).await;

    let report = outcome.failures().expect("failed outcome");
    assert_eq!(report.len(), 1);

    let failure = &report.failures()[0];
    assert_eq!(failure.chunk(), ChunkIndex::new(1));
    assert_eq!(
        failure.violations(),
        &[RecordViolation {
            record: 2,
            kind: ViolationKind::NegativeQuantity { quantity: -1 },
        }]
    );
    // The valid chunk's revenue (35.0) must not leak out as a partial total.
    assert!(outcome.total().is_none());
}

#[tokio::test]
async fn single_chunk_fails_atomically() {
    // Same records in one chunk: three valid records cannot save it.
    let outcome = aggregate(mixed_records(), size(4)).await;

    let report = outcome.failures().expect("failed outcome");
    assert_eq!(report.len(), 1);
    assert_eq!(report.failures()[0].chunk(), ChunkIndex::new(0));
}

#[tokio::test]
async fn negative_price_fails_owning_chunk() {
    let records = vec![record(1, 2, 10.0), record(2, 3, -5.0)];
    let outcome = aggregate(records, size(2)).await;

    let report = outcome.failures().expect("failed outcome");
    assert_eq!(
        report.failures()[0].violations(),
        &[RecordViolation {
            record: 1,
            kind: ViolationKind::NegativeUnitPrice { unit_price: -5.0 },
        }]
    );
}

#[tokio::test]
async fn disjoint_failures_reported_per_chunk_in_order() {
    // Invalid records in chunks 0 and 2; chunks 1 and 3 are fine.
    let records = vec![
        record(1, 1, 1.0),
        record(2, -1, 1.0),
        record(3, 1, 1.0),
        record(4, 1, 1.0),
        record(5, 1, 1.0),
        record(6, -2, 1.0),
        record(7, 1, 1.0),
        record(8, 1, 1.0),
    ];
    let outcome = aggregate(records, size(2)).await;

    let report = outcome.failures().expect("failed outcome");
    let chunks: Vec<_> = report.iter().map(ChunkFailure::chunk).collect();
    assert_eq!(chunks, vec![ChunkIndex::new(0), ChunkIndex::new(2)]);

    // One chunk's failure must not suppress or merge into the other's.
    assert_eq!(report.failures()[0].violations()[0].record, 1);
    assert_eq!(report.failures()[1].violations()[0].record, 5);
}

#[tokio::test]
async fn aggregate_is_idempotent() {
    let first = aggregate(mixed_records(), size(2)).await;
    let second = aggregate(mixed_records(), size(2)).await;
    assert_eq!(first, second);

    let valid = vec![record(1, 2, 10.0), record(2, 3, 5.0)];
    let first = aggregate(valid.clone(), size(1)).await;
    let second = aggregate(valid, size(1)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn spawned_task_joins_with_total() {
    let records = vec![record(1, 2, 10.0), record(2, 3, 5.0)];
    let task = AggregateTask::spawn(records, ChunkSize::DEFAULT);
    assert!(!task.is_finished());

    let outcome = task.join().await.expect("not cancelled");
    assert_eq!(outcome, AggregateOutcome::Total(35.0));
}

#[tokio::test]
async fn spawned_task_joins_with_failures() {
    let task = AggregateTask::spawn(mixed_records(), size(2));
    let outcome = task.join().await.expect("not cancelled");

    let report = outcome.failures().expect("failed outcome");
    assert_eq!(report.len(), 1);
    assert_eq!(report.failures()[0].chunk(), ChunkIndex::new(1));
}

#[tokio::test]
async fn aborted_task_reports_cancelled() {
    // On the current-thread test runtime nothing has been polled yet, so the
    // abort lands before any chunk can complete.
    let records: Vec<Record> = (0..64).map(|i| record(i, 1, 1.0)).collect();
    let task = AggregateTask::spawn(records, size(1));
    task.abort();

    assert_eq!(task.join().await, Err(AggregateCancelled));
}

#[tokio::test]
async fn cancellation_is_not_a_failure_report() {
    let task = AggregateTask::spawn(mixed_records(), size(2));
    task.abort();

    let cancelled = task.join().await.expect_err("cancelled");
    assert_eq!(
        cancelled.to_string(),
        "aggregation was cancelled before completion"
    );
}
