//! Concurrent chunked aggregation for Tally.
//!
//! Partitions a record sequence into fixed-size chunks, evaluates every chunk
//! as its own task, and reports either one grand total or every chunk failure
//! together. No chunk's failure stops its siblings; the caller gets the full
//! picture or the full total, never a mix.

use std::panic::resume_unwind;
use std::sync::Arc;

use futures_util::future::{AbortHandle, Abortable, Aborted};
use thiserror::Error;
use tokio::task::JoinHandle;

// Re-export from the types crate for public API
pub use tally_types::{
    AggregateOutcome, ChunkFailure, ChunkIndex, ChunkSize, ChunkSizeError, FailureReport, Record,
    RecordViolation, ViolationKind, chunk_ranges,
};

#[cfg(test)]
mod tests;

// ============================================================================
// Per-chunk evaluation
// ============================================================================

/// Evaluate one chunk of records.
///
/// Chunk-atomic: any invalid record voids the whole chunk, and the failure
/// names every offending record by its global input index (`offset` is the
/// global index of the chunk's first record). A record with a negative
/// quantity and a negative unit price contributes one violation per field.
pub fn chunk_revenue(
    chunk: ChunkIndex,
    offset: usize,
    records: &[Record],
) -> Result<f64, ChunkFailure> {
    let mut violations = Vec::new();
    for (position, record) in records.iter().enumerate() {
        if record.quantity < 0 {
            violations.push(RecordViolation {
                record: offset + position,
                kind: ViolationKind::NegativeQuantity {
                    quantity: record.quantity,
                },
            });
        }
        if record.unit_price < 0.0 {
            violations.push(RecordViolation {
                record: offset + position,
                kind: ViolationKind::NegativeUnitPrice {
                    unit_price: record.unit_price,
                },
            });
        }
    }

    match ChunkFailure::from_violations(chunk, violations) {
        Some(failure) => Err(failure),
        None => Ok(records.iter().map(Record::revenue).sum()),
    }
}

// ============================================================================
// Dispatch and join
// ============================================================================

/// A chunk task in flight, addressed by its chunk index.
#[derive(Debug)]
struct DispatchedChunk {
    chunk: ChunkIndex,
    handle: JoinHandle<Result<f64, ChunkFailure>>,
}

/// Spawn one task per chunk over a shared read-only view of the records.
///
/// Every task owns its own index range into the `Arc` slice; nothing is
/// mutated across tasks. Dispatch order matches chunk order, execution order
/// is up to the runtime.
fn dispatch_chunks(records: Vec<Record>, chunk_size: ChunkSize) -> Vec<DispatchedChunk> {
    let records: Arc<[Record]> = records.into();
    chunk_ranges(records.len(), chunk_size)
        .map(|(chunk, range)| {
            let records = Arc::clone(&records);
            let handle = tokio::spawn(async move {
                let offset = range.start;
                chunk_revenue(chunk, offset, &records[range])
            });
            tracing::debug!("Dispatched chunk {chunk}");
            DispatchedChunk { chunk, handle }
        })
        .collect()
}

/// Wait for every dispatched chunk, collecting successes and failures.
///
/// Awaiting in dispatch order keeps the failure report in chunk-index order
/// without ever short-circuiting: a failed chunk is recorded and the loop
/// moves on to the next handle.
async fn join_chunks(
    dispatched: Vec<DispatchedChunk>,
) -> Result<AggregateOutcome, AggregateCancelled> {
    let mut total = 0.0_f64;
    let mut failures = Vec::new();

    for DispatchedChunk { chunk, handle } in dispatched {
        match handle.await {
            Ok(Ok(revenue)) => {
                tracing::debug!("Chunk {chunk} complete: revenue {revenue}");
                total += revenue;
            }
            Ok(Err(failure)) => {
                tracing::warn!("Chunk failed: {failure}");
                failures.push(failure);
            }
            Err(join_error) => match join_error.try_into_panic() {
                // Chunk evaluation is pure arithmetic; a panic is a bug and
                // deserves to surface as one.
                Ok(payload) => resume_unwind(payload),
                Err(_cancelled) => return Err(AggregateCancelled),
            },
        }
    }

    match FailureReport::from_failures(failures) {
        Some(report) => {
            tracing::warn!("Aggregation failed: {report}");
            Ok(AggregateOutcome::Failed(report))
        }
        None => Ok(AggregateOutcome::Total(total)),
    }
}

// ============================================================================
// Aggregation entry points
// ============================================================================

/// Compute total revenue over `records`, evaluating chunks concurrently.
///
/// Spawns one task per chunk, then waits for every task to reach a terminal
/// state before producing an outcome. Returns [`AggregateOutcome::Total`]
/// only when every chunk succeeded, otherwise [`AggregateOutcome::Failed`]
/// with one entry per failed chunk in chunk-index order. An empty input
/// totals zero without dispatching anything.
pub async fn aggregate(records: Vec<Record>, chunk_size: ChunkSize) -> AggregateOutcome {
    if records.is_empty() {
        return AggregateOutcome::Total(0.0);
    }

    let dispatched = dispatch_chunks(records, chunk_size);
    match join_chunks(dispatched).await {
        Ok(outcome) => outcome,
        // The chunk handles never leave this function, so nothing can abort
        // them while the join loop is alive.
        Err(AggregateCancelled) => unreachable!("chunks owned by aggregate cannot be cancelled"),
    }
}

/// Aggregation was cancelled before every chunk reached a terminal state.
///
/// Distinct from a failure report: cancellation says nothing about the
/// validity of the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("aggregation was cancelled before completion")]
pub struct AggregateCancelled;

/// A running aggregation - existence proves chunks have been dispatched.
///
/// `spawn` dispatches every chunk task eagerly plus a join task; `abort`
/// cancels the join and every still-pending chunk together. Dropping the
/// handle detaches the work without cancelling it.
#[derive(Debug)]
pub struct AggregateTask {
    join_handle: JoinHandle<Result<Result<AggregateOutcome, AggregateCancelled>, Aborted>>,
    abort_handle: AbortHandle,
    chunk_aborts: Vec<tokio::task::AbortHandle>,
}

impl AggregateTask {
    /// Dispatch all chunk tasks and a join task over them.
    #[must_use]
    pub fn spawn(records: Vec<Record>, chunk_size: ChunkSize) -> Self {
        let dispatched = dispatch_chunks(records, chunk_size);
        let chunk_aborts = dispatched
            .iter()
            .map(|chunk| chunk.handle.abort_handle())
            .collect();

        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let abortable = Abortable::new(join_chunks(dispatched), abort_registration);
        let join_handle = tokio::spawn(abortable);

        Self {
            join_handle,
            abort_handle,
            chunk_aborts,
        }
    }

    /// Cancel the aggregation: the join task stops at its next poll and every
    /// chunk task that has not yet finished is aborted. `join` then reports
    /// [`AggregateCancelled`].
    pub fn abort(&self) {
        self.abort_handle.abort();
        for chunk in &self.chunk_aborts {
            chunk.abort();
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Wait for the aggregation to finish or be cancelled.
    pub async fn join(self) -> Result<AggregateOutcome, AggregateCancelled> {
        match self.join_handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(Aborted)) => Err(AggregateCancelled),
            Err(join_error) => match join_error.try_into_panic() {
                Ok(payload) => resume_unwind(payload),
                Err(_cancelled) => Err(AggregateCancelled),
            },
        }
    }
}
