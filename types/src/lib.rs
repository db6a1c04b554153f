//! Core domain types for Tally.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the pipeline.

use std::fmt;
use std::num::NonZeroUsize;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Records
// ============================================================================

/// A single sales record, as produced by the upstream load-and-validate step.
///
/// Loading guarantees non-negative fields; the aggregation path still
/// re-checks signs so that one bad record voids its own chunk instead of
/// silently poisoning the total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub order_id: u64,
    pub quantity: i64,
    pub unit_price: f64,
}

impl Record {
    #[must_use]
    pub const fn new(order_id: u64, quantity: i64, unit_price: f64) -> Self {
        Self {
            order_id,
            quantity,
            unit_price,
        }
    }

    /// Revenue contribution of this record.
    #[must_use]
    pub fn revenue(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }
}

// ============================================================================
// Chunking
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("chunk size must be at least 1")]
pub struct ChunkSizeError;

/// Number of records evaluated together as one unit of concurrent work.
///
/// Zero is unrepresentable by construction, so partitioning never has to
/// handle a degenerate size at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct ChunkSize(NonZeroUsize);

impl ChunkSize {
    /// Default for callers with no sizing opinion.
    pub const DEFAULT: ChunkSize = match NonZeroUsize::new(2) {
        Some(size) => ChunkSize(size),
        None => unreachable!(),
    };

    pub fn new(size: usize) -> Result<Self, ChunkSizeError> {
        NonZeroUsize::new(size).map(Self).ok_or(ChunkSizeError)
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl TryFrom<usize> for ChunkSize {
    type Error = ChunkSizeError;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<ChunkSize> for usize {
    fn from(size: ChunkSize) -> Self {
        size.get()
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Zero-based position of a chunk in input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkIndex(usize);

impl ChunkIndex {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Partition `len` records into contiguous ranges of at most `size` records.
///
/// Ranges are non-overlapping, cover every index exactly once, and come out
/// in input order; the last range may be shorter. An empty input yields no
/// ranges at all.
pub fn chunk_ranges(
    len: usize,
    size: ChunkSize,
) -> impl Iterator<Item = (ChunkIndex, Range<usize>)> {
    let size = size.get();
    (0..len)
        .step_by(size)
        .enumerate()
        .map(move |(index, start)| (ChunkIndex::new(index), start..usize::min(start + size, len)))
}

// ============================================================================
// Failures
// ============================================================================

/// Why a record voided its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    #[error("negative quantity ({quantity})")]
    NegativeQuantity { quantity: i64 },
    #[error("negative unit price ({unit_price})")]
    NegativeUnitPrice { unit_price: f64 },
}

/// A single invalid record, addressed by its global index in the input.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
#[error("record {record}: {kind}")]
pub struct RecordViolation {
    pub record: usize,
    pub kind: ViolationKind,
}

/// Chunk-atomic failure: one invalid record voids the whole chunk.
///
/// Carries every violation found in the chunk, not just the first. The
/// violation list is non-empty by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    chunk: ChunkIndex,
    violations: Vec<RecordViolation>,
}

impl ChunkFailure {
    /// Returns `None` when `violations` is empty: no violations, no failure.
    #[must_use]
    pub fn from_violations(chunk: ChunkIndex, violations: Vec<RecordViolation>) -> Option<Self> {
        if violations.is_empty() {
            None
        } else {
            Some(Self { chunk, violations })
        }
    }

    #[must_use]
    pub const fn chunk(&self) -> ChunkIndex {
        self.chunk
    }

    #[must_use]
    pub fn violations(&self) -> &[RecordViolation] {
        &self.violations
    }
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {}: ", self.chunk)?;
        for (position, violation) in self.violations.iter().enumerate() {
            if position > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ChunkFailure {}

/// Every chunk failure from one aggregation call, in chunk-index order.
///
/// Non-empty by construction: zero failures are represented by
/// [`AggregateOutcome::Total`], never by an empty report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport(Vec<ChunkFailure>);

impl FailureReport {
    /// Returns `None` when `failures` is empty.
    #[must_use]
    pub fn from_failures(failures: Vec<ChunkFailure>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self(failures))
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn failures(&self) -> &[ChunkFailure] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<ChunkFailure> {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkFailure> {
        self.0.iter()
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} chunk(s) failed: ", self.0.len())?;
        for (position, failure) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FailureReport {}

impl<'a> IntoIterator for &'a FailureReport {
    type Item = &'a ChunkFailure;
    type IntoIter = std::slice::Iter<'a, ChunkFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Result of one aggregation call: a grand total, or every chunk failure.
///
/// Never a mix. A failure report means no total was computed; there is no
/// partial-total fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateOutcome {
    /// Sum of all chunk revenues; zero for empty input.
    Total(f64),
    /// At least one chunk failed; one entry per failed chunk.
    Failed(FailureReport),
}

impl AggregateOutcome {
    #[must_use]
    pub const fn is_total(&self) -> bool {
        matches!(self, AggregateOutcome::Total(_))
    }

    #[must_use]
    pub const fn total(&self) -> Option<f64> {
        match self {
            AggregateOutcome::Total(total) => Some(*total),
            AggregateOutcome::Failed(_) => None,
        }
    }

    #[must_use]
    pub const fn failures(&self) -> Option<&FailureReport> {
        match self {
            AggregateOutcome::Total(_) => None,
            AggregateOutcome::Failed(report) => Some(report),
        }
    }
}
