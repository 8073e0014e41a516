//! # Streaming over partitions
//!
//! [`PartitionIterator`] chains the partitions of a [`PartitionSource`] into one logical row
//! stream. It owns the [`BufferRegistry`] of the run: on every partition change it rebinds
//! the readers, projects the partition onto the fields they bound, and on every row it loads
//! the shared buffers before returning control to the caller.
//!
//! ## State machine
//! -----------------
//! ```text
//! NotStarted ──advance──▶ Reading { partition, row } ──advance──▶ … ──▶ Exhausted
//! ```
//! * A drained partition is dropped before the next one is opened.
//! * The row ceiling is checked at the start of `advance`: the row that reaches it is still
//!   served from the open partition, and the next `advance` drops that partition and moves to
//!   `Exhausted`. It is a normal end of stream, not an error.
//! * A partition that cannot be opened is fatal: the error is returned and the iterator is
//!   left `Exhausted`.
//!
//! ## Example
//! -----------------
//! ```rust,no_run
//! use jetntuple::buffer_registry::BufferRegistry;
//! use jetntuple::partition_iterator::{PartitionIterator, RowLimit};
//! use jetntuple::readers::{EventInfoReader, EventInfoSources, RecordReader, SchemaBinder};
//! use jetntuple::storage::ParquetFiles;
//!
//! let source = ParquetFiles::new(["events_1.parquet", "events_2.parquet"]);
//! let mut iterator = PartitionIterator::new(source, BufferRegistry::new(), RowLimit::new(1000));
//! let mut events = EventInfoReader::new(EventInfoSources::default());
//!
//! while iterator.advance(&mut [&mut events as &mut dyn SchemaBinder]).unwrap() {
//!     let info = events.materialize().unwrap();
//!     println!("{}:{}:{}", info.run, info.lumi, info.event);
//! }
//! ```
use tracing::{debug, info};

use crate::buffer_registry::BufferRegistry;
use crate::jetntuple_errors::JetNtupleError;
use crate::readers::SchemaBinder;
use crate::storage::{Partition, PartitionSource};

/// Global row ceiling. `0` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowLimit(u64);

impl RowLimit {
    pub fn new(max_rows: u64) -> Self {
        RowLimit(max_rows)
    }

    pub fn unlimited() -> Self {
        RowLimit(0)
    }

    /// Build from a signed configuration value, where any value `<= 0` means unlimited.
    pub fn from_signed(max_rows: i64) -> Self {
        RowLimit(u64::try_from(max_rows).unwrap_or(0))
    }

    pub fn get(&self) -> Option<u64> {
        (self.0 > 0).then_some(self.0)
    }

    fn reached(&self, rows: u64) -> bool {
        self.get().is_some_and(|max| rows >= max)
    }
}

/// Position of the iterator.
pub enum IteratorState {
    NotStarted,
    Reading {
        index: usize,
        row: u64,
        partition: Box<Partition>,
    },
    Exhausted,
}

impl IteratorState {
    fn name(&self) -> &'static str {
        match self {
            IteratorState::NotStarted => "NotStarted",
            IteratorState::Reading { .. } => "Reading",
            IteratorState::Exhausted => "Exhausted",
        }
    }
}

impl std::fmt::Debug for IteratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IteratorState::Reading { index, row, .. } => f
                .debug_struct("Reading")
                .field("index", index)
                .field("row", row)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// One logical row stream over an ordered list of partitions.
///
/// # Fields
///
/// * `source` - partitions to read, in order
/// * `registry` - buffers shared by the readers of this run
/// * `limit` - global row ceiling
/// * `state` - current position, holding the open partition
/// * `next_partition` - index of the next partition to open
/// * `cumulative_rows` - rows returned so far, across all partitions
/// * `rows_in_partition` - rows returned from the current partition
/// * `partitions_opened` - partitions opened so far
#[derive(Debug)]
pub struct PartitionIterator<S> {
    source: S,
    registry: BufferRegistry,
    limit: RowLimit,
    state: IteratorState,
    next_partition: usize,
    cumulative_rows: u64,
    rows_in_partition: u64,
    partitions_opened: usize,
}

impl<S: PartitionSource> PartitionIterator<S> {
    pub fn new(source: S, registry: BufferRegistry, limit: RowLimit) -> Self {
        PartitionIterator {
            source,
            registry,
            limit,
            state: IteratorState::NotStarted,
            next_partition: 0,
            cumulative_rows: 0,
            rows_in_partition: 0,
            partitions_opened: 0,
        }
    }

    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> &IteratorState {
        &self.state
    }

    pub fn limit(&self) -> RowLimit {
        self.limit
    }

    pub fn cumulative_rows(&self) -> u64 {
        self.cumulative_rows
    }

    pub fn rows_in_partition(&self) -> u64 {
        self.rows_in_partition
    }

    pub fn partitions_opened(&self) -> usize {
        self.partitions_opened
    }

    pub fn partition_count(&self) -> usize {
        self.source.partition_count()
    }

    /// Label of the partition currently read, if any.
    pub fn current_partition(&self) -> Option<&str> {
        match &self.state {
            IteratorState::Reading { partition, .. } => Some(partition.label()),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, IteratorState::Exhausted)
    }

    /// Move to the next row, opening the next partition when the current one is drained.
    ///
    /// Arguments
    /// -----------------
    /// * `binders`: every reader that will materialize rows. They are rebound each time a
    ///   partition is opened.
    ///
    /// Return
    /// ----------
    /// * `Ok(true)` when a row is loaded into the shared buffers,
    /// * `Ok(false)` once all partitions are consumed or the row ceiling is reached,
    /// * an error if a partition cannot be opened or bound. The iterator is then exhausted.
    pub fn advance(&mut self, binders: &mut [&mut dyn SchemaBinder]) -> Result<bool, JetNtupleError> {
        let result = self.step(binders);
        if result.is_err() {
            self.state = IteratorState::Exhausted;
        }
        result
    }

    fn step(&mut self, binders: &mut [&mut dyn SchemaBinder]) -> Result<bool, JetNtupleError> {
        if self.is_exhausted() {
            return Ok(false);
        }
        if self.limit.reached(self.cumulative_rows) {
            info!(
                "Row ceiling of {} reached after {} partition(s)",
                self.cumulative_rows, self.partitions_opened
            );
            self.state = IteratorState::Exhausted;
            return Ok(false);
        }

        loop {
            if let IteratorState::Reading {
                partition, row, ..
            } = &mut self.state
            {
                if partition.advance()? {
                    self.registry.load_row(partition)?;
                    *row += 1;
                    self.rows_in_partition += 1;
                    self.cumulative_rows += 1;
                    return Ok(true);
                }
                debug!(
                    "Partition '{}' drained after {} row(s)",
                    partition.label(),
                    self.rows_in_partition
                );
            }

            // Release the drained partition before opening the next one
            self.state = IteratorState::NotStarted;

            if self.next_partition >= self.source.partition_count() {
                self.state = IteratorState::Exhausted;
                return Ok(false);
            }
            let index = self.next_partition;
            self.next_partition += 1;
            let partition = self.open(index, binders)?;
            self.state = IteratorState::Reading {
                index,
                row: 0,
                partition: Box::new(partition),
            };
        }
    }

    fn open(
        &mut self,
        index: usize,
        binders: &mut [&mut dyn SchemaBinder],
    ) -> Result<Partition, JetNtupleError> {
        let generation = self.registry.begin_partition();
        let mut partition = self.source.open(index, generation)?;
        self.partitions_opened += 1;
        self.rows_in_partition = 0;
        info!(
            "Opening partition #{}/{}: {} ({} rows)",
            index + 1,
            self.source.partition_count(),
            partition.label(),
            partition.num_rows()
        );

        for binder in binders.iter_mut() {
            binder.bind(partition.schema(), &self.registry)?;
        }
        partition.start(&self.registry.bound_columns(generation))?;
        Ok(partition)
    }

    /// Whether a progress line is due for the row just returned.
    ///
    /// True once every `interval` cumulative rows; never true for an interval of `0` or
    /// before the first row.
    pub fn should_report(&self, interval: u64) -> bool {
        interval > 0 && self.cumulative_rows > 0 && self.cumulative_rows % interval == 0
    }
}
