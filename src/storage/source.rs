use std::fs::File;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use camino::{Utf8Path, Utf8PathBuf};

use super::Partition;
use crate::constants::DEFAULT_BATCH_SIZE;
use crate::jetntuple_errors::JetNtupleError;

/// Ordered list of partitions that can be opened one at a time.
///
/// Implementors only describe *where* rows come from; chaining, row ceilings and resource
/// release are handled by [`crate::partition_iterator::PartitionIterator`].
pub trait PartitionSource {
    /// Number of partitions in the list.
    fn partition_count(&self) -> usize;

    /// Human-readable name of partition `index`, used in diagnostics.
    fn label(&self, index: usize) -> String;

    /// Open partition `index`.
    ///
    /// Arguments
    /// -----------------
    /// * `index`: position in the list, `0..partition_count()`.
    /// * `generation`: token identifying this opening, stamped on the partition schema.
    ///
    /// Return
    /// ----------
    /// * The opened [`Partition`], or [`JetNtupleError::PartitionOpenFailure`].
    fn open(&mut self, index: usize, generation: u64) -> Result<Partition, JetNtupleError>;
}

/// Parquet files on disk, one partition per file.
#[derive(Debug, Clone)]
pub struct ParquetFiles {
    files: Vec<Utf8PathBuf>,
    batch_size: usize,
}

impl ParquetFiles {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        ParquetFiles {
            files: files.into_iter().map(Into::into).collect(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Number of rows decoded per record batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }

    fn open_file(path: &Utf8Path, generation: u64, batch_size: usize) -> Result<Partition, JetNtupleError> {
        let file = File::open(path)?;
        Partition::from_parquet(path.as_str(), generation, file, batch_size)
    }
}

impl PartitionSource for ParquetFiles {
    fn partition_count(&self) -> usize {
        self.files.len()
    }

    fn label(&self, index: usize) -> String {
        self.files
            .get(index)
            .map_or_else(|| format!("<partition #{index}>"), |p| p.to_string())
    }

    fn open(&mut self, index: usize, generation: u64) -> Result<Partition, JetNtupleError> {
        let path = self
            .files
            .get(index)
            .ok_or_else(|| JetNtupleError::PartitionOpenFailure {
                partition: self.label(index),
                reason: "index out of range".to_string(),
            })?;
        Self::open_file(path, generation, self.batch_size).map_err(|err| {
            JetNtupleError::PartitionOpenFailure {
                partition: path.to_string(),
                reason: err.to_string(),
            }
        })
    }
}

/// In-memory Arrow partitions, each a schema plus its record batches.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPartitions {
    partitions: Vec<(SchemaRef, Vec<RecordBatch>)>,
}

impl InMemoryPartitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one partition made of `batches`, all sharing `schema`.
    pub fn push(&mut self, schema: SchemaRef, batches: Vec<RecordBatch>) {
        self.partitions.push((schema, batches));
    }

    /// Append a partition made of a single batch.
    pub fn push_batch(&mut self, batch: RecordBatch) {
        self.partitions.push((batch.schema(), vec![batch]));
    }
}

impl FromIterator<RecordBatch> for InMemoryPartitions {
    fn from_iter<T: IntoIterator<Item = RecordBatch>>(iter: T) -> Self {
        let mut partitions = InMemoryPartitions::new();
        for batch in iter {
            partitions.push_batch(batch);
        }
        partitions
    }
}

impl PartitionSource for InMemoryPartitions {
    fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn label(&self, index: usize) -> String {
        format!("memory[{index}]")
    }

    fn open(&mut self, index: usize, generation: u64) -> Result<Partition, JetNtupleError> {
        let label = self.label(index);
        let (schema, batches) =
            self.partitions
                .get(index)
                .ok_or_else(|| JetNtupleError::PartitionOpenFailure {
                    partition: label.clone(),
                    reason: "index out of range".to_string(),
                })?;
        Partition::from_batches(&label, generation, schema.clone(), batches.clone()).map_err(
            |err| JetNtupleError::PartitionOpenFailure {
                partition: label,
                reason: err.to_string(),
            },
        )
    }
}
