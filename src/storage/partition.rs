//! Row cursor over one partition.
//!
//! A [`Partition`] is opened in two steps: its [`PartitionSchema`] is available right away so
//! readers can bind their fields, then [`Partition::start`] projects the stream onto the bound
//! columns only. Rows are pulled batch by batch; [`Partition::read_into`] copies the current
//! row's values for one field into a caller-provided [`Buffer`].
use std::fs::File;

use arrow_array::cast::AsArray;
use arrow_array::{Array, RecordBatch};
use arrow_schema::{ArrowError, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;

use super::{FieldHandle, FieldShape, PartitionSchema};
use crate::buffer_registry::Buffer;
use crate::jetntuple_errors::JetNtupleError;

type BatchStream = Box<dyn Iterator<Item = Result<RecordBatch, ArrowError>>>;

enum PendingRows {
    Parquet {
        builder: ParquetRecordBatchReaderBuilder<File>,
        batch_size: usize,
    },
    Memory(Vec<RecordBatch>),
}

/// One opened partition.
///
/// # Fields
///
/// * `schema` - field directory used for binding
/// * `num_rows` - total number of rows declared by the partition
/// * `pending` - unstarted row source, consumed by [`Partition::start`]
/// * `stream` - projected record batches
/// * `column_map` - full column index → position in the projected batches
/// * `cursor` - current batch and row inside it
pub struct Partition {
    schema: PartitionSchema,
    num_rows: usize,
    pending: Option<PendingRows>,
    stream: Option<BatchStream>,
    column_map: Vec<Option<usize>>,
    cursor: Option<(RecordBatch, usize)>,
}

impl Partition {
    /// Open a Parquet file and read its metadata. No row group is decoded yet.
    pub(crate) fn from_parquet(
        label: &str,
        generation: u64,
        file: File,
        batch_size: usize,
    ) -> Result<Self, JetNtupleError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let num_rows = builder.metadata().file_metadata().num_rows().max(0) as usize;
        let schema = PartitionSchema::from_arrow(label, generation, builder.schema());
        let n_columns = builder.schema().fields().len();

        Ok(Partition {
            schema,
            num_rows,
            pending: Some(PendingRows::Parquet {
                builder,
                batch_size,
            }),
            stream: None,
            column_map: vec![None; n_columns],
            cursor: None,
        })
    }

    /// Wrap in-memory record batches sharing `schema`.
    pub fn from_batches(
        label: &str,
        generation: u64,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<Self, JetNtupleError> {
        if let Some(bad) = batches.iter().find(|b| b.schema() != schema) {
            return Err(JetNtupleError::ArrowError(ArrowError::SchemaError(format!(
                "record batch schema {} differs from partition schema {}",
                bad.schema(),
                schema
            ))));
        }
        let num_rows = batches.iter().map(RecordBatch::num_rows).sum();
        Ok(Partition {
            schema: PartitionSchema::from_arrow(label, generation, &schema),
            num_rows,
            pending: Some(PendingRows::Memory(batches)),
            stream: None,
            column_map: vec![None; schema.fields().len()],
            cursor: None,
        })
    }

    pub fn schema(&self) -> &PartitionSchema {
        &self.schema
    }

    pub fn label(&self) -> &str {
        self.schema.label()
    }

    pub fn generation(&self) -> u64 {
        self.schema.generation()
    }

    /// Number of rows the partition declares.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Start streaming rows, decoding only `columns` (full-schema indices).
    ///
    /// Calling this more than once has no effect.
    pub fn start(&mut self, columns: &[usize]) -> Result<(), JetNtupleError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        let mut projection: Vec<usize> = columns
            .iter()
            .copied()
            .filter(|&c| c < self.column_map.len())
            .collect();
        projection.sort_unstable();
        projection.dedup();

        for (position, &column) in projection.iter().enumerate() {
            self.column_map[column] = Some(position);
        }

        let stream: BatchStream = match pending {
            PendingRows::Parquet {
                builder,
                batch_size,
            } => {
                let mask = ProjectionMask::roots(builder.parquet_schema(), projection);
                let reader = builder
                    .with_projection(mask)
                    .with_batch_size(batch_size)
                    .build()?;
                Box::new(reader.fuse())
            }
            PendingRows::Memory(batches) => Box::new(
                batches
                    .into_iter()
                    .map(move |batch| batch.project(&projection))
                    .fuse(),
            ),
        };
        self.stream = Some(stream);
        Ok(())
    }

    /// Move to the next row.
    ///
    /// Starts the stream with every column if [`Partition::start`] was never called.
    ///
    /// Return
    /// ----------
    /// * `Ok(true)` when a new row is current, `Ok(false)` once the partition is drained.
    pub fn advance(&mut self) -> Result<bool, JetNtupleError> {
        if self.pending.is_some() {
            let all: Vec<usize> = (0..self.column_map.len()).collect();
            self.start(&all)?;
        }

        if let Some((batch, row)) = self.cursor.as_mut() {
            if *row + 1 < batch.num_rows() {
                *row += 1;
                return Ok(true);
            }
        }

        self.cursor = None;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };
        for batch in stream.by_ref() {
            let batch = batch?;
            if batch.num_rows() > 0 {
                self.cursor = Some((batch, 0));
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Copy the current row's value(s) of `handle` into `dest`.
    ///
    /// Scalar fields fill slot 0. List fields fill the first `min(len, capacity)` slots, where
    /// `len` is the list length of the current row; a null list counts as empty.
    ///
    /// Return
    /// ----------
    /// * The number of values the row holds for this field (1 for scalars, the list length
    ///   otherwise), which may exceed the buffer capacity.
    pub fn read_into(&self, handle: &FieldHandle, dest: &mut Buffer) -> Result<usize, JetNtupleError> {
        let (batch, row) = self
            .cursor
            .as_ref()
            .ok_or_else(|| JetNtupleError::ReaderNotBound(handle.name().to_string()))?;
        let position = self
            .column_map
            .get(handle.column())
            .copied()
            .flatten()
            .ok_or_else(|| JetNtupleError::MissingField {
                field: handle.name().to_string(),
                partition: self.label().to_string(),
            })?;
        let column = batch.column(position);

        match handle.shape() {
            FieldShape::Scalar => {
                dest.fill_from(column.as_ref(), *row, 1, handle.name())?;
                Ok(1)
            }
            FieldShape::List => {
                let list = column.as_list_opt::<i32>().ok_or_else(|| {
                    JetNtupleError::FieldTypeMismatch {
                        field: handle.name().to_string(),
                        expected: "List".to_string(),
                        found: column.data_type().to_string(),
                    }
                })?;
                if list.is_null(*row) {
                    return Ok(0);
                }
                let offsets = list.value_offsets();
                let start = offsets[*row] as usize;
                let len = offsets[*row + 1] as usize - start;
                let n = len.min(dest.capacity());
                dest.fill_from(list.values().as_ref(), start, n, handle.name())?;
                Ok(len)
            }
        }
    }
}
