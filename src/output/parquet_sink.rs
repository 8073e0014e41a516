use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;

use arrow_array::builder::{Float32Builder, Int32Builder, ListBuilder};
use arrow_array::{ArrayRef, Float32Array, Int32Array, RecordBatch, UInt32Array, UInt64Array};
use arrow_schema::{Schema, SchemaRef};
use camino::{Utf8Path, Utf8PathBuf};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, warn};

use super::{OutputRow, OutputSink, OutputValue};
use crate::constants::DEFAULT_ROWS_PER_GROUP;
use crate::jetntuple_errors::JetNtupleError;

/// Schema metadata key holding the output collection name.
pub const COLLECTION_METADATA_KEY: &str = "jra.collection";

/// Writes output rows to a Parquet file.
///
/// The layout is fixed by [`ParquetSink::with_schema`] or, failing that, by the first row
/// appended; every later row must have the same layout. Rows are buffered and written as one
/// record batch every `rows_per_group` rows. The output collection name is stored in the
/// schema metadata under [`COLLECTION_METADATA_KEY`].
///
/// # Fields
///
/// * `path` - destination file
/// * `collection` - output collection name, e.g. `ak8puppi/t`
/// * `rows_per_group` - rows per written record batch
/// * `file` - destination, until the writer is created
/// * `schema` - output layout, once known
/// * `writer` - open Arrow writer, `None` before the first write and after flush
/// * `pending` - rows not yet written
/// * `rows_written` - rows handed to the writer so far
pub struct ParquetSink {
    path: Utf8PathBuf,
    collection: String,
    rows_per_group: usize,
    file: Option<File>,
    schema: Option<SchemaRef>,
    writer: Option<ArrowWriter<File>>,
    pending: Vec<OutputRow>,
    rows_written: usize,
    flushed: bool,
}

impl ParquetSink {
    /// Create (or truncate) the output file.
    pub fn create(path: impl Into<Utf8PathBuf>, collection: impl Into<String>) -> Result<Self, JetNtupleError> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(ParquetSink {
            path,
            collection: collection.into(),
            rows_per_group: DEFAULT_ROWS_PER_GROUP,
            file: Some(file),
            schema: None,
            writer: None,
            pending: Vec::new(),
            rows_written: 0,
            flushed: false,
        })
    }

    pub fn with_rows_per_group(mut self, rows_per_group: usize) -> Self {
        self.rows_per_group = rows_per_group.max(1);
        self
    }

    /// Fix the output layout up front, so that a run producing no row still writes a
    /// readable, empty file.
    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        if self.schema.is_none() {
            self.schema = Some(self.tag(&schema));
        }
        self
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    fn tag(&self, schema: &Schema) -> SchemaRef {
        let mut metadata = schema.metadata().clone();
        metadata.insert(COLLECTION_METADATA_KEY.to_string(), self.collection.clone());
        Arc::new(Schema::new_with_metadata(
            schema.fields().clone(),
            metadata.into_iter().collect::<HashMap<_, _>>(),
        ))
    }

    fn writer(&mut self, schema: &SchemaRef) -> Result<&mut ArrowWriter<File>, JetNtupleError> {
        if self.writer.is_none() {
            let file = self.file.take().ok_or_else(|| {
                JetNtupleError::OutputSchemaMismatch(format!("output file '{}' already closed", self.path))
            })?;
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build();
            self.writer = Some(ArrowWriter::try_new(file, schema.clone(), Some(props))?);
        }
        self.writer.as_mut().ok_or_else(|| {
            JetNtupleError::OutputSchemaMismatch(format!("output file '{}' already closed", self.path))
        })
    }

    fn write_pending(&mut self) -> Result<(), JetNtupleError> {
        let Some(schema) = self.schema.clone() else {
            return Ok(());
        };
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = rows_to_batch(&schema, &self.pending)?;
        let n_rows = self.pending.len();
        self.writer(&schema)?.write(&batch)?;
        self.pending.clear();
        self.rows_written += n_rows;
        debug!("Wrote {} row(s) to '{}'", n_rows, self.path);
        Ok(())
    }
}

impl OutputSink for ParquetSink {
    fn append_row(&mut self, row: &OutputRow) -> Result<(), JetNtupleError> {
        if self.flushed {
            return Err(JetNtupleError::OutputSchemaMismatch(format!(
                "row appended to '{}' after flush",
                self.path
            )));
        }
        match &self.schema {
            Some(schema) => row.check_layout(schema)?,
            None => self.schema = Some(self.tag(&row.arrow_schema())),
        }
        self.pending.push(row.clone());
        if self.pending.len() >= self.rows_per_group {
            self.write_pending()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), JetNtupleError> {
        if self.flushed {
            return Ok(());
        }
        self.write_pending()?;
        match self.schema.clone() {
            Some(schema) => {
                self.writer(&schema)?;
                if let Some(writer) = self.writer.take() {
                    writer.close()?;
                }
            }
            None => warn!(
                "No row and no layout for '{}': the output file is left empty",
                self.path
            ),
        }
        self.flushed = true;
        Ok(())
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        if !self.flushed {
            if let Err(err) = self.flush() {
                warn!("Failed to finalize '{}': {}", self.path, err);
            }
        }
    }
}

fn column_error(name: &str) -> JetNtupleError {
    JetNtupleError::OutputSchemaMismatch(format!("column '{name}' changes type between rows"))
}

/// Transpose buffered rows into one record batch following `schema`.
fn rows_to_batch(schema: &SchemaRef, rows: &[OutputRow]) -> Result<RecordBatch, JetNtupleError> {
    let Some(first) = rows.first() else {
        return Ok(RecordBatch::new_empty(schema.clone()));
    };

    let columns = first
        .iter()
        .enumerate()
        .map(|(i, (name, value))| {
            let values = rows.iter().map(move |r| r.fields.get(i).map(|(_, v)| v));
            let array: ArrayRef = match value {
                OutputValue::UInt32(_) => Arc::new(
                    values
                        .map(|v| match v {
                            Some(OutputValue::UInt32(x)) => Ok(Some(*x)),
                            _ => Err(column_error(name)),
                        })
                        .collect::<Result<UInt32Array, _>>()?,
                ),
                OutputValue::UInt64(_) => Arc::new(
                    values
                        .map(|v| match v {
                            Some(OutputValue::UInt64(x)) => Ok(Some(*x)),
                            _ => Err(column_error(name)),
                        })
                        .collect::<Result<UInt64Array, _>>()?,
                ),
                OutputValue::Int32(_) => Arc::new(
                    values
                        .map(|v| match v {
                            Some(OutputValue::Int32(x)) => Ok(*x),
                            _ => Err(column_error(name)),
                        })
                        .collect::<Result<Int32Array, _>>()?,
                ),
                OutputValue::Float32(_) => Arc::new(
                    values
                        .map(|v| match v {
                            Some(OutputValue::Float32(x)) => Ok(*x),
                            _ => Err(column_error(name)),
                        })
                        .collect::<Result<Float32Array, _>>()?,
                ),
                OutputValue::Int32List(_) => {
                    let mut builder = ListBuilder::new(Int32Builder::new());
                    for v in values {
                        match v {
                            Some(OutputValue::Int32List(items)) => {
                                builder.values().extend(items.iter().copied());
                                builder.append(true);
                            }
                            _ => return Err(column_error(name)),
                        }
                    }
                    Arc::new(builder.finish())
                }
                OutputValue::Float32List(_) => {
                    let mut builder = ListBuilder::new(Float32Builder::new());
                    for v in values {
                        match v {
                            Some(OutputValue::Float32List(items)) => {
                                builder.values().extend(items.iter().copied());
                                builder.append(true);
                            }
                            _ => return Err(column_error(name)),
                        }
                    }
                    Arc::new(builder.finish())
                }
            };
            Ok::<ArrayRef, JetNtupleError>(array)
        })
        .collect::<Result<Vec<_>, JetNtupleError>>()?;

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

#[cfg(test)]
mod parquet_sink_test {
    use std::fs::File;

    use arrow_array::cast::AsArray;
    use arrow_array::types::Float32Type;
    use arrow_array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use super::*;

    fn row(event: u64, pts: &[f32]) -> OutputRow {
        let mut row = OutputRow::new();
        row.push("evt", OutputValue::UInt64(event));
        row.push("rho", OutputValue::Float32(None));
        row.push(
            "jtpt",
            OutputValue::Float32List(pts.iter().copied().map(Some).collect()),
        );
        row
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("jra.parquet")).unwrap();

        let mut sink = ParquetSink::create(path.clone(), "ak8puppi/t")
            .unwrap()
            .with_rows_per_group(2);
        sink.append_row(&row(1, &[30.0, 20.0])).unwrap();
        sink.append_row(&row(2, &[])).unwrap();
        sink.append_row(&row(3, &[15.0])).unwrap();
        assert_eq!(sink.rows_written(), 2);
        sink.flush().unwrap();
        assert_eq!(sink.rows_written(), 3);

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap()).unwrap();
        assert_eq!(
            builder.schema().metadata().get(COLLECTION_METADATA_KEY).map(String::as_str),
            Some("ak8puppi/t")
        );
        let batches: Vec<RecordBatch> = builder.build().unwrap().map(|b| b.unwrap()).collect();
        let total: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(total, 3);

        let jtpt = batches[0].column(2).as_list::<i32>();
        assert_eq!(jtpt.value_length(0), 2);
        assert_eq!(jtpt.value(0).as_primitive::<Float32Type>().value(1), 20.0);
        assert!(batches[0].column(1).is_null(0));
    }

    #[test]
    fn test_layout_change_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("bad.parquet")).unwrap();
        let mut sink = ParquetSink::create(path, "t").unwrap();
        sink.append_row(&row(1, &[1.0])).unwrap();

        let mut other = OutputRow::new();
        other.push("evt", OutputValue::UInt32(2));
        assert!(matches!(
            sink.append_row(&other),
            Err(JetNtupleError::OutputSchemaMismatch(_))
        ));
    }

    #[test]
    fn test_empty_run_with_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("empty.parquet")).unwrap();
        let schema = row(0, &[]).arrow_schema();
        let mut sink = ParquetSink::create(path.clone(), "t").unwrap().with_schema(schema);
        sink.flush().unwrap();

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap()).unwrap();
        assert_eq!(builder.metadata().file_metadata().num_rows(), 0);
        assert_eq!(builder.schema().fields().len(), 3);
    }
}
