//! # Output records
//!
//! One [`OutputRow`] is produced per input event: an ordered list of named values, some
//! scalar and some per-jet lists. Rows are handed to an [`OutputSink`], which appends them to
//! persistent storage.
//!
//! ## Overview
//! -----------------
//! * [`OutputValue`] – the value types a row can hold, each mapped to an Arrow type.
//! * [`OutputRow`] – named values in a fixed order; the order and types form the row layout.
//! * [`OutputSink`] – `append_row` + `flush`.
//! * [`ParquetSink`] – writes rows to a Parquet file, in record batches of fixed size.
//! * [`MemorySink`] – keeps rows in memory.
//! * [`JraRowBuilder`] – builds the fixed JRA layout from an event and its selected jets.
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};

use crate::jetntuple_errors::JetNtupleError;

pub mod jra_row;
pub mod memory_sink;
pub mod parquet_sink;

pub use jra_row::{JraJet, JraRowBuilder, OutputFlags};
pub use memory_sink::MemorySink;
pub use parquet_sink::ParquetSink;

/// A single output value. `None` entries are written as nulls.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    UInt32(u32),
    UInt64(u64),
    Int32(Option<i32>),
    Float32(Option<f32>),
    Int32List(Vec<Option<i32>>),
    Float32List(Vec<Option<f32>>),
}

impl OutputValue {
    /// Arrow type of the column holding this value.
    pub fn data_type(&self) -> DataType {
        let item = |t: DataType| Arc::new(Field::new("item", t, true));
        match self {
            OutputValue::UInt32(_) => DataType::UInt32,
            OutputValue::UInt64(_) => DataType::UInt64,
            OutputValue::Int32(_) => DataType::Int32,
            OutputValue::Float32(_) => DataType::Float32,
            OutputValue::Int32List(_) => DataType::List(item(DataType::Int32)),
            OutputValue::Float32List(_) => DataType::List(item(DataType::Float32)),
        }
    }

    /// Whether the column may hold nulls.
    fn nullable(&self) -> bool {
        matches!(self, OutputValue::Int32(_) | OutputValue::Float32(_))
    }

    /// Number of entries: the list length for lists, `1` otherwise.
    pub fn len(&self) -> usize {
        match self {
            OutputValue::Int32List(v) => v.len(),
            OutputValue::Float32List(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered named values of one output record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRow {
    fields: Vec<(String, OutputValue)>,
}

impl OutputRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        OutputRow {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Append a field. Names are expected to be unique within a row.
    pub fn push(&mut self, name: impl Into<String>, value: OutputValue) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&OutputValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Arrow schema matching the layout of this row.
    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.fields
                .iter()
                .map(|(name, value)| Field::new(name, value.data_type(), value.nullable()))
                .collect::<Vec<_>>(),
        ))
    }

    /// Check that this row has the layout described by `schema`.
    ///
    /// Return
    /// ----------
    /// * [`JetNtupleError::OutputSchemaMismatch`] naming the first differing field.
    pub fn check_layout(&self, schema: &Schema) -> Result<(), JetNtupleError> {
        if self.fields.len() != schema.fields().len() {
            return Err(JetNtupleError::OutputSchemaMismatch(format!(
                "row has {} fields, schema has {}",
                self.fields.len(),
                schema.fields().len()
            )));
        }
        for ((name, value), field) in self.fields.iter().zip(schema.fields().iter()) {
            if name != field.name() || &value.data_type() != field.data_type() {
                return Err(JetNtupleError::OutputSchemaMismatch(format!(
                    "field '{name}' ({}) does not match '{}' ({})",
                    value.data_type(),
                    field.name(),
                    field.data_type()
                )));
            }
        }
        Ok(())
    }
}

/// Append-only destination of output rows.
pub trait OutputSink {
    fn append_row(&mut self, row: &OutputRow) -> Result<(), JetNtupleError>;

    /// Write out everything buffered. No row may be appended afterwards.
    fn flush(&mut self) -> Result<(), JetNtupleError>;
}

impl<T: OutputSink + ?Sized> OutputSink for Box<T> {
    fn append_row(&mut self, row: &OutputRow) -> Result<(), JetNtupleError> {
        (**self).append_row(row)
    }

    fn flush(&mut self) -> Result<(), JetNtupleError> {
        (**self).flush()
    }
}

#[cfg(test)]
mod output_test {
    use super::*;

    fn row(jets: usize) -> OutputRow {
        let mut row = OutputRow::new();
        row.push("run", OutputValue::UInt32(1));
        row.push("rho", OutputValue::Float32(None));
        row.push("jtpt", OutputValue::Float32List(vec![Some(20.0); jets]));
        row
    }

    #[test]
    fn test_row_layout() {
        let first = row(2);
        let schema = first.arrow_schema();
        assert_eq!(schema.fields().len(), 3);
        assert!(!schema.field(0).is_nullable());
        assert!(schema.field(1).is_nullable());

        assert!(row(0).check_layout(&schema).is_ok());
        assert_eq!(first.get("jtpt").map(OutputValue::len), Some(2));

        let mut other = row(1);
        other.push("extra", OutputValue::UInt64(3));
        assert!(matches!(
            other.check_layout(&schema),
            Err(JetNtupleError::OutputSchemaMismatch(_))
        ));
    }
}
