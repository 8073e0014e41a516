//! # Columnar event storage
//!
//! Input side of the conversion: a thin layer over **Apache Arrow** record batches, read
//! either from **Parquet** files or from in-memory batches. Each row of a partition is one
//! event; scalar quantities are primitive columns and per-object quantities are
//! `List<primitive>` columns (nanoAOD-style flat layout).
//!
//! ## Overview
//! -----------------
//! * [`PartitionSchema`] – name → column lookup for one opened partition. This is the
//!   `bind(name)` primitive used by the readers: [`PartitionSchema::lookup`] turns a field
//!   name into a [`FieldHandle`].
//! * [`Partition`] – a cursor over the rows of one partition. [`Partition::read_into`]
//!   copies the current row's value(s) of a bound field into a fixed-capacity
//!   [`Buffer`](crate::buffer_registry::Buffer).
//! * [`PartitionSource`] – an ordered list of partitions that can be opened one at a time:
//!   [`ParquetFiles`] for files on disk, [`InMemoryPartitions`] for Arrow batches.
//!
//! ## Supported column types
//! -----------------
//! `Float32`, `Float64`, `Int32`, `Int64`, `UInt8`, `UInt32`, `UInt64`, either as plain
//! columns or as the item type of a `List` column. Other types are reported as
//! [`JetNtupleError::UnsupportedFieldType`] when a reader tries to bind them.
//!
//! ## See also
//! ------------
//! * [`crate::buffer_registry`] – owner of the buffers the partition writes into.
//! * [`crate::partition_iterator`] – chains partitions into one row stream.
use std::fmt;

use arrow_schema::{DataType, Schema};
use itertools::Itertools;

use crate::constants::FastHashMap;
use crate::jetntuple_errors::JetNtupleError;

pub mod partition;
pub mod source;

pub use partition::Partition;
pub use source::{InMemoryPartitions, ParquetFiles, PartitionSource};

/// Primitive value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    F32,
    F64,
    I32,
    I64,
    U8,
    U32,
    U64,
}

impl FieldKind {
    fn from_primitive(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Float32 => Some(FieldKind::F32),
            DataType::Float64 => Some(FieldKind::F64),
            DataType::Int32 => Some(FieldKind::I32),
            DataType::Int64 => Some(FieldKind::I64),
            DataType::UInt8 => Some(FieldKind::U8),
            DataType::UInt32 => Some(FieldKind::U32),
            DataType::UInt64 => Some(FieldKind::U64),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::F32 => "Float32",
            FieldKind::F64 => "Float64",
            FieldKind::I32 => "Int32",
            FieldKind::I64 => "Int64",
            FieldKind::U8 => "UInt8",
            FieldKind::U32 => "UInt32",
            FieldKind::U64 => "UInt64",
        };
        f.write_str(name)
    }
}

/// Whether a field holds one value per row or a variable-length list per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldShape {
    Scalar,
    List,
}

impl fmt::Display for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldShape::Scalar => f.write_str("scalar"),
            FieldShape::List => f.write_str("list"),
        }
    }
}

/// A field resolved against a [`PartitionSchema`].
///
/// Handles are only meaningful for the partition whose schema produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHandle {
    name: String,
    column: usize,
    kind: FieldKind,
    shape: FieldShape,
}

impl FieldHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the column in the full (unprojected) partition schema.
    pub fn column(&self) -> usize {
        self.column
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn shape(&self) -> FieldShape {
        self.shape
    }
}

#[derive(Debug, Clone)]
struct FieldEntry {
    column: usize,
    data_type: DataType,
    layout: Option<(FieldShape, FieldKind)>,
}

/// Field directory of one opened partition.
///
/// # Fields
///
/// * `label` - human-readable partition name (file path or `memory[i]`)
/// * `generation` - unique token of this opening, issued by the
///   [`BufferRegistry`](crate::buffer_registry::BufferRegistry)
/// * `fields` - field name → column entry
#[derive(Debug, Clone)]
pub struct PartitionSchema {
    label: String,
    generation: u64,
    fields: FastHashMap<String, FieldEntry>,
}

impl PartitionSchema {
    /// Build the field directory from an Arrow schema.
    pub fn from_arrow(label: impl Into<String>, generation: u64, schema: &Schema) -> Self {
        let fields = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(column, field)| {
                let layout = match field.data_type() {
                    DataType::List(item) => FieldKind::from_primitive(item.data_type())
                        .map(|kind| (FieldShape::List, kind)),
                    other => FieldKind::from_primitive(other).map(|kind| (FieldShape::Scalar, kind)),
                };
                (
                    field.name().clone(),
                    FieldEntry {
                        column,
                        data_type: field.data_type().clone(),
                        layout,
                    },
                )
            })
            .collect();

        PartitionSchema {
            label: label.into(),
            generation,
            fields,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sorted field names, mostly for diagnostics.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).sorted().collect()
    }

    /// Resolve a field name into a [`FieldHandle`].
    ///
    /// Arguments
    /// -----------------
    /// * `name`: the exact column name (e.g. `"FatJet_pt"`).
    ///
    /// Return
    /// ----------
    /// * `Ok(Some(handle))` if the field exists with a supported type,
    /// * `Ok(None)` if the field does not exist,
    /// * `Err(UnsupportedFieldType)` if it exists with a type the readers cannot hold.
    pub fn lookup(&self, name: &str) -> Result<Option<FieldHandle>, JetNtupleError> {
        let Some(entry) = self.fields.get(name) else {
            return Ok(None);
        };
        let (shape, kind) = entry
            .layout
            .ok_or_else(|| JetNtupleError::UnsupportedFieldType {
                field: name.to_string(),
                data_type: entry.data_type.to_string(),
            })?;
        Ok(Some(FieldHandle {
            name: name.to_string(),
            column: entry.column,
            kind,
            shape,
        }))
    }
}

#[cfg(test)]
mod storage_test {
    use std::sync::Arc;

    use arrow_schema::Field;

    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("run", DataType::UInt32, false),
            Field::new("nJet", DataType::UInt32, false),
            Field::new(
                "Jet_pt",
                DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
                true,
            ),
            Field::new("flag", DataType::Boolean, false),
        ])
    }

    #[test]
    fn test_lookup_scalar_and_list() {
        let schema = PartitionSchema::from_arrow("mem", 7, &schema());
        assert_eq!(schema.generation(), 7);
        assert_eq!(schema.len(), 4);

        let run = schema.lookup("run").unwrap().unwrap();
        assert_eq!(run.column(), 0);
        assert_eq!(run.kind(), FieldKind::U32);
        assert_eq!(run.shape(), FieldShape::Scalar);

        let pt = schema.lookup("Jet_pt").unwrap().unwrap();
        assert_eq!(pt.column(), 2);
        assert_eq!(pt.kind(), FieldKind::F32);
        assert_eq!(pt.shape(), FieldShape::List);
    }

    #[test]
    fn test_lookup_missing_and_unsupported() {
        let schema = PartitionSchema::from_arrow("mem", 0, &schema());
        assert_eq!(schema.lookup("Jet_eta").unwrap(), None);
        assert!(matches!(
            schema.lookup("flag"),
            Err(JetNtupleError::UnsupportedFieldType { .. })
        ));
        assert_eq!(schema.field_names(), vec!["Jet_pt", "flag", "nJet", "run"]);
    }
}
