//! # Shared collection buffers
//!
//! The columnar input allows only one binding per named field. Several readers may however
//! address the same collection (e.g. two readers over `FatJet` that read different
//! quantities), so the buffers backing a collection are created once and shared.
//!
//! ## Overview
//! -----------------
//! * [`BufferRegistry`] – explicitly constructed registry, one per pipeline run. It maps a
//!   collection name to its [`CollectionBuffers`] and hands out [`BufferHandle`]s.
//! * [`BufferHandle`] – a reference-counted view on one collection's buffers. The first
//!   handle acquired for a name is the **owner**; later handles are non-owning views over
//!   the same storage.
//! * [`CollectionBuffers`] – count field plus one fixed-capacity [`Buffer`] per field,
//!   rebound on every partition change and overwritten in place on every row.
//! * [`Buffer`] – a typed, fixed-capacity value array.
//!
//! ## Lifetime
//! -----------------
//! The registry only keeps weak references. Storage lives as long as at least one
//! [`BufferHandle`] for it is alive; once the last handle is dropped the buffers are freed
//! and a later acquisition for the same name allocates fresh ones.
//!
//! ## Binding rules
//! -----------------
//! * All handles of a collection must agree on the count-field name and on the capacity.
//!   A disagreement is a [`JetNtupleError::ConfigurationConflict`].
//! * Every field is bound at most once per partition, whichever reader requested it first.
//!   Binding is keyed by the partition generation token issued by
//!   [`BufferRegistry::begin_partition`].
//!
//! ## See also
//! ------------
//! * [`crate::readers`] – the readers acquiring handles from the registry.
//! * [`crate::storage::Partition::read_into`] – fills the buffers for the current row.
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int32Type, Int64Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::Array;
use itertools::Itertools;

use crate::constants::FastHashMap;
use crate::jetntuple_errors::JetNtupleError;
use crate::storage::{FieldHandle, FieldKind, FieldShape, Partition, PartitionSchema};

/// Fixed-capacity typed value array.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

macro_rules! copy_values {
    ($dest:expr, $values:expr, $arrow:ty, $start:expr, $len:expr, $field:expr) => {{
        let src = $values.as_primitive_opt::<$arrow>().ok_or_else(|| {
            JetNtupleError::FieldTypeMismatch {
                field: $field.to_string(),
                expected: stringify!($arrow).trim_end_matches("Type").to_string(),
                found: $values.data_type().to_string(),
            }
        })?;
        for (slot, i) in $dest.iter_mut().zip($start..$start + $len) {
            *slot = if src.is_null(i) {
                Default::default()
            } else {
                src.value(i)
            };
        }
    }};
}

impl Buffer {
    /// Allocate a zero-filled buffer of `capacity` values of `kind`.
    pub fn zeroed(kind: FieldKind, capacity: usize) -> Self {
        match kind {
            FieldKind::F32 => Buffer::F32(vec![0.0; capacity]),
            FieldKind::F64 => Buffer::F64(vec![0.0; capacity]),
            FieldKind::I32 => Buffer::I32(vec![0; capacity]),
            FieldKind::I64 => Buffer::I64(vec![0; capacity]),
            FieldKind::U8 => Buffer::U8(vec![0; capacity]),
            FieldKind::U32 => Buffer::U32(vec![0; capacity]),
            FieldKind::U64 => Buffer::U64(vec![0; capacity]),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Buffer::F32(_) => FieldKind::F32,
            Buffer::F64(_) => FieldKind::F64,
            Buffer::I32(_) => FieldKind::I32,
            Buffer::I64(_) => FieldKind::I64,
            Buffer::U8(_) => FieldKind::U8,
            Buffer::U32(_) => FieldKind::U32,
            Buffer::U64(_) => FieldKind::U64,
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            Buffer::F32(v) => v.len(),
            Buffer::F64(v) => v.len(),
            Buffer::I32(v) => v.len(),
            Buffer::I64(v) => v.len(),
            Buffer::U8(v) => v.len(),
            Buffer::U32(v) => v.len(),
            Buffer::U64(v) => v.len(),
        }
    }

    /// Copy `values[start..start + len]` into the first `len` slots. Nulls are stored as `0`.
    ///
    /// Arguments
    /// -----------------
    /// * `values`: a primitive Arrow array of the same kind as the buffer.
    /// * `start`, `len`: source range; `len` must not exceed the buffer capacity.
    /// * `field`: field name reported on a type mismatch.
    pub fn fill_from(
        &mut self,
        values: &dyn Array,
        start: usize,
        len: usize,
        field: &str,
    ) -> Result<(), JetNtupleError> {
        if start + len > values.len() || len > self.capacity() {
            return Err(JetNtupleError::FieldLengthMismatch {
                field: field.to_string(),
                expected: len,
                found: values.len().saturating_sub(start).min(self.capacity()),
            });
        }
        match self {
            Buffer::F32(dest) => copy_values!(dest, values, Float32Type, start, len, field),
            Buffer::F64(dest) => copy_values!(dest, values, Float64Type, start, len, field),
            Buffer::I32(dest) => copy_values!(dest, values, Int32Type, start, len, field),
            Buffer::I64(dest) => copy_values!(dest, values, Int64Type, start, len, field),
            Buffer::U8(dest) => copy_values!(dest, values, UInt8Type, start, len, field),
            Buffer::U32(dest) => copy_values!(dest, values, UInt32Type, start, len, field),
            Buffer::U64(dest) => copy_values!(dest, values, UInt64Type, start, len, field),
        }
        Ok(())
    }

    /// Value at `i` converted to `f64`. Panics if `i >= capacity`.
    pub fn f64_at(&self, i: usize) -> f64 {
        match self {
            Buffer::F32(v) => v[i] as f64,
            Buffer::F64(v) => v[i],
            Buffer::I32(v) => v[i] as f64,
            Buffer::I64(v) => v[i] as f64,
            Buffer::U8(v) => v[i] as f64,
            Buffer::U32(v) => v[i] as f64,
            Buffer::U64(v) => v[i] as f64,
        }
    }

    /// Value at `i` converted to `i64`, truncating floats. Panics if `i >= capacity`.
    pub fn i64_at(&self, i: usize) -> i64 {
        match self {
            Buffer::F32(v) => v[i] as i64,
            Buffer::F64(v) => v[i] as i64,
            Buffer::I32(v) => v[i] as i64,
            Buffer::I64(v) => v[i],
            Buffer::U8(v) => v[i] as i64,
            Buffer::U32(v) => v[i] as i64,
            Buffer::U64(v) => i64::try_from(v[i]).unwrap_or(i64::MAX),
        }
    }

    /// Value at `i` converted to `u64`; negative values become `0`. Panics if `i >= capacity`.
    pub fn u64_at(&self, i: usize) -> u64 {
        match self {
            Buffer::F32(v) => v[i].max(0.0) as u64,
            Buffer::F64(v) => v[i].max(0.0) as u64,
            Buffer::I32(v) => u64::try_from(v[i]).unwrap_or(0),
            Buffer::I64(v) => u64::try_from(v[i]).unwrap_or(0),
            Buffer::U8(v) => v[i] as u64,
            Buffer::U32(v) => v[i] as u64,
            Buffer::U64(v) => v[i],
        }
    }

    fn count_at(&self, i: usize) -> usize {
        usize::try_from(self.u64_at(i)).unwrap_or(usize::MAX)
    }
}

/// Whether a missing field fails the bind or is silently left unbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRequirement {
    Required,
    Optional,
}

#[derive(Debug)]
struct BoundColumn {
    field: String,
    requirement: FieldRequirement,
    handle: Option<FieldHandle>,
    generation: Option<u64>,
    buffer: Buffer,
}

/// Buffers of one named collection.
///
/// # Fields
///
/// * `name` - collection name (e.g. `FatJet`)
/// * `count_field` - scalar field holding the per-row object count; `None` for scalar
///   collections such as the event record, which always hold exactly one value per field
/// * `capacity` - maximum number of objects per row
/// * `count_handle` / `count_buffer` - binding and storage of the count field
/// * `count` - object count of the current row, possibly above `capacity`
/// * `columns` - registered fields in registration order
/// * `generation` - partition generation the collection is currently bound to
#[derive(Debug)]
pub struct CollectionBuffers {
    name: String,
    count_field: Option<String>,
    capacity: usize,
    count_handle: Option<FieldHandle>,
    count_buffer: Buffer,
    count: usize,
    columns: Vec<BoundColumn>,
    generation: Option<u64>,
}

impl CollectionBuffers {
    fn new(name: &str, count_field: Option<&str>, capacity: usize) -> Self {
        CollectionBuffers {
            name: name.to_string(),
            count_field: count_field.map(str::to_string),
            capacity,
            count_handle: None,
            count_buffer: Buffer::zeroed(FieldKind::U32, 1),
            count: 0,
            columns: Vec::new(),
            generation: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count_field(&self) -> Option<&str> {
        self.count_field.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Object count of the current row (always `1` for scalar collections once loaded).
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    fn shape(&self) -> FieldShape {
        if self.count_field.is_some() {
            FieldShape::List
        } else {
            FieldShape::Scalar
        }
    }

    fn slot_capacity(&self) -> usize {
        match self.shape() {
            FieldShape::List => self.capacity,
            FieldShape::Scalar => 1,
        }
    }

    /// Register `field` and return its slot. Registering a field twice returns the same slot;
    /// a field requested as required by anyone becomes required.
    pub(crate) fn column_slot(&mut self, field: &str, requirement: FieldRequirement) -> usize {
        if let Some(slot) = self.columns.iter().position(|c| c.field == field) {
            let column = &mut self.columns[slot];
            if requirement == FieldRequirement::Required
                && column.requirement == FieldRequirement::Optional
            {
                column.requirement = FieldRequirement::Required;
                column.generation = None;
            }
            return slot;
        }
        self.columns.push(BoundColumn {
            field: field.to_string(),
            requirement,
            handle: None,
            generation: None,
            buffer: Buffer::zeroed(FieldKind::F32, self.slot_capacity()),
        });
        self.columns.len() - 1
    }

    /// Bind the count field and every registered field not yet bound to `schema`'s generation.
    pub(crate) fn bind(&mut self, schema: &PartitionSchema) -> Result<(), JetNtupleError> {
        let generation = schema.generation();
        let shape = self.shape();
        let capacity = self.slot_capacity();

        if self.generation != Some(generation) {
            self.count_handle = match &self.count_field {
                Some(count_field) => {
                    let handle = schema.lookup(count_field)?.ok_or_else(|| {
                        JetNtupleError::MissingField {
                            field: count_field.clone(),
                            partition: schema.label().to_string(),
                        }
                    })?;
                    if handle.shape() != FieldShape::Scalar {
                        return Err(JetNtupleError::FieldTypeMismatch {
                            field: count_field.clone(),
                            expected: FieldShape::Scalar.to_string(),
                            found: handle.shape().to_string(),
                        });
                    }
                    if self.count_buffer.kind() != handle.kind() {
                        self.count_buffer = Buffer::zeroed(handle.kind(), 1);
                    }
                    Some(handle)
                }
                None => None,
            };
            self.count = 0;
            self.generation = Some(generation);
        }

        for column in self
            .columns
            .iter_mut()
            .filter(|c| c.generation != Some(generation))
        {
            let handle = schema.lookup(&column.field)?;
            match &handle {
                None if column.requirement == FieldRequirement::Required => {
                    return Err(JetNtupleError::MissingField {
                        field: column.field.clone(),
                        partition: schema.label().to_string(),
                    });
                }
                Some(h) if h.shape() != shape => {
                    return Err(JetNtupleError::FieldTypeMismatch {
                        field: column.field.clone(),
                        expected: shape.to_string(),
                        found: h.shape().to_string(),
                    });
                }
                Some(h) if h.kind() != column.buffer.kind() => {
                    column.buffer = Buffer::zeroed(h.kind(), capacity);
                }
                _ => {}
            }
            column.handle = handle;
            column.generation = Some(generation);
        }
        Ok(())
    }

    /// Full-schema column indices bound for `generation`.
    fn bound_columns(&self, generation: u64) -> impl Iterator<Item = usize> + '_ {
        let count = self
            .count_handle
            .as_ref()
            .filter(|_| self.generation == Some(generation))
            .map(FieldHandle::column);
        let fields = self
            .columns
            .iter()
            .filter(move |c| c.generation == Some(generation))
            .filter_map(|c| c.handle.as_ref().map(FieldHandle::column));
        count.into_iter().chain(fields)
    }

    /// Overwrite the buffers with the current row of `partition`.
    ///
    /// Does nothing if the collection is not bound to this partition.
    pub(crate) fn load(&mut self, partition: &Partition) -> Result<(), JetNtupleError> {
        let generation = partition.generation();
        if self.generation != Some(generation) {
            return Ok(());
        }

        self.count = match &self.count_handle {
            Some(handle) => {
                partition.read_into(handle, &mut self.count_buffer)?;
                self.count_buffer.count_at(0)
            }
            None => 1,
        };

        let is_list = self.count_field.is_some();
        for column in self
            .columns
            .iter_mut()
            .filter(|c| c.generation == Some(generation))
        {
            let Some(handle) = &column.handle else {
                continue;
            };
            let len = partition.read_into(handle, &mut column.buffer)?;
            if is_list && len != self.count {
                return Err(JetNtupleError::FieldLengthMismatch {
                    field: column.field.clone(),
                    expected: self.count,
                    found: len,
                });
            }
        }
        Ok(())
    }

    /// Slot of an already registered field.
    pub fn slot_of(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }

    pub fn field_name(&self, slot: usize) -> Option<&str> {
        self.columns.get(slot).map(|c| c.field.as_str())
    }

    /// Current values of the field in `slot`, or `None` if the field is absent from the bound
    /// partition.
    pub fn values(&self, slot: usize) -> Option<&Buffer> {
        self.columns
            .get(slot)
            .filter(|c| c.generation.is_some() && c.generation == self.generation)
            .filter(|c| c.handle.is_some())
            .map(|c| &c.buffer)
    }
}

/// View on one collection's buffers.
///
/// Not `Clone`: every view is obtained through [`BufferRegistry::acquire`], which keeps the
/// owner/non-owner distinction meaningful.
#[derive(Debug)]
pub struct BufferHandle {
    buffers: Rc<RefCell<CollectionBuffers>>,
    owner: bool,
}

impl BufferHandle {
    /// Whether this handle allocated the storage.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn name(&self) -> String {
        self.buffers.borrow().name.clone()
    }

    pub fn borrow(&self) -> Ref<'_, CollectionBuffers> {
        self.buffers.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> RefMut<'_, CollectionBuffers> {
        self.buffers.borrow_mut()
    }

    /// Whether both handles view the same physical storage.
    pub fn same_storage(&self, other: &BufferHandle) -> bool {
        Rc::ptr_eq(&self.buffers, &other.buffers)
    }

    /// Number of live handles on this storage.
    pub fn reference_count(&self) -> usize {
        Rc::strong_count(&self.buffers)
    }
}

/// Registry of collection buffers for one pipeline run.
///
/// # Fields
///
/// * `collections` - collection name → weak reference to its buffers
/// * `generation` - last partition generation token issued
#[derive(Debug, Default)]
pub struct BufferRegistry {
    collections: RefCell<FastHashMap<String, Weak<RefCell<CollectionBuffers>>>>,
    generation: Cell<u64>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle on the buffers of `collection`, allocating them on first use.
    ///
    /// Arguments
    /// -----------------
    /// * `collection`: collection name.
    /// * `count_field`: name of the per-row count field, `None` for scalar collections.
    /// * `capacity`: maximum number of objects per row.
    ///
    /// Return
    /// ----------
    /// * An owning handle if the storage was allocated by this call, a non-owning view on the
    ///   existing storage otherwise.
    /// * [`JetNtupleError::ConfigurationConflict`] if the collection already exists with a
    ///   different count field or capacity.
    pub fn acquire(
        &self,
        collection: &str,
        count_field: Option<&str>,
        capacity: usize,
    ) -> Result<BufferHandle, JetNtupleError> {
        let mut collections = self.collections.borrow_mut();

        if let Some(buffers) = collections.get(collection).and_then(Weak::upgrade) {
            {
                let existing = buffers.borrow();
                if existing.count_field() != count_field {
                    return Err(JetNtupleError::ConfigurationConflict(format!(
                        "collection '{collection}' is read with count field {} but was first \
                         acquired with count field {}",
                        count_field.unwrap_or("<none>"),
                        existing.count_field().unwrap_or("<none>"),
                    )));
                }
                if existing.capacity() != capacity {
                    return Err(JetNtupleError::ConfigurationConflict(format!(
                        "collection '{collection}' is read with capacity {capacity} but was \
                         first acquired with capacity {}",
                        existing.capacity()
                    )));
                }
            }
            return Ok(BufferHandle {
                buffers,
                owner: false,
            });
        }

        let buffers = Rc::new(RefCell::new(CollectionBuffers::new(
            collection,
            count_field,
            capacity,
        )));
        collections.insert(collection.to_string(), Rc::downgrade(&buffers));
        Ok(BufferHandle {
            buffers,
            owner: true,
        })
    }

    /// Issue the generation token for the next partition.
    pub fn begin_partition(&self) -> u64 {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        next
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.get()
    }

    fn live(&self) -> Vec<Rc<RefCell<CollectionBuffers>>> {
        let mut collections = self.collections.borrow_mut();
        collections.retain(|_, weak| weak.strong_count() > 0);
        collections.values().filter_map(Weak::upgrade).collect()
    }

    /// Sorted names of collections with at least one live handle.
    pub fn live_collections(&self) -> Vec<String> {
        self.live()
            .iter()
            .map(|b| b.borrow().name.clone())
            .sorted()
            .collect()
    }

    /// Sorted, de-duplicated full-schema column indices bound for `generation`.
    pub fn bound_columns(&self, generation: u64) -> Vec<usize> {
        self.live()
            .iter()
            .flat_map(|b| b.borrow().bound_columns(generation).collect::<Vec<_>>())
            .sorted_unstable()
            .dedup()
            .collect()
    }

    /// Load the current row of `partition` into every live collection bound to it.
    pub fn load_row(&self, partition: &Partition) -> Result<(), JetNtupleError> {
        for buffers in self.live() {
            buffers.borrow_mut().load(partition)?;
        }
        Ok(())
    }
}
