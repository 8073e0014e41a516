//! # Record readers
//!
//! Readers turn the shared buffers of [`crate::buffer_registry`] into typed physics objects.
//! They work in two phases:
//!
//! 1. **bind** – called once per partition, before the first row is read. The reader
//!    lazily acquires its [`BufferHandle`](crate::buffer_registry::BufferHandle), registers
//!    the fields it needs and resolves them against the partition schema.
//! 2. **materialize** – called once per row, after the registry has loaded the row. The
//!    reader copies the current buffer contents into fresh value objects.
//!
//! ## Overview
//! -----------------
//! * [`SchemaBinder`] – the object-safe bind half, used by
//!   [`PartitionIterator`](crate::partition_iterator::PartitionIterator) to rebind every reader
//!   on a partition change.
//! * [`RecordReader`] – adds `materialize` with the reader's record type.
//! * [`EventInfoReader`] – scalar reader producing one [`EventInfo`](crate::objects::EventInfo).
//! * [`CollectionReader`] – array reader producing `count` objects; what a row of the
//!   collection looks like is described by a [`CollectionLayout`]
//!   ([`RecoJetLayout`], [`GenJetLayout`]).
//!
//! ## Field names
//! -----------------
//! Array fields are named `{collection}_{quantity}`, and the count field defaults to
//! `n{collection}`. Several readers may read the same collection; they then share one set of
//! buffers and must agree on the count field.
use crate::buffer_registry::{Buffer, BufferRegistry, CollectionBuffers, FieldRequirement};
use crate::jetntuple_errors::JetNtupleError;
use crate::storage::PartitionSchema;

pub mod collection_reader;
pub mod event_info_reader;
pub mod jet_layouts;

pub use collection_reader::{CollectionReader, GenJetReader, RecoJetReader};
pub use event_info_reader::{EventInfoReader, EventInfoSources};
pub use jet_layouts::{GenJetLayout, RecoJetLayout};

/// Bind half of a reader.
pub trait SchemaBinder {
    /// Name of the collection the reader reads.
    fn collection(&self) -> &str;

    /// Acquire buffers on first use and bind every field of the reader to `schema`.
    ///
    /// Return
    /// ----------
    /// * [`JetNtupleError::MissingField`] if a required field is absent,
    /// * [`JetNtupleError::ConfigurationConflict`] if the collection is shared with a reader
    ///   using another count field.
    fn bind(
        &mut self,
        schema: &PartitionSchema,
        registry: &BufferRegistry,
    ) -> Result<(), JetNtupleError>;
}

/// A reader producing one typed record per row.
pub trait RecordReader: SchemaBinder {
    type Record;

    /// Build the record of the current row. Calling it twice on the same row gives the same
    /// record.
    fn materialize(&self) -> Result<Self::Record, JetNtupleError>;
}

/// One quantity read by a [`CollectionLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub quantity: &'static str,
    pub requirement: FieldRequirement,
}

impl FieldSpec {
    pub const fn required(quantity: &'static str) -> Self {
        FieldSpec {
            quantity,
            requirement: FieldRequirement::Required,
        }
    }

    pub const fn optional(quantity: &'static str) -> Self {
        FieldSpec {
            quantity,
            requirement: FieldRequirement::Optional,
        }
    }
}

/// Read access to object `index` of a loaded collection.
///
/// Quantities are addressed by their position in [`CollectionLayout::fields`].
pub struct ObjectView<'a> {
    buffers: &'a CollectionBuffers,
    slots: &'a [usize],
    index: usize,
}

impl<'a> ObjectView<'a> {
    pub(crate) fn new(buffers: &'a CollectionBuffers, slots: &'a [usize], index: usize) -> Self {
        ObjectView {
            buffers,
            slots,
            index,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn buffer(&self, quantity: usize) -> Option<&Buffer> {
        self.slots
            .get(quantity)
            .and_then(|&slot| self.buffers.values(slot))
    }

    /// Value of `quantity`, `None` if the field is absent from the partition.
    pub fn f64(&self, quantity: usize) -> Option<f64> {
        self.buffer(quantity).map(|b| b.f64_at(self.index))
    }

    pub fn i64(&self, quantity: usize) -> Option<i64> {
        self.buffer(quantity).map(|b| b.i64_at(self.index))
    }
}

/// Shape of one object of an array collection.
pub trait CollectionLayout {
    type Object;

    /// Quantities to bind, in the order [`ObjectView`] addresses them.
    fn fields(&self) -> Vec<FieldSpec>;

    /// Build one object from the loaded buffers.
    fn build(&self, view: &ObjectView<'_>) -> Self::Object;
}
