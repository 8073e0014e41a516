use super::{CollectionLayout, GenJetLayout, ObjectView, RecoJetLayout, RecordReader, SchemaBinder};
use crate::buffer_registry::{BufferHandle, BufferRegistry};
use crate::constants::DEFAULT_MAX_JETS;
use crate::jetntuple_errors::JetNtupleError;
use crate::storage::PartitionSchema;

/// Reader of reconstructed jets.
pub type RecoJetReader = CollectionReader<RecoJetLayout>;

/// Reader of generator-level jets.
pub type GenJetReader = CollectionReader<GenJetLayout>;

/// Array reader: materializes objects `0..count` of one collection.
///
/// # Fields
///
/// * `collection` - collection name, prefix of every field name
/// * `count_field` - name of the per-row object count (default `n{collection}`)
/// * `capacity` - maximum number of objects per row
/// * `layout` - quantities read and how an object is built from them
/// * `handle` - shared buffers, acquired at the first bind
/// * `slots` - buffer slot of every layout quantity
#[derive(Debug)]
pub struct CollectionReader<L> {
    collection: String,
    count_field: String,
    capacity: usize,
    layout: L,
    handle: Option<BufferHandle>,
    slots: Vec<usize>,
}

impl<L: CollectionLayout> CollectionReader<L> {
    pub fn new(collection: impl Into<String>, layout: L) -> Self {
        let collection = collection.into();
        CollectionReader {
            count_field: format!("n{collection}"),
            collection,
            capacity: DEFAULT_MAX_JETS,
            layout,
            handle: None,
            slots: Vec::new(),
        }
    }

    /// Use `count_field` instead of `n{collection}`. Ignored once the reader is bound.
    pub fn with_count_field(mut self, count_field: impl Into<String>) -> Self {
        self.count_field = count_field.into();
        self
    }

    /// Maximum number of objects per row. Ignored once the reader is bound.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn count_field(&self) -> &str {
        &self.count_field
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    pub fn handle(&self) -> Option<&BufferHandle> {
        self.handle.as_ref()
    }

    /// Full field name of `quantity`, e.g. `FatJet_pt`.
    pub fn field_name(&self, quantity: &str) -> String {
        format!("{}_{}", self.collection, quantity)
    }

    fn acquire(&mut self, registry: &BufferRegistry) -> Result<&BufferHandle, JetNtupleError> {
        if self.handle.is_none() {
            let handle =
                registry.acquire(&self.collection, Some(&self.count_field), self.capacity)?;
            self.slots = {
                let mut buffers = handle.borrow_mut();
                self.layout
                    .fields()
                    .iter()
                    .map(|spec| {
                        buffers.column_slot(&self.field_name(spec.quantity), spec.requirement)
                    })
                    .collect()
            };
            self.handle = Some(handle);
        }
        self.handle
            .as_ref()
            .ok_or_else(|| JetNtupleError::ReaderNotBound(self.collection.clone()))
    }
}

impl<L: CollectionLayout> SchemaBinder for CollectionReader<L> {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn bind(
        &mut self,
        schema: &PartitionSchema,
        registry: &BufferRegistry,
    ) -> Result<(), JetNtupleError> {
        let handle = self.acquire(registry)?;
        handle.borrow_mut().bind(schema)
    }
}

impl<L: CollectionLayout> RecordReader for CollectionReader<L> {
    type Record = Vec<L::Object>;

    /// Return
    /// ----------
    /// * The objects of the current row in input order,
    /// * [`JetNtupleError::CapacityExceeded`] if the row holds more objects than the capacity,
    /// * [`JetNtupleError::ReaderNotBound`] if the reader was never bound.
    fn materialize(&self) -> Result<Vec<L::Object>, JetNtupleError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| JetNtupleError::ReaderNotBound(self.collection.clone()))?;
        let buffers = handle.borrow();
        if buffers.generation().is_none() {
            return Err(JetNtupleError::ReaderNotBound(self.collection.clone()));
        }

        let count = buffers.count();
        if count > buffers.capacity() {
            return Err(JetNtupleError::CapacityExceeded {
                collection: self.collection.clone(),
                count,
                capacity: buffers.capacity(),
            });
        }

        Ok((0..count)
            .map(|index| {
                self.layout
                    .build(&ObjectView::new(&buffers, &self.slots, index))
            })
            .collect())
    }
}
