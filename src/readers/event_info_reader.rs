use super::{RecordReader, SchemaBinder};
use crate::buffer_registry::{BufferHandle, BufferRegistry, FieldRequirement};
use crate::constants::{EVENT_FIELD, EVENT_INFO_COLLECTION, LUMI_FIELD, RUN_FIELD};
use crate::jetntuple_errors::JetNtupleError;
use crate::objects::EventInfo;
use crate::storage::PartitionSchema;

/// Source field names of the configurable event quantities.
///
/// `None` or an empty name means the quantity is not read; it is then `None` in the
/// materialized [`EventInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventInfoSources {
    pub num_pu: Option<String>,
    pub num_pu_true: Option<String>,
    pub num_vertices: Option<String>,
    pub vertex_z: Option<String>,
    pub rho: Option<String>,
    pub weight: Option<String>,
    pub pt_hat: Option<String>,
    pub pu_density: Option<String>,
    pub gen_pu_density: Option<String>,
}

impl EventInfoSources {
    fn configured(name: &Option<String>) -> Option<&str> {
        name.as_deref().filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
struct EventSlots {
    run: usize,
    lumi: usize,
    event: usize,
    num_pu: Option<usize>,
    num_pu_true: Option<usize>,
    num_vertices: Option<usize>,
    vertex_z: Option<usize>,
    rho: Option<usize>,
    weight: Option<usize>,
    pt_hat: Option<usize>,
    pu_density: Option<usize>,
    gen_pu_density: Option<usize>,
}

/// Scalar reader of the event-level record.
///
/// Run, luminosity section and event id are read from fixed field names. Every configured
/// source in [`EventInfoSources`] must exist in each partition.
#[derive(Debug)]
pub struct EventInfoReader {
    sources: EventInfoSources,
    handle: Option<BufferHandle>,
    slots: Option<EventSlots>,
}

impl EventInfoReader {
    pub fn new(sources: EventInfoSources) -> Self {
        EventInfoReader {
            sources,
            handle: None,
            slots: None,
        }
    }

    pub fn sources(&self) -> &EventInfoSources {
        &self.sources
    }

    pub fn handle(&self) -> Option<&BufferHandle> {
        self.handle.as_ref()
    }

    fn register(&self, handle: &BufferHandle) -> EventSlots {
        let mut buffers = handle.borrow_mut();
        let mut slot = |name: &str| buffers.column_slot(name, FieldRequirement::Required);
        let run = slot(RUN_FIELD);
        let lumi = slot(LUMI_FIELD);
        let event = slot(EVENT_FIELD);

        let s = &self.sources;
        let mut configured =
            |name: &Option<String>| EventInfoSources::configured(name).map(&mut slot);
        EventSlots {
            run,
            lumi,
            event,
            num_pu: configured(&s.num_pu),
            num_pu_true: configured(&s.num_pu_true),
            num_vertices: configured(&s.num_vertices),
            vertex_z: configured(&s.vertex_z),
            rho: configured(&s.rho),
            weight: configured(&s.weight),
            pt_hat: configured(&s.pt_hat),
            pu_density: configured(&s.pu_density),
            gen_pu_density: configured(&s.gen_pu_density),
        }
    }
}

impl SchemaBinder for EventInfoReader {
    fn collection(&self) -> &str {
        EVENT_INFO_COLLECTION
    }

    fn bind(
        &mut self,
        schema: &PartitionSchema,
        registry: &BufferRegistry,
    ) -> Result<(), JetNtupleError> {
        if self.handle.is_none() {
            let handle = registry.acquire(EVENT_INFO_COLLECTION, None, 1)?;
            self.slots = Some(self.register(&handle));
            self.handle = Some(handle);
        }
        match &self.handle {
            Some(handle) => handle.borrow_mut().bind(schema),
            None => Err(JetNtupleError::ReaderNotBound(
                EVENT_INFO_COLLECTION.to_string(),
            )),
        }
    }
}

impl RecordReader for EventInfoReader {
    type Record = EventInfo;

    fn materialize(&self) -> Result<EventInfo, JetNtupleError> {
        let not_bound = || JetNtupleError::ReaderNotBound(EVENT_INFO_COLLECTION.to_string());
        let (handle, slots) = self
            .handle
            .as_ref()
            .zip(self.slots.as_ref())
            .ok_or_else(not_bound)?;
        let buffers = handle.borrow();
        if buffers.generation().is_none() {
            return Err(not_bound());
        }

        let f64_of = |slot: Option<usize>| slot.and_then(|s| buffers.values(s)).map(|b| b.f64_at(0));
        let i32_of = |slot: Option<usize>| {
            slot.and_then(|s| buffers.values(s))
                .map(|b| b.i64_at(0) as i32)
        };
        let u64_of = |slot: usize| buffers.values(slot).map_or(0, |b| b.u64_at(0));
        let u32_of = |slot: usize, field: &str| {
            let value = u64_of(slot);
            u32::try_from(value).map_err(|_| JetNtupleError::FieldTypeMismatch {
                field: field.to_string(),
                expected: "UInt32".to_string(),
                found: format!("out-of-range value {value}"),
            })
        };

        Ok(EventInfo {
            run: u32_of(slots.run, RUN_FIELD)?,
            lumi: u32_of(slots.lumi, LUMI_FIELD)?,
            event: u64_of(slots.event),
            num_pu: i32_of(slots.num_pu),
            num_pu_true: f64_of(slots.num_pu_true),
            num_vertices: i32_of(slots.num_vertices),
            vertex_z: f64_of(slots.vertex_z),
            rho: f64_of(slots.rho),
            weight: f64_of(slots.weight),
            pt_hat: f64_of(slots.pt_hat),
            pu_density: f64_of(slots.pu_density),
            gen_pu_density: f64_of(slots.gen_pu_density),
        })
    }
}

#[cfg(test)]
mod event_info_reader_test {
    use std::sync::Arc;

    use arrow_array::{ArrayRef, Float32Array, RecordBatch, UInt32Array, UInt64Array};

    use super::*;
    use crate::storage::Partition;

    fn partition(generation: u64) -> Partition {
        let batch = RecordBatch::try_from_iter(vec![
            ("run", Arc::new(UInt32Array::from(vec![1, 1])) as ArrayRef),
            ("luminosityBlock", Arc::new(UInt32Array::from(vec![7, 7])) as ArrayRef),
            ("event", Arc::new(UInt64Array::from(vec![100, 101])) as ArrayRef),
            ("fixedGridRhoFastjetAll", Arc::new(Float32Array::from(vec![12.5, 3.0])) as ArrayRef),
        ])
        .unwrap();
        Partition::from_batches("mem", generation, batch.schema(), vec![batch]).unwrap()
    }

    #[test]
    fn test_materialize_event_info() {
        let registry = BufferRegistry::new();
        let mut reader = EventInfoReader::new(EventInfoSources {
            rho: Some("fixedGridRhoFastjetAll".to_string()),
            weight: Some(String::new()),
            ..Default::default()
        });
        assert!(matches!(
            reader.materialize(),
            Err(JetNtupleError::ReaderNotBound(_))
        ));

        let generation = registry.begin_partition();
        let mut part = partition(generation);
        reader.bind(part.schema(), &registry).unwrap();
        part.start(&registry.bound_columns(generation)).unwrap();

        assert!(part.advance().unwrap());
        registry.load_row(&part).unwrap();
        let info = reader.materialize().unwrap();
        assert_eq!((info.run, info.lumi, info.event), (1, 7, 100));
        assert_eq!(info.rho, Some(12.5));
        assert_eq!(info.weight, None);
        assert_eq!(info.weight_or_unit(), 1.0);
        assert_eq!(reader.materialize().unwrap(), info);

        assert!(part.advance().unwrap());
        registry.load_row(&part).unwrap();
        assert_eq!(reader.materialize().unwrap().event, 101);
    }

    #[test]
    fn test_out_of_range_run_is_rejected() {
        let registry = BufferRegistry::new();
        let mut reader = EventInfoReader::new(EventInfoSources::default());
        let batch = RecordBatch::try_from_iter(vec![
            ("run", Arc::new(UInt64Array::from(vec![u64::from(u32::MAX) + 1])) as ArrayRef),
            ("luminosityBlock", Arc::new(UInt32Array::from(vec![7])) as ArrayRef),
            ("event", Arc::new(UInt64Array::from(vec![100])) as ArrayRef),
        ])
        .unwrap();
        let generation = registry.begin_partition();
        let mut part = Partition::from_batches("mem", generation, batch.schema(), vec![batch]).unwrap();
        reader.bind(part.schema(), &registry).unwrap();
        part.start(&registry.bound_columns(generation)).unwrap();

        assert!(part.advance().unwrap());
        registry.load_row(&part).unwrap();
        assert!(matches!(
            reader.materialize(),
            Err(JetNtupleError::FieldTypeMismatch { ref field, .. }) if field == "run"
        ));
    }

    #[test]
    fn test_configured_field_missing() {
        let registry = BufferRegistry::new();
        let mut reader = EventInfoReader::new(EventInfoSources {
            num_pu: Some("Pileup_nPU".to_string()),
            ..Default::default()
        });
        let part = partition(registry.begin_partition());
        assert_eq!(
            reader.bind(part.schema(), &registry),
            Err(JetNtupleError::MissingField {
                field: "Pileup_nPU".to_string(),
                partition: "mem".to_string(),
            })
        );
    }
}
