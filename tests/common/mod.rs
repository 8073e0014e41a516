#![allow(dead_code)]

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow_array::builder::{Float32Builder, Int32Builder, ListBuilder};
use arrow_array::{ArrayRef, Float32Array, RecordBatch, UInt32Array, UInt64Array};
use camino::Utf8PathBuf;
use parquet::arrow::ArrowWriter;

/// `(pt, eta, phi, mass, rawFactor)`
pub type RecoSpec = (f32, f32, f32, f32, f32);

/// `(pt, eta, phi, mass, partonFlavour)`
pub type GenSpec = (f32, f32, f32, f32, i32);

/// One nanoAOD-like event with a `Jet` and a `GenJet` collection.
#[derive(Debug, Clone, Default)]
pub struct NanoEvent {
    pub event: u64,
    pub rho: f32,
    pub weight: f32,
    pub reco: Vec<RecoSpec>,
    pub gen: Vec<GenSpec>,
}

impl NanoEvent {
    pub fn new(event: u64) -> Self {
        NanoEvent {
            event,
            rho: 12.0,
            weight: 1.0,
            ..NanoEvent::default()
        }
    }

    pub fn with_reco(mut self, reco: RecoSpec) -> Self {
        self.reco.push(reco);
        self
    }

    pub fn with_gen(mut self, gen: GenSpec) -> Self {
        self.gen.push(gen);
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }
}

/// Event with two reconstructed jets at `(1.0, 0.0)` and `(-1.0, 1.0)` and two truth jets
/// at `(1.05, 0.02)` and `(3.0, 3.0)`.
pub fn reference_event(event: u64) -> NanoEvent {
    NanoEvent::new(event)
        .with_reco((100.0, 1.0, 0.0, 10.0, 0.0))
        .with_reco((40.0, -1.0, 1.0, 5.0, 0.0))
        .with_gen((95.0, 1.05, 0.02, 9.0, 21))
        .with_gen((30.0, 3.0, 3.0, 3.0, 1))
}

fn f32_lists<F: Fn(&NanoEvent) -> Vec<f32>>(events: &[NanoEvent], f: F) -> ArrayRef {
    let mut builder = ListBuilder::new(Float32Builder::new());
    for event in events {
        builder.values().append_slice(&f(event));
        builder.append(true);
    }
    Arc::new(builder.finish())
}

fn i32_lists<F: Fn(&NanoEvent) -> Vec<i32>>(events: &[NanoEvent], f: F) -> ArrayRef {
    let mut builder = ListBuilder::new(Int32Builder::new());
    for event in events {
        builder.values().append_slice(&f(event));
        builder.append(true);
    }
    Arc::new(builder.finish())
}

fn scalar_u32<F: Fn(&NanoEvent) -> u32>(events: &[NanoEvent], f: F) -> ArrayRef {
    Arc::new(UInt32Array::from_iter_values(events.iter().map(f)))
}

fn scalar_f32<F: Fn(&NanoEvent) -> f32>(events: &[NanoEvent], f: F) -> ArrayRef {
    Arc::new(Float32Array::from_iter_values(events.iter().map(f)))
}

/// Record batch with one row per event.
pub fn nano_batch(events: &[NanoEvent]) -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("run", scalar_u32(events, |_| 1)),
        ("luminosityBlock", scalar_u32(events, |e| (e.event / 100) as u32 + 1)),
        (
            "event",
            Arc::new(UInt64Array::from_iter_values(events.iter().map(|e| e.event))) as ArrayRef,
        ),
        ("fixedGridRhoFastjetAll", scalar_f32(events, |e| e.rho)),
        ("genWeight", scalar_f32(events, |e| e.weight)),
        ("nJet", scalar_u32(events, |e| e.reco.len() as u32)),
        ("Jet_pt", f32_lists(events, |e| e.reco.iter().map(|j| j.0).collect())),
        ("Jet_eta", f32_lists(events, |e| e.reco.iter().map(|j| j.1).collect())),
        ("Jet_phi", f32_lists(events, |e| e.reco.iter().map(|j| j.2).collect())),
        ("Jet_mass", f32_lists(events, |e| e.reco.iter().map(|j| j.3).collect())),
        ("Jet_area", f32_lists(events, |e| vec![0.5; e.reco.len()])),
        ("Jet_rawFactor", f32_lists(events, |e| e.reco.iter().map(|j| j.4).collect())),
        ("Jet_jetId", i32_lists(events, |e| vec![6; e.reco.len()])),
        ("Jet_chHEF", f32_lists(events, |e| vec![0.6; e.reco.len()])),
        ("nGenJet", scalar_u32(events, |e| e.gen.len() as u32)),
        ("GenJet_pt", f32_lists(events, |e| e.gen.iter().map(|j| j.0).collect())),
        ("GenJet_eta", f32_lists(events, |e| e.gen.iter().map(|j| j.1).collect())),
        ("GenJet_phi", f32_lists(events, |e| e.gen.iter().map(|j| j.2).collect())),
        ("GenJet_mass", f32_lists(events, |e| e.gen.iter().map(|j| j.3).collect())),
        (
            "GenJet_partonFlavour",
            i32_lists(events, |e| e.gen.iter().map(|j| j.4).collect()),
        ),
        ("GenJet_hadronFlavour", i32_lists(events, |e| vec![0; e.gen.len()])),
    ])
    .unwrap()
}

/// Write `batch` to `dir/name` and return the file path.
pub fn write_parquet(dir: &Path, name: &str, batch: &RecordBatch) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(dir.join(name)).unwrap();
    let file = File::create(&path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
    path
}

/// Events numbered from `first`, each with one matched jet.
pub fn simple_events(first: u64, n: u64) -> Vec<NanoEvent> {
    (first..first + n)
        .map(|event| {
            NanoEvent::new(event)
                .with_reco((50.0, 0.5, 0.5, 5.0, 0.1))
                .with_gen((48.0, 0.52, 0.5, 5.0, 2))
        })
        .collect()
}
