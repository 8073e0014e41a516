//! # jetntuple
//!
//! Conversion of per-event jet collections stored as columnar records (one list column per
//! jet quantity, nanoAOD style) into flat JRA ntuple rows.
//!
//! ## Overview
//! -----------------
//! * [`storage`] – Arrow/Parquet partitions and their schemas.
//! * [`buffer_registry`] – one shared set of buffers per collection, whoever reads it.
//! * [`readers`] – bind to a partition schema, then materialize typed objects per row.
//! * [`partition_iterator`] – one row stream over many partitions, with an event ceiling.
//! * [`gen_matcher`] – nearest-neighbour reco ↔ truth association in `(η, φ)`.
//! * [`correction`] – raw-scale recovery and jet energy corrections.
//! * [`output`] – JRA rows and the sinks they are written to.
//! * [`filler`] – the end-to-end pipeline, configured by [`config`].
pub mod buffer_registry;
pub mod config;
pub mod constants;
pub mod correction;
pub mod filler;
pub mod gen_matcher;
pub mod jetntuple_errors;
pub mod kinematics;
pub mod objects;
pub mod output;
pub mod partition_iterator;
pub mod readers;
pub mod storage;

#[cfg(feature = "progress")]
pub mod progress_bar;
