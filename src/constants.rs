//! # Constants and type definitions for jetntuple
//!
//! This module centralizes the **numerical thresholds**, **default capacities**, and **common
//! type aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Angular constants used by the geometric matcher
//! - Default capacities and batch sizes for the columnar readers
//! - Degeneracy threshold of the correction stage
//! - Fixed field names of the event-level record
//! - Core type aliases shared by readers, matcher and output

use ahash::RandomState;
use std::collections::HashMap;

// -------------------------------------------------------------------------------------------------
// Angular constants
// -------------------------------------------------------------------------------------------------

/// 2π, used to wrap azimuthal differences
pub const DPI: f64 = 2. * std::f64::consts::PI;

// -------------------------------------------------------------------------------------------------
// Reader and storage defaults
// -------------------------------------------------------------------------------------------------

/// Default maximum number of objects stored per event in a jet collection
pub const DEFAULT_MAX_JETS: usize = 256;

/// Default number of rows decoded per Arrow record batch
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Default number of output rows buffered before a record batch is written
pub const DEFAULT_ROWS_PER_GROUP: usize = 1024;

/// Registry key of the scalar event-level pseudo-collection.
///
/// The angle brackets keep it disjoint from any real collection name.
pub const EVENT_INFO_COLLECTION: &str = "<event>";

/// Field holding the run number
pub const RUN_FIELD: &str = "run";

/// Field holding the luminosity-section id
pub const LUMI_FIELD: &str = "luminosityBlock";

/// Field holding the event id
pub const EVENT_FIELD: &str = "event";

// -------------------------------------------------------------------------------------------------
// Correction stage
// -------------------------------------------------------------------------------------------------

/// Smallest accepted `1 - rawFactor`; jets at or below this are dropped as degenerate
pub const MIN_RAW_SCALE: f64 = 1.0e-3;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Pseudorapidity (dimensionless)
pub type Eta = f64;

/// Azimuthal angle in radians
pub type Phi = f64;

/// Transverse momentum in GeV
pub type GeV = f64;

/// Index of a truth object inside the per-event truth collection
pub type TruthIndex = usize;

/// Hash map with the `ahash` hasher, used for name-keyed lookups.
pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;
