//! # Run configuration
//!
//! A run is described by a TOML file deserialized into [`FillerConfig`]:
//!
//! ```toml
//! debug = false
//!
//! [input]
//! files = ["nano_1.parquet", "nano_2.parquet"]
//! max_events = -1          # <= 0: no ceiling
//! report_every = 10000
//!
//! [output]
//! file = "jra.parquet"
//! collection = "ak8puppi/t"
//! flags = 101
//!
//! [jets]
//! src_reco_jets = "FatJet"
//! src_gen_jets = "GenJetAK8"
//! dr_match = 0.4
//! min_pt_rel = -1.0        # < 0: no cut
//!
//! [event]
//! src_num_pu = "Pileup_nPU"
//! src_rho = "fixedGridRhoFastjetAll"
//! src_weight = "genWeight"
//!
//! [correction]
//! levels = "l1l2l3"
//! path = "corrections"
//! l1 = "L1FastJet.csv"
//! l2 = "L2Relative.csv"
//! l3 = "L3Absolute.csv"
//! ```
//!
//! Unknown keys are rejected. Every problem found while loading or validating is reported
//! as [`JetNtupleError::ConfigurationConflict`].
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_JETS, DEFAULT_ROWS_PER_GROUP};
use crate::correction::{CorrectionLevelKind, CorrectionStage, FactorizedCorrector};
use crate::gen_matcher::MatchParams;
use crate::jetntuple_errors::JetNtupleError;
use crate::output::OutputFlags;
use crate::partition_iterator::RowLimit;
use crate::readers::EventInfoSources;
use crate::storage::ParquetFiles;

fn default_max_events() -> i64 {
    -1
}

fn default_report_every() -> u64 {
    10_000
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_flags() -> u32 {
    OutputFlags::default().bits()
}

fn default_rows_per_group() -> usize {
    DEFAULT_ROWS_PER_GROUP
}

fn default_max_jets() -> usize {
    DEFAULT_MAX_JETS
}

fn default_dr_match() -> f64 {
    0.25
}

fn default_min_pt_rel() -> f64 {
    -1.0
}

fn default_correction_path() -> Utf8PathBuf {
    Utf8PathBuf::from(".")
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    pub files: Vec<Utf8PathBuf>,
    #[serde(default = "default_max_events")]
    pub max_events: i64,
    #[serde(default = "default_report_every")]
    pub report_every: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub file: Utf8PathBuf,
    pub collection: String,
    #[serde(default = "default_flags")]
    pub flags: u32,
    #[serde(default = "default_rows_per_group")]
    pub rows_per_group: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JetConfig {
    pub src_reco_jets: String,
    pub src_gen_jets: String,
    #[serde(default)]
    pub reco_count_field: Option<String>,
    #[serde(default)]
    pub gen_count_field: Option<String>,
    #[serde(default = "default_max_jets")]
    pub max_jets: usize,
    #[serde(default)]
    pub energy_fractions: bool,
    #[serde(default = "default_dr_match")]
    pub dr_match: f64,
    #[serde(default = "default_min_pt_rel")]
    pub min_pt_rel: f64,
}

/// Source field names of the event quantities; empty or absent means not read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EventConfig {
    pub src_num_pu: Option<String>,
    pub src_num_pu_true: Option<String>,
    pub src_num_vertices: Option<String>,
    pub src_vertex_z: Option<String>,
    pub src_rho: Option<String>,
    pub src_weight: Option<String>,
    pub src_pt_hat: Option<String>,
    pub src_pu_density: Option<String>,
    pub src_gen_pu_density: Option<String>,
}

/// Jet energy correction tables. An empty `levels` string disables corrections.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionConfig {
    #[serde(default)]
    pub levels: String,
    #[serde(default = "default_correction_path")]
    pub path: Utf8PathBuf,
    #[serde(default)]
    pub l1: Option<String>,
    #[serde(default)]
    pub l2: Option<String>,
    #[serde(default)]
    pub l3: Option<String>,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        CorrectionConfig {
            levels: String::new(),
            path: default_correction_path(),
            l1: None,
            l2: None,
            l3: None,
        }
    }
}

impl CorrectionConfig {
    /// Table of each requested level, in application order.
    pub fn tables(&self) -> Result<Vec<(CorrectionLevelKind, Utf8PathBuf)>, JetNtupleError> {
        CorrectionLevelKind::parse_levels(&self.levels)?
            .into_iter()
            .map(|kind| {
                let file = match kind {
                    CorrectionLevelKind::L1Offset => &self.l1,
                    CorrectionLevelKind::L2Relative => &self.l2,
                    CorrectionLevelKind::L3Absolute => &self.l3,
                };
                match file.as_deref().filter(|f| !f.is_empty()) {
                    Some(file) => Ok((kind, self.path.join(file))),
                    None => Err(JetNtupleError::ConfigurationConflict(format!(
                        "jet correction level {kind} requested but no table given"
                    ))),
                }
            })
            .collect()
    }
}

/// Complete description of a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FillerConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub jets: JetConfig,
    #[serde(default)]
    pub event: EventConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub debug: bool,
}

impl FillerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, JetNtupleError> {
        let config: FillerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Utf8Path) -> Result<Self, JetNtupleError> {
        let content = fs::read_to_string(path).map_err(|err| {
            JetNtupleError::ConfigurationConflict(format!(
                "unable to read configuration '{path}': {err}"
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Check the values serde cannot check.
    pub fn validate(&self) -> Result<(), JetNtupleError> {
        let conflict = |msg: &str| Err(JetNtupleError::ConfigurationConflict(msg.to_string()));
        if self.input.files.is_empty() {
            return conflict("no input file given");
        }
        if self.input.batch_size == 0 {
            return conflict("input.batch_size must be positive");
        }
        if self.output.collection.is_empty() {
            return conflict("output.collection must not be empty");
        }
        if self.jets.src_reco_jets.is_empty() || self.jets.src_gen_jets.is_empty() {
            return conflict("jets.src_reco_jets and jets.src_gen_jets must not be empty");
        }
        if self.jets.max_jets == 0 {
            return conflict("jets.max_jets must be positive");
        }
        self.match_params()?;
        self.correction.tables()?;
        Ok(())
    }

    pub fn match_params(&self) -> Result<MatchParams, JetNtupleError> {
        MatchParams::builder()
            .dr_match(self.jets.dr_match)
            .min_pt_rel(Some(self.jets.min_pt_rel))
            .build()
    }

    pub fn event_sources(&self) -> EventInfoSources {
        let e = &self.event;
        EventInfoSources {
            num_pu: e.src_num_pu.clone(),
            num_pu_true: e.src_num_pu_true.clone(),
            num_vertices: e.src_num_vertices.clone(),
            vertex_z: e.src_vertex_z.clone(),
            rho: e.src_rho.clone(),
            weight: e.src_weight.clone(),
            pt_hat: e.src_pt_hat.clone(),
            pu_density: e.src_pu_density.clone(),
            gen_pu_density: e.src_gen_pu_density.clone(),
        }
    }

    pub fn row_limit(&self) -> RowLimit {
        RowLimit::from_signed(self.input.max_events)
    }

    pub fn output_flags(&self) -> OutputFlags {
        OutputFlags::from_bits(self.output.flags)
    }

    /// Load the requested correction tables.
    pub fn correction_stage(&self) -> Result<CorrectionStage, JetNtupleError> {
        let tables = self.correction.tables()?;
        if tables.is_empty() {
            return Ok(CorrectionStage::uncorrected());
        }
        let corrector =
            FactorizedCorrector::from_tables(tables.iter().map(|(kind, path)| (*kind, path.as_path())))?;
        Ok(CorrectionStage::new(Box::new(corrector)))
    }

    pub fn partition_source(&self) -> ParquetFiles {
        ParquetFiles::new(self.input.files.iter().cloned()).with_batch_size(self.input.batch_size)
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    const MINIMAL: &str = r#"
        [input]
        files = ["a.parquet", "b.parquet"]

        [output]
        file = "jra.parquet"
        collection = "ak4pfchs/t"

        [jets]
        src_reco_jets = "Jet"
        src_gen_jets = "GenJet"
    "#;

    #[test]
    fn test_defaults() {
        let config = FillerConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.input.files.len(), 2);
        assert_eq!(config.row_limit(), RowLimit::unlimited());
        assert_eq!(config.input.report_every, 10_000);
        assert_eq!(config.output.flags, 101);
        assert_eq!(config.jets.max_jets, DEFAULT_MAX_JETS);
        assert!(!config.debug);

        let params = config.match_params().unwrap();
        assert_eq!(params.dr_match(), 0.25);
        assert_eq!(params.min_pt_rel(), None);

        assert_eq!(config.event_sources(), EventInfoSources::default());
        assert!(!config.correction_stage().unwrap().is_enabled());
    }

    #[test]
    fn test_missing_and_unknown_keys() {
        let missing = MINIMAL.replace("src_gen_jets = \"GenJet\"", "");
        assert!(matches!(
            FillerConfig::from_toml_str(&missing),
            Err(JetNtupleError::ConfigurationConflict(_))
        ));

        let unknown = format!("{MINIMAL}\nmin_jet_pt = 10.0\n");
        assert!(matches!(
            FillerConfig::from_toml_str(&unknown),
            Err(JetNtupleError::ConfigurationConflict(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let dr = MINIMAL.replace("src_gen_jets = \"GenJet\"", "src_gen_jets = \"GenJet\"\ndr_match = 0.0");
        assert!(FillerConfig::from_toml_str(&dr).is_err());

        let jets = MINIMAL.replace("src_gen_jets = \"GenJet\"", "src_gen_jets = \"GenJet\"\nmax_jets = 0");
        assert!(FillerConfig::from_toml_str(&jets).is_err());

        let levels = format!("{MINIMAL}\n[correction]\nlevels = \"l1l5\"\n");
        assert!(FillerConfig::from_toml_str(&levels).is_err());

        let no_table = format!("{MINIMAL}\n[correction]\nlevels = \"l2\"\n");
        assert!(FillerConfig::from_toml_str(&no_table).is_err());
    }

    #[test]
    fn test_event_sources_and_tables() {
        let content = format!(
            "{MINIMAL}\n[event]\nsrc_rho = \"fixedGridRhoFastjetAll\"\nsrc_weight = \"\"\n\n\
             [correction]\nlevels = \"L3L2\"\npath = \"jec\"\nl2 = \"l2.csv\"\nl3 = \"l3.csv\"\n"
        );
        let config = FillerConfig::from_toml_str(&content).unwrap();
        let sources = config.event_sources();
        assert_eq!(sources.rho.as_deref(), Some("fixedGridRhoFastjetAll"));
        assert_eq!(sources.weight.as_deref(), Some(""));

        let tables = config.correction.tables().unwrap();
        assert_eq!(
            tables,
            vec![
                (CorrectionLevelKind::L2Relative, Utf8PathBuf::from("jec/l2.csv")),
                (CorrectionLevelKind::L3Absolute, Utf8PathBuf::from("jec/l3.csv")),
            ]
        );
    }
}
