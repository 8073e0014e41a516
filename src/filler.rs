//! # JRA ntuple filling
//!
//! [`JetNtupleFiller`] drives a full conversion: for every input event it
//!
//! 1. materializes the event record, the reconstructed jets and the generator-level jets,
//! 2. matches reconstructed jets to generator-level jets,
//! 3. drops unmatched jets, corrects the others (degenerate jets are skipped with a warning),
//! 4. appends one JRA row holding the emitted jets, re-ranked `0..k`.
//!
//! The run ends when the input is consumed or the event ceiling is reached; the sink is then
//! flushed and a [`FillSummary`] is returned.
//!
//! ## Example
//! -----------------
//! ```rust,no_run
//! use camino::Utf8Path;
//! use jetntuple::config::FillerConfig;
//! use jetntuple::filler::JetNtupleFiller;
//! use jetntuple::output::ParquetSink;
//!
//! # fn main() -> Result<(), jetntuple::jetntuple_errors::JetNtupleError> {
//! let config = FillerConfig::from_path(Utf8Path::new("jra.toml"))?;
//! let filler = JetNtupleFiller::from_config(&config)?;
//! let mut sink = ParquetSink::create(config.output.file.clone(), config.output.collection.clone())?
//!     .with_schema(filler.row_builder().arrow_schema());
//! let summary = filler.run(config.partition_source(), &mut sink)?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
use std::fmt;

use tracing::{debug, info, warn};

use crate::buffer_registry::BufferRegistry;
use crate::config::FillerConfig;
use crate::correction::CorrectionStage;
use crate::gen_matcher::GenJetMatcher;
use crate::jetntuple_errors::JetNtupleError;
use crate::output::{JraJet, JraRowBuilder, OutputSink};
use crate::partition_iterator::{PartitionIterator, RowLimit};
use crate::readers::{
    EventInfoReader, GenJetLayout, GenJetReader, RecoJetLayout, RecoJetReader, RecordReader,
    SchemaBinder,
};
use crate::storage::PartitionSource;

#[cfg(feature = "progress")]
use crate::progress_bar::EventProgress;

/// Counters of a finished run.
///
/// # Fields
///
/// * `analyzed_events` - events read
/// * `analyzed_weighted` - sum of the generator weights of the events read
/// * `selected_jets` - jets written out
/// * `selected_weighted` - jets written out, each counted with its event weight
/// * `degenerate_jets` - matched jets dropped by the correction stage
/// * `partitions_opened` - partitions opened, out of `partition_count`
/// * `rows_seen` - rows returned by the partition iterator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FillSummary {
    pub analyzed_events: u64,
    pub analyzed_weighted: f64,
    pub selected_jets: u64,
    pub selected_weighted: f64,
    pub degenerate_jets: u64,
    pub partitions_opened: usize,
    pub partition_count: usize,
    pub rows_seen: u64,
}

impl fmt::Display for FillSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Analyzed events: {} (weighted: {})",
            self.analyzed_events, self.analyzed_weighted
        )?;
        writeln!(
            f,
            "Selected jets: {} (weighted: {})",
            self.selected_jets, self.selected_weighted
        )?;
        write!(
            f,
            "Degenerate jets skipped: {}, partitions read: {}/{}",
            self.degenerate_jets, self.partitions_opened, self.partition_count
        )
    }
}

/// End-to-end conversion of jet collections into JRA rows.
///
/// # Fields
///
/// * `event_reader` - event-level record
/// * `reco_reader`, `gen_reader` - reconstructed and generator-level jets
/// * `matcher` - reco → truth association
/// * `correction` - raw-scale recovery and optional energy correction
/// * `row_builder` - output layout
/// * `limit` - event ceiling
/// * `report_every` - events between two progress lines, `0` for none
/// * `debug` - dump every event and emitted jet at `debug` level
#[derive(Debug)]
pub struct JetNtupleFiller {
    event_reader: EventInfoReader,
    reco_reader: RecoJetReader,
    gen_reader: GenJetReader,
    matcher: GenJetMatcher,
    correction: CorrectionStage,
    row_builder: JraRowBuilder,
    limit: RowLimit,
    report_every: u64,
    debug: bool,
}

impl JetNtupleFiller {
    /// A filler with default matching, no correction, default output flags and no ceiling.
    pub fn new(
        event_reader: EventInfoReader,
        reco_reader: RecoJetReader,
        gen_reader: GenJetReader,
    ) -> Self {
        JetNtupleFiller {
            event_reader,
            reco_reader,
            gen_reader,
            matcher: GenJetMatcher::default(),
            correction: CorrectionStage::uncorrected(),
            row_builder: JraRowBuilder::default(),
            limit: RowLimit::unlimited(),
            report_every: 0,
            debug: false,
        }
    }

    /// Build the readers, matcher, correction stage and row layout described by `config`.
    ///
    /// Return
    /// ----------
    /// * [`JetNtupleError::ConfigurationConflict`] on invalid thresholds, correction levels or
    ///   unreadable correction tables.
    pub fn from_config(config: &FillerConfig) -> Result<Self, JetNtupleError> {
        let jets = &config.jets;
        let mut reco_reader =
            RecoJetReader::new(&jets.src_reco_jets, RecoJetLayout::new(jets.energy_fractions))
                .with_capacity(jets.max_jets);
        if let Some(count_field) = &jets.reco_count_field {
            reco_reader = reco_reader.with_count_field(count_field);
        }
        let mut gen_reader =
            GenJetReader::new(&jets.src_gen_jets, GenJetLayout).with_capacity(jets.max_jets);
        if let Some(count_field) = &jets.gen_count_field {
            gen_reader = gen_reader.with_count_field(count_field);
        }

        Ok(Self::new(
            EventInfoReader::new(config.event_sources()),
            reco_reader,
            gen_reader,
        )
        .with_matcher(GenJetMatcher::new(config.match_params()?))
        .with_correction(config.correction_stage()?)
        .with_row_builder(JraRowBuilder::new(config.output_flags()))
        .with_limit(config.row_limit())
        .with_report_every(config.input.report_every)
        .with_debug(config.debug))
    }

    pub fn with_matcher(mut self, matcher: GenJetMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_correction(mut self, correction: CorrectionStage) -> Self {
        self.correction = correction;
        self
    }

    pub fn with_row_builder(mut self, row_builder: JraRowBuilder) -> Self {
        self.row_builder = row_builder;
        self
    }

    pub fn with_limit(mut self, limit: RowLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_report_every(mut self, report_every: u64) -> Self {
        self.report_every = report_every;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn row_builder(&self) -> &JraRowBuilder {
        &self.row_builder
    }

    pub fn limit(&self) -> RowLimit {
        self.limit
    }

    /// Convert every event of `source` and append the rows to `sink`.
    ///
    /// The filler is consumed: its readers are bound to the buffers of this run only.
    ///
    /// Arguments
    /// -----------------
    /// * `source`: input partitions, read in order.
    /// * `sink`: destination of the rows; flushed before returning.
    ///
    /// Return
    /// ----------
    /// * The [`FillSummary`] of the run, or the first fatal error. Degenerate jets are not
    ///   errors: they are counted and skipped.
    pub fn run<S, O>(self, source: S, sink: &mut O) -> Result<FillSummary, JetNtupleError>
    where
        S: PartitionSource,
        O: OutputSink + ?Sized,
    {
        let JetNtupleFiller {
            mut event_reader,
            mut reco_reader,
            mut gen_reader,
            matcher,
            correction,
            row_builder,
            limit,
            report_every,
            debug,
        } = self;

        let mut iterator = PartitionIterator::new(source, BufferRegistry::new(), limit);
        let mut summary = FillSummary {
            partition_count: iterator.partition_count(),
            ..FillSummary::default()
        };
        info!(
            "Filling JRA rows from {} partition(s): reco jets '{}', gen jets '{}', dR < {}, corrections {}",
            summary.partition_count,
            reco_reader.collection(),
            gen_reader.collection(),
            matcher.params().dr_match(),
            if correction.is_enabled() { "on" } else { "off" }
        );

        #[cfg(feature = "progress")]
        let mut progress = EventProgress::new(limit.get());

        loop {
            let more = iterator.advance(&mut [
                &mut event_reader as &mut dyn SchemaBinder,
                &mut reco_reader as &mut dyn SchemaBinder,
                &mut gen_reader as &mut dyn SchemaBinder,
            ])?;
            if !more {
                break;
            }

            let event = event_reader.materialize()?;
            if iterator.should_report(report_every) {
                info!(
                    "Processing event #{} (run {}, event {}) from '{}'",
                    iterator.cumulative_rows(),
                    event.run,
                    event.event,
                    iterator.current_partition().unwrap_or("-")
                );
            }
            #[cfg(feature = "progress")]
            progress.tick(iterator.current_partition());
            if debug {
                debug!("{event}");
            }

            let weight = event.weight_or_unit();
            summary.analyzed_events += 1;
            summary.analyzed_weighted += weight;

            let mut reco_jets = reco_reader.materialize()?;
            let gen_jets = gen_reader.materialize()?;
            matcher.add_gen_jet_match(&mut reco_jets, &gen_jets);

            let rho = event.rho_or_zero();
            let mut emitted = Vec::with_capacity(reco_jets.len());
            for (index, reco) in reco_jets.iter().enumerate() {
                let Some(gen) = reco.gen_jet(&gen_jets) else {
                    continue;
                };
                match correction.apply(reco, reco_reader.collection(), index, rho) {
                    Ok(corrected) => {
                        if debug {
                            debug!(
                                "jet #{} -> rank {}:\n{reco}\n{gen}\n jec = {}",
                                index,
                                emitted.len(),
                                corrected.scale
                            );
                        }
                        emitted.push(JraJet {
                            reco,
                            gen,
                            correction: corrected,
                        });
                    }
                    Err(err) if err.is_recoverable() => {
                        warn!("{err}, skipping it");
                        summary.degenerate_jets += 1;
                    }
                    Err(err) => return Err(err),
                }
            }

            sink.append_row(&row_builder.build(&event, &emitted))?;
            summary.selected_jets += emitted.len() as u64;
            summary.selected_weighted += emitted.len() as f64 * weight;
        }

        #[cfg(feature = "progress")]
        progress.finish();

        summary.partitions_opened = iterator.partitions_opened();
        summary.rows_seen = iterator.cumulative_rows();
        drop(iterator);

        sink.flush()?;
        info!("Run finished\n{summary}");
        Ok(summary)
    }
}

#[cfg(test)]
mod filler_test {
    use std::sync::Arc;

    use arrow_array::builder::{Float32Builder, Int32Builder, ListBuilder};
    use arrow_array::{ArrayRef, Float32Array, RecordBatch, UInt32Array, UInt64Array};

    use super::*;
    use crate::output::{MemorySink, OutputValue};
    use crate::readers::EventInfoSources;
    use crate::storage::InMemoryPartitions;

    fn f32_lists(rows: &[Vec<f32>]) -> ArrayRef {
        let mut builder = ListBuilder::new(Float32Builder::new());
        for row in rows {
            builder.values().append_slice(row);
            builder.append(true);
        }
        Arc::new(builder.finish())
    }

    fn i32_lists(rows: &[Vec<i32>]) -> ArrayRef {
        let mut builder = ListBuilder::new(Int32Builder::new());
        for row in rows {
            builder.values().append_slice(row);
            builder.append(true);
        }
        Arc::new(builder.finish())
    }

    /// One event: reco jets at (1.0, 0.0) and (-1.0, 1.0), gen jets at (1.05, 0.02) and
    /// (3.0, 3.0). Degeneracy is set by `raw_factors`.
    fn event_batch(raw_factors: Vec<f32>) -> RecordBatch {
        let n = raw_factors.len();
        RecordBatch::try_from_iter(vec![
            ("run", Arc::new(UInt32Array::from(vec![1])) as ArrayRef),
            ("luminosityBlock", Arc::new(UInt32Array::from(vec![2])) as ArrayRef),
            ("event", Arc::new(UInt64Array::from(vec![3])) as ArrayRef),
            ("fixedGridRhoFastjetAll", Arc::new(Float32Array::from(vec![10.0])) as ArrayRef),
            ("nJet", Arc::new(UInt32Array::from(vec![n as u32])) as ArrayRef),
            ("Jet_pt", f32_lists(&[vec![100.0, 40.0][..n].to_vec()])),
            ("Jet_eta", f32_lists(&[vec![1.0, -1.0][..n].to_vec()])),
            ("Jet_phi", f32_lists(&[vec![0.0, 1.0][..n].to_vec()])),
            ("Jet_mass", f32_lists(&[vec![10.0, 5.0][..n].to_vec()])),
            ("Jet_area", f32_lists(&[vec![0.5, 0.5][..n].to_vec()])),
            ("Jet_rawFactor", f32_lists(&[raw_factors])),
            ("Jet_jetId", i32_lists(&[vec![6, 6][..n].to_vec()])),
            ("nGenJet", Arc::new(UInt32Array::from(vec![2])) as ArrayRef),
            ("GenJet_pt", f32_lists(&[vec![95.0, 30.0]])),
            ("GenJet_eta", f32_lists(&[vec![1.05, 3.0]])),
            ("GenJet_phi", f32_lists(&[vec![0.02, 3.0]])),
            ("GenJet_mass", f32_lists(&[vec![9.0, 3.0]])),
            ("GenJet_partonFlavour", i32_lists(&[vec![21, 1]])),
            ("GenJet_hadronFlavour", i32_lists(&[vec![0, 0]])),
        ])
        .unwrap()
    }

    fn filler(dr_match: f64) -> JetNtupleFiller {
        let sources = EventInfoSources {
            rho: Some("fixedGridRhoFastjetAll".into()),
            ..EventInfoSources::default()
        };
        JetNtupleFiller::new(
            EventInfoReader::new(sources),
            RecoJetReader::new("Jet", RecoJetLayout::new(false)),
            GenJetReader::new("GenJet", GenJetLayout),
        )
        .with_matcher(GenJetMatcher::new(
            crate::gen_matcher::MatchParams::builder()
                .dr_match(dr_match)
                .build()
                .unwrap(),
        ))
    }

    #[test]
    fn test_single_matched_jet_is_emitted() {
        let source: InMemoryPartitions = [event_batch(vec![0.0, 0.0])].into_iter().collect();
        let mut sink = MemorySink::new();
        let summary = filler(0.2).run(source, &mut sink).unwrap();

        assert_eq!(summary.analyzed_events, 1);
        assert_eq!(summary.selected_jets, 1);
        assert_eq!(summary.selected_weighted, 1.0);
        assert_eq!(summary.degenerate_jets, 0);
        assert!(sink.is_flushed());

        let row = &sink.rows()[0];
        assert_eq!(row.get("nref"), Some(&OutputValue::UInt32(1)));
        assert_eq!(row.get("rho"), Some(&OutputValue::Float32(Some(10.0))));
        assert_eq!(
            row.get("jtpt"),
            Some(&OutputValue::Float32List(vec![Some(100.0)]))
        );
        assert_eq!(row.get("refpdgid"), Some(&OutputValue::Int32List(vec![Some(21)])));
    }

    #[test]
    fn test_degenerate_jet_is_skipped() {
        let source: InMemoryPartitions = [event_batch(vec![0.9999999, 0.0])].into_iter().collect();
        let mut sink = MemorySink::new();
        let summary = filler(0.2).run(source, &mut sink).unwrap();

        assert_eq!(summary.analyzed_events, 1);
        assert_eq!(summary.selected_jets, 0);
        assert_eq!(summary.degenerate_jets, 1);
        assert_eq!(sink.rows()[0].get("nref"), Some(&OutputValue::UInt32(0)));
    }

    #[test]
    fn test_capacity_exceeded_aborts_the_run() {
        let source: InMemoryPartitions = [event_batch(vec![0.0, 0.0])].into_iter().collect();
        let filler = JetNtupleFiller::new(
            EventInfoReader::new(EventInfoSources::default()),
            RecoJetReader::new("Jet", RecoJetLayout::new(false)).with_capacity(1),
            GenJetReader::new("GenJet", GenJetLayout),
        );
        let mut sink = MemorySink::new();
        assert_eq!(
            filler.run(source, &mut sink).unwrap_err(),
            JetNtupleError::CapacityExceeded {
                collection: "Jet".into(),
                count: 2,
                capacity: 1,
            }
        );
        assert!(sink.rows().is_empty());
    }
}
