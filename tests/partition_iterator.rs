mod common;

use camino::Utf8PathBuf;
use jetntuple::buffer_registry::BufferRegistry;
use jetntuple::jetntuple_errors::JetNtupleError;
use jetntuple::partition_iterator::{PartitionIterator, RowLimit};
use jetntuple::readers::{
    EventInfoReader, EventInfoSources, GenJetLayout, GenJetReader, RecoJetLayout, RecoJetReader,
    RecordReader, SchemaBinder,
};
use jetntuple::storage::ParquetFiles;

use common::{nano_batch, simple_events, write_parquet};

fn files(dir: &std::path::Path, sizes: &[u64]) -> Vec<Utf8PathBuf> {
    let mut first = 0;
    sizes
        .iter()
        .enumerate()
        .map(|(i, &n)| {
            let path = write_parquet(dir, &format!("part_{i}.parquet"), &nano_batch(&simple_events(first, n)));
            first += n;
            path
        })
        .collect()
}

#[test]
fn test_row_ceiling_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let source = ParquetFiles::new(files(dir.path(), &[3, 5, 2])).with_batch_size(2);
    let mut iterator = PartitionIterator::new(source, BufferRegistry::new(), RowLimit::new(6));
    let mut events = EventInfoReader::new(EventInfoSources::default());

    let mut seen = Vec::new();
    let mut partition_at_ceiling = None;
    while iterator
        .advance(&mut [&mut events as &mut dyn SchemaBinder])
        .unwrap()
    {
        seen.push(events.materialize().unwrap().event);
        if iterator.cumulative_rows() == 6 {
            partition_at_ceiling = iterator.current_partition().map(str::to_string);
        }
    }

    assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    assert!(partition_at_ceiling.is_some_and(|label| label.ends_with("part_1.parquet")));
    assert_eq!(iterator.current_partition(), None);
    assert_eq!(iterator.partitions_opened(), 2);
    assert_eq!(iterator.cumulative_rows(), 6);
    assert!(iterator.is_exhausted());
    assert!(!iterator.advance(&mut [&mut events as &mut dyn SchemaBinder]).unwrap());
}

#[test]
fn test_shared_collection_is_read_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = ParquetFiles::new(files(dir.path(), &[4]));
    let mut iterator = PartitionIterator::new(source, BufferRegistry::new(), RowLimit::unlimited());

    let mut jets = RecoJetReader::new("Jet", RecoJetLayout::new(true));
    let mut same_jets = RecoJetReader::new("Jet", RecoJetLayout::new(false));
    let mut gen_jets = GenJetReader::new("GenJet", GenJetLayout);

    let mut rows = 0;
    while iterator
        .advance(&mut [
            &mut jets as &mut dyn SchemaBinder,
            &mut same_jets as &mut dyn SchemaBinder,
            &mut gen_jets as &mut dyn SchemaBinder,
        ])
        .unwrap()
    {
        let a = jets.materialize().unwrap();
        let b = same_jets.materialize().unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].pt(), b[0].pt());
        assert_eq!(a[0].fractions().ch_hef.map(|f| f as f32), Some(0.6));
        assert_eq!(a[0].fractions().mu_ef, None);
        assert_eq!(gen_jets.materialize().unwrap()[0].parton_flavour(), 2);
        rows += 1;
    }
    assert_eq!(rows, 4);

    let (Some(a), Some(b)) = (jets.handle(), same_jets.handle()) else {
        panic!("readers were bound");
    };
    assert!(a.same_storage(b));
    assert!(a.is_owner());
    assert!(!b.is_owner());
}

#[test]
fn test_unreadable_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = files(dir.path(), &[2]);
    let missing = Utf8PathBuf::from_path_buf(dir.path().join("missing.parquet")).unwrap();
    paths.push(missing.clone());

    let mut iterator =
        PartitionIterator::new(ParquetFiles::new(paths), BufferRegistry::new(), RowLimit::unlimited());
    let mut events = EventInfoReader::new(EventInfoSources::default());

    for _ in 0..2 {
        assert!(iterator.advance(&mut [&mut events as &mut dyn SchemaBinder]).unwrap());
    }
    let err = iterator
        .advance(&mut [&mut events as &mut dyn SchemaBinder])
        .unwrap_err();
    assert!(matches!(
        err,
        JetNtupleError::PartitionOpenFailure { ref partition, .. } if *partition == missing.to_string()
    ));
    assert!(iterator.is_exhausted());
}

#[test]
fn test_missing_required_field() {
    let dir = tempfile::tempdir().unwrap();
    let source = ParquetFiles::new(files(dir.path(), &[2]));
    let mut iterator = PartitionIterator::new(source, BufferRegistry::new(), RowLimit::unlimited());
    let mut events = EventInfoReader::new(EventInfoSources {
        pt_hat: Some("Generator_binvar".into()),
        ..EventInfoSources::default()
    });

    let err = iterator
        .advance(&mut [&mut events as &mut dyn SchemaBinder])
        .unwrap_err();
    assert!(matches!(
        err,
        JetNtupleError::MissingField { ref field, .. } if field == "Generator_binvar"
    ));
}
