use thiserror::Error;

#[derive(Error, Debug)]
pub enum JetNtupleError {
    #[error("Configuration conflict: {0}")]
    ConfigurationConflict(String),

    #[error("Field '{field}' not found in partition '{partition}'")]
    MissingField { field: String, partition: String },

    #[error(
        "Number of objects stored in collection '{collection}' = {count} exceeds the maximum capacity = {capacity}"
    )]
    CapacityExceeded {
        collection: String,
        count: usize,
        capacity: usize,
    },

    #[error(
        "Degenerate object #{index} in collection '{collection}': raw energy scale = {raw_scale} (zero or negative raw energy)"
    )]
    DegenerateObject {
        collection: String,
        index: usize,
        raw_scale: f64,
    },

    #[error("Unable to open partition '{partition}': {reason}")]
    PartitionOpenFailure { partition: String, reason: String },

    #[error("Field '{field}' has type {found}, expected {expected}")]
    FieldTypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Field '{field}' has unsupported column type {data_type}")]
    UnsupportedFieldType { field: String, data_type: String },

    #[error("Field '{field}' holds {found} values but the collection count is {expected}")]
    FieldLengthMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("Reader for collection '{0}' used before being bound to a partition")]
    ReaderNotBound(String),

    #[error("Output row layout differs from the established schema: {0}")]
    OutputSchemaMismatch(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    #[error("Error while reading a correction table: {0}")]
    CsvError(#[from] csv::Error),
}

impl JetNtupleError {
    /// Whether processing may continue after this error.
    ///
    /// Only per-object degeneracies are recoverable: the offending object is dropped and the
    /// run goes on. Everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, JetNtupleError::DegenerateObject { .. })
    }
}

impl From<toml::de::Error> for JetNtupleError {
    fn from(err: toml::de::Error) -> Self {
        JetNtupleError::ConfigurationConflict(err.to_string())
    }
}

impl PartialEq for JetNtupleError {
    fn eq(&self, other: &Self) -> bool {
        use JetNtupleError::*;
        match (self, other) {
            (ConfigurationConflict(a), ConfigurationConflict(b)) => a == b,
            (
                MissingField {
                    field: a,
                    partition: pa,
                },
                MissingField {
                    field: b,
                    partition: pb,
                },
            ) => a == b && pa == pb,
            (
                CapacityExceeded {
                    collection: a,
                    count: ca,
                    capacity: ka,
                },
                CapacityExceeded {
                    collection: b,
                    count: cb,
                    capacity: kb,
                },
            ) => a == b && ca == cb && ka == kb,
            (
                DegenerateObject {
                    collection: a,
                    index: ia,
                    ..
                },
                DegenerateObject {
                    collection: b,
                    index: ib,
                    ..
                },
            ) => a == b && ia == ib,
            (PartitionOpenFailure { partition: a, .. }, PartitionOpenFailure { partition: b, .. }) => {
                a == b
            }
            (FieldTypeMismatch { field: a, .. }, FieldTypeMismatch { field: b, .. }) => a == b,
            (UnsupportedFieldType { field: a, .. }, UnsupportedFieldType { field: b, .. }) => {
                a == b
            }
            (FieldLengthMismatch { field: a, .. }, FieldLengthMismatch { field: b, .. }) => a == b,
            (ReaderNotBound(a), ReaderNotBound(b)) => a == b,
            (OutputSchemaMismatch(a), OutputSchemaMismatch(b)) => a == b,

            // Wrapped library errors are not comparable: same variant is enough
            (IoError(_), IoError(_)) => true,
            (ParquetError(_), ParquetError(_)) => true,
            (ArrowError(_), ArrowError(_)) => true,
            (CsvError(_), CsvError(_)) => true,

            _ => false,
        }
    }
}
