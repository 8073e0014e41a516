use super::{OutputRow, OutputSink};
use crate::jetntuple_errors::JetNtupleError;

/// Keeps every appended row in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Vec<OutputRow>,
    flushed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<OutputRow> {
        self.rows
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }
}

impl OutputSink for MemorySink {
    fn append_row(&mut self, row: &OutputRow) -> Result<(), JetNtupleError> {
        if self.flushed {
            return Err(JetNtupleError::OutputSchemaMismatch(
                "row appended after flush".into(),
            ));
        }
        if let Some(first) = self.rows.first() {
            row.check_layout(&first.arrow_schema())?;
        }
        self.rows.push(row.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), JetNtupleError> {
        self.flushed = true;
        Ok(())
    }
}
