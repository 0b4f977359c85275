//! Delimited text to header + rows, and rows to [`DataRow`]s.

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{Error, Result};
use crate::model::{DataRow, DataSet};

/// Parsed delimited text. Every row has the header's arity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse comma-separated text with double-quoted fields. Quoted fields may
    /// contain commas, newlines and `""` escapes. Blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with(text, b',')
    }

    pub fn parse_with(text: &str, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| Error::Table(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if header.iter().all(String::is_empty) {
            return Err(Error::Table("no header row".into()));
        }

        let width = header.len();
        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::Table(format!("row {}: {e}", i + 1)))?;
            if is_blank(&record) {
                continue;
            }
            if record.len() > width {
                tracing::warn!(
                    row = i + 1,
                    cells = record.len(),
                    width,
                    "row longer than header, truncating"
                );
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }
        Ok(Self { header, rows })
    }

    /// Key every row by header position.
    pub fn into_dataset(self) -> DataSet {
        let header = self.header;
        self.rows
            .into_iter()
            .map(|row| header.iter().cloned().zip(row).collect::<DataRow>())
            .collect()
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty)
}
