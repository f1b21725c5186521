//! Export assembly: finalized records to tabular (CSV) output.
//!
//! Column order and naming are driven entirely by the `ColumnMapping`;
//! missing values render as empty cells and the csv writer applies
//! standard quoting for embedded separators, quotes and newlines.

use std::io::Write;

use thiserror::Error;

use crate::model::{ReviewStatus, StructuredRecord};
use crate::schema::FieldSchema;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("column mapping names unknown field: {0}")]
    UnknownField(String),

    #[error("column mapping repeats output column: {0}")]
    DuplicateColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One `system_field → output column` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub system_field: String,
    pub output_column: String,
}

/// Ordered mapping of record fields onto output columns.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    columns: Vec<ColumnSpec>,
}

impl ColumnMapping {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            columns: pairs
                .iter()
                .map(|(field, column)| ColumnSpec {
                    system_field: field.to_string(),
                    output_column: column.to_string(),
                })
                .collect(),
        }
    }

    /// Identity mapping over the full schema, in schema order.
    pub fn default_for(schema: &FieldSchema) -> Self {
        Self {
            columns: schema
                .field_names()
                .map(|name| ColumnSpec {
                    system_field: name.to_string(),
                    output_column: name.to_string(),
                })
                .collect(),
        }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Checks every mapped field exists in the schema and output columns
    /// are unique.
    pub fn validate(&self, schema: &FieldSchema) -> Result<(), ExportError> {
        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            if !schema.contains(&column.system_field) {
                return Err(ExportError::UnknownField(column.system_field.clone()));
            }
            if !seen.insert(&column.output_column) {
                return Err(ExportError::DuplicateColumn(column.output_column.clone()));
            }
        }
        Ok(())
    }
}

/// Which records make it into the output.
#[derive(Debug, Clone)]
pub struct ExportFilter {
    pub reviewed_only: bool,
    pub min_quality: Option<f64>,
    /// Rejected records are excluded unless explicitly requested.
    pub include_rejected: bool,
}

impl Default for ExportFilter {
    fn default() -> Self {
        Self {
            reviewed_only: false,
            min_quality: None,
            include_rejected: false,
        }
    }
}

impl ExportFilter {
    pub fn reviewed_only() -> Self {
        Self {
            reviewed_only: true,
            ..Self::default()
        }
    }

    fn admits(&self, record: &StructuredRecord) -> bool {
        if record.review_status == ReviewStatus::Rejected && !self.include_rejected {
            return false;
        }
        if self.reviewed_only && record.review_status != ReviewStatus::Reviewed {
            return false;
        }
        if let Some(min) = self.min_quality {
            if record.overall_quality_score < min {
                return false;
            }
        }
        true
    }
}

pub struct CsvExporter {
    mapping: ColumnMapping,
}

impl CsvExporter {
    pub fn new(mapping: ColumnMapping) -> Self {
        Self { mapping }
    }

    /// Writes the header row plus one row per admitted record. Returns the
    /// number of data rows written.
    pub fn export<W: Write>(
        &self,
        records: &[StructuredRecord],
        filter: &ExportFilter,
        writer: W,
    ) -> Result<u64, ExportError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(self.mapping.columns().iter().map(|c| &c.output_column))?;

        let mut rows = 0;
        for record in records.iter().filter(|r| filter.admits(r)) {
            let row: Vec<&str> = self
                .mapping
                .columns()
                .iter()
                .map(|c| {
                    record
                        .field(&c.system_field)
                        .map(|f| f.value.as_str())
                        .unwrap_or("")
                })
                .collect();
            csv_writer.write_record(&row)?;
            rows += 1;
        }

        csv_writer.flush()?;
        log::info!("Exported {} record(s)", rows);
        Ok(rows)
    }

    pub fn export_to_string(
        &self,
        records: &[StructuredRecord],
        filter: &ExportFilter,
    ) -> Result<String, ExportError> {
        let mut buffer = Vec::new();
        self.export(records, filter, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("csv output is UTF-8"))
    }
}
