//! The export module writes extracted rows as CSV or JSON.

use std::io::Write;

use anyhow::{Context, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::ExportFormat;
use crate::align::RowRecord;
use crate::batch::{BatchResult, DocumentExtraction, DocumentOutcome, FieldError};
use crate::constants::{ERROR_COLUMN, ERROR_MARKER, SOURCE_COLUMN};

/// A flattened output line: one extracted row, or a marker line for a
/// document that produced no rows because something failed.
struct ExportRecord<'a> {
    source: Option<&'a str>,
    labels: &'a [String],
    row: Option<&'a RowRecord>,
    error: Option<String>,
}

impl ExportRecord<'_> {
    fn value(&self, label: &str) -> &str {
        self.row
            .and_then(|row| row.get(label))
            .unwrap_or_default()
    }
}

impl Serialize for ExportRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(source) = self.source {
            map.serialize_entry(SOURCE_COLUMN, source)?;
        }
        for label in self.labels {
            map.serialize_entry(label, self.value(label))?;
        }
        if let Some(error) = &self.error {
            map.serialize_entry(ERROR_COLUMN, error)?;
        }
        map.end()
    }
}

/// Optional columns around the field columns.
#[derive(Debug, Clone, Copy)]
struct Columns {
    source: bool,
    error: bool,
}

/// Serializes rows of a single document.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_rows(
    format: &ExportFormat,
    labels: &[String],
    rows: &[RowRecord],
) -> Result<String> {
    match format {
        ExportFormat::Csv => {
            let mut buffer = Vec::new();
            write_rows_csv(&mut buffer, labels, rows)?;
            String::from_utf8(buffer).context("CSV output is not UTF-8")
        }
        ExportFormat::Json => {
            serde_json::to_string_pretty(rows).context("Unable to serialize rows to JSON")
        }
    }
}

/// Serializes the rows of a single document.
///
/// When a field selector failed, every row gets an `error` column naming the
/// failed fields. A document with no rows then gets one marker line instead.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_extraction(
    format: &ExportFormat,
    extraction: &DocumentExtraction,
) -> Result<String> {
    let error = field_errors_marker(&extraction.field_errors);
    let columns = Columns {
        source: false,
        error: error.is_some(),
    };
    let records = document_records(None, &extraction.labels, &extraction.rows, error);
    export_records(format, &extraction.labels, &records, columns)
}

/// Serializes a batch, one line per row plus a marker line per failed document.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_batch(format: &ExportFormat, batch: &BatchResult) -> Result<String> {
    let columns = Columns {
        source: true,
        error: true,
    };
    export_records(format, &batch.labels, &batch_records(batch), columns)
}

fn export_records(
    format: &ExportFormat,
    labels: &[String],
    records: &[ExportRecord<'_>],
    columns: Columns,
) -> Result<String> {
    match format {
        ExportFormat::Csv => {
            let mut buffer = Vec::new();
            write_records_csv(&mut buffer, labels, records, columns)?;
            String::from_utf8(buffer).context("CSV output is not UTF-8")
        }
        ExportFormat::Json => {
            serde_json::to_string_pretty(records).context("Unable to serialize rows to JSON")
        }
    }
}

/// Writes rows as CSV with one column per label.
///
/// # Errors
///
/// Returns an error if writing to `writer` fails.
pub fn write_rows_csv<W: Write>(writer: W, labels: &[String], rows: &[RowRecord]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(labels)?;
    for row in rows {
        csv_writer.write_record(
            labels
                .iter()
                .map(|label| row.get(label).unwrap_or_default()),
        )?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes records as CSV: optional `source`, one column per label, optional `error`.
fn write_records_csv<W: Write>(
    writer: W,
    labels: &[String],
    records: &[ExportRecord<'_>],
    columns: Columns,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(labels.len() + 2);
    if columns.source {
        header.push(SOURCE_COLUMN);
    }
    header.extend(labels.iter().map(String::as_str));
    if columns.error {
        header.push(ERROR_COLUMN);
    }
    csv_writer.write_record(&header)?;

    for record in records {
        let mut line = Vec::with_capacity(header.len());
        if columns.source {
            line.push(record.source.unwrap_or_default());
        }
        line.extend(labels.iter().map(|label| record.value(label)));
        if columns.error {
            line.push(record.error.as_deref().unwrap_or_default());
        }
        csv_writer.write_record(&line)?;
    }

    csv_writer.flush()?;
    Ok(())
}

fn batch_records(batch: &BatchResult) -> Vec<ExportRecord<'_>> {
    batch
        .outcomes
        .iter()
        .flat_map(|outcome| {
            document_records(
                Some(outcome.source()),
                &batch.labels,
                outcome.rows(),
                outcome_error(outcome),
            )
        })
        .collect()
}

/// Lines for one document: its rows carrying `error`, or a single marker
/// line when there are no rows but something failed.
fn document_records<'a>(
    source: Option<&'a str>,
    labels: &'a [String],
    rows: &'a [RowRecord],
    error: Option<String>,
) -> Vec<ExportRecord<'a>> {
    if rows.is_empty() {
        return error
            .map(|error| ExportRecord {
                source,
                labels,
                row: None,
                error: Some(error),
            })
            .into_iter()
            .collect();
    }

    rows.iter()
        .map(|row| ExportRecord {
            source,
            labels,
            row: Some(row),
            error: error.clone(),
        })
        .collect()
}

fn outcome_error(outcome: &DocumentOutcome) -> Option<String> {
    match outcome.error() {
        Some(error) => Some(error.marker()),
        None => field_errors_marker(outcome.field_errors()),
    }
}

fn field_errors_marker(field_errors: &[FieldError]) -> Option<String> {
    if field_errors.is_empty() {
        return None;
    }

    let details = field_errors
        .iter()
        .map(|field_error| format!("{}: {}", field_error.label, field_error.error))
        .collect::<Vec<_>>()
        .join("; ");
    Some(format!("{ERROR_MARKER}{details}"))
}
