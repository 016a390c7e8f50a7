//! Running one field set across many documents.

use std::ops::ControlFlow;

use log::{info, warn};

use crate::align::{FieldValues, RowRecord, align_rows, column_labels};
use crate::document::Document;
use crate::error::ExtractError;
use crate::resolve::resolve_fields;
use crate::selector::FieldDescriptor;

/// Raw input of a batch: where a document came from and its HTML, or why
/// it could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub source: String,
    pub html: Result<String, String>,
}

impl DocumentSource {
    pub fn loaded(source: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            html: Ok(html.into()),
        }
    }

    pub fn failed(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            html: Err(message.into()),
        }
    }
}

/// A selector failure recorded against one field of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub label: String,
    pub error: ExtractError,
}

/// Rows of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentExtraction {
    pub labels: Vec<String>,
    pub rows: Vec<RowRecord>,
    pub field_errors: Vec<FieldError>,
}

/// Resolves every field on a document and aligns the values into rows.
pub fn extract_document(document: &Document, fields: &[FieldDescriptor]) -> DocumentExtraction {
    let outcomes = resolve_fields(document, fields);
    let field_values = FieldValues::from_outcomes(&outcomes);
    let rows = align_rows(&field_values);

    let field_errors = field_values
        .labels()
        .zip(outcomes)
        .filter_map(|(label, outcome)| {
            outcome.error.map(|error| FieldError {
                label: label.to_owned(),
                error,
            })
        })
        .collect();

    DocumentExtraction {
        labels: field_values.labels().map(str::to_owned).collect(),
        rows,
        field_errors,
    }
}

/// Result for one document of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Extracted {
        source: String,
        rows: Vec<RowRecord>,
        field_errors: Vec<FieldError>,
    },
    Failed {
        source: String,
        error: ExtractError,
    },
}

impl DocumentOutcome {
    pub fn source(&self) -> &str {
        match self {
            DocumentOutcome::Extracted { source, .. } | DocumentOutcome::Failed { source, .. } => {
                source
            }
        }
    }

    pub fn rows(&self) -> &[RowRecord] {
        match self {
            DocumentOutcome::Extracted { rows, .. } => rows,
            DocumentOutcome::Failed { .. } => &[],
        }
    }

    pub fn error(&self) -> Option<&ExtractError> {
        match self {
            DocumentOutcome::Extracted { .. } => None,
            DocumentOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            DocumentOutcome::Extracted { field_errors, .. } => field_errors,
            DocumentOutcome::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DocumentOutcome::Failed { .. })
    }
}

/// Overall state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every processed document produced rows (possibly zero).
    Complete,
    /// Some documents failed; the rest are usable.
    Partial { failed: usize, total: usize },
    /// Every document failed. Reported as a successful batch with no rows.
    Empty,
}

/// Per-document outcomes of a batch, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub labels: Vec<String>,
    pub outcomes: Vec<DocumentOutcome>,
    /// Set when the caller stopped the batch early; `outcomes` then holds
    /// only the documents processed before the stop.
    pub cancelled: bool,
}

impl BatchResult {
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_failed())
            .count()
    }

    pub fn status(&self) -> BatchStatus {
        let failed = self.failed_count();
        let total = self.outcomes.len();
        if failed == 0 {
            BatchStatus::Complete
        } else if failed == total {
            BatchStatus::Empty
        } else {
            BatchStatus::Partial { failed, total }
        }
    }

    /// All rows of all documents, each tagged with its source.
    pub fn rows(&self) -> impl Iterator<Item = &RowRecord> {
        self.outcomes.iter().flat_map(DocumentOutcome::rows)
    }
}

/// Progress notification sent after each document.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress<'a> {
    /// 1-based position of the document just processed.
    pub index: usize,
    pub total: usize,
    pub source: &'a str,
    pub failed: bool,
}

/// Runs the fields over every document in order.
pub fn run_batch(documents: &[DocumentSource], fields: &[FieldDescriptor]) -> BatchResult {
    run_batch_with_progress(documents, fields, |_| ControlFlow::Continue(()))
}

/// Runs the fields over every document in order, reporting after each one.
///
/// A failed document is recorded and the batch moves on. Returning
/// [`ControlFlow::Break`] from `on_progress` stops the batch; documents
/// already processed stay in the result.
pub fn run_batch_with_progress<F>(
    documents: &[DocumentSource],
    fields: &[FieldDescriptor],
    mut on_progress: F,
) -> BatchResult
where
    F: FnMut(&BatchProgress<'_>) -> ControlFlow<()>,
{
    let labels = column_labels(fields.iter().map(|field| field.label.as_str()));
    let total = documents.len();
    let mut outcomes = Vec::with_capacity(total);
    let mut cancelled = false;

    for (position, document_source) in documents.iter().enumerate() {
        let outcome = process_document(document_source, fields);
        let progress = BatchProgress {
            index: position + 1,
            total,
            source: &document_source.source,
            failed: outcome.is_failed(),
        };
        outcomes.push(outcome);

        if on_progress(&progress).is_break() {
            if position + 1 < total {
                warn!("Batch cancelled after {}/{total} documents", position + 1);
                cancelled = true;
            }
            break;
        }
    }

    let result = BatchResult {
        labels,
        outcomes,
        cancelled,
    };
    info!(
        "Batch finished: {} documents, {} failed, {} rows",
        result.outcomes.len(),
        result.failed_count(),
        result.rows().count()
    );
    result
}

fn process_document(
    document_source: &DocumentSource,
    fields: &[FieldDescriptor],
) -> DocumentOutcome {
    let source = document_source.source.clone();
    let html = match &document_source.html {
        Ok(html) => html,
        Err(message) => {
            warn!("Skipping {source}: {message}");
            return DocumentOutcome::Failed {
                error: ExtractError::Fetch {
                    location: source.clone(),
                    message: message.clone(),
                },
                source,
            };
        }
    };

    let document = Document::parse(html.as_str());
    let extraction = extract_document(&document, fields);
    info!("Extracted {} rows from {source}", extraction.rows.len());

    DocumentOutcome::Extracted {
        rows: extraction
            .rows
            .into_iter()
            .map(|row| row.with_source(source.as_str()))
            .collect(),
        field_errors: extraction.field_errors,
        source,
    }
}
