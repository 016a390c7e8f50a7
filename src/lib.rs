//! The htmlsift library extracts tabular data from HTML pages with CSS and
//! XPath selectors, optionally asking an LLM to propose the selectors or to
//! read the values itself.

pub mod align;
pub mod assist;
pub mod batch;
pub mod constants;
pub mod document;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod inspect;
pub mod resolve;
pub mod sanitize;
pub mod selector;
pub mod storage;
pub mod tasks;

/// Enum representing the output format of extracted rows.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum ExportFormat {
    /// Comma separated values with a header line
    #[default]
    Csv,
    /// Pretty printed array of objects
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(format!("Invalid export format: {input}")),
        }
    }
}

pub use align::{FieldValues, RowRecord, align_rows};
pub use batch::{BatchResult, DocumentSource, extract_document, run_batch, run_batch_with_progress};
pub use document::Document;
pub use error::{CollaboratorError, ExtractError};
pub use resolve::resolve_field;
pub use sanitize::sanitize;
pub use selector::{ExtractionIntent, FieldDescriptor, SelectorKind, classify};
