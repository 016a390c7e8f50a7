//! Error taxonomy of the extraction pipeline.
//!
//! Errors are scoped: a value error stays inside one node, a selector error
//! inside one field, a fetch error inside one document. Only collaborator
//! errors are terminal, and only for the one assisted call that produced them.

use thiserror::Error;

/// Fieldless discriminant of [`ExtractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SelectorSyntax,
    Fetch,
    ExtractionValue,
}

/// Error recorded against a node, a field or a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("invalid selector `{selector}`: {message}")]
    SelectorSyntax { selector: String, message: String },
    #[error("failed to load {location}: {message}")]
    Fetch { location: String, message: String },
    #[error("failed to extract value: {0}")]
    ExtractionValue(String),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::SelectorSyntax { .. } => ErrorKind::SelectorSyntax,
            ExtractError::Fetch { .. } => ErrorKind::Fetch,
            ExtractError::ExtractionValue(_) => ErrorKind::ExtractionValue,
        }
    }

    /// Renders the error the way it appears in exported tables.
    pub fn marker(&self) -> String {
        format!("{}{self}", crate::constants::ERROR_MARKER)
    }
}

/// Failure of an LLM assisted call. Never partially trusted.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("LLM model is not available: {0}")]
    Unavailable(String),
    #[error("LLM error: {0}")]
    Request(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
    #[error("LLM returned malformed output: {0}")]
    MalformedResponse(String),
}
