//! Error types for the template engine and the document renderer.
//!
//! Template and validation errors are raised before any rendering session is
//! launched; [`RenderError`] only occurs once a session exists, and the
//! session has always been closed by the time it reaches the caller.

use std::time::Duration;

use thiserror::Error;

/// Top-level error returned by the end-to-end pipeline.
#[derive(Debug, Error)]
pub enum DocketError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Problems with the template itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// The billable marker must open and close the repeated block.
    #[error("malformed template: expected at least two `{marker}` markers, found {found}")]
    MalformedTemplate { marker: &'static str, found: usize },

    /// Placeholders left over after every substitution pass (only raised
    /// under [`UnresolvedPolicy::Deny`](crate::template::UnresolvedPolicy)).
    #[error("unresolved placeholders: {}", .0.join(", "))]
    UnresolvedPlaceholders(Vec<String>),
}

/// Invalid input data or options.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("billable #{index} field `{field}` is not a number: {value:?}")]
    NotANumber {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("billable #{index} field `{field}` is not finite")]
    NotFinite { index: usize, field: &'static str },

    #[error("invalid invoice date {0:?}")]
    InvalidDate(String),

    #[error("scale must be between 0.1 and 2.0, got {0}")]
    InvalidScale(f64),

    #[error("unknown page format {0:?}")]
    UnknownPageFormat(String),

    #[error("invalid invoice payload: {0}")]
    Payload(String),
}

/// Failures inside a rendering session.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch rendering session: {0}")]
    Launch(String),

    #[error("failed to load document content: {0}")]
    Load(String),

    #[error("document content did not finish loading within {0:?}")]
    Timeout(Duration),

    #[error("failed to emulate screen media: {0}")]
    Emulation(String),

    #[error("failed to capture PDF: {0}")]
    Capture(String),

    #[error("rendering session produced an empty document")]
    EmptyOutput,

    #[error("failed to close rendering session: {0}")]
    Teardown(String),
}
