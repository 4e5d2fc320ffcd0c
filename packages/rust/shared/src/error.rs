//! Error types for patternlang.
//!
//! Library crates use [`PatternLangError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! [`DocumentError`] is the per-document taxonomy. It is isolated to the file
//! that produced it and ends up in the ingestion report rather than aborting
//! a run.

use std::path::PathBuf;

use serde::Serialize;

/// Why a single pattern document was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentError {
    /// Filename does not have the `<Name> (<digits>).<ext>` shape.
    #[error("invalid filename {filename:?}: expected \"<Name> (<id>).<ext>\"")]
    InvalidFilename { filename: String },

    /// No standalone `---` line separating body from references.
    #[error("missing reference separator (looked for a '---' line)")]
    MissingReferenceSeparator,

    /// A required `## <Section>` block is absent or empty.
    #[error("missing or empty section '## {section}'")]
    MissingSection { section: String },

    /// References do not start with the expected citation sentence.
    #[error("missing page reference in citation")]
    MissingPageReference,

    /// First hash token is not one of the three confidence markers.
    #[error("unknown confidence marker {marker:?}")]
    UnknownConfidenceMarker { marker: String },

    /// Fewer than two hash tokens in the references.
    #[error("missing topical tag after confidence marker")]
    MissingTag,

    /// File could not be read as UTF-8 text.
    #[error("unreadable document: {message}")]
    Unreadable { message: String },

    /// Another document already produced this pattern id.
    #[error("duplicate pattern id {id} (already defined by {first:?})")]
    DuplicateId { id: u32, first: String },
}

/// Top-level error type for all patternlang operations.
#[derive(Debug, thiserror::Error)]
pub enum PatternLangError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A single document failed to parse.
    #[error("parse error: {0}")]
    Parse(#[from] DocumentError),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (empty corpus, bad query argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Lookup miss.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Requested expansion depth exceeds the caller-facing bound.
    #[error("depth {requested} exceeds the maximum of {max}")]
    DepthOutOfRange { requested: u32, max: u32 },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PatternLangError>;

impl PatternLangError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error describing the missing thing.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap any storage backend error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
