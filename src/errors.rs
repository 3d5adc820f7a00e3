//! Typed error hierarchy for checkup.
//!
//! Four enums cover the four subsystems:
//! - `StoreError` — row store reads, writes and decoding
//! - `AnnotateError` — calls to the external text-analysis service
//! - `ExtractError` — reading the source document
//! - `RunError` — run creation and supervision

use std::path::PathBuf;

use checkup_common::DomainError;
use thiserror::Error;

/// Errors from the CSV row stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid value in {path} at line {line}: {source}")]
    InvalidCell {
        path: PathBuf,
        line: u64,
        #[source]
        source: DomainError,
    },
}

/// Errors from the annotation service.
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("Annotation request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Annotation service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("No API key configured for the annotation service")]
    MissingApiKey,

    #[error("Unreadable annotation response: {0}")]
    MalformedResponse(String),
}

/// Errors while reading the source document.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read source document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source document {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Source document has no 'nodes' object")]
    MissingNodes,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from run creation and supervision.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Source document not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Unsupported input mode '{0}'")]
    InvalidInputMode(String),

    #[error("Run {0} not found")]
    NotFound(String),

    #[error("Failed to spawn worker process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
