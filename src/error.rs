//! Error types for psytk-extract

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while extracting and aggregating results
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Unrecognized task: no parser registered for <{0}>")]
    UnrecognizedTask(String),

    #[error("Missing required column in summary table: {0}")]
    MissingColumn(String),

    #[error("Cannot compute {metric} for task {task}: partition is empty")]
    EmptyPartition { task: String, metric: String },

    #[error("Failed to parse raw result: {0}")]
    ParseError(String),

    #[error("Failed to parse {}: {message}", path.display())]
    FileParseError { path: PathBuf, message: String },

    #[error("Cannot read raw result file {}: {source}", path.display())]
    RawFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Participant {participant}: {source}")]
    Participant {
        participant: String,
        source: Box<ExtractError>,
    },

    #[error("Duplicate participant ids could not be resolved: {0}")]
    DuplicateResolution(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias used across the crate
pub type Result<T> = std::result::Result<T, ExtractError>;

impl ExtractError {
    /// Attach the offending file path to an error raised while parsing its contents
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            ExtractError::ParseError(message) => ExtractError::FileParseError {
                path: path.into(),
                message,
            },
            err @ ExtractError::EmptyPartition { .. } => ExtractError::FileParseError {
                path: path.into(),
                message: err.to_string(),
            },
            ExtractError::Io(source) => ExtractError::RawFileRead {
                path: path.into(),
                source,
            },
            other => other,
        }
    }

    /// Attach the participant whose result raised this error
    pub fn for_participant(self, participant: impl Into<String>) -> Self {
        match self {
            err @ ExtractError::Participant { .. } => err,
            other => ExtractError::Participant {
                participant: participant.into(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any participant context removed
    pub fn innermost(&self) -> &ExtractError {
        match self {
            ExtractError::Participant { source, .. } => source.innermost(),
            other => other,
        }
    }
}
