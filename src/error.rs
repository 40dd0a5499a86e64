use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// One failed interpretation of an input payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub attempt: &'static str,
    pub reason: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.attempt, self.reason)
    }
}

/// Every format-sniffing attempt failed.
#[derive(Debug, Clone, Error)]
#[error(
    "could not parse data as CSV text, base64-encoded CSV or base64-encoded Excel ({})",
    join(.attempts)
)]
pub struct IngestionError {
    pub attempts: Vec<AttemptFailure>,
}

fn join(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Validation / correlation
// ---------------------------------------------------------------------------

/// A referenced column does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Column '{column}' not found. Available columns: {available:?}")]
    MissingX {
        column: String,
        available: Vec<String>,
    },
    #[error("Y columns not found: {missing:?}. Available columns: {available:?}")]
    MissingY {
        missing: Vec<String>,
        available: Vec<String>,
    },
    #[error("Columns not found: {missing:?}. Available columns: {available:?}")]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },
}

impl ValidationError {
    pub fn available(&self) -> &[String] {
        match self {
            ValidationError::MissingX { available, .. }
            | ValidationError::MissingY { available, .. }
            | ValidationError::MissingColumns { available, .. } => available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Column '{target}' not found in numeric columns {numeric:?}")]
    TargetNotNumeric {
        target: String,
        numeric: Vec<String>,
    },
    #[error("Column '{column}' is not numeric and cannot be correlated")]
    NotNumeric { column: String },
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Failure reported by a rendering backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The browser engine the backend drives is not installed.
    #[error("browser engine not found: {0}")]
    BrowserMissing(String),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InstallError(pub String);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering with {backend} failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: BackendError,
    },
    #[error("failed to install the browser engine: {install}\noriginal error: {original}")]
    InstallFailed {
        original: BackendError,
        #[source]
        install: InstallError,
    },
    #[error("rendering failed after installing the browser engine: {retry}\noriginal error: {original}")]
    RetryFailed {
        original: BackendError,
        #[source]
        retry: BackendError,
    },
    #[error("encoding {format} image: {source}")]
    Encode {
        format: &'static str,
        #[source]
        source: image::ImageError,
    },
    #[error("writing rendered chart: {0}")]
    Io(#[source] std::io::Error),
}

// ---------------------------------------------------------------------------
// Umbrella
// ---------------------------------------------------------------------------

/// Any failure of the end-to-end pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("dataset '{0}' not found")]
    UnknownDataset(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingestion_error_names_every_attempt() {
        let err = IngestionError {
            attempts: vec![
                AttemptFailure {
                    attempt: "csv text",
                    reason: "empty".into(),
                },
                AttemptFailure {
                    attempt: "base64 csv",
                    reason: "bad padding".into(),
                },
                AttemptFailure {
                    attempt: "base64 excel",
                    reason: "not a zip".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("csv text: empty"));
        assert!(msg.contains("base64 csv: bad padding"));
        assert!(msg.contains("base64 excel: not a zip"));
    }

    #[test]
    fn validation_message_lists_available_columns() {
        let err = ValidationError::MissingY {
            missing: vec!["a".into(), "b".into()],
            available: vec!["x".into(), "y".into()],
        };
        assert_eq!(
            err.to_string(),
            r#"Y columns not found: ["a", "b"]. Available columns: ["x", "y"]"#
        );
    }
}
