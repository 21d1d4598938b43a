use std::time::Duration;

use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob not found: {path}")]
    NotFound { path: String },

    #[error("Storage service returned HTTP {status}{}: {message}", error_code_suffix(.code))]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Transport error: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Store aborted for {path}: could not obtain an append blob: {source}")]
    StoreAborted {
        path: String,
        #[source]
        source: Box<BlobError>,
    },

    #[error("Upload of {path} failed at chunk {failed_sequence} after {committed} committed chunks: {source}")]
    PartialUpload {
        path: String,
        committed: u32,
        failed_sequence: u32,
        #[source]
        source: Box<BlobError>,
    },
}

fn error_code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

impl BlobError {
    /// Create a not found error
    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create an HTTP status error
    pub fn http<S: Into<String>>(status: u16, code: Option<String>, message: S) -> Self {
        Self::Http {
            status,
            code,
            message: message.into(),
        }
    }

    /// Create a transport error from any error type
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            source: Box::new(error),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// The remote path holds no blob.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The service answered with an error status (404 included).
    pub fn is_http(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Http { .. })
    }
}
