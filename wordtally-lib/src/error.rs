//! Error handling for the tally pipeline.
//!
//! Two families live here. `WordTallyError` covers failures that abort or
//! short-circuit an operation (bad configuration, unreadable input files,
//! cancellation). `FetchError` is per-URL failure data: it travels on the
//! fetcher's error stream and is only ever counted, never propagated.

use std::fmt;

/// Main error type for pipeline setup and library operations.
#[derive(Debug, Clone)]
pub enum WordTallyError {
    /// Configuration errors (out-of-range values, unparseable files, etc.)
    ConfigError {
        message: String,
    },

    /// File I/O errors when reading URL lists, dictionaries or config files
    FileError {
        path: String,
        message: String,
    },

    /// Network-related errors (client construction, connection, etc.)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// The operation observed the cancellation signal before completing
    Cancelled {
        operation: String,
    },

    /// Generic internal errors that don't fit other categories
    Internal {
        message: String,
    },
}

impl WordTallyError {
    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new cancellation error for the named operation.
    pub fn cancelled<O: Into<String>>(operation: O) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is the cancellation outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl fmt::Display for WordTallyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::Cancelled { operation } => {
                write!(f, "Cancelled during: {}", operation)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for WordTallyError {}

impl From<reqwest::Error> for WordTallyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else {
            Self::network_with_source("HTTP client error", err.to_string())
        }
    }
}

impl From<serde_json::Error> for WordTallyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization failed: {}", err),
        }
    }
}

impl From<std::io::Error> for WordTallyError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<regex::Error> for WordTallyError {
    fn from(err: regex::Error) -> Self {
        Self::Internal {
            message: format!("Regex error: {}", err),
        }
    }
}

/// Why a single URL could not be turned into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The request never produced a response (connect, timeout, reset)
    Network { message: String },

    /// The server answered with something other than 200 OK
    Status { code: u16 },

    /// The response body could not be read
    Decode { message: String },
}

impl FetchFailure {
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn decode<M: Into<String>>(message: M) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Check if another attempt at the same URL could succeed.
    ///
    /// 404 is terminal, as is a body that failed to decode.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { code } => *code != 404,
            Self::Decode { .. } => false,
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { message } => write!(f, "request failed: {}", message),
            Self::Status { code: 404 } => write!(f, "returned status 404 (not found)"),
            Self::Status { code } => write!(f, "returned status {}", code),
            Self::Decode { message } => write!(f, "failed reading response body: {}", message),
        }
    }
}

/// A URL that produced no document, tagged with the final cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    /// The URL that failed
    pub url: String,
    /// Cause reported by the last attempt
    pub failure: FetchFailure,
    /// How many requests were issued before giving up
    pub attempts: u32,
}

impl FetchError {
    pub fn new<U: Into<String>>(url: U, failure: FetchFailure, attempts: u32) -> Self {
        Self {
            url: url.into(),
            failure,
            attempts,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "document {} {} (after {} attempt{})",
            self.url,
            self.failure,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" }
        )
    }
}

impl std::error::Error for FetchError {}
