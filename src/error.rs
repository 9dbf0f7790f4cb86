//! Error types shared across the engine.
//!
//! Most "nothing to do" situations (a request builder yielding no request, a
//! fingerprint comparison with a missing side, an index with no saved exchange)
//! are not errors and are expressed with `Option` or `bool` instead. `ScanError`
//! covers the conditions that callers are expected to propagate.

use thiserror::Error;

/// The main error type for the probe engine.
#[derive(Error, Debug)]
pub enum ScanError {
    /// A call was made on an object that is not in a state to honour it.
    /// This signals a bug in the calling check module.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The engine was assembled with an unusable configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A probe request could not be downloaded.
    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    /// Transport error raised by the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A response-processing module reported a failure.
    #[error("Module '{module}' failed: {reason}")]
    Module { module: String, reason: String },

    #[error("{0}")]
    GeneralError(String),
}

impl ScanError {
    /// Convenience constructor for module failures.
    pub fn module(module: impl Into<String>, reason: impl Into<String>) -> Self {
        ScanError::Module {
            module: module.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ScanError::InvalidState("no index".into());
        assert_eq!(err.to_string(), "Invalid state: no index");

        let err = ScanError::module("vinfo-metatags", "bad body");
        assert_eq!(err.to_string(), "Module 'vinfo-metatags' failed: bad body");
    }

    #[test]
    fn test_url_error_conversion() {
        let err: ScanError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, ScanError::Url(_)));
    }
}
