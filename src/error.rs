use std::time::Duration;
use thiserror::Error;

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by a fetch collaborator for a single request
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, TLS, timeout, body read)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// Response body exceeds the configured size limit
    #[error("response of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

/// All errors surfaced by the crawl-and-aggregate pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A follow/ignore pattern failed to compile
    #[error("invalid {kind} pattern '{pattern}': {source}")]
    Pattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A CSS selector failed to parse
    #[error("invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// A configured URL is malformed or uses an unsupported scheme
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A size string like `10MB` could not be parsed
    #[error("invalid size '{0}'")]
    InvalidSize(String),

    /// The configuration file could not be read or decoded
    #[error("failed to load config file: {0}")]
    ConfigFile(String),

    /// Every attempt to fetch a URL failed
    #[error("failed to fetch {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    /// The page was fetched but produced no usable content
    #[error("no content extracted from {0}")]
    NoContent(String),

    /// None of the start URLs could be fetched
    #[error("all {} start URLs failed", .0.len())]
    AllSeedsFailed(Vec<(String, String)>),

    /// The crawl deadline expired
    #[error("crawl timed out after {0:?}")]
    Timeout(Duration),

    /// The crawl was cancelled by the caller
    #[error("crawl cancelled")]
    Cancelled,

    /// Output was requested but nothing was aggregated
    #[error("no pages to aggregate")]
    NoPages,

    /// Writing the output document failed
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error terminates the run (as opposed to skipping one URL)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::AllSeedsFailed(_) | Error::Timeout(_) | Error::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(Error::Cancelled.is_fatal());
        assert!(Error::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(Error::AllSeedsFailed(vec![]).is_fatal());
        assert!(!Error::NoContent("https://example.com".to_string()).is_fatal());
        assert!(!Error::NoPages.is_fatal());
    }

    #[test]
    fn test_retries_exhausted_message() {
        let err = Error::RetriesExhausted {
            url: "https://example.com/docs".to_string(),
            attempts: 3,
            source: FetchError::Status(503),
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch https://example.com/docs after 3 attempts: HTTP 503"
        );
    }
}
