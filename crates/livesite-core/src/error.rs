//! Error types and handling for livesite-core operations.
//!
//! This module provides one error type covering every failure a mutation
//! cycle can run into. Errors are categorized so the cycle boundary can log
//! them with a stable tag, and they carry a recoverability hint for callers
//! that want to retry.
//!
//! ## Error Categories
//!
//! - **I/O Errors**: File system operations, disk access
//! - **Network Errors**: HTTP requests to the generator and news sources
//! - **Parse Errors**: Documents or fragments that cannot be tokenized
//! - **Target Errors**: Section identifiers that no longer resolve
//! - **Generator Errors**: The external text generator failed
//! - **Persistence Errors**: Document, backup or state writes failed
//! - **Configuration Errors**: Invalid settings or config files
//!
//! ## Recovery Hints
//!
//! ```rust
//! use livesite_core::Error;
//!
//! let err = Error::Generator("upstream returned 529".into());
//! assert_eq!(err.category(), "generator");
//! assert!(!err.is_recoverable());
//! ```

use thiserror::Error;

/// The main error type for livesite-core operations.
///
/// All fallible public functions in livesite-core return `Result<T, Error>`.
/// Conversions from the standard library and serde errors are automatic.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers reads of the document, inbox and state file. Write failures of
    /// durable artifacts are reported as [`Error::Persistence`] instead.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Transport-level failures when talking to news sources. Generator
    /// transport failures are folded into [`Error::Generator`].
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Document or fragment could not be parsed, even leniently.
    ///
    /// Inside the classifier this triggers a downgrade to a simpler content
    /// class; it only aborts a cycle when nothing usable remains.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A section identifier no longer resolves against the live document.
    ///
    /// Never fatal to a cycle: the patch applier falls back to the standing
    /// modifications container.
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// The external text generator failed.
    ///
    /// Aborts the cycle before any mutation; the document is left untouched.
    #[error("Generator error: {0}")]
    Generator(String),

    /// Writing the document, a backup or the state file failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A tree mutation was rejected before it touched the tree.
    ///
    /// Raised for detached references, attempts to move a node into its own
    /// subtree, or operations on the document root.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Another cycle currently holds the document lock.
    #[error("Document is locked by another cycle: {0}")]
    Locked(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Returns `true` for network timeouts and connection failures,
    /// interrupted or timed-out I/O, and lock contention. Everything else is
    /// treated as permanent for the current cycle.
    ///
    /// ```rust
    /// use livesite_core::Error;
    /// use std::io;
    ///
    /// assert!(Error::Io(io::Error::new(io::ErrorKind::Interrupted, "eintr")).is_recoverable());
    /// assert!(Error::Locked("index.html".into()).is_recoverable());
    /// assert!(!Error::Parse("nul byte".into()).is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Locked(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier.
    ///
    /// Stable lowercase tags used as the `category` field in log events:
    /// `io`, `network`, `parse`, `target_not_found`, `generator`,
    /// `persistence`, `config`, `serialization`, `invalid_operation`,
    /// `locked`, `other`.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::TargetNotFound(_) => "target_not_found",
            Self::Generator(_) => "generator",
            Self::Persistence(_) => "persistence",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::Locked(_) => "locked",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for Results with livesite-core errors.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display_formatting() {
        let cases = vec![
            (Error::Parse("nul byte".into()), "Parse error: nul byte"),
            (
                Error::TargetNotFound("section_contact".into()),
                "Target not found: section_contact",
            ),
            (
                Error::Generator("401 unauthorized".into()),
                "Generator error: 401 unauthorized",
            ),
            (
                Error::Persistence("disk full".into()),
                "Persistence error: disk full",
            ),
            (Error::Other("misc".into()), "misc"),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_categories_are_distinct() {
        let errors = [
            Error::Io(io::Error::other("x")),
            Error::Parse(String::new()),
            Error::TargetNotFound(String::new()),
            Error::Generator(String::new()),
            Error::Persistence(String::new()),
            Error::Config(String::new()),
            Error::Serialization(String::new()),
            Error::InvalidOperation(String::new()),
            Error::Locked(String::new()),
            Error::Other(String::new()),
        ];
        let mut seen = std::collections::HashSet::new();
        for err in &errors {
            assert!(seen.insert(err.category()), "duplicate {}", err.category());
        }
    }

    #[test]
    fn test_recoverability() {
        // Given: transient and permanent failures
        let transient = [
            Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow disk")),
            Error::Io(io::Error::new(io::ErrorKind::Interrupted, "signal")),
            Error::Locked("site/index.html".into()),
        ];
        let permanent = [
            Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            Error::Generator("bad key".into()),
            Error::Config("max_sections must be >= 1".into()),
        ];

        // Then: only transient ones are retryable
        assert!(transient.iter().all(Error::is_recoverable));
        assert!(!permanent.iter().any(Error::is_recoverable));
    }

    #[test]
    fn test_serde_json_conversion() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.category(), "serialization");
    }
}
