//! Error types for skill-split.

use thiserror::Error;

/// Result type alias for skill-split operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for skill-split operations.
///
/// All public functions return `Result<T, Error>`. Variants map one-to-one
/// onto the error taxonomy: detector/parser failures, the round-trip
/// guarantee, store/query lookups, internal consistency repairs, and the
/// filesystem/remote boundaries crossed by checkout and the embedding
/// adapter.
#[derive(Error, Debug)]
pub enum Error {
    /// The format detector could not choose a parser for a path/content pair.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Input could not be parsed (malformed frontmatter fence, unmatched XML
    /// tag, etc). Aborts the enclosing `store` transaction.
    #[error("parse error: {0}")]
    Parse(String),

    /// Recomposed bytes did not match the stored content hash. Fatal on
    /// store; the caller must not persist the offending file.
    #[error("round-trip violation for {path}: recomposed hash {actual} != {expected}")]
    RoundTripViolation {
        /// Path of the offending file.
        path: String,
        /// Hash computed from the stored sections at recompose time.
        actual: String,
        /// Hash recorded at store time.
        expected: String,
    },

    /// A file, section, or checkout could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An internal invariant was violated (e.g. an orphaned FTS row was
    /// detected). Repaired automatically where possible; this variant is
    /// raised only when repair itself fails or is not attempted.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A section/composition request named an id that was not supplied or
    /// does not exist.
    #[error("unknown section id: {0}")]
    UnknownSection(i64),

    /// A composition was requested with zero section ids.
    #[error("composition requires at least one section")]
    EmptyComposition,

    /// A compensating rollback during checkout partially or fully failed.
    #[error("rollback failure: {0}")]
    RollbackFailure(String),

    /// No secret source (config file, keyring, environment) yielded a
    /// required credential.
    #[error("secret not found: {0}")]
    SecretNotFound(String),

    /// An embedding/remote-store call failed after exhausting retries.
    /// Partial results may already be recorded by the caller.
    #[error("remote failure: {0}")]
    RemoteFailure(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem or other I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A task panicked or was cancelled inside the embedding worker pool.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether retrying the failed operation might succeed (used by the
    /// embedding adapter's backoff loop and by callers deciding whether to
    /// surface a transient-vs-permanent failure).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::RemoteFailure(_) | Error::Io(_))
    }

    /// A short, stable category name, useful for metrics/log fields without
    /// leaking the full message.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::Parse(_) => "parse",
            Error::RoundTripViolation { .. } => "round_trip_violation",
            Error::NotFound(_) => "not_found",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::UnknownSection(_) => "unknown_section",
            Error::EmptyComposition => "empty_composition",
            Error::RollbackFailure(_) => "rollback_failure",
            Error::SecretNotFound(_) => "secret_not_found",
            Error::RemoteFailure(_) => "remote_failure",
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Join(_) => "join",
        }
    }
}
