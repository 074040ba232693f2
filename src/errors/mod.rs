//! # Error Handling
//!
//! Crate-wide error types for Herald using `thiserror`. One enum covers the
//! resolution pipeline (provider fallback, cache, URI parsing) plus the
//! ambient concerns (config, storage, I/O); the HTTP layer maps these onto
//! response codes via [`Error::status_code`].

use chrono::{DateTime, Utc};

/// Custom result type for Herald operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Herald
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The string is not a well-formed `op://vault/item/field` reference
    #[error("invalid op:// URI {uri:?}: expected op://vault/item/field")]
    InvalidUri { uri: String },

    /// A single provider failed to resolve; transient, triggers fallback
    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// A provider is refusing requests with a rate-limit error
    #[error("provider {provider}: rate limited since {since}")]
    RateLimited { provider: String, since: DateTime<Utc> },

    /// Every configured provider failed; wraps the last failure
    #[error("all providers failed, last error: {source}")]
    AllProvidersFailed {
        #[source]
        source: Box<Error>,
    },

    /// The provider list is empty
    #[error("no providers configured")]
    NoProviders,

    /// A materialize call aborted on an unresolvable reference
    #[error("resolve {uri}: {source}")]
    MaterializeFailed {
        uri: String,
        #[source]
        source: Box<Error>,
    },

    /// Cache lookup found no entry
    #[error("cache: key not found")]
    CacheMiss,

    /// Cache entry exists but its TTL has elapsed
    #[error("cache: entry expired")]
    CacheExpired,

    /// AEAD open failed: tampered ciphertext or wrong passphrase
    #[error("cache: decryption failed")]
    DecryptFailed,

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable store (redb) errors
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O errors with context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Upstream HTTP errors with a status code
    #[error("HTTP {status}: {message}")]
    Http { message: String, status: u16 },

    /// Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage(message.into())
    }

    /// Create a provider failure for the named provider
    pub fn provider<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create an upstream HTTP error
    pub fn http<S: Into<String>>(message: S, status: u16) -> Self {
        Self::Http { message: message.into(), status }
    }

    /// The HTTP status code the API layer should return for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidUri { .. } => 400,
            Error::Provider { .. } => 502,
            Error::RateLimited { .. } => 503,
            Error::AllProvidersFailed { .. } => 500,
            Error::NoProviders => 503,
            Error::MaterializeFailed { source, .. } => source.status_code(),
            Error::CacheMiss | Error::CacheExpired => 404,
            Error::DecryptFailed => 500,
            Error::Config(_) => 500,
            Error::Storage(_) => 500,
            Error::Io { .. } => 500,
            Error::Serialization { .. } => 400,
            Error::Http { status, .. } => *status,
            Error::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(error: redb::DatabaseError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(error: redb::TransactionError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<redb::TableError> for Error {
    fn from(error: redb::TableError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<redb::StorageError> for Error {
    fn from(error: redb::StorageError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<redb::CommitError> for Error {
    fn from(error: redb::CommitError) -> Self {
        Self::Storage(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidUri { uri: "op://bad".to_string() };
        assert_eq!(
            err.to_string(),
            "invalid op:// URI \"op://bad\": expected op://vault/item/field"
        );

        let err = Error::provider("connect", "vault not found");
        assert_eq!(err.to_string(), "provider connect: vault not found");
    }

    #[test]
    fn test_all_providers_failed_wraps_last() {
        let last = Error::provider("sdk", "timeout");
        let err = Error::AllProvidersFailed { source: Box::new(last) };
        assert!(err.to_string().contains("provider sdk: timeout"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::InvalidUri { uri: "x".into() }.status_code(), 400);
        assert_eq!(Error::NoProviders.status_code(), 503);
        assert_eq!(
            Error::AllProvidersFailed { source: Box::new(Error::NoProviders) }.status_code(),
            500
        );
        assert_eq!(Error::CacheExpired.status_code(), 404);
        assert_eq!(Error::http("bad gateway", 502).status_code(), 502);
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_error.into();
        assert!(matches!(err, Error::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_error.into();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
