// Error handling module for the datastore client
//
// This module defines error types and utility functions for error handling

use std::io;
use std::result;
use thiserror::Error;

/// Result type for datastore client operations
pub type Result<T> = result::Result<T, DatastoreError>;

/// Error type for datastore client operations
#[derive(Debug, Error, Clone)]
pub enum DatastoreError {
    /// No such file, directory, or datastore
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path collision on create-without-overwrite
    #[error("Already exists: {0}")]
    Exists(String),

    /// Parent lookup returned a non-directory
    #[error("Not a directory: {0}")]
    NotDir(String),

    /// Operation rejected by the gateway as not permitted
    #[error("Operation not permitted: {0}")]
    Permission(String),

    /// Authentication failure from the gateway
    #[error("Access denied: {0}")]
    Access(String),

    /// Malformed request or credentials
    #[error("Invalid argument: {0}")]
    Invalid(String),

    /// 5xx, malformed response, or schema violation
    #[error("Remote I/O error: {0}")]
    RemoteIo(String),

    /// No driver assignment satisfies the replication strategy
    #[error("Unsatisfiable replication strategy: {0}")]
    UnsatisfiableReplicationStrategy(String),

    /// A datastore create whose outcome is ambiguous
    #[error("Partial datastore create: {0}")]
    PartialCreate(String),

    /// Cryptographic errors
    #[error("Crypto error: {context}")]
    Crypto { context: String },

    /// Serialization-related errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP request errors
    #[error("Request error: {0}")]
    Request(String),

    /// Wire structure failed schema validation
    #[error("Schema validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),
}

impl DatastoreError {
    /// Create a cryptographic error
    pub fn crypto<S: Into<String>>(context: S) -> Self {
        Self::Crypto {
            context: context.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a remote I/O error
    pub fn remote_io<S: Into<String>>(message: S) -> Self {
        Self::RemoteIo(message.into())
    }

    /// Create a session store error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage(message.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// POSIX-style errno name for the stable error taxonomy, if the kind
    /// carries one
    pub fn errno(&self) -> Option<&'static str> {
        match self {
            DatastoreError::NotFound(_) => Some("ENOENT"),
            DatastoreError::Exists(_) => Some("EEXIST"),
            DatastoreError::NotDir(_) => Some("ENOTDIR"),
            DatastoreError::Permission(_) => Some("EPERM"),
            DatastoreError::Access(_) => Some("EACCES"),
            DatastoreError::Invalid(_) => Some("EINVAL"),
            DatastoreError::RemoteIo(_) => Some("EREMOTEIO"),
            _ => None,
        }
    }

    /// Map an inbound gateway status code to the stable error taxonomy.
    ///
    /// 400 -> EPERM, 401 -> EINVAL, 403 -> EACCES, 404 -> ENOENT, and every
    /// 5xx is a remote I/O failure.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => DatastoreError::Permission(message),
            401 => DatastoreError::Invalid(message),
            403 => DatastoreError::Access(message),
            404 => DatastoreError::NotFound(message),
            s if s >= 500 => DatastoreError::RemoteIo(message),
            _ => DatastoreError::Request(format!("HTTP {status}: {message}")),
        }
    }
}

// Implement conversion from io::Error to DatastoreError
impl From<io::Error> for DatastoreError {
    fn from(err: io::Error) -> Self {
        DatastoreError::Io(err.to_string())
    }
}

// Implement conversion from reqwest error to DatastoreError
impl From<reqwest::Error> for DatastoreError {
    fn from(err: reqwest::Error) -> Self {
        DatastoreError::Request(err.to_string())
    }
}

// Implement conversion from serde_json::Error to DatastoreError
impl From<serde_json::Error> for DatastoreError {
    fn from(err: serde_json::Error) -> Self {
        DatastoreError::Serialization(err.to_string())
    }
}

// Implement conversion from toml serialization error to DatastoreError
impl From<toml::ser::Error> for DatastoreError {
    fn from(err: toml::ser::Error) -> Self {
        DatastoreError::Serialization(err.to_string())
    }
}

// Implement conversion from toml deserialization error to DatastoreError
impl From<toml::de::Error> for DatastoreError {
    fn from(err: toml::de::Error) -> Self {
        DatastoreError::Serialization(err.to_string())
    }
}
