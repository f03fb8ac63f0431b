//! Error types for tsmeta
//!
//! This module defines the error taxonomy surfaced by the metadata store.
//! The schema cache never raises these for absent entries: a miss is a
//! normal outcome reported through return values.

use crate::path::PathError;
use crate::types::{DataType, Encoding};
use thiserror::Error;

/// Common result type for tsmeta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for tsmeta
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed path or pattern
    #[error("invalid path: {0}")]
    Parse(#[from] PathError),

    /// Lookup, alias or TTL target absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Node-kind mismatch, nested storage groups or pre-existing leaf
    #[error("structural conflict: {0}")]
    StructuralConflict(String),

    /// Aligned / non-aligned mismatch under a device
    #[error("alignment conflict: {0}")]
    AlignmentConflict(String),

    /// Alias already bound within its scope
    #[error("alias conflict: alias '{alias}' is already used under {device}")]
    AliasConflict { device: String, alias: String },

    /// Write attempted with no owning storage group ancestor
    #[error("no storage group set for path: {0}")]
    NoStorageGroup(String),

    /// Operation after shutdown
    #[error("metadata store is closed")]
    Closed,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("encoding {encoding} is not supported for data type {data_type}")]
    UnsupportedEncoding {
        data_type: DataType,
        encoding: Encoding,
    },

    // Engine errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a structural conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::StructuralConflict(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NoStorageGroup(_))
    }

    /// Check if this error reports a clash with existing schema
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::StructuralConflict(_) | Self::AlignmentConflict(_) | Self::AliasConflict { .. }
        )
    }

    /// Nothing is retried internally; only engine failures are worth a
    /// caller-side retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
