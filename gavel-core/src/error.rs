//! Error types for Gavel operations

use crate::EntityType;
use thiserror::Error;

/// Storage layer errors, shared by the key-value store and the relational store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Key-value store unavailable: {reason}")]
    KeyValueUnavailable { reason: String },

    #[error("Relational store unavailable: {reason}")]
    RelationalUnavailable { reason: String },

    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: i64 },

    #[error("{entity_type:?} already exists: {key}")]
    AlreadyExists { entity_type: EntityType, key: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Corrupt value under {key}: {reason}")]
    CorruptValue { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// True when the backing service could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StorageError::KeyValueUnavailable { .. } | StorageError::RelationalUnavailable { .. }
        )
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Gavel errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GavelError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Background task failed: {reason}")]
    TaskFailed { reason: String },
}

/// Result type alias for Gavel operations.
pub type GavelResult<T> = Result<T, GavelError>;

// =============================================================================
// TESTS
// =============================================================================
