use thiserror::Error;

use crate::model::{BookingId, BookingStatus, EntityKind, Stay};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-range input. The caller can fix it and resubmit.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// The room already has an active booking overlapping the requested stay.
    #[error("room unavailable: conflicts with booking {booking_id} for {stay}")]
    Conflict { booking_id: BookingId, stay: Stay },

    /// Unknown id, or an id whose entity is soft-deleted where an active one is required.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: u64 },

    #[error("duplicate {field}: {value:?} is already in use")]
    DuplicateKey { field: &'static str, value: String },

    #[error("booking {id} is {status} and cannot change state")]
    InvalidTransition { id: BookingId, status: BookingStatus },

    #[error("cannot delete {kind} {id}: still referenced")]
    InUse { kind: EntityKind, id: u64 },

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(kind: EntityKind, id: u64) -> Self {
        EngineError::NotFound { kind, id }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::Conflict { .. } => "conflict",
            EngineError::NotFound { .. } => "not_found",
            EngineError::DuplicateKey { .. } => "duplicate_key",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::InUse { .. } => "in_use",
            EngineError::Timeout(_) => "timeout",
            EngineError::WalError(_) => "wal",
        }
    }
}
