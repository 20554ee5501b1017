//! Transfer Error Types
//!
//! Every failure the engine can surface. The boundary layer maps them to
//! transport responses through [`TransferError::code`] and
//! [`TransferError::http_status`].

use thiserror::Error;

use crate::core_types::{ContainerId, ContentId, GroupId, KindId, SubstanceId, UnitId};
use crate::volume::VolumeError;

/// Transfer error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("{container} would overflow")]
    Overflow { container: String },

    #[error("Source and destination container cannot be the same")]
    SameContainer,

    #[error("Invalid volume: {0}")]
    InvalidVolume(#[from] VolumeError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === Invariant Faults ===
    #[error("Cannot combine volumes of different substances ({existing} and {incoming})")]
    SubstanceMismatch { existing: String, incoming: String },

    // === Lookup Errors ===
    #[error("Container not found: {0}")]
    ContainerNotFound(ContainerId),

    #[error("Transfer group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Unit not found: {0}")]
    UnitNotFound(UnitId),

    #[error("Container kind not found: {0}")]
    KindNotFound(KindId),

    #[error("Substance not found: {0}")]
    SubstanceNotFound(SubstanceId),

    #[error("Content not found: {0}")]
    ContentNotFound(ContentId),

    // === State Errors ===
    #[error("Transfer group {0} was already executed")]
    AlreadyExecuted(GroupId),

    /// A unique key is already taken; retrying the same request cannot succeed
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Concurrent transactions collided; the request may be retried
    #[error("Conflict: {0}")]
    Conflict(String),

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Overflow { .. } => "OVERFLOW",
            TransferError::SameContainer => "SAME_CONTAINER",
            TransferError::InvalidVolume(_) => "INVALID_VOLUME",
            TransferError::InvalidInput(_) => "INVALID_INPUT",
            TransferError::SubstanceMismatch { .. } => "SUBSTANCE_MISMATCH",
            TransferError::ContainerNotFound(_) => "CONTAINER_NOT_FOUND",
            TransferError::GroupNotFound(_) => "GROUP_NOT_FOUND",
            TransferError::UnitNotFound(_) => "UNIT_NOT_FOUND",
            TransferError::KindNotFound(_) => "KIND_NOT_FOUND",
            TransferError::SubstanceNotFound(_) => "SUBSTANCE_NOT_FOUND",
            TransferError::ContentNotFound(_) => "CONTENT_NOT_FOUND",
            TransferError::AlreadyExecuted(_) => "ALREADY_EXECUTED",
            TransferError::Duplicate(_) => "DUPLICATE",
            TransferError::Conflict(_) => "CONFLICT",
            TransferError::DatabaseError(_) => "DATABASE_ERROR",
            TransferError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::Overflow { .. }
            | TransferError::SameContainer
            | TransferError::InvalidVolume(_)
            | TransferError::InvalidInput(_) => 400,
            TransferError::ContainerNotFound(_)
            | TransferError::GroupNotFound(_)
            | TransferError::UnitNotFound(_)
            | TransferError::KindNotFound(_)
            | TransferError::SubstanceNotFound(_)
            | TransferError::ContentNotFound(_) => 404,
            TransferError::AlreadyExecuted(_)
            | TransferError::Duplicate(_)
            | TransferError::Conflict(_) => 409,
            TransferError::SubstanceMismatch { .. }
            | TransferError::DatabaseError(_)
            | TransferError::SystemError(_) => 500,
        }
    }

    /// Whether the boundary layer may retry the whole request.
    ///
    /// Only serialization failures and deadlocks qualify; the engine itself
    /// never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Conflict(_))
    }

    /// Whether the error is a programming fault rather than a rejected request
    pub fn is_invariant_fault(&self) -> bool {
        matches!(self, TransferError::SubstanceMismatch { .. })
    }
}

/// Postgres SQLSTATE codes with a dedicated variant
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            let code = db_err.code();
            match code.as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    return TransferError::Duplicate(db_err.message().to_string());
                }
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    return TransferError::Conflict(db_err.message().to_string());
                }
                _ => {}
            }
        }
        TransferError::DatabaseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let overflow = TransferError::Overflow {
            container: "TubeB".into(),
        };
        assert_eq!(overflow.code(), "OVERFLOW");
        assert_eq!(TransferError::ContainerNotFound(5).code(), "CONTAINER_NOT_FOUND");
        assert_eq!(TransferError::SameContainer.code(), "SAME_CONTAINER");
    }

    #[test]
    fn test_http_status() {
        let overflow = TransferError::Overflow {
            container: "TubeB".into(),
        };
        assert_eq!(overflow.http_status(), 400);
        assert_eq!(TransferError::ContainerNotFound(5).http_status(), 404);
        assert_eq!(TransferError::AlreadyExecuted(1).http_status(), 409);
        assert_eq!(TransferError::DatabaseError("x".into()).http_status(), 500);
        let mismatch = TransferError::SubstanceMismatch {
            existing: "A".into(),
            incoming: "B".into(),
        };
        assert_eq!(mismatch.http_status(), 500);
        assert!(mismatch.is_invariant_fault());
    }

    #[test]
    fn test_retryable() {
        assert!(TransferError::Conflict("serialization failure".into()).is_retryable());
        let duplicate = TransferError::Duplicate("plan (group, order)".into());
        assert!(!duplicate.is_retryable());
        assert_eq!(duplicate.http_status(), 409);
        assert_eq!(duplicate.code(), "DUPLICATE");
        assert!(
            !TransferError::Overflow {
                container: "TubeB".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display() {
        let err = TransferError::Overflow {
            container: "TubeB".into(),
        };
        assert_eq!(err.to_string(), "TubeB would overflow");
    }

    #[test]
    fn test_from_volume_error() {
        let err: TransferError = VolumeError::InvalidQuantity { quantity: -1.0 }.into();
        assert_eq!(err.code(), "INVALID_VOLUME");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn test_from_sqlx_non_database_error() {
        let err: TransferError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), "DATABASE_ERROR");
    }
}
