//! Error types for capital-call-rs.
//!
//! Every variant maps to a stable machine-readable code (see [`Error::code`])
//! so clients can branch on the code instead of matching message text.

use thiserror::Error;

use crate::auth::Capability;
use crate::model::{CapitalCallId, WorkflowStatus};
use crate::workflow::Action;

/// What kind of input rule a request broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    /// Batch id does not match `ALE-` followed by six digits.
    BatchIdFormat,
    /// A single breakdown percentage lies outside `[0, 100]`.
    PercentageOutOfRange,
    /// Breakdown percentages sum to more than the allowed total.
    PercentageExceeded,
    /// `from_date` is after `to_date`.
    DateOrder,
    /// The date span is longer than the configured maximum.
    DateRangeTooLong,
    /// Total amount is zero or negative.
    AmountNotPositive,
    /// Unknown or malformed search filter / sort field.
    InvalidFilter,
    /// A queue count request named no queues.
    EmptyQueues,
    /// A breakdown amount does not fit in a decimal.
    AmountOutOfRange,
    /// A capital call id that is not a UUID.
    MalformedId,
}

impl ValidationKind {
    pub fn code(self) -> &'static str {
        match self {
            ValidationKind::BatchIdFormat => "VAL_001",
            ValidationKind::PercentageOutOfRange => "VAL_002",
            ValidationKind::PercentageExceeded => "VAL_003",
            ValidationKind::DateOrder => "VAL_004",
            ValidationKind::DateRangeTooLong => "VAL_006",
            ValidationKind::AmountNotPositive => "VAL_008",
            ValidationKind::InvalidFilter => "VAL_009",
            ValidationKind::EmptyQueues => "VAL_010",
            ValidationKind::AmountOutOfRange => "VAL_011",
            ValidationKind::MalformedId => "VAL_012",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}")]
    Validation {
        kind: ValidationKind,
        message: String,
    },

    #[error("capital call not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    LockConflict(String),

    #[error("capital call {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: CapitalCallId, expected: i64 },

    #[error("{actor} does not have permission for {capability}")]
    PermissionDenied {
        actor: String,
        capability: Capability,
    },

    #[error("cannot {action} a capital call in {from} status")]
    InvalidTransition {
        from: WorkflowStatus,
        action: Action,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(kind: ValidationKind, message: impl Into<String>) -> Self {
        Error::Validation {
            kind,
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { kind, .. } => kind.code(),
            Error::NotFound(_) => "ENTITY_NOT_FOUND",
            Error::LockConflict(_) => "LOCK_CONFLICT",
            Error::VersionConflict { .. } => "VERSION_CONFLICT",
            Error::PermissionDenied { .. } => "ACCESS_DENIED",
            Error::InvalidTransition { .. } => "BUS_001",
            Error::Database(_) | Error::Migration(_) => "STORAGE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) | Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Only a version conflict is worth retrying, after reloading the entity.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
