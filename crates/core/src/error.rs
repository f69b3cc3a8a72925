//! Domain error model.

use thiserror::Error;

use crate::quantity::Quantity;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// missing references, stock policy, conflicts). Infrastructure concerns belong
/// elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (malformed or out-of-range input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced item or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A depleting adjustment would drive stock below zero.
    #[error(
        "insufficient stock for '{item_code}': requested change {requested}, current stock {available}"
    )]
    InsufficientStock {
        item_code: String,
        requested: Quantity,
        available: Quantity,
    },

    /// A conflict occurred (stale expected value / optimistic concurrency).
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Authorization failure reported by the access seam.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn insufficient_stock(
        item_code: impl Into<String>,
        requested: Quantity,
        available: Quantity,
    ) -> Self {
        Self::InsufficientStock {
            item_code: item_code.into(),
            requested,
            available,
        }
    }
}
