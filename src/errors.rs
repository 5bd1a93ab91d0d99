//! Core error taxonomy
//!
//! Every variant except [`CoreError::CodeSpaceExhausted`] is a recoverable,
//! caller-visible condition.

use thiserror::Error;

use crate::review::ReviewStatus;
use crate::storage;

/// Errors produced by the link lifecycle, review and analytics operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// The destination URL is invalid or matches a blocked-domain rule
    #[error("destination is not allowed: {0}")]
    BadDestination(String),

    /// The alias is invalid, reserved, or collides with an existing alias
    #[error("alias is not allowed: {0}")]
    BadAlias(String),

    /// The link, alias or pending record does not exist (or is deleted)
    #[error("not found")]
    NotFound,

    /// Illegal review transition
    #[error("illegal review transition: {from} -> {to}")]
    InvalidStateChange {
        /// State the record is currently in
        from: ReviewStatus,

        /// State the transition tried to reach
        to: ReviewStatus,
    },

    /// The destination already has a pending or denied review record
    #[error("destination is already awaiting review or was rejected")]
    PendingOrRejected,

    /// Short code generation did not converge
    ///
    /// Indicates a deployment configuration problem (alphabet/bound too
    /// small for the number of live aliases), not a user mistake.
    #[error("short code space exhausted after {0} attempts")]
    CodeSpaceExhausted(usize),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] storage::Error),
}

/// Result type for all core operations
pub type Result<T> = core::result::Result<T, CoreError>;
