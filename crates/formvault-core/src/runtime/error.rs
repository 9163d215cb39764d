// crates/formvault-core/src/runtime/error.rs
// ============================================================================
// Module: Formvault Runtime Errors
// Description: Dispatch and irreversible-operation error types.
// Purpose: Give callers typed failures with stable reason codes.
// Dependencies: crate::interfaces, thiserror
// ============================================================================

//! ## Overview
//! [`MigrationError`] covers dispatch and precondition failures surfaced
//! before any mutation. [`IrreversibleError`] covers the gates in front of
//! plaintext nullification and column removal; each variant maps to a
//! stable machine-readable code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Migration Errors
// ============================================================================

/// Dispatch and precondition failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MigrationError {
    /// No migration is registered under the key.
    #[error("unknown migration: {0}")]
    UnknownMigration(String),
    /// The migration is registered but its definition is unavailable.
    #[error("migration unavailable: {0}")]
    Unavailable(String),
    /// A precondition failed; nothing was mutated.
    #[error("migration {key} cannot run: {reason}")]
    NotRunnable {
        /// Migration key.
        key: String,
        /// Operator-facing reason.
        reason: String,
    },
    /// A read needed to answer the request failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Irreversible Errors
// ============================================================================

/// Refusals from the irreversible operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IrreversibleError {
    /// Encryption has not reached 100%.
    #[error("encryption is {percent}% complete; 100% is required")]
    EncryptionIncomplete {
        /// Current completion percentage.
        percent: f64,
    },
    /// The grace window since encryption completion has not elapsed.
    #[error("grace period active: {elapsed_days} of {required_days} days elapsed")]
    GracePeriodActive {
        /// Whole days elapsed since encryption completion.
        elapsed_days: i64,
        /// Days required by the operation.
        required_days: i64,
    },
    /// The confirmation literal was missing or wrong.
    #[error("confirmation required: pass the literal \"{expected}\"")]
    ConfirmationRequired {
        /// Literal the operator must supply.
        expected: &'static str,
    },
    /// Store failure while checking preconditions or applying the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IrreversibleError {
    /// Returns the stable reason code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EncryptionIncomplete {
                ..
            } => "encryption_incomplete",
            Self::GracePeriodActive {
                ..
            } => "grace_period_active",
            Self::ConfirmationRequired {
                ..
            } => "confirmation_required",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<MigrationError> for IrreversibleError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Store(store) => Self::Store(store),
            other => Self::Store(StoreError::Invalid(other.to_string())),
        }
    }
}
