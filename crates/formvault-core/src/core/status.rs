// crates/formvault-core/src/core/status.rs
// ============================================================================
// Module: Formvault Migration Status
// Description: Progress snapshots and batch outcomes shared by all strategies.
// Purpose: Give every migration kind one status and execution contract.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Progress is always re-derived from row state. A [`MigrationStatus`] is a
//! snapshot of two counts; a [`BatchOutcome`] reports one bounded unit of
//! work.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Progress snapshot for a migration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MigrationStatus {
    /// Records in scope.
    pub total: u64,
    /// Records already migrated.
    pub migrated: u64,
    /// Records still pending.
    pub pending: u64,
    /// Completion percentage with one decimal place.
    pub percent: f64,
    /// True when nothing is pending.
    pub is_complete: bool,
}

impl MigrationStatus {
    /// Builds a status from the in-scope and pending counts.
    ///
    /// Pending is clamped to the total so concurrent writers never produce a
    /// negative migrated count.
    #[must_use]
    pub fn from_counts(total: u64, pending: u64) -> Self {
        let pending = pending.min(total);
        let migrated = total - pending;
        let percent = if total == 0 {
            100.0
        } else {
            #[allow(clippy::cast_precision_loss, reason = "Percent display tolerates rounding.")]
            let ratio = migrated as f64 / total as f64;
            (ratio * 1000.0).round() / 10.0
        };
        Self {
            total,
            migrated,
            pending,
            percent,
            is_complete: pending == 0,
        }
    }

    /// Status of a single boolean milestone.
    #[must_use]
    pub fn from_flag(done: bool) -> Self {
        Self::from_counts(1, u64::from(!done))
    }
}

// ============================================================================
// SECTION: Batches
// ============================================================================

/// Parameters for one batch invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchRequest {
    /// Zero-based batch number within an operator session.
    pub batch_index: u32,
    /// Skip activity-sink notification for this batch.
    pub suppress_activity: bool,
}

impl BatchRequest {
    /// Request for the given batch index with activity enabled.
    #[must_use]
    pub const fn at(batch_index: u32) -> Self {
        Self {
            batch_index,
            suppress_activity: false,
        }
    }
}

/// Result of one batch invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// False when any record failed or the store rejected a write.
    pub success: bool,
    /// Records actually changed by this batch.
    pub processed: u64,
    /// True while records remain pending.
    pub has_more: bool,
    /// Operator-facing summary.
    pub message: String,
    /// Per-record and store errors collected during the batch.
    pub errors: Vec<String>,
}
