// crates/formvault-core/src/runtime/strategy/cleanup.rs
// ============================================================================
// Module: Cleanup Strategy
// Description: Grace-gated nulling of plaintext that already has ciphertext.
// Purpose: Remove plaintext shadows once encrypted copies have aged.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! Batch 0 first rewrites every empty-string value in the table to null so
//! that "empty" and "absent" agree for every eligibility predicate. Each
//! batch then selects records created before the grace cutoff that still
//! carry plaintext next to ciphertext, and nulls that plaintext in a single
//! statement keyed by the selected ids. A plaintext column is only nulled
//! when its own ciphertext shadow is present.
//!
//! The strategy refuses to run without a configured cipher.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::Condition;
use crate::core::MigrationStatus;
use crate::core::NullifyScope;
use crate::core::RecordId;
use crate::core::RecordQuery;
use crate::core::SENSITIVE_FIELDS;
use crate::core::Timestamp;
use crate::interfaces::StoreError;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::MigrationDefinition;
use crate::runtime::strategy::BatchTally;
use crate::runtime::strategy::MigrationContext;
use crate::runtime::strategy::MigrationStrategy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum record age before its plaintext may be nulled.
pub const CLEANUP_GRACE_DAYS: i64 = 15;

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Plaintext cleanup behind the record-age grace window.
pub struct CleanupStrategy {
    /// Shared collaborators.
    ctx: MigrationContext,
}

impl CleanupStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(ctx: MigrationContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Creation-time cutoff for eligible records.
    fn cutoff(&self) -> Timestamp {
        self.ctx.clock.now().minus_days(CLEANUP_GRACE_DAYS)
    }

    /// Aged records carrying ciphertext.
    fn scope_conditions(cutoff: Timestamp) -> Vec<Condition> {
        vec![
            Condition::CreatedBefore(cutoff),
            Condition::Any(
                SENSITIVE_FIELDS.iter().map(|field| Condition::Present(field.ciphertext)).collect(),
            ),
        ]
    }

    /// Aged records still holding plaintext next to its ciphertext.
    fn pending_conditions(cutoff: Timestamp) -> Vec<Condition> {
        vec![
            Condition::CreatedBefore(cutoff),
            Condition::Any(
                SENSITIVE_FIELDS
                    .iter()
                    .map(|field| {
                        Condition::All(vec![
                            Condition::Present(field.plaintext),
                            Condition::Present(field.ciphertext),
                        ])
                    })
                    .collect(),
            ),
        ]
    }

    /// Runs both cleanup phases.
    fn clean(
        &self,
        definition: &MigrationDefinition,
        request: &BatchRequest,
        cutoff: Timestamp,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        if request.batch_index == 0 {
            let normalized = self.ctx.records.normalize_empty_strings()?;
            if normalized > 0 {
                tally.note_change(None, &format!("normalized {normalized} empty values to null"));
            }
        }
        let query = RecordQuery::page(Self::pending_conditions(cutoff), definition.batch_size);
        let ids: Vec<RecordId> =
            self.ctx.records.select(&query)?.into_iter().map(|record| record.id).collect();
        if ids.is_empty() {
            return Ok(());
        }
        let changed = self
            .ctx
            .records
            .nullify_encrypted_plaintext(&NullifyScope::Records(ids), &SENSITIVE_FIELDS)?;
        tally.changed_many(changed);
        Ok(())
    }
}

impl MigrationStrategy for CleanupStrategy {
    fn calculate_status(
        &self,
        _definition: &MigrationDefinition,
    ) -> Result<MigrationStatus, MigrationError> {
        let cutoff = self.cutoff();
        let total = self.ctx.records.count(&Self::scope_conditions(cutoff))?;
        let pending = self.ctx.records.count(&Self::pending_conditions(cutoff))?;
        Ok(MigrationStatus::from_counts(total, pending))
    }

    fn can_run(&self, definition: &MigrationDefinition) -> Result<(), MigrationError> {
        self.ctx.require_cipher(definition).map(|_| ())
    }

    fn execute(
        &self,
        definition: &MigrationDefinition,
        request: &BatchRequest,
    ) -> Result<BatchOutcome, MigrationError> {
        self.ctx.require_cipher(definition)?;
        let cutoff = self.cutoff();
        let mut tally = BatchTally::new(&self.ctx, &definition.key);
        if let Err(err) = self.clean(definition, request, cutoff, &mut tally) {
            tally.fail(&err);
        }
        let pending = self.ctx.records.count(&Self::pending_conditions(cutoff));
        Ok(tally.finish(pending))
    }
}
