// crates/formvault-core/src/runtime/strategy/capability.rs
// ============================================================================
// Module: Capability Grant Strategy
// Description: Reconciles the submission-access capability with linked records.
// Purpose: Grant access to accounts with submissions and revoke it otherwise.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! An account is pending when holding [`VIEW_OWN_SUBMISSIONS`] disagrees
//! with having at least one linked submission. Each batch fixes up to
//! `batch_size` mismatched accounts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::MigrationStatus;
use crate::interfaces::StoreError;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::MigrationDefinition;
use crate::runtime::strategy::BatchTally;
use crate::runtime::strategy::MigrationContext;
use crate::runtime::strategy::MigrationStrategy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Capability that lets an account read its own submissions.
pub const VIEW_OWN_SUBMISSIONS: &str = "view_own_submissions";

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Capability reconciliation.
pub struct CapabilityGrantStrategy {
    /// Shared collaborators.
    ctx: MigrationContext,
}

impl CapabilityGrantStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(ctx: MigrationContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Grants or revokes on up to `batch_size` accounts.
    fn reconcile(
        &self,
        definition: &MigrationDefinition,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        let mismatches =
            self.ctx.accounts.capability_mismatches(VIEW_OWN_SUBMISSIONS, definition.batch_size)?;
        for mismatch in mismatches {
            let granted = mismatch.has_records;
            if self.ctx.accounts.set_capability(mismatch.account_id, VIEW_OWN_SUBMISSIONS, granted)? {
                tally.changed();
                let verb = if granted { "granted" } else { "revoked" };
                tally.note_change(
                    None,
                    &format!("{verb} {VIEW_OWN_SUBMISSIONS} for account {}", mismatch.account_id),
                );
            }
        }
        Ok(())
    }
}

impl MigrationStrategy for CapabilityGrantStrategy {
    fn calculate_status(
        &self,
        _definition: &MigrationDefinition,
    ) -> Result<MigrationStatus, MigrationError> {
        let total = self.ctx.accounts.count_accounts()?;
        let pending = self.ctx.accounts.count_capability_mismatches(VIEW_OWN_SUBMISSIONS)?;
        Ok(MigrationStatus::from_counts(total, pending))
    }

    fn can_run(&self, _definition: &MigrationDefinition) -> Result<(), MigrationError> {
        Ok(())
    }

    fn execute(
        &self,
        definition: &MigrationDefinition,
        _request: &BatchRequest,
    ) -> Result<BatchOutcome, MigrationError> {
        let mut tally = BatchTally::new(&self.ctx, &definition.key);
        if let Err(err) = self.reconcile(definition, &mut tally) {
            tally.fail(&err);
        }
        let pending = self.ctx.accounts.count_capability_mismatches(VIEW_OWN_SUBMISSIONS);
        Ok(tally.finish(pending))
    }
}
