// crates/formvault-core/src/runtime/strategy/token.rs
// ============================================================================
// Module: Token Backfill Strategy
// Description: Assigns random access tokens to submissions lacking one.
// Purpose: Backfill a derived per-record secret.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! Each token is 32 random bytes rendered as lowercase hex. Writes only land
//! on empty columns, so an existing token is never replaced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::Column;
use crate::core::Condition;
use crate::core::MigrationStatus;
use crate::core::RecordQuery;
use crate::core::cipher::random_hex;
use crate::interfaces::StoreError;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::MigrationDefinition;
use crate::runtime::strategy::BatchTally;
use crate::runtime::strategy::MigrationContext;
use crate::runtime::strategy::MigrationStrategy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Random bytes per access token.
pub const ACCESS_TOKEN_BYTES: usize = 32;

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Access token backfill.
pub struct TokenBackfillStrategy {
    /// Shared collaborators.
    ctx: MigrationContext,
}

impl TokenBackfillStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(ctx: MigrationContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Writes tokens on up to `batch_size` records.
    fn backfill(
        &self,
        definition: &MigrationDefinition,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        let query = RecordQuery::page(
            vec![Condition::Empty(Column::AccessToken)],
            definition.batch_size,
        );
        for record in self.ctx.records.select(&query)? {
            let token = random_hex(ACCESS_TOKEN_BYTES);
            if self.ctx.records.fill_empty(record.id, &[(Column::AccessToken, token)])? > 0 {
                tally.changed();
            }
        }
        Ok(())
    }
}

impl MigrationStrategy for TokenBackfillStrategy {
    fn calculate_status(
        &self,
        _definition: &MigrationDefinition,
    ) -> Result<MigrationStatus, MigrationError> {
        let total = self.ctx.records.count(&[])?;
        let pending = self.ctx.records.count(&[Condition::Empty(Column::AccessToken)])?;
        Ok(MigrationStatus::from_counts(total, pending))
    }

    fn can_run(&self, definition: &MigrationDefinition) -> Result<(), MigrationError> {
        self.ctx.require_columns(definition, &[Column::AccessToken])
    }

    fn execute(
        &self,
        definition: &MigrationDefinition,
        _request: &BatchRequest,
    ) -> Result<BatchOutcome, MigrationError> {
        let mut tally = BatchTally::new(&self.ctx, &definition.key);
        if let Err(err) = self.backfill(definition, &mut tally) {
            tally.fail(&err);
        }
        let pending = self.ctx.records.count(&[Condition::Empty(Column::AccessToken)]);
        Ok(tally.finish(pending))
    }
}
