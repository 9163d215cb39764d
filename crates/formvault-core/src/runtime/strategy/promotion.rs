// crates/formvault-core/src/runtime/strategy/promotion.rs
// ============================================================================
// Module: Field Promotion Strategy
// Description: Copies blob values into their dedicated columns.
// Purpose: Promote frequently queried fields without downtime.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! One instance serves every `field_<name>` key; the field definition comes
//! from the migration entry. A record is pending when its column is empty,
//! its ciphertext shadow (for sensitive fields) is empty, and the blob
//! carries a candidate value. Rows whose plaintext was already encrypted and
//! cleaned are therefore never re-promoted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::Condition;
use crate::core::MigrationStatus;
use crate::core::Record;
use crate::core::RecordOrder;
use crate::core::extract::decode_blob;
use crate::core::extract::extract_first;
use crate::interfaces::StoreError;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::FieldDefinition;
use crate::runtime::registry::MigrationDefinition;
use crate::runtime::registry::MigrationKind;
use crate::runtime::strategy::BatchTally;
use crate::runtime::strategy::MigrationContext;
use crate::runtime::strategy::MigrationStrategy;
use crate::runtime::strategy::PendingScan;
use crate::runtime::strategy::candidate_window;
use crate::runtime::strategy::not_runnable;

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Blob-to-column promotion shared by all field keys.
pub struct FieldPromotionStrategy {
    /// Shared collaborators.
    ctx: MigrationContext,
}

impl FieldPromotionStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(ctx: MigrationContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Resolves the field definition behind a migration entry.
    fn field(definition: &MigrationDefinition) -> Result<&'static FieldDefinition, MigrationError> {
        match definition.kind {
            MigrationKind::FieldPromotion(field) => Ok(field),
            _ => Err(not_runnable(definition, "not a field promotion migration")),
        }
    }

    /// Conditions selecting records that still need the field.
    fn pending_conditions(field: &FieldDefinition) -> Vec<Condition> {
        let mut conditions = vec![Condition::Empty(field.column)];
        if let Some(sensitive) = field.sensitive {
            conditions.push(Condition::Empty(sensitive.ciphertext));
        }
        conditions.push(Condition::BlobHasValue(field.candidate_keys.to_vec()));
        conditions
    }

    /// Promotes the field on one record, skipping unusable values.
    fn promote_record(
        &self,
        field: &FieldDefinition,
        record: &Record,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        let blob = match decode_blob(record.data.as_deref()) {
            Ok(blob) => blob,
            Err(err) => {
                tally.skip(Some(record.id), err.to_string());
                return Ok(());
            }
        };
        let Some(raw) = extract_first(&blob, field.candidate_keys) else {
            tally.skip(Some(record.id), format!("no candidate value for {}", field.name));
            return Ok(());
        };
        let value = match field.sanitizer.apply(&raw) {
            Ok(value) => value,
            Err(err) => {
                tally.skip(Some(record.id), format!("{}: {err}", field.name));
                return Ok(());
            }
        };
        if self.ctx.records.fill_empty(record.id, &[(field.column, value)])? > 0 {
            tally.changed();
        }
        Ok(())
    }

    /// Promotes the field on up to `batch_size` records.
    fn promote(
        &self,
        definition: &MigrationDefinition,
        field: &FieldDefinition,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        let mut scan = PendingScan::new(
            self.ctx.records.as_ref(),
            Self::pending_conditions(field),
            RecordOrder::IdAsc,
            candidate_window(definition.batch_size),
        );
        while !tally.is_full(definition.batch_size) {
            let page = scan.next_page()?;
            if page.is_empty() {
                break;
            }
            for record in &page {
                if tally.is_full(definition.batch_size) {
                    break;
                }
                self.promote_record(field, record, tally)?;
            }
        }
        Ok(())
    }
}

impl MigrationStrategy for FieldPromotionStrategy {
    fn calculate_status(
        &self,
        definition: &MigrationDefinition,
    ) -> Result<MigrationStatus, MigrationError> {
        let field = Self::field(definition)?;
        let total = self.ctx.records.count(&[])?;
        let pending = self.ctx.records.count(&Self::pending_conditions(field))?;
        Ok(MigrationStatus::from_counts(total, pending))
    }

    fn can_run(&self, definition: &MigrationDefinition) -> Result<(), MigrationError> {
        let field = Self::field(definition)?;
        self.ctx.require_columns(definition, &[field.column])
    }

    fn execute(
        &self,
        definition: &MigrationDefinition,
        _request: &BatchRequest,
    ) -> Result<BatchOutcome, MigrationError> {
        let field = Self::field(definition)?;
        let mut tally = BatchTally::new(&self.ctx, &definition.key);
        if let Err(err) = self.promote(definition, field, &mut tally) {
            tally.fail(&err);
        }
        let pending = self.ctx.records.count(&Self::pending_conditions(field));
        Ok(tally.finish(pending))
    }
}
