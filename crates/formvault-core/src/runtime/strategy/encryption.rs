// crates/formvault-core/src/runtime/strategy/encryption.rs
// ============================================================================
// Module: Encryption Strategy
// Description: Writes ciphertext and keyed-hash shadows for sensitive fields.
// Purpose: Move sensitive columns to an encrypted-at-rest representation.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! A record is pending while any sensitive field has plaintext but no
//! ciphertext. Each field is encrypted independently, so one failing field
//! never blocks the others on the same record. Ciphertext and hash are
//! written only into empty columns.
//!
//! When a batch leaves nothing pending, the completion time is recorded
//! exactly once. That timestamp anchors both irreversible grace windows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::Column;
use crate::core::Condition;
use crate::core::FieldCipher;
use crate::core::MigrationStatus;
use crate::core::Record;
use crate::core::RecordOrder;
use crate::core::SENSITIVE_FIELDS;
use crate::core::SensitiveField;
use crate::interfaces::StoreError;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::ENCRYPTION_COMPLETED_AT_SETTING;
use crate::runtime::registry::MigrationDefinition;
use crate::runtime::strategy::BatchTally;
use crate::runtime::strategy::MigrationContext;
use crate::runtime::strategy::MigrationStrategy;
use crate::runtime::strategy::PendingScan;
use crate::runtime::strategy::candidate_window;

// ============================================================================
// SECTION: Predicates
// ============================================================================

/// Records with at least one sensitive field still unencrypted.
#[must_use]
pub fn encryption_pending() -> Condition {
    Condition::Any(
        SENSITIVE_FIELDS
            .iter()
            .map(|field| {
                Condition::All(vec![
                    Condition::Present(field.plaintext),
                    Condition::Empty(field.ciphertext),
                ])
            })
            .collect(),
    )
}

/// Canonical form of a sensitive value before keyed hashing.
///
/// Emails are trimmed and lowercased; numeric identifiers keep ASCII digits.
#[must_use]
pub fn hash_input(field: SensitiveField, value: &str) -> String {
    match field.plaintext {
        Column::Email => value.trim().to_lowercase(),
        _ => value.chars().filter(char::is_ascii_digit).collect(),
    }
}

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Sensitive field encryption.
pub struct EncryptionStrategy {
    /// Shared collaborators.
    ctx: MigrationContext,
}

impl EncryptionStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(ctx: MigrationContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Encrypts every pending field of one record.
    fn encrypt_record(
        &self,
        cipher: &FieldCipher,
        record: &Record,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        let mut values = Vec::new();
        for field in SENSITIVE_FIELDS {
            let Some(plaintext) = record.value(field.plaintext) else {
                continue;
            };
            if record.value(field.ciphertext).is_some() {
                continue;
            }
            let Some(ciphertext) = cipher.encrypt(plaintext) else {
                tally.skip(Some(record.id), format!("{} encryption failed", field.plaintext));
                continue;
            };
            values.push((field.ciphertext, ciphertext));
            values.push((field.hash, cipher.keyed_hash(&hash_input(field, plaintext))));
        }
        if !values.is_empty() && self.ctx.records.fill_empty(record.id, &values)? > 0 {
            tally.changed();
        }
        Ok(())
    }

    /// Encrypts up to `batch_size` records.
    fn encrypt_batch(
        &self,
        definition: &MigrationDefinition,
        cipher: &FieldCipher,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        let mut scan = PendingScan::new(
            self.ctx.records.as_ref(),
            vec![encryption_pending()],
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
                self.encrypt_record(cipher, record, tally)?;
            }
        }
        Ok(())
    }

    /// Records the completion time unless it is already set.
    fn mark_complete(&self, tally: &mut BatchTally<'_>) {
        let now = self.ctx.clock.now().as_unix_millis().to_string();
        match self.ctx.state.put_setting_once(ENCRYPTION_COMPLETED_AT_SETTING, &now) {
            Ok(true) => tally.note_change(None, "encryption completed"),
            Ok(false) => {}
            Err(err) => tally.skip(None, format!("completion timestamp not recorded: {err}")),
        }
    }
}

impl MigrationStrategy for EncryptionStrategy {
    fn calculate_status(
        &self,
        _definition: &MigrationDefinition,
    ) -> Result<MigrationStatus, MigrationError> {
        let total = self.ctx.records.count(&[])?;
        let pending = self.ctx.records.count(&[encryption_pending()])?;
        Ok(MigrationStatus::from_counts(total, pending))
    }

    fn can_run(&self, definition: &MigrationDefinition) -> Result<(), MigrationError> {
        self.ctx.require_cipher(definition)?;
        let shadows: Vec<Column> =
            SENSITIVE_FIELDS.iter().flat_map(|field| [field.ciphertext, field.hash]).collect();
        self.ctx.require_columns(definition, &shadows)
    }

    fn execute(
        &self,
        definition: &MigrationDefinition,
        _request: &BatchRequest,
    ) -> Result<BatchOutcome, MigrationError> {
        let cipher = self.ctx.require_cipher(definition)?;
        let mut tally = BatchTally::new(&self.ctx, &definition.key);
        if let Err(err) = self.encrypt_batch(definition, cipher, &mut tally) {
            tally.fail(&err);
        }
        let pending = self.ctx.records.count(&[encryption_pending()]);
        if matches!(pending, Ok(0)) {
            self.mark_complete(&mut tally);
        }
        Ok(tally.finish(pending))
    }
}
