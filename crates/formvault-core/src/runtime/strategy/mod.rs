// crates/formvault-core/src/runtime/strategy/mod.rs
// ============================================================================
// Module: Formvault Migration Strategies
// Description: Shared status/run/execute contract and batch bookkeeping.
// Purpose: Let heterogeneous migration kinds share one execution contract.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Every migration kind implements [`MigrationStrategy`]: a read-only status
//! computation, a side-effect-free precondition check, and one bounded
//! batch. Strategies never keep a cursor between batches; each batch scans
//! pending records from the head of the queue in keyset pages, and every
//! write is guarded by an emptiness or compare-and-set predicate so
//! overlapping invocations converge. Within a batch the scan pages past
//! records that keep failing, so they never hide later pending records.
//!
//! Per-record problems are journaled and skipped. A store failure stops the
//! batch and is reported through `success = false`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod capability;
pub mod cleanup;
pub mod encryption;
pub mod linking;
pub mod normalize;
pub mod promotion;
pub mod token;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

pub use capability::CapabilityGrantStrategy;
pub use cleanup::CleanupStrategy;
pub use encryption::EncryptionStrategy;
pub use linking::UserLinkingStrategy;
pub use normalize::NameNormalizationStrategy;
pub use promotion::FieldPromotionStrategy;
pub use token::TokenBackfillStrategy;

use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::Clock;
use crate::core::Column;
use crate::core::Condition;
use crate::core::FieldCipher;
use crate::core::LogKind;
use crate::core::MigrationStatus;
use crate::core::NewLogEntry;
use crate::core::Record;
use crate::core::RecordId;
use crate::core::RecordOrder;
use crate::core::RecordQuery;
use crate::interfaces::AccountStore;
use crate::interfaces::ActivitySink;
use crate::interfaces::MigrationStateStore;
use crate::interfaces::RecordStore;
use crate::interfaces::StoreError;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::MigrationDefinition;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Candidates read per scan page, as a multiple of the batch size.
pub const CANDIDATE_WINDOW_FACTOR: usize = 4;

/// Returns the number of candidates one scan page reads.
pub(crate) const fn candidate_window(batch_size: usize) -> usize {
    batch_size.saturating_mul(CANDIDATE_WINDOW_FACTOR)
}

// ============================================================================
// SECTION: Pending Scan
// ============================================================================

/// Keyset scan over pending records in a fixed order.
///
/// Each page resumes strictly after the last record of the previous one, so
/// records skipped earlier in the batch are not read again.
pub(crate) struct PendingScan<'a> {
    /// Submission table.
    records: &'a dyn RecordStore,
    /// Conditions selecting pending records.
    conditions: Vec<Condition>,
    /// Scan order.
    order: RecordOrder,
    /// Records per page.
    page_size: usize,
    /// Position after the last record read.
    cursor: Option<Condition>,
    /// Set once a short page proves nothing remains.
    exhausted: bool,
}

impl<'a> PendingScan<'a> {
    /// Starts a scan at the head of the queue.
    pub(crate) fn new(
        records: &'a dyn RecordStore,
        conditions: Vec<Condition>,
        order: RecordOrder,
        page_size: usize,
    ) -> Self {
        Self {
            records,
            conditions,
            order,
            page_size: page_size.max(1),
            cursor: None,
            exhausted: false,
        }
    }

    /// Reads the next page; an empty page ends the scan.
    pub(crate) fn next_page(&mut self) -> Result<Vec<Record>, StoreError> {
        if self.exhausted {
            return Ok(Vec::new());
        }
        let mut conditions = self.conditions.clone();
        conditions.extend(self.cursor.clone());
        let page = self.records.select(&RecordQuery {
            conditions,
            order: self.order,
            limit: Some(self.page_size),
        })?;
        match page.last() {
            Some(last) => self.cursor = Some(cursor_after(self.order, last)),
            None => self.exhausted = true,
        }
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        Ok(page)
    }
}

/// Condition selecting records that sort after `last` in `order`.
fn cursor_after(order: RecordOrder, last: &Record) -> Condition {
    match order {
        RecordOrder::IdAsc => Condition::IdAfter(last.id),
        RecordOrder::CreatedAsc => Condition::CreatedAfter(last.created_at, last.id),
    }
}

// ============================================================================
// SECTION: Strategy Contract
// ============================================================================

/// One migration kind.
pub trait MigrationStrategy: Send + Sync {
    /// Computes progress with read-only queries.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Store`] when a count fails.
    fn calculate_status(
        &self,
        definition: &MigrationDefinition,
    ) -> Result<MigrationStatus, MigrationError>;

    /// Validates preconditions without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::NotRunnable`] naming the missing precondition.
    fn can_run(&self, definition: &MigrationDefinition) -> Result<(), MigrationError>;

    /// Performs one bounded unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] only for precondition failures; store
    /// failures during the batch are reported in the outcome.
    fn execute(
        &self,
        definition: &MigrationDefinition,
        request: &BatchRequest,
    ) -> Result<BatchOutcome, MigrationError>;
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Collaborators shared by every strategy.
#[derive(Clone)]
pub struct MigrationContext {
    /// Submission table.
    pub records: Arc<dyn RecordStore>,
    /// Linked accounts.
    pub accounts: Arc<dyn AccountStore>,
    /// Settings and journal.
    pub state: Arc<dyn MigrationStateStore>,
    /// Field cipher, when secrets are configured.
    pub cipher: Option<Arc<FieldCipher>>,
    /// Time source for grace windows and journal entries.
    pub clock: Arc<dyn Clock>,
    /// Batch activity sink.
    pub activity: Arc<dyn ActivitySink>,
}

impl MigrationContext {
    /// Returns the cipher or a precondition failure.
    pub(crate) fn require_cipher(
        &self,
        definition: &MigrationDefinition,
    ) -> Result<&FieldCipher, MigrationError> {
        self.cipher.as_deref().ok_or_else(|| {
            not_runnable(definition, "field cipher is not configured (missing secret material)")
        })
    }

    /// Fails unless every column physically exists.
    pub(crate) fn require_columns(
        &self,
        definition: &MigrationDefinition,
        columns: &[Column],
    ) -> Result<(), MigrationError> {
        for column in columns {
            if !self.records.column_exists(*column)? {
                return Err(not_runnable(definition, &format!("required column {column} is missing")));
            }
        }
        Ok(())
    }
}

/// Builds a precondition failure for a migration.
pub(crate) fn not_runnable(definition: &MigrationDefinition, reason: &str) -> MigrationError {
    MigrationError::NotRunnable {
        key: definition.key.clone(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// SECTION: Batch Bookkeeping
// ============================================================================

/// Accumulates the result of one batch.
pub(crate) struct BatchTally<'a> {
    /// Shared collaborators.
    ctx: &'a MigrationContext,
    /// Migration key for journal entries.
    key: &'a str,
    /// Records changed.
    processed: u64,
    /// Per-record errors.
    errors: Vec<String>,
    /// Store failure that stopped the batch.
    failure: Option<String>,
}

impl<'a> BatchTally<'a> {
    /// Starts a tally for the migration.
    pub(crate) const fn new(ctx: &'a MigrationContext, key: &'a str) -> Self {
        Self {
            ctx,
            key,
            processed: 0,
            errors: Vec::new(),
            failure: None,
        }
    }

    /// Counts one changed record.
    pub(crate) const fn changed(&mut self) {
        self.processed += 1;
    }

    /// Returns true once the batch has changed `batch_size` records.
    pub(crate) const fn is_full(&self, batch_size: usize) -> bool {
        self.processed >= batch_size as u64
    }

    /// Counts several changed records.
    pub(crate) const fn changed_many(&mut self, count: u64) {
        self.processed += count;
    }

    /// Journals and collects a per-record error.
    pub(crate) fn skip(&mut self, record_id: Option<RecordId>, message: String) {
        self.journal(LogKind::Error, record_id, &message);
        let rendered = match record_id {
            Some(id) => format!("record {id}: {message}"),
            None => message,
        };
        self.errors.push(rendered);
    }

    /// Journals a change.
    pub(crate) fn note_change(&self, record_id: Option<RecordId>, message: &str) {
        self.journal(LogKind::Change, record_id, message);
    }

    /// Records the store failure that stopped the batch.
    pub(crate) fn fail(&mut self, err: &StoreError) {
        self.failure = Some(err.to_string());
    }

    /// Appends a journal entry; journal failures are collected, not raised.
    fn journal(&self, kind: LogKind, record_id: Option<RecordId>, message: &str) {
        let entry = NewLogEntry {
            migration_key: self.key.to_string(),
            kind,
            record_id,
            message: message.to_string(),
            created_at: self.ctx.clock.now(),
        };
        // The journal is advisory; a failed append never changes the outcome.
        let _ = self.ctx.state.append_log(&entry);
    }

    /// Builds the outcome from the post-batch pending count.
    pub(crate) fn finish(mut self, pending: Result<u64, StoreError>) -> BatchOutcome {
        let pending = match pending {
            Ok(pending) => Some(pending),
            Err(err) => {
                self.errors.push(format!("pending count failed: {err}"));
                None
            }
        };
        let has_more = pending.is_none_or(|pending| pending > 0);
        let message = match (&self.failure, pending) {
            (Some(failure), _) => format!("batch stopped after {} records: {failure}", self.processed),
            (None, Some(pending)) => {
                format!("processed {} records; {pending} pending", self.processed)
            }
            (None, None) => format!("processed {} records", self.processed),
        };
        if let Some(failure) = self.failure {
            self.errors.push(failure);
        }
        BatchOutcome {
            success: self.errors.is_empty(),
            processed: self.processed,
            has_more,
            message,
            errors: self.errors,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
