// crates/formvault-core/src/runtime/facade.rs
// ============================================================================
// Module: Formvault Migration Facade
// Description: Entry point for migrations and the irreversible cleanup steps.
// Purpose: Wrap the calculator and gate destructive operations.
// Dependencies: crate::{core, interfaces, runtime}, serde
// ============================================================================

//! ## Overview
//! [`MigrationFacade`] is the only surface callers use. Reversible work goes
//! straight to the [`StatusCalculator`]. The two irreversible operations are
//! gated, in order, by:
//!
//! 1. an exact confirmation literal,
//! 2. the encryption migration reporting 100%,
//! 3. a recorded encryption completion time at least the operation's grace
//!    window in the past (15 days to nullify, 30 days to drop columns).
//!
//! A refused operation has no partial effect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::Column;
use crate::core::LogEntry;
use crate::core::LogFilter;
use crate::core::LogKind;
use crate::core::MigrationStatus;
use crate::core::NewLogEntry;
use crate::core::NullifyScope;
use crate::core::SENSITIVE_FIELDS;
use crate::core::Timestamp;
use crate::interfaces::ActivityEvent;
use crate::interfaces::StoreError;
use crate::runtime::calculator::StatusCalculator;
use crate::runtime::error::IrreversibleError;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::CLEANUP_KEY;
use crate::runtime::registry::DATA_CLEANUP_COMPLETED_SETTING;
use crate::runtime::registry::DATA_CLEANUP_KEY;
use crate::runtime::registry::ENCRYPTION_COMPLETED_AT_SETTING;
use crate::runtime::registry::ENCRYPTION_KEY;
use crate::runtime::registry::MigrationRegistry;
use crate::runtime::registry::MigrationSummary;
use crate::runtime::strategy::MigrationContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Literal required by [`MigrationFacade::bulk_nullify`].
pub const NULLIFY_CONFIRMATION: &str = "NULLIFY PLAINTEXT";
/// Literal required by [`MigrationFacade::drop_columns`].
pub const DROP_CONFIRMATION: &str = "DROP PLAINTEXT COLUMNS";
/// Days after encryption completion before plaintext may be nulled.
pub const NULLIFY_GRACE_DAYS: i64 = 15;
/// Days after encryption completion before columns may be dropped.
pub const DROP_GRACE_DAYS: i64 = 30;
/// Upper bound on batches in one [`MigrationFacade::run_until_done`] call.
pub const MAX_RUN_BATCHES: u32 = 100_000;
/// Activity event for a bulk nullification.
pub const NULLIFY_EVENT: &str = "plaintext_nullified";
/// Activity event for a column drop.
pub const DROP_EVENT: &str = "columns_dropped";

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of a bulk nullification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NullifyOutcome {
    /// True when the statement completed.
    pub success: bool,
    /// Records changed.
    pub processed: u64,
}

/// Result of a column drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropOutcome {
    /// True when every present column was dropped.
    pub success: bool,
    /// Columns dropped by this call.
    pub dropped: Vec<Column>,
    /// Failures, one per column that could not be dropped.
    pub errors: Vec<String>,
}

/// Aggregate of a multi-batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Batches executed.
    pub batches: u32,
    /// Records changed across all batches.
    pub processed: u64,
    /// False when any batch reported errors.
    pub success: bool,
    /// True when work remained after the last batch.
    pub has_more: bool,
    /// Message of the last batch.
    pub message: String,
    /// Errors collected across all batches.
    pub errors: Vec<String>,
}

/// Preconditions of the irreversible operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReadiness {
    /// Encryption completion percentage.
    pub encryption_percent: f64,
    /// True when nothing is pending encryption.
    pub encryption_complete: bool,
    /// Recorded encryption completion time.
    pub completed_at: Option<Timestamp>,
    /// Whole days since completion.
    pub elapsed_days: Option<i64>,
    /// Grace window for nullification.
    pub nullify_grace_days: i64,
    /// Grace window for column removal.
    pub drop_grace_days: i64,
    /// True when [`MigrationFacade::bulk_nullify`] would pass its gates.
    pub nullify_permitted: bool,
    /// True when [`MigrationFacade::drop_columns`] would pass its gates.
    pub drop_permitted: bool,
}

// ============================================================================
// SECTION: Facade
// ============================================================================

/// Migration entry point.
pub struct MigrationFacade {
    /// Key dispatcher.
    calculator: StatusCalculator,
}

impl MigrationFacade {
    /// Builds the facade over a catalog and collaborators.
    #[must_use]
    pub fn new(registry: MigrationRegistry, ctx: MigrationContext) -> Self {
        Self {
            calculator: StatusCalculator::new(registry, ctx),
        }
    }

    /// Returns the catalog entries in order.
    #[must_use]
    pub fn list_migrations(&self) -> Vec<MigrationSummary> {
        self.calculator.registry().summaries()
    }

    /// Returns progress for a migration.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] for unknown keys or failed reads.
    pub fn get_status(&self, key: &str) -> Result<MigrationStatus, MigrationError> {
        self.calculator.calculate(key)
    }

    /// Validates preconditions for a migration.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::NotRunnable`] naming the failed precondition.
    pub fn can_run(&self, key: &str) -> Result<(), MigrationError> {
        self.calculator.can_run(key)
    }

    /// Runs one batch.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] when dispatch or preconditions fail.
    pub fn run(&self, key: &str, request: &BatchRequest) -> Result<BatchOutcome, MigrationError> {
        self.calculator.execute(key, request)
    }

    /// Runs batches until nothing is pending or a batch makes no progress.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] when dispatch or preconditions fail.
    pub fn run_until_done(
        &self,
        key: &str,
        suppress_activity: bool,
    ) -> Result<RunSummary, MigrationError> {
        let mut summary = RunSummary {
            batches: 0,
            processed: 0,
            success: true,
            has_more: true,
            message: String::new(),
            errors: Vec::new(),
        };
        while summary.has_more && summary.batches < MAX_RUN_BATCHES {
            let request = BatchRequest {
                batch_index: summary.batches,
                suppress_activity,
            };
            let outcome = self.calculator.execute(key, &request)?;
            summary.batches += 1;
            summary.processed += outcome.processed;
            summary.success &= outcome.success;
            summary.has_more = outcome.has_more;
            summary.message = outcome.message;
            summary.errors.extend(outcome.errors);
            if outcome.processed == 0 {
                break;
            }
        }
        Ok(summary)
    }

    /// Reports whether the irreversible operations would pass their gates.
    ///
    /// # Errors
    ///
    /// Returns [`IrreversibleError::Store`] when a read fails.
    pub fn readiness(&self) -> Result<CleanupReadiness, IrreversibleError> {
        let status = self.calculator.calculate(ENCRYPTION_KEY)?;
        let completed_at = self.completed_at()?;
        let now = self.calculator.context().clock.now();
        let elapsed_days = completed_at.map(|at| now.whole_days_since(at));
        let permitted = |grace: i64| {
            status.is_complete && elapsed_days.is_some_and(|elapsed| elapsed >= grace)
        };
        Ok(CleanupReadiness {
            encryption_percent: status.percent,
            encryption_complete: status.is_complete,
            completed_at,
            elapsed_days,
            nullify_grace_days: NULLIFY_GRACE_DAYS,
            drop_grace_days: DROP_GRACE_DAYS,
            nullify_permitted: permitted(NULLIFY_GRACE_DAYS),
            drop_permitted: permitted(DROP_GRACE_DAYS),
        })
    }

    /// Nulls every plaintext sensitive value whose ciphertext exists.
    ///
    /// # Errors
    ///
    /// Returns [`IrreversibleError`] when a gate refuses or the store fails.
    pub fn bulk_nullify(&self, confirmation: &str) -> Result<NullifyOutcome, IrreversibleError> {
        self.check_gates(confirmation, NULLIFY_CONFIRMATION, NULLIFY_GRACE_DAYS)?;
        let ctx = self.calculator.context();
        let processed =
            ctx.records.nullify_encrypted_plaintext(&NullifyScope::All, &SENSITIVE_FIELDS)?;
        self.journal(CLEANUP_KEY, &format!("bulk nullify changed {processed} records"));
        self.emit(NULLIFY_EVENT, CLEANUP_KEY, true, processed, 0);
        Ok(NullifyOutcome {
            success: true,
            processed,
        })
    }

    /// Drops every plaintext sensitive column, each independently.
    ///
    /// Columns already absent are skipped. When every drop succeeds the
    /// terminal marker is set.
    ///
    /// # Errors
    ///
    /// Returns [`IrreversibleError`] when a gate refuses.
    pub fn drop_columns(&self, confirmation: &str) -> Result<DropOutcome, IrreversibleError> {
        self.check_gates(confirmation, DROP_CONFIRMATION, DROP_GRACE_DAYS)?;
        let ctx = self.calculator.context();
        let mut dropped = Vec::new();
        let mut errors = Vec::new();
        for field in SENSITIVE_FIELDS {
            let column = field.plaintext;
            match ctx.records.column_exists(column) {
                Ok(false) => {}
                Ok(true) => match ctx.records.drop_column(column) {
                    Ok(()) => dropped.push(column),
                    Err(err) => errors.push(format!("{column}: {err}")),
                },
                Err(err) => errors.push(format!("{column}: {err}")),
            }
        }
        if errors.is_empty()
            && let Err(err) = ctx.state.put_setting(DATA_CLEANUP_COMPLETED_SETTING, "1")
        {
            errors.push(format!("completion flag not recorded: {err}"));
        }
        let names: Vec<&str> = dropped.iter().map(|column| column.as_str()).collect();
        self.journal(DATA_CLEANUP_KEY, &format!("dropped columns: [{}]", names.join(", ")));
        let success = errors.is_empty();
        self.emit(DROP_EVENT, DATA_CLEANUP_KEY, success, dropped.len() as u64, errors.len());
        Ok(DropOutcome {
            success,
            dropped,
            errors,
        })
    }

    /// Lists journal entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Store`] when the read fails.
    pub fn list_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, MigrationError> {
        Ok(self.calculator.context().state.list_logs(filter)?)
    }

    /// Clears journal entries for one migration or all of them.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Store`] when the delete fails.
    pub fn clear_logs(&self, migration_key: Option<&str>) -> Result<u64, MigrationError> {
        Ok(self.calculator.context().state.clear_logs(migration_key)?)
    }

    /// Reads the recorded encryption completion time.
    fn completed_at(&self) -> Result<Option<Timestamp>, StoreError> {
        let raw = self.calculator.context().state.get_setting(ENCRYPTION_COMPLETED_AT_SETTING)?;
        raw.map(|raw| {
            Timestamp::parse(&raw).ok_or_else(|| {
                StoreError::Corrupt(format!("{ENCRYPTION_COMPLETED_AT_SETTING} is not a timestamp"))
            })
        })
        .transpose()
    }

    /// Applies the confirmation, completeness, and grace gates.
    fn check_gates(
        &self,
        confirmation: &str,
        expected: &'static str,
        grace_days: i64,
    ) -> Result<(), IrreversibleError> {
        if confirmation != expected {
            return Err(IrreversibleError::ConfirmationRequired {
                expected,
            });
        }
        let status = self.calculator.calculate(ENCRYPTION_KEY)?;
        if !status.is_complete {
            return Err(IrreversibleError::EncryptionIncomplete {
                percent: status.percent,
            });
        }
        let now = self.calculator.context().clock.now();
        let completed_at = self.completed_at()?;
        let elapsed_days = completed_at.map_or(0, |at| now.whole_days_since(at));
        if completed_at.is_none() || elapsed_days < grace_days {
            return Err(IrreversibleError::GracePeriodActive {
                elapsed_days,
                required_days: grace_days,
            });
        }
        Ok(())
    }

    /// Appends a change entry to the journal; failures are ignored.
    fn journal(&self, key: &str, message: &str) {
        let ctx = self.calculator.context();
        let _ = ctx.state.append_log(&NewLogEntry {
            migration_key: key.to_string(),
            kind: LogKind::Change,
            record_id: None,
            message: message.to_string(),
            created_at: ctx.clock.now(),
        });
    }

    /// Notifies the activity sink of an irreversible operation.
    fn emit(&self, event: &'static str, key: &str, success: bool, processed: u64, errors: usize) {
        let ctx = self.calculator.context();
        ctx.activity.record(&ActivityEvent {
            event,
            timestamp: ctx.clock.now(),
            migration_key: key.to_string(),
            batch_index: 0,
            success,
            processed,
            has_more: false,
            error_count: errors,
        });
    }
}
