// crates/formvault-core/src/interfaces/mod.rs
// ============================================================================
// Module: Formvault Interfaces
// Description: Collaborator contracts for records, accounts, state, and activity.
// Purpose: Keep the migration engine independent of any storage backend.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Strategies reach the outside world only through these traits. Every
//! mutating method is scoped by a primary key or guarded by an emptiness
//! predicate so overlapping invocations converge instead of double-applying
//! work. Implementations must be safe to share across threads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::core::Account;
use crate::core::AccountId;
use crate::core::CapabilityMismatch;
use crate::core::Column;
use crate::core::Condition;
use crate::core::LogEntry;
use crate::core::LogFilter;
use crate::core::NewAccount;
use crate::core::NewLogEntry;
use crate::core::NullifyScope;
use crate::core::Record;
use crate::core::RecordId;
use crate::core::RecordQuery;
use crate::core::SensitiveField;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors reported by store collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Backend engine error (carries the native message).
    #[error("store error: {0}")]
    Store(String),
    /// Stored data failed integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Request or stored data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Record Store
// ============================================================================

/// Submission table access.
pub trait RecordStore: Send + Sync {
    /// Returns true when the column physically exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when schema introspection fails.
    fn column_exists(&self, column: Column) -> Result<bool, StoreError>;

    /// Counts records matching every condition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn count(&self, conditions: &[Condition]) -> Result<u64, StoreError>;

    /// Selects records matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn select(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError>;

    /// Writes each value only where its column is currently empty.
    ///
    /// Returns the number of columns changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn fill_empty(&self, id: RecordId, values: &[(Column, String)]) -> Result<usize, StoreError>;

    /// Replaces a column value only if it still equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn replace_value(
        &self,
        id: RecordId,
        column: Column,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, StoreError>;

    /// Links an unlinked record to an account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn link_account(&self, id: RecordId, account: AccountId) -> Result<bool, StoreError>;

    /// Forces every record carrying the identifier hash onto the account.
    ///
    /// Returns the number of records whose link changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn relink_by_identifier(
        &self,
        identifier_hash: &str,
        account: AccountId,
    ) -> Result<u64, StoreError>;

    /// Nulls each plaintext column whose ciphertext shadow is present, in a
    /// single statement over the scope.
    ///
    /// Returns the number of records changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn nullify_encrypted_plaintext(
        &self,
        scope: &NullifyScope,
        fields: &[SensitiveField],
    ) -> Result<u64, StoreError>;

    /// Rewrites every empty-string text value to null.
    ///
    /// Returns the number of column values changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn normalize_empty_strings(&self) -> Result<u64, StoreError>;

    /// Physically removes a column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the column cannot be dropped.
    fn drop_column(&self, column: Column) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Account Store
// ============================================================================

/// Linked-account access.
pub trait AccountStore: Send + Sync {
    /// Finds an account by identifier hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_by_identifier_hash(&self, identifier_hash: &str)
    -> Result<Option<Account>, StoreError>;

    /// Finds an account by contact address (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn create_account(&self, account: &NewAccount) -> Result<Account, StoreError>;

    /// Sets the identifier hash of an account that has none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn claim_identifier_hash(
        &self,
        account: AccountId,
        identifier_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Counts all accounts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn count_accounts(&self) -> Result<u64, StoreError>;

    /// Counts accounts whose capability disagrees with their linked records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn count_capability_mismatches(&self, capability: &str) -> Result<u64, StoreError>;

    /// Lists accounts whose capability disagrees with their linked records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn capability_mismatches(
        &self,
        capability: &str,
        limit: usize,
    ) -> Result<Vec<CapabilityMismatch>, StoreError>;

    /// Grants or revokes a capability.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn set_capability(
        &self,
        account: AccountId,
        capability: &str,
        granted: bool,
    ) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Migration State Store
// ============================================================================

/// Persisted migration markers and the operator journal.
pub trait MigrationStateStore: Send + Sync {
    /// Reads a setting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a setting, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Writes a setting only when it is not already set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_setting_once(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Appends a journal entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn append_log(&self, entry: &NewLogEntry) -> Result<(), StoreError>;

    /// Lists journal entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, StoreError>;

    /// Clears journal entries for one migration or all of them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn clear_logs(&self, migration_key: Option<&str>) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Activity Sink
// ============================================================================

/// Batch completion event delivered to activity sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event time.
    pub timestamp: Timestamp,
    /// Migration key.
    pub migration_key: String,
    /// Batch index within the operator session.
    pub batch_index: u32,
    /// Whether the batch succeeded.
    pub success: bool,
    /// Records changed.
    pub processed: u64,
    /// Whether work remains.
    pub has_more: bool,
    /// Number of errors collected.
    pub error_count: usize,
}

/// Fire-and-forget sink for migration activity.
///
/// Implementations must swallow their own failures; a sink can never fail a
/// migration batch.
pub trait ActivitySink: Send + Sync {
    /// Records an activity event.
    fn record(&self, event: &ActivityEvent);
}
