// crates/formvault-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Formvault Store
// Description: Record, account, and migration-state store backed by SQLite.
// Purpose: Persist submissions, accounts, settings, and the migration journal.
// Dependencies: formvault-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteStore`] keeps every table in one database file and serializes
//! access through a single mutex-held connection (the engine assumes a single
//! writer). Selection conditions are compiled to parameterized SQL; a
//! condition on a column that no longer exists compiles to the constant it
//! would yield for a null value, so strategies keep working after the
//! plaintext columns are dropped. Writes
//! that name a dropped column fail with the native "no such column" error.
//! Multi-statement writes run inside a transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use formvault_core::Account;
use formvault_core::AccountId;
use formvault_core::AccountStore;
use formvault_core::CapabilityMismatch;
use formvault_core::Column;
use formvault_core::Condition;
use formvault_core::LogEntry;
use formvault_core::LogFilter;
use formvault_core::LogKind;
use formvault_core::MigrationStateStore;
use formvault_core::NewAccount;
use formvault_core::NewLogEntry;
use formvault_core::NewSubmission;
use formvault_core::NullifyScope;
use formvault_core::Record;
use formvault_core::RecordId;
use formvault_core::RecordOrder;
use formvault_core::RecordQuery;
use formvault_core::RecordStore;
use formvault_core::SensitiveField;
use formvault_core::StoreError;
use formvault_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
pub const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Fixed leading columns of every submission read.
const RECORD_BASE_COLUMNS: &str = "id, form_id, user_id, data, created_at";
/// Number of fixed leading columns.
const RECORD_BASE_COLUMN_COUNT: usize = 5;
/// Account columns in read order.
const ACCOUNT_COLUMNS: &str = "id, email, display_name, identifier_hash, created_at";
/// Characters stripped when testing blob strings for emptiness.
const BLOB_TRIM_CHARS: &str = "char(32, 9, 10, 13)";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration with default pragmas for a path.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages never embed submission values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid request or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed store implementing every collaborator trait.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - The schema version is validated on open.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Shared connection.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the database
    /// cannot be opened, or its schema version is unsupported.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn check_connection(&self) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Returns the submission text columns that still exist, in schema order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when schema introspection fails.
    pub fn existing_columns(&self) -> Result<Vec<Column>, SqliteStoreError> {
        existing_columns(&*self.lock()?)
    }

    /// Inserts a submission and returns its identifier.
    ///
    /// Values for columns that no longer exist are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the insert fails.
    pub fn insert_submission(&self, submission: &NewSubmission) -> Result<RecordId, SqliteStoreError> {
        let guard = self.lock()?;
        let columns = existing_columns(&guard)?;
        let mut names = vec!["form_id", "user_id", "data", "created_at"];
        let mut values = vec![
            Value::Integer(submission.form_id),
            submission.user_id.map_or(Value::Null, |id| Value::Integer(id.get())),
            submission.data.clone().map_or(Value::Null, Value::Text),
            Value::Integer(submission.created_at.as_unix_millis()),
        ];
        for (column, value) in &submission.values {
            if columns.contains(column) {
                names.push(column.as_str());
                values.push(Value::Text(value.clone()));
            }
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO submissions ({}) VALUES ({placeholders})",
            names.join(", ")
        );
        guard.execute(&sql, params_from_iter(values.iter()))?;
        Ok(RecordId::new(guard.last_insert_rowid()))
    }

    /// Returns a record snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn record(&self, id: RecordId) -> Result<Option<Record>, SqliteStoreError> {
        let query = RecordQuery::page(
            vec![Condition::IdAfter(RecordId::new(id.get().saturating_sub(1)))],
            1,
        );
        let records = select_records(&*self.lock()?, &query)?;
        Ok(records.into_iter().find(|record| record.id == id))
    }

    /// Returns an account snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn account(&self, id: AccountId) -> Result<Option<Account>, SqliteStoreError> {
        let guard = self.lock()?;
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1");
        Ok(guard.query_row(&sql, params![id.get()], map_account).optional()?)
    }

    /// Returns true when the account holds the capability.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn has_capability(&self, id: AccountId, capability: &str) -> Result<bool, SqliteStoreError> {
        let guard = self.lock()?;
        Ok(guard.query_row(
            "SELECT EXISTS(SELECT 1 FROM account_capabilities WHERE account_id = ?1 AND \
             capability = ?2)",
            params![id.get(), capability],
            |row| row.get::<_, bool>(0),
        )?)
    }
}

// ============================================================================
// SECTION: Record Store
// ============================================================================

impl RecordStore for SqliteStore {
    fn column_exists(&self, column: Column) -> Result<bool, StoreError> {
        Ok(existing_columns(&*self.lock()?)?.contains(&column))
    }

    fn count(&self, conditions: &[Condition]) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        let columns = existing_columns(&guard)?;
        let mut values = Vec::new();
        let filter = compile_all(conditions, &columns, &mut values);
        let sql = format!("SELECT COUNT(*) FROM submissions WHERE {filter}");
        let count: i64 = guard
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
            .map_err(SqliteStoreError::from)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn select(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        Ok(select_records(&*self.lock()?, query)?)
    }

    fn fill_empty(&self, id: RecordId, values: &[(Column, String)]) -> Result<usize, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(SqliteStoreError::from)?;
        let mut changed = 0;
        for (column, value) in values {
            let name = column.as_str();
            let sql = format!(
                "UPDATE submissions SET {name} = ?1 WHERE id = ?2 AND ({name} IS NULL OR {name} = '')"
            );
            changed += tx.execute(&sql, params![value, id.get()]).map_err(SqliteStoreError::from)?;
        }
        tx.commit().map_err(SqliteStoreError::from)?;
        Ok(changed)
    }

    fn replace_value(
        &self,
        id: RecordId,
        column: Column,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        let name = column.as_str();
        let sql = format!("UPDATE submissions SET {name} = ?1 WHERE id = ?2 AND {name} = ?3");
        let changed = guard
            .execute(&sql, params![replacement, id.get(), expected])
            .map_err(SqliteStoreError::from)?;
        Ok(changed > 0)
    }

    fn link_account(&self, id: RecordId, account: AccountId) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE submissions SET user_id = ?1 WHERE id = ?2 AND user_id IS NULL",
                params![account.get(), id.get()],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(changed > 0)
    }

    fn relink_by_identifier(
        &self,
        identifier_hash: &str,
        account: AccountId,
    ) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE submissions SET user_id = ?1 WHERE cpf_hash = ?2 AND cpf_hash <> '' AND \
                 (user_id IS NULL OR user_id <> ?1)",
                params![account.get(), identifier_hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn nullify_encrypted_plaintext(
        &self,
        scope: &NullifyScope,
        fields: &[SensitiveField],
    ) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        let columns = existing_columns(&guard)?;
        let fields: Vec<SensitiveField> = fields
            .iter()
            .copied()
            .filter(|field| columns.contains(&field.plaintext) && columns.contains(&field.ciphertext))
            .collect();
        if fields.is_empty() {
            return Ok(0);
        }
        let mut values = Vec::new();
        let scope_sql = match scope {
            NullifyScope::All => "1".to_string(),
            NullifyScope::Records(ids) if ids.is_empty() => return Ok(0),
            NullifyScope::Records(ids) => {
                values.extend(ids.iter().map(|id| Value::Integer(id.get())));
                format!("id IN ({})", vec!["?"; ids.len()].join(", "))
            }
        };
        let assignments: Vec<String> = fields
            .iter()
            .map(|field| {
                let name = field.plaintext.as_str();
                format!("{name} = CASE WHEN {} THEN NULL ELSE {name} END", shadowed_sql(field))
            })
            .collect();
        let pending: Vec<String> = fields.iter().map(shadowed_sql).collect();
        let sql = format!(
            "UPDATE submissions SET {} WHERE {scope_sql} AND ({})",
            assignments.join(", "),
            pending.join(" OR ")
        );
        let changed =
            guard.execute(&sql, params_from_iter(values.iter())).map_err(SqliteStoreError::from)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn normalize_empty_strings(&self) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let columns = existing_columns(&guard)?;
        let tx = guard.transaction().map_err(SqliteStoreError::from)?;
        let mut changed = 0usize;
        for column in columns.iter().map(|column| column.as_str()).chain(["data"]) {
            let sql = format!("UPDATE submissions SET {column} = NULL WHERE {column} = ''");
            changed += tx.execute(&sql, []).map_err(SqliteStoreError::from)?;
        }
        tx.commit().map_err(SqliteStoreError::from)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn drop_column(&self, column: Column) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let sql = format!("ALTER TABLE submissions DROP COLUMN {}", column.as_str());
        guard.execute_batch(&sql).map_err(SqliteStoreError::from)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Account Store
// ============================================================================

impl AccountStore for SqliteStore {
    fn find_by_identifier_hash(
        &self,
        identifier_hash: &str,
    ) -> Result<Option<Account>, StoreError> {
        let guard = self.lock()?;
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE identifier_hash = ?1");
        Ok(guard
            .query_row(&sql, params![identifier_hash], map_account)
            .optional()
            .map_err(SqliteStoreError::from)?)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let guard = self.lock()?;
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(email) = ?1 ORDER BY id LIMIT 1"
        );
        Ok(guard
            .query_row(&sql, params![email.to_lowercase()], map_account)
            .optional()
            .map_err(SqliteStoreError::from)?)
    }

    fn create_account(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(SqliteStoreError::from)?;
        let email = account.email.as_ref().map(|email| email.to_lowercase());
        if let Some(email) = email.as_deref() {
            let taken: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM accounts WHERE lower(email) = ?1)",
                    params![email],
                    |row| row.get(0),
                )
                .map_err(SqliteStoreError::from)?;
            if taken {
                return Err(StoreError::Invalid("account email already exists".to_string()));
            }
        }
        tx.execute(
            "INSERT INTO accounts (email, display_name, identifier_hash, created_at) VALUES (?1, \
             ?2, ?3, ?4)",
            params![
                email,
                account.display_name,
                account.identifier_hash,
                account.created_at.as_unix_millis()
            ],
        )
        .map_err(SqliteStoreError::from)?;
        let id = AccountId::new(tx.last_insert_rowid());
        tx.commit().map_err(SqliteStoreError::from)?;
        Ok(Account {
            id,
            email,
            display_name: account.display_name.clone(),
            identifier_hash: account.identifier_hash.clone(),
            created_at: account.created_at,
        })
    }

    fn claim_identifier_hash(
        &self,
        account: AccountId,
        identifier_hash: &str,
    ) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        // The identifier column is unique; a hash already bound elsewhere
        // reports "not claimed" instead of a constraint failure.
        let changed = guard
            .execute(
                "UPDATE accounts SET identifier_hash = ?2 WHERE id = ?1 AND identifier_hash IS \
                 NULL AND NOT EXISTS (SELECT 1 FROM accounts WHERE identifier_hash = ?2)",
                params![account.get(), identifier_hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(changed > 0)
    }

    fn count_accounts(&self) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        let count: i64 = guard
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
            .map_err(SqliteStoreError::from)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn count_capability_mismatches(&self, capability: &str) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM ({})", capability_mismatch_sql());
        let count: i64 = guard
            .query_row(&sql, params![capability], |row| row.get(0))
            .map_err(SqliteStoreError::from)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn capability_mismatches(
        &self,
        capability: &str,
        limit: usize,
    ) -> Result<Vec<CapabilityMismatch>, StoreError> {
        let guard = self.lock()?;
        let sql = format!("{} ORDER BY id LIMIT ?2", capability_mismatch_sql());
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut statement = guard.prepare(&sql).map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map(params![capability, limit], |row| {
                Ok(CapabilityMismatch {
                    account_id: AccountId::new(row.get(0)?),
                    has_records: row.get(1)?,
                })
            })
            .map_err(SqliteStoreError::from)?;
        Ok(rows.collect::<Result<Vec<_>, _>>().map_err(SqliteStoreError::from)?)
    }

    fn set_capability(
        &self,
        account: AccountId,
        capability: &str,
        granted: bool,
    ) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        let sql = if granted {
            "INSERT OR IGNORE INTO account_capabilities (account_id, capability) SELECT ?1, ?2 \
             WHERE EXISTS (SELECT 1 FROM accounts WHERE id = ?1)"
        } else {
            "DELETE FROM account_capabilities WHERE account_id = ?1 AND capability = ?2"
        };
        let changed =
            guard.execute(sql, params![account.get(), capability]).map_err(SqliteStoreError::from)?;
        Ok(changed > 0)
    }
}

// ============================================================================
// SECTION: Migration State Store
// ============================================================================

impl MigrationStateStore for SqliteStore {
    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .query_row("SELECT value FROM migration_settings WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(SqliteStoreError::from)?)
    }

    fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO migration_settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO \
                 UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn put_setting_once(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "INSERT OR IGNORE INTO migration_settings (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(changed > 0)
    }

    fn append_log(&self, entry: &NewLogEntry) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO migration_log (migration_key, kind, record_id, message, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.migration_key,
                    entry.kind.as_str(),
                    entry.record_id.map(RecordId::get),
                    entry.message,
                    entry.created_at.as_unix_millis()
                ],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn list_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, StoreError> {
        let guard = self.lock()?;
        let mut clauses = vec!["1".to_string()];
        let mut values = Vec::new();
        if let Some(key) = &filter.migration_key {
            clauses.push("migration_key = ?".to_string());
            values.push(Value::Text(key.clone()));
        }
        if let Some(kind) = filter.kind {
            clauses.push("kind = ?".to_string());
            values.push(Value::Text(kind.as_str().to_string()));
        }
        let mut sql = format!(
            "SELECT id, migration_key, kind, record_id, message, created_at FROM migration_log \
             WHERE {} ORDER BY id DESC",
            clauses.join(" AND ")
        );
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }
        let mut statement = guard.prepare(&sql).map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(SqliteStoreError::from)?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, migration_key, kind, record_id, message, created_at) =
                row.map_err(SqliteStoreError::from)?;
            let kind = LogKind::parse(&kind).ok_or_else(|| {
                SqliteStoreError::Corrupt(format!("log entry {id} has unknown kind"))
            })?;
            entries.push(LogEntry {
                id,
                migration_key,
                kind,
                record_id: record_id.map(RecordId::new),
                message,
                created_at: Timestamp::from_unix_millis(created_at),
            });
        }
        Ok(entries)
    }

    fn clear_logs(&self, migration_key: Option<&str>) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        let changed = match migration_key {
            Some(key) => guard.execute("DELETE FROM migration_log WHERE migration_key = ?1", params![key]),
            None => guard.execute("DELETE FROM migration_log", []),
        }
        .map_err(SqliteStoreError::from)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }
}

// ============================================================================
// SECTION: Condition Compilation
// ============================================================================

/// SQL for "column is neither null nor empty".
fn present_sql(column: Column) -> String {
    let name = column.as_str();
    format!("({name} IS NOT NULL AND {name} <> '')")
}

/// SQL for "plaintext and ciphertext are both present".
fn shadowed_sql(field: &SensitiveField) -> String {
    format!("({} AND {})", present_sql(field.plaintext), present_sql(field.ciphertext))
}

/// Compiles conditions joined with AND.
fn compile_all(conditions: &[Condition], columns: &[Column], values: &mut Vec<Value>) -> String {
    if conditions.is_empty() {
        return "1".to_string();
    }
    let parts: Vec<String> =
        conditions.iter().map(|condition| compile(condition, columns, values)).collect();
    format!("({})", parts.join(" AND "))
}

/// Compiles one condition, appending its bound values in placeholder order.
fn compile(condition: &Condition, columns: &[Column], values: &mut Vec<Value>) -> String {
    match condition {
        Condition::Empty(column) if columns.contains(column) => {
            let name = column.as_str();
            format!("({name} IS NULL OR {name} = '')")
        }
        Condition::Empty(_) => "1".to_string(),
        Condition::Present(column) if columns.contains(column) => present_sql(*column),
        Condition::Present(_) => "0".to_string(),
        Condition::BlobHasValue(keys) => compile_blob_has_value(keys, values),
        Condition::Unlinked => "user_id IS NULL".to_string(),
        Condition::CreatedBefore(cutoff) => {
            values.push(Value::Integer(cutoff.as_unix_millis()));
            "created_at < ?".to_string()
        }
        Condition::IdAfter(id) => {
            values.push(Value::Integer(id.get()));
            "id > ?".to_string()
        }
        Condition::CreatedAfter(created_at, id) => {
            let millis = Value::Integer(created_at.as_unix_millis());
            values.extend([millis.clone(), millis, Value::Integer(id.get())]);
            "(created_at > ? OR (created_at = ? AND id > ?))".to_string()
        }
        Condition::Any(nested) if nested.is_empty() => "0".to_string(),
        Condition::Any(nested) => {
            let parts: Vec<String> =
                nested.iter().map(|inner| compile(inner, columns, values)).collect();
            format!("({})", parts.join(" OR "))
        }
        Condition::All(nested) => compile_all(nested, columns, values),
    }
}

/// Compiles the blob predicate.
///
/// `CASE` guarantees the JSON functions only see valid object text.
fn compile_blob_has_value(keys: &[&'static str], values: &mut Vec<Value>) -> String {
    if keys.is_empty() {
        return "0".to_string();
    }
    let mut checks = Vec::with_capacity(keys.len());
    for key in keys {
        let path = format!("$.\"{key}\"");
        checks.push(format!(
            "(json_type(data, ?) IN ('integer', 'real') OR (json_type(data, ?) = 'text' AND \
             trim(json_extract(data, ?), {BLOB_TRIM_CHARS}) <> ''))"
        ));
        values.extend([Value::Text(path.clone()), Value::Text(path.clone()), Value::Text(path)]);
    }
    format!(
        "(CASE WHEN data IS NULL OR NOT json_valid(data) THEN 0 WHEN json_type(data) <> 'object' \
         THEN 0 ELSE ({}) END)",
        checks.join(" OR ")
    )
}

/// SQL listing accounts whose capability disagrees with their linked records.
///
/// Binds the capability as `?1`.
const fn capability_mismatch_sql() -> &'static str {
    "SELECT id, has_records FROM (SELECT a.id AS id, EXISTS(SELECT 1 FROM submissions s WHERE \
     s.user_id = a.id) AS has_records, EXISTS(SELECT 1 FROM account_capabilities c WHERE \
     c.account_id = a.id AND c.capability = ?1) AS granted FROM accounts a) WHERE has_records <> \
     granted"
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Selects records for a query.
fn select_records(
    connection: &Connection,
    query: &RecordQuery,
) -> Result<Vec<Record>, SqliteStoreError> {
    let columns = existing_columns(connection)?;
    let mut values = Vec::new();
    let filter = compile_all(&query.conditions, &columns, &mut values);
    let order = match query.order {
        RecordOrder::IdAsc => "id ASC",
        RecordOrder::CreatedAsc => "created_at ASC, id ASC",
    };
    let projection: String =
        columns.iter().map(|column| format!(", {}", column.as_str())).collect();
    let mut sql = format!(
        "SELECT {RECORD_BASE_COLUMNS}{projection} FROM submissions WHERE {filter} ORDER BY {order}"
    );
    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map(params_from_iter(values.iter()), |row| {
        let mut record = Record {
            id: RecordId::new(row.get(0)?),
            form_id: row.get(1)?,
            user_id: row.get::<_, Option<i64>>(2)?.map(AccountId::new),
            data: row.get(3)?,
            created_at: Timestamp::from_unix_millis(row.get(4)?),
            values: BTreeMap::new(),
        };
        for (offset, column) in columns.iter().enumerate() {
            if let Some(value) = row.get::<_, Option<String>>(RECORD_BASE_COLUMN_COUNT + offset)? {
                record.values.insert(*column, value);
            }
        }
        Ok(record)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Maps an account row.
fn map_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: AccountId::new(row.get(0)?),
        email: row.get(1)?,
        display_name: row.get(2)?,
        identifier_hash: row.get(3)?,
        created_at: Timestamp::from_unix_millis(row.get(4)?),
    })
}

/// Returns the submission text columns that physically exist.
fn existing_columns(connection: &Connection) -> Result<Vec<Column>, SqliteStoreError> {
    let mut statement = connection.prepare("SELECT name FROM pragma_table_info('submissions')")?;
    let names = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Column::ALL.into_iter().filter(|column| names.iter().any(|name| name == column.as_str())).collect())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS submissions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    form_id INTEGER NOT NULL DEFAULT 0,
                    user_id INTEGER,
                    data TEXT,
                    created_at INTEGER NOT NULL,
                    email TEXT,
                    email_encrypted TEXT,
                    email_hash TEXT,
                    cpf TEXT,
                    cpf_encrypted TEXT,
                    cpf_hash TEXT,
                    phone TEXT,
                    phone_encrypted TEXT,
                    phone_hash TEXT,
                    name TEXT,
                    auth_code TEXT,
                    access_token TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_submissions_created
                    ON submissions (created_at, id);
                CREATE INDEX IF NOT EXISTS idx_submissions_user ON submissions (user_id);
                CREATE INDEX IF NOT EXISTS idx_submissions_cpf_hash ON submissions (cpf_hash);
                CREATE TABLE IF NOT EXISTS accounts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT UNIQUE,
                    display_name TEXT NOT NULL,
                    identifier_hash TEXT UNIQUE,
                    created_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS account_capabilities (
                    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                    capability TEXT NOT NULL,
                    PRIMARY KEY (account_id, capability)
                );
                CREATE TABLE IF NOT EXISTS migration_settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS migration_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    migration_key TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    record_id INTEGER,
                    message TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_migration_log_key
                    ON migration_log (migration_key, id);",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn dropped_columns_compile_to_constants() {
        let mut values = Vec::new();
        let columns = [Column::Name];
        assert_eq!(compile(&Condition::Present(Column::Email), &columns, &mut values), "0");
        assert_eq!(compile(&Condition::Empty(Column::Email), &columns, &mut values), "1");
        assert_eq!(compile(&Condition::Any(Vec::new()), &columns, &mut values), "0");
        assert_eq!(compile_all(&[], &columns, &mut values), "1");
        assert!(values.is_empty());
    }

    #[test]
    fn blob_predicate_binds_three_paths_per_key() {
        let mut values = Vec::new();
        let sql = compile_blob_has_value(&["email", "e-mail"], &mut values);
        assert_eq!(values.len(), 6);
        assert_eq!(sql.matches('?').count(), 6);
        assert_eq!(values[3], Value::Text("$.\"e-mail\"".to_string()));
    }

    #[test]
    fn placeholders_follow_value_order() {
        let mut values = Vec::new();
        let sql = compile_all(
            &[
                Condition::CreatedBefore(Timestamp::from_unix_millis(10)),
                Condition::IdAfter(RecordId::new(3)),
            ],
            &Column::ALL,
            &mut values,
        );
        assert_eq!(sql, "(created_at < ? AND id > ?)");
        assert_eq!(values, vec![Value::Integer(10), Value::Integer(3)]);
    }

    #[test]
    fn created_cursor_breaks_ties_by_id() {
        let mut values = Vec::new();
        let sql = compile(
            &Condition::CreatedAfter(Timestamp::from_unix_millis(20), RecordId::new(5)),
            &Column::ALL,
            &mut values,
        );
        assert_eq!(sql, "(created_at > ? OR (created_at = ? AND id > ?))");
        assert_eq!(values, vec![Value::Integer(20), Value::Integer(20), Value::Integer(5)]);
    }
}
