// crates/formvault-core/src/runtime/store.rs
// ============================================================================
// Module: Formvault In-Memory Store
// Description: Record, account, and migration-state store backed by memory.
// Purpose: Deterministic collaborator for tests and embedded use.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! [`InMemoryStore`] implements every collaborator trait over one mutex-held
//! set of tables. Conditions are evaluated with the same semantics the
//! SQLite backend compiles to SQL, so strategies behave identically against
//! either store. Dropped columns disappear from every record and behave as
//! null in conditions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::Account;
use crate::core::AccountId;
use crate::core::CapabilityMismatch;
use crate::core::Column;
use crate::core::Condition;
use crate::core::LogEntry;
use crate::core::LogFilter;
use crate::core::NewAccount;
use crate::core::NewLogEntry;
use crate::core::NewSubmission;
use crate::core::NullifyScope;
use crate::core::Record;
use crate::core::RecordId;
use crate::core::RecordOrder;
use crate::core::RecordQuery;
use crate::core::SensitiveField;
use crate::core::extract::decode_blob;
use crate::core::extract::extract_first;
use crate::interfaces::AccountStore;
use crate::interfaces::MigrationStateStore;
use crate::interfaces::RecordStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Tables
// ============================================================================

/// Mutable table state guarded by the store mutex.
#[derive(Debug, Default)]
struct Tables {
    /// Submission rows keyed by identifier.
    records: BTreeMap<RecordId, Record>,
    /// Last assigned record identifier.
    last_record_id: i64,
    /// Account rows keyed by identifier.
    accounts: BTreeMap<AccountId, Account>,
    /// Last assigned account identifier.
    last_account_id: i64,
    /// Granted (account, capability) pairs.
    capabilities: BTreeSet<(AccountId, String)>,
    /// Migration settings.
    settings: BTreeMap<String, String>,
    /// Journal entries in insertion order.
    logs: Vec<LogEntry>,
    /// Last assigned journal identifier.
    last_log_id: i64,
    /// Physically removed columns.
    dropped: BTreeSet<Column>,
}

impl Tables {
    /// Returns an error when the column has been dropped.
    fn require_column(&self, column: Column) -> Result<(), StoreError> {
        if self.dropped.contains(&column) {
            return Err(StoreError::Store(format!("no such column: {column}")));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// In-memory store for tests and embedded hosts.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    /// Shared table state.
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the tables.
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Store("store mutex poisoned".to_string()))
    }

    /// Inserts a submission and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store lock is poisoned.
    pub fn insert_submission(&self, submission: NewSubmission) -> Result<RecordId, StoreError> {
        let mut tables = self.lock()?;
        tables.last_record_id += 1;
        let id = RecordId::new(tables.last_record_id);
        let mut values = submission.values;
        values.retain(|column, _| !tables.dropped.contains(column));
        tables.records.insert(
            id,
            Record {
                id,
                form_id: submission.form_id,
                user_id: submission.user_id,
                data: submission.data,
                created_at: submission.created_at,
                values,
            },
        );
        Ok(id)
    }

    /// Returns a record snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store lock is poisoned.
    pub fn record(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    /// Returns an account snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store lock is poisoned.
    pub fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    /// Returns true when the account holds the capability.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store lock is poisoned.
    pub fn has_capability(&self, id: AccountId, capability: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.capabilities.contains(&(id, capability.to_string())))
    }
}

// ============================================================================
// SECTION: Condition Evaluation
// ============================================================================

/// Evaluates a condition against one record.
fn matches(record: &Record, condition: &Condition) -> bool {
    match condition {
        Condition::Empty(column) => record.value(*column).is_none(),
        Condition::Present(column) => record.value(*column).is_some(),
        Condition::BlobHasValue(keys) => decode_blob(record.data.as_deref())
            .is_ok_and(|blob| extract_first(&blob, keys).is_some()),
        Condition::Unlinked => record.user_id.is_none(),
        Condition::CreatedBefore(cutoff) => record.created_at < *cutoff,
        Condition::IdAfter(id) => record.id > *id,
        Condition::CreatedAfter(created_at, id) => {
            (record.created_at, record.id) > (*created_at, *id)
        }
        Condition::Any(nested) => nested.iter().any(|inner| matches(record, inner)),
        Condition::All(nested) => nested.iter().all(|inner| matches(record, inner)),
    }
}

/// Evaluates every condition against one record.
fn matches_all(record: &Record, conditions: &[Condition]) -> bool {
    conditions.iter().all(|condition| matches(record, condition))
}

// ============================================================================
// SECTION: Record Store
// ============================================================================

impl RecordStore for InMemoryStore {
    fn column_exists(&self, column: Column) -> Result<bool, StoreError> {
        Ok(!self.lock()?.dropped.contains(&column))
    }

    fn count(&self, conditions: &[Condition]) -> Result<u64, StoreError> {
        let tables = self.lock()?;
        let count = tables.records.values().filter(|record| matches_all(record, conditions)).count();
        Ok(count as u64)
    }

    fn select(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        let tables = self.lock()?;
        let mut selected: Vec<Record> = tables
            .records
            .values()
            .filter(|record| matches_all(record, &query.conditions))
            .cloned()
            .collect();
        if query.order == RecordOrder::CreatedAsc {
            selected.sort_by_key(|record| (record.created_at, record.id));
        }
        if let Some(limit) = query.limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }

    fn fill_empty(&self, id: RecordId, values: &[(Column, String)]) -> Result<usize, StoreError> {
        let mut tables = self.lock()?;
        for (column, _) in values {
            tables.require_column(*column)?;
        }
        let Some(record) = tables.records.get_mut(&id) else {
            return Ok(0);
        };
        let mut changed = 0;
        for (column, value) in values {
            if record.value(*column).is_none() {
                record.values.insert(*column, value.clone());
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn replace_value(
        &self,
        id: RecordId,
        column: Column,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        tables.require_column(column)?;
        let Some(record) = tables.records.get_mut(&id) else {
            return Ok(false);
        };
        if record.values.get(&column).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        record.values.insert(column, replacement.to_string());
        Ok(true)
    }

    fn link_account(&self, id: RecordId, account: AccountId) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.records.get_mut(&id) {
            Some(record) if record.user_id.is_none() => {
                record.user_id = Some(account);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn relink_by_identifier(
        &self,
        identifier_hash: &str,
        account: AccountId,
    ) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        tables.require_column(Column::CpfHash)?;
        let mut changed = 0;
        for record in tables.records.values_mut() {
            if record.value(Column::CpfHash) == Some(identifier_hash)
                && record.user_id != Some(account)
            {
                record.user_id = Some(account);
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn nullify_encrypted_plaintext(
        &self,
        scope: &NullifyScope,
        fields: &[SensitiveField],
    ) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let fields: Vec<SensitiveField> = fields
            .iter()
            .copied()
            .filter(|field| {
                !tables.dropped.contains(&field.plaintext)
                    && !tables.dropped.contains(&field.ciphertext)
            })
            .collect();
        let in_scope = |id: &RecordId| match scope {
            NullifyScope::All => true,
            NullifyScope::Records(ids) => ids.contains(id),
        };
        let mut changed = 0;
        for (id, record) in &mut tables.records {
            if !in_scope(id) {
                continue;
            }
            let mut touched = false;
            for field in &fields {
                if record.value(field.ciphertext).is_some()
                    && record.value(field.plaintext).is_some()
                {
                    record.values.remove(&field.plaintext);
                    touched = true;
                }
            }
            if touched {
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn normalize_empty_strings(&self) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let mut changed = 0;
        for record in tables.records.values_mut() {
            let before = record.values.len();
            record.values.retain(|_, value| !value.is_empty());
            changed += (before - record.values.len()) as u64;
            if record.data.as_deref() == Some("") {
                record.data = None;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn drop_column(&self, column: Column) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.require_column(column)?;
        tables.dropped.insert(column);
        for record in tables.records.values_mut() {
            record.values.remove(&column);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Account Store
// ============================================================================

impl AccountStore for InMemoryStore {
    fn find_by_identifier_hash(
        &self,
        identifier_hash: &str,
    ) -> Result<Option<Account>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .accounts
            .values()
            .find(|account| account.identifier_hash.as_deref() == Some(identifier_hash))
            .cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let tables = self.lock()?;
        let needle = email.to_lowercase();
        Ok(tables
            .accounts
            .values()
            .find(|account| {
                account.email.as_deref().is_some_and(|stored| stored.to_lowercase() == needle)
            })
            .cloned())
    }

    fn create_account(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let mut tables = self.lock()?;
        if let Some(email) = account.email.as_deref() {
            let needle = email.to_lowercase();
            let taken = tables.accounts.values().any(|existing| {
                existing.email.as_deref().is_some_and(|stored| stored.to_lowercase() == needle)
            });
            if taken {
                return Err(StoreError::Invalid("account email already exists".to_string()));
            }
        }
        tables.last_account_id += 1;
        let created = Account {
            id: AccountId::new(tables.last_account_id),
            email: account.email.as_ref().map(|email| email.to_lowercase()),
            display_name: account.display_name.clone(),
            identifier_hash: account.identifier_hash.clone(),
            created_at: account.created_at,
        };
        tables.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    fn claim_identifier_hash(
        &self,
        account: AccountId,
        identifier_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.accounts.get_mut(&account) {
            Some(existing) if existing.identifier_hash.is_none() => {
                existing.identifier_hash = Some(identifier_hash.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn count_accounts(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.accounts.len() as u64)
    }

    fn count_capability_mismatches(&self, capability: &str) -> Result<u64, StoreError> {
        Ok(self.capability_mismatches(capability, usize::MAX)?.len() as u64)
    }

    fn capability_mismatches(
        &self,
        capability: &str,
        limit: usize,
    ) -> Result<Vec<CapabilityMismatch>, StoreError> {
        let tables = self.lock()?;
        let linked: BTreeSet<AccountId> =
            tables.records.values().filter_map(|record| record.user_id).collect();
        Ok(tables
            .accounts
            .keys()
            .filter_map(|id| {
                let has_records = linked.contains(id);
                let granted = tables.capabilities.contains(&(*id, capability.to_string()));
                (has_records != granted).then_some(CapabilityMismatch {
                    account_id: *id,
                    has_records,
                })
            })
            .take(limit)
            .collect())
    }

    fn set_capability(
        &self,
        account: AccountId,
        capability: &str,
        granted: bool,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        if !tables.accounts.contains_key(&account) {
            return Ok(false);
        }
        let entry = (account, capability.to_string());
        Ok(if granted { tables.capabilities.insert(entry) } else { tables.capabilities.remove(&entry) })
    }
}

// ============================================================================
// SECTION: Migration State Store
// ============================================================================

impl MigrationStateStore for InMemoryStore {
    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.settings.get(key).cloned())
    }

    fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn put_setting_once(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        if tables.settings.contains_key(key) {
            return Ok(false);
        }
        tables.settings.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    fn append_log(&self, entry: &NewLogEntry) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.last_log_id += 1;
        let id = tables.last_log_id;
        tables.logs.push(LogEntry {
            id,
            migration_key: entry.migration_key.clone(),
            kind: entry.kind,
            record_id: entry.record_id,
            message: entry.message.clone(),
            created_at: entry.created_at,
        });
        Ok(())
    }

    fn list_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .logs
            .iter()
            .rev()
            .filter(|entry| {
                filter.migration_key.as_deref().is_none_or(|key| entry.migration_key == key)
                    && filter.kind.is_none_or(|kind| entry.kind == kind)
            })
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn clear_logs(&self, migration_key: Option<&str>) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.logs.len();
        tables.logs.retain(|entry| migration_key.is_some_and(|key| entry.migration_key != key));
        Ok((before - tables.logs.len()) as u64)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
