// crates/formvault-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Conformance tests for the SQLite collaborator stores.
// Purpose: Ensure SQL-compiled conditions and writes match engine semantics.
// Dependencies: formvault-store-sqlite, formvault-core
// ============================================================================

//! ## Overview
//! Exercises schema versioning, condition compilation, guarded writes,
//! column removal, accounts, settings, and the journal against a real
//! database file, then drives the migration facade end to end.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use formvault_core::AccountStore;
use formvault_core::CipherSecrets;
use formvault_core::Column;
use formvault_core::Condition;
use formvault_core::FieldCipher;
use formvault_core::LogFilter;
use formvault_core::LogKind;
use formvault_core::ManualClock;
use formvault_core::MigrationStateStore;
use formvault_core::NewAccount;
use formvault_core::NewLogEntry;
use formvault_core::NewSubmission;
use formvault_core::NullifyScope;
use formvault_core::RecordId;
use formvault_core::RecordOrder;
use formvault_core::RecordQuery;
use formvault_core::RecordStore;
use formvault_core::SENSITIVE_FIELDS;
use formvault_core::StoreError;
use formvault_core::Timestamp;
use formvault_core::core::cipher::MIN_PBKDF2_ITERATIONS;
use formvault_core::runtime::DROP_CONFIRMATION;
use formvault_core::runtime::MigrationContext;
use formvault_core::runtime::MigrationFacade;
use formvault_core::runtime::MigrationRegistry;
use formvault_core::runtime::NULLIFY_CONFIRMATION;
use formvault_core::runtime::NoopActivitySink;
use formvault_store_sqlite::SqliteStore;
use formvault_store_sqlite::SqliteStoreConfig;
use formvault_store_sqlite::SqliteStoreError;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const NOW_MS: i64 = 1_750_000_000_000;

fn store_for(path: &Path) -> SqliteStore {
    SqliteStore::open(&SqliteStoreConfig::for_path(path)).expect("store init")
}

fn fixture() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().expect("tempdir");
    let store = store_for(&dir.path().join("formvault.db"));
    (dir, store)
}

fn seed(store: &SqliteStore, data: Option<&str>, age_days: i64, values: &[(Column, &str)]) -> RecordId {
    store
        .insert_submission(&NewSubmission {
            form_id: 7,
            user_id: None,
            data: data.map(str::to_string),
            created_at: Timestamp::from_unix_millis(NOW_MS).minus_days(age_days),
            values: values.iter().map(|(column, value)| (*column, (*value).to_string())).collect(),
        })
        .expect("seed")
}

fn secrets() -> CipherSecrets {
    CipherSecrets {
        key_material: vec!["auth-key-0123456789".to_string(), "secure-auth-key-abc".to_string()],
        hash_salt: "hash-salt-0123456789".to_string(),
        iterations: MIN_PBKDF2_ITERATIONS,
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

#[test]
fn sqlite_store_persists_across_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("formvault.db");
    let id = {
        let store = store_for(&path);
        seed(&store, None, 1, &[(Column::Email, "a@x.com")])
    };
    let store = store_for(&path);
    store.check_connection().unwrap();
    let record = store.record(id).unwrap().unwrap();
    assert_eq!(record.form_id, 7);
    assert_eq!(record.value(Column::Email), Some("a@x.com"));
}

#[test]
fn sqlite_store_rejects_version_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("formvault.db");
    drop(store_for(&path));
    {
        let connection = rusqlite::Connection::open(&path).unwrap();
        connection.execute("UPDATE store_meta SET version = 99", []).unwrap();
    }
    let err = SqliteStore::open(&SqliteStoreConfig::for_path(&path)).unwrap_err();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn sqlite_store_rejects_directory_path() {
    let dir = TempDir::new().unwrap();
    let err = SqliteStore::open(&SqliteStoreConfig::for_path(dir.path())).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn sqlite_store_rejects_overlong_path_component() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a".repeat(300));
    let err = SqliteStore::open(&SqliteStoreConfig::for_path(path)).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

#[test]
fn blob_condition_matches_engine_extraction() {
    let (_dir, store) = fixture();
    let keys = vec!["email", "e-mail"];
    let text = seed(&store, Some(r#"{"e-mail": " a@x.com "}"#), 1, &[]);
    let number = seed(&store, Some(r#"{"email": 42}"#), 1, &[]);
    seed(&store, Some(r#"{"email": "   "}"#), 1, &[]);
    seed(&store, Some(r#"{"email": ["a@x.com"]}"#), 1, &[]);
    seed(&store, Some(r#"["a@x.com"]"#), 1, &[]);
    seed(&store, Some("a:1:{s:5:\"email\";}"), 1, &[]);
    seed(&store, Some(""), 1, &[]);
    seed(&store, None, 1, &[]);

    let selected = store
        .select(&RecordQuery::page(vec![Condition::BlobHasValue(keys)], 100))
        .unwrap();
    let ids: Vec<RecordId> = selected.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![text, number]);
}

#[test]
fn empty_and_present_treat_empty_strings_as_empty() {
    let (_dir, store) = fixture();
    seed(&store, None, 1, &[(Column::Name, "")]);
    seed(&store, None, 1, &[(Column::Name, "Ana")]);
    seed(&store, None, 1, &[]);
    assert_eq!(store.count(&[Condition::Empty(Column::Name)]).unwrap(), 2);
    assert_eq!(store.count(&[Condition::Present(Column::Name)]).unwrap(), 1);
    assert_eq!(store.count(&[]).unwrap(), 3);
}

#[test]
fn nested_conditions_and_ordering() {
    let (_dir, store) = fixture();
    let newest = seed(&store, None, 1, &[(Column::Cpf, "1")]);
    let oldest = seed(&store, None, 30, &[(Column::CpfHash, "h")]);
    let middle = seed(&store, None, 10, &[(Column::Cpf, "2")]);
    seed(&store, None, 5, &[(Column::Name, "x")]);

    let query = RecordQuery {
        conditions: vec![
            Condition::Unlinked,
            Condition::Any(vec![Condition::Present(Column::CpfHash), Condition::Present(Column::Cpf)]),
        ],
        order: RecordOrder::CreatedAsc,
        limit: Some(2),
    };
    let ids: Vec<RecordId> = store.select(&query).unwrap().iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![oldest, middle]);

    let cutoff = Timestamp::from_unix_millis(NOW_MS).minus_days(7);
    let aged = store
        .count(&[
            Condition::CreatedBefore(cutoff),
            Condition::All(vec![Condition::IdAfter(oldest)]),
        ])
        .unwrap();
    assert_eq!(aged, 1);
    assert!(store.record(newest).unwrap().is_some());
}

#[test]
fn created_cursor_resumes_after_ties() {
    let (_dir, store) = fixture();
    let first = seed(&store, None, 5, &[(Column::Cpf, "1")]);
    let tied = seed(&store, None, 5, &[(Column::Cpf, "2")]);
    let newer = seed(&store, None, 1, &[(Column::Cpf, "3")]);
    let older = seed(&store, None, 9, &[(Column::Cpf, "4")]);

    let position = store.record(first).unwrap().unwrap().created_at;
    let query = RecordQuery {
        conditions: vec![Condition::CreatedAfter(position, first)],
        order: RecordOrder::CreatedAsc,
        limit: None,
    };
    let ids: Vec<RecordId> = store.select(&query).unwrap().iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![tied, newer]);
    assert!(!ids.contains(&older));
}

// ============================================================================
// SECTION: Writes
// ============================================================================

#[test]
fn fill_empty_and_replace_are_guarded() {
    let (_dir, store) = fixture();
    let id = seed(&store, None, 1, &[(Column::Email, "a@x.com"), (Column::Name, "")]);
    let changed = store
        .fill_empty(
            id,
            &[
                (Column::Email, "b@x.com".to_string()),
                (Column::Name, "Ana".to_string()),
                (Column::AccessToken, "tok".to_string()),
            ],
        )
        .unwrap();
    assert_eq!(changed, 2);
    assert!(!store.replace_value(id, Column::Name, "ana", "ANA").unwrap());
    assert!(store.replace_value(id, Column::Name, "Ana", "Ana Maria").unwrap());
    let record = store.record(id).unwrap().unwrap();
    assert_eq!(record.value(Column::Email), Some("a@x.com"));
    assert_eq!(record.value(Column::Name), Some("Ana Maria"));
    assert_eq!(record.value(Column::AccessToken), Some("tok"));
}

#[test]
fn nullify_respects_scope_and_ciphertext() {
    let (_dir, store) = fixture();
    let covered = seed(
        &store,
        None,
        1,
        &[(Column::Email, "a@x.com"), (Column::EmailEncrypted, "ct"), (Column::Phone, "119")],
    );
    let outside = seed(&store, None, 1, &[(Column::Cpf, "1"), (Column::CpfEncrypted, "ct")]);

    let changed = store
        .nullify_encrypted_plaintext(&NullifyScope::Records(vec![covered]), &SENSITIVE_FIELDS)
        .unwrap();
    assert_eq!(changed, 1);
    let record = store.record(covered).unwrap().unwrap();
    assert_eq!(record.value(Column::Email), None);
    assert_eq!(record.value(Column::Phone), Some("119"));
    assert_eq!(store.record(outside).unwrap().unwrap().value(Column::Cpf), Some("1"));

    let changed = store.nullify_encrypted_plaintext(&NullifyScope::All, &SENSITIVE_FIELDS).unwrap();
    assert_eq!(changed, 1);
    assert_eq!(store.record(outside).unwrap().unwrap().value(Column::Cpf), None);
}

#[test]
fn normalize_empty_strings_nulls_text_and_blob() {
    let (_dir, store) = fixture();
    let id = seed(&store, Some(""), 1, &[(Column::Email, ""), (Column::Name, "Ana")]);
    assert_eq!(store.normalize_empty_strings().unwrap(), 2);
    let record = store.record(id).unwrap().unwrap();
    assert!(!record.values.contains_key(&Column::Email));
    assert_eq!(record.data, None);
    assert_eq!(store.normalize_empty_strings().unwrap(), 0);
}

#[test]
fn dropped_columns_read_as_null_and_reject_writes() {
    let (_dir, store) = fixture();
    let id = seed(&store, None, 1, &[(Column::Email, "a@x.com"), (Column::EmailEncrypted, "ct")]);
    store.drop_column(Column::Email).unwrap();

    assert!(!store.column_exists(Column::Email).unwrap());
    let remaining = store.existing_columns().unwrap();
    assert!(!remaining.contains(&Column::Email));
    assert!(remaining.contains(&Column::Cpf));
    assert_eq!(remaining.len(), Column::ALL.len() - 1);

    assert_eq!(store.count(&[Condition::Present(Column::Email)]).unwrap(), 0);
    assert_eq!(store.count(&[Condition::Empty(Column::Email)]).unwrap(), 1);
    let record = store.record(id).unwrap().unwrap();
    assert!(!record.values.contains_key(&Column::Email));
    assert_eq!(record.value(Column::EmailEncrypted), Some("ct"));

    let err = store.fill_empty(id, &[(Column::Email, "b@x.com".to_string())]).unwrap_err();
    assert!(matches!(err, StoreError::Store(_)));
    assert!(store.drop_column(Column::Email).is_err());
    assert_eq!(
        store.nullify_encrypted_plaintext(&NullifyScope::All, &SENSITIVE_FIELDS).unwrap(),
        0
    );
}

// ============================================================================
// SECTION: Accounts
// ============================================================================

#[test]
fn accounts_match_email_case_insensitively() {
    let (_dir, store) = fixture();
    let created = store
        .create_account(&NewAccount {
            email: Some("Ana@X.com".to_string()),
            display_name: "Ana".to_string(),
            identifier_hash: None,
            created_at: Timestamp::from_unix_millis(NOW_MS),
        })
        .unwrap();
    assert_eq!(created.email.as_deref(), Some("ana@x.com"));
    assert_eq!(store.find_by_email("ANA@x.COM").unwrap().map(|account| account.id), Some(created.id));

    let duplicate = store.create_account(&NewAccount {
        email: Some("ana@X.COM".to_string()),
        display_name: "Other".to_string(),
        identifier_hash: None,
        created_at: Timestamp::from_unix_millis(NOW_MS),
    });
    assert!(matches!(duplicate, Err(StoreError::Invalid(_))));

    assert!(store.claim_identifier_hash(created.id, "hash-a").unwrap());
    assert!(!store.claim_identifier_hash(created.id, "hash-b").unwrap());
    let found = store.find_by_identifier_hash("hash-a").unwrap().unwrap();
    assert_eq!(found.id, created.id);
    assert_eq!(store.account(created.id).unwrap().unwrap().identifier_hash.as_deref(), Some("hash-a"));
}

#[test]
fn capability_mismatches_track_links() {
    let (_dir, store) = fixture();
    let owner = store
        .create_account(&NewAccount {
            email: None,
            display_name: "Owner".to_string(),
            identifier_hash: None,
            created_at: Timestamp::from_unix_millis(NOW_MS),
        })
        .unwrap();
    let id = seed(&store, None, 1, &[]);
    assert!(store.link_account(id, owner.id).unwrap());
    assert!(!store.link_account(id, owner.id).unwrap());

    assert_eq!(store.count_capability_mismatches("view").unwrap(), 1);
    let mismatches = store.capability_mismatches("view", 10).unwrap();
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].has_records);

    assert!(store.set_capability(owner.id, "view", true).unwrap());
    assert!(!store.set_capability(owner.id, "view", true).unwrap());
    assert!(store.has_capability(owner.id, "view").unwrap());
    assert_eq!(store.count_capability_mismatches("view").unwrap(), 0);
    assert_eq!(store.count_accounts().unwrap(), 1);
}

// ============================================================================
// SECTION: Settings and Journal
// ============================================================================

#[test]
fn settings_can_be_written_once() {
    let (_dir, store) = fixture();
    assert!(store.put_setting_once("encryption_completed_at", "1").unwrap());
    assert!(!store.put_setting_once("encryption_completed_at", "2").unwrap());
    assert_eq!(store.get_setting("encryption_completed_at").unwrap().as_deref(), Some("1"));
    store.put_setting("data_cleanup_completed", "1").unwrap();
    store.put_setting("data_cleanup_completed", "0").unwrap();
    assert_eq!(store.get_setting("data_cleanup_completed").unwrap().as_deref(), Some("0"));
    assert_eq!(store.get_setting("missing").unwrap(), None);
}

#[test]
fn logs_are_listed_newest_first_and_cleared_per_key() {
    let (_dir, store) = fixture();
    for (key, kind) in [("encryption", LogKind::Change), ("cleanup", LogKind::Error), ("encryption", LogKind::Error)] {
        store
            .append_log(&NewLogEntry {
                migration_key: key.to_string(),
                kind,
                record_id: Some(RecordId::new(1)),
                message: format!("{key} entry"),
                created_at: Timestamp::from_unix_millis(NOW_MS),
            })
            .unwrap();
    }
    let all = store.list_logs(&LogFilter::default()).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all[0].id > all[1].id);

    let errors = store
        .list_logs(&LogFilter {
            migration_key: Some("encryption".to_string()),
            kind: Some(LogKind::Error),
            limit: Some(5),
        })
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].record_id, Some(RecordId::new(1)));

    assert_eq!(store.clear_logs(Some("encryption")).unwrap(), 2);
    assert_eq!(store.list_logs(&LogFilter::default()).unwrap().len(), 1);
    assert_eq!(store.clear_logs(None).unwrap(), 1);
}

// ============================================================================
// SECTION: End to End
// ============================================================================

#[test]
fn facade_runs_the_full_lifecycle_on_sqlite() {
    let (_dir, store) = fixture();
    let id = seed(
        &store,
        Some(&json!({"email": "A@x.com", "cpf": "111.444.777-35", "nome": "MARIA DA SILVA"}).to_string()),
        1,
        &[],
    );
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(NOW_MS)));
    let cipher = Arc::new(FieldCipher::from_secrets(&secrets()).unwrap());
    let facade = MigrationFacade::new(MigrationRegistry::new(), MigrationContext {
        records: Arc::new(store.clone()),
        accounts: Arc::new(store.clone()),
        state: Arc::new(store.clone()),
        cipher: Some(Arc::clone(&cipher)),
        clock: clock.clone(),
        activity: Arc::new(NoopActivitySink),
    });

    for summary in facade.list_migrations() {
        if facade.can_run(&summary.key).is_ok() {
            facade.run_until_done(&summary.key, true).unwrap();
        }
    }
    let record = store.record(id).unwrap().unwrap();
    assert_eq!(record.value(Column::Email), Some("a@x.com"));
    assert_eq!(record.value(Column::Name), Some("Maria da Silva"));
    assert_eq!(record.value(Column::CpfHash), Some(cipher.keyed_hash("11144477735").as_str()));
    assert!(record.user_id.is_some());
    assert!(record.value(Column::AccessToken).is_some());

    clock.advance_days(30);
    facade.bulk_nullify(NULLIFY_CONFIRMATION).unwrap();
    let outcome = facade.drop_columns(DROP_CONFIRMATION).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.dropped, vec![Column::Email, Column::Cpf, Column::Phone]);
    assert!(facade.get_status("data_cleanup").unwrap().is_complete);
    assert!(facade.get_status("encryption").unwrap().is_complete);
    assert!(facade.get_status("field_email").unwrap().is_complete);
    let record = store.record(id).unwrap().unwrap();
    assert_eq!(cipher.decrypt(record.value(Column::EmailEncrypted).unwrap()).as_deref(), Some("a@x.com"));
}

#[test]
fn linking_pages_past_unreadable_rows_on_sqlite() {
    let (_dir, store) = fixture();
    for _ in 0 .. 5 {
        seed(
            &store,
            None,
            3,
            &[(Column::Cpf, "111.444.777-35"), (Column::EmailEncrypted, "garbage")],
        );
    }
    let good = seed(&store, None, 3, &[(Column::Cpf, "529.982.247-25"), (Column::Name, "Joana")]);

    let mut batch_sizes = BTreeMap::new();
    batch_sizes.insert("user_linking".to_string(), 1);
    let cipher = Arc::new(FieldCipher::from_secrets(&secrets()).unwrap());
    let registry = MigrationRegistry::with_batch_sizes(&batch_sizes).unwrap();
    let facade = MigrationFacade::new(registry, MigrationContext {
        records: Arc::new(store.clone()),
        accounts: Arc::new(store.clone()),
        state: Arc::new(store.clone()),
        cipher: Some(cipher),
        clock: Arc::new(ManualClock::new(Timestamp::from_unix_millis(NOW_MS))),
        activity: Arc::new(NoopActivitySink),
    });

    let summary = facade.run_until_done("user_linking", true).unwrap();
    assert_eq!(summary.processed, 1);
    assert!(summary.has_more);
    assert!(!summary.success);
    assert!(store.record(good).unwrap().unwrap().user_id.is_some());
    assert_eq!(facade.get_status("user_linking").unwrap().pending, 5);
}
