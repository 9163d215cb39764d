// crates/formvault-core/tests/common/mod.rs
// ============================================================================
// Module: Formvault Core Test Harness
// Description: Shared fixtures for migration integration tests.
// ============================================================================
//! ## Overview
//! Builds a facade over an in-memory store, a manual clock, and a recording
//! activity sink so tests can seed rows and advance time deterministically.

#![allow(
    dead_code,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Shared fixtures are used by a subset of test binaries."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use formvault_core::CipherSecrets;
use formvault_core::Column;
use formvault_core::FieldCipher;
use formvault_core::ManualClock;
use formvault_core::NewSubmission;
use formvault_core::Record;
use formvault_core::RecordId;
use formvault_core::Timestamp;
use formvault_core::core::cipher::MIN_PBKDF2_ITERATIONS;
use formvault_core::runtime::InMemoryStore;
use formvault_core::runtime::MigrationContext;
use formvault_core::runtime::MigrationFacade;
use formvault_core::runtime::MigrationRegistry;
use formvault_core::runtime::RecordingActivitySink;
use serde_json::Value;

/// Fixed "now" for every harness (2025-06-15T15:06:40Z).
pub const NOW_MS: i64 = 1_750_000_000_000;

pub struct Harness {
    pub store: InMemoryStore,
    pub clock: Arc<ManualClock>,
    pub activity: Arc<RecordingActivitySink>,
    pub cipher: Arc<FieldCipher>,
    pub facade: MigrationFacade,
}

pub fn secrets() -> CipherSecrets {
    CipherSecrets {
        key_material: vec!["auth-key-0123456789".to_string(), "secure-auth-key-abc".to_string()],
        hash_salt: "hash-salt-0123456789".to_string(),
        iterations: MIN_PBKDF2_ITERATIONS,
    }
}

pub fn harness() -> Harness {
    build(BTreeMap::new(), true)
}

pub fn harness_with_batch(key: &str, size: usize) -> Harness {
    let mut overrides = BTreeMap::new();
    overrides.insert(key.to_string(), size);
    build(overrides, true)
}

pub fn harness_without_cipher() -> Harness {
    build(BTreeMap::new(), false)
}

fn build(overrides: BTreeMap<String, usize>, with_cipher: bool) -> Harness {
    let store = InMemoryStore::new();
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(NOW_MS)));
    let activity = Arc::new(RecordingActivitySink::default());
    let cipher = Arc::new(FieldCipher::from_secrets(&secrets()).expect("cipher"));
    let registry = MigrationRegistry::with_batch_sizes(&overrides).expect("registry");
    let ctx = MigrationContext {
        records: Arc::new(store.clone()),
        accounts: Arc::new(store.clone()),
        state: Arc::new(store.clone()),
        cipher: with_cipher.then(|| Arc::clone(&cipher)),
        clock: clock.clone(),
        activity: activity.clone(),
    };
    Harness {
        store,
        clock,
        activity,
        cipher,
        facade: MigrationFacade::new(registry, ctx),
    }
}

impl Harness {
    /// Seeds a submission created `age_days` before now.
    pub fn seed(&self, blob: Option<Value>, age_days: i64, values: &[(Column, &str)]) -> RecordId {
        let now = Timestamp::from_unix_millis(NOW_MS);
        self.store
            .insert_submission(NewSubmission {
                form_id: 1,
                user_id: None,
                data: blob.map(|blob| blob.to_string()),
                created_at: now.minus_days(age_days),
                values: values
                    .iter()
                    .map(|(column, value)| (*column, (*value).to_string()))
                    .collect(),
            })
            .expect("seed submission")
    }

    pub fn record(&self, id: RecordId) -> Record {
        self.store.record(id).expect("read record").expect("record exists")
    }
}
