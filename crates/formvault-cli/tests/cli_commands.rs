// crates/formvault-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests for the formvault binary.
// Purpose: Ensure commands emit JSON on success and fail closed on errors.
// Dependencies: formvault binary, formvault-store-sqlite
// ============================================================================

//! ## Overview
//! Runs the compiled binary against a temporary database and config file,
//! with cipher secrets passed through the child environment only.

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

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use formvault_core::NewSubmission;
use formvault_core::Timestamp;
use formvault_store_sqlite::SqliteStore;
use formvault_store_sqlite::SqliteStoreConfig;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn formvault_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_formvault"))
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(extra: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let config = format!(
            "[store]\npath = \"{}\"\n\n[cipher]\niterations = 10000\n\n[activity]\nsink = \
             \"noop\"\n{extra}",
            dir.path().join("formvault.db").display()
        );
        fs::write(dir.path().join("formvault.toml"), config).expect("write config");
        Self {
            dir,
        }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("formvault.toml")
    }

    fn seed(&self, blob: &Value) {
        let store = SqliteStore::open(&SqliteStoreConfig::for_path(
            self.dir.path().join("formvault.db"),
        ))
        .expect("open store");
        store
            .insert_submission(&NewSubmission {
                form_id: 3,
                data: Some(blob.to_string()),
                created_at: Timestamp::from_unix_millis(1_700_000_000_000),
                ..NewSubmission::default()
            })
            .expect("seed");
    }

    fn run(&self, args: &[&str], with_secrets: bool) -> Output {
        let mut command = Command::new(formvault_bin());
        command
            .arg("--config")
            .arg(self.config_path())
            .args(args)
            .env_remove("FORMVAULT_CONFIG")
            .env_remove("FORMVAULT_AUTH_KEY")
            .env_remove("FORMVAULT_SECURE_AUTH_KEY")
            .env_remove("FORMVAULT_HASH_SALT");
        if with_secrets {
            command
                .env("FORMVAULT_AUTH_KEY", "auth-key-0123456789")
                .env("FORMVAULT_SECURE_AUTH_KEY", "secure-auth-key-abc")
                .env("FORMVAULT_HASH_SALT", "hash-salt-0123456789");
        }
        command.output().expect("run formvault")
    }
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn path_exists(path: &Path) -> bool {
    fs::metadata(path).is_ok()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn config_validate_reports_cipher_presence() {
    let workspace = Workspace::new("");
    let without = workspace.run(&["config", "validate"], false);
    assert!(without.status.success(), "stderr: {}", stderr_text(&without));
    assert_eq!(stdout_json(&without)["valid"], json!(true));
    assert_eq!(stdout_json(&without)["cipher_configured"], json!(false));

    let with = workspace.run(&["config", "validate"], true);
    assert_eq!(stdout_json(&with)["cipher_configured"], json!(true));
    assert!(!path_exists(&workspace.dir.path().join("formvault.db")));
}

#[test]
fn config_validate_fails_closed_on_bad_batch_size() {
    let workspace = Workspace::new("\n[migrations.batch_sizes]\nencryption = 0\n");
    let output = workspace.run(&["config", "validate"], false);
    assert!(!output.status.success());
    assert!(stderr_text(&output).contains("must be between"));
    assert!(output.stdout.is_empty());
}

#[test]
fn migrations_list_marks_cipher_dependent_entries_blocked() {
    let workspace = Workspace::new("");
    let output = workspace.run(&["migrations", "list"], false);
    assert!(output.status.success(), "stderr: {}", stderr_text(&output));
    let listings = stdout_json(&output);
    let entries = listings.as_array().expect("array");
    assert_eq!(entries.last().unwrap()["key"], json!("data_cleanup"));
    let encryption = entries.iter().find(|entry| entry["key"] == json!("encryption")).unwrap();
    assert!(encryption["blocked"].as_str().unwrap().contains("cipher"));
    let email = entries.iter().find(|entry| entry["key"] == json!("field_email")).unwrap();
    assert_eq!(email["blocked"], Value::Null);
}

#[test]
fn unknown_migration_fails() {
    let workspace = Workspace::new("");
    let output = workspace.run(&["migrations", "status", "field_fax"], false);
    assert!(!output.status.success());
    assert!(stderr_text(&output).contains("unknown migration"));
}

#[test]
fn promotion_and_encryption_run_to_completion() {
    let workspace = Workspace::new("");
    workspace.seed(&json!({"email": "Ana@X.com", "telefone": "(11) 98888-7777"}));
    workspace.seed(&json!({"nome": "joão de souza"}));

    let promoted =
        workspace.run(&["migrations", "run", "field_email", "--all", "--quiet-activity"], true);
    assert!(promoted.status.success(), "stderr: {}", stderr_text(&promoted));
    assert_eq!(stdout_json(&promoted)["processed"], json!(1));
    assert_eq!(stdout_json(&promoted)["has_more"], json!(false));

    let single = workspace.run(&["migrations", "run", "field_phone", "--batch-index", "0"], true);
    assert!(single.status.success(), "stderr: {}", stderr_text(&single));
    assert_eq!(stdout_json(&single)["processed"], json!(1));

    let encrypted = workspace.run(&["migrations", "run", "encryption", "--all"], true);
    assert!(encrypted.status.success(), "stderr: {}", stderr_text(&encrypted));
    let status = workspace.run(&["migrations", "status", "encryption"], true);
    assert_eq!(stdout_json(&status)["is_complete"], json!(true));

    let readiness = workspace.run(&["cleanup", "readiness"], true);
    let report = stdout_json(&readiness);
    assert_eq!(report["encryption_complete"], json!(true));
    assert_eq!(report["nullify_permitted"], json!(false));
    assert_eq!(report["elapsed_days"], json!(0));
}

#[test]
fn irreversible_commands_report_gate_codes() {
    let workspace = Workspace::new("");
    let unconfirmed = workspace.run(&["cleanup", "nullify"], true);
    assert!(!unconfirmed.status.success());
    assert!(stderr_text(&unconfirmed).contains("confirmation_required"));

    workspace.seed(&json!({"email": "a@x.com"}));
    workspace.run(&["migrations", "run", "field_email", "--all"], true);
    let incomplete =
        workspace.run(&["cleanup", "drop-columns", "--confirm", "DROP PLAINTEXT COLUMNS"], true);
    assert!(!incomplete.status.success());
    assert!(stderr_text(&incomplete).contains("encryption_incomplete"));

    workspace.run(&["migrations", "run", "encryption", "--all"], true);
    let early = workspace.run(&["cleanup", "nullify", "--confirm", "NULLIFY PLAINTEXT"], true);
    assert!(!early.status.success());
    assert!(stderr_text(&early).contains("grace_period_active"));
}

#[test]
fn logs_can_be_listed_and_cleared() {
    let workspace = Workspace::new("");
    workspace.seed(&json!({"email": "not-an-email"}));
    workspace.seed(&json!({"email": "ok@x.com"}));
    let run = workspace.run(&["migrations", "run", "field_email"], true);
    assert!(!run.status.success());
    assert_eq!(stdout_json(&run)["processed"], json!(1));

    let errors = workspace.run(&["logs", "list", "--kind", "error"], true);
    assert!(errors.status.success(), "stderr: {}", stderr_text(&errors));
    let entries = stdout_json(&errors);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["migration_key"], json!("field_email"));
    assert!(!entries[0]["message"].as_str().unwrap().contains("not-an-email"));

    let cleared = workspace.run(&["logs", "clear", "--migration", "field_email"], true);
    assert!(stdout_json(&cleared)["cleared"].as_u64().unwrap() >= 1);
    let remaining = workspace.run(&["logs", "list", "--migration", "field_email"], true);
    assert_eq!(stdout_json(&remaining), json!([]));
}
