//! Load and validation tests for formvault-config.
// crates/formvault-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate parsing, defaults, limits, and secret resolution.
// Purpose: Ensure configuration fails closed on every malformed input.
// =============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use formvault_config::ActivitySinkKind;
use formvault_config::CipherConfig;
use formvault_config::ConfigError;
use formvault_config::FormvaultConfig;
use formvault_config::config_toml_example;
use formvault_store_sqlite::SqliteStoreMode;
use formvault_store_sqlite::SqliteSyncMode;
use tempfile::TempDir;

mod common;

use common::TestResult;
use common::assert_invalid;

fn env_from(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(name, value)| ((*name).to_string(), (*value).to_string())).collect()
}

#[test]
fn empty_config_applies_defaults() -> TestResult {
    let config = FormvaultConfig::from_toml("").map_err(|err| err.to_string())?;
    if config.store.path != PathBuf::from("formvault.db") {
        return Err(format!("unexpected store path {}", config.store.path.display()));
    }
    if config.store.journal_mode != SqliteStoreMode::Wal
        || config.store.sync_mode != SqliteSyncMode::Full
    {
        return Err("unexpected pragma defaults".to_string());
    }
    if config.cipher.iterations != 100_000 || config.cipher.key_env.len() != 2 {
        return Err("unexpected cipher defaults".to_string());
    }
    if config.activity.sink != ActivitySinkKind::Stderr {
        return Err("unexpected activity default".to_string());
    }
    if config.migrations.registry().map_err(|err| err.to_string())?.get("encryption").is_none() {
        return Err("default catalog missing encryption".to_string());
    }
    Ok(())
}

#[test]
fn canonical_example_is_valid() -> TestResult {
    let config = FormvaultConfig::from_toml(&config_toml_example()).map_err(|err| err.to_string())?;
    let registry = config.migrations.registry().map_err(|err| err.to_string())?;
    match registry.get("encryption") {
        Some(definition) if definition.batch_size == 50 => Ok(()),
        Some(definition) => Err(format!("override not applied: {}", definition.batch_size)),
        None => Err("encryption missing from catalog".to_string()),
    }
}

#[test]
fn unknown_batch_key_is_rejected() -> TestResult {
    assert_invalid(
        FormvaultConfig::from_toml("[migrations.batch_sizes]\nfield_fax = 10\n"),
        "unknown migration key",
    )
}

#[test]
fn zero_batch_size_is_rejected() -> TestResult {
    assert_invalid(
        FormvaultConfig::from_toml("[migrations.batch_sizes]\nencryption = 0\n"),
        "must be between",
    )?;
    assert_invalid(
        FormvaultConfig::from_toml("[migrations.batch_sizes]\nencryption = 1001\n"),
        "must be between",
    )
}

#[test]
fn unknown_fields_fail_to_parse() -> TestResult {
    match FormvaultConfig::from_toml("[store]\npath = \"a.db\"\nwal = true\n") {
        Err(ConfigError::Parse(_)) => Ok(()),
        Err(other) => Err(format!("expected parse error, got {other}")),
        Ok(_) => Err("expected parse error".to_string()),
    }
}

#[test]
fn activity_path_must_match_sink() -> TestResult {
    assert_invalid(
        FormvaultConfig::from_toml("[activity]\nsink = \"file\"\n"),
        "file activity sink requires path",
    )?;
    assert_invalid(
        FormvaultConfig::from_toml("[activity]\nsink = \"noop\"\npath = \"events.jsonl\"\n"),
        "only valid for the file sink",
    )
}

#[test]
fn cipher_limits_are_enforced() -> TestResult {
    assert_invalid(FormvaultConfig::from_toml("[cipher]\niterations = 500\n"), "cipher.iterations")?;
    assert_invalid(
        FormvaultConfig::from_toml("[cipher]\nkey_env = []\n"),
        "cipher.key_env must not be empty",
    )?;
    assert_invalid(
        FormvaultConfig::from_toml(
            "[cipher]\nkey_env = [\"FV_KEY\"]\nhash_salt_env = \"FV_KEY\"\n",
        ),
        "must differ",
    )?;
    assert_invalid(
        FormvaultConfig::from_toml("[cipher]\nhash_salt_env = \"fv-salt\"\n"),
        "cipher.hash_salt_env",
    )
}

#[test]
fn store_limits_are_enforced() -> TestResult {
    assert_invalid(FormvaultConfig::from_toml("[store]\npath = \"  \"\n"), "store.path")?;
    let long = "a".repeat(300);
    assert_invalid(
        FormvaultConfig::from_toml(&format!("[store]\npath = \"{long}.db\"\n")),
        "path component too long",
    )?;
    assert_invalid(
        FormvaultConfig::from_toml("[store]\nbusy_timeout_ms = 999999999\n"),
        "busy_timeout_ms",
    )
}

#[test]
fn store_section_maps_to_sqlite_config() -> TestResult {
    let config = FormvaultConfig::from_toml(
        "[store]\npath = \"data/fv.db\"\njournal_mode = \"delete\"\nsync_mode = \"normal\"\n",
    )
    .map_err(|err| err.to_string())?;
    let sqlite = config.store.sqlite();
    if sqlite.path != PathBuf::from("data/fv.db")
        || sqlite.journal_mode != SqliteStoreMode::Delete
        || sqlite.sync_mode != SqliteSyncMode::Normal
        || sqlite.busy_timeout_ms != 5_000
    {
        return Err("store section not carried into sqlite config".to_string());
    }
    Ok(())
}

#[test]
fn load_reads_explicit_path() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("formvault.toml");
    fs::write(&path, config_toml_example()).map_err(|err| err.to_string())?;
    let config = FormvaultConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    if config.activity.path.as_deref() != Some("formvault-activity.jsonl") {
        return Err("activity path not loaded".to_string());
    }
    Ok(())
}

#[test]
fn load_rejects_missing_and_oversized_files() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    match FormvaultConfig::load(Some(&dir.path().join("absent.toml"))) {
        Err(ConfigError::Io(_)) => {}
        Err(other) => return Err(format!("expected io error, got {other}")),
        Ok(_) => return Err("expected io error".to_string()),
    }
    let path = dir.path().join("huge.toml");
    let padding = format!("# {}\n", "x".repeat(1024 * 1024));
    fs::write(&path, padding).map_err(|err| err.to_string())?;
    assert_invalid(FormvaultConfig::load(Some(&path)), "exceeds size limit")
}

#[test]
fn secrets_resolve_only_when_every_variable_is_set() -> TestResult {
    let cipher = CipherConfig::default();
    let partial = env_from(&[("FORMVAULT_AUTH_KEY", "auth-key-0123456789")]);
    let resolved = cipher
        .resolve_secrets_with(|name| Ok(partial.get(name).cloned()))
        .map_err(|err| err.to_string())?;
    if resolved.is_some() {
        return Err("partial environment must not yield secrets".to_string());
    }

    let full = env_from(&[
        ("FORMVAULT_AUTH_KEY", "auth-key-0123456789"),
        ("FORMVAULT_SECURE_AUTH_KEY", "secure-auth-key-abc"),
        ("FORMVAULT_HASH_SALT", "hash-salt-0123456789"),
    ]);
    let secrets = cipher
        .resolve_secrets_with(|name| Ok(full.get(name).cloned()))
        .map_err(|err| err.to_string())?
        .ok_or_else(|| "secrets missing".to_string())?;
    if secrets.key_material != ["auth-key-0123456789", "secure-auth-key-abc"]
        || secrets.hash_salt != "hash-salt-0123456789"
        || secrets.iterations != 100_000
    {
        return Err("secrets resolved in the wrong shape".to_string());
    }
    Ok(())
}

#[test]
fn secret_lookup_errors_propagate() -> TestResult {
    let cipher = CipherConfig::default();
    assert_invalid(
        cipher.resolve_secrets_with(|name| Err(ConfigError::Invalid(format!("{name} unreadable")))),
        "FORMVAULT_AUTH_KEY unreadable",
    )
}
