// crates/formvault-config/src/config.rs
// ============================================================================
// Module: Formvault Configuration
// Description: Configuration loading and validation for the migration engine.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: formvault-core, formvault-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Secrets never appear in the file: the `[cipher]` section names the
//! environment variables that hold them, and [`CipherConfig::resolve_secrets`]
//! reads those variables at startup. Missing or invalid configuration fails
//! closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use formvault_core::CipherSecrets;
use formvault_core::core::cipher::DEFAULT_PBKDF2_ITERATIONS;
use formvault_core::core::cipher::MIN_PBKDF2_ITERATIONS;
use formvault_core::runtime::MigrationRegistry;
use formvault_store_sqlite::SqliteStoreConfig;
use formvault_store_sqlite::SqliteStoreMode;
use formvault_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "formvault.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "FORMVAULT_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default database filename.
const DEFAULT_STORE_PATH: &str = "formvault.db";
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum busy timeout in milliseconds.
pub(crate) const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;
/// Maximum PBKDF2 iteration count.
pub(crate) const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;
/// Maximum number of key-material variables.
pub(crate) const MAX_KEY_ENV_VARS: usize = 8;
/// Maximum length of an environment variable name.
pub(crate) const MAX_ENV_NAME_LENGTH: usize = 128;
/// Default variables carrying key material.
const DEFAULT_KEY_ENV: [&str; 2] = ["FORMVAULT_AUTH_KEY", "FORMVAULT_SECURE_AUTH_KEY"];
/// Default variable carrying the hash salt.
const DEFAULT_HASH_SALT_ENV: &str = "FORMVAULT_HASH_SALT";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Formvault configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormvaultConfig {
    /// Database configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Cipher secret sources.
    #[serde(default)]
    pub cipher: CipherConfig,
    /// Migration tuning.
    #[serde(default)]
    pub migrations: MigrationsConfig,
    /// Activity sink selection.
    #[serde(default)]
    pub activity: ActivityConfig,
}

impl FormvaultConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order is the explicit path, then `FORMVAULT_CONFIG`, then
    /// `formvault.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.cipher.validate()?;
        self.migrations.validate()?;
        self.activity.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// `SQLite` database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("store.path", &self.path.to_string_lossy())?;
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "store.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Returns the `SQLite` store configuration.
    #[must_use]
    pub fn sqlite(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }
}

// ============================================================================
// SECTION: Cipher
// ============================================================================

/// Names of the environment variables holding cipher secrets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CipherConfig {
    /// Variables whose values are concatenated into the key material.
    #[serde(default = "default_key_env")]
    pub key_env: Vec<String>,
    /// Variable holding the hash salt.
    #[serde(default = "default_hash_salt_env")]
    pub hash_salt_env: String,
    /// PBKDF2 iteration count.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            key_env: default_key_env(),
            hash_salt_env: default_hash_salt_env(),
            iterations: default_iterations(),
        }
    }
}

impl CipherConfig {
    /// Validates cipher configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.key_env.is_empty() {
            return Err(ConfigError::Invalid("cipher.key_env must not be empty".to_string()));
        }
        if self.key_env.len() > MAX_KEY_ENV_VARS {
            return Err(ConfigError::Invalid(format!(
                "cipher.key_env accepts at most {MAX_KEY_ENV_VARS} variables"
            )));
        }
        for name in &self.key_env {
            validate_env_name("cipher.key_env", name)?;
        }
        validate_env_name("cipher.hash_salt_env", &self.hash_salt_env)?;
        if self.key_env.contains(&self.hash_salt_env) {
            return Err(ConfigError::Invalid(
                "cipher.hash_salt_env must differ from every key_env variable".to_string(),
            ));
        }
        if !(MIN_PBKDF2_ITERATIONS ..= MAX_PBKDF2_ITERATIONS).contains(&self.iterations) {
            return Err(ConfigError::Invalid(format!(
                "cipher.iterations must be between {MIN_PBKDF2_ITERATIONS} and \
                 {MAX_PBKDF2_ITERATIONS}"
            )));
        }
        Ok(())
    }

    /// Reads cipher secrets from the process environment.
    ///
    /// Returns `Ok(None)` when any named variable is unset, which leaves the
    /// engine without a cipher.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set but is not
    /// valid unicode.
    pub fn resolve_secrets(&self) -> Result<Option<CipherSecrets>, ConfigError> {
        self.resolve_secrets_with(|name| match env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => {
                Err(ConfigError::Invalid(format!("{name} must be valid unicode")))
            }
        })
    }

    /// Reads cipher secrets through a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the lookup fails.
    pub fn resolve_secrets_with<F>(&self, lookup: F) -> Result<Option<CipherSecrets>, ConfigError>
    where
        F: Fn(&str) -> Result<Option<String>, ConfigError>,
    {
        let mut key_material = Vec::with_capacity(self.key_env.len());
        for name in &self.key_env {
            match lookup(name)? {
                Some(value) => key_material.push(value),
                None => return Ok(None),
            }
        }
        let Some(hash_salt) = lookup(&self.hash_salt_env)? else {
            return Ok(None);
        };
        Ok(Some(CipherSecrets {
            key_material,
            hash_salt,
            iterations: self.iterations,
        }))
    }
}

// ============================================================================
// SECTION: Migrations
// ============================================================================

/// Migration tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Batch-size overrides keyed by migration key.
    #[serde(default)]
    pub batch_sizes: BTreeMap<String, usize>,
}

impl MigrationsConfig {
    /// Validates overrides against the catalog.
    fn validate(&self) -> Result<(), ConfigError> {
        self.registry().map(|_| ())
    }

    /// Builds the migration catalog with overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unknown keys or out-of-range
    /// sizes.
    pub fn registry(&self) -> Result<MigrationRegistry, ConfigError> {
        MigrationRegistry::with_batch_sizes(&self.batch_sizes)
            .map_err(|err| ConfigError::Invalid(format!("migrations.batch_sizes: {err}")))
    }
}

// ============================================================================
// SECTION: Activity
// ============================================================================

/// Activity sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    Noop,
}

/// Activity event configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: ActivitySinkKind,
    /// Output path for the file sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl ActivityConfig {
    /// Validates activity configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (ActivitySinkKind::File, Some(path)) => validate_path_string("activity.path", path),
            (ActivitySinkKind::File, None) => {
                Err(ConfigError::Invalid("file activity sink requires path".to_string()))
            }
            (_, Some(_)) => Err(ConfigError::Invalid(
                "activity.path is only valid for the file sink".to_string(),
            )),
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an environment variable name.
fn validate_env_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.len() > MAX_ENV_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "{field} names must be 1 to {MAX_ENV_NAME_LENGTH} characters"
        )));
    }
    let valid = name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return Err(ConfigError::Invalid(format!(
            "{field} names must use A-Z, 0-9 and _ and not start with a digit"
        )));
    }
    Ok(())
}

/// Default database path.
fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default key-material variables.
fn default_key_env() -> Vec<String> {
    DEFAULT_KEY_ENV.iter().map(|name| (*name).to_string()).collect()
}

/// Default hash-salt variable.
fn default_hash_salt_env() -> String {
    DEFAULT_HASH_SALT_ENV.to_string()
}

/// Default PBKDF2 iteration count.
const fn default_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

// ============================================================================
// SECTION: Tests
// ============================================================================
