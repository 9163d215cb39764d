// crates/formvault-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for operators and tests.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example of `formvault.toml`. The output is deterministic and
//! must always pass [`crate::FormvaultConfig::from_toml`].

/// Returns a canonical example `formvault.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[store]
path = "formvault.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[cipher]
key_env = ["FORMVAULT_AUTH_KEY", "FORMVAULT_SECURE_AUTH_KEY"]
hash_salt_env = "FORMVAULT_HASH_SALT"
iterations = 100000

[migrations.batch_sizes]
encryption = 50
user_linking = 25

[activity]
sink = "file"
path = "formvault-activity.jsonl"
"#,
    )
}
