// crates/formvault-core/src/runtime/registry.rs
// ============================================================================
// Module: Formvault Migration Registry
// Description: Static catalog of promotable fields and named migrations.
// Purpose: Map migration keys to metadata, target columns, and batch sizes.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Two catalogs live here. [`FIELD_DEFINITIONS`] lists the blob fields that
//! can be promoted into columns, each with its candidate blob keys and
//! sanitizer. [`MigrationRegistry`] lists every migration: one `field_<name>`
//! entry per field definition plus the fixed special entries, ending with
//! the terminal `data_cleanup` marker.
//!
//! Adding a field definition adds its promotion migration; no dispatch code
//! changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::core::CPF_FIELD;
use crate::core::Column;
use crate::core::EMAIL_FIELD;
use crate::core::PHONE_FIELD;
use crate::core::Sanitizer;
use crate::core::SensitiveField;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix shared by every field promotion key.
pub const FIELD_KEY_PREFIX: &str = "field_";
/// Token backfill migration key.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Encryption migration key.
pub const ENCRYPTION_KEY: &str = "encryption";
/// Grace-gated plaintext cleanup key.
pub const CLEANUP_KEY: &str = "cleanup";
/// Cross-entity linking key.
pub const USER_LINKING_KEY: &str = "user_linking";
/// Name capitalization key.
pub const NAME_NORMALIZATION_KEY: &str = "name_normalization";
/// Capability grant key.
pub const CAPABILITY_GRANT_KEY: &str = "capability_grant";
/// Terminal marker key.
pub const DATA_CLEANUP_KEY: &str = "data_cleanup";
/// Setting holding the encryption completion time (unix ms, written once).
pub const ENCRYPTION_COMPLETED_AT_SETTING: &str = "encryption_completed_at";
/// Setting set to `"1"` once the plaintext columns are dropped.
pub const DATA_CLEANUP_COMPLETED_SETTING: &str = "data_cleanup_completed";
/// Smallest accepted batch size.
pub const MIN_BATCH_SIZE: usize = 1;
/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: usize = 1000;

// ============================================================================
// SECTION: Field Definitions
// ============================================================================

/// A blob field eligible for promotion into its own column.
#[derive(Debug, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Field name; the promotion key is `field_<name>`.
    pub name: &'static str,
    /// Display label.
    pub label: &'static str,
    /// Operator-facing description.
    pub description: &'static str,
    /// Destination column.
    pub column: Column,
    /// Shadow columns when the field is sensitive.
    pub sensitive: Option<SensitiveField>,
    /// Blob keys checked in order.
    pub candidate_keys: &'static [&'static str],
    /// Normalization applied before writing.
    pub sanitizer: Sanitizer,
}

impl FieldDefinition {
    /// Returns the promotion migration key.
    #[must_use]
    pub fn migration_key(&self) -> String {
        format!("{FIELD_KEY_PREFIX}{}", self.name)
    }
}

/// Promotable fields in promotion order.
pub static FIELD_DEFINITIONS: [FieldDefinition; 5] = [
    FieldDefinition {
        name: "email",
        label: "Email",
        description: "Copies the contact email out of the submission blob.",
        column: Column::Email,
        sensitive: Some(EMAIL_FIELD),
        candidate_keys: &["email", "e-mail", "your-email", "user_email", "email_address"],
        sanitizer: Sanitizer::Email,
    },
    FieldDefinition {
        name: "cpf",
        label: "CPF",
        description: "Copies the national identifier out of the submission blob.",
        column: Column::Cpf,
        sensitive: Some(CPF_FIELD),
        candidate_keys: &["cpf", "documento", "cpf_cnpj", "your-cpf"],
        sanitizer: Sanitizer::Digits {
            exact_len: Some(11),
        },
    },
    FieldDefinition {
        name: "phone",
        label: "Phone",
        description: "Copies the phone number out of the submission blob.",
        column: Column::Phone,
        sensitive: Some(PHONE_FIELD),
        candidate_keys: &["phone", "telefone", "celular", "whatsapp", "your-phone"],
        sanitizer: Sanitizer::Digits {
            exact_len: None,
        },
    },
    FieldDefinition {
        name: "name",
        label: "Name",
        description: "Copies the submitter name out of the submission blob.",
        column: Column::Name,
        sensitive: None,
        candidate_keys: &["name", "nome", "nome_completo", "full_name", "your-name"],
        sanitizer: Sanitizer::Text,
    },
    FieldDefinition {
        name: "auth_code",
        label: "Verification code",
        description: "Copies the verification code out of the submission blob.",
        column: Column::AuthCode,
        sensitive: None,
        candidate_keys: &["auth_code", "codigo", "verification_code", "codigo_autenticacao"],
        sanitizer: Sanitizer::Code,
    },
];

/// Looks up a field definition by name.
#[must_use]
pub fn field_definition(name: &str) -> Option<&'static FieldDefinition> {
    FIELD_DEFINITIONS.iter().find(|field| field.name == name)
}

// ============================================================================
// SECTION: Migration Definitions
// ============================================================================

/// Strategy family a migration dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    /// Blob-to-column promotion of one field.
    FieldPromotion(&'static FieldDefinition),
    /// Random access token backfill.
    TokenBackfill,
    /// Sensitive column encryption.
    Encryption,
    /// Grace-gated plaintext nulling.
    Cleanup,
    /// Cross-entity account linking.
    UserLinking,
    /// Name capitalization.
    NameNormalization,
    /// Capability grant reconciliation.
    CapabilityGrant,
    /// Terminal flag set by the column drop.
    DataCleanup,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDefinition {
    /// Stable migration key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Operator-facing description.
    pub description: String,
    /// Column the migration writes, when it writes exactly one.
    pub target_column: Option<Column>,
    /// Records processed per batch.
    pub batch_size: usize,
    /// Relative ordering; lower runs first.
    pub order: u32,
    /// Strategy family.
    pub kind: MigrationKind,
}

/// Listing entry returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    /// Stable migration key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Operator-facing description.
    pub description: String,
    /// Relative ordering.
    pub order: u32,
}

impl From<&MigrationDefinition> for MigrationSummary {
    fn from(definition: &MigrationDefinition) -> Self {
        Self {
            key: definition.key.clone(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            order: definition.order,
        }
    }
}

/// Builds a special (non-field) catalog entry.
fn special(
    key: &str,
    name: &str,
    description: &str,
    target_column: Option<Column>,
    batch_size: usize,
    order: u32,
    kind: MigrationKind,
) -> MigrationDefinition {
    MigrationDefinition {
        key: key.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        target_column,
        batch_size,
        order,
        kind,
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry construction errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An override names a key the catalog does not contain.
    #[error("unknown migration key in batch size overrides: {0}")]
    UnknownKey(String),
    /// An override is outside the accepted range.
    #[error("batch size for {key} must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}, got {size}")]
    InvalidBatchSize {
        /// Migration key.
        key: String,
        /// Rejected size.
        size: usize,
    },
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Read-only migration catalog sorted by order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRegistry {
    /// Entries sorted by ascending order.
    migrations: Vec<MigrationDefinition>,
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRegistry {
    /// Builds the catalog with default batch sizes.
    #[must_use]
    pub fn new() -> Self {
        let mut migrations: Vec<MigrationDefinition> = FIELD_DEFINITIONS
            .iter()
            .zip(1_u32..)
            .map(|(field, position)| MigrationDefinition {
                key: field.migration_key(),
                name: format!("Promote {}", field.label),
                description: field.description.to_string(),
                target_column: Some(field.column),
                batch_size: 100,
                order: position * 10,
                kind: MigrationKind::FieldPromotion(field),
            })
            .collect();
        migrations.extend([
            special(
                ACCESS_TOKEN_KEY,
                "Access tokens",
                "Generates a random access token for every submission without one.",
                Some(Column::AccessToken),
                100,
                60,
                MigrationKind::TokenBackfill,
            ),
            special(
                ENCRYPTION_KEY,
                "Encrypt sensitive fields",
                "Writes ciphertext and keyed-hash shadows for email, CPF, and phone.",
                None,
                50,
                70,
                MigrationKind::Encryption,
            ),
            special(
                CLEANUP_KEY,
                "Plaintext cleanup",
                "Nulls plaintext of encrypted fields on submissions older than 15 days.",
                None,
                100,
                80,
                MigrationKind::Cleanup,
            ),
            special(
                USER_LINKING_KEY,
                "Link submissions to accounts",
                "Resolves or creates the account for each unlinked submission.",
                None,
                50,
                90,
                MigrationKind::UserLinking,
            ),
            special(
                NAME_NORMALIZATION_KEY,
                "Normalize names",
                "Capitalizes submitter names while keeping connectives lowercase.",
                Some(Column::Name),
                100,
                100,
                MigrationKind::NameNormalization,
            ),
            special(
                CAPABILITY_GRANT_KEY,
                "Submission access",
                "Grants submission access to accounts with linked submissions.",
                None,
                100,
                110,
                MigrationKind::CapabilityGrant,
            ),
            special(
                DATA_CLEANUP_KEY,
                "Drop plaintext columns",
                "Completed when the plaintext columns have been physically removed.",
                None,
                1,
                999,
                MigrationKind::DataCleanup,
            ),
        ]);
        migrations.sort_by_key(|definition| definition.order);
        Self {
            migrations,
        }
    }

    /// Builds the catalog and applies batch-size overrides.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] for unknown keys or out-of-range sizes.
    pub fn with_batch_sizes(overrides: &BTreeMap<String, usize>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (key, size) in overrides {
            if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(size) {
                return Err(RegistryError::InvalidBatchSize {
                    key: key.clone(),
                    size: *size,
                });
            }
            let definition = registry
                .migrations
                .iter_mut()
                .find(|definition| &definition.key == key)
                .ok_or_else(|| RegistryError::UnknownKey(key.clone()))?;
            definition.batch_size = *size;
        }
        Ok(registry)
    }

    /// Returns every entry in order.
    #[must_use]
    pub fn migrations(&self) -> &[MigrationDefinition] {
        &self.migrations
    }

    /// Returns the listing view of every entry.
    #[must_use]
    pub fn summaries(&self) -> Vec<MigrationSummary> {
        self.migrations.iter().map(MigrationSummary::from).collect()
    }

    /// Looks up an entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MigrationDefinition> {
        self.migrations.iter().find(|definition| definition.key == key)
    }

    /// Returns true when the key can be dispatched.
    ///
    /// Special entries are always available; field entries only when their
    /// field definition exists.
    #[must_use]
    pub fn is_available(&self, key: &str) -> bool {
        match key.strip_prefix(FIELD_KEY_PREFIX) {
            Some(field) => field_definition(field).is_some() && self.get(key).is_some(),
            None => self.get(key).is_some(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn data_cleanup_is_always_last() {
        let registry = MigrationRegistry::new();
        let last = registry.migrations().last().unwrap();
        assert_eq!(last.key, DATA_CLEANUP_KEY);
        let orders: Vec<u32> = registry.migrations().iter().map(|entry| entry.order).collect();
        let mut sorted = orders.clone();
        sorted.sort_unstable();
        assert_eq!(orders, sorted);
    }

    #[test]
    fn every_field_definition_has_a_migration() {
        let registry = MigrationRegistry::new();
        for field in &FIELD_DEFINITIONS {
            let entry = registry.get(&field.migration_key()).unwrap();
            assert_eq!(entry.target_column, Some(field.column));
            assert!(registry.is_available(&entry.key));
        }
        assert!(!registry.is_available("field_nonexistent"));
        assert!(registry.is_available(CLEANUP_KEY));
        assert!(!registry.is_available("bogus"));
    }

    #[test]
    fn batch_size_overrides_are_validated() {
        let mut overrides = BTreeMap::new();
        overrides.insert(ENCRYPTION_KEY.to_string(), 25);
        let registry = MigrationRegistry::with_batch_sizes(&overrides).unwrap();
        assert_eq!(registry.get(ENCRYPTION_KEY).unwrap().batch_size, 25);

        overrides.insert(CLEANUP_KEY.to_string(), 0);
        assert!(matches!(
            MigrationRegistry::with_batch_sizes(&overrides),
            Err(RegistryError::InvalidBatchSize { .. })
        ));

        let mut unknown = BTreeMap::new();
        unknown.insert("bogus".to_string(), 10);
        assert_eq!(
            MigrationRegistry::with_batch_sizes(&unknown),
            Err(RegistryError::UnknownKey("bogus".to_string()))
        );
    }
}
