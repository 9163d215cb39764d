// crates/formvault-core/src/core/columns.rs
// ============================================================================
// Module: Formvault Record Columns
// Description: Typed names for the promoted and shadow columns of a record.
// Purpose: Keep column identifiers closed so store queries never splice free text.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every text column the engine reads or writes is named by [`Column`]. Stores
//! translate the variant into a physical column name; there is no way to
//! address a column that is not listed here. Sensitive scalars are described
//! by [`SensitiveField`], which groups the plaintext column with its
//! ciphertext and keyed-hash shadows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Column
// ============================================================================

/// Text columns of the submission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    /// Contact email (plaintext).
    Email,
    /// Contact email ciphertext.
    EmailEncrypted,
    /// Contact email keyed hash.
    EmailHash,
    /// National identifier (plaintext).
    Cpf,
    /// National identifier ciphertext.
    CpfEncrypted,
    /// National identifier keyed hash.
    CpfHash,
    /// Phone number (plaintext).
    Phone,
    /// Phone number ciphertext.
    PhoneEncrypted,
    /// Phone number keyed hash.
    PhoneHash,
    /// Submitter display name.
    Name,
    /// Human-readable verification code.
    AuthCode,
    /// Random per-record access token.
    AccessToken,
}

impl Column {
    /// All text columns in schema order.
    pub const ALL: [Self; 12] = [
        Self::Email,
        Self::EmailEncrypted,
        Self::EmailHash,
        Self::Cpf,
        Self::CpfEncrypted,
        Self::CpfHash,
        Self::Phone,
        Self::PhoneEncrypted,
        Self::PhoneHash,
        Self::Name,
        Self::AuthCode,
        Self::AccessToken,
    ];

    /// Returns the physical column name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::EmailEncrypted => "email_encrypted",
            Self::EmailHash => "email_hash",
            Self::Cpf => "cpf",
            Self::CpfEncrypted => "cpf_encrypted",
            Self::CpfHash => "cpf_hash",
            Self::Phone => "phone",
            Self::PhoneEncrypted => "phone_encrypted",
            Self::PhoneHash => "phone_hash",
            Self::Name => "name",
            Self::AuthCode => "auth_code",
            Self::AccessToken => "access_token",
        }
    }

    /// Parses a physical column name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|column| column.as_str() == name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Sensitive Fields
// ============================================================================

/// A sensitive scalar with its shadow representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensitiveField {
    /// Plaintext column.
    pub plaintext: Column,
    /// Ciphertext column.
    pub ciphertext: Column,
    /// Keyed-hash column used for equality lookups.
    pub hash: Column,
}

/// Contact email shadow triple.
pub const EMAIL_FIELD: SensitiveField = SensitiveField {
    plaintext: Column::Email,
    ciphertext: Column::EmailEncrypted,
    hash: Column::EmailHash,
};

/// National identifier shadow triple.
pub const CPF_FIELD: SensitiveField = SensitiveField {
    plaintext: Column::Cpf,
    ciphertext: Column::CpfEncrypted,
    hash: Column::CpfHash,
};

/// Phone number shadow triple.
pub const PHONE_FIELD: SensitiveField = SensitiveField {
    plaintext: Column::Phone,
    ciphertext: Column::PhoneEncrypted,
    hash: Column::PhoneHash,
};

/// Every sensitive field subject to encryption and cleanup.
pub const SENSITIVE_FIELDS: [SensitiveField; 3] = [EMAIL_FIELD, CPF_FIELD, PHONE_FIELD];

/// Returns the sensitive field owning the given plaintext column.
#[must_use]
pub fn sensitive_field_for(plaintext: Column) -> Option<SensitiveField> {
    SENSITIVE_FIELDS.into_iter().find(|field| field.plaintext == plaintext)
}
