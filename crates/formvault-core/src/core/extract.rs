// crates/formvault-core/src/core/extract.rs
// ============================================================================
// Module: Formvault Field Extraction
// Description: Blob decoding, candidate-key extraction, and value sanitizers.
// Purpose: Turn an opaque submission payload into one clean column value.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! Submission blobs are JSON objects whose key names vary between form
//! versions. [`extract_first`] walks an ordered candidate list and returns
//! the first non-empty scalar. [`Sanitizer`] then normalizes the raw value
//! for its dedicated column.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Per-record extraction failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// Blob is missing or empty.
    #[error("submission blob is empty")]
    EmptyBlob,
    /// Blob is not a JSON object.
    #[error("submission blob is not a json object: {0}")]
    Undecodable(String),
    /// Value failed sanitization for its column.
    #[error("value rejected by {sanitizer} sanitizer")]
    Rejected {
        /// Sanitizer label.
        sanitizer: &'static str,
    },
}

// ============================================================================
// SECTION: Extraction
// ============================================================================

/// Decodes a stored blob into a JSON object.
///
/// # Errors
///
/// Returns [`ExtractError`] when the blob is empty or not an object.
pub fn decode_blob(blob: Option<&str>) -> Result<Map<String, Value>, ExtractError> {
    let raw = blob.map(str::trim).filter(|raw| !raw.is_empty()).ok_or(ExtractError::EmptyBlob)?;
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ExtractError::Undecodable("top-level value is not an object".to_string())),
        Err(err) => Err(ExtractError::Undecodable(err.to_string())),
    }
}

/// Returns the first present, non-empty scalar among `keys`.
///
/// Strings are trimmed; numbers are rendered in their JSON form. Any other
/// value type is skipped.
#[must_use]
pub fn extract_first(blob: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match blob.get(*key) {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

// ============================================================================
// SECTION: Sanitizers
// ============================================================================

/// Normalization applied before a value lands in its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sanitizer {
    /// Trimmed, lowercased address with a local part and a domain.
    Email,
    /// ASCII digits only, optionally of an exact length.
    Digits {
        /// Required digit count.
        exact_len: Option<usize>,
    },
    /// Whitespace collapsed to single spaces.
    Text,
    /// Uppercase ASCII alphanumerics.
    Code,
}

impl Sanitizer {
    /// Returns the sanitizer label used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Digits {
                ..
            } => "digits",
            Self::Text => "text",
            Self::Code => "code",
        }
    }

    /// Sanitizes a raw extracted value.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Rejected`] when nothing usable remains.
    pub fn apply(self, raw: &str) -> Result<String, ExtractError> {
        let rejected = || ExtractError::Rejected {
            sanitizer: self.label(),
        };
        let value = match self {
            Self::Email => {
                let email = raw.trim().to_lowercase();
                let valid = email.split_once('@').is_some_and(|(local, domain)| {
                    !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
                }) && !email.chars().any(char::is_whitespace);
                if !valid {
                    return Err(rejected());
                }
                email
            }
            Self::Digits {
                exact_len,
            } => {
                let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
                if exact_len.is_some_and(|len| digits.len() != len) {
                    return Err(rejected());
                }
                digits
            }
            Self::Text => raw.split_whitespace().collect::<Vec<_>>().join(" "),
            Self::Code => {
                raw.chars().filter(char::is_ascii_alphanumeric).map(|ch| ch.to_ascii_uppercase()).collect()
            }
        };
        if value.is_empty() { Err(rejected()) } else { Ok(value) }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
