// crates/formvault-core/src/core/record.rs
// ============================================================================
// Module: Formvault Records
// Description: Submission records, linked accounts, and record selection.
// Purpose: Describe the data the migration engine reads and mutates.
// Dependencies: crate::core::{columns, time}, serde
// ============================================================================

//! ## Overview
//! A [`Record`] is one form submission: an opaque JSON blob plus the promoted
//! and shadow columns that migrations fill in over time. Selection is
//! expressed with [`Condition`] values so every store evaluates the same
//! eligibility predicates; there is no persisted cursor, each batch re-issues
//! its query from scratch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::columns::Column;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Submission record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wraps a raw row identifier.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw row identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Linked account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(i64);

impl AccountId {
    /// Wraps a raw account identifier.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw account identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// One stored form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record identifier.
    pub id: RecordId,
    /// Form definition reference.
    pub form_id: i64,
    /// Linked account, assigned by the linking backfill.
    pub user_id: Option<AccountId>,
    /// Serialized submission payload.
    pub data: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Non-null text column values. Dropped columns never appear here.
    pub values: BTreeMap<Column, String>,
}

impl Record {
    /// Returns the column value when it is present (non-null, non-empty).
    #[must_use]
    pub fn value(&self, column: Column) -> Option<&str> {
        self.values.get(&column).map(String::as_str).filter(|value| !value.is_empty())
    }
}

/// Submission payload accepted by store seeding helpers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSubmission {
    /// Form definition reference.
    pub form_id: i64,
    /// Optional pre-linked account.
    pub user_id: Option<AccountId>,
    /// Serialized submission payload.
    pub data: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Initial text column values (empty strings are stored verbatim).
    pub values: BTreeMap<Column, String>,
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Predicate over a submission record.
///
/// "Empty" means null or the empty string. Conditions on a dropped column
/// treat it as null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Column is null or empty.
    Empty(Column),
    /// Column is neither null nor empty.
    Present(Column),
    /// Blob is a JSON object carrying a non-empty scalar under any of the keys.
    BlobHasValue(Vec<&'static str>),
    /// Record has no linked account.
    Unlinked,
    /// Record was created strictly before the timestamp.
    CreatedBefore(Timestamp),
    /// Record identifier is strictly greater than the given one.
    IdAfter(RecordId),
    /// Record sorts strictly after the `(created_at, id)` position.
    CreatedAfter(Timestamp, RecordId),
    /// At least one nested condition holds.
    Any(Vec<Condition>),
    /// Every nested condition holds.
    All(Vec<Condition>),
}

/// Ordering applied to record selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOrder {
    /// Ascending identifier.
    #[default]
    IdAsc,
    /// Oldest first, ties broken by identifier.
    CreatedAsc,
}

/// Record selection request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordQuery {
    /// Conditions joined with logical AND.
    pub conditions: Vec<Condition>,
    /// Result ordering.
    pub order: RecordOrder,
    /// Maximum number of records returned.
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Builds a bounded query ordered by identifier.
    #[must_use]
    pub fn page(conditions: Vec<Condition>, limit: usize) -> Self {
        Self {
            conditions,
            order: RecordOrder::IdAsc,
            limit: Some(limit),
        }
    }
}

/// Scope of a plaintext nullification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NullifyScope {
    /// Only the listed records.
    Records(Vec<RecordId>),
    /// Every record in the table.
    All,
}

// ============================================================================
// SECTION: Accounts
// ============================================================================

/// Linked account (the entity submissions are attributed to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,
    /// Verified contact address (lowercase).
    pub email: Option<String>,
    /// Display name.
    pub display_name: String,
    /// Keyed hash of the national identifier.
    pub identifier_hash: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Account creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Verified contact address.
    pub email: Option<String>,
    /// Display name.
    pub display_name: String,
    /// Keyed hash of the national identifier.
    pub identifier_hash: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Account whose capability grant disagrees with its linked records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityMismatch {
    /// Account identifier.
    pub account_id: AccountId,
    /// Whether the account has at least one linked submission.
    pub has_records: bool,
}
