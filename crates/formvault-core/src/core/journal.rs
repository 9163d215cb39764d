// crates/formvault-core/src/core/journal.rs
// ============================================================================
// Module: Formvault Migration Journal
// Description: Error and change log entries written by backfill strategies.
// Purpose: Give operators an append-only trail of skipped and changed records.
// Dependencies: crate::core::{record, time}, serde
// ============================================================================

//! ## Overview
//! Journal entries are append-only and clearable per migration key. Messages
//! identify records by id and never carry plaintext PII values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::record::RecordId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Journal entry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// A record was skipped.
    Error,
    /// A record or account was changed.
    Change,
}

impl LogKind {
    /// Returns the persisted label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Change => "change",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "error" => Some(Self::Error),
            "change" => Some(Self::Change),
            _ => None,
        }
    }
}

/// Journal entry to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    /// Migration key that produced the entry.
    pub migration_key: String,
    /// Entry classification.
    pub kind: LogKind,
    /// Record the entry refers to.
    pub record_id: Option<RecordId>,
    /// Operator-facing message.
    pub message: String,
    /// Time of the event.
    pub created_at: Timestamp,
}

/// Stored journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Entry identifier.
    pub id: i64,
    /// Migration key that produced the entry.
    pub migration_key: String,
    /// Entry classification.
    pub kind: LogKind,
    /// Record the entry refers to.
    pub record_id: Option<RecordId>,
    /// Operator-facing message.
    pub message: String,
    /// Time of the event.
    pub created_at: Timestamp,
}

/// Journal listing filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogFilter {
    /// Restrict to one migration key.
    pub migration_key: Option<String>,
    /// Restrict to one classification.
    pub kind: Option<LogKind>,
    /// Maximum number of entries (newest first).
    pub limit: Option<usize>,
}
