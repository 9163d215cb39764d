// crates/formvault-core/src/core/mod.rs
// ============================================================================
// Module: Formvault Core Types
// Description: Records, columns, time, cipher, extraction, and status types.
// Purpose: Shared vocabulary for stores, strategies, and the facade.
// Dependencies: crate::core::*
// ============================================================================

//! ## Overview
//! Core types carry no I/O. Stores and strategies exchange these values
//! through the traits in [`crate::interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cipher;
pub mod columns;
pub mod extract;
pub mod journal;
pub mod record;
pub mod status;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cipher::CipherError;
pub use cipher::CipherSecrets;
pub use cipher::FieldCipher;
pub use columns::CPF_FIELD;
pub use columns::Column;
pub use columns::EMAIL_FIELD;
pub use columns::PHONE_FIELD;
pub use columns::SENSITIVE_FIELDS;
pub use columns::SensitiveField;
pub use extract::ExtractError;
pub use extract::Sanitizer;
pub use journal::LogEntry;
pub use journal::LogFilter;
pub use journal::LogKind;
pub use journal::NewLogEntry;
pub use record::Account;
pub use record::AccountId;
pub use record::CapabilityMismatch;
pub use record::Condition;
pub use record::NewAccount;
pub use record::NewSubmission;
pub use record::NullifyScope;
pub use record::Record;
pub use record::RecordId;
pub use record::RecordOrder;
pub use record::RecordQuery;
pub use status::BatchOutcome;
pub use status::BatchRequest;
pub use status::MigrationStatus;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use time::Timestamp;
