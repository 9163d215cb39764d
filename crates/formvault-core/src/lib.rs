// crates/formvault-core/src/lib.rs
// ============================================================================
// Module: Formvault Core Library
// Description: Migration-and-encryption engine for PII-bearing form records.
// Purpose: Promote, encrypt, and retire sensitive submission fields safely.
// Dependencies: aes-gcm, hmac, pbkdf2, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Formvault Core moves form submissions through a monotonic lifecycle:
//! blob fields are promoted into columns, sensitive columns gain ciphertext
//! and keyed-hash shadows, plaintext is nulled after a grace window, and
//! finally the plaintext columns can be dropped.
//! Invariants:
//! - Progress is re-derived from row state on every call; there is no cursor.
//! - Every write is scoped by id and guarded by an emptiness or
//!   compare-and-set predicate, so overlapping runs converge.
//! - No strategy reintroduces plaintext once it has been removed.
//! - Irreversible operations require a confirmation literal, 100% encryption,
//!   and an elapsed grace window.
//!
//! Storage, accounts, settings, and activity are reached only through the
//! traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;
pub use interfaces::AccountStore;
pub use interfaces::ActivityEvent;
pub use interfaces::ActivitySink;
pub use interfaces::MigrationStateStore;
pub use interfaces::RecordStore;
pub use interfaces::StoreError;
