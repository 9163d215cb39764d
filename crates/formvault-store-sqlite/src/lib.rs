// crates/formvault-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Formvault Store
// Description: Durable collaborator stores backed by SQLite WAL.
// Purpose: Provide production persistence for submissions and migration state.
// Dependencies: formvault-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteStore`], a single `SQLite` database that
//! implements the record, account, and migration-state collaborator traits
//! of `formvault-core`. Selection conditions compile to parameterized SQL
//! with the same semantics as the in-memory store, including null-reads of
//! physically dropped columns.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SCHEMA_VERSION;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
