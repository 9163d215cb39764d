// crates/formvault-config/src/lib.rs
// ============================================================================
// Module: Formvault Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for formvault.toml semantics.
// Dependencies: formvault-core, formvault-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `formvault-config` defines the configuration model for the migration
//! engine: where the database lives, which environment variables carry the
//! cipher secrets, per-migration batch sizes, and where activity events go.
//! Validation is strict and fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
