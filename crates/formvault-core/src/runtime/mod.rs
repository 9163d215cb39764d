// crates/formvault-core/src/runtime/mod.rs
// ============================================================================
// Module: Formvault Runtime
// Description: Registry, strategies, dispatcher, facade, and reference stores.
// Purpose: Execute migrations against the collaborator traits.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Control flows one way per batch: facade, calculator, strategy, store.
//! Nothing here keeps a cursor between invocations; progress is always
//! re-derived from row state.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod activity;
pub mod calculator;
pub mod error;
pub mod facade;
pub mod registry;
pub mod store;
pub mod strategy;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use activity::FileActivitySink;
pub use activity::NoopActivitySink;
pub use activity::RecordingActivitySink;
pub use activity::StderrActivitySink;
pub use calculator::StatusCalculator;
pub use error::IrreversibleError;
pub use error::MigrationError;
pub use facade::CleanupReadiness;
pub use facade::DROP_CONFIRMATION;
pub use facade::DROP_GRACE_DAYS;
pub use facade::DropOutcome;
pub use facade::MigrationFacade;
pub use facade::NULLIFY_CONFIRMATION;
pub use facade::NULLIFY_GRACE_DAYS;
pub use facade::NullifyOutcome;
pub use facade::RunSummary;
pub use registry::FIELD_DEFINITIONS;
pub use registry::FieldDefinition;
pub use registry::MigrationDefinition;
pub use registry::MigrationKind;
pub use registry::MigrationRegistry;
pub use registry::MigrationSummary;
pub use registry::RegistryError;
pub use store::InMemoryStore;
pub use strategy::MigrationContext;
pub use strategy::MigrationStrategy;
