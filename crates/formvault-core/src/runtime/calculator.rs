// crates/formvault-core/src/runtime/calculator.rs
// ============================================================================
// Module: Formvault Status Calculator
// Description: Dispatches status, precondition, and batch calls by key.
// Purpose: Route every migration key to its strategy instance.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The calculator owns one strategy instance per migration kind and a map
//! from key to instance; every `field_*` key shares the promotion instance.
//! The terminal `data_cleanup` marker has no strategy: its status is a
//! stored flag and it can never be executed directly.
//!
//! [`StatusCalculator::execute`] always re-validates preconditions before
//! running a batch, then notifies the activity sink unless the request
//! suppresses it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::MigrationStatus;
use crate::interfaces::ActivityEvent;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::DATA_CLEANUP_COMPLETED_SETTING;
use crate::runtime::registry::FIELD_KEY_PREFIX;
use crate::runtime::registry::MigrationDefinition;
use crate::runtime::registry::MigrationKind;
use crate::runtime::registry::MigrationRegistry;
use crate::runtime::strategy::CapabilityGrantStrategy;
use crate::runtime::strategy::CleanupStrategy;
use crate::runtime::strategy::EncryptionStrategy;
use crate::runtime::strategy::FieldPromotionStrategy;
use crate::runtime::strategy::MigrationContext;
use crate::runtime::strategy::MigrationStrategy;
use crate::runtime::strategy::NameNormalizationStrategy;
use crate::runtime::strategy::TokenBackfillStrategy;
use crate::runtime::strategy::UserLinkingStrategy;
use crate::runtime::strategy::not_runnable;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Activity event name for a completed batch.
pub const BATCH_EVENT: &str = "migration_batch";

// ============================================================================
// SECTION: Calculator
// ============================================================================

/// Key-to-strategy dispatcher.
pub struct StatusCalculator {
    /// Migration catalog.
    registry: MigrationRegistry,
    /// Shared collaborators.
    ctx: MigrationContext,
    /// Strategy per executable key.
    strategies: BTreeMap<String, Arc<dyn MigrationStrategy>>,
}

impl StatusCalculator {
    /// Builds the dispatcher for every catalog entry.
    #[must_use]
    pub fn new(registry: MigrationRegistry, ctx: MigrationContext) -> Self {
        let promotion: Arc<dyn MigrationStrategy> =
            Arc::new(FieldPromotionStrategy::new(ctx.clone()));
        let mut strategies: BTreeMap<String, Arc<dyn MigrationStrategy>> = BTreeMap::new();
        for definition in registry.migrations() {
            let strategy: Arc<dyn MigrationStrategy> = match definition.kind {
                MigrationKind::FieldPromotion(_) => Arc::clone(&promotion),
                MigrationKind::TokenBackfill => Arc::new(TokenBackfillStrategy::new(ctx.clone())),
                MigrationKind::Encryption => Arc::new(EncryptionStrategy::new(ctx.clone())),
                MigrationKind::Cleanup => Arc::new(CleanupStrategy::new(ctx.clone())),
                MigrationKind::UserLinking => Arc::new(UserLinkingStrategy::new(ctx.clone())),
                MigrationKind::NameNormalization => {
                    Arc::new(NameNormalizationStrategy::new(ctx.clone()))
                }
                MigrationKind::CapabilityGrant => {
                    Arc::new(CapabilityGrantStrategy::new(ctx.clone()))
                }
                MigrationKind::DataCleanup => continue,
            };
            strategies.insert(definition.key.clone(), strategy);
        }
        Self {
            registry,
            ctx,
            strategies,
        }
    }

    /// Returns the catalog.
    #[must_use]
    pub const fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Returns the shared collaborators.
    #[must_use]
    pub const fn context(&self) -> &MigrationContext {
        &self.ctx
    }

    /// Looks up an available catalog entry.
    fn definition(&self, key: &str) -> Result<&MigrationDefinition, MigrationError> {
        match self.registry.get(key) {
            Some(definition) if self.registry.is_available(key) => Ok(definition),
            Some(_) => Err(MigrationError::Unavailable(key.to_string())),
            None if key.starts_with(FIELD_KEY_PREFIX) => {
                Err(MigrationError::Unavailable(key.to_string()))
            }
            None => Err(MigrationError::UnknownMigration(key.to_string())),
        }
    }

    /// Returns the strategy for an entry, or `None` for the terminal marker.
    fn strategy(
        &self,
        definition: &MigrationDefinition,
    ) -> Result<Option<&Arc<dyn MigrationStrategy>>, MigrationError> {
        if definition.kind == MigrationKind::DataCleanup {
            return Ok(None);
        }
        self.strategies
            .get(&definition.key)
            .map(Some)
            .ok_or_else(|| MigrationError::Unavailable(definition.key.clone()))
    }

    /// Computes progress for a migration.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] for unknown keys or failed reads.
    pub fn calculate(&self, key: &str) -> Result<MigrationStatus, MigrationError> {
        let definition = self.definition(key)?;
        match self.strategy(definition)? {
            Some(strategy) => strategy.calculate_status(definition),
            None => {
                let flag = self.ctx.state.get_setting(DATA_CLEANUP_COMPLETED_SETTING)?;
                Ok(MigrationStatus::from_flag(flag.as_deref() == Some("1")))
            }
        }
    }

    /// Validates preconditions for a migration.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::NotRunnable`] naming the failed precondition.
    pub fn can_run(&self, key: &str) -> Result<(), MigrationError> {
        let definition = self.definition(key)?;
        match self.strategy(definition)? {
            Some(strategy) => strategy.can_run(definition),
            None => Err(not_runnable(
                definition,
                "completed by dropping the plaintext columns, not by batches",
            )),
        }
    }

    /// Runs one batch after re-validating preconditions.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] when dispatch or preconditions fail.
    pub fn execute(
        &self,
        key: &str,
        request: &BatchRequest,
    ) -> Result<BatchOutcome, MigrationError> {
        self.can_run(key)?;
        let definition = self.definition(key)?;
        let strategy = self
            .strategy(definition)?
            .ok_or_else(|| MigrationError::Unavailable(key.to_string()))?;
        let outcome = strategy.execute(definition, request)?;
        if !request.suppress_activity {
            self.ctx.activity.record(&ActivityEvent {
                event: BATCH_EVENT,
                timestamp: self.ctx.clock.now(),
                migration_key: definition.key.clone(),
                batch_index: request.batch_index,
                success: outcome.success,
                processed: outcome.processed,
                has_more: outcome.has_more,
                error_count: outcome.errors.len(),
            });
        }
        Ok(outcome)
    }
}
