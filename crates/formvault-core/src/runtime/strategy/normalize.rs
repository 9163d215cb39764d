// crates/formvault-core/src/runtime/strategy/normalize.rs
// ============================================================================
// Module: Name Normalization Strategy
// Description: Capitalizes submitter names while keeping connectives lowercase.
// Purpose: Backfill a consistent display form of the name column.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! Whether a name needs work can only be decided in memory, so the strategy
//! walks the name column in id-ordered pages. Writes are compare-and-set on
//! the exact value that was read, which makes concurrent edits win.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::Column;
use crate::core::Condition;
use crate::core::MigrationStatus;
use crate::core::Record;
use crate::core::RecordId;
use crate::core::RecordQuery;
use crate::interfaces::StoreError;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::MigrationDefinition;
use crate::runtime::strategy::BatchTally;
use crate::runtime::strategy::MigrationContext;
use crate::runtime::strategy::MigrationStrategy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Words kept lowercase unless they start the name.
pub const CONNECTIVES: [&str; 8] = ["da", "das", "de", "di", "do", "dos", "du", "e"];
/// Records read per scan page.
const SCAN_PAGE_SIZE: usize = 500;

// ============================================================================
// SECTION: Normalizer
// ============================================================================

/// Normalizes a personal name.
///
/// Whitespace collapses to single spaces, every word is lowercased, and each
/// hyphen- or apostrophe-separated segment is capitalized. Connectives stay
/// lowercase except as the first word.
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .enumerate()
        .map(|(position, word)| {
            let lower = word.to_lowercase();
            if position > 0 && CONNECTIVES.contains(&lower.as_str()) {
                lower
            } else {
                capitalize_segments(&lower)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercases the first letter of each segment of a lowercased word.
fn capitalize_segments(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut at_start = true;
    for ch in word.chars() {
        if at_start && ch.is_alphabetic() {
            let upper: Vec<char> = ch.to_uppercase().collect();
            // Letters whose uppercase expands (e.g. ß) stay as written.
            match upper.as_slice() {
                [single] => out.push(*single),
                _ => out.push(ch),
            }
            at_start = false;
            continue;
        }
        out.push(ch);
        if matches!(ch, '-' | '\'' | '\u{2019}') {
            at_start = true;
        } else if ch.is_alphanumeric() {
            at_start = false;
        }
    }
    out
}

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Name capitalization backfill.
pub struct NameNormalizationStrategy {
    /// Shared collaborators.
    ctx: MigrationContext,
}

impl NameNormalizationStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(ctx: MigrationContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Reads the next page of named records after `after`.
    fn page(&self, after: Option<RecordId>) -> Result<Vec<Record>, StoreError> {
        let mut conditions = vec![Condition::Present(Column::Name)];
        if let Some(after) = after {
            conditions.push(Condition::IdAfter(after));
        }
        self.ctx.records.select(&RecordQuery::page(conditions, SCAN_PAGE_SIZE))
    }

    /// Returns the normalized name when it differs from the stored one.
    fn rewrite(record: &Record) -> Option<(&str, String)> {
        let current = record.value(Column::Name)?;
        let normalized = normalize_name(current);
        (normalized != current).then_some((current, normalized))
    }

    /// Counts records whose name is not yet normalized.
    fn count_pending(&self) -> Result<u64, StoreError> {
        let mut pending = 0;
        let mut after = None;
        loop {
            let page = self.page(after)?;
            let Some(last) = page.last() else {
                return Ok(pending);
            };
            after = Some(last.id);
            pending += page.iter().filter(|record| Self::rewrite(record).is_some()).count() as u64;
        }
    }

    /// Rewrites up to `batch_size` names.
    fn normalize(
        &self,
        definition: &MigrationDefinition,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        let mut after = None;
        loop {
            let page = self.page(after)?;
            let Some(last) = page.last() else {
                return Ok(());
            };
            after = Some(last.id);
            for record in &page {
                let Some((current, normalized)) = Self::rewrite(record) else {
                    continue;
                };
                if tally.is_full(definition.batch_size) {
                    return Ok(());
                }
                if self.ctx.records.replace_value(record.id, Column::Name, current, &normalized)? {
                    tally.changed();
                }
            }
        }
    }
}

impl MigrationStrategy for NameNormalizationStrategy {
    fn calculate_status(
        &self,
        _definition: &MigrationDefinition,
    ) -> Result<MigrationStatus, MigrationError> {
        let total = self.ctx.records.count(&[Condition::Present(Column::Name)])?;
        let pending = self.count_pending()?;
        Ok(MigrationStatus::from_counts(total, pending))
    }

    fn can_run(&self, definition: &MigrationDefinition) -> Result<(), MigrationError> {
        self.ctx.require_columns(definition, &[Column::Name])
    }

    fn execute(
        &self,
        definition: &MigrationDefinition,
        _request: &BatchRequest,
    ) -> Result<BatchOutcome, MigrationError> {
        let mut tally = BatchTally::new(&self.ctx, &definition.key);
        if let Err(err) = self.normalize(definition, &mut tally) {
            tally.fail(&err);
        }
        let pending = self.count_pending();
        Ok(tally.finish(pending))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectives_stay_lowercase_after_the_first_word() {
        assert_eq!(normalize_name("MARIA DA SILVA"), "Maria da Silva");
        assert_eq!(normalize_name("de souza e costa"), "De Souza e Costa");
        assert_eq!(normalize_name("  joão   DOS  santos "), "João dos Santos");
    }

    #[test]
    fn segments_are_capitalized() {
        assert_eq!(normalize_name("ana-clara d'ávila"), "Ana-Clara D'Ávila");
        assert_eq!(normalize_name("o'brien"), "O'Brien");
    }

    #[test]
    fn expanding_uppercase_is_left_alone() {
        assert_eq!(normalize_name("ßara"), "ßara");
        assert_eq!(normalize_name(&normalize_name("ßara")), "ßara");
    }
}
