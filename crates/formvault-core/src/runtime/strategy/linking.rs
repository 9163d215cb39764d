// crates/formvault-core/src/runtime/strategy/linking.rs
// ============================================================================
// Module: User Linking Strategy
// Description: Resolves or creates the account behind each unlinked submission.
// Purpose: Attribute historical submissions to accounts without merging people.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! Unlinked submissions carrying a national identifier are processed oldest
//! first. Each is resolved in order of confidence:
//!
//! 1. an identifier already resolved earlier in the same batch,
//! 2. an account already bound to the identifier hash,
//! 3. an account matching the submission's verified email, which is then
//!    bound to the identifier,
//! 4. otherwise a new account.
//!
//! Pending records are scanned in pages; each page is planned before
//! anything in it is written. When two different identifiers would land on
//! the same account (or create the same email) anywhere in the batch, every
//! record involved is journaled as a conflict and skipped. A final pass force-links every record sharing a resolved
//! identifier hash to its account.
//!
//! Journal messages carry record and account ids only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::AccountId;
use crate::core::BatchOutcome;
use crate::core::BatchRequest;
use crate::core::CPF_FIELD;
use crate::core::Column;
use crate::core::Condition;
use crate::core::EMAIL_FIELD;
use crate::core::FieldCipher;
use crate::core::MigrationStatus;
use crate::core::NewAccount;
use crate::core::Record;
use crate::core::RecordId;
use crate::core::RecordOrder;
use crate::interfaces::StoreError;
use crate::runtime::error::MigrationError;
use crate::runtime::registry::MigrationDefinition;
use crate::runtime::strategy::BatchTally;
use crate::runtime::strategy::MigrationContext;
use crate::runtime::strategy::MigrationStrategy;
use crate::runtime::strategy::PendingScan;
use crate::runtime::strategy::candidate_window;
use crate::runtime::strategy::encryption::hash_input;

// ============================================================================
// SECTION: Planning Types
// ============================================================================

/// Account a record resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Account already bound to the identifier.
    Existing(AccountId),
    /// Account matched by email; the identifier will be bound to it.
    Claim(AccountId),
    /// No match; a new account will be created.
    Create {
        /// Verified email for the new account.
        email: Option<String>,
        /// Display name for the new account.
        display_name: String,
    },
}

/// Resource two identifiers may compete for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum TargetKey {
    /// An existing account.
    Account(AccountId),
    /// An email a new account would take.
    Email(String),
}

impl Target {
    /// Returns the contested resource, if any.
    fn key(&self) -> Option<TargetKey> {
        match self {
            Self::Existing(_) => None,
            Self::Claim(account) => Some(TargetKey::Account(*account)),
            Self::Create {
                email,
                ..
            } => email.clone().map(TargetKey::Email),
        }
    }
}

/// Resolution state carried across the pages of one batch.
#[derive(Debug, Default)]
struct LinkProgress {
    /// Planned target per identifier hash.
    resolved: BTreeMap<String, Target>,
    /// Identifiers competing for each contested resource.
    claimants: BTreeMap<TargetKey, BTreeSet<String>>,
    /// Account materialized per identifier hash.
    accounts: BTreeMap<String, AccountId>,
}

/// Resolution planned for one record.
#[derive(Debug)]
struct Planned {
    /// Record to link.
    record_id: RecordId,
    /// Identifier hash of the record.
    identifier: String,
    /// Resolved account.
    target: Target,
}

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Cross-entity account linking.
pub struct UserLinkingStrategy {
    /// Shared collaborators.
    ctx: MigrationContext,
}

impl UserLinkingStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(ctx: MigrationContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Records carrying an identifier in either form.
    fn has_identifier() -> Condition {
        Condition::Any(vec![Condition::Present(Column::CpfHash), Condition::Present(Column::Cpf)])
    }

    /// Unlinked records carrying an identifier.
    fn pending_conditions() -> Vec<Condition> {
        vec![Condition::Unlinked, Self::has_identifier()]
    }

    /// Returns the identifier hash of a record.
    fn identifier(cipher: &FieldCipher, record: &Record) -> Option<String> {
        if let Some(hash) = record.value(Column::CpfHash) {
            return Some(hash.to_string());
        }
        let digits = hash_input(CPF_FIELD, record.value(Column::Cpf)?);
        (!digits.is_empty()).then(|| cipher.keyed_hash(&digits))
    }

    /// Returns the record's verified email, lowercased.
    fn email(cipher: &FieldCipher, record: &Record) -> Result<Option<String>, &'static str> {
        if let Some(email) = record.value(Column::Email) {
            return Ok(Some(hash_input(EMAIL_FIELD, email)));
        }
        match record.value(Column::EmailEncrypted) {
            Some(stored) => cipher
                .decrypt(stored)
                .map(|email| Some(hash_input(EMAIL_FIELD, &email)))
                .ok_or("email ciphertext is unreadable"),
            None => Ok(None),
        }
    }

    /// Plans the resolution of one record.
    fn plan(
        &self,
        cipher: &FieldCipher,
        record: &Record,
        resolved: &mut BTreeMap<String, Target>,
        tally: &mut BatchTally<'_>,
    ) -> Result<Option<Planned>, StoreError> {
        let Some(identifier) = Self::identifier(cipher, record) else {
            tally.skip(Some(record.id), "identifier is empty".to_string());
            return Ok(None);
        };
        let planned = |target: Target| Planned {
            record_id: record.id,
            identifier: identifier.clone(),
            target,
        };
        if let Some(target) = resolved.get(&identifier) {
            return Ok(Some(planned(target.clone())));
        }
        if let Some(account) = self.ctx.accounts.find_by_identifier_hash(&identifier)? {
            let target = Target::Existing(account.id);
            resolved.insert(identifier.clone(), target.clone());
            return Ok(Some(planned(target)));
        }
        let email = match Self::email(cipher, record) {
            Ok(email) => email,
            Err(reason) => {
                tally.skip(Some(record.id), reason.to_string());
                return Ok(None);
            }
        };
        let existing = match email.as_deref() {
            Some(email) => self.ctx.accounts.find_by_email(email)?,
            None => None,
        };
        let bound_elsewhere = existing.as_ref().is_some_and(|account| {
            account.identifier_hash.as_ref().is_some_and(|bound| *bound != identifier)
        });
        let target = match existing {
            Some(account) if bound_elsewhere => {
                tally.skip(
                    Some(record.id),
                    format!("conflict: account {} is bound to a different identifier", account.id),
                );
                return Ok(None);
            }
            Some(account) => Target::Claim(account.id),
            None => Target::Create {
                display_name: Self::display_name(record, email.as_deref()),
                email,
            },
        };
        resolved.insert(identifier.clone(), target.clone());
        Ok(Some(planned(target)))
    }

    /// Picks a display name for a new account.
    fn display_name(record: &Record, email: Option<&str>) -> String {
        record
            .value(Column::Name)
            .map(str::to_string)
            .or_else(|| email.and_then(|email| email.split('@').next()).map(str::to_string))
            .unwrap_or_else(|| format!("Submitter {}", record.id))
    }

    /// Returns the account for a planned record, binding or creating it.
    fn materialize(
        &self,
        planned: &Planned,
        tally: &mut BatchTally<'_>,
    ) -> Result<Option<AccountId>, StoreError> {
        match &planned.target {
            Target::Existing(account) => Ok(Some(*account)),
            Target::Claim(account) => {
                if self.ctx.accounts.claim_identifier_hash(*account, &planned.identifier)? {
                    tally.note_change(
                        Some(planned.record_id),
                        &format!("bound identifier to account {account}"),
                    );
                    return Ok(Some(*account));
                }
                match self.ctx.accounts.find_by_identifier_hash(&planned.identifier)? {
                    Some(bound) => Ok(Some(bound.id)),
                    None => {
                        tally.skip(
                            Some(planned.record_id),
                            format!("conflict: account {account} was bound concurrently"),
                        );
                        Ok(None)
                    }
                }
            }
            Target::Create {
                email,
                display_name,
            } => {
                let account = self.ctx.accounts.create_account(&NewAccount {
                    email: email.clone(),
                    display_name: display_name.clone(),
                    identifier_hash: Some(planned.identifier.clone()),
                    created_at: self.ctx.clock.now(),
                })?;
                tally.note_change(
                    Some(planned.record_id),
                    &format!("created account {}", account.id),
                );
                Ok(Some(account.id))
            }
        }
    }

    /// Plans and applies one page of pending records.
    fn link_page(
        &self,
        definition: &MigrationDefinition,
        cipher: &FieldCipher,
        page: &[Record],
        progress: &mut LinkProgress,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        let mut plans = Vec::new();
        for record in page {
            if let Some(planned) = self.plan(cipher, record, &mut progress.resolved, tally)? {
                plans.push(planned);
            }
        }
        for planned in &plans {
            if let Some(key) = planned.target.key() {
                progress.claimants.entry(key).or_default().insert(planned.identifier.clone());
            }
        }

        for planned in plans {
            if tally.is_full(definition.batch_size) {
                break;
            }
            let contested = planned
                .target
                .key()
                .and_then(|key| progress.claimants.get(&key))
                .is_some_and(|identifiers| identifiers.len() > 1);
            if contested {
                tally.skip(
                    Some(planned.record_id),
                    "conflict: different identifiers resolve to the same account".to_string(),
                );
                continue;
            }
            let account = match progress.accounts.get(&planned.identifier) {
                Some(account) => *account,
                None => {
                    let Some(account) = self.materialize(&planned, tally)? else {
                        continue;
                    };
                    progress.accounts.insert(planned.identifier.clone(), account);
                    account
                }
            };
            if self.ctx.records.link_account(planned.record_id, account)? {
                tally.changed();
                tally.note_change(Some(planned.record_id), &format!("linked to account {account}"));
            }
        }
        Ok(())
    }

    /// Scans, applies, and relinks one batch.
    fn link(
        &self,
        definition: &MigrationDefinition,
        cipher: &FieldCipher,
        tally: &mut BatchTally<'_>,
    ) -> Result<(), StoreError> {
        let mut scan = PendingScan::new(
            self.ctx.records.as_ref(),
            Self::pending_conditions(),
            RecordOrder::CreatedAsc,
            candidate_window(definition.batch_size),
        );
        let mut progress = LinkProgress::default();
        while !tally.is_full(definition.batch_size) {
            let page = scan.next_page()?;
            if page.is_empty() {
                break;
            }
            self.link_page(definition, cipher, &page, &mut progress, tally)?;
        }

        for (identifier, account) in &progress.accounts {
            let relinked = self.ctx.records.relink_by_identifier(identifier, *account)?;
            if relinked > 0 {
                tally.changed_many(relinked);
                tally.note_change(
                    None,
                    &format!("relinked {relinked} records sharing an identifier to account {account}"),
                );
            }
        }
        Ok(())
    }
}

impl MigrationStrategy for UserLinkingStrategy {
    fn calculate_status(
        &self,
        _definition: &MigrationDefinition,
    ) -> Result<MigrationStatus, MigrationError> {
        let total = self.ctx.records.count(&[Self::has_identifier()])?;
        let pending = self.ctx.records.count(&Self::pending_conditions())?;
        Ok(MigrationStatus::from_counts(total, pending))
    }

    fn can_run(&self, definition: &MigrationDefinition) -> Result<(), MigrationError> {
        self.ctx.require_cipher(definition)?;
        self.ctx.require_columns(definition, &[Column::CpfHash])
    }

    fn execute(
        &self,
        definition: &MigrationDefinition,
        _request: &BatchRequest,
    ) -> Result<BatchOutcome, MigrationError> {
        let cipher = self.ctx.require_cipher(definition)?;
        let mut tally = BatchTally::new(&self.ctx, &definition.key);
        if let Err(err) = self.link(definition, cipher, &mut tally) {
            tally.fail(&err);
        }
        let pending = self.ctx.records.count(&Self::pending_conditions());
        Ok(tally.finish(pending))
    }
}
