// crates/formvault-core/src/core/time.rs
// ============================================================================
// Module: Formvault Time Model
// Description: Timestamps and clocks used for grace-period arithmetic.
// Purpose: Keep wall-clock reads behind an injectable clock.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Record creation times, completion markers, and grace windows are all
//! expressed as unix-millisecond [`Timestamp`] values. Strategies never read
//! the system clock directly; they ask the [`Clock`] held by the migration
//! context so grace gating can be exercised deterministically in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix epoch timestamp in milliseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(value: i64) -> Self {
        Self(value)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp shifted back by whole days.
    #[must_use]
    pub const fn minus_days(self, days: i64) -> Self {
        Self(self.0.saturating_sub(days.saturating_mul(MILLIS_PER_DAY)))
    }

    /// Returns the number of whole days elapsed since `earlier`.
    ///
    /// Negative spans (clock skew) report zero.
    #[must_use]
    pub const fn whole_days_since(self, earlier: Self) -> i64 {
        let span = self.0.saturating_sub(earlier.0);
        if span <= 0 { 0 } else { span / MILLIS_PER_DAY }
    }

    /// Parses a timestamp persisted as decimal unix milliseconds.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse::<i64>().ok().map(Self)
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp(i64::try_from(now.as_millis()).unwrap_or(i64::MAX))
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    /// Current time value.
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub const fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward by whole days.
    pub fn advance_days(&self, days: i64) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = Timestamp(guard.0.saturating_add(days.saturating_mul(MILLIS_PER_DAY)));
        }
    }

    /// Sets the clock to an explicit time.
    pub fn set(&self, now: Timestamp) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.lock().map(|guard| *guard).unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
