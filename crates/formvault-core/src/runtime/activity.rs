// crates/formvault-core/src/runtime/activity.rs
// ============================================================================
// Module: Formvault Activity Sinks
// Description: JSON-line sinks for migration batch activity.
// Purpose: Emit structured activity without coupling batches to a log backend.
// Dependencies: crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! Activity events describe batch completion and irreversible operations.
//! Sinks are fire-and-forget: serialization or write failures are dropped so
//! a broken log pipeline never fails a migration batch. Events carry counts
//! and keys only, never record values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::interfaces::ActivityEvent;
use crate::interfaces::ActivitySink;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Activity sink that logs JSON lines to stderr.
pub struct StderrActivitySink;

impl ActivitySink for StderrActivitySink {
    fn record(&self, event: &ActivityEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Activity sink that appends JSON lines to a file.
pub struct FileActivitySink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileActivitySink {
    /// Opens the activity log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl ActivitySink for FileActivitySink {
    fn record(&self, event: &ActivityEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op activity sink.
pub struct NoopActivitySink;

impl ActivitySink for NoopActivitySink {
    fn record(&self, _event: &ActivityEvent) {}
}

/// In-memory activity sink that keeps every event.
#[derive(Default)]
pub struct RecordingActivitySink {
    /// Captured events.
    events: Mutex<Vec<ActivityEvent>>,
}

impl RecordingActivitySink {
    /// Returns a copy of the captured events.
    #[must_use]
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl ActivitySink for RecordingActivitySink {
    fn record(&self, event: &ActivityEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
