//! Diagnostics sink owned by the orchestrator.
//!
//! Check modules emit diagnostics through their context rather than through a
//! process-wide logger, so a scan can route them somewhere specific (a UI
//! console, a test recorder). The default sink forwards to `tracing`.

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Destination for scan diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn debug(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Forwards diagnostics to `tracing` under the `scanner` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn debug(&self, message: &str) {
        debug!(target: "scanner", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(target: "scanner", "{}", message);
    }
}

/// Severity of a recorded diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Debug,
    Warn,
}

/// Keeps every diagnostic in memory. Useful for tests and for surfacing module
/// chatter after a scan.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(DiagnosticLevel, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(DiagnosticLevel, String)> {
        self.records.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|(level, _)| *level == DiagnosticLevel::Warn)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn debug(&self, message: &str) {
        self.records
            .lock()
            .push((DiagnosticLevel::Debug, message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.records
            .lock()
            .push((DiagnosticLevel::Warn, message.to_string()));
    }
}
