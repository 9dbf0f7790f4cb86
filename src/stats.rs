//! # Statistics Module
//!
//! Collects metrics about a scan while it runs.
//!
//! ## Key Metrics Tracked
//!
//! - **Probe Metrics**: Submitted probes, responses received, download failures
//! - **Correlation Metrics**: Exchanges recorded into module contexts
//! - **Alert Metrics**: Published and suppressed (deduplicated) alerts
//! - **Dispatch Metrics**: Response-processing tasks run and failed
//! - **Status Codes**: Distribution of response status codes
//!
//! All counters are atomics, so the collector can be shared freely between the
//! crawler workers, the dispatcher and check modules.
//!
//! ## Example
//!
//! ```rust,ignore
//! let stats = orchestrator.stats();
//! println!("{}", stats.to_json_string_pretty()?);
//! println!("{}", stats.to_markdown_string());
//! ```

use crate::error::ScanError;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

// A point-in-time copy of the counters, shared by every presentation method.
struct StatsSnapshot {
    probes_submitted: usize,
    responses_received: usize,
    downloads_failed: usize,
    exchanges_recorded: usize,
    alerts_published: usize,
    alerts_suppressed: usize,
    dispatch_tasks_run: usize,
    dispatch_tasks_failed: usize,
    response_status_counts: BTreeMap<u16, usize>,
    elapsed_duration: Duration,
}

impl StatsSnapshot {
    fn formatted_duration(&self) -> String {
        format!("{:?}", self.elapsed_duration)
    }

    fn probes_per_second(&self) -> f64 {
        let total_seconds = self.elapsed_duration.as_secs();
        if total_seconds > 0 {
            self.probes_submitted as f64 / total_seconds as f64
        } else {
            0.0
        }
    }

    fn status_codes(&self, separator: &str, format_entry: fn(u16, usize) -> String) -> String {
        self.response_status_counts
            .iter()
            .map(|(code, count)| format_entry(*code, *count))
            .collect::<Vec<String>>()
            .join(separator)
    }
}

/// Collects statistics about a scan.
#[derive(Debug, serde::Serialize)]
pub struct ScanStats {
    #[serde(skip)]
    pub start_time: Instant,

    pub probes_submitted: AtomicUsize,
    pub responses_received: AtomicUsize,
    pub downloads_failed: AtomicUsize,
    pub exchanges_recorded: AtomicUsize,

    pub alerts_published: AtomicUsize,
    pub alerts_suppressed: AtomicUsize,

    pub dispatch_tasks_run: AtomicUsize,
    pub dispatch_tasks_failed: AtomicUsize,

    pub response_status_counts: Arc<dashmap::DashMap<u16, usize>>,
}

impl ScanStats {
    /// Creates a new `ScanStats` with all counters at zero.
    pub fn new() -> Self {
        ScanStats {
            start_time: Instant::now(),
            probes_submitted: AtomicUsize::new(0),
            responses_received: AtomicUsize::new(0),
            downloads_failed: AtomicUsize::new(0),
            exchanges_recorded: AtomicUsize::new(0),
            alerts_published: AtomicUsize::new(0),
            alerts_suppressed: AtomicUsize::new(0),
            dispatch_tasks_run: AtomicUsize::new(0),
            dispatch_tasks_failed: AtomicUsize::new(0),
            response_status_counts: Arc::new(dashmap::DashMap::new()),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let response_status_counts = self
            .response_status_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        StatsSnapshot {
            probes_submitted: self.probes_submitted.load(Ordering::SeqCst),
            responses_received: self.responses_received.load(Ordering::SeqCst),
            downloads_failed: self.downloads_failed.load(Ordering::SeqCst),
            exchanges_recorded: self.exchanges_recorded.load(Ordering::SeqCst),
            alerts_published: self.alerts_published.load(Ordering::SeqCst),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::SeqCst),
            dispatch_tasks_run: self.dispatch_tasks_run.load(Ordering::SeqCst),
            dispatch_tasks_failed: self.dispatch_tasks_failed.load(Ordering::SeqCst),
            response_status_counts,
            elapsed_duration: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_probes_submitted(&self) {
        self.probes_submitted.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a received response and its status code.
    pub(crate) fn record_response(&self, status_code: u16) {
        self.responses_received.fetch_add(1, Ordering::SeqCst);
        *self.response_status_counts.entry(status_code).or_insert(0) += 1;
    }

    pub(crate) fn increment_downloads_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_exchanges_recorded(&self) {
        self.exchanges_recorded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_alerts_published(&self) {
        self.alerts_published.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_alerts_suppressed(&self) {
        self.alerts_suppressed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_dispatch_tasks_run(&self) {
        self.dispatch_tasks_run.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_dispatch_tasks_failed(&self) {
        self.dispatch_tasks_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn to_json_string(&self) -> Result<String, ScanError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, ScanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Exports the current statistics as a Markdown report.
    pub fn to_markdown_string(&self) -> String {
        let snapshot = self.snapshot();

        let status_codes_list =
            snapshot.status_codes("\n", |code, count| format!("- **{}**: {}", code, count));
        let status_codes_output = if status_codes_list.is_empty() {
            "N/A".to_string()
        } else {
            status_codes_list
        };

        format!(
            r#"# Scan Statistics Report

- **Duration**: {}
- **Average Speed**: {:.2} probes/s

## Probes
| Metric      | Count |
|-------------|-------|
| Submitted   | {}     |
| Received    | {}     |
| Failed      | {}     |
| Recorded    | {}     |

## Alerts
| Metric      | Count |
|-------------|-------|
| Published   | {}     |
| Suppressed  | {}     |

## Response Dispatch
| Metric      | Count |
|-------------|-------|
| Run         | {}     |
| Failed      | {}     |

## Status Codes
{}
"#,
            snapshot.formatted_duration(),
            snapshot.probes_per_second(),
            snapshot.probes_submitted,
            snapshot.responses_received,
            snapshot.downloads_failed,
            snapshot.exchanges_recorded,
            snapshot.alerts_published,
            snapshot.alerts_suppressed,
            snapshot.dispatch_tasks_run,
            snapshot.dispatch_tasks_failed,
            status_codes_output
        )
    }
}

impl Default for ScanStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScanStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nScan Statistics")?;
        writeln!(f, "---------------")?;
        writeln!(f, "  duration : {}", snapshot.formatted_duration())?;
        writeln!(f, "  speed    : probes/s: {:.2}", snapshot.probes_per_second())?;
        writeln!(
            f,
            "  probes   : submitted: {}, received: {}, failed: {}, recorded: {}",
            snapshot.probes_submitted,
            snapshot.responses_received,
            snapshot.downloads_failed,
            snapshot.exchanges_recorded
        )?;
        writeln!(
            f,
            "  alerts   : published: {}, suppressed: {}",
            snapshot.alerts_published, snapshot.alerts_suppressed
        )?;
        writeln!(
            f,
            "  dispatch : run: {}, failed: {}",
            snapshot.dispatch_tasks_run, snapshot.dispatch_tasks_failed
        )?;

        let status_string = if snapshot.response_status_counts.is_empty() {
            "none".to_string()
        } else {
            snapshot.status_codes(", ", |code, count| format!("{}: {}", code, count))
        };

        writeln!(f, "  status   : {}\n", status_string)
    }
}
