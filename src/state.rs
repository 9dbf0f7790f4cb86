//! Module for tracking the correlation state of one module invocation.
//!
//! This module defines the `ContextState` struct, which is shared by a root
//! `ModuleContext` and every indexed view branched from it. It uses atomic
//! counters and a concurrent map to keep track of:
//! - The number of probe requests sent on behalf of the invocation.
//! - The number of responses recorded back into it.
//! - The request/response/fingerprint triple saved for each correlation index.
//! - A one-way failure flag raised by the check module.
//!
//! Every operation is individually atomic. Composite sequences (read the failed
//! flag, then record an exchange) are not, and callers have to tolerate that.

use crate::fingerprint::PageFingerprint;
use crate::http::{Request, Response};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::trace;

/// One saved exchange. Fields are optional because a slot can be read before
/// anything has been recorded into it.
#[derive(Debug, Clone, Default)]
pub struct SavedExchange {
    pub request: Option<Arc<Request>>,
    pub response: Option<Arc<Response>>,
    pub fingerprint: Option<PageFingerprint>,
}

/// Represents the shared state of one check-module invocation.
#[derive(Debug, Default)]
pub struct ContextState {
    /// The number of probe requests submitted so far.
    sent_count: AtomicUsize,
    /// The number of responses recorded so far.
    received_count: AtomicUsize,
    /// Set once by the module when its results become unreliable.
    failed: AtomicBool,
    /// Saved exchanges keyed by correlation index. Sparse.
    exchanges: DashMap<usize, SavedExchange>,
}

impl ContextState {
    /// Creates a new, atomically reference-counted `ContextState`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increments the sent counter and returns its new value.
    pub fn increment_sent_count(&self) -> usize {
        self.sent_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Increments the received counter and returns its new value.
    pub fn increment_received_count(&self) -> usize {
        self.received_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn sent_count(&self) -> usize {
        self.sent_count.load(Ordering::SeqCst)
    }

    pub fn received_count(&self) -> usize {
        self.received_count.load(Ordering::SeqCst)
    }

    /// Checks if every submitted request has had its response recorded.
    ///
    /// Asking before anything was submitted is a caller error; it answers
    /// `false` rather than a vacuous `true`.
    pub fn all_responses_received(&self) -> bool {
        let sent = self.sent_count.load(Ordering::SeqCst);
        if sent == 0 {
            trace!("Readiness queried before any request was submitted");
            return false;
        }
        self.received_count.load(Ordering::SeqCst) == sent
    }

    /// Stores the exchange at `index`, replacing whatever was there.
    pub fn put(
        &self,
        index: usize,
        request: Arc<Request>,
        response: Arc<Response>,
        fingerprint: PageFingerprint,
    ) {
        let previous = self.exchanges.insert(
            index,
            SavedExchange {
                request: Some(request),
                response: Some(response),
                fingerprint: Some(fingerprint),
            },
        );
        if previous.is_some() {
            trace!("Overwrote saved exchange at index {}", index);
        }
    }

    /// Returns what has been stored at `index`. Absent and "never arriving"
    /// are indistinguishable here.
    pub fn get(&self, index: usize) -> SavedExchange {
        self.exchanges
            .get(&index)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn set_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}
