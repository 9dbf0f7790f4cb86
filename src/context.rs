//! # Module Context
//!
//! The façade a check module uses for one invocation against one crawled path.
//!
//! ## Overview
//!
//! A `ModuleContext` is a cheap view over three shared things: the scan's
//! `PathOrchestrator`, the `PathState` under test, and the invocation's
//! `ContextState`. The root context handed to a module has no correlation
//! index. Every submission branches a new view fixed at the submission's index
//! and ships it to the crawler with the request; when the response comes back
//! the callback receives that view, so `add_exchange` knows where to record it.
//!
//! Branched views share the same `ContextState`, so counters, saved exchanges
//! and the failed flag are visible from every view of the invocation.
//!
//! ## Readiness
//!
//! Responses for different indices arrive in any order. A module that reasons
//! over several indices at once must wait for `all_responses_received()`,
//! typically checked at the end of its completion callback.

use crate::alert::{AlertValue, PublishOutcome};
use crate::callback::CallbackWrapper;
use crate::crawler::{CrawlTask, ResponseProcessor};
use crate::error::ScanError;
use crate::fingerprint::PageFingerprint;
use crate::http::{Request, Response};
use crate::orchestrator::{PathOrchestrator, PathState};
use crate::request_builder::RequestBuilder;
use crate::state::ContextState;
use std::sync::Arc;
use tracing::trace;

/// A check module's view of one invocation, optionally fixed at a correlation index.
#[derive(Clone)]
pub struct ModuleContext {
    orchestrator: Arc<PathOrchestrator>,
    request_builder: Arc<dyn RequestBuilder>,
    path_state: Arc<PathState>,
    current_index: Option<usize>,
    state: Arc<ContextState>,
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("path", &self.path_state.uri().as_str())
            .field("current_index", &self.current_index)
            .field("state", &self.state)
            .finish()
    }
}

impl ModuleContext {
    /// Creates a root context with fresh state and no index.
    pub fn new(
        orchestrator: Arc<PathOrchestrator>,
        request_builder: Arc<dyn RequestBuilder>,
        path_state: Arc<PathState>,
    ) -> Self {
        ModuleContext {
            orchestrator,
            request_builder,
            path_state,
            current_index: None,
            state: ContextState::new(),
        }
    }

    /// Branches a view over the same state, fixed at `index`.
    pub fn with_index(&self, index: usize) -> Self {
        ModuleContext {
            orchestrator: Arc::clone(&self.orchestrator),
            request_builder: Arc::clone(&self.request_builder),
            path_state: Arc::clone(&self.path_state),
            current_index: Some(index),
            state: Arc::clone(&self.state),
        }
    }

    pub fn path_state(&self) -> &Arc<PathState> {
        &self.path_state
    }

    pub fn orchestrator(&self) -> &Arc<PathOrchestrator> {
        &self.orchestrator
    }

    /// The index this view records against; `None` on a root view.
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    // --- submission ---

    /// Submits `request` at index 0.
    pub fn submit(&self, request: Request, callback: Arc<dyn ResponseProcessor>) {
        self.submit_at(request, callback, 0);
    }

    /// Submits `request`; its response will be delivered with a view fixed at `index`.
    pub fn submit_at(&self, request: Request, callback: Arc<dyn ResponseProcessor>, index: usize) {
        let sent = self.state.increment_sent_count();
        self.orchestrator.stats().increment_probes_submitted();
        trace!(
            "Submitting probe #{} at index {} for {}",
            sent,
            index,
            self.path_state.uri()
        );
        self.orchestrator.crawler().submit(CrawlTask {
            request,
            callback: self.wrap_callback(callback),
            context: self.with_index(index),
        });
    }

    fn wrap_callback(&self, callback: Arc<dyn ResponseProcessor>) -> Arc<dyn ResponseProcessor> {
        if self.orchestrator.request_logging_enabled() {
            CallbackWrapper::create_logging(Arc::clone(self.orchestrator.request_log()), callback)
        } else {
            CallbackWrapper::create(callback)
        }
    }

    /// Submits the builder's template request. No-op when there is none.
    pub fn submit_from_template(&self, callback: Arc<dyn ResponseProcessor>, index: usize) {
        if let Some(request) = self.request_builder.basic_request() {
            self.submit_at(request, callback, index);
        }
    }

    /// Submits the template with its injection point set to (or suffixed with) `value`.
    /// No-op when the builder has no such variant.
    pub fn submit_altered(
        &self,
        callback: Arc<dyn ResponseProcessor>,
        value: &str,
        append: bool,
        index: usize,
    ) {
        if let Some(request) = self.request_builder.altered_request(value, append) {
            self.submit_at(request, callback, index);
        }
    }

    /// Submits the template with its parameter renamed to `name`.
    pub fn submit_altered_parameter_name(
        &self,
        callback: Arc<dyn ResponseProcessor>,
        name: &str,
        index: usize,
    ) {
        if let Some(request) = self.request_builder.altered_parameter_name_request(name) {
            self.submit_at(request, callback, index);
        }
    }

    /// Submits one altered request per value, at indices `0..values.len()`.
    pub fn submit_multiple_altered<S: AsRef<str>>(
        &self,
        callback: Arc<dyn ResponseProcessor>,
        values: &[S],
        append: bool,
    ) {
        for (index, value) in values.iter().enumerate() {
            self.submit_altered(Arc::clone(&callback), value.as_ref(), append, index);
        }
    }

    // --- correlation state ---

    pub fn sent_count(&self) -> usize {
        self.state.sent_count()
    }

    pub fn received_count(&self) -> usize {
        self.state.received_count()
    }

    /// See `ContextState::all_responses_received`.
    pub fn all_responses_received(&self) -> bool {
        self.state.all_responses_received()
    }

    /// Records an exchange at this view's index.
    ///
    /// Fails with `ScanError::InvalidState` on a root view: there is no index to
    /// record against, which means the calling module is broken.
    pub fn add_exchange(&self, request: &Request, response: &Response) -> Result<(), ScanError> {
        let index = self.current_index.ok_or_else(|| {
            ScanError::InvalidState(
                "Cannot add request/response because index has not been specified".into(),
            )
        })?;
        self.add_exchange_at(index, request, response);
        Ok(())
    }

    /// Records an exchange at `index`, overwriting anything already there, then
    /// counts it as received.
    pub fn add_exchange_at(&self, index: usize, request: &Request, response: &Response) {
        let fingerprint = response.fingerprint();
        self.state.put(
            index,
            Arc::new(request.clone()),
            Arc::new(response.clone()),
            fingerprint,
        );
        self.state.increment_received_count();
        self.orchestrator.stats().increment_exchanges_recorded();
    }

    pub fn saved_request(&self, index: usize) -> Option<Arc<Request>> {
        self.state.get(index).request
    }

    pub fn saved_response(&self, index: usize) -> Option<Arc<Response>> {
        self.state.get(index).response
    }

    pub fn saved_fingerprint(&self, index: usize) -> Option<PageFingerprint> {
        self.state.get(index).fingerprint
    }

    /// False when either index has no fingerprint yet.
    pub fn fingerprints_match(&self, first: usize, second: usize) -> bool {
        match (self.saved_fingerprint(first), self.saved_fingerprint(second)) {
            (Some(a), Some(b)) => a.is_same(&b),
            _ => false,
        }
    }

    /// Compares the fingerprint saved at `index` with `fingerprint`.
    pub fn fingerprint_matches(&self, index: usize, fingerprint: Option<&PageFingerprint>) -> bool {
        match (fingerprint, self.saved_fingerprint(index)) {
            (Some(given), Some(saved)) => given.is_same(&saved),
            _ => false,
        }
    }

    pub fn mark_failed(&self) {
        self.state.set_failed();
    }

    pub fn has_failed(&self) -> bool {
        self.state.has_failed()
    }

    // --- diagnostics ---

    /// Logs the exchange and reports `message` with a reference to it.
    /// Returns the request-log id.
    pub fn error(&self, request: &Request, response: &Response, message: &str) -> u64 {
        let request_id = self
            .orchestrator
            .request_log()
            .append(request, response, &response.host());
        self.orchestrator.diagnostics().warn(&format!(
            "Error running module: {} (request logged with id={})",
            message, request_id
        ));
        request_id
    }

    /// Emits a diagnostic tagged with the path under test.
    pub fn debug(&self, message: &str) {
        self.orchestrator
            .debug(&format!("[{}] {}", self.path_state.uri(), message));
    }

    // --- analysis passes ---

    pub fn analyze_page(&self, request: &Request, response: &Response) {
        self.orchestrator.analyze_page(self, request, response);
    }

    pub fn content_checks(&self, request: &Request, response: &Response) {
        self.orchestrator.analyze_content(self, request, response);
    }

    /// Content checks followed by page analysis.
    pub fn response_checks(&self, request: &Request, response: &Response) {
        self.orchestrator.analyze_content(self, request, response);
        self.orchestrator.analyze_page(self, request, response);
    }

    /// `response_checks` on the exchange saved at `index`; no-op if it is missing.
    pub fn response_checks_at(&self, index: usize) {
        let saved = self.state.get(index);
        if let (Some(request), Some(response)) = (saved.request, saved.response) {
            self.response_checks(&request, &response);
        }
    }

    /// Pivot analysis, then content checks, then page analysis.
    pub fn pivot_checks(&self, request: &Request, response: &Response) {
        self.orchestrator.analyze_pivot(self, request, response);
        self.orchestrator.analyze_content(self, request, response);
        self.orchestrator.analyze_page(self, request, response);
    }

    // --- alerts ---

    /// Publishes an alert for this scan.
    ///
    /// With a `key`, at most one alert per key is kept per scan; later attempts
    /// are suppressed silently. Blank property names are skipped with a warning.
    pub fn publish_alert(
        &self,
        alert_type: &str,
        key: Option<&str>,
        message: Option<&str>,
        request: &Request,
        response: &Response,
        properties: &[(&str, AlertValue)],
    ) -> PublishOutcome {
        self.debug(&format!(
            "Publishing Alert: ({}) [{}] {}",
            alert_type,
            request.uri(),
            message.unwrap_or("")
        ));
        self.orchestrator.workspace().commit_alert(
            self.orchestrator.scan_id(),
            alert_type,
            key,
            message,
            request,
            response,
            properties,
        )
    }

    pub fn file_extension_list(&self) -> &[String] {
        self.orchestrator.file_extension_list()
    }
}
