//! Decorator for probe completion callbacks.

use crate::context::ModuleContext;
use crate::crawler::ResponseProcessor;
use crate::error::ScanError;
use crate::http::{Request, Response};
use crate::request_log::RequestLog;
use std::sync::Arc;
use tracing::trace;

/// Wraps a `ResponseProcessor`, optionally appending every completed exchange to
/// the request log before the wrapped callback runs.
pub struct CallbackWrapper {
    inner: Arc<dyn ResponseProcessor>,
    request_log: Option<Arc<dyn RequestLog>>,
}

impl CallbackWrapper {
    /// A pass-through wrapper.
    pub fn create(inner: Arc<dyn ResponseProcessor>) -> Arc<Self> {
        Arc::new(CallbackWrapper {
            inner,
            request_log: None,
        })
    }

    /// A wrapper that logs each exchange to `request_log` first.
    pub fn create_logging(
        request_log: Arc<dyn RequestLog>,
        inner: Arc<dyn ResponseProcessor>,
    ) -> Arc<Self> {
        Arc::new(CallbackWrapper {
            inner,
            request_log: Some(request_log),
        })
    }
}

impl ResponseProcessor for CallbackWrapper {
    fn process_response(&self, request: &Request, response: &Response, ctx: &ModuleContext) {
        if let Some(log) = &self.request_log {
            let id = log.append(request, response, &response.host());
            trace!("Logged probe exchange {} for {}", id, request.url);
        }
        self.inner.process_response(request, response, ctx);
    }

    fn process_exception(&self, request: &Request, error: &ScanError, ctx: &ModuleContext) {
        self.inner.process_exception(request, error, ctx);
    }
}
