//! # Crawler Module
//!
//! The capability through which check modules get probe requests onto the wire.
//!
//! ## Overview
//!
//! Submission is non-blocking: a module hands the crawler a `CrawlTask` and
//! returns. The crawler later invokes the task's callback, on one of its own
//! workers, with the response and with the correlation context that was
//! captured at submission time. No ordering is guaranteed between tasks.
//!
//! ## Key Components
//!
//! - **Crawler**: The submission capability consumed by `ModuleContext`
//! - **ResponseProcessor**: The completion callback implemented by check modules
//! - **CrawlTask**: The explicit request/callback/context message
//! - **AsyncCrawler**: A tokio-based crawler driven by a `Downloader`
//! - **Downloader**: The transport seam, with a `reqwest` implementation

mod core;
mod downloader;

pub use self::core::AsyncCrawler;
pub use downloader::{Downloader, ReqwestDownloader};

use crate::context::ModuleContext;
use crate::error::ScanError;
use crate::http::{Request, Response};
use std::sync::Arc;
use tracing::warn;

/// Completion callback for a submitted probe request.
pub trait ResponseProcessor: Send + Sync {
    /// Called with the response and the context the request was submitted with.
    fn process_response(&self, request: &Request, response: &Response, ctx: &ModuleContext);

    /// Called instead of `process_response` when the request could not be completed.
    fn process_exception(&self, request: &Request, error: &ScanError, ctx: &ModuleContext) {
        warn!(
            "Probe request {} (index {:?}) failed: {}",
            request.url,
            ctx.current_index(),
            error
        );
    }
}

/// One submission: the request, its completion callback and the correlation
/// context to hand back verbatim.
#[derive(Clone)]
pub struct CrawlTask {
    pub request: Request,
    pub callback: Arc<dyn ResponseProcessor>,
    pub context: ModuleContext,
}

impl std::fmt::Debug for CrawlTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlTask")
            .field("request", &self.request.url.as_str())
            .field("index", &self.context.current_index())
            .finish()
    }
}

/// Asynchronous request submission. At most one completion per task.
pub trait Crawler: Send + Sync {
    fn submit(&self, task: CrawlTask);

    /// True when no submitted task is still waiting for completion.
    fn is_idle(&self) -> bool {
        true
    }
}
