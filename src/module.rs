//! # Module Traits
//!
//! Defines the two kinds of pluggable security checks driven by the orchestrator.
//!
//! ## Overview
//!
//! - **CheckModule**: an active check. It is run once per crawled path with a
//!   fresh root `ModuleContext`, submits probe requests through it, and reasons
//!   over the correlated responses once they have all arrived. It can also hook
//!   the page, content and pivot analysis passes that other modules trigger.
//! - **ResponseModule**: a passive check. It is handed every crawled response,
//!   in registration order, by a `ResponseDispatchTask`.
//!
//! The orchestrator holds both kinds as ordered `Vec<Arc<dyn ...>>` and calls them
//! uniformly.
//!
//! ## Example
//!
//! ```rust,ignore
//! use probe_core::prelude::*;
//! use std::sync::Arc;
//!
//! struct BlindSqli;
//!
//! impl CheckModule for BlindSqli {
//!     fn name(&self) -> &str {
//!         "blind-sqli"
//!     }
//!
//!     fn run(self: Arc<Self>, ctx: &ModuleContext) {
//!         ctx.submit_multiple_altered(self, &["' AND '1'='1", "' AND '1'='2"], true);
//!     }
//! }
//!
//! impl ResponseProcessor for BlindSqli {
//!     fn process_response(&self, req: &Request, res: &Response, ctx: &ModuleContext) {
//!         if ctx.add_exchange(req, res).is_err() || !ctx.all_responses_received() {
//!             return;
//!         }
//!         if !ctx.fingerprints_match(0, 1) {
//!             ctx.publish_alert("sqli-blind", Some("sqli-blind"), Some("Boolean-based blind SQL injection"), req, res, &[]);
//!         }
//!     }
//! }
//! ```

use crate::context::ModuleContext;
use crate::error::ScanError;
use crate::http::{Request, Response};
use crate::workspace::Workspace;
use std::sync::Arc;

/// An active, per-path security check.
pub trait CheckModule: Send + Sync + 'static {
    /// Stable identifier used in diagnostics.
    fn name(&self) -> &str;

    /// Entry point for one crawled path. `ctx` is a fresh root context.
    fn run(self: Arc<Self>, _ctx: &ModuleContext) {}

    /// Page analysis pass.
    fn analyze_page(&self, _ctx: &ModuleContext, _request: &Request, _response: &Response) {}

    /// Content analysis pass.
    fn analyze_content(&self, _ctx: &ModuleContext, _request: &Request, _response: &Response) {}

    /// Pivot analysis pass: a response that may expose new injection points.
    fn analyze_pivot(&self, _ctx: &ModuleContext, _request: &Request, _response: &Response) {}
}

/// A passive check run against every crawled response.
pub trait ResponseModule: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Inspects one response. An error aborts the remaining modules for this
    /// response only.
    fn process_response(
        &self,
        scan_id: u64,
        request: &Request,
        response: &Response,
        workspace: &Workspace,
    ) -> Result<(), ScanError>;
}
