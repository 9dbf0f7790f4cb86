//! # Path Orchestrator
//!
//! The scan-wide coordinator handed to every `ModuleContext`.
//!
//! ## Overview
//!
//! For each crawled path the host calls `process_crawled`. The orchestrator
//! queues the response for the passive `ResponseModule`s and runs every
//! `CheckModule` with a fresh root `ModuleContext`. Probes those modules submit
//! flow through the shared `Crawler`; their callbacks run on crawler workers.
//!
//! It also owns the scan's collaborators (alert store, request log, diagnostics
//! sink, statistics) through a `Workspace`, and fans the page, content and pivot
//! analysis passes out to every check module.
//!
//! Orchestrators are assembled with `ScanBuilder`.

use crate::alert::AlertStore;
use crate::builder::ScanConfig;
use crate::context::ModuleContext;
use crate::crawler::Crawler;
use crate::diagnostics::DiagnosticSink;
use crate::dispatch::{ResponseDispatchTask, ResponseDispatcher};
use crate::http::{Request, Response};
use crate::module::{CheckModule, ResponseModule};
use crate::request_builder::RequestBuilder;
use crate::request_log::RequestLog;
use crate::stats::ScanStats;
use crate::workspace::Workspace;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// The crawled path a module invocation is testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathState {
    uri: Url,
}

impl PathState {
    pub fn new(uri: Url) -> Arc<Self> {
        Arc::new(PathState { uri })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }
}

/// Coordinates check modules, response modules and the crawler for one scan.
pub struct PathOrchestrator {
    config: ScanConfig,
    crawler: Arc<dyn Crawler>,
    workspace: Workspace,
    check_modules: Vec<Arc<dyn CheckModule>>,
    response_modules: Arc<Vec<Arc<dyn ResponseModule>>>,
    dispatcher: ResponseDispatcher,
}

impl PathOrchestrator {
    pub(crate) fn new(
        config: ScanConfig,
        crawler: Arc<dyn Crawler>,
        workspace: Workspace,
        check_modules: Vec<Arc<dyn CheckModule>>,
        response_modules: Vec<Arc<dyn ResponseModule>>,
        dispatcher: ResponseDispatcher,
    ) -> Arc<Self> {
        Arc::new(PathOrchestrator {
            config,
            crawler,
            workspace,
            check_modules,
            response_modules: Arc::new(response_modules),
            dispatcher,
        })
    }

    pub fn scan_id(&self) -> u64 {
        self.config.scan_id
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn crawler(&self) -> &Arc<dyn Crawler> {
        &self.crawler
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn alert_store(&self) -> &Arc<dyn AlertStore> {
        self.workspace.alert_store()
    }

    pub fn request_log(&self) -> &Arc<dyn RequestLog> {
        self.workspace.request_log()
    }

    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        self.workspace.diagnostics()
    }

    pub fn stats(&self) -> &Arc<ScanStats> {
        self.workspace.stats()
    }

    pub fn file_extension_list(&self) -> &[String] {
        &self.config.file_extensions
    }

    pub fn request_logging_enabled(&self) -> bool {
        self.config.request_logging
    }

    pub fn debug(&self, message: &str) {
        self.workspace.diagnostics().debug(message);
    }

    pub fn analyze_page(&self, ctx: &ModuleContext, request: &Request, response: &Response) {
        for module in &self.check_modules {
            module.analyze_page(ctx, request, response);
        }
    }

    pub fn analyze_content(&self, ctx: &ModuleContext, request: &Request, response: &Response) {
        for module in &self.check_modules {
            module.analyze_content(ctx, request, response);
        }
    }

    pub fn analyze_pivot(&self, ctx: &ModuleContext, request: &Request, response: &Response) {
        for module in &self.check_modules {
            module.analyze_pivot(ctx, request, response);
        }
    }

    /// Queues `request`/`response` for the response modules.
    pub async fn dispatch_response(&self, request: Request, response: Response) {
        if self.response_modules.is_empty() {
            return;
        }
        self.dispatcher
            .dispatch(ResponseDispatchTask {
                scan_id: self.scan_id(),
                request: Arc::new(request),
                response: Arc::new(response),
                workspace: self.workspace.clone(),
                modules: Arc::clone(&self.response_modules),
            })
            .await;
    }

    /// Runs every check module against `path`, each with its own root context.
    pub fn run_check_modules(self: &Arc<Self>, path: &Arc<PathState>, builder: Arc<dyn RequestBuilder>) {
        for module in &self.check_modules {
            trace!("Running check module '{}' on {}", module.name(), path.uri());
            let ctx = ModuleContext::new(Arc::clone(self), Arc::clone(&builder), Arc::clone(path));
            Arc::clone(module).run(&ctx);
        }
    }

    /// Handles one crawled path: passive checks on its response, then every
    /// active check module.
    pub async fn process_crawled(
        self: &Arc<Self>,
        path: Arc<PathState>,
        request: Request,
        response: Response,
        builder: Arc<dyn RequestBuilder>,
    ) {
        debug!("Processing crawled path {}", path.uri());
        self.dispatch_response(request, response).await;
        self.run_check_modules(&path, builder);
    }

    /// Resolves once the crawler and the dispatcher have both drained.
    pub async fn wait_until_idle(&self) {
        loop {
            if self.crawler.is_idle() && self.dispatcher.is_idle() {
                // A callback may enqueue more work just as the crawler drains.
                tokio::time::sleep(Duration::from_millis(20)).await;
                if self.crawler.is_idle() && self.dispatcher.is_idle() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        trace!("Scan {} is idle", self.scan_id());
    }
}

impl std::fmt::Debug for PathOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathOrchestrator")
            .field("scan_id", &self.config.scan_id)
            .field("check_modules", &self.check_modules.len())
            .field("response_modules", &self.response_modules.len())
            .finish()
    }
}
