//! # Builder Module
//!
//! Provides `ScanConfig` and `ScanBuilder`, a fluent API for assembling a
//! `PathOrchestrator` with its crawler, stores and modules.
//!
//! ## Overview
//!
//! Every collaborator is optional. Whatever is not supplied is filled in by
//! `build`:
//!
//! - **Crawler**: an `AsyncCrawler` over the configured `Downloader`, or over a
//!   `ReqwestDownloader` when no downloader is given either
//! - **Stores**: `InMemoryAlertStore` and `InMemoryRequestLog`
//! - **Diagnostics**: `TracingSink`
//!
//! ## Example
//!
//! ```rust,ignore
//! use probe_core::{ScanBuilder, ScanConfig};
//! use probe_core::modules::MetaTagModule;
//!
//! async fn setup() -> Result<(), ScanError> {
//!     let config = ScanConfig::from_path("scan.json")?;
//!     let orchestrator = ScanBuilder::with_config(config)
//!         .add_response_module(MetaTagModule::new())
//!         .add_check_module(MyCheck)
//!         .build()
//!         .await?;
//!
//!     orchestrator.process_crawled(path, request, response, builder).await;
//!     orchestrator.wait_until_idle().await;
//!     Ok(())
//! }
//! ```

use crate::alert::{AlertStore, InMemoryAlertStore};
use crate::crawler::{AsyncCrawler, Crawler, Downloader, ReqwestDownloader};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::dispatch::ResponseDispatcher;
use crate::error::ScanError;
use crate::module::{CheckModule, ResponseModule};
use crate::orchestrator::PathOrchestrator;
use crate::request_log::{InMemoryRequestLog, RequestLog};
use crate::stats::ScanStats;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Settings for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Identifier alerts and deduplication keys are scoped to.
    pub scan_id: u64,
    /// File extensions modules may probe for.
    pub file_extensions: Vec<String>,
    /// Whether every probe exchange is appended to the request log.
    pub request_logging: bool,
    /// The maximum number of probe downloads in flight.
    pub max_concurrent_requests: usize,
    /// The number of workers running response modules.
    pub dispatch_workers: usize,
    /// The capacity of the response dispatch queue.
    pub channel_capacity: usize,
    /// Per-request timeout of the default downloader, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            scan_id: 0,
            file_extensions: ["php", "asp", "aspx", "jsp", "cgi", "pl", "py", "html"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            request_logging: false,
            max_concurrent_requests: num_cpus::get().max(16),
            dispatch_workers: num_cpus::get().clamp(2, 8),
            channel_capacity: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl ScanConfig {
    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ScanError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.max_concurrent_requests == 0 {
            return Err(ScanError::ConfigurationError(
                "max_concurrent_requests must be greater than 0".into(),
            ));
        }
        if self.dispatch_workers == 0 {
            return Err(ScanError::ConfigurationError(
                "dispatch_workers must be greater than 0".into(),
            ));
        }
        if self.max_concurrent_requests > Semaphore::MAX_PERMITS {
            return Err(ScanError::ConfigurationError(format!(
                "max_concurrent_requests must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.dispatch_workers > Semaphore::MAX_PERMITS {
            return Err(ScanError::ConfigurationError(format!(
                "dispatch_workers must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ScanError::ConfigurationError(
                "channel_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ScanBuilder {
    config: ScanConfig,
    crawler: Option<Arc<dyn Crawler>>,
    downloader: Option<Arc<dyn Downloader>>,
    alert_store: Option<Arc<dyn AlertStore>>,
    request_log: Option<Arc<dyn RequestLog>>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    stats: Option<Arc<ScanStats>>,
    check_modules: Vec<Arc<dyn CheckModule>>,
    response_modules: Vec<Arc<dyn ResponseModule>>,
}

impl ScanBuilder {
    /// Creates a builder with the default config for `scan_id`.
    pub fn new(scan_id: u64) -> Self {
        Self::with_config(ScanConfig {
            scan_id,
            ..ScanConfig::default()
        })
    }

    pub fn with_config(config: ScanConfig) -> Self {
        ScanBuilder {
            config,
            ..Default::default()
        }
    }

    /// Sets the file extensions exposed to modules.
    pub fn file_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.file_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables logging of every probe exchange.
    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.request_logging = enabled;
        self
    }

    /// Sets the maximum number of concurrent probe downloads.
    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    /// Sets the number of response-module workers.
    pub fn dispatch_workers(mut self, workers: usize) -> Self {
        self.config.dispatch_workers = workers;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Uses a custom crawler. Takes precedence over `downloader`.
    pub fn crawler(mut self, crawler: Arc<dyn Crawler>) -> Self {
        self.crawler = Some(crawler);
        self
    }

    /// Uses a custom downloader for the default `AsyncCrawler`.
    pub fn downloader<D: Downloader>(mut self, downloader: D) -> Self {
        self.downloader = Some(Arc::new(downloader));
        self
    }

    pub fn alert_store(mut self, store: Arc<dyn AlertStore>) -> Self {
        self.alert_store = Some(store);
        self
    }

    pub fn request_log(mut self, log: Arc<dyn RequestLog>) -> Self {
        self.request_log = Some(log);
        self
    }

    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn stats(mut self, stats: Arc<ScanStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Adds a check module. Modules run in registration order.
    pub fn add_check_module<M: CheckModule>(mut self, module: M) -> Self {
        self.check_modules.push(Arc::new(module));
        self
    }

    /// Adds a check module the caller keeps a handle to.
    pub fn add_shared_check_module(mut self, module: Arc<dyn CheckModule>) -> Self {
        self.check_modules.push(module);
        self
    }

    /// Adds a response module. Modules run in registration order.
    pub fn add_response_module<M: ResponseModule>(mut self, module: M) -> Self {
        self.response_modules.push(Arc::new(module));
        self
    }

    /// Builds the orchestrator and spawns its workers on the current tokio runtime.
    pub async fn build(self) -> Result<Arc<PathOrchestrator>, ScanError> {
        self.config.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ScanError::ConfigurationError(
                "ScanBuilder::build must run inside a tokio runtime".into(),
            ));
        }

        let stats = self.stats.unwrap_or_else(|| Arc::new(ScanStats::new()));

        let crawler: Arc<dyn Crawler> = match self.crawler {
            Some(crawler) => crawler,
            None => {
                let downloader: Arc<dyn Downloader> = match self.downloader {
                    Some(downloader) => downloader,
                    None => Arc::new(ReqwestDownloader::new(Duration::from_secs(
                        self.config.request_timeout_secs,
                    ))?),
                };
                AsyncCrawler::spawn(
                    downloader,
                    self.config.max_concurrent_requests,
                    Arc::clone(&stats),
                )
            }
        };

        let workspace = Workspace::new(
            self.alert_store
                .unwrap_or_else(|| Arc::new(InMemoryAlertStore::new())),
            self.request_log
                .unwrap_or_else(|| Arc::new(InMemoryRequestLog::new())),
            self.diagnostics.unwrap_or_else(|| Arc::new(TracingSink)),
            Arc::clone(&stats),
        );

        let dispatcher = ResponseDispatcher::spawn(
            self.config.dispatch_workers,
            self.config.channel_capacity,
            stats,
        );

        debug!(
            "Scan {} assembled with {} check modules and {} response modules",
            self.config.scan_id,
            self.check_modules.len(),
            self.response_modules.len()
        );

        Ok(PathOrchestrator::new(
            self.config,
            crawler,
            workspace,
            self.check_modules,
            self.response_modules,
            dispatcher,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::task::{Context, Poll, Wake, Waker};

    #[test]
    fn test_partial_json_config_keeps_defaults() {
        let config =
            ScanConfig::from_json_str(r#"{"scan_id": 7, "request_logging": true}"#).unwrap();
        assert_eq!(config.scan_id, 7);
        assert!(config.request_logging);
        assert_eq!(config.channel_capacity, 1000);
        assert!(!config.file_extensions.is_empty());
    }

    #[test]
    fn test_malformed_json_is_a_serialization_error() {
        let err = ScanConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ScanError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let err = ScanBuilder::new(1)
            .max_concurrent_requests(0)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ConfigurationError(_)));
    }

    #[test]
    fn test_worker_counts_above_semaphore_limit_are_rejected() {
        let config = ScanConfig {
            max_concurrent_requests: Semaphore::MAX_PERMITS + 1,
            ..ScanConfig::default()
        };
        assert!(matches!(config.validate(), Err(ScanError::ConfigurationError(_))));

        let config: ScanConfig =
            serde_json::from_value(serde_json::json!({ "dispatch_workers": usize::MAX })).unwrap();
        assert!(matches!(config.validate(), Err(ScanError::ConfigurationError(_))));
    }

    struct NoopWake;

    impl Wake for NoopWake {
        fn wake(self: Arc<Self>) {}
    }

    #[test]
    fn test_build_outside_runtime_is_a_configuration_error() {
        let waker = Waker::from(Arc::new(NoopWake));
        let mut cx = Context::from_waker(&waker);
        let mut build = Box::pin(ScanBuilder::new(1).build());

        match build.as_mut().poll(&mut cx) {
            Poll::Ready(Err(ScanError::ConfigurationError(msg))) => {
                assert!(msg.contains("tokio runtime"))
            }
            Poll::Ready(other) => panic!("unexpected build result: {:?}", other.map(|_| ())),
            Poll::Pending => panic!("build should not wait on anything"),
        }
    }

    #[tokio::test]
    async fn test_build_fills_defaults() {
        let orchestrator = ScanBuilder::new(3)
            .file_extensions(["php", "bak"])
            .request_logging(true)
            .build()
            .await
            .unwrap();

        assert_eq!(orchestrator.scan_id(), 3);
        assert_eq!(orchestrator.file_extension_list(), ["php", "bak"]);
        assert!(orchestrator.request_logging_enabled());
        assert!(orchestrator.crawler().is_idle());
    }
}
