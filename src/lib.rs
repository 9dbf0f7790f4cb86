//! # probe-core
//!
//! Module-execution and response-correlation engine for web vulnerability
//! scanning.
//!
//! A scan is driven by a `PathOrchestrator`. For every crawled path it runs the
//! registered check modules, each with its own `ModuleContext`. A module
//! submits probe requests through the context, the crawler downloads them
//! concurrently, and each response comes back to the module's callback tagged
//! with the correlation index it was submitted under. Once every probe has been
//! answered the module compares the saved exchanges (typically by page
//! fingerprint) and publishes deduplicated alerts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use probe_core::prelude::*;
//! use std::sync::Arc;
//!
//! async fn scan(request: Request, response: Response) -> Result<(), ScanError> {
//!     let orchestrator = ScanBuilder::new(1)
//!         .add_check_module(MyCheck)
//!         .add_response_module(MetaTagModule::new())
//!         .build()
//!         .await?;
//!
//!     let path = PathState::new(request.url.clone());
//!     for builder in ParameterRequestBuilder::for_each_parameter(&request) {
//!         orchestrator
//!             .process_crawled(Arc::clone(&path), request.clone(), response.clone(), Arc::new(builder))
//!             .await;
//!     }
//!     orchestrator.wait_until_idle().await;
//!     println!("{}", orchestrator.stats());
//!     Ok(())
//! }
//! ```

pub mod alert;
pub mod builder;
pub mod callback;
pub mod context;
pub mod crawler;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod module;
pub mod modules;
pub mod orchestrator;
pub mod prelude;
pub mod request_builder;
pub mod request_log;
pub mod state;
pub mod stats;
pub mod workspace;

pub use alert::{Alert, AlertStore, AlertValue, InMemoryAlertStore, PublishOutcome};
pub use builder::{ScanBuilder, ScanConfig};
pub use context::ModuleContext;
pub use crawler::{AsyncCrawler, CrawlTask, Crawler, Downloader, ReqwestDownloader, ResponseProcessor};
pub use error::ScanError;
pub use fingerprint::PageFingerprint;
pub use http::{Request, Response};
pub use module::{CheckModule, ResponseModule};
pub use orchestrator::{PathOrchestrator, PathState};
pub use request_builder::{ParameterRequestBuilder, PathRequestBuilder, RequestBuilder};
pub use request_log::{InMemoryRequestLog, RequestLog};
pub use stats::ScanStats;
pub use workspace::Workspace;

pub use async_trait::async_trait;
pub use dashmap::DashMap;
pub use tokio;
