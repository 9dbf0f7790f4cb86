//! A "prelude" for users of the `probe-core` crate.
//!
//! This prelude re-exports the traits and structs needed to write and run
//! check modules, so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use probe_core::prelude::*;
//! ```

pub use crate::{
    // Core structs
    ModuleContext,
    PathOrchestrator,
    PathState,
    Request,
    Response,
    ScanBuilder,
    ScanConfig,
    ScanError,
    // Core traits
    CheckModule,
    Crawler,
    Downloader,
    RequestBuilder,
    ResponseModule,
    ResponseProcessor,
    // Request builders
    ParameterRequestBuilder,
    PathRequestBuilder,
    // Alerts
    AlertValue,
    PublishOutcome,
    // Essential re-exports for trait implementation
    async_trait,
};

pub use crate::modules::MetaTagModule;
