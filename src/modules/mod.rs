//! Built-in modules.

pub mod meta_tags;

pub use meta_tags::MetaTagModule;
