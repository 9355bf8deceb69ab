//! Thin event-publishing wrappers around [`crate::data`]'s query layer.

pub mod aggregate;
pub mod citations;
pub mod context;
pub mod editions;
pub mod failed_fetches;
pub mod harvest_targets;
pub mod jobs;
pub mod partitions;
pub mod seed_papers;

pub use context::DbContext;
