//! Database operations, organized per entity.

pub mod citations;
pub mod editions;
pub mod failed_fetches;
pub mod harvest_targets;
pub mod jobs;
pub mod models;
pub mod partitions;
pub mod seed_papers;
