//! Citation graph harvester: crawls a citation index, builds out the
//! citation graph for a seeded set of papers, and durably tracks harvest
//! progress across editions, languages, and author partitions.
//!
//! `main.rs` is a thin binary entrypoint; everything else lives here so
//! integration tests can exercise it directly.

pub mod buffer;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod events;
pub mod formatter;
pub mod harvest;
pub mod jobs;
pub mod llm;
pub mod logging;
pub mod partition;
pub mod search;
pub mod services;
pub mod status;
