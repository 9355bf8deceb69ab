//! The Partition Planner.

pub mod planner;

pub use planner::{HarvestableQuery, PartitionPlanner, PlanRequest, MAX_RECURSION_DEPTH, MAX_TERM_ATTEMPTS, STUCK_THRESHOLD};
