//! Domain event types.

use uuid::Uuid;

/// Unified enum for all domain events flowing through the [`EventBuffer`](crate::events::EventBuffer).
#[derive(Debug, Clone)]
pub enum DomainEvent {
    Job(JobEvent),
    HarvestTarget(HarvestTargetEvent),
}

/// Lifecycle events for rows in the `jobs` table.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Created {
        id: Uuid,
        kind: String,
    },
    Locked {
        id: Uuid,
    },
    Completed {
        id: Uuid,
        kind: String,
    },
    Failed {
        id: Uuid,
        kind: String,
        error: String,
    },
    Exhausted {
        id: Uuid,
        kind: String,
        attempts: i32,
    },
}

/// Progress events for a harvest target (an edition/year/letter/partition
/// unit of work) as it moves toward completion.
#[derive(Debug, Clone)]
pub enum HarvestTargetEvent {
    Progress {
        id: Uuid,
        fetched_count: i64,
        reported_count: i64,
    },
    Completed {
        id: Uuid,
        gap_reason: Option<String>,
    },
    Stalled {
        id: Uuid,
        consecutive_stalls: u32,
    },
}
