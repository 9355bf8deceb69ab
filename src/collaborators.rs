//! Seams for the job kinds this crate routes but does not implement:
//! resolving a SeedPaper against the citation index, discovering editions
//! for it, and the Thinker-bibliography workflow. Each is an external
//! collaborator with a narrow trait interface; the Job Engine tracks their
//! lifecycle (locks the job, calls the trait, records the result) without
//! knowing how the work actually happens.

use crate::data::models::SeedPaper;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Binds a SeedPaper to its canonical external id in the citation index.
#[async_trait]
pub trait PaperResolver: Send + Sync {
    async fn resolve(&self, seed_paper: &SeedPaper) -> Result<String>;
}

/// Finds and registers Editions for a SeedPaper (initial discovery, or a
/// fetch-more pass scoped to one language).
#[async_trait]
pub trait EditionDiscovery: Send + Sync {
    /// Discover every known edition of `seed_paper`. Returns the number of
    /// editions created or updated.
    async fn discover_editions(&self, seed_paper: &SeedPaper) -> Result<u32>;

    /// Fetch additional editions restricted to `language`, optionally capped
    /// at `max_results`. Returns the number of editions created or updated.
    async fn fetch_more_editions(
        &self,
        seed_paper: &SeedPaper,
        language: &str,
        max_results: Option<u32>,
    ) -> Result<u32>;
}

/// The Thinker-bibliography workflow: discovering a thinker's own works and
/// harvesting citations against their full bibliography rather than a single
/// seed paper.
#[async_trait]
pub trait ThinkerBibliography: Send + Sync {
    async fn discover_works(&self, seed_paper_id: Uuid) -> Result<u32>;
    async fn harvest_citations(&self, seed_paper_id: Uuid) -> Result<u32>;
}

/// Placeholder collaborator wired in by default: every call fails with a
/// clear "not configured" error rather than panicking, so a job routed to an
/// unconfigured collaborator fails cleanly and is visible in `jobs.error`.
pub struct UnconfiguredCollaborator {
    pub name: &'static str,
}

#[async_trait]
impl PaperResolver for UnconfiguredCollaborator {
    async fn resolve(&self, _seed_paper: &SeedPaper) -> Result<String> {
        Err(anyhow::anyhow!("{} is not configured in this deployment", self.name))
    }
}

#[async_trait]
impl EditionDiscovery for UnconfiguredCollaborator {
    async fn discover_editions(&self, _seed_paper: &SeedPaper) -> Result<u32> {
        Err(anyhow::anyhow!("{} is not configured in this deployment", self.name))
    }

    async fn fetch_more_editions(&self, _seed_paper: &SeedPaper, _language: &str, _max_results: Option<u32>) -> Result<u32> {
        Err(anyhow::anyhow!("{} is not configured in this deployment", self.name))
    }
}

#[async_trait]
impl ThinkerBibliography for UnconfiguredCollaborator {
    async fn discover_works(&self, _seed_paper_id: Uuid) -> Result<u32> {
        Err(anyhow::anyhow!("{} is not configured in this deployment", self.name))
    }

    async fn harvest_citations(&self, _seed_paper_id: Uuid) -> Result<u32> {
        Err(anyhow::anyhow!("{} is not configured in this deployment", self.name))
    }
}
