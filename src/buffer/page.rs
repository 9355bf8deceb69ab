//! The durable page buffer: a write-ahead record of scraped pages
//! that survives DB outages and supports retry.

use crate::error::BufferError;
use crate::search::ParsedResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedPage {
    pub job_id: Uuid,
    pub seed_paper_id: Uuid,
    pub edition_id: Uuid,
    /// The canonical edition citations are recorded against, if this page
    /// came from a merged-in descendant edition's external id.
    pub target_edition_id: Uuid,
    pub partition_key: String,
    pub page_num: u32,
    pub papers: Vec<ParsedResult>,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl BufferedPage {
    fn filename(job_id: Uuid, page_num: u32) -> String {
        format!("job_{job_id}_page_{page_num}.json")
    }
}

/// A filesystem-backed write-ahead buffer rooted at `directory`, with
/// `./`, `./failed/`, `./permanent_failed/` subdirectories.
pub struct PageBuffer {
    root: PathBuf,
    max_retries: u32,
}

impl PageBuffer {
    pub async fn new(root: PathBuf, max_retries: u32) -> Result<Self, BufferError> {
        tokio::fs::create_dir_all(&root).await?;
        tokio::fs::create_dir_all(root.join("failed")).await?;
        tokio::fs::create_dir_all(root.join("permanent_failed")).await?;
        Ok(Self { root, max_retries })
    }

    fn in_progress_path(&self, job_id: Uuid, page_num: u32) -> PathBuf {
        self.root.join(BufferedPage::filename(job_id, page_num))
    }

    fn failed_path(&self, job_id: Uuid, page_num: u32) -> PathBuf {
        self.root.join("failed").join(BufferedPage::filename(job_id, page_num))
    }

    fn permanent_failed_path(&self, job_id: Uuid, page_num: u32) -> PathBuf {
        self.root
            .join("permanent_failed")
            .join(BufferedPage::filename(job_id, page_num))
    }

    /// Append an in-progress record. Written before the harvester attempts
    /// the Citation upsert, so a crash mid-write still leaves the page
    /// recoverable.
    pub async fn save_page(&self, page: &BufferedPage) -> Result<(), BufferError> {
        let path = self.in_progress_path(page.job_id, page.page_num);
        let json = serde_json::to_vec_pretty(page)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Remove the in-progress file (and any retryable copy) once the
    /// Citation upsert has committed.
    pub async fn mark_saved(&self, job_id: Uuid, page_num: u32) -> Result<(), BufferError> {
        remove_if_exists(&self.in_progress_path(job_id, page_num)).await?;
        remove_if_exists(&self.failed_path(job_id, page_num)).await?;
        Ok(())
    }

    /// Move a page to the retryable queue after a DB failure, incrementing
    /// `retry_count`. Once that exceeds `max_retries`, the page is moved to
    /// `permanent_failed/` instead.
    pub async fn mark_failed(
        &self,
        mut page: BufferedPage,
        err: &str,
    ) -> Result<(), BufferError> {
        page.retry_count += 1;
        page.last_error = Some(err.to_string());

        remove_if_exists(&self.in_progress_path(page.job_id, page.page_num)).await?;

        let json = serde_json::to_vec_pretty(&page)?;
        if page.retry_count > self.max_retries {
            tokio::fs::write(self.permanent_failed_path(page.job_id, page.page_num), json).await?;
            remove_if_exists(&self.failed_path(page.job_id, page.page_num)).await?;
        } else {
            tokio::fs::write(self.failed_path(page.job_id, page.page_num), json).await?;
        }
        Ok(())
    }

    /// List retryable pages still under the retry cap.
    pub async fn pending_pages(&self) -> Result<Vec<BufferedPage>, BufferError> {
        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(self.root.join("failed")).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let bytes = tokio::fs::read(entry.path()).await?;
                let page: BufferedPage = serde_json::from_slice(&bytes)?;
                if page.retry_count <= self.max_retries {
                    pages.push(page);
                }
            }
        }
        Ok(pages)
    }

    /// Remove stale in-progress files older than `max_age`, left behind by
    /// a job whose process died before even reaching the retry path.
    pub async fn cleanup_old(&self, max_age: std::time::Duration) -> Result<u32, BufferError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let bytes = tokio::fs::read(entry.path()).await?;
            if let Ok(page) = serde_json::from_slice::<BufferedPage>(&bytes) {
                if page.created_at < cutoff {
                    tokio::fs::remove_file(entry.path()).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), BufferError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page(job_id: Uuid, page_num: u32) -> BufferedPage {
        BufferedPage {
            job_id,
            seed_paper_id: Uuid::new_v4(),
            edition_id: Uuid::new_v4(),
            target_edition_id: Uuid::new_v4(),
            partition_key: "2020".to_string(),
            page_num,
            papers: vec![],
            created_at: Utc::now(),
            retry_count: 0,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn save_then_mark_saved_removes_file() {
        let dir = tempdir();
        let buffer = PageBuffer::new(dir.clone(), 5).await.unwrap();
        let job_id = Uuid::new_v4();
        buffer.save_page(&sample_page(job_id, 2)).await.unwrap();
        assert!(buffer.in_progress_path(job_id, 2).exists());
        buffer.mark_saved(job_id, 2).await.unwrap();
        assert!(!buffer.in_progress_path(job_id, 2).exists());
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn mark_failed_moves_to_permanent_after_max_retries() {
        let dir = tempdir();
        let buffer = PageBuffer::new(dir.clone(), 2).await.unwrap();
        let job_id = Uuid::new_v4();
        let mut page = sample_page(job_id, 1);
        page.retry_count = 2;
        buffer.mark_failed(page, "boom").await.unwrap();
        assert!(buffer.permanent_failed_path(job_id, 1).exists());
        assert!(!buffer.failed_path(job_id, 1).exists());
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    fn tempdir() -> PathBuf {
        std::env::temp_dir().join(format!("citegraph-harvester-test-{}", Uuid::new_v4()))
    }
}
