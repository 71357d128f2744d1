//! Writes final file states to disk, one path at a time.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::fs::FileSystem;
use crate::operation::{FileState, FinalFileStates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStatus {
    Success,
    Failed,
    /// Already in the desired state
    Skipped,
}

/// Result for a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub file_path: String,
    pub status: ApplyStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApplyOutcome {
    fn success(file_path: &str, message: String) -> Self {
        Self {
            file_path: file_path.to_string(),
            status: ApplyStatus::Success,
            message,
            error: None,
        }
    }

    fn skipped(file_path: &str, message: String) -> Self {
        Self {
            file_path: file_path.to_string(),
            status: ApplyStatus::Skipped,
            message,
            error: None,
        }
    }

    fn failed(file_path: &str, message: String, error: std::io::Error) -> Self {
        Self {
            file_path: file_path.to_string(),
            status: ApplyStatus::Failed,
            message,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate over every processed path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    /// One human-readable line per path
    pub summary: Vec<String>,
    pub outcomes: Vec<ApplyOutcome>,
}

impl ApplySummary {
    pub fn from_outcomes(outcomes: Vec<ApplyOutcome>) -> Self {
        let count = |status: ApplyStatus| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            success_count: count(ApplyStatus::Success),
            failed_count: count(ApplyStatus::Failed),
            skipped_count: count(ApplyStatus::Skipped),
            summary: outcomes.iter().map(|o| o.message.clone()).collect(),
            outcomes,
        }
    }

    pub fn total(&self) -> usize {
        self.success_count + self.failed_count + self.skipped_count
    }
}

/// Materializes [`FinalFileStates`] under a root directory
pub struct Applier {
    fs: Arc<dyn FileSystem>,
}

impl Applier {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Apply every state independently. A failed path never stops the others,
    /// and nothing already written is rolled back.
    pub async fn apply(&self, states: &FinalFileStates, root: &Path) -> ApplySummary {
        let mut outcomes = Vec::with_capacity(states.len());

        for (file_path, state) in states {
            let outcome = match state {
                FileState::Delete => self.apply_delete(file_path, root).await,
                FileState::Content(content) => self.apply_write(file_path, content, root).await,
            };
            match outcome.status {
                ApplyStatus::Failed => tracing::error!("{}", outcome.message),
                _ => tracing::debug!("{}", outcome.message),
            }
            outcomes.push(outcome);
        }

        let summary = ApplySummary::from_outcomes(outcomes);
        tracing::info!(
            "Applied {} file(s): {} succeeded, {} failed, {} skipped",
            summary.total(),
            summary.success_count,
            summary.failed_count,
            summary.skipped_count
        );
        summary
    }

    async fn apply_delete(&self, file_path: &str, root: &Path) -> ApplyOutcome {
        let path = root.join(file_path);
        match self.fs.exists(&path).await {
            Ok(false) => ApplyOutcome::skipped(file_path, format!("Skipped {}: already absent", file_path)),
            Ok(true) => match self.fs.delete(&path).await {
                Ok(()) => ApplyOutcome::success(file_path, format!("Deleted {}", file_path)),
                Err(e) => ApplyOutcome::failed(file_path, format!("Failed to delete {}: {}", file_path, e), e),
            },
            Err(e) => ApplyOutcome::failed(file_path, format!("Failed to check {}: {}", file_path, e), e),
        }
    }

    async fn apply_write(&self, file_path: &str, content: &str, root: &Path) -> ApplyOutcome {
        let path = root.join(file_path);
        if let Some(parent) = path.parent() {
            if let Err(e) = self.fs.ensure_dir(parent).await {
                return ApplyOutcome::failed(
                    file_path,
                    format!("Failed to create directory for {}: {}", file_path, e),
                    e,
                );
            }
        }

        match self.fs.write(&path, content).await {
            Ok(()) => ApplyOutcome::success(file_path, format!("Wrote {}", file_path)),
            Err(e) => ApplyOutcome::failed(file_path, format!("Failed to write {}: {}", file_path, e), e),
        }
    }
}
