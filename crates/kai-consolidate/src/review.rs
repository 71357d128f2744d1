//! Optional human review of pending changes before they are applied.

use async_trait::async_trait;
use similar::TextDiff;
use std::path::Path;

use crate::error::Result;
use crate::fs::FileSystem;
use crate::operation::{FileState, FinalFileStates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
        }
    }
}

/// Pending change for one path, with a unified diff against the disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub file_path: String,
    pub change: ChangeKind,
    pub unified: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Decides whether a batch of diffs may be applied
#[async_trait]
pub trait ReviewGate: Send + Sync {
    async fn review(&self, diffs: &[FileDiff]) -> Result<ReviewDecision>;
}

/// Diff every final state against the current file contents.
///
/// Paths whose state already matches the disk are left out.
pub async fn build_diffs(
    fs: &dyn FileSystem,
    root: &Path,
    states: &FinalFileStates,
) -> Result<Vec<FileDiff>> {
    let mut diffs = Vec::new();

    for (file_path, state) in states {
        let current = fs.read(&root.join(file_path)).await?;
        let old_header = format!("a/{}", file_path);
        let new_header = format!("b/{}", file_path);

        let (change, old, new, old_header, new_header) = match (state, current.as_deref()) {
            (FileState::Delete, None) => continue,
            (FileState::Delete, Some(old)) => (ChangeKind::Delete, old, "", old_header, "/dev/null".to_string()),
            (FileState::Content(new), None) => (ChangeKind::Create, "", new.as_str(), "/dev/null".to_string(), new_header),
            (FileState::Content(new), Some(old)) if old == new => continue,
            (FileState::Content(new), Some(old)) => (ChangeKind::Modify, old, new.as_str(), old_header, new_header),
        };

        let unified = TextDiff::from_lines(old, new)
            .unified_diff()
            .context_radius(3)
            .header(&old_header, &new_header)
            .to_string();

        diffs.push(FileDiff {
            file_path: file_path.clone(),
            change,
            unified,
        });
    }

    Ok(diffs)
}
