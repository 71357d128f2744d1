//! Version-control gate: clean-tree precondition and post-run commit.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{Error, Result};

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// True when the working tree has no uncommitted changes
    async fn is_clean(&self, root: &Path) -> Result<bool>;

    /// Stage everything and commit
    async fn commit(&self, root: &Path, message: &str) -> Result<()>;
}

/// [`VersionControl`] backed by the `git` executable
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    async fn git(&self, root: &Path, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(Error::Other(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn is_clean(&self, root: &Path) -> Result<bool> {
        let status = self.git(root, &["status", "--porcelain"]).await?;
        Ok(status.trim().is_empty())
    }

    async fn commit(&self, root: &Path, message: &str) -> Result<()> {
        self.git(root, &["add", "-A"]).await?;
        self.git(root, &["commit", "-m", message]).await?;
        Ok(())
    }
}
