//! `kai patch`: apply a unified diff, repairing it through the completion
//! service when it does not apply cleanly

use anyhow::{Context, bail};
use kai_consolidate::{GitApply, JsonlLog, LocalFs, PatchRepairLoop, normalize_path};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::session::SessionStore;

pub async fn run(
    config: &Config,
    store: &SessionStore,
    id: &str,
    file: &str,
    patch_file: &Path,
    root: Option<PathBuf>,
) -> anyhow::Result<()> {
    let file_path = normalize_path(file)
        .with_context(|| format!("Invalid file path '{}'", file))?;
    let patch = std::fs::read_to_string(patch_file)
        .with_context(|| format!("Failed to read {}", patch_file.display()))?;
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    let client = Arc::new(config.build_client()?);
    let log = Arc::new(JsonlLog::open(store.log_path(id))?);
    let repair = PatchRepairLoop::new(client, Arc::new(LocalFs), log, Arc::new(GitApply))
        .with_tier(config.pipeline.generation_tier)
        .with_retry_policy(config.retry_policy())
        .with_max_attempts(config.patch.max_attempts);

    if !repair.apply_patch(&root, &file_path, &patch).await? {
        bail!(
            "Patch for {} could not be applied after {} attempt(s)",
            file_path,
            config.patch.max_attempts.max(1)
        );
    }

    println!("Applied patch to {}", file_path);
    Ok(())
}
