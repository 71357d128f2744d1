//! Apply a unified diff to one file, asking the model to repair it when it does not apply.

use async_trait::async_trait;
use kai_ai::{CompletionClient, Tier};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Result, is_retryable_ai};
use crate::fs::FileSystem;
use crate::log::{LogEntry, LogSink, complete_logged, record};
use crate::prompts;
use crate::response::{Fencing, extract_fenced, strip_enclosing_fence};
use crate::retry::{RetryPolicy, with_retry};

/// Default ceiling on patch applications per call
pub const DEFAULT_MAX_PATCH_ATTEMPTS: u32 = 10;

/// Applies a textual patch; the error string is what the repair prompt sees
#[async_trait]
pub trait PatchApplier: Send + Sync {
    async fn apply(&self, root: &Path, file_path: &str, patch: &str) -> std::result::Result<(), String>;
}

/// [`PatchApplier`] that pipes the patch into `git apply`.
///
/// The patch is rejected before anything is written unless every file it
/// touches is `file_path`, and it touches `file_path` at least once.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitApply;

impl GitApply {
    async fn git_apply(
        &self,
        root: &Path,
        args: &[&str],
        patch: &str,
    ) -> std::result::Result<String, String> {
        let mut child = Command::new("git")
            .arg("apply")
            .args(args)
            .arg("-")
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("Failed to spawn git: {}", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(patch.as_bytes())
                .await
                .map_err(|e| format!("Failed to write patch: {}", e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("git apply did not finish: {}", e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

#[async_trait]
impl PatchApplier for GitApply {
    async fn apply(&self, root: &Path, file_path: &str, patch: &str) -> std::result::Result<(), String> {
        let numstat = self.git_apply(root, &["--numstat"], patch).await?;
        check_patch_targets(&numstat, file_path)?;
        self.git_apply(root, &["--whitespace=nowarn"], patch).await.map(|_| ())
    }
}

/// Validate `git apply --numstat` output (`added<TAB>deleted<TAB>path` per
/// file) against the single file the patch is meant for.
fn check_patch_targets(numstat: &str, file_path: &str) -> std::result::Result<(), String> {
    let paths: Vec<&str> = numstat
        .lines()
        .filter_map(|line| line.splitn(3, '\t').nth(2))
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .collect();

    if paths.is_empty() {
        return Err(format!("Patch contains no changes for {}", file_path));
    }
    let others: Vec<&str> = paths.iter().copied().filter(|p| *p != file_path).collect();
    if others.is_empty() {
        Ok(())
    } else if others.len() == paths.len() {
        Err(format!(
            "Patch changes {} but not {}",
            others.join(", "),
            file_path
        ))
    } else {
        Err(format!(
            "Patch must only change {}, but it also changes: {}",
            file_path,
            others.join(", ")
        ))
    }
}

/// Bounded apply/repair loop for a single file
pub struct PatchRepairLoop {
    client: Arc<dyn CompletionClient>,
    fs: Arc<dyn FileSystem>,
    log: Arc<dyn LogSink>,
    applier: Arc<dyn PatchApplier>,
    tier: Tier,
    retry: RetryPolicy,
    max_attempts: u32,
}

impl PatchRepairLoop {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        fs: Arc<dyn FileSystem>,
        log: Arc<dyn LogSink>,
        applier: Arc<dyn PatchApplier>,
    ) -> Self {
        Self {
            client,
            fs,
            log,
            applier,
            tier: Tier::Quality,
            retry: RetryPolicy::default(),
            max_attempts: DEFAULT_MAX_PATCH_ATTEMPTS,
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Try to apply `patch` to `file_path`. Returns `Ok(false)` when every
    /// attempt failed or a repair could not be obtained.
    pub async fn apply_patch(&self, root: &Path, file_path: &str, patch: &str) -> Result<bool> {
        let log = self.log.as_ref();
        let mut patch = patch.to_string();

        for attempt in 1..=self.max_attempts {
            record(
                log,
                LogEntry::system(format!(
                    "Applying patch to {} (attempt {}/{})",
                    file_path, attempt, self.max_attempts
                )),
            );

            let error = match self.applier.apply(root, file_path, &patch).await {
                Ok(()) => {
                    tracing::info!("Patch applied to {} on attempt {}", file_path, attempt);
                    record(log, LogEntry::system(format!("Patch applied to {}", file_path)));
                    return Ok(true);
                }
                Err(error) => error,
            };

            tracing::warn!(
                "Patch for {} failed (attempt {}/{}): {}",
                file_path,
                attempt,
                self.max_attempts,
                error
            );
            record(log, LogEntry::error(format!("Patch for {} failed: {}", file_path, error)));
            if attempt == self.max_attempts {
                break;
            }

            let current = self.fs.read(&root.join(file_path)).await?.unwrap_or_default();
            let prompt = prompts::patch_repair_prompt(file_path, &current, &patch, &error);
            let (client, tier, prompt) = (self.client.as_ref(), self.tier, prompt.as_str());
            let label = format!("Repairing patch for {}", file_path);

            match with_retry(&self.retry, &label, is_retryable_ai, move |_| {
                complete_logged(client, log, prompt, tier)
            })
            .await
            {
                Ok(response) => patch = normalize_patch(&response),
                Err(e) => {
                    tracing::error!("Could not repair patch for {}: {}", file_path, e);
                    return Ok(false);
                }
            }
        }

        tracing::error!(
            "Giving up on patch for {} after {} attempts",
            file_path,
            self.max_attempts
        );
        Ok(false)
    }
}

/// Fence-stripped patch text ending in a newline
fn normalize_patch(response: &str) -> String {
    let body = match strip_enclosing_fence(response) {
        Fencing::Stripped(body) => body,
        _ => extract_fenced(response).unwrap_or(response.trim()),
    };
    let mut patch = body.to_string();
    if !patch.ends_with('\n') {
        patch.push('\n');
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use crate::testing::{MemoryFs, MemoryLog, ScriptedClient, ScriptedPatches, fast_retry};
    use tempfile::TempDir;

    fn repair_loop(
        client: &Arc<ScriptedClient>,
        patches: &Arc<ScriptedPatches>,
        max_attempts: u32,
    ) -> PatchRepairLoop {
        let fs = Arc::new(MemoryFs::new().with_file("/repo/a.txt", "one\ntwo\n"));
        PatchRepairLoop::new(client.clone(), fs, Arc::new(MemoryLog::new()), patches.clone())
            .with_retry_policy(fast_retry())
            .with_max_attempts(max_attempts)
    }

    #[tokio::test]
    async fn test_applies_first_time_without_repair() {
        let client = Arc::new(ScriptedClient::ok(&[]));
        let patches = Arc::new(ScriptedPatches::new(vec![Ok(())]));

        let applied = repair_loop(&client, &patches, 3)
            .apply_patch(Path::new("/repo"), "a.txt", "patch")
            .await
            .unwrap();

        assert!(applied);
        assert_eq!(client.calls(), 0);
        assert_eq!(patches.seen(), vec!["patch".to_string()]);
    }

    #[tokio::test]
    async fn test_succeeds_after_one_repair() {
        let client = Arc::new(ScriptedClient::ok(&["```diff\nfixed\n```"]));
        let patches = Arc::new(ScriptedPatches::new(vec![Err("corrupt patch".into()), Ok(())]));

        let applied = repair_loop(&client, &patches, 10)
            .apply_patch(Path::new("/repo"), "a.txt", "broken")
            .await
            .unwrap();

        assert!(applied);
        assert_eq!(client.calls(), 1);
        assert_eq!(patches.seen(), vec!["broken".to_string(), "fixed\n".to_string()]);
        let prompt = &client.prompts()[0];
        assert!(prompt.contains("corrupt patch"));
        assert!(prompt.contains("one\ntwo\n"));
    }

    #[tokio::test]
    async fn test_gives_up_at_attempt_ceiling() {
        let client = Arc::new(ScriptedClient::ok(&["p2", "p3", "p4"]));
        let patches = Arc::new(ScriptedPatches::always_failing("nope"));

        let applied = repair_loop(&client, &patches, 3)
            .apply_patch(Path::new("/repo"), "a.txt", "p1")
            .await
            .unwrap();

        assert!(!applied);
        assert_eq!(patches.seen().len(), 3);
        // No repair after the final failed application
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_completion_error_stops_loop() {
        let client = Arc::new(ScriptedClient::new(vec![Err(kai_ai::Error::InvalidApiKey)]));
        let patches = Arc::new(ScriptedPatches::always_failing("nope"));

        let applied = repair_loop(&client, &patches, 5)
            .apply_patch(Path::new("/repo"), "a.txt", "p1")
            .await
            .unwrap();

        assert!(!applied);
        assert_eq!(patches.seen().len(), 1);
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn test_normalize_patch() {
        assert_eq!(normalize_patch("```diff\n-a\n+b\n```"), "-a\n+b\n");
        assert_eq!(normalize_patch("Here:\n```\n-a\n```\nok"), "-a\n");
        assert_eq!(normalize_patch("-a\n+b"), "-a\n+b\n");
    }

    #[test]
    fn test_check_patch_targets() {
        assert!(check_patch_targets("1\t1\ta.txt\n", "a.txt").is_ok());

        let err = check_patch_targets("", "a.txt").unwrap_err();
        assert!(err.contains("no changes for a.txt"));

        let err = check_patch_targets("1\t1\tsrc/a.txt\n", "a.txt").unwrap_err();
        assert_eq!(err, "Patch changes src/a.txt but not a.txt");

        let err = check_patch_targets("1\t0\ta.txt\n2\t2\tb.txt\n", "a.txt").unwrap_err();
        assert!(err.ends_with("also changes: b.txt"));
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[tokio::test]
    async fn test_git_apply_on_disk() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        let patch = "--- a/a.txt\n+++ b/a.txt\n@@ -1,2 +1,2 @@\n one\n-two\n+three\n";

        let client = Arc::new(ScriptedClient::ok(&[]));
        let repair = PatchRepairLoop::new(
            client,
            Arc::new(LocalFs),
            Arc::new(MemoryLog::new()),
            Arc::new(GitApply),
        );
        assert!(repair.apply_patch(dir.path(), "a.txt", patch).await.unwrap());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "one\nthree\n"
        );
    }

    #[tokio::test]
    async fn test_git_apply_rejects_patch_for_another_file() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "one\ntwo\n").unwrap();
        let other = "--- a/b.txt\n+++ b/b.txt\n@@ -1,2 +1,2 @@\n one\n-two\n+three\n";
        let fixed = "--- a/a.txt\n+++ b/a.txt\n@@ -1,2 +1,2 @@\n one\n-two\n+three\n";

        let client = Arc::new(ScriptedClient::ok(&[fixed]));
        let log = Arc::new(MemoryLog::new());
        let repair = PatchRepairLoop::new(client.clone(), Arc::new(LocalFs), log, Arc::new(GitApply))
            .with_retry_policy(fast_retry());

        assert!(repair.apply_patch(dir.path(), "a.txt", other).await.unwrap());
        // The misdirected patch was refused and repaired, not applied
        assert_eq!(client.calls(), 1);
        assert!(client.prompts()[0].contains("b.txt"));
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "one\ntwo\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\nthree\n");
    }

    #[tokio::test]
    async fn test_git_apply_without_changes_for_target_fails() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        let misprefixed = "--- a/src/a.txt\n+++ b/src/a.txt\n@@ -1,2 +1,2 @@\n one\n-two\n+three\n";

        let result = GitApply.apply(dir.path(), "a.txt", misprefixed).await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\ntwo\n");
    }
}
