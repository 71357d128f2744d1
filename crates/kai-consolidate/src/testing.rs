//! Scripted in-memory collaborators for unit tests.

use async_trait::async_trait;
use kai_ai::{CompletionClient, Tier};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::log::{LogEntry, LogSink};
use crate::repair::PatchApplier;
use crate::retry::RetryPolicy;
use crate::review::{FileDiff, ReviewDecision, ReviewGate};
use crate::vcs::VersionControl;

/// Retry policy without waiting
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        max_jitter: Duration::ZERO,
    }
}

/// Completion client that replays canned results in order
pub struct ScriptedClient {
    responses: Mutex<VecDeque<kai_ai::Result<String>>>,
    requests: Mutex<Vec<(String, Tier)>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<kai_ai::Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn tiers(&self) -> Vec<Tier> {
        self.requests.lock().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, prompt: &str, tier: Tier) -> kai_ai::Result<String> {
        self.requests.lock().push((prompt.to_string(), tier));
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(kai_ai::Error::UnexpectedResponse("script exhausted".into())))
    }
}

/// In-memory filesystem keyed by full path
#[derive(Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, String>>,
    failing_writes: HashSet<PathBuf>,
    writes: Mutex<usize>,
    deletes: Mutex<usize>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, content: &str) -> Self {
        self.files.lock().insert(path.into(), content.to_string());
        self
    }

    pub fn fail_writes_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing_writes.insert(path.into());
        self
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.lock().get(path.as_ref()).cloned()
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    pub fn delete_count(&self) -> usize {
        *self.deletes.lock()
    }
}

#[async_trait]
impl crate::fs::FileSystem for MemoryFs {
    async fn read(&self, path: &Path) -> io::Result<Option<String>> {
        Ok(self.files.lock().get(path).cloned())
    }

    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        *self.writes.lock() += 1;
        if self.failing_writes.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.files.lock().insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        *self.deletes.lock() += 1;
        match self.files.lock().remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    async fn ensure_dir(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.files.lock().contains_key(path))
    }
}

/// Log sink that keeps entries in memory
#[derive(Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
    fail_markers: bool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to store the success marker
    pub fn rejecting_markers() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            fail_markers: true,
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn has_marker(&self) -> bool {
        self.entries.lock().iter().any(LogEntry::is_marker)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|e| {
            e.content.as_deref().is_some_and(|c| c.contains(needle))
                || e.error.as_deref().is_some_and(|c| c.contains(needle))
        })
    }
}

impl LogSink for MemoryLog {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        if self.fail_markers && entry.is_marker() {
            return Err(Error::Log("disk full".into()));
        }
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// Version control with a fixed clean state that records commits
pub struct StaticVcs {
    clean: bool,
    fail_commit: bool,
    commits: Mutex<Vec<String>>,
}

impl StaticVcs {
    pub fn new(clean: bool) -> Self {
        Self {
            clean,
            fail_commit: false,
            commits: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_commit() -> Self {
        Self {
            fail_commit: true,
            ..Self::new(true)
        }
    }

    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().clone()
    }
}

#[async_trait]
impl VersionControl for StaticVcs {
    async fn is_clean(&self, _root: &Path) -> Result<bool> {
        Ok(self.clean)
    }

    async fn commit(&self, _root: &Path, message: &str) -> Result<()> {
        if self.fail_commit {
            return Err(Error::Other("nothing to commit".into()));
        }
        self.commits.lock().push(message.to_string());
        Ok(())
    }
}

/// Review gate that always answers the same way
pub struct FixedReview {
    decision: ReviewDecision,
    seen: Mutex<Vec<String>>,
}

impl FixedReview {
    pub fn new(decision: ReviewDecision) -> Self {
        Self {
            decision,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Paths of every diff shown so far
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ReviewGate for FixedReview {
    async fn review(&self, diffs: &[FileDiff]) -> Result<ReviewDecision> {
        self.seen
            .lock()
            .extend(diffs.iter().map(|d| d.file_path.clone()));
        Ok(self.decision)
    }
}

/// Patch applier that replays canned results and records every patch
pub struct ScriptedPatches {
    results: Mutex<VecDeque<std::result::Result<(), String>>>,
    fallback: std::result::Result<(), String>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedPatches {
    pub fn new(results: Vec<std::result::Result<(), String>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            fallback: Err("no scripted result".into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing(error: &str) -> Self {
        Self {
            fallback: Err(error.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl PatchApplier for ScriptedPatches {
    async fn apply(&self, _root: &Path, _file_path: &str, patch: &str) -> std::result::Result<(), String> {
        self.seen.lock().push(patch.to_string());
        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
