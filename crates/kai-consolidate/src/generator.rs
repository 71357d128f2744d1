//! Per-file content generation and the delete-merge pass.

use kai_ai::{CompletionClient, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use crate::context::CodeContext;
use crate::conversation::Message;
use crate::error::is_retryable_ai;
use crate::fs::FileSystem;
use crate::log::{LogEntry, LogSink, complete_logged, record};
use crate::operation::{Action, FileState, FinalFileStates, Operation};
use crate::prompts::{self, DELETE_SENTINEL};
use crate::response::{Fencing, strip_enclosing_fence};
use crate::retry::{RetryPolicy, with_retry};

/// Completion cycles per file when the model keeps answering with nothing
const EMPTY_CONTENT_CYCLES: u32 = 2;

/// What to do when a file's generated content is still empty after the extra cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyContentPolicy {
    /// Leave the file out; the run can still succeed
    #[default]
    Drop,
    /// Write an empty file
    Accept,
    /// Leave the file out and fail the run
    Fail,
}

impl EmptyContentPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "drop" => Some(Self::Drop),
            "accept" => Some(Self::Accept),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// A file that got no final state from generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    pub file_path: String,
    pub reason: String,
    /// Blocking failures prevent the success checkpoint
    pub blocking: bool,
}

/// Output of [`Generator::generate`]
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub states: FinalFileStates,
    pub failures: Vec<GenerationFailure>,
    /// Paths where an analysis DELETE replaced generated content
    pub overrides: Vec<String>,
}

impl Generation {
    pub fn blocking_failures(&self) -> usize {
        self.failures.iter().filter(|f| f.blocking).count()
    }
}

/// Generates final content for CREATE/MODIFY operations, one file at a time
pub struct Generator {
    client: Arc<dyn CompletionClient>,
    fs: Arc<dyn FileSystem>,
    log: Arc<dyn LogSink>,
    tier: Tier,
    retry: RetryPolicy,
    empty_content: EmptyContentPolicy,
}

impl Generator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        fs: Arc<dyn FileSystem>,
        log: Arc<dyn LogSink>,
        tier: Tier,
    ) -> Self {
        Self {
            client,
            fs,
            log,
            tier,
            retry: RetryPolicy::default(),
            empty_content: EmptyContentPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_empty_content(mut self, policy: EmptyContentPolicy) -> Self {
        self.empty_content = policy;
        self
    }

    /// Generate content for every CREATE/MODIFY in order, then overlay DELETEs.
    ///
    /// Per-file failures are recorded in the result and never abort the batch.
    pub async fn generate(
        &self,
        history: &[Message],
        context: &CodeContext,
        root: &Path,
        operations: &[Operation],
    ) -> Generation {
        let mut generation = Generation::default();

        for op in operations.iter().filter(|op| op.action.needs_content()) {
            match self.generate_file(op, history, context, root).await {
                Ok(state) => {
                    generation.states.insert(op.file_path.clone(), state);
                }
                Err(failure) => {
                    tracing::error!("Generation failed for {}: {}", failure.file_path, failure.reason);
                    record(
                        self.log.as_ref(),
                        LogEntry::error(format!(
                            "Generation failed for {}: {}",
                            failure.file_path, failure.reason
                        )),
                    );
                    generation.failures.push(failure);
                }
            }
        }

        self.merge_deletes(&mut generation, operations);
        generation
    }

    async fn generate_file(
        &self,
        op: &Operation,
        history: &[Message],
        context: &CodeContext,
        root: &Path,
    ) -> std::result::Result<FileState, GenerationFailure> {
        let failure = |reason: String, blocking: bool| GenerationFailure {
            file_path: op.file_path.clone(),
            reason,
            blocking,
        };

        let current = self
            .fs
            .read(&root.join(&op.file_path))
            .await
            .map_err(|e| failure(format!("could not read current content: {}", e), false))?;
        let prompt = prompts::generation_prompt(op, current.as_deref(), history, context);
        let label = format!("Generating {}", op.file_path);
        let (client, log, tier) = (self.client.as_ref(), self.log.as_ref(), self.tier);
        let prompt = prompt.as_str();

        for cycle in 1..=EMPTY_CONTENT_CYCLES {
            let response = with_retry(&self.retry, &label, is_retryable_ai, move |_| {
                complete_logged(client, log, prompt, tier)
            })
            .await
            .map_err(|e| failure(e.to_string(), false))?;

            if response.trim() == DELETE_SENTINEL {
                tracing::info!("Model asked to delete {}", op.file_path);
                return Ok(FileState::Delete);
            }

            let fencing = strip_enclosing_fence(&response);
            if let Fencing::Partial(_) = fencing {
                tracing::warn!(
                    "Response for {} has an unbalanced code fence; keeping it verbatim",
                    op.file_path
                );
            }

            let content = fencing.content();
            if !content.trim().is_empty() {
                return Ok(FileState::Content(content.to_string()));
            }
            if cycle < EMPTY_CONTENT_CYCLES {
                tracing::warn!("Empty content for {}, asking again", op.file_path);
            }
        }

        match self.empty_content {
            EmptyContentPolicy::Accept => {
                tracing::warn!("Writing {} with empty content", op.file_path);
                Ok(FileState::Content(String::new()))
            }
            EmptyContentPolicy::Drop => Err(failure("generated content was empty".into(), false)),
            EmptyContentPolicy::Fail => Err(failure("generated content was empty".into(), true)),
        }
    }

    /// DELETE operations win over generated content for the same path
    fn merge_deletes(&self, generation: &mut Generation, operations: &[Operation]) {
        let mut deleted = BTreeSet::new();

        for op in operations.iter().filter(|op| op.action == Action::Delete) {
            let previous = generation.states.insert(op.file_path.clone(), FileState::Delete);
            if let Some(FileState::Content(_)) = previous {
                tracing::warn!("DELETE overrides generated content for {}", op.file_path);
                record(
                    self.log.as_ref(),
                    LogEntry::system(format!(
                        "DELETE overrides generated content for {}",
                        op.file_path
                    )),
                );
                generation.overrides.push(op.file_path.clone());
            }
            deleted.insert(op.file_path.as_str());
        }

        // A deleted path no longer needs its content
        generation
            .failures
            .retain(|f| !deleted.contains(f.file_path.as_str()));
    }
}
