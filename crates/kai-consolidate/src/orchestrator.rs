//! Runs one consolidation pass and checkpoints it on success.
//!
//! Phases run strictly in order:
//!
//! ```text
//! precondition -> select history -> analyze -> generate -> [review] -> apply -> checkpoint -> [commit]
//! ```
//!
//! Every phase transition is written to the durable log. The success marker
//! is appended to the log and then to the conversation only when apply
//! reports zero failures.

use kai_ai::{CompletionClient, Tier};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::applier::{Applier, ApplySummary};
use crate::context::{CodeContext, ContextConfig};
use crate::conversation::{Conversation, Message};
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::generator::{EmptyContentPolicy, Generator};
use crate::history;
use crate::log::{LogEntry, LogSink, record};
use crate::retry::{RetryPolicy, with_retry};
use crate::review::{ReviewDecision, ReviewGate, build_diffs};
use crate::vcs::VersionControl;

/// Settings for a [`Consolidator`]
#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// Refuse to run on a working tree with uncommitted changes
    pub require_clean_tree: bool,
    /// Ask the review gate before applying
    pub review: bool,
    /// Commit applied changes through version control
    pub auto_commit: bool,
    pub analysis_tier: Tier,
    pub generation_tier: Tier,
    pub retry: RetryPolicy,
    pub empty_content: EmptyContentPolicy,
    pub context: ContextConfig,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            require_clean_tree: true,
            review: false,
            auto_commit: false,
            analysis_tier: Tier::Quality,
            generation_tier: Tier::Quality,
            retry: RetryPolicy::default(),
            empty_content: EmptyContentPolicy::default(),
            context: ContextConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Precondition,
    SelectHistory,
    Analyze,
    Generate,
    Review,
    Apply,
    Checkpoint,
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Precondition => "precondition",
            Phase::SelectHistory => "select-history",
            Phase::Analyze => "analyze",
            Phase::Generate => "generate",
            Phase::Review => "review",
            Phase::Apply => "apply",
            Phase::Checkpoint => "checkpoint",
            Phase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// How a run ended without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No messages since the last marker
    NothingToDo,
    /// Analysis found no files to change
    NoOperations,
    /// Every file failed to generate and nothing was to be deleted
    NothingGenerated,
    /// The review gate rejected the changes
    Rejected,
    /// Changes applied and the marker appended
    Applied(ApplySummary),
}

/// Sequences the pipeline for one conversation
pub struct Consolidator {
    config: ConsolidationConfig,
    fs: Arc<dyn FileSystem>,
    log: Arc<dyn LogSink>,
    analyzer: Analyzer,
    generator: Generator,
    applier: Applier,
    vcs: Option<Arc<dyn VersionControl>>,
    review_gate: Option<Arc<dyn ReviewGate>>,
}

impl Consolidator {
    pub fn new(
        config: ConsolidationConfig,
        client: Arc<dyn CompletionClient>,
        fs: Arc<dyn FileSystem>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        let analyzer = Analyzer::new(client.clone(), log.clone(), config.analysis_tier);
        let generator = Generator::new(client, fs.clone(), log.clone(), config.generation_tier)
            .with_retry_policy(config.retry.clone())
            .with_empty_content(config.empty_content);
        let applier = Applier::new(fs.clone());

        Self {
            config,
            fs,
            log,
            analyzer,
            generator,
            applier,
            vcs: None,
            review_gate: None,
        }
    }

    pub fn with_version_control(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn with_review_gate(mut self, gate: Arc<dyn ReviewGate>) -> Self {
        self.review_gate = Some(gate);
        self
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Consolidate everything after the last marker into files under `root`.
    pub async fn run(&self, conversation: &mut Conversation, root: &Path) -> Result<RunOutcome> {
        record(
            self.log.as_ref(),
            LogEntry::system(format!("Consolidation started in {}", root.display())),
        );

        self.enter(Phase::Precondition);
        self.check_preconditions(root)
            .await
            .map_err(|e| self.fail(Phase::Precondition, e))?;

        self.enter(Phase::SelectHistory);
        let history = history::select(conversation.messages()).to_vec();
        if history.is_empty() {
            tracing::info!("Nothing to consolidate");
            record(
                self.log.as_ref(),
                LogEntry::system("Nothing to do: no messages since the last consolidation"),
            );
            return Ok(RunOutcome::NothingToDo);
        }
        tracing::debug!("{} message(s) to consolidate", history.len());

        let context = self
            .collect_context(root)
            .await
            .map_err(|e| self.fail(Phase::Analyze, e))?;

        self.enter(Phase::Analyze);
        let (analyzer, slice, ctx) = (&self.analyzer, history.as_slice(), &context);
        let operations = with_retry(&self.config.retry, "Analysis", Error::is_retryable, move |_| {
            analyzer.analyze(slice, ctx)
        })
        .await
        .map_err(|e| self.fail(Phase::Analyze, e))?;

        if operations.is_empty() {
            tracing::info!("Analysis found nothing to change");
            record(self.log.as_ref(), LogEntry::system("Analysis found no file operations"));
            return Ok(RunOutcome::NoOperations);
        }
        record(
            self.log.as_ref(),
            LogEntry::system(format!(
                "Operations: {}",
                operations
                    .iter()
                    .map(|op| format!("{} {}", op.action, op.file_path))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        );

        self.enter(Phase::Generate);
        let generation = self
            .generator
            .generate(&history, &context, root, &operations)
            .await;
        let blocking = generation.blocking_failures();
        if generation.states.is_empty() && blocking == 0 {
            tracing::warn!("No file content could be generated");
            record(
                self.log.as_ref(),
                LogEntry::error("Nothing generated: every file failed"),
            );
            return Ok(RunOutcome::NothingGenerated);
        }

        if self.config.review {
            self.enter(Phase::Review);
            if self.review(root, &generation.states).await? == ReviewDecision::Reject {
                tracing::info!("Changes rejected in review");
                record(self.log.as_ref(), LogEntry::system("Changes rejected in review"));
                return Ok(RunOutcome::Rejected);
            }
        }

        self.enter(Phase::Apply);
        let summary = self.applier.apply(&generation.states, root).await;
        for line in &summary.summary {
            record(self.log.as_ref(), LogEntry::system(line.as_str()));
        }
        let failed = summary.failed_count + blocking;
        if failed > 0 {
            let total = summary.total() + blocking;
            return Err(self.fail(Phase::Apply, Error::ApplyBatch { failed, total }));
        }

        self.enter(Phase::Checkpoint);
        self.log
            .append(&LogEntry::marker())
            .map_err(|e| self.fail(Phase::Checkpoint, e))?;
        conversation.push(Message::consolidation_marker());
        tracing::info!(
            "Consolidated {} file(s) ({} skipped)",
            summary.success_count,
            summary.skipped_count
        );

        if self.config.auto_commit {
            self.commit(root, &summary).await;
        }

        Ok(RunOutcome::Applied(summary))
    }

    async fn check_preconditions(&self, root: &Path) -> Result<()> {
        if self.config.review && self.review_gate.is_none() {
            return Err(Error::Precondition("review requested but no review gate is configured".into()));
        }
        if (self.config.require_clean_tree || self.config.auto_commit) && self.vcs.is_none() {
            return Err(Error::Precondition("version control is required but not configured".into()));
        }

        if self.config.require_clean_tree {
            if let Some(vcs) = &self.vcs {
                if !vcs.is_clean(root).await? {
                    return Err(Error::Precondition(
                        "working tree has uncommitted changes".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    async fn collect_context(&self, root: &Path) -> Result<CodeContext> {
        let root = root.to_path_buf();
        let config = self.config.context.clone();
        tokio::task::spawn_blocking(move || CodeContext::collect(&root, &config))
            .await
            .map_err(|e| Error::Other(format!("Context collection failed: {}", e)))
    }

    async fn review(
        &self,
        root: &Path,
        states: &crate::operation::FinalFileStates,
    ) -> Result<ReviewDecision> {
        let Some(gate) = &self.review_gate else {
            return Ok(ReviewDecision::Approve);
        };

        let diffs = build_diffs(self.fs.as_ref(), root, states)
            .await
            .map_err(|e| self.fail(Phase::Review, e))?;
        if diffs.is_empty() {
            return Ok(ReviewDecision::Approve);
        }
        gate.review(&diffs)
            .await
            .map_err(|e| self.fail(Phase::Review, e))
    }

    /// A failed commit is reported but does not undo the checkpoint
    async fn commit(&self, root: &Path, summary: &ApplySummary) {
        let Some(vcs) = &self.vcs else {
            return;
        };
        self.enter(Phase::Commit);

        let message = commit_message(summary);
        match vcs.commit(root, &message).await {
            Ok(()) => record(self.log.as_ref(), LogEntry::system("Committed consolidated changes")),
            Err(e) => {
                self.fail(Phase::Commit, e);
            }
        }
    }

    fn enter(&self, phase: Phase) {
        tracing::debug!("Entering {} phase", phase);
        record(self.log.as_ref(), LogEntry::system(format!("Phase: {}", phase)));
    }

    fn fail(&self, phase: Phase, error: Error) -> Error {
        tracing::error!("{} phase failed: {}", phase, error);
        record(
            self.log.as_ref(),
            LogEntry::error(format!("{} phase failed: {}", phase, error)),
        );
        error
    }
}

fn commit_message(summary: &ApplySummary) -> String {
    let mut message = format!("kai: consolidate {} file(s)\n\n", summary.success_count);
    for line in &summary.summary {
        message.push_str("- ");
        message.push_str(line);
        message.push('\n');
    }
    message
}
