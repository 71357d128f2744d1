//! kai-consolidate: turn a conversation into applied file changes
//!
//! One consolidation pass selects the messages after the last success
//! marker, asks the completion service which files to touch, generates each
//! file's final content, applies the results and checkpoints the
//! conversation so the next pass starts where this one ended.

pub mod analyzer;
pub mod applier;
pub mod context;
pub mod conversation;
pub mod error;
pub mod fs;
pub mod generator;
pub mod history;
pub mod log;
pub mod operation;
pub mod orchestrator;
pub mod prompts;
pub mod repair;
pub mod response;
pub mod retry;
pub mod review;
pub mod vcs;

#[cfg(test)]
mod testing;

pub use analyzer::{Analyzer, parse_operations};
pub use applier::{Applier, ApplyOutcome, ApplyStatus, ApplySummary};
pub use context::{CodeContext, ContextConfig, ContextFile};
pub use conversation::{CONSOLIDATION_MARKER, Conversation, Message, Role};
pub use error::{Error, Result};
pub use fs::{FileSystem, LocalFs};
pub use generator::{EmptyContentPolicy, Generation, GenerationFailure, Generator};
pub use log::{JsonlLog, LogEntry, LogKind, LogSink};
pub use operation::{Action, FileState, FinalFileStates, Operation, normalize_path};
pub use orchestrator::{ConsolidationConfig, Consolidator, Phase, RunOutcome};
pub use repair::{DEFAULT_MAX_PATCH_ATTEMPTS, GitApply, PatchApplier, PatchRepairLoop};
pub use retry::{RetryPolicy, with_retry};
pub use review::{ChangeKind, FileDiff, ReviewDecision, ReviewGate, build_diffs};
pub use vcs::{GitCli, VersionControl};
