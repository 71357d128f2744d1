//! `kai consolidate`: run one consolidation pass for a session

use anyhow::Context;
use kai_consolidate::{ConsolidationConfig, Consolidator, GitCli, JsonlLog, LocalFs, RunOutcome};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::review::TerminalReview;
use crate::session::SessionStore;

/// Command-line overrides on top of the config file
#[derive(Debug, Clone, Default)]
pub struct ConsolidateOptions {
    pub root: Option<PathBuf>,
    pub review: bool,
    pub no_precondition: bool,
    pub commit: bool,
}

impl ConsolidateOptions {
    fn apply_to(&self, config: &mut ConsolidationConfig) {
        if self.review {
            config.review = true;
        }
        if self.no_precondition {
            config.require_clean_tree = false;
        }
        if self.commit {
            config.auto_commit = true;
        }
    }
}

pub async fn run(
    config: &Config,
    store: &SessionStore,
    id: &str,
    options: &ConsolidateOptions,
) -> anyhow::Result<()> {
    let (mut session, mut conversation) = store
        .load(id)
        .with_context(|| format!("Failed to load session {}", id))?;
    let root = match &options.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };

    let mut settings = config.consolidation_config();
    options.apply_to(&mut settings);
    let review = settings.review;

    let client = Arc::new(config.build_client()?);
    let log = Arc::new(JsonlLog::open(store.log_path(id))?);
    let mut consolidator = Consolidator::new(settings, client, Arc::new(LocalFs), log)
        .with_version_control(Arc::new(GitCli));
    if review {
        consolidator = consolidator.with_review_gate(Arc::new(TerminalReview));
    }

    let before = conversation.len();
    let outcome = consolidator
        .run(&mut conversation, &root)
        .await
        .with_context(|| format!("Consolidation of session {} failed", id))?;

    // The marker is the only message a run adds
    for message in &conversation.messages()[before..] {
        session.append_message(message)?;
    }

    print!("{}", describe_outcome(&outcome));
    Ok(())
}

fn describe_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::NothingToDo => "Nothing to consolidate.\n".to_string(),
        RunOutcome::NoOperations => "No file changes found in the conversation.\n".to_string(),
        RunOutcome::NothingGenerated => "No file content could be generated.\n".to_string(),
        RunOutcome::Rejected => "Changes rejected; nothing was applied.\n".to_string(),
        RunOutcome::Applied(summary) => {
            let mut out = String::new();
            for line in &summary.summary {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&format!(
                "\nApplied {} file(s): {} written or deleted, {} skipped.\n",
                summary.total(),
                summary.success_count,
                summary.skipped_count
            ));
            out
        }
    }
}
