//! Turns a history slice into a validated list of file operations.

use kai_ai::{CompletionClient, Tier};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::context::CodeContext;
use crate::conversation::Message;
use crate::error::{Error, Result};
use crate::log::{LogEntry, LogSink, complete_logged, record};
use crate::operation::{Action, Operation, normalize_path};
use crate::prompts;
use crate::response::{extract_bracketed, extract_fenced};

/// Accepted top-level response shapes
#[derive(Deserialize)]
#[serde(untagged)]
enum AnalysisPayload {
    Bare(Vec<Value>),
    Wrapped { operations: Vec<Value> },
}

/// One entry before validation
#[derive(Deserialize)]
struct RawOperation {
    #[serde(alias = "filePath")]
    file_path: String,
    action: String,
}

/// Runs the analysis completion and parses its answer
pub struct Analyzer {
    client: Arc<dyn CompletionClient>,
    log: Arc<dyn LogSink>,
    tier: Tier,
}

impl Analyzer {
    pub fn new(client: Arc<dyn CompletionClient>, log: Arc<dyn LogSink>, tier: Tier) -> Self {
        Self { client, log, tier }
    }

    /// One completion call, no retry. Parse failures are logged before they
    /// are returned.
    pub async fn analyze(&self, history: &[Message], context: &CodeContext) -> Result<Vec<Operation>> {
        let prompt = prompts::analysis_prompt(history, context);
        let response =
            complete_logged(self.client.as_ref(), self.log.as_ref(), &prompt, self.tier).await?;

        match parse_operations(&response) {
            Ok(operations) => {
                tracing::info!("Analysis produced {} operation(s)", operations.len());
                Ok(operations)
            }
            Err(e) => {
                record(self.log.as_ref(), LogEntry::error(e.to_string()));
                Err(e)
            }
        }
    }
}

/// Parse an analysis response into operations.
///
/// The payload is taken from the first fenced block, else from the outermost
/// brackets, else the whole text. Entries with a missing path, an unknown
/// action or a path that normalizes to nothing are dropped with a warning.
pub fn parse_operations(response: &str) -> Result<Vec<Operation>> {
    let payload = extract_fenced(response)
        .or_else(|| extract_bracketed(response))
        .unwrap_or(response)
        .trim();

    let parsed: Value = serde_json::from_str(payload)
        .map_err(|e| parse_error(format!("invalid JSON: {}", e), response))?;

    let entries = match serde_json::from_value::<AnalysisPayload>(parsed) {
        Ok(AnalysisPayload::Bare(entries)) => entries,
        Ok(AnalysisPayload::Wrapped { operations }) => operations,
        Err(_) => {
            return Err(parse_error(
                "expected a JSON array or an object with an \"operations\" array",
                response,
            ));
        }
    };

    Ok(entries.into_iter().filter_map(validate_entry).collect())
}

fn validate_entry(entry: Value) -> Option<Operation> {
    let raw: RawOperation = match serde_json::from_value(entry.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Dropping malformed operation {}: {}", entry, e);
            return None;
        }
    };

    let Some(action) = Action::parse(&raw.action) else {
        tracing::warn!("Dropping operation on {} with unknown action {}", raw.file_path, raw.action);
        return None;
    };

    let Some(file_path) = normalize_path(&raw.file_path) else {
        tracing::warn!("Dropping operation with unusable path '{}'", raw.file_path);
        return None;
    };

    Some(Operation { file_path, action })
}

fn parse_error(reason: impl Into<String>, raw: &str) -> Error {
    Error::AnalysisParse {
        reason: reason.into(),
        raw: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogKind;
    use crate::testing::{MemoryLog, ScriptedClient};

    #[test]
    fn test_bare_and_wrapped_shapes_agree() {
        let bare = parse_operations(r#"[{"file_path":"a.ts","action":"CREATE"}]"#).unwrap();
        let wrapped =
            parse_operations(r#"{"operations":[{"file_path":"a.ts","action":"CREATE"}]}"#).unwrap();
        assert_eq!(bare, vec![Operation::new("a.ts", Action::Create)]);
        assert_eq!(bare, wrapped);
    }

    #[test]
    fn test_invalid_action_is_dropped() {
        let ops = parse_operations(
            r#"[{"filePath":"x","action":"CREATE"},{"filePath":"y","action":"BOGUS"}]"#,
        )
        .unwrap();
        assert_eq!(ops, vec![Operation::new("x", Action::Create)]);
    }

    #[test]
    fn test_fenced_response_with_prose() {
        let response = "Here is the plan:\n```json\n[{\"file_path\":\"src/a.rs\",\"action\":\"MODIFY\"}]\n```\nLet me know.";
        let ops = parse_operations(response).unwrap();
        assert_eq!(ops, vec![Operation::new("src/a.rs", Action::Modify)]);
    }

    #[test]
    fn test_unfenced_response_with_prose() {
        let response = "Sure: {\"operations\": [{\"file_path\": \"old.txt\", \"action\": \"DELETE\"}]} done";
        let ops = parse_operations(response).unwrap();
        assert_eq!(ops, vec![Operation::new("old.txt", Action::Delete)]);
    }

    #[test]
    fn test_paths_are_normalized_and_bad_entries_dropped() {
        let ops = parse_operations(
            r#"[
                {"file_path":"/foo/bar/../b.ts/","action":"CREATE"},
                {"file_path":"./","action":"CREATE"},
                {"file_path":"../outside.txt","action":"CREATE"},
                {"action":"CREATE"},
                {"file_path":"c.ts","action":"create"}
            ]"#,
        )
        .unwrap();
        assert_eq!(ops, vec![Operation::new("foo/b.ts", Action::Create)]);
    }

    #[test]
    fn test_empty_array_is_not_an_error() {
        assert!(parse_operations("[]").unwrap().is_empty());
        assert!(parse_operations("```json\n[]\n```").unwrap().is_empty());
    }

    #[test]
    fn test_unparseable_response_keeps_raw_text() {
        let err = parse_operations("I could not decide.").unwrap_err();
        match err {
            Error::AnalysisParse { raw, .. } => assert_eq!(raw, "I could not decide."),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_shape_is_a_parse_error() {
        assert!(matches!(
            parse_operations(r#"{"files": []}"#),
            Err(Error::AnalysisParse { .. })
        ));
        assert!(matches!(
            parse_operations("```\n42\n```"),
            Err(Error::AnalysisParse { .. })
        ));
    }

    #[tokio::test]
    async fn test_analyze_logs_request_response_and_parse_error() {
        let client = Arc::new(ScriptedClient::ok(&["no json here"]));
        let log = Arc::new(MemoryLog::new());
        let analyzer = Analyzer::new(client.clone(), log.clone(), Tier::Fast);

        let result = analyzer
            .analyze(&[Message::user("do it")], &CodeContext::default())
            .await;
        assert!(matches!(result, Err(Error::AnalysisParse { .. })));

        let kinds: Vec<LogKind> = log.entries().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![LogKind::Request, LogKind::Response, LogKind::Error]);
        assert_eq!(client.calls(), 1);
        assert_eq!(client.tiers(), vec![Tier::Fast]);
    }

    #[tokio::test]
    async fn test_analyze_propagates_completion_error() {
        let client = Arc::new(ScriptedClient::new(vec![Err(kai_ai::Error::InvalidApiKey)]));
        let log = Arc::new(MemoryLog::new());
        let analyzer = Analyzer::new(client, log.clone(), Tier::Quality);

        let result = analyzer.analyze(&[], &CodeContext::default()).await;
        assert!(matches!(result, Err(Error::Ai(kai_ai::Error::InvalidApiKey))));
        assert_eq!(log.entries().last().unwrap().kind, LogKind::Error);
    }
}
