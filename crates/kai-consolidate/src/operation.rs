//! File operations and final per-file states.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What the analysis decided to do with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Modify,
    Delete,
}

impl Action {
    /// Parse the wire spelling. Only the exact uppercase names are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(Action::Create),
            "MODIFY" => Some(Action::Modify),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Modify => "MODIFY",
            Action::Delete => "DELETE",
        }
    }

    /// CREATE and MODIFY need generated content; DELETE does not
    pub fn needs_content(&self) -> bool {
        !matches!(self, Action::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An intent for exactly one normalized, root-relative path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub file_path: String,
    pub action: Action,
}

impl Operation {
    pub fn new(file_path: impl Into<String>, action: Action) -> Self {
        Self {
            file_path: file_path.into(),
            action,
        }
    }
}

/// Desired end state of one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Content(String),
    Delete,
}

impl FileState {
    pub fn is_delete(&self) -> bool {
        matches!(self, FileState::Delete)
    }
}

/// One entry per normalized path, iterated in path order
pub type FinalFileStates = BTreeMap<String, FileState>;

/// Normalize a model-supplied path into a root-relative one.
///
/// Backslashes become `/`, empty and `.` segments are dropped, `..` pops the
/// previous segment. Returns `None` when nothing is left or when a `..`
/// would climb above the root.
pub fn normalize_path(raw: &str) -> Option<String> {
    let unified = raw.trim().replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators_and_dotdot() {
        assert_eq!(normalize_path("/foo/bar/../b.ts/"), Some("foo/b.ts".to_string()));
    }

    #[test]
    fn test_normalize_backslashes_and_dots() {
        assert_eq!(
            normalize_path("\\src\\.\\lib\\mod.rs"),
            Some("src/lib/mod.rs".to_string())
        );
        assert_eq!(normalize_path("a//b"), Some("a/b".to_string()));
    }

    #[test]
    fn test_normalize_rejects_empty_and_escaping_paths() {
        assert_eq!(normalize_path(""), None);
        assert_eq!(normalize_path("///"), None);
        assert_eq!(normalize_path("./"), None);
        assert_eq!(normalize_path("a/.."), None);
        assert_eq!(normalize_path("../etc/passwd"), None);
        assert_eq!(normalize_path("a/../../b"), None);
    }

    #[test]
    fn test_action_parse_is_exact() {
        assert_eq!(Action::parse("CREATE"), Some(Action::Create));
        assert_eq!(Action::parse("create"), None);
        assert_eq!(Action::parse("BOGUS"), None);
    }

    #[test]
    fn test_operation_serializes_camel_case() {
        let op = Operation::new("src/x.ts", Action::Modify);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["filePath"], "src/x.ts");
        assert_eq!(json["action"], "MODIFY");
    }
}
