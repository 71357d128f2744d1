//! Conversation state: an append-only list of role-tagged messages.

use serde::{Deserialize, Serialize};

/// Content of the system message that marks everything before it as consolidated.
pub const CONSOLIDATION_MARKER: &str = "[[kai:consolidated]]";

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// The success marker appended after a fully applied run
    pub fn consolidation_marker() -> Self {
        Self::system(CONSOLIDATION_MARKER)
    }

    /// True only for a system message whose content is exactly the marker
    pub fn is_consolidation_marker(&self) -> bool {
        self.role == Role::System && self.content == CONSOLIDATION_MARKER
    }
}

/// Append-only conversation.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_requires_system_role() {
        assert!(Message::consolidation_marker().is_consolidation_marker());
        assert!(!Message::user(CONSOLIDATION_MARKER).is_consolidation_marker());
        assert!(!Message::assistant(CONSOLIDATION_MARKER).is_consolidation_marker());
        assert!(!Message::system(format!("{} ", CONSOLIDATION_MARKER)).is_consolidation_marker());
    }

    #[test]
    fn test_message_serde_shape() {
        let msg = Message {
            role: Role::Assistant,
            content: "hi".into(),
            timestamp: 7,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");

        let parsed: Message = serde_json::from_str(r#"{"role":"user","content":"x"}"#).unwrap();
        assert_eq!(parsed.role, Role::User);
        assert_eq!(parsed.timestamp, 0);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("System"), Some(Role::System));
        assert_eq!(Role::parse("tool"), None);
    }
}
