//! Conversation persistence in JSONL files

use kai_consolidate::{Conversation, Message};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Session entry types for JSONL format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEntry {
    /// Session metadata, always the first line
    Metadata {
        id: String,
        created_at: i64,
        working_dir: String,
    },
    /// A message in the conversation
    Message { message: Message },
}

/// Directory of session files
pub struct SessionStore {
    dir: PathBuf,
}

/// An open session, appending to its file
pub struct Session {
    id: String,
    writer: BufWriter<File>,
}

impl SessionStore {
    /// Get the default sessions directory
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kai")
            .join("sessions")
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", id))
    }

    /// Durable consolidation log for a session
    pub fn log_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.log.jsonl", id))
    }

    /// Create a new, empty session
    pub fn create(&self, working_dir: &Path) -> std::io::Result<Session> {
        let id = uuid::Uuid::new_v4().to_string();
        fs::create_dir_all(&self.dir)?;

        let file = File::create(self.session_path(&id))?;
        let mut session = Session {
            id: id.clone(),
            writer: BufWriter::new(file),
        };
        session.write_entry(&SessionEntry::Metadata {
            id,
            created_at: chrono::Utc::now().timestamp_millis(),
            working_dir: working_dir.display().to_string(),
        })?;
        Ok(session)
    }

    /// Load an existing session and its conversation
    pub fn load(&self, id: &str) -> std::io::Result<(Session, Conversation)> {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Session not found: {}", id),
            ));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut conversation = Conversation::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            if let Ok(SessionEntry::Message { message }) = serde_json::from_str::<SessionEntry>(&line) {
                conversation.push(message);
            }
        }

        // Open for appending
        let file = File::options().append(true).open(&path)?;
        Ok((
            Session {
                id: id.to_string(),
                writer: BufWriter::new(file),
            },
            conversation,
        ))
    }

    /// List all sessions, newest first
    pub fn list(&self) -> std::io::Result<Vec<SessionInfo>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_session = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".jsonl") && !n.ends_with(".log.jsonl"));
            if is_session {
                if let Some(info) = read_session_info(&path) {
                    sessions.push(info);
                }
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a message to the session
    pub fn append_message(&mut self, message: &Message) -> std::io::Result<()> {
        self.write_entry(&SessionEntry::Message {
            message: message.clone(),
        })
    }

    fn write_entry(&mut self, entry: &SessionEntry) -> std::io::Result<()> {
        writeln!(self.writer, "{}", serde_json::to_string(entry)?)?;
        self.writer.flush()
    }
}

fn read_session_info(path: &Path) -> Option<SessionInfo> {
    let reader = BufReader::new(File::open(path).ok()?);
    let mut lines = reader.lines().map_while(Result::ok);

    let SessionEntry::Metadata {
        id,
        created_at,
        working_dir,
    } = serde_json::from_str::<SessionEntry>(&lines.next()?).ok()?
    else {
        return None;
    };

    let mut message_count = 0;
    let mut pending = 0;
    for line in lines {
        if let Ok(SessionEntry::Message { message }) = serde_json::from_str::<SessionEntry>(&line) {
            message_count += 1;
            if message.is_consolidation_marker() {
                pending = 0;
            } else {
                pending += 1;
            }
        }
    }

    Some(SessionInfo {
        id,
        created_at,
        working_dir,
        message_count,
        pending,
    })
}

/// Information about a saved session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: i64,
    pub working_dir: String,
    pub message_count: usize,
    /// Messages after the last consolidation marker
    pub pending: usize,
}

impl SessionInfo {
    /// Format the created_at timestamp for display
    pub fn created_at_display(&self) -> String {
        format_timestamp(self.created_at)
    }
}

pub fn format_timestamp(millis: i64) -> String {
    use chrono::{TimeZone, Utc};
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_append_load() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        let mut session = store.create(Path::new("/work")).unwrap();
        session.append_message(&Message::user("hello")).unwrap();
        session.append_message(&Message::assistant("hi")).unwrap();
        let id = session.id().to_string();
        drop(session);

        let (mut session, conversation) = store.load(&id).unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].content, "hello");

        session.append_message(&Message::consolidation_marker()).unwrap();
        let (_, conversation) = store.load(&id).unwrap();
        assert!(conversation.last().unwrap().is_consolidation_marker());
    }

    #[test]
    fn test_load_missing_session() {
        let dir = TempDir::new().unwrap();
        let err = SessionStore::new(dir.path()).load("nope").err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_list_skips_logs_and_counts_pending() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        let mut session = store.create(Path::new("/work")).unwrap();
        session.append_message(&Message::user("a")).unwrap();
        session.append_message(&Message::consolidation_marker()).unwrap();
        session.append_message(&Message::user("b")).unwrap();
        let id = session.id().to_string();
        fs::write(store.log_path(&id), "{}\n").unwrap();

        let sessions = store.list().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);
        assert_eq!(sessions[0].message_count, 3);
        assert_eq!(sessions[0].pending, 1);
        assert_eq!(sessions[0].working_dir, "/work");
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(SessionStore::new(dir.path().join("none")).list().unwrap().is_empty());
    }
}
