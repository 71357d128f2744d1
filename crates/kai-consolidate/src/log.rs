//! Durable per-conversation log of every request, response, phase change and error.

use kai_ai::{CompletionClient, Tier};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::conversation::{CONSOLIDATION_MARKER, Role};
use crate::error::{Error, Result};

/// Log entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Request,
    Response,
    System,
    Error,
}

/// One line of the durable log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
}

impl LogEntry {
    fn now(kind: LogKind, role: Role, content: Option<String>, error: Option<String>) -> Self {
        Self {
            kind,
            role,
            content,
            error,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// A prompt sent to the completion service
    pub fn request(content: impl Into<String>) -> Self {
        Self::now(LogKind::Request, Role::User, Some(content.into()), None)
    }

    /// Text returned by the completion service
    pub fn response(content: impl Into<String>) -> Self {
        Self::now(LogKind::Response, Role::Assistant, Some(content.into()), None)
    }

    /// Phase transitions and diagnostics
    pub fn system(content: impl Into<String>) -> Self {
        Self::now(LogKind::System, Role::System, Some(content.into()), None)
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::now(LogKind::Error, Role::System, None, Some(error.into()))
    }

    /// The success checkpoint
    pub fn marker() -> Self {
        Self::system(CONSOLIDATION_MARKER)
    }

    pub fn is_marker(&self) -> bool {
        self.kind == LogKind::System && self.content.as_deref() == Some(CONSOLIDATION_MARKER)
    }
}

/// Append-only destination for [`LogEntry`] values
pub trait LogSink: Send + Sync {
    fn append(&self, entry: &LogEntry) -> Result<()>;
}

/// Append, downgrading a failed write to a warning.
///
/// Only the success marker must reach the log; everything else is best effort.
pub(crate) fn record(log: &dyn LogSink, entry: LogEntry) {
    if let Err(e) = log.append(&entry) {
        tracing::warn!("Failed to write log entry: {}", e);
    }
}

/// JSONL file sink, one entry per line, flushed after every append
pub struct JsonlLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlLog {
    /// Open (or create) a log file for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::options().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every entry in a log file. Unparseable lines are skipped.
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<LogEntry>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::debug!("Skipping malformed log line: {}", e),
            }
        }
        Ok(entries)
    }
}

impl LogSink for JsonlLog {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        let line = serde_json::to_string(entry).map_err(|e| Error::Log(e.to_string()))?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line).map_err(|e| Error::Log(e.to_string()))?;
        writer.flush().map_err(|e| Error::Log(e.to_string()))?;
        Ok(())
    }
}

/// One completion call with its request and its response or error in the log.
pub(crate) async fn complete_logged(
    client: &dyn CompletionClient,
    log: &dyn LogSink,
    prompt: &str,
    tier: Tier,
) -> kai_ai::Result<String> {
    record(log, LogEntry::request(prompt));
    tracing::debug!(tier = tier.as_str(), prompt_bytes = prompt.len(), "completion request");

    match client.complete(prompt, tier).await {
        Ok(text) => {
            record(log, LogEntry::response(text.as_str()));
            Ok(text)
        }
        Err(e) => {
            record(log, LogEntry::error(e.to_string()));
            Err(e)
        }
    }
}
