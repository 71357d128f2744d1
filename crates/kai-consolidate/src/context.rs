//! Snapshot of the source tree rendered into prompts.

use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Directories never walked
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// Limits for collecting a [`CodeContext`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Files larger than this are listed without content
    pub max_file_bytes: u64,
    /// Once this much content is collected, remaining files are listed only
    pub max_total_bytes: u64,
    /// Glob patterns matched against root-relative paths
    pub exclude: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 64 * 1024,
            max_total_bytes: 512 * 1024,
            exclude: Vec::new(),
        }
    }
}

/// One file in the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    /// Root-relative path with `/` separators
    pub path: String,
    /// `None` when the file was over a size limit
    pub content: Option<String>,
}

/// Prompt-ready view of a source tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeContext {
    pub files: Vec<ContextFile>,
}

impl CodeContext {
    pub fn from_files(files: Vec<ContextFile>) -> Self {
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Walk `root` and collect UTF-8 files in path order.
    ///
    /// Hidden directories, `target` and `node_modules` are skipped, as are
    /// binary files. A missing root yields an empty context.
    pub fn collect(root: &Path, config: &ContextConfig) -> Self {
        let excludes: Vec<Pattern> = config
            .exclude
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!("Ignoring invalid exclude pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();

        let mut paths = Vec::new();
        walk(root, "", &excludes, &mut paths);
        paths.sort();

        let mut total: u64 = 0;
        let mut files = Vec::with_capacity(paths.len());
        for rel in paths {
            let bytes = match fs::read(root.join(&rel)) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!("Skipping unreadable file {}: {}", rel, e);
                    continue;
                }
            };
            let Ok(text) = String::from_utf8(bytes) else {
                continue;
            };

            let size = text.len() as u64;
            let content = if size > config.max_file_bytes || total + size > config.max_total_bytes
            {
                None
            } else {
                total += size;
                Some(text)
            };
            files.push(ContextFile { path: rel, content });
        }

        tracing::debug!(files = files.len(), bytes = total, "collected code context");
        Self { files }
    }

    /// Render as `<file path="...">` blocks
    pub fn render(&self) -> String {
        if self.files.is_empty() {
            return "(no files)".to_string();
        }

        let mut out = String::new();
        for file in &self.files {
            match &file.content {
                Some(content) => {
                    out.push_str(&format!("<file path=\"{}\">\n", file.path));
                    out.push_str(content);
                    if !content.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str("</file>\n");
                }
                None => {
                    out.push_str(&format!("<file path=\"{}\" omitted=\"too large\" />\n", file.path));
                }
            }
        }
        out
    }
}

fn walk(dir: &Path, prefix: &str, excludes: &[Pattern], out: &mut Vec<String>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Cannot read directory {}: {}", dir.display(), e);
            }
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let rel = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        if excludes.iter().any(|p| p.matches(&rel)) {
            continue;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            walk(&entry.path(), &rel, excludes, out);
        } else if file_type.is_file() {
            out.push(rel);
        }
    }
}
