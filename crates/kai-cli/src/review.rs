//! Interactive review of pending changes on the terminal

use async_trait::async_trait;
use kai_consolidate::{Error, FileDiff, ReviewDecision, ReviewGate};
use std::io::{BufRead, Write};

/// Prints unified diffs and asks for confirmation on stdin
pub struct TerminalReview;

#[async_trait]
impl ReviewGate for TerminalReview {
    async fn review(&self, diffs: &[FileDiff]) -> kai_consolidate::Result<ReviewDecision> {
        print!("{}", render_diffs(diffs));
        print!("Apply {} change(s)? [y/N] ", diffs.len());
        std::io::stdout().flush()?;

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| Error::Other(format!("Review prompt failed: {}", e)))??;

        Ok(parse_answer(&answer))
    }
}

fn render_diffs(diffs: &[FileDiff]) -> String {
    let mut out = String::new();
    for diff in diffs {
        out.push_str(&format!("=== {} {} ===\n", diff.change.as_str(), diff.file_path));
        out.push_str(&diff.unified);
        if !diff.unified.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Anything other than an explicit yes rejects
fn parse_answer(answer: &str) -> ReviewDecision {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => ReviewDecision::Approve,
        _ => ReviewDecision::Reject,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_consolidate::ChangeKind;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), ReviewDecision::Approve);
        assert_eq!(parse_answer(" YES "), ReviewDecision::Approve);
        assert_eq!(parse_answer("\n"), ReviewDecision::Reject);
        assert_eq!(parse_answer("nope"), ReviewDecision::Reject);
    }

    #[test]
    fn test_render_diffs() {
        let diffs = vec![FileDiff {
            file_path: "a.txt".into(),
            change: ChangeKind::Create,
            unified: "--- /dev/null\n+++ b/a.txt\n@@ -0,0 +1 @@\n+hi".into(),
        }];
        let rendered = render_diffs(&diffs);
        assert!(rendered.starts_with("=== create a.txt ===\n"));
        assert!(rendered.ends_with("+hi\n\n"));
    }
}
