//! Prompt templates for analysis, generation and patch repair.

use crate::context::CodeContext;
use crate::conversation::{Message, Role};
use crate::operation::Operation;

/// Whole-response sentinel asking for the file to be removed
pub const DELETE_SENTINEL: &str = "DELETE_FILE";

/// System prompt sent with every completion request by the CLI
pub const SYSTEM_PROMPT: &str = "\
You are a careful software engineer turning a design discussion into concrete source \
files. Follow output format instructions exactly and never add commentary outside the \
requested format.";

const ANALYSIS_PROMPT: &str = "\
Below is a discussion between a developer and an assistant, followed by the current \
contents of the project. Decide which files must be created, modified or deleted so \
the project reflects everything agreed in the discussion.

Respond with a JSON array only. Each element must have exactly two keys:
- \"file_path\": path relative to the project root, using forward slashes
- \"action\": one of \"CREATE\", \"MODIFY\", \"DELETE\"

Return [] if no file needs to change.

<conversation>
{conversation}
</conversation>

<code-context>
{code_context}
</code-context>";

const GENERATION_PROMPT: &str = "\
Produce the complete final content of the file `{file_path}` ({action}) so that it \
reflects everything agreed in the discussion below.

{current_state}

Respond with the full file content only, with no explanations. Do not wrap it in a \
code fence. If the discussion concluded that this file should be removed, respond \
with exactly {delete_sentinel} and nothing else.

<conversation>
{conversation}
</conversation>

<code-context>
{code_context}
</code-context>";

const PATCH_REPAIR_PROMPT: &str = "\
The following unified diff failed to apply to `{file_path}`.

<error>
{error}
</error>

<failed-patch>
{patch}
</failed-patch>

<current-file>
{current}
</current-file>

Produce a corrected unified diff that applies cleanly to the current file and makes \
the same intended change. Respond with the diff only.";

/// Render messages as `[Role]: content` lines
pub fn serialize_history(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let label = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        out.push('[');
        out.push_str(label);
        out.push_str("]: ");
        out.push_str(&msg.content);
        out.push('\n');
    }
    out
}

pub fn analysis_prompt(history: &[Message], context: &CodeContext) -> String {
    ANALYSIS_PROMPT
        .replace("{code_context}", &context.render())
        .replace("{conversation}", &serialize_history(history))
}

/// Prompt for one CREATE/MODIFY operation.
///
/// `current` is the file's present content, `None` when it does not exist yet.
pub fn generation_prompt(
    op: &Operation,
    current: Option<&str>,
    history: &[Message],
    context: &CodeContext,
) -> String {
    let current_state = match current {
        Some(content) => format!(
            "The file currently contains:\n<current-file>\n{}\n</current-file>",
            content
        ),
        None => "The file does not exist yet; you are creating it.".to_string(),
    };

    GENERATION_PROMPT
        .replace("{file_path}", &op.file_path)
        .replace("{action}", op.action.as_str())
        .replace("{delete_sentinel}", DELETE_SENTINEL)
        .replace("{current_state}", &current_state)
        .replace("{code_context}", &context.render())
        .replace("{conversation}", &serialize_history(history))
}

pub fn patch_repair_prompt(file_path: &str, current: &str, patch: &str, error: &str) -> String {
    PATCH_REPAIR_PROMPT
        .replace("{file_path}", file_path)
        .replace("{error}", error)
        .replace("{current}", current)
        .replace("{patch}", patch)
}
