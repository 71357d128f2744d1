//! Session management commands: new, add, sessions, show

use anyhow::{Context, anyhow, bail};
use kai_consolidate::{CONSOLIDATION_MARKER, Conversation, Message, Role, history};

use crate::session::{SessionStore, format_timestamp};

pub fn new_session(store: &SessionStore) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let session = store.create(&cwd).context("Failed to create session")?;
    println!("{}", session.id());
    Ok(())
}

pub fn add_message(store: &SessionStore, id: &str, role: &str, text: &str) -> anyhow::Result<()> {
    let role = Role::parse(role)
        .ok_or_else(|| anyhow!("Unknown role '{}' (expected user, assistant or system)", role))?;
    // Markers are only written by a successful consolidation run
    if text.trim() == CONSOLIDATION_MARKER {
        bail!("'{}' is reserved for consolidation checkpoints", CONSOLIDATION_MARKER);
    }
    let (mut session, _) = store
        .load(id)
        .with_context(|| format!("Failed to load session {}", id))?;
    session.append_message(&Message::new(role, text))?;
    Ok(())
}

pub fn list_sessions(store: &SessionStore) -> anyhow::Result<()> {
    let sessions = store.list().context("Failed to list sessions")?;
    if sessions.is_empty() {
        println!("No saved sessions found.");
        println!("Sessions are stored in: {}", store.dir().display());
        return Ok(());
    }

    println!("Saved sessions:\n");
    println!(
        "{:<38} {:<18} {:<6} {:<8} Working Dir",
        "ID", "Created", "Msgs", "Pending"
    );
    println!("{}", "-".repeat(100));
    for s in sessions {
        println!(
            "{:<38} {:<18} {:<6} {:<8} {}",
            s.id,
            s.created_at_display(),
            s.message_count,
            s.pending,
            s.working_dir
        );
    }
    println!("\nConsolidate with: kai consolidate --session <session-id>");
    Ok(())
}

pub fn show_session(store: &SessionStore, id: &str) -> anyhow::Result<()> {
    let (_, conversation) = store
        .load(id)
        .with_context(|| format!("Failed to load session {}", id))?;
    print!("{}", render_conversation(&conversation));
    Ok(())
}

fn render_conversation(conversation: &Conversation) -> String {
    let mut out = String::new();
    for message in conversation.messages() {
        let when = format_timestamp(message.timestamp);
        if message.is_consolidation_marker() {
            out.push_str(&format!("---- consolidated at {} ----\n", when));
            continue;
        }
        out.push_str(&format!("[{}] {}:\n", when, message.role.as_str()));
        for line in message.content.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str(&format!(
        "\n{} message(s), {} pending consolidation\n",
        conversation.len(),
        history::pending_count(conversation.messages())
    ));
    out
}
