//! Subcommand implementations

mod consolidate;
mod patch;
mod session;

pub use consolidate::{ConsolidateOptions, run as consolidate};
pub use patch::run as patch;
pub use session::{add_message, list_sessions, new_session, show_session};
