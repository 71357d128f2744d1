//! kai-ai: text-completion client abstraction
//!
//! Exposes the single `complete(prompt, tier)` seam the consolidation
//! pipeline depends on, plus Anthropic and OpenAI-compatible providers.

pub mod completion;
pub mod error;
pub mod models;
pub mod providers;
pub mod types;

pub use completion::{CompletionClient, ProviderClient};
pub use error::{Error, Result};
pub use types::*;
