use anyhow::{Context, Result};
use client::{MessagingBackend, index::ConversationIndex};
use shared::config::Config;

use super::session;
use crate::render;

/// Prints every conversation, most recent activity first.
pub async fn list(config: &Config) -> Result<()> {
    let backend = session::authenticated_backend(config)?;
    let summaries = backend
        .fetch_conversations()
        .await
        .map_err(session::session_error)
        .context("failed to fetch conversations")?;

    let mut index = ConversationIndex::new();
    index.replace(summaries);
    if index.is_empty() {
        println!("No conversations.");
        return Ok(());
    }
    for summary in index.ordered() {
        println!("{}", render::summary_line(summary));
    }
    Ok(())
}
