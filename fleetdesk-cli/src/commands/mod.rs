pub mod chat;
pub mod completion;
pub mod config;
pub mod conversations;
pub mod history;
pub mod session;

use shared::models::ConversationId;

/// Clap value parser for conversation ids.
pub fn parse_conversation(raw: &str) -> Result<ConversationId, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("conversation id must not be empty".to_string());
    }
    Ok(ConversationId::new(trimmed))
}
