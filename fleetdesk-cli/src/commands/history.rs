use anyhow::{Context, Result};
use clap::Args;
use client::{MessagingBackend, store::MessageStore};
use shared::{config::Config, models::ConversationId};

use super::{parse_conversation, session};
use crate::render;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Conversation identifier
    #[arg(long, alias = "conv", value_parser = parse_conversation)]
    pub conversation: ConversationId,

    /// Zero-based page number
    #[arg(long, default_value_t = 0)]
    pub page: u32,

    /// Page size; defaults to `history.page_size` from the configuration
    #[arg(long)]
    pub size: Option<u32>,
}

pub async fn show(args: HistoryArgs, config: &Config) -> Result<()> {
    let (backend, session) = session::authenticated(config).await?;
    let size = args.size.unwrap_or(config.history.page_size).max(1);
    let page = backend
        .fetch_history(&args.conversation, args.page, size)
        .await
        .map_err(session::session_error)
        .with_context(|| format!("failed to fetch history of {}", args.conversation))?;

    let mut store = MessageStore::new();
    store.reset(Some(args.conversation.clone()));
    store.load_history(&args.conversation, page, &session);

    if store.is_empty() {
        println!("No messages on page {}.", args.page);
    }
    for stored in store.messages() {
        println!("{}", render::message_line(stored));
    }
    Ok(())
}
