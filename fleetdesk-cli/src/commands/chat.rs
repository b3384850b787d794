use std::{ops::ControlFlow, sync::Arc};

use anyhow::{Context, Result};
use clap::Args;
use client::{
    ConnectionState, HistoryOutcome, Messenger, MessengerError, MessengerUpdate, PublishResult,
    WsConnector,
};
use shared::{config::Config, models::ConversationId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
    task::JoinHandle,
};
use tracing::{debug, warn};

use super::{parse_conversation, session};
use crate::render;

const HELP: &str = "\
commands:
  /switch <id>     open another conversation
  /leave           close the current conversation
  /conversations   list conversations with unread counts
  /reconnect       reopen the live channel
  /help            show this help
  /quit            leave the chat
anything else is sent to the open conversation; start a line with // to send a literal /";

#[derive(Args, Debug)]
#[command(about = "Open a conversation and chat over the live channel")]
pub struct ChatArgs {
    /// Conversation to open first
    #[arg(long, alias = "conv", value_parser = parse_conversation)]
    pub conversation: ConversationId,
}

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatInput {
    Message(String),
    Switch(ConversationId),
    Leave,
    Reconnect,
    Conversations,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ChatInput {
    fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Self::Empty;
        }
        if let Some(literal) = line.strip_prefix("//") {
            return Self::Message(format!("/{literal}"));
        }
        let Some(command) = line.trim_start().strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("switch" | "open"), Some(id)) => Self::Switch(ConversationId::new(id)),
            (Some("leave"), None) => Self::Leave,
            (Some("reconnect"), None) => Self::Reconnect,
            (Some("conversations" | "list"), None) => Self::Conversations,
            (Some("help" | "?"), None) => Self::Help,
            (Some("quit" | "exit"), None) => Self::Quit,
            _ => Self::Unknown(line.trim().to_string()),
        }
    }
}

pub async fn run(args: ChatArgs, config: Config) -> Result<()> {
    let (backend, session) = session::authenticated(&config).await?;
    let auto_reconnect = config.reconnect.enabled;

    let (mut messenger, mut inbound) =
        Messenger::new(&config, session, Arc::new(backend), Arc::new(WsConnector));
    messenger
        .start()
        .await
        .with_context(|| format!("failed to open the live channel at {}", config.channel.url))?;
    let status = spawn_status_printer(messenger.watch_state());

    println!(
        "Connected as {}. Type /help for commands.",
        messenger.session().display_name()
    );
    open(&mut messenger, args.conversation).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(event) = inbound.recv() => {
                for update in messenger.handle_inbound(event) {
                    render_update(&mut messenger, update, auto_reconnect).await;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read from stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                if handle_input(&mut messenger, ChatInput::parse(&line)).await.is_break() {
                    break;
                }
            }
        }
    }

    messenger.disconnect().await;
    status.abort();
    println!("Bye.");
    Ok(())
}

async fn handle_input(messenger: &mut Messenger, input: ChatInput) -> ControlFlow<()> {
    match input {
        ChatInput::Empty => {}
        ChatInput::Message(text) => match messenger.send(&text) {
            Ok(PublishResult::Accepted) => {}
            Ok(PublishResult::TransportRejected { reason }) => {
                eprintln!("[not sent: {reason}]");
            }
            Err(err) => eprintln!("[not sent: {err}]"),
        },
        ChatInput::Switch(conversation) => open(messenger, conversation).await,
        ChatInput::Leave => match messenger.select_conversation(None) {
            Ok(_) => println!("[no conversation open]"),
            Err(err) => eprintln!("[leave failed: {err}]"),
        },
        ChatInput::Reconnect => recover(messenger).await,
        ChatInput::Conversations => {
            if let Err(err) = messenger.refresh_conversations().await {
                warn!(%err, "conversation refresh failed; showing cached list");
            }
            for summary in messenger.index().ordered() {
                println!("{}", render::summary_line(summary));
            }
        }
        ChatInput::Help => println!("{HELP}"),
        ChatInput::Unknown(line) => eprintln!("[unknown command {line}; type /help]"),
        ChatInput::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

async fn render_update(messenger: &mut Messenger, update: MessengerUpdate, auto_reconnect: bool) {
    match update {
        MessengerUpdate::MessageAppended(stored) => println!("{}", render::message_line(&stored)),
        MessengerUpdate::ConversationPatched {
            conversation,
            unread,
        } => {
            if unread > 0 {
                let title = messenger
                    .index()
                    .get(&conversation)
                    .map_or_else(|| conversation.to_string(), |summary| summary.title.clone());
                eprintln!("[{title}: {unread} unread]");
            }
        }
        MessengerUpdate::ConnectionLost { reason } => {
            eprintln!("[connection lost: {reason}]");
            if auto_reconnect {
                recover(messenger).await;
            } else {
                eprintln!("[type /reconnect to reopen the channel]");
            }
        }
    }
}

async fn open(messenger: &mut Messenger, conversation: ConversationId) {
    match messenger.open_conversation(conversation.clone()).await {
        Ok(HistoryOutcome::Applied { conversation, count }) => {
            print_history(messenger, &conversation, count);
        }
        Ok(HistoryOutcome::Failed { reason, .. }) => {
            eprintln!("[could not load history of {conversation}: {reason}]");
        }
        Ok(HistoryOutcome::Discarded) => debug!(%conversation, "history superseded"),
        Err(err) => eprintln!("[could not open {conversation}: {err}]"),
    }
}

async fn recover(messenger: &mut Messenger) {
    match messenger.reconnect().await {
        Ok(Some(HistoryOutcome::Applied { conversation, count })) => {
            eprintln!("[reconnected]");
            print_history(messenger, &conversation, count);
        }
        Ok(Some(HistoryOutcome::Failed {
            conversation,
            reason,
        })) => {
            eprintln!("[reconnected; history of {conversation} could not be reloaded: {reason}]");
        }
        Ok(_) => eprintln!("[reconnected]"),
        Err(MessengerError::Connection(err)) if err.is_auth_rejection() => {
            eprintln!("[reconnect refused: {err}; run `fleetdesk session login`]");
        }
        Err(err) => eprintln!("[reconnect failed: {err}; type /reconnect to try again]"),
    }
}

fn print_history(messenger: &Messenger, conversation: &ConversationId, count: usize) {
    let title = messenger
        .index()
        .get(conversation)
        .map_or_else(|| conversation.to_string(), |summary| summary.title.clone());
    println!("--- {title} ({count} messages) ---");
    for stored in messenger.store().messages() {
        println!("{}", render::message_line(stored));
    }
}

fn spawn_status_printer(mut state: watch::Receiver<ConnectionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            if let ConnectionState::Retrying { .. } = current {
                eprintln!("[{current}]");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            ChatInput::parse("truck 12 at gate 4"),
            ChatInput::Message("truck 12 at gate 4".into())
        );
    }

    #[test]
    fn double_slash_sends_a_literal_slash() {
        assert_eq!(
            ChatInput::parse("//switch is not a command"),
            ChatInput::Message("/switch is not a command".into())
        );
    }

    #[test]
    fn commands_are_recognized() {
        assert_eq!(
            ChatInput::parse("/switch 42"),
            ChatInput::Switch(ConversationId::new("42"))
        );
        assert_eq!(ChatInput::parse("/leave"), ChatInput::Leave);
        assert_eq!(ChatInput::parse("  /reconnect"), ChatInput::Reconnect);
        assert_eq!(ChatInput::parse("/list"), ChatInput::Conversations);
        assert_eq!(ChatInput::parse("/quit\r\n"), ChatInput::Quit);
        assert_eq!(ChatInput::parse("   "), ChatInput::Empty);
    }

    #[test]
    fn malformed_commands_are_unknown() {
        assert_eq!(
            ChatInput::parse("/switch"),
            ChatInput::Unknown("/switch".into())
        );
        assert_eq!(
            ChatInput::parse("/leave now"),
            ChatInput::Unknown("/leave now".into())
        );
    }
}
