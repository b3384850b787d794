//! # Messenger
//!
//! Single owner of the messaging state: connection, subscriptions, message
//! list and conversation index. Front ends feed it reader events and user
//! actions and render the updates it returns.
//!
//! History responses are matched against the selection they were requested
//! for. Every selection change bumps a generation counter; a response carrying
//! an older generation is discarded whether it succeeded or failed.

use std::sync::Arc;

use shared::{
    config::Config,
    models::{ChatMessage, ConversationId},
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    api::{BackendError, MessagingBackend},
    connection::{
        Channel, ChannelEvent, ConnectionError, ConnectionManager, ConnectionState, Inbound,
        InboundReceiver,
    },
    index::ConversationIndex,
    publisher::{OutboundPublisher, PublishResult, SendError},
    reconnect::ReconnectPolicy,
    router::SubscriptionRouter,
    session::Session,
    store::{AppendOutcome, MessageStore, StoredMessage},
    transport::Connector,
};

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Proof of which selection a history request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTicket {
    conversation: ConversationId,
    generation: u64,
}

impl HistoryTicket {
    #[must_use]
    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    Applied {
        conversation: ConversationId,
        count: usize,
    },
    /// The channel is back but the history page could not be reloaded.
    Failed {
        conversation: ConversationId,
        reason: String,
    },
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessengerUpdate {
    MessageAppended(StoredMessage),
    ConversationPatched {
        conversation: ConversationId,
        unread: u64,
    },
    ConnectionLost {
        reason: String,
    },
}

#[derive(Debug)]
pub struct Messenger {
    session: Session,
    backend: Arc<dyn MessagingBackend>,
    connection: ConnectionManager,
    router: SubscriptionRouter,
    store: MessageStore,
    index: ConversationIndex,
    publisher: OutboundPublisher,
    generation: u64,
    page_size: u32,
}

impl Messenger {
    /// Wires a messenger for `session`. Nothing is opened until [`Self::start`].
    #[must_use]
    pub fn new(
        config: &Config,
        session: Session,
        backend: Arc<dyn MessagingBackend>,
        connector: Arc<dyn Connector>,
    ) -> (Self, InboundReceiver) {
        let (connection, inbound) = ConnectionManager::new(
            connector,
            config.channel.url.clone(),
            session.token().clone(),
            ReconnectPolicy::from_config(&config.reconnect),
        );
        let messenger = Self {
            session,
            backend,
            connection,
            router: SubscriptionRouter::new(config.channel.clone()),
            store: MessageStore::new(),
            index: ConversationIndex::new(),
            publisher: OutboundPublisher::new(config.channel.outbound_destination.clone()),
            generation: 0,
            page_size: config.history.page_size,
        };
        (messenger, inbound)
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    #[must_use]
    pub fn index(&self) -> &ConversationIndex {
        &self.index
    }

    #[must_use]
    pub fn selected(&self) -> Option<&ConversationId> {
        self.router.selected()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Connects, subscribes the general topic and loads the conversation list.
    ///
    /// # Errors
    /// The handshake, subscribe or conversation list failure.
    pub async fn start(&mut self) -> Result<(), MessengerError> {
        self.connection.connect().await?;
        self.router.attach(&mut self.connection)?;
        self.refresh_conversations().await?;
        info!(
            user = %self.session.display_name(),
            conversations = self.index.len(),
            "messenger started"
        );
        Ok(())
    }

    /// # Errors
    /// The backend failure; the index keeps its previous contents.
    pub async fn refresh_conversations(&mut self) -> Result<(), BackendError> {
        let summaries = self.backend.fetch_conversations().await?;
        self.index.replace(summaries);
        Ok(())
    }

    /// Switches the active conversation.
    ///
    /// The store is emptied and the conversation's unread count cleared right
    /// away; the returned ticket must accompany the history page for it. The
    /// selection changes even when the subscription cannot be opened.
    ///
    /// # Errors
    /// The subscribe or unsubscribe failure.
    pub fn select_conversation(
        &mut self,
        conversation: Option<ConversationId>,
    ) -> Result<Option<HistoryTicket>, MessengerError> {
        self.generation += 1;
        self.store.reset(conversation.clone());
        if let Some(id) = &conversation {
            self.index.mark_read(id);
        }
        let routed = self.router.select(&mut self.connection, conversation.as_ref());

        let ticket = conversation.map(|conversation| HistoryTicket {
            conversation,
            generation: self.generation,
        });
        routed?;
        Ok(ticket)
    }

    /// Requests the first history page for `ticket`.
    ///
    /// # Errors
    /// The backend failure.
    pub async fn fetch_history(
        &self,
        ticket: &HistoryTicket,
    ) -> Result<Vec<ChatMessage>, BackendError> {
        self.backend
            .fetch_history(&ticket.conversation, 0, self.page_size)
            .await
    }

    /// Applies a history result if `ticket` still matches the selection.
    ///
    /// # Errors
    /// The fetch failure of a still-current request.
    pub fn apply_history(
        &mut self,
        ticket: &HistoryTicket,
        result: Result<Vec<ChatMessage>, BackendError>,
    ) -> Result<HistoryOutcome, BackendError> {
        if !self.is_current(ticket) {
            debug!(
                conversation = %ticket.conversation,
                generation = ticket.generation,
                current = self.generation,
                "discarding stale history response"
            );
            return Ok(HistoryOutcome::Discarded);
        }
        let page = result?;
        let count = self
            .store
            .load_history(&ticket.conversation, page, &self.session);
        Ok(HistoryOutcome::Applied {
            conversation: ticket.conversation.clone(),
            count,
        })
    }

    /// Selects `conversation` and loads its history.
    ///
    /// # Errors
    /// The subscribe or history failure.
    pub async fn open_conversation(
        &mut self,
        conversation: ConversationId,
    ) -> Result<HistoryOutcome, MessengerError> {
        let Some(ticket) = self.select_conversation(Some(conversation))? else {
            return Ok(HistoryOutcome::Discarded);
        };
        let result = self.fetch_history(&ticket).await;
        Ok(self.apply_history(&ticket, result)?)
    }

    /// Turns one reader event into renderable updates.
    pub fn handle_inbound(&mut self, inbound: Inbound) -> Vec<MessengerUpdate> {
        let mut updates = Vec::new();
        for event in self.connection.accept(inbound) {
            match event {
                ChannelEvent::Message {
                    destination,
                    message,
                } => {
                    debug!(%destination, id = %message.id, "live message");
                    self.route_live(message, &mut updates);
                }
                ChannelEvent::Disconnected { reason } => {
                    self.router.reset();
                    updates.push(MessengerUpdate::ConnectionLost { reason });
                }
            }
        }
        updates
    }

    fn route_live(&mut self, message: ChatMessage, updates: &mut Vec<MessengerUpdate>) {
        if let Some(summary) = self
            .index
            .patch_from_live_message(&message, self.router.selected())
        {
            updates.push(MessengerUpdate::ConversationPatched {
                conversation: summary.id.clone(),
                unread: summary.unread_count,
            });
        }
        match self.store.append_live(message, &self.session) {
            AppendOutcome::Appended => {
                if let Some(stored) = self.store.messages().last() {
                    updates.push(MessengerUpdate::MessageAppended(stored.clone()));
                }
            }
            AppendOutcome::Duplicate => debug!("duplicate live message suppressed"),
            AppendOutcome::OtherConversation => {}
        }
    }

    /// Publishes `text` to the selected conversation.
    ///
    /// # Errors
    /// A precondition failure; see [`OutboundPublisher::send`].
    pub fn send(&mut self, text: &str) -> Result<PublishResult, SendError> {
        self.publisher.send(
            &mut self.connection,
            &self.session,
            text,
            self.router.selected(),
        )
    }

    /// Runs the reconnect state machine, restores subscriptions and reloads
    /// the history of the current selection.
    ///
    /// Subscription ids are kept while the old link is still up, which is the
    /// case when reconnecting is disabled. A failed history reload yields
    /// [`HistoryOutcome::Failed`]; the channel stays connected.
    ///
    /// # Errors
    /// The reconnect or resubscribe failure.
    pub async fn reconnect(&mut self) -> Result<Option<HistoryOutcome>, MessengerError> {
        let reconnected = self.connection.reconnect().await;
        if !self.connection.is_connected() {
            self.router.reset();
        }
        reconnected?;
        self.router.restore(&mut self.connection)?;

        let Some(conversation) = self.router.selected().cloned() else {
            return Ok(None);
        };
        self.generation += 1;
        self.store.mark_pending();
        let ticket = HistoryTicket {
            conversation,
            generation: self.generation,
        };
        let result = self.fetch_history(&ticket).await;
        match self.apply_history(&ticket, result) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) => {
                warn!(%err, "history reload after reconnect failed");
                Ok(Some(HistoryOutcome::Failed {
                    conversation: ticket.conversation,
                    reason: err.to_string(),
                }))
            }
        }
    }

    /// Idempotent teardown of the channel.
    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
        self.router.reset();
    }

    fn is_current(&self, ticket: &HistoryTicket) -> bool {
        ticket.generation == self.generation
            && self.router.selected() == Some(&ticket.conversation)
    }
}
