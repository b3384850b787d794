use shared::{config::ChannelConfig, models::ConversationId};
use tracing::debug;

use crate::connection::{Channel, ConnectionError, SubscriptionId};

/// Keeps the always-on general subscription plus at most one
/// per-conversation subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionRouter {
    topics: ChannelConfig,
    general: Option<SubscriptionId>,
    active: Option<SubscriptionId>,
    selected: Option<ConversationId>,
}

impl SubscriptionRouter {
    #[must_use]
    pub fn new(topics: ChannelConfig) -> Self {
        Self {
            topics,
            general: None,
            active: None,
            selected: None,
        }
    }

    #[must_use]
    pub fn selected(&self) -> Option<&ConversationId> {
        self.selected.as_ref()
    }

    #[must_use]
    pub fn has_conversation_subscription(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.general.is_some()
    }

    /// Subscribes the general topic once per connection.
    ///
    /// # Errors
    /// Fails when the channel is not connected.
    pub fn attach(&mut self, channel: &mut dyn Channel) -> Result<(), ConnectionError> {
        if self.general.is_none() {
            self.general = Some(channel.subscribe(&self.topics.general_topic)?);
        }
        Ok(())
    }

    /// Moves the conversation subscription to `conversation`.
    ///
    /// The previous subscription is released before the new one is opened.
    /// The selection is recorded even when the channel refuses, so that
    /// [`Self::restore`] picks it up after a reconnect.
    ///
    /// # Errors
    /// Fails when the channel is not connected.
    pub fn select(
        &mut self,
        channel: &mut dyn Channel,
        conversation: Option<&ConversationId>,
    ) -> Result<(), ConnectionError> {
        if self.active.is_some() && self.selected.as_ref() == conversation {
            return Ok(());
        }
        self.selected = conversation.cloned();

        if let Some(previous) = self.active.take() {
            channel.unsubscribe(&previous)?;
        }
        if let Some(conversation) = conversation {
            let topic = self.topics.conversation_topic(conversation);
            self.active = Some(channel.subscribe(&topic)?);
            debug!(%conversation, "conversation topic active");
        }
        Ok(())
    }

    /// Forgets subscription ids after the link dropped; the broker released them.
    pub fn reset(&mut self) {
        self.general = None;
        self.active = None;
    }

    /// Re-establishes the general and the selected conversation subscriptions
    /// on a fresh connection.
    ///
    /// # Errors
    /// Fails when the channel is not connected.
    pub fn restore(&mut self, channel: &mut dyn Channel) -> Result<(), ConnectionError> {
        self.reset();
        self.attach(channel)?;
        if let Some(conversation) = self.selected.clone() {
            let topic = self.topics.conversation_topic(&conversation);
            self.active = Some(channel.subscribe(&topic)?);
        }
        Ok(())
    }
}
