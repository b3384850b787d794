use metrics::counter;
use shared::models::{ConversationId, OutboundMessage, Timestamp};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{connection::Channel, session::Session};

/// Precondition failures, all detected before anything touches the network.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("no conversation selected")]
    NoConversationSelected,
    #[error("not connected")]
    NotConnected,
    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fire-and-forget outcome of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    Accepted,
    TransportRejected { reason: String },
}

impl PublishResult {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

#[derive(Debug, Clone)]
pub struct OutboundPublisher {
    destination: String,
}

impl OutboundPublisher {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    /// Publishes `text` to `conversation` as the session user.
    ///
    /// Surrounding whitespace is trimmed from the content.
    ///
    /// # Errors
    /// A [`SendError`] when a precondition fails; transport refusals are
    /// reported through [`PublishResult::TransportRejected`] instead.
    pub fn send(
        &self,
        channel: &mut dyn Channel,
        session: &Session,
        text: &str,
        conversation: Option<&ConversationId>,
    ) -> Result<PublishResult, SendError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let conversation = conversation.ok_or(SendError::NoConversationSelected)?;
        if !channel.is_connected() {
            return Err(SendError::NotConnected);
        }

        let envelope = OutboundMessage {
            conversation_id: conversation.clone(),
            sender: session.display_name().to_owned(),
            sender_id: session.profile().id.clone(),
            content: content.to_owned(),
            timestamp: Timestamp::now(),
        };
        let body = serde_json::to_string(&envelope)?;

        match channel.publish(&self.destination, body) {
            Ok(()) => {
                counter!("fleetdesk_messages_published_total").increment(1);
                debug!(%conversation, "message published");
                Ok(PublishResult::Accepted)
            }
            Err(err) => {
                warn!(%conversation, %err, "publish refused by transport");
                Ok(PublishResult::TransportRejected {
                    reason: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ChannelOp, RecordingChannel, session};

    fn publisher() -> OutboundPublisher {
        OutboundPublisher::new("/app/chat.sendMessage")
    }

    #[test]
    fn publishes_envelope_to_outbound_destination() {
        let mut channel = RecordingChannel::connected();

        let result = publisher()
            .send(&mut channel, &session("Ana"), "  on my way ", Some(&"7".into()))
            .unwrap();

        assert!(result.is_accepted());
        let [ChannelOp::Publish(destination, body)] = channel.ops.as_slice() else {
            panic!("expected one publish, got {:?}", channel.ops);
        };
        assert_eq!(destination, "/app/chat.sendMessage");
        let envelope: OutboundMessage = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.conversation_id, ConversationId::new("7"));
        assert_eq!(envelope.sender, "Ana");
        assert_eq!(envelope.content, "on my way");
    }

    #[test]
    fn whitespace_only_text_is_rejected_first() {
        let mut channel = RecordingChannel::disconnected();

        let err = publisher()
            .send(&mut channel, &session("Ana"), " \n\t", None)
            .unwrap_err();

        assert!(matches!(err, SendError::EmptyMessage));
        assert!(channel.ops.is_empty());
    }

    #[test]
    fn missing_selection_is_rejected_before_connection_check() {
        let mut channel = RecordingChannel::disconnected();

        let err = publisher()
            .send(&mut channel, &session("Ana"), "hello", None)
            .unwrap_err();

        assert!(matches!(err, SendError::NoConversationSelected));
    }

    #[test]
    fn disconnected_channel_is_rejected_without_publishing() {
        let mut channel = RecordingChannel::disconnected();

        let err = publisher()
            .send(&mut channel, &session("Ana"), "hello", Some(&"7".into()))
            .unwrap_err();

        assert!(matches!(err, SendError::NotConnected));
        assert!(channel.ops.is_empty());
    }

    #[test]
    fn transport_refusal_is_reported_not_raised() {
        let mut channel = RecordingChannel::connected();
        channel.refuse_publish = true;

        let result = publisher()
            .send(&mut channel, &session("Ana"), "hello", Some(&"7".into()))
            .unwrap();

        assert!(matches!(result, PublishResult::TransportRejected { .. }));
    }
}
