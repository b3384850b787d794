use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::{ConversationId, MessageId, ParticipantId, Timestamp};

/// Whether a message was written by the local session or by someone else.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Direction::Sent => write!(f, "sent"),
            Direction::Received => write!(f, "received"),
        }
    }
}

/// A message as delivered by the history endpoint or a live push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,

    pub conversation_id: ConversationId,

    /// Display name of the author.
    #[serde(rename = "sender", alias = "senderName", default)]
    pub sender_name: String,

    /// Stable author id, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ParticipantId>,

    #[serde(alias = "text", alias = "body")]
    pub content: String,

    /// Send time; pushes without one are stamped on receipt.
    #[serde(rename = "timestamp", alias = "sentAt", default)]
    pub sent_at: Timestamp,
}

/// Envelope published to the outbound destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub conversation_id: ConversationId,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ParticipantId>,
    pub content: String,
    pub timestamp: Timestamp,
}
