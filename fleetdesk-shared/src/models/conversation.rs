use serde::{Deserialize, Serialize};

use super::{ConversationId, Timestamp};

/// Summary row of the conversation list.
///
/// The client reads these from the list endpoint and afterwards only patches
/// `last_message`, `last_activity_at` and `unread_count` from live pushes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default, alias = "preview")]
    pub last_message: String,
    #[serde(default, alias = "lastMessageAt", alias = "updatedAt")]
    pub last_activity_at: Option<Timestamp>,
    #[serde(default)]
    pub unread_count: u64,
}
