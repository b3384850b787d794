use std::{cmp::Reverse, collections::HashMap};

use shared::models::{ChatMessage, ConversationId, ConversationSummary};

/// Conversation summaries keyed by id, patched by every live message.
#[derive(Debug, Default)]
pub struct ConversationIndex {
    entries: HashMap<ConversationId, ConversationSummary>,
}

impl ConversationIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a fresh conversation list, dropping whatever was known before.
    pub fn replace(&mut self, summaries: Vec<ConversationSummary>) {
        self.entries = summaries
            .into_iter()
            .map(|summary| (summary.id.clone(), summary))
            .collect();
    }

    #[must_use]
    pub fn get(&self, id: &ConversationId) -> Option<&ConversationSummary> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Updates preview and activity time for the message's conversation and
    /// bumps its unread count unless it is the `active` one.
    ///
    /// Returns the patched summary; unknown conversations are left for the
    /// next list refresh.
    pub fn patch_from_live_message(
        &mut self,
        message: &ChatMessage,
        active: Option<&ConversationId>,
    ) -> Option<&ConversationSummary> {
        let summary = self.entries.get_mut(&message.conversation_id)?;
        summary.last_message.clone_from(&message.content);
        summary.last_activity_at = Some(message.sent_at);
        if active != Some(&message.conversation_id) {
            summary.unread_count = summary.unread_count.saturating_add(1);
        }
        Some(&*summary)
    }

    pub fn mark_read(&mut self, id: &ConversationId) {
        if let Some(summary) = self.entries.get_mut(id) {
            summary.unread_count = 0;
        }
    }

    /// Summaries by most recent activity; conversations without activity last.
    #[must_use]
    pub fn ordered(&self) -> Vec<&ConversationSummary> {
        let mut summaries: Vec<&ConversationSummary> = self.entries.values().collect();
        summaries.sort_by(|a, b| {
            Reverse(a.last_activity_at)
                .cmp(&Reverse(b.last_activity_at))
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        summaries
    }
}
