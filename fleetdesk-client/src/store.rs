//! Message list of the active conversation.
//!
//! History pages replace the list wholesale. Live pushes are appended in
//! arrival order. Pushes that land while a history fetch for the same
//! selection is still outstanding are remembered and re-appended after the
//! page arrives, unless the page already contains them.

use std::collections::HashSet;

use shared::models::{ChatMessage, ConversationId, Direction, MessageId};
use tracing::debug;

use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub message: ChatMessage,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Duplicate,
    OtherConversation,
}

#[derive(Debug, Default)]
pub struct MessageStore {
    active: Option<ConversationId>,
    messages: Vec<StoredMessage>,
    seen: HashSet<MessageId>,
    pending: bool,
    early: Vec<StoredMessage>,
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn messages(&self) -> &[StoredMessage] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// True while a history page for the active conversation is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Empties the store for a new selection.
    pub fn reset(&mut self, active: Option<ConversationId>) {
        self.pending = active.is_some();
        self.active = active;
        self.messages.clear();
        self.seen.clear();
        self.early.clear();
    }

    /// Keeps the current list but starts tracking early pushes for a re-fetch.
    pub fn mark_pending(&mut self) {
        self.pending = self.active.is_some();
        self.early.clear();
    }

    /// Replaces the contents with a history page, oldest first.
    ///
    /// Equal timestamps keep server order. Returns the number of messages now
    /// held.
    pub fn load_history(
        &mut self,
        conversation: &ConversationId,
        page: Vec<ChatMessage>,
        session: &Session,
    ) -> usize {
        let mut messages: Vec<StoredMessage> = page
            .into_iter()
            .map(|message| StoredMessage {
                direction: session.classify(&message),
                message,
            })
            .collect();
        messages.sort_by_key(|stored| stored.message.sent_at);

        let carried = if self.active.as_ref() == Some(conversation) {
            std::mem::take(&mut self.early)
        } else {
            Vec::new()
        };

        self.active = Some(conversation.clone());
        self.seen = messages.iter().map(|s| s.message.id.clone()).collect();
        self.messages = messages;
        for stored in carried {
            if self.seen.insert(stored.message.id.clone()) {
                self.messages.push(stored);
            }
        }
        self.pending = false;
        self.early.clear();

        debug!(%conversation, count = self.messages.len(), "history applied");
        self.messages.len()
    }

    /// Appends a live push for the active conversation.
    pub fn append_live(&mut self, message: ChatMessage, session: &Session) -> AppendOutcome {
        if self.active.as_ref() != Some(&message.conversation_id) {
            return AppendOutcome::OtherConversation;
        }
        if !self.seen.insert(message.id.clone()) {
            return AppendOutcome::Duplicate;
        }
        let stored = StoredMessage {
            direction: session.classify(&message),
            message,
        };
        if self.pending {
            self.early.push(stored.clone());
        }
        self.messages.push(stored);
        AppendOutcome::Appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{message, message_at, session};

    fn ids(store: &MessageStore) -> Vec<&str> {
        store.messages().iter().map(|s| s.message.id.as_str()).collect()
    }

    #[test]
    fn history_is_sorted_stably_by_send_time() {
        let mut store = MessageStore::new();
        store.reset(Some("c".into()));

        store.load_history(
            &"c".into(),
            vec![
                message_at("late", "c", "Ben", 30),
                message_at("tie-1", "c", "Ben", 10),
                message_at("tie-2", "c", "Ben", 10),
                message_at("early", "c", "Ben", 5),
            ],
            &session("Ana"),
        );

        assert_eq!(ids(&store), vec!["early", "tie-1", "tie-2", "late"]);
        assert!(!store.is_pending());
    }

    #[test]
    fn history_fully_replaces_previous_conversation() {
        let mut store = MessageStore::new();
        let me = session("Ana");
        store.load_history(&"a".into(), vec![message("1", "a", "Ben", "old")], &me);

        store.reset(Some("b".into()));
        store.load_history(&"b".into(), vec![message("2", "b", "Ben", "new")], &me);

        assert_eq!(ids(&store), vec!["2"]);
        assert_eq!(store.active(), Some(&ConversationId::new("b")));
    }

    #[test]
    fn live_messages_for_other_conversations_are_not_stored() {
        let mut store = MessageStore::new();
        store.reset(Some("a".into()));

        let outcome = store.append_live(message("1", "b", "Ben", "hi"), &session("Ana"));

        assert_eq!(outcome, AppendOutcome::OtherConversation);
        assert!(store.is_empty());
    }

    #[test]
    fn live_messages_keep_arrival_order_and_direction() {
        let mut store = MessageStore::new();
        let me = session("Ana");
        store.load_history(&"a".into(), Vec::new(), &me);

        store.append_live(message_at("2", "a", "Ben", 50), &me);
        store.append_live(message_at("1", "a", "Ana", 10), &me);

        assert_eq!(ids(&store), vec!["2", "1"]);
        assert_eq!(store.messages()[0].direction, Direction::Received);
        assert_eq!(store.messages()[1].direction, Direction::Sent);
    }

    #[test]
    fn duplicate_pushes_are_suppressed() {
        let mut store = MessageStore::new();
        let me = session("Ana");
        store.load_history(&"a".into(), vec![message("1", "a", "Ben", "hi")], &me);

        assert_eq!(
            store.append_live(message("1", "a", "Ben", "hi"), &me),
            AppendOutcome::Duplicate
        );
        assert_eq!(
            store.append_live(message("2", "a", "Ben", "yo"), &me),
            AppendOutcome::Appended
        );
        assert_eq!(
            store.append_live(message("2", "a", "Ben", "yo"), &me),
            AppendOutcome::Duplicate
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn pushes_during_pending_history_survive_the_replace() {
        let mut store = MessageStore::new();
        let me = session("Ana");
        store.reset(Some("a".into()));

        store.append_live(message_at("live", "a", "Ben", 100), &me);
        store.append_live(message_at("both", "a", "Ben", 90), &me);
        store.load_history(
            &"a".into(),
            vec![message_at("old", "a", "Ben", 1), message_at("both", "a", "Ben", 90)],
            &me,
        );

        assert_eq!(ids(&store), vec!["old", "both", "live"]);
    }

    #[test]
    fn pushes_after_history_are_not_carried_twice() {
        let mut store = MessageStore::new();
        let me = session("Ana");
        store.reset(Some("a".into()));
        store.load_history(&"a".into(), vec![message("1", "a", "Ben", "x")], &me);
        store.append_live(message("2", "a", "Ben", "y"), &me);

        store.mark_pending();
        store.load_history(
            &"a".into(),
            vec![message("1", "a", "Ben", "x"), message("2", "a", "Ben", "y")],
            &me,
        );

        assert_eq!(ids(&store), vec!["1", "2"]);
    }

    #[test]
    fn reset_without_selection_is_idle() {
        let mut store = MessageStore::new();
        store.reset(None);

        assert!(!store.is_pending());
        assert_eq!(
            store.append_live(message("1", "a", "Ben", "hi"), &session("Ana")),
            AppendOutcome::OtherConversation
        );
    }
}
