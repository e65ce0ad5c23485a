//! In-memory conversation/message store.
//!
//! The store is single-writer: the session facade mutates it only while
//! applying a completion on its own context, so there is no interior locking.

use std::collections::HashMap;

use chat_shared::domain::UserId;
use tracing::debug;

use crate::models::{Conversation, ConversationKey, Message};

#[derive(Debug, Default, Clone)]
pub struct ConversationStore {
    conversations: HashMap<ConversationKey, Conversation>,
    order: Vec<ConversationKey>,
    active: Option<ConversationKey>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `conversation` unless its key is already present.
    pub fn add_conversation(&mut self, conversation: Conversation) -> bool {
        let key = conversation.key();
        if self.conversations.contains_key(&key) {
            return false;
        }
        self.order.push(key);
        self.conversations.insert(key, conversation);
        true
    }

    /// Appends `message` to its conversation and moves the last-message
    /// pointer. Messages for conversations the store does not know are
    /// dropped; no conversation is created implicitly.
    pub fn apply_incoming_message(&mut self, message: Message) -> bool {
        let key = message.conversation_key();
        let Some(conversation) = self.conversations.get_mut(&key) else {
            debug!(conversation = %key, message_id = message.id().0, "store: dropping message for unknown conversation");
            return false;
        };
        conversation.last_message = Some(message.clone());
        conversation.messages.push(message);
        true
    }

    pub fn set_active(&mut self, key: Option<ConversationKey>) {
        self.active = key;
    }

    pub fn active(&self) -> Option<ConversationKey> {
        self.active
    }

    /// Replaces the message list of the active conversation with a history
    /// page, in server order. Pages for any other conversation are ignored.
    pub fn apply_history_page(&mut self, key: ConversationKey, messages: Vec<Message>) -> bool {
        if self.active != Some(key) {
            debug!(conversation = %key, "store: ignoring history page for inactive conversation");
            return false;
        }
        let Some(conversation) = self.conversations.get_mut(&key) else {
            debug!(conversation = %key, "store: ignoring history page for unknown conversation");
            return false;
        };
        if let Some(last) = messages.last() {
            conversation.last_message = Some(last.clone());
        }
        conversation.messages = messages;
        true
    }

    /// Updates the online flag on every participant record of `user_id` and
    /// returns how many records changed.
    pub fn set_user_online(&mut self, user_id: UserId, online: bool) -> usize {
        let mut changed = 0;
        for conversation in self.conversations.values_mut() {
            for participant in conversation
                .participants
                .iter_mut()
                .filter(|participant| participant.id == user_id)
            {
                if participant.is_online != online {
                    participant.is_online = online;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// First conversation, in insertion order, in which `user_id` takes part
    /// as someone other than `self_id`.
    pub fn conversation_with(&self, user_id: UserId, self_id: UserId) -> Option<&Conversation> {
        if user_id == self_id {
            return None;
        }
        self.conversations()
            .find(|conversation| conversation.has_participant(user_id))
    }

    pub fn get(&self, key: ConversationKey) -> Option<&Conversation> {
        self.conversations.get(&key)
    }

    pub fn contains(&self, key: ConversationKey) -> bool {
        self.conversations.contains_key(&key)
    }

    pub fn messages(&self, key: ConversationKey) -> Option<&[Message]> {
        self.conversations
            .get(&key)
            .map(|conversation| conversation.messages())
    }

    pub fn message_count(&self, key: ConversationKey) -> usize {
        self.messages(key).map_or(0, <[Message]>::len)
    }

    /// Conversations in insertion order.
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.order
            .iter()
            .filter_map(|key| self.conversations.get(key))
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
        self.order.clear();
        self.active = None;
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
