//! The ordered message history of one conversation.

use crate::model::{Message, Role};

/// Messages of a conversation, starting with the system prompt.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Every message, system prompt included.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Every message after the system prompt.
    pub fn history(&self) -> &[Message] {
        let start = self
            .messages
            .iter()
            .position(|m| m.role != Role::System)
            .unwrap_or(self.messages.len());
        &self.messages[start..]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Drop everything but the system prompt.
    pub fn clear(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
