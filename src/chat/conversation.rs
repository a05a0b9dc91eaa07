//! The append-only message list shown to the user.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ChatMessage, MessageRole};

/// Identifies a message within one conversation.
///
/// Ids are handed out in creation order and never reused, not even after the
/// conversation is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// The raw id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    id: MessageId,
    role: MessageRole,
    content: String,
}

impl Message {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    /// The Markdown content.
    pub fn content(&self) -> &str {
        &self.content
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        ChatMessage::new(message.role, message.content.clone())
    }
}

/// An ordered, append-only sequence of messages.
///
/// Insertion order is display order.  Only the last message may grow, and
/// only if it is an assistant message.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    next_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, returning its id.
    pub fn push(&mut self, role: MessageRole, content: impl Into<String>) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(Message {
            id,
            role,
            content: content.into(),
        });
        id
    }

    /// Append a user message, returning its id.
    pub fn push_user(&mut self, content: impl Into<String>) -> MessageId {
        self.push(MessageRole::User, content)
    }

    /// Append an assistant message, returning its id.
    pub fn push_assistant(&mut self, content: impl Into<String>) -> MessageId {
        self.push(MessageRole::Assistant, content)
    }

    /// Append `text` to the content of message `id`.
    pub fn append(&mut self, id: MessageId, text: &str) -> Result<()> {
        match self.messages.last_mut() {
            Some(last) if last.id == id && last.role == MessageRole::Assistant => {
                last.content.push_str(text);
                Ok(())
            }
            _ => Err(Error::validation(
                format!("{id} is not the assistant message being streamed"),
                Some("id".to_string()),
            )),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The whole conversation as sent to the text backend.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(ChatMessage::from).collect()
    }

    /// Remove every message.  Ids keep increasing.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
