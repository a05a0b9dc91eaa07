use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// Body of a request to the text completion proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// The prior conversation, oldest first.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Create a new `ChatRequest` from an ordered history.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}
