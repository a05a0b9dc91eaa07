use serde::{Deserialize, Serialize};

/// Body of a request to the image generation proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRequest {
    /// The prompt, with the command token already stripped.
    pub prompt: String,
}

impl ImageRequest {
    /// Create a new `ImageRequest`.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}
