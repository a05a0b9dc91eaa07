// Public modules
pub mod chat_completion_chunk;
pub mod chat_message;
pub mod chat_request;
pub mod image_request;
pub mod image_result;

// Re-exports
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_message::{ChatMessage, MessageRole};
pub use chat_request::ChatRequest;
pub use image_request::ImageRequest;
pub use image_result::{ImageResponse, ImageResult, PNG_DATA_URI_PREFIX};
