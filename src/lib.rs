// Public modules
pub mod backend;
pub mod chat;
pub mod client;
pub mod error;
pub mod image;
pub mod markdown;
pub mod render;
pub mod server;
pub mod sse;
pub mod types;

mod observability;

// Re-exports
pub use backend::{ChatBackend, HttpBackend, TokenStream, Upstream};
pub use client::{DEFAULT_CHAT_MODEL, SYSTEM_PROMPT, TextClient};
pub use error::{Error, Result};
pub use image::{DEFAULT_IMAGE_MODEL, ImageClient};
pub use observability::register_biometrics;
pub use types::*;
