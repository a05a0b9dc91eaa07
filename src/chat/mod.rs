//! Conversation orchestration for the chat application.
//!
//! This module holds everything between the user's keystrokes and the
//! backend:
//!
//! - Classification of input into session commands, `/img` image requests
//!   and chat turns
//! - The append-only conversation and its single-writer orchestrator
//! - A session that runs requests as tasks and renders their flow events
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Submission classification and slash commands
//! - [`conversation`]: Messages and their ordering
//! - [`session`]: The orchestrator and the session that drives it

mod commands;
mod config;
mod conversation;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{
    ChatCommand, IMAGE_COMMAND, ImageCommand, Submission, TextRequest, help_text, parse_command,
    parse_submission,
};
pub use config::{ChatArgs, ChatConfig, DEFAULT_SERVER};
pub use conversation::{Conversation, Message, MessageId};
pub use session::{
    Action, Busy, ChatSession, FlowEvent, IMAGE_FAILURE_NOTICE, ImageFailurePolicy, Orchestrator,
    SessionStats,
};
