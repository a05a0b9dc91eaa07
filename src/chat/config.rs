//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use arrrg_derive::CommandLine;

use crate::chat::session::ImageFailurePolicy;

/// Server the native client talks to when none is given.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

/// Command-line arguments for the duochat-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the duochat server.
    #[arrrg(optional, "Server to talk to (default: http://127.0.0.1:3000)", "URL")]
    pub server: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Silently drop failed image generations.
    #[arrrg(flag, "Do not report failed image generations in the conversation")]
    pub drop_image_failures: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Base URL of the duochat server.
    pub server: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// What a failed image generation leaves in the conversation.
    pub image_failure_policy: ImageFailurePolicy,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Server: http://127.0.0.1:3000
    /// - Color: enabled
    /// - Image failures: surfaced as an assistant message
    pub fn new() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            use_color: true,
            image_failure_policy: ImageFailurePolicy::Surface,
        }
    }

    /// Sets the server URL.
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the image failure policy.
    pub fn with_image_failure_policy(mut self, policy: ImageFailurePolicy) -> Self {
        self.image_failure_policy = policy;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let image_failure_policy = if args.drop_image_failures {
            ImageFailurePolicy::Drop
        } else {
            ImageFailurePolicy::Surface
        };
        ChatConfig {
            server: args.server.unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            use_color: !args.no_color,
            image_failure_policy,
        }
    }
}
