//! Input classification for the chat application.
//!
//! Every submission is classified exactly once: local session commands
//! (`/clear`, `/quit`, ...) never leave the process, the `/img` command
//! becomes an image request, and everything else is a chat turn.

/// The command token that routes a submission to the image backend.
pub const IMAGE_COMMAND: &str = "/img";

/// A chat turn bound for the text backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    /// The user's input, as typed.
    pub input: String,
}

/// An image command bound for the image backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCommand {
    /// The user's input, as typed; this is what the conversation shows.
    pub input: String,
    /// The prompt sent to the image model.
    pub prompt: String,
}

/// What a submission asks for, decided once when it is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Stream a text reply.
    Text(TextRequest),

    /// Generate an image.
    Image(ImageCommand),
}

/// Classifies user input.
///
/// Returns `None` for input that must be ignored: blank input, and an image
/// command with a blank prompt.  The prefix test runs on the trimmed,
/// lower-cased input, so `/IMG` and `/img` are equivalent.
///
/// # Examples
///
/// ```
/// # use duochat::chat::{Submission, parse_submission};
/// assert!(matches!(parse_submission("/img a red fox"), Some(Submission::Image(_))));
/// assert!(matches!(parse_submission("hello"), Some(Submission::Text(_))));
/// assert!(parse_submission("   ").is_none());
/// assert!(parse_submission("/img   ").is_none());
/// ```
pub fn parse_submission(input: &str) -> Option<Submission> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !is_image_command(trimmed) {
        return Some(Submission::Text(TextRequest {
            input: input.to_string(),
        }));
    }
    let prompt = trimmed[IMAGE_COMMAND.len()..].trim_start();
    if prompt.is_empty() {
        return None;
    }
    Some(Submission::Image(ImageCommand {
        input: input.to_string(),
        prompt: prompt.to_string(),
    }))
}

fn is_image_command(trimmed: &str) -> bool {
    trimmed
        .get(..IMAGE_COMMAND.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(IMAGE_COMMAND))
}

/// A parsed session command.
///
/// These commands control the local session and are never sent anywhere.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation history.
    Clear,

    /// Display help information.
    Help,

    /// Display session statistics.
    Stats,

    /// Write the conversation to a file as HTML.
    Export(String),

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for session commands.
///
/// Returns `Some(ChatCommand)` if the input is a session command, or `None`
/// if it should be submitted to the conversation (including `/img`).
///
/// # Examples
///
/// ```
/// # use duochat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/img a lighthouse").is_none());
/// assert!(parse_command("Olá!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') || is_image_command(input) {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => ChatCommand::Clear,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        "export" => match argument {
            Some(path) => ChatCommand::Export(path.to_string()),
            None => ChatCommand::Invalid("/export requires a file path".to_string()),
        },
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /img <prompt>          Generate an image instead of a text reply
  /clear                 Clear conversation history
  /export <file>         Write the conversation to an HTML file
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit the chat"#
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(input: &str) -> Option<String> {
        match parse_submission(input) {
            Some(Submission::Image(command)) => Some(command.prompt),
            _ => None,
        }
    }

    #[test]
    fn image_prefix_any_case() {
        assert_eq!(image("/img a red fox"), Some("a red fox".to_string()));
        assert_eq!(image("/IMG   a red fox"), Some("a red fox".to_string()));
        assert_eq!(image("  /Img\tcastelo  "), Some("castelo".to_string()));
    }

    #[test]
    fn image_prefix_without_separator() {
        assert_eq!(image("/imgfoo"), Some("foo".to_string()));
    }

    #[test]
    fn image_command_keeps_raw_input() {
        assert_eq!(
            parse_submission("  /img a cat "),
            Some(Submission::Image(ImageCommand {
                input: "  /img a cat ".to_string(),
                prompt: "a cat".to_string(),
            }))
        );
    }

    #[test]
    fn ignored_submissions() {
        assert_eq!(parse_submission(""), None);
        assert_eq!(parse_submission(" \n\t "), None);
        assert_eq!(parse_submission("/img"), None);
        assert_eq!(parse_submission("/IMG    "), None);
    }

    #[test]
    fn text_submissions() {
        assert_eq!(
            parse_submission("what is /img?"),
            Some(Submission::Text(TextRequest {
                input: "what is /img?".to_string(),
            }))
        );
        assert!(matches!(
            parse_submission("/im not a command"),
            Some(Submission::Text(_))
        ));
        assert!(matches!(parse_submission("/imágem"), Some(Submission::Text(_))));
    }

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
    }

    #[test]
    fn parse_export() {
        assert_eq!(
            parse_command("/export chat.html"),
            Some(ChatCommand::Export("chat.html".to_string()))
        );
        assert!(matches!(
            parse_command("/export"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
    }

    #[test]
    fn image_commands_are_not_session_commands() {
        assert_eq!(parse_command("/img a boat"), None);
        assert_eq!(parse_command("/IMG"), None);
    }

    #[test]
    fn unknown_commands() {
        assert_eq!(
            parse_command("/model x"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello!"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/img"));
        assert!(help.contains("/quit"));
        assert!(help.contains("/export"));
    }
}
