//! Terminal output for the chat application.
//!
//! The browser renders the conversation as HTML (see [`crate::markdown`]);
//! this module renders the same flow events for a terminal, where images
//! are summarized rather than drawn.

use std::io::{self, Stdout, Write};

use crate::types::ImageResult;

/// ANSI escape code for dim text (used for the generating indicator).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for the generating indicator).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for image summaries).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Text shown while an image is being generated.
pub const GENERATING_INDICATOR: &str = "Gerando sua imagem...";

/// Alt text every generated image is shown with.
pub const IMAGE_ALT: &str = "AI Generated";

/// Trait for rendering conversation output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Recording output in tests
pub trait Renderer: Send {
    /// Print a chunk of assistant text.
    ///
    /// This is called incrementally as tokens are streamed from the server.
    fn print_text(&mut self, text: &str);

    /// Show a generated image.
    fn print_image(&mut self, prompt: &str, image: &ImageResult);

    /// Called when an image generation starts.
    fn start_generating(&mut self, prompt: &str) {
        _ = prompt;
    }

    /// Called when an image generation ends, successfully or not.
    fn finish_generating(&mut self) {}

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);
}

/// One-line terminal summary of a generated image.
pub fn image_summary(image: &ImageResult) -> String {
    let kib = image.approximate_size().div_ceil(1024);
    format!("[{IMAGE_ALT} image: {kib} KB]")
}

/// Plain text renderer with optional ANSI styling.
///
/// This renderer outputs text directly to stdout with optional ANSI escape
/// codes for the generating indicator, image summaries and errors.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    line_start: bool,
    generating: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            line_start: true,
            generating: false,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{text}");
        self.line_start = text.ends_with('\n');
        self.flush();
    }

    fn end_line(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        self.write(text);
    }

    fn print_image(&mut self, prompt: &str, image: &ImageResult) {
        self.end_line();
        let line = self.styled(ANSI_CYAN, &format!("{} {prompt}", image_summary(image)));
        self.write(&line);
        self.write("\n");
    }

    fn start_generating(&mut self, prompt: &str) {
        self.end_line();
        let style = format!("{ANSI_DIM}{ANSI_ITALIC}");
        let line = self.styled(&style, &format!("{GENERATING_INDICATOR} ({prompt})"));
        self.write(&line);
        self.generating = true;
    }

    fn finish_generating(&mut self) {
        if self.generating {
            self.generating = false;
            self.write("\n");
        }
    }

    fn print_error(&mut self, error: &str) {
        self.end_line();
        eprintln!("{}", self.styled(ANSI_RED, &format!("Error: {error}")));
    }

    fn print_info(&mut self, info: &str) {
        self.end_line();
        println!("{info}");
        self.line_start = true;
        self.flush();
    }

    fn finish_response(&mut self) {
        self.end_line();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
        assert_eq!(renderer.styled(ANSI_RED, "x"), "x");
    }

    #[test]
    fn styled_wraps_in_escape_codes() {
        let renderer = PlainTextRenderer::with_color(true);
        assert_eq!(renderer.styled(ANSI_CYAN, "x"), "\x1b[36mx\x1b[0m");
    }

    #[test]
    fn image_summary_rounds_up() {
        let image = ImageResult::from_png_bytes(&[7u8; 1500]);
        assert_eq!(image_summary(&image), "[AI Generated image: 2 KB]");
        let image = ImageResult::from_png_bytes(&[7u8; 3]);
        assert_eq!(image_summary(&image), "[AI Generated image: 1 KB]");
    }
}
