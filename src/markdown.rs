//! Markdown to HTML rendering of messages and conversations.
//!
//! Message content is CommonMark with GFM tables and strikethrough.  Three
//! things differ from stock output:
//!
//! - images render inside a `generated-image` container with the alt text
//!   `AI Generated`, and only `data:image/`, `http:` and `https:` sources
//!   are kept;
//! - code spans carry the `inline-code` class;
//! - raw HTML in the source is escaped, never passed through.

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};

use crate::chat::{Conversation, Message};
use crate::render::{GENERATING_INDICATOR, IMAGE_ALT};
use crate::types::MessageRole;

/// Shown in place of an empty conversation.
pub const EMPTY_HINT: &str =
    "Comece uma conversa ou digite <code>/img prompt</code> para criar arte.";

/// Styles shared by the browser page and exported conversations.
pub const STYLESHEET: &str = include_str!("server/style.css");

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// Render one message's Markdown content to an HTML fragment.
pub fn render_markdown(content: &str) -> String {
    let mut events = Vec::new();
    let mut parser = Parser::new_ext(content, options());
    while let Some(event) = parser.next() {
        match event {
            Event::Start(Tag::Image { dest_url, .. }) => {
                // The alt text events run up to the matching end tag.
                let mut alt = String::new();
                let mut depth = 0usize;
                for inner in parser.by_ref() {
                    match inner {
                        Event::Start(_) => depth += 1,
                        Event::End(TagEnd::Image) if depth == 0 => break,
                        Event::End(_) => depth = depth.saturating_sub(1),
                        Event::Text(text) | Event::Code(text) => alt.push_str(&text),
                        _ => {}
                    }
                }
                events.push(image_event(&dest_url, &alt));
            }
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => {
                let dest_url = if is_safe_link(&dest_url) {
                    dest_url
                } else {
                    CowStr::Borrowed("#")
                };
                events.push(Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }));
            }
            Event::Code(code) => events.push(Event::Html(
                format!("<code class=\"inline-code\">{}</code>", escape_html(&code)).into(),
            )),
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            other => events.push(other),
        }
    }
    let mut out = String::with_capacity(content.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

fn image_event(src: &str, alt: &str) -> Event<'static> {
    if is_safe_image_source(src) {
        Event::Html(
            format!(
                "<div class=\"generated-image\"><img src=\"{}\" alt=\"{IMAGE_ALT}\"></div>",
                escape_html(src)
            )
            .into(),
        )
    } else {
        Event::Text(alt.to_string().into())
    }
}

/// True for the image sources the renderer keeps.
pub fn is_safe_image_source(src: &str) -> bool {
    let lower = src.trim_start().to_ascii_lowercase();
    lower.starts_with("data:image/") || lower.starts_with("http:") || lower.starts_with("https:")
}

fn is_safe_link(dest: &str) -> bool {
    let lower = dest.trim_start().to_ascii_lowercase();
    match lower.find(':') {
        // Relative references (no scheme before the first path separator).
        None => true,
        Some(colon) if lower[..colon].contains(['/', '?', '#']) => true,
        Some(_) => {
            lower.starts_with("http:") || lower.starts_with("https:") || lower.starts_with("mailto:")
        }
    }
}

/// Escape text for use in HTML content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render one message: user messages on the right, assistant messages on
/// the left.
pub fn render_message(message: &Message) -> String {
    let side = match message.role() {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    };
    format!(
        "<div class=\"message {side}\" id=\"{}\"><div class=\"bubble\">{}</div></div>\n",
        message.id(),
        render_markdown(message.content())
    )
}

/// Render the whole conversation.
///
/// An empty conversation renders the hint; `generating` appends the
/// transient image indicator after the last message.
pub fn render_conversation(conversation: &Conversation, generating: bool) -> String {
    let mut out = String::from("<div class=\"conversation\">\n");
    if conversation.is_empty() && !generating {
        out.push_str(&format!("<p class=\"empty-hint\">{EMPTY_HINT}</p>\n"));
    }
    for message in conversation.messages() {
        out.push_str(&render_message(message));
    }
    if generating {
        out.push_str(&format!(
            "<div class=\"message assistant generating\"><div class=\"bubble\">{GENERATING_INDICATOR}</div></div>\n"
        ));
    }
    out.push_str("</div>\n");
    out
}

/// A standalone HTML document of the conversation, as written by `/export`.
pub fn render_document(conversation: &Conversation) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"pt-BR\">\n<head>\n<meta charset=\"utf-8\">\n<title>duochat</title>\n<style>\n{STYLESHEET}</style>\n</head>\n<body>\n<main>\n{}</main>\n</body>\n</html>\n",
        render_conversation(conversation, false)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_and_emphasis() {
        assert_eq!(
            render_markdown("Olá **mundo**"),
            "<p>Olá <strong>mundo</strong></p>\n"
        );
    }

    #[test]
    fn generated_image_override() {
        let html = render_markdown("![Gerada: a cat](data:image/png;base64,AAAA)");
        assert_eq!(
            html,
            "<p><div class=\"generated-image\"><img src=\"data:image/png;base64,AAAA\" alt=\"AI Generated\"></div></p>\n"
        );
        assert!(!html.contains("Gerada"));
    }

    #[test]
    fn unsafe_image_sources_are_dropped() {
        let html = render_markdown("![x](javascript:alert(1))");
        assert!(!html.contains("<img"));
        assert!(!html.contains("javascript"));
        assert!(html.contains('x'));
        assert!(render_markdown("![y](https://example.com/y.png)").contains("<img"));
    }

    #[test]
    fn inline_code_is_styled_and_escaped() {
        assert_eq!(
            render_markdown("run `a<b>`"),
            "<p>run <code class=\"inline-code\">a&lt;b&gt;</code></p>\n"
        );
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = render_markdown("<script>alert('x')</script>\n\nhi <b>there</b>");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&lt;b&gt;"));
    }

    #[test]
    fn unsafe_links_are_neutralized() {
        let html = render_markdown("[click](javascript:alert(1))");
        assert!(!html.contains("javascript"));
        assert!(render_markdown("[ok](https://example.com)").contains("href=\"https://example.com\""));
        assert!(render_markdown("[rel](/docs/a:b)").contains("href=\"/docs/a:b\""));
    }

    #[test]
    fn tables_and_strikethrough() {
        let html = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~old~~");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
        assert!(html.contains("<del>old</del>"));
    }

    #[test]
    fn empty_conversation_shows_hint() {
        let html = render_conversation(&Conversation::new(), false);
        assert!(html.contains(EMPTY_HINT));
        assert!(!html.contains(GENERATING_INDICATOR));
    }

    #[test]
    fn messages_render_in_order_with_sides() {
        let mut conversation = Conversation::new();
        conversation.push_user("/img a cat");
        conversation.push_assistant("![Gerada: a cat](data:image/png;base64,AAAA)");
        let html = render_conversation(&conversation, false);
        let user = html.find("message user").unwrap();
        let assistant = html.find("message assistant").unwrap();
        assert!(user < assistant);
        assert!(html.contains("alt=\"AI Generated\""));
        assert!(!html.contains(EMPTY_HINT));
    }

    #[test]
    fn generating_indicator_follows_last_message() {
        let mut conversation = Conversation::new();
        conversation.push_user("/img a cat");
        let html = render_conversation(&conversation, true);
        let user = html.find("message user").unwrap();
        let indicator = html.find(GENERATING_INDICATOR).unwrap();
        assert!(user < indicator);
    }

    #[test]
    fn exported_document_is_standalone() {
        let mut conversation = Conversation::new();
        conversation.push_user("oi");
        let doc = render_document(&conversation);
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<style>"));
        assert!(doc.contains("<p>oi</p>"));
    }
}
