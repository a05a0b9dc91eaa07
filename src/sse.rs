//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! This module turns the raw byte stream of an OpenAI-compatible
//! `chat/completions` response into a stream of parsed [`SseEvent`]s.
//! Events are delimited by a blank line; only `data:` fields carry payload.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::{ChatCompletionChunk, Error, Result};

/// A decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// One incremental completion chunk.
    Chunk(ChatCompletionChunk),

    /// The `[DONE]` end-of-stream marker.
    Done,
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Bytes are buffered until a complete event is available, so neither event
/// boundaries nor multi-byte UTF-8 characters need to line up with chunks.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result.map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    stream::unfold(
        (stream, Vec::<u8>::new(), false),
        move |(mut stream, mut buffer, mut exhausted)| async move {
            loop {
                if let Some((block, remaining)) = split_event(&buffer) {
                    buffer = remaining;
                    match parse_event(&block) {
                        Some(event) => return Some((event, (stream, buffer, exhausted))),
                        None => continue,
                    }
                }

                if exhausted {
                    // A final event without its trailing blank line.
                    let block = std::mem::take(&mut buffer);
                    if let Some(event) = parse_event(&block) {
                        return Some((event, (stream, buffer, exhausted)));
                    }
                    return None;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, exhausted))),
                    None => exhausted = true,
                }
            }
        },
    )
}

/// Split the first complete event off the front of `buffer`.
fn split_event(buffer: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let lf = find(buffer, b"\n\n").map(|at| (at, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|at| (at, 4));
    let (at, len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((buffer[..at].to_vec(), buffer[at + len..].to_vec()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse one event block; `None` for blocks that carry no data (comments,
/// keep-alives, stray whitespace).
fn parse_event(block: &[u8]) -> Option<Result<SseEvent>> {
    let text = match std::str::from_utf8(block) {
        Ok(text) => text,
        Err(e) => {
            return Some(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut data: Option<String> = None;
    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    let data = data?;
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(SseEvent::Done));
    }
    Some(parse_payload(data))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Error { error: ErrorDetail },
    Chunk(ChatCompletionChunk),
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

fn parse_payload(data: &str) -> Result<SseEvent> {
    match serde_json::from_str::<Payload>(data) {
        Ok(Payload::Chunk(chunk)) => Ok(SseEvent::Chunk(chunk)),
        Ok(Payload::Error { error }) => Err(Error::api(
            500,
            error.error_type.or_else(|| Some("stream_error".to_string())),
            error
                .message
                .unwrap_or_else(|| "upstream reported an error mid-stream".to_string()),
        )),
        Err(e) => Err(Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )),
    }
}
