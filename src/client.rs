use futures::future;
use futures::stream::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::backend::TokenStream;
use crate::error::{Error, Result};
use crate::sse::{SseEvent, process_sse};
use crate::types::ChatMessage;

/// The instruction prepended to every conversation sent upstream.
pub const SYSTEM_PROMPT: &str = "Você é um assistente AI prestativo, inteligente e direto. Responda em Markdown. Se o usuário pedir para gerar uma imagem, instrua-o a começar a frase com '/img'.";

/// The chat model used when none is configured.
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";

const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/";
const API_KEY_ENV: &str = "GROQ_API_KEY";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for an OpenAI-compatible streaming chat completion API (Groq).
///
/// Only connection setup is bounded here; callers bound the whole exchange.
#[derive(Debug, Clone)]
pub struct TextClient {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    model: String,
}

impl TextClient {
    /// Create a new text client.
    ///
    /// The API key can be provided directly or read from the GROQ_API_KEY
    /// environment variable.  A missing key is not an error here; the
    /// provider rejects the first request instead.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Result<Self> {
        let api_key = api_key
            .or_else(|| env::var(API_KEY_ENV).ok())
            .unwrap_or_default();
        let client = build_http_client()?;
        Ok(Self {
            api_key,
            client,
            base_url: normalize_base_url(base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string())),
            model: model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
        })
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::AUTHORIZATION, bearer(&self.api_key)?);
        Ok(headers)
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionRequest<'a> {
        let mut upstream = Vec::with_capacity(messages.len() + 1);
        upstream.push(UpstreamMessage {
            role: "system",
            content: SYSTEM_PROMPT,
        });
        upstream.extend(messages.iter().map(|message| UpstreamMessage {
            role: message.role.as_str(),
            content: &message.content,
        }));
        CompletionRequest {
            model: &self.model,
            messages: upstream,
            stream: true,
        }
    }

    /// Start a streamed completion for `messages`.
    ///
    /// Resolves once the provider has accepted the request; the returned
    /// stream then yields the text fragments in arrival order and ends at the
    /// provider's end-of-stream marker.
    pub async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let url = format!("{}chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.default_headers()?)
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| Error::from_send(e, None))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let tokens = process_sse(response.bytes_stream())
            .take_while(|event| future::ready(!matches!(event, Ok(SseEvent::Done))))
            .filter_map(|event| {
                future::ready(match event {
                    Ok(SseEvent::Chunk(chunk)) => chunk.text().map(|text| Ok(text.to_string())),
                    Ok(SseEvent::Done) => None,
                    Err(e) => Some(Err(e)),
                })
            });
        Ok(Box::pin(tokens))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<UpstreamMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct UpstreamMessage<'a> {
    role: &'a str,
    content: &'a str,
}

pub(crate) fn build_http_client() -> Result<ReqwestClient> {
    ReqwestClient::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })
}

pub(crate) fn bearer(token: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| Error::authentication("credential contains characters not valid in a header"))
}

pub(crate) fn normalize_base_url(mut base_url: String) -> String {
    if !base_url.ends_with('/') {
        base_url.push('/');
    }
    base_url
}

/// Convert a non-success provider response into an [`Error`].
///
/// Understands both the OpenAI shape (`{"error": {"type", "message"}}`) and
/// the Cloudflare shape (`{"errors": [{"message"}]}`); anything else is
/// reported as the raw body.
pub(crate) async fn error_from_response(response: Response) -> Error {
    let status_code = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    let error_body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            );
        }
    };

    let (error_type, message) = parse_error_body(&error_body);
    Error::from_status(status_code, error_type, message, retry_after)
}

fn parse_error_body(body: &str) -> (Option<String>, String) {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
        #[serde(default)]
        errors: Vec<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
    }

    let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) else {
        return (None, body.to_string());
    };
    let detail = parsed.error.or_else(|| parsed.errors.into_iter().next());
    match detail {
        Some(detail) => (
            detail.error_type,
            detail.message.unwrap_or_else(|| body.to_string()),
        ),
        None => (None, body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_creation() {
        let client = TextClient::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url, DEFAULT_API_URL);
        assert_eq!(client.model(), DEFAULT_CHAT_MODEL);

        let client = TextClient::with_options(
            Some("test-key".to_string()),
            Some("http://127.0.0.1:9999/v1".to_string()),
            Some("tiny".to_string()),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:9999/v1/");
        assert_eq!(client.model(), "tiny");
    }

    #[test]
    fn system_prompt_is_prepended_once() {
        let client = TextClient::new(Some("k".to_string())).unwrap();
        let messages = vec![
            ChatMessage::user("oi"),
            ChatMessage::assistant("Olá!"),
            ChatMessage::user("tudo bem?"),
        ];
        let body = serde_json::to_value(client.request_body(&messages)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": DEFAULT_CHAT_MODEL,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": "oi"},
                    {"role": "assistant", "content": "Olá!"},
                    {"role": "user", "content": "tudo bem?"},
                ],
                "stream": true,
            })
        );
    }

    #[test]
    fn bearer_rejects_newlines() {
        assert!(bearer("abc").is_ok());
        assert!(bearer("abc\ndef").unwrap_err().is_authentication());
    }

    #[test]
    fn error_bodies() {
        assert_eq!(
            parse_error_body(r#"{"error":{"type":"invalid_request_error","message":"bad model"}}"#),
            (
                Some("invalid_request_error".to_string()),
                "bad model".to_string()
            )
        );
        assert_eq!(
            parse_error_body(r#"{"success":false,"errors":[{"code":10000,"message":"Authentication error"}]}"#),
            (None, "Authentication error".to_string())
        );
        assert_eq!(
            parse_error_body("upstream exploded"),
            (None, "upstream exploded".to_string())
        );
    }
}
