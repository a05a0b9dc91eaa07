//! The seam between the conversation logic and whatever answers it.
//!
//! The proxy server talks to the providers directly through [`Upstream`];
//! the native client talks to a running proxy through [`HttpBackend`].

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client as ReqwestClient;
use url::Url;

use crate::client::{TextClient, build_http_client, normalize_base_url};
use crate::error::{Error, Result};
use crate::image::ImageClient;
use crate::types::{ChatMessage, ChatRequest, ImageRequest, ImageResponse, ImageResult};

/// A finite, non-restartable sequence of text fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Something that can answer chat turns and generate images.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start streaming the reply to `messages`.
    ///
    /// An error here means nothing was streamed; errors yielded by the stream
    /// mean it broke after starting.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream>;

    /// Generate one image for `prompt`.
    async fn generate_image(&self, prompt: &str) -> Result<ImageResult>;
}

/// Direct provider access: Groq for text, Cloudflare for images.
#[derive(Debug, Clone)]
pub struct Upstream {
    text: TextClient,
    image: ImageClient,
}

impl Upstream {
    pub fn new(text: TextClient, image: ImageClient) -> Self {
        Self { text, image }
    }
}

#[async_trait]
impl ChatBackend for Upstream {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
        self.text.stream(&messages).await
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageResult> {
        self.image.generate(prompt).await
    }
}

/// Access through a running duochat server.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: ReqwestClient,
    chat_url: Url,
    image_url: Url,
}

impl HttpBackend {
    /// Create a backend for the server at `base_url` (e.g. `http://127.0.0.1:3000`).
    pub fn new(base_url: &str) -> Result<Self> {
        // Relative joins keep any path prefix the server is mounted under.
        let base = Url::parse(&normalize_base_url(base_url.to_string()))?;
        Ok(Self {
            client: build_http_client()?,
            chat_url: base.join("api/chat")?,
            image_url: base.join("api/image")?,
        })
    }

    async fn error_from_proxy(response: reqwest::Response) -> Error {
        let status_code = response.status().as_u16();
        let message = match response.json::<ImageResponse>().await {
            Ok(ImageResponse::Error { error }) => error,
            Ok(ImageResponse::Image { .. }) | Err(_) => format!("server answered {status_code}"),
        };
        Error::from_status(status_code, None, message, None)
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
        let response = self
            .client
            .post(self.chat_url.clone())
            .json(&ChatRequest::new(messages))
            .send()
            .await
            .map_err(|e| Error::from_send(e, None))?;
        if !response.status().is_success() {
            return Err(Self::error_from_proxy(response).await);
        }
        Ok(Box::pin(decode_utf8(response.bytes_stream())))
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageResult> {
        let response = self
            .client
            .post(self.image_url.clone())
            .json(&ImageRequest::new(prompt))
            .send()
            .await
            .map_err(|e| Error::from_send(e, None))?;
        if !response.status().is_success() {
            return Err(Self::error_from_proxy(response).await);
        }
        match response.json::<ImageResponse>().await {
            Ok(ImageResponse::Image { image }) => ImageResult::from_data_uri(image)
                .ok_or_else(|| Error::serialization("server answered a non-image URI", None)),
            Ok(ImageResponse::Error { error }) => Err(Error::internal_server(error)),
            Err(e) => Err(Error::serialization(
                format!("Failed to parse image response: {e}"),
                Some(Box::new(e)),
            )),
        }
    }
}

/// Decode a chunked byte stream into text, holding back incomplete UTF-8
/// sequences until the rest of the character arrives.
pub(crate) fn decode_utf8<S, E>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        |(mut stream, mut pending, done)| async move {
            if done {
                return None;
            }
            loop {
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        pending.extend_from_slice(&bytes);
                        match split_valid_utf8(&mut pending) {
                            Ok(Some(text)) => return Some((Ok(text), (stream, pending, false))),
                            Ok(None) => continue,
                            Err(e) => return Some((Err(e), (stream, pending, true))),
                        }
                    }
                    Some(Err(e)) => {
                        let err = Error::streaming(
                            format!("Error in HTTP stream: {e}"),
                            Some(Box::new(e)),
                        );
                        return Some((Err(err), (stream, pending, true)));
                    }
                    None if pending.is_empty() => return None,
                    None => {
                        let err = Error::encoding("stream ended inside a UTF-8 character", None);
                        return Some((Err(err), (stream, Vec::new(), true)));
                    }
                }
            }
        },
    )
}

/// Take the longest valid UTF-8 prefix out of `pending`.
fn split_valid_utf8(pending: &mut Vec<u8>) -> Result<Option<String>> {
    let valid = match std::str::from_utf8(&pending[..]) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => return Err(e.into()),
    };
    if valid == 0 {
        return Ok(None);
    }
    let rest = pending.split_off(valid);
    let text = String::from_utf8(std::mem::replace(pending, rest))
        .map_err(|e| Error::encoding(format!("UTF-8 error: {e}"), Some(Box::new(e))))?;
    Ok(Some(text))
}
