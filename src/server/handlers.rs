use std::time::Instant;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, StreamExt};
use tokio::time::{self, Instant as Deadline};

use crate::backend::TokenStream;
use crate::error::Error;
use crate::observability::{
    IMAGE_BYTES, IMAGE_DURATION, IMAGE_ERRORS, IMAGE_REQUESTS, TEXT_BYTES, TEXT_DURATION,
    TEXT_ERRORS, TEXT_REQUESTS, TEXT_TIMEOUTS, TEXT_TTFB,
};
use crate::server::AppState;
use crate::types::{ChatRequest, ImageRequest, ImageResponse};

/// The only error detail the image endpoint ever reveals.
pub const IMAGE_ERROR_MESSAGE: &str = "Erro na geração";

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// `POST /api/chat`: stream a reply as plain UTF-8 text.
///
/// Failures before the first byte answer with an error status and a JSON
/// body; failures afterwards abort the body.  The configured ceiling covers
/// both phases.
pub(crate) async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    TEXT_REQUESTS.click();
    let started = Instant::now();
    let deadline = Deadline::now() + state.max_duration;

    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            TEXT_ERRORS.click();
            tracing::warn!(error = %err, "rejecting malformed chat request");
            return Error::bad_request(format!("invalid chat request: {err}"), None)
                .into_response();
        }
    };
    let message_count = request.messages.len();

    let opened = time::timeout_at(deadline, state.backend.stream_chat(request.messages)).await;
    let mut tokens = match opened {
        Ok(Ok(tokens)) => tokens,
        Ok(Err(err)) => return pre_stream_failure(err),
        Err(_) => return pre_stream_failure(deadline_exceeded(&state)),
    };

    // Hold the response until the first fragment so a stalled or refused
    // stream can still be reported with a status code.
    let first = match time::timeout_at(deadline, tokens.next()).await {
        Ok(Some(Ok(text))) => Some(text),
        Ok(Some(Err(err))) => return pre_stream_failure(err),
        Ok(None) => None,
        Err(_) => return pre_stream_failure(deadline_exceeded(&state)),
    };
    TEXT_TTFB.add(started.elapsed().as_secs_f64());
    tracing::info!(message_count, "streaming text reply");

    let body = relay(tokens, first, deadline, started, state.max_duration.as_secs_f64());
    ([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], Body::from_stream(body)).into_response()
}

fn pre_stream_failure(err: Error) -> Response {
    TEXT_ERRORS.click();
    tracing::error!(error = %err, "text reply failed before streaming");
    err.into_response()
}

fn deadline_exceeded(state: &AppState) -> Error {
    TEXT_TIMEOUTS.click();
    Error::timeout(
        "text reply exceeded its time budget",
        Some(state.max_duration.as_secs_f64()),
    )
}

struct Relay {
    tokens: TokenStream,
    first: Option<String>,
    deadline: Deadline,
    started: Instant,
    budget_secs: f64,
    bytes: usize,
    done: bool,
}

fn relay(
    tokens: TokenStream,
    first: Option<String>,
    deadline: Deadline,
    started: Instant,
    budget_secs: f64,
) -> impl futures::Stream<Item = Result<Bytes, Error>> + Send + 'static {
    let relay = Relay {
        tokens,
        first,
        deadline,
        started,
        budget_secs,
        bytes: 0,
        done: false,
    };
    stream::unfold(relay, |mut relay| async move {
        if relay.done {
            return None;
        }
        let next = match relay.first.take() {
            Some(text) => Ok(Some(Ok(text))),
            None => time::timeout_at(relay.deadline, relay.tokens.next()).await,
        };
        match next {
            Ok(Some(Ok(text))) => {
                relay.bytes += text.len();
                TEXT_BYTES.count(text.len() as u64);
                Some((Ok(Bytes::from(text)), relay))
            }
            Ok(Some(Err(err))) => {
                TEXT_ERRORS.click();
                tracing::error!(error = %err, bytes = relay.bytes, "text stream broke");
                relay.done = true;
                Some((Err(err), relay))
            }
            Ok(None) => {
                let elapsed = relay.started.elapsed();
                TEXT_DURATION.add(elapsed.as_secs_f64());
                tracing::info!(
                    bytes = relay.bytes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "text reply complete"
                );
                None
            }
            Err(_) => {
                TEXT_ERRORS.click();
                TEXT_TIMEOUTS.click();
                tracing::error!(bytes = relay.bytes, "text reply exceeded its time budget");
                relay.done = true;
                let err = Error::timeout(
                    "text reply exceeded its time budget",
                    Some(relay.budget_secs),
                );
                Some((Err(err), relay))
            }
        }
    })
}

/// `POST /api/image`: generate one image and answer it as a data URI.
///
/// Every failure answers `500 {"error": "Erro na geração"}`; the detail is
/// only logged.
pub(crate) async fn image(State(state): State<AppState>, body: Bytes) -> Response {
    IMAGE_REQUESTS.click();
    let started = Instant::now();
    let result = match serde_json::from_slice::<ImageRequest>(&body) {
        Ok(request) => state.backend.generate_image(&request.prompt).await,
        Err(err) => Err(Error::from(err)),
    };
    match result {
        Ok(image) => {
            let elapsed = started.elapsed();
            IMAGE_BYTES.count(image.approximate_size() as u64);
            IMAGE_DURATION.add(elapsed.as_secs_f64());
            tracing::info!(
                bytes = image.approximate_size(),
                elapsed_ms = elapsed.as_millis() as u64,
                "image generated"
            );
            Json(ImageResponse::from(image)).into_response()
        }
        Err(err) => {
            IMAGE_ERRORS.click();
            tracing::error!(error = %err, "image generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ImageResponse::Error {
                    error: IMAGE_ERROR_MESSAGE.to_string(),
                }),
            )
                .into_response()
        }
    }
}
