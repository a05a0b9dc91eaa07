//! The HTTP proxy: serves the browser page and relays the two upstream
//! providers behind `/api/chat` and `/api/image`.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::backend::ChatBackend;
use crate::error::{Error, Result};

mod config;
mod handlers;
mod page;

pub use config::{DEFAULT_BIND, ServerArgs, ServerConfig};
pub use handlers::IMAGE_ERROR_MESSAGE;
pub use page::index_html;

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn ChatBackend>,
    max_duration: Duration,
}

impl AppState {
    /// Wrap `backend`, bounding every text reply by `max_duration`.
    pub fn new(backend: Arc<dyn ChatBackend>, max_duration: Duration) -> Self {
        Self {
            backend,
            max_duration,
        }
    }
}

/// Build the routes: `GET /`, `POST /api/chat` and `POST /api/image`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page::index))
        .route("/api/chat", post(handlers::chat))
        .route("/api/image", post(handlers::image))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "duochat listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|err| Error::io("server stopped", err))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.proxy_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
