//! The duochat web server.
//!
//! Credentials come from `GROQ_API_KEY`, `CLOUDFLARE_ACCOUNT_ID` and
//! `CLOUDFLARE_API_TOKEN`; logging is controlled by `RUST_LOG`.
//!
//! ```bash
//! duochat-server --bind 0.0.0.0:3000 --max-duration 30
//! ```

use std::sync::Arc;

use arrrg::CommandLine;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use duochat::server::{self, AppState, ServerArgs, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (args, _) = ServerArgs::from_command_line_relaxed("duochat-server [OPTIONS]");
    let config = ServerConfig::from(args);
    tracing::debug!(?config, "resolved configuration");

    let upstream = config.upstream()?;
    let state = AppState::new(Arc::new(upstream), config.max_duration);
    let listener = TcpListener::bind(&config.bind).await?;
    server::serve(listener, state).await?;
    Ok(())
}
