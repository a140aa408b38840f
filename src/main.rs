//! # Tweetgate
//!
//! Entry point for the tweetgate web service.
//!
//! ## Environment Variables
//!
//! - `TWITTER_ACCESS_TOKEN`: user access token (required); signed with OAuth
//!   1.0a when `TWITTER_ACCESS_TOKEN_SECRET`, `TWITTER_API_KEY` and
//!   `TWITTER_API_KEY_SECRET` are also set
//! - `TWITTER_BEARER_TOKEN`: app-only bearer token, or `TWITTER_API_KEY` and
//!   `TWITTER_API_KEY_SECRET` to request one
//! - `LLM_API_KEY`: enables LLM-written replies
//! - `BOT_ENABLED`: start the mention bot at boot
//! - `PORT`: Server port (defaults to 8000)
//! - `RUST_LOG`: log filter

use log::{error, info};
use std::net::SocketAddr;
use std::process::ExitCode;

use tweetgate::{create_router, AppConfig, AppState};

/// Main entry point for the tweetgate web service.
///
/// Loads the configuration, connects the Twitter client, optionally starts the
/// mention bot, and serves HTTP until Ctrl+C. Exits with status 1 when the
/// configuration is invalid, the Twitter client cannot be set up, or the port
/// cannot be bound.
///
/// # Example Usage
///
/// ```bash
/// # Run with default port 8000
/// cargo run
///
/// # Run on custom port with debug logging
/// PORT=8080 RUST_LOG=debug cargo run
/// ```
#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logging system
    env_logger::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = match AppState::from_config(&config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize Twitter client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.bot.enabled {
        info!("BOT_ENABLED is set, starting mention bot");
        state.bot.enable();
    }

    let bot = state.bot.clone();
    let app = create_router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!("Starting tweetgate server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    bot.disable();
    match result {
        Ok(()) => {
            info!("tweetgate server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("HTTP server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}
