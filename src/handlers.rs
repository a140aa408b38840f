//! HTTP route handlers for the tweetgate service.
//!
//! This module contains all the HTTP route handler functions that process
//! incoming requests and return JSON responses. Failures are returned as
//! [`AppError`], which renders itself with the upstream status reflected.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::bot::{BotConfigUpdate, BotStatus};
use crate::error::{AppError, Result};
use crate::reply::{weighted_len, MAX_TWEET_CHARS};
use crate::twitter::{sanitize_for_logging, AccountInfo};
use crate::usage::UsageSnapshot;

/// Body of `POST /tweet`.
#[derive(Debug, Deserialize)]
pub struct TweetRequest {
    pub text: String,
}

/// Body of `POST /bot/configure-llm`.
#[derive(Debug, Deserialize)]
pub struct LlmToggle {
    pub use_llm: bool,
}

/// Handles GET requests to the root `/` endpoint.
///
/// # Returns
///
/// A JSON response containing:
/// - `message`: The service name
/// - `groups`: The route groups the service exposes
pub async fn handle_root() -> Json<Value> {
    Json(json!({
        "message": "Twitter API Client - tweetgate",
        "groups": ["account", "tweet", "system", "bot"]
    }))
}

/// Handles GET requests to the `/health` endpoint.
///
/// Used by load balancers and monitoring to check that the process is up. It
/// never calls the Twitter API.
///
/// # Returns
///
/// A JSON response containing:
/// - `status`: Always "healthy" when the service is running
/// - `service`: The service name "tweetgate"
///
/// # Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "tweetgate"
/// }
/// ```
pub async fn handle_health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "tweetgate"}))
}

/// Handles GET requests to `/account/whoami`.
///
/// Looks up the account the user-context credentials belong to. Counts as one
/// read against the monthly usage.
///
/// # Returns
///
/// - `Ok(Json<AccountInfo>)`: `id`, `username`, `name` and `description`
/// - `Err(AppError)`: the upstream failure, rendered with its status
pub async fn handle_whoami(State(state): State<AppState>) -> Result<Json<AccountInfo>> {
    match state.api.who_am_i().await {
        Ok(account) => Ok(Json(account)),
        Err(e) => {
            error!("Error getting user info: {}", e);
            Err(e)
        }
    }
}

/// Handles POST requests to the `/tweet` endpoint.
///
/// Posts `{"text": ...}` as a new tweet with user-context authentication. A
/// successful post counts once against both post ceilings.
///
/// # Returns
///
/// - `Ok(Json<Value>)`: Success response with the new tweet's ID
/// - `Err(AppError)`: Error response with status code and error details
///
/// # Success Response
///
/// ```json
/// {
///   "success": true,
///   "tweet_id": "1790000000000000000",
///   "text": "Hello world"
/// }
/// ```
///
/// # Errors
///
/// - 400 if `text` is blank, longer than 280 weighted characters (emoji and CJK
///   count twice), or the body is not valid JSON
/// - the upstream status if the Twitter API rejects the post
pub async fn handle_tweet(
    State(state): State<AppState>,
    payload: std::result::Result<Json<TweetRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(request) = payload?;
    if request.text.trim().is_empty() {
        return Err(AppError::InvalidRequest("text must not be empty".to_string()));
    }
    let length = weighted_len(&request.text);
    if length > MAX_TWEET_CHARS {
        return Err(AppError::InvalidRequest(format!(
            "text counts as {} characters, the limit is {}",
            length, MAX_TWEET_CHARS
        )));
    }

    match state.api.post_tweet(&request.text).await {
        Ok(tweet) => {
            info!("Tweet {} posted successfully", tweet.id);
            Ok(Json(json!({
                "success": true,
                "tweet_id": tweet.id,
                "text": request.text
            })))
        }
        Err(e) => {
            error!(
                "Failed to post tweet '{}': {}",
                sanitize_for_logging(&request.text, 80),
                e
            );
            Err(e)
        }
    }
}

/// Handles GET requests to `/system/usage`.
///
/// # Returns
///
/// This month's counts, the remaining headroom under each ceiling, the
/// ceilings themselves and `last_reset`, the first day of the accounting month.
pub async fn handle_usage(State(state): State<AppState>) -> Json<UsageSnapshot> {
    Json(state.usage.snapshot())
}

/// Handles POST requests to `/bot/enable`.
///
/// Starts the mention polling loop unless it is already running.
///
/// # Returns
///
/// `status`, whether the loop was `already_running`, and the current bot `config`.
pub async fn handle_bot_enable(State(state): State<AppState>) -> Json<Value> {
    let started = state.bot.enable();
    Json(json!({
        "status": "enabled",
        "already_running": !started,
        "config": state.bot.config()
    }))
}

/// Handles POST requests to `/bot/disable`.
///
/// The loop stops at its next wake-up; a poll in flight is allowed to finish.
///
/// # Returns
///
/// `status` and whether the loop `was_running`.
pub async fn handle_bot_disable(State(state): State<AppState>) -> Json<Value> {
    let was_running = state.bot.disable();
    Json(json!({
        "status": "disabled",
        "was_running": was_running
    }))
}

/// Handles GET requests to `/bot/status`.
pub async fn handle_bot_status(State(state): State<AppState>) -> Json<BotStatus> {
    Json(state.bot.status())
}

/// Handles POST requests to `/bot/configure`.
///
/// Accepts any subset of `check_interval_seconds`, `response_prefix` and
/// `use_llm`; omitted fields keep their current value.
///
/// # Returns
///
/// - `Ok(Json<Value>)`: the complete new config
/// - `Err(AppError)`: 400 for a zero interval, an over-long prefix, `use_llm`
///   without an LLM key, or a malformed body; the config is left unchanged
pub async fn handle_bot_configure(
    State(state): State<AppState>,
    payload: std::result::Result<Json<BotConfigUpdate>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(update) = payload?;
    let config = state.bot.configure(update).map_err(|e| {
        error!("Rejected bot configuration: {}", e);
        e
    })?;
    Ok(Json(json!({"status": "configured", "config": config})))
}

/// Handles POST requests to `/bot/configure-llm`.
///
/// Shortcut for toggling only `use_llm`, with the same validation as
/// [`handle_bot_configure`].
pub async fn handle_bot_configure_llm(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LlmToggle>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(toggle) = payload?;
    let config = state.bot.set_use_llm(toggle.use_llm).map_err(|e| {
        error!("Rejected LLM toggle: {}", e);
        e
    })?;
    Ok(Json(json!({"status": "configured", "config": config})))
}
