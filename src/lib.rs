//! # Tweetgate Library
//!
//! A thin web service in front of the Twitter/X API v2. It posts tweets, reports
//! the authenticated account, tracks monthly usage against the free-tier
//! ceilings, and runs an optional bot that replies to mentions, with reply text
//! written either from a fixed prefix or by an OpenAI-compatible LLM.
//!
//! ## Features
//!
//! - HTTP server built on axum with request tracing
//! - Twitter/X API v2 client with OAuth 1.0a signing or OAuth 2.0 bearer tokens
//! - In-memory monthly usage counters with free-tier warnings
//! - Mention polling bot with duplicate suppression and runtime configuration
//! - Structured logging through `log`/`env_logger`
//!
//! ## Configuration
//!
//! See [`AppConfig::from_env`] for the environment variables. The required ones
//! are `TWITTER_ACCESS_TOKEN` and either `TWITTER_BEARER_TOKEN` or the
//! `TWITTER_API_KEY`/`TWITTER_API_KEY_SECRET` pair.
//!
//! ## API Endpoints
//!
//! - `GET /`: Service info
//! - `GET /health`: Health status
//! - `GET /account/whoami`: Authenticated account
//! - `POST /tweet`: Posts `{"text": ...}`
//! - `GET /system/usage`: Usage against the monthly ceilings
//! - `POST /bot/enable`, `POST /bot/disable`, `GET /bot/status`: Bot lifecycle
//! - `POST /bot/configure`, `POST /bot/configure-llm`: Bot settings

pub mod app;
pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod oauth;
pub mod reply;
pub mod twitter;
pub mod usage;

// Re-export commonly used types and functions
pub use app::{create_router, AppState};
pub use bot::{BotConfig, BotConfigUpdate, MentionBot, PollReport};
pub use config::{get_server_port, AppConfig};
pub use error::{AppError, Result};
pub use oauth::{
    build_bearer_auth_header, build_oauth1_header, build_oauth2_user_context_header, UserAuth,
};
pub use reply::{LlmReply, PrefixReply, ReplyGenerator};
pub use twitter::{MeteredApi, SocialApi, TwitterClient};
pub use usage::{UsageKind, UsageSnapshot, UsageTracker};

#[cfg(test)]
mod test_support;
