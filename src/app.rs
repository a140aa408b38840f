//! Shared application state and the HTTP router.

use axum::{
    routing::{get, post},
    Router,
};
use log::info;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::bot::{BotConfig, MentionBot};
use crate::config::AppConfig;
use crate::error::Result;
use crate::handlers::{
    handle_bot_configure, handle_bot_configure_llm, handle_bot_disable, handle_bot_enable,
    handle_bot_status, handle_health, handle_root, handle_tweet, handle_usage, handle_whoami,
};
use crate::llm::LlmClient;
use crate::reply::{LlmReply, ReplyGenerator};
use crate::twitter::{MeteredApi, SocialApi, TwitterClient};
use crate::usage::UsageTracker;

/// Everything the handlers share. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn SocialApi>,
    pub usage: Arc<UsageTracker>,
    pub bot: MentionBot,
}

impl AppState {
    /// Wires the state around an arbitrary API implementation.
    ///
    /// `api` is wrapped in [`MeteredApi`] so that both handlers and the bot
    /// count usage against `usage`.
    pub fn new<A>(
        api: A,
        usage: Arc<UsageTracker>,
        llm: Option<Arc<dyn ReplyGenerator>>,
        bot_config: BotConfig,
    ) -> Self
    where
        A: SocialApi + 'static,
    {
        let api: Arc<dyn SocialApi> = Arc::new(MeteredApi::new(api, usage.clone()));
        let bot = MentionBot::new(api.clone(), llm, bot_config);
        Self { api, usage, bot }
    }

    /// Builds the production state: real Twitter client, optional LLM.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let client = TwitterClient::connect(config).await?;
        info!("Twitter client ready for {}", client.base_url());

        let usage = Arc::new(UsageTracker::new(config.usage_limits));
        let llm = config.llm.clone().map(|llm_config| {
            Arc::new(LlmReply::new(LlmClient::new(llm_config))) as Arc<dyn ReplyGenerator>
        });

        Ok(Self::new(
            client,
            usage,
            llm,
            BotConfig::from(&config.bot),
        ))
    }
}

/// Builds the router with every route and the tracing middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/account/whoami", get(handle_whoami))
        .route("/tweet", post(handle_tweet))
        .route("/system/usage", get(handle_usage))
        .route("/bot/enable", post(handle_bot_enable))
        .route("/bot/disable", post(handle_bot_disable))
        .route("/bot/status", get(handle_bot_status))
        .route("/bot/configure", post(handle_bot_configure))
        .route("/bot/configure-llm", post(handle_bot_configure_llm))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
