//! Configuration module for the tweetgate service.
//!
//! This module contains configuration structures and environment variable handling
//! for the Twitter/X API integration, the optional LLM reply generator, the usage
//! ceilings and the mention bot defaults.
//!
//! Everything is read through a lookup function so that tests can feed a plain
//! map instead of mutating the process environment.

use log::{debug, error, info, warn};
use std::env;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::oauth::{OAuth1Keys, UserAuth};

/// Default Twitter API v2 base URL.
pub const DEFAULT_TWITTER_API_BASE_URL: &str = "https://api.x.com/2";

/// Default OpenAI-compatible chat completions endpoint.
pub const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

pub const DEFAULT_LLM_SYSTEM_PROMPT: &str = "You are a friendly Twitter bot. Reply to the user's \
mention in one or two short sentences. Never use hashtags and never exceed 240 characters.";

pub const DEFAULT_PORT: u16 = 8000;

/// Masks a secret for logging, keeping at most the first and last eight characters.
///
/// Secrets of 16 characters or fewer only show their first half (at most eight
/// characters) so that short tokens are never logged in full.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    let len = chars.len();
    if len > 16 {
        let prefix: String = chars[..8].iter().collect();
        let suffix: String = chars[len - 8..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        let prefix: String = chars[..std::cmp::min(len / 2, 8)].iter().collect();
        format!("{}...", prefix)
    }
}

/// Twitter/X API credentials.
///
/// The access token authenticates posting and `users/me`. Together with the
/// access token secret and the API key pair it forms an OAuth 1.0a credential
/// and requests are signed; without the secret it is sent as an OAuth 2.0 User
/// Context token. The bearer token is an app-only token used for reading
/// mentions; when it is absent it can be minted from the API key and secret at
/// startup.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub api_key_secret: Option<String>,
    pub access_token: String,
    pub access_token_secret: Option<String>,
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked = |v: &Option<String>| v.as_deref().map(mask_secret);
        f.debug_struct("Credentials")
            .field("api_key", &masked(&self.api_key))
            .field("api_key_secret", &masked(&self.api_key_secret))
            .field("access_token", &mask_secret(&self.access_token))
            .field("access_token_secret", &masked(&self.access_token_secret))
            .field("bearer_token", &masked(&self.bearer_token))
            .finish()
    }
}

impl Credentials {
    /// Returns the API key and secret when both are configured.
    pub fn app_key_pair(&self) -> Option<(&str, &str)> {
        match (self.api_key.as_deref(), self.api_key_secret.as_deref()) {
            (Some(key), Some(secret)) => Some((key, secret)),
            _ => None,
        }
    }

    /// Returns the OAuth 1.0a keys when the API key pair and the access token
    /// secret are all configured.
    pub fn oauth1_keys(&self) -> Option<OAuth1Keys> {
        let (consumer_key, consumer_secret) = self.app_key_pair()?;
        let token_secret = self.access_token_secret.as_deref()?;
        Some(OAuth1Keys {
            consumer_key: consumer_key.to_string(),
            consumer_secret: consumer_secret.to_string(),
            token: self.access_token.clone(),
            token_secret: token_secret.to_string(),
        })
    }

    /// Picks OAuth 1.0a signing when possible, the OAuth 2.0 bearer otherwise.
    pub fn user_auth(&self) -> UserAuth {
        match self.oauth1_keys() {
            Some(keys) => UserAuth::OAuth1(keys),
            None => UserAuth::Bearer(self.access_token.clone()),
        }
    }
}

/// Settings for the OpenAI-compatible LLM used to write replies.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub system_prompt: String,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("system_prompt_len", &self.system_prompt.len())
            .finish()
    }
}

/// Monthly ceilings the usage tracker warns against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct UsageLimits {
    pub app_posts: u64,
    pub user_posts: u64,
    pub reads: u64,
}

impl Default for UsageLimits {
    /// Free tier: 500 posts per month at app and user level, 100 reads per month.
    fn default() -> Self {
        Self {
            app_posts: 500,
            user_posts: 500,
            reads: 100,
        }
    }
}

/// Startup defaults for the mention bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotDefaults {
    pub enabled: bool,
    pub check_interval_seconds: u64,
    pub response_prefix: String,
    pub use_llm: bool,
}

impl Default for BotDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval_seconds: 900,
            response_prefix: "🤖".to_string(),
            use_llm: false,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub twitter_api_base_url: String,
    pub llm: Option<LlmConfig>,
    pub usage_limits: UsageLimits,
    pub bot: BotDefaults,
    pub port: u16,
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present; variables
    /// already set in the environment take precedence over it.
    ///
    /// # Required Environment Variables
    ///
    /// - `TWITTER_ACCESS_TOKEN`: user access token; requests are signed with
    ///   OAuth 1.0a when `TWITTER_ACCESS_TOKEN_SECRET` and the API key pair are
    ///   also set
    /// - `TWITTER_BEARER_TOKEN`: app-only bearer token, unless both
    ///   `TWITTER_API_KEY` and `TWITTER_API_KEY_SECRET` are set
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a required credential is missing or a
    /// numeric/boolean variable cannot be parsed. Callers treat this as fatal.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment overrides from {}", path.display()),
            Err(e) if e.not_found() => debug!("No .env file found, using process environment"),
            Err(e) => warn!("Failed to read .env file: {}", e),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        info!("Loading tweetgate configuration");
        // Empty values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credentials = load_credentials(&get)?;

        let twitter_api_base_url = get("TWITTER_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_TWITTER_API_BASE_URL.to_string());

        let llm = match get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            Some(api_key) => {
                debug!("LLM API key (masked): {}", mask_secret(&api_key));
                let config = LlmConfig {
                    api_key,
                    api_url: get("LLM_API_URL").unwrap_or_else(|| DEFAULT_LLM_API_URL.to_string()),
                    model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                    system_prompt: get("LLM_SYSTEM_PROMPT")
                        .unwrap_or_else(|| DEFAULT_LLM_SYSTEM_PROMPT.to_string()),
                };
                info!("LLM reply generation available (model: {})", config.model);
                Some(config)
            }
            None => {
                info!("No LLM_API_KEY found - replies will use the response prefix only");
                None
            }
        };

        let defaults = UsageLimits::default();
        let usage_limits = UsageLimits {
            app_posts: parse_or(&get, "USAGE_LIMIT_APP_POSTS", defaults.app_posts)?,
            user_posts: parse_or(&get, "USAGE_LIMIT_USER_POSTS", defaults.user_posts)?,
            reads: parse_or(&get, "USAGE_LIMIT_READS", defaults.reads)?,
        };

        let bot_defaults = BotDefaults::default();
        let bot = BotDefaults {
            enabled: parse_bool_or(&get, "BOT_ENABLED", bot_defaults.enabled)?,
            check_interval_seconds: parse_or(
                &get,
                "BOT_CHECK_INTERVAL_SECONDS",
                bot_defaults.check_interval_seconds,
            )?,
            response_prefix: lookup("BOT_RESPONSE_PREFIX").unwrap_or(bot_defaults.response_prefix),
            use_llm: parse_bool_or(&get, "BOT_USE_LLM", bot_defaults.use_llm)?,
        };

        if bot.check_interval_seconds == 0 {
            error!("BOT_CHECK_INTERVAL_SECONDS must be greater than zero");
            return Err(AppError::Config(
                "BOT_CHECK_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }
        let bot = if bot.use_llm && llm.is_none() {
            warn!("BOT_USE_LLM is set but no LLM_API_KEY is configured - falling back to prefix replies");
            BotDefaults {
                use_llm: false,
                ..bot
            }
        } else {
            bot
        };

        let port = get_server_port(&get)?;

        info!("Configuration loaded successfully");
        Ok(AppConfig {
            credentials,
            twitter_api_base_url,
            llm,
            usage_limits,
            bot,
            port,
        })
    }
}

fn load_credentials<F>(get: &F) -> Result<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let access_token = match get("TWITTER_ACCESS_TOKEN") {
        Some(token) => {
            info!(
                "Found TWITTER_ACCESS_TOKEN environment variable with length: {}",
                token.len()
            );
            debug!("Access token (masked): {}", mask_secret(&token));
            if token.len() < 10 {
                warn!(
                    "Access token seems unusually short ({} characters)",
                    token.len()
                );
            }
            token
        }
        None => {
            error!("Make sure TWITTER_ACCESS_TOKEN environment variable is set");
            return Err(AppError::Config(
                "Missing TWITTER_ACCESS_TOKEN environment variable".to_string(),
            ));
        }
    };

    let api_key = get("TWITTER_API_KEY");
    let api_key_secret = get("TWITTER_API_KEY_SECRET");
    let bearer_token = get("TWITTER_BEARER_TOKEN");

    match (&bearer_token, &api_key, &api_key_secret) {
        (Some(token), _, _) => {
            debug!("Bearer token (masked): {}", mask_secret(token));
        }
        (None, Some(_), Some(_)) => {
            info!("No TWITTER_BEARER_TOKEN set - an app-only token will be requested with the API key and secret");
        }
        (None, _, _) => {
            error!("Either TWITTER_BEARER_TOKEN or both TWITTER_API_KEY and TWITTER_API_KEY_SECRET must be set");
            return Err(AppError::Config(
                "Missing TWITTER_BEARER_TOKEN (or TWITTER_API_KEY/TWITTER_API_KEY_SECRET) environment variable"
                    .to_string(),
            ));
        }
    }

    let access_token_secret = get("TWITTER_ACCESS_TOKEN_SECRET");
    match (&access_token_secret, &api_key, &api_key_secret) {
        (Some(_), Some(_), Some(_)) => {
            info!("OAuth 1.0a user context enabled - posts and account lookups will be signed");
        }
        (Some(_), _, _) => {
            warn!("TWITTER_ACCESS_TOKEN_SECRET is set without TWITTER_API_KEY/TWITTER_API_KEY_SECRET - sending the access token as an OAuth 2.0 bearer token");
        }
        (None, _, _) => {
            info!("No TWITTER_ACCESS_TOKEN_SECRET - sending the access token as an OAuth 2.0 bearer token");
        }
    }

    Ok(Credentials {
        api_key,
        api_key_secret,
        access_token,
        access_token_secret,
        bearer_token,
    })
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            error!("Invalid value for {}: {}", key, e);
            AppError::Config(format!("{} must be a valid number: {}", key, e))
        }),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(get: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(AppError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, v
        ))),
        None => Ok(default),
    }
}

/// Gets the server port from the `PORT` variable or returns the default (8000).
///
/// # Errors
///
/// Returns [`AppError::Config`] when `PORT` is set but is not a valid port number.
pub fn get_server_port<F>(get: &F) -> Result<u16>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(get, "PORT", DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("TWITTER_ACCESS_TOKEN", "access-token-0123456789"),
        ("TWITTER_BEARER_TOKEN", "bearer-token-0123456789"),
    ];

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_lookup(lookup_from(MINIMAL)).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.twitter_api_base_url, "https://api.x.com/2");
        assert_eq!(config.usage_limits, UsageLimits::default());
        assert_eq!(config.bot, BotDefaults::default());
        assert!(config.llm.is_none());
        assert_eq!(
            config.credentials.bearer_token.as_deref(),
            Some("bearer-token-0123456789")
        );
    }

    #[test]
    fn test_missing_access_token_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[("TWITTER_BEARER_TOKEN", "x")]))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("TWITTER_ACCESS_TOKEN")));
    }

    #[test]
    fn test_empty_access_token_counts_as_missing() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("TWITTER_ACCESS_TOKEN", "  "),
            ("TWITTER_BEARER_TOKEN", "bearer"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_bearer_token_or_key_pair_required() {
        let err = AppConfig::from_lookup(lookup_from(&[(
            "TWITTER_ACCESS_TOKEN",
            "access-token-0123456789",
        )]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("TWITTER_BEARER_TOKEN")));

        let config = AppConfig::from_lookup(lookup_from(&[
            ("TWITTER_ACCESS_TOKEN", "access-token-0123456789"),
            ("TWITTER_API_KEY", "key"),
            ("TWITTER_API_KEY_SECRET", "secret"),
        ]))
        .unwrap();
        assert!(config.credentials.bearer_token.is_none());
        assert_eq!(config.credentials.app_key_pair(), Some(("key", "secret")));
    }

    #[test]
    fn test_full_key_set_selects_oauth1_signing() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("TWITTER_API_KEY", "consumer-key"),
            ("TWITTER_API_KEY_SECRET", "consumer-secret"),
            ("TWITTER_ACCESS_TOKEN", "12345-AbCdEfGhIj"),
            ("TWITTER_ACCESS_TOKEN_SECRET", "token-secret"),
        ]))
        .unwrap();

        let keys = config.credentials.oauth1_keys().unwrap();
        assert_eq!(keys.consumer_key, "consumer-key");
        assert_eq!(keys.token, "12345-AbCdEfGhIj");
        assert_eq!(keys.token_secret, "token-secret");
        assert!(matches!(config.credentials.user_auth(), UserAuth::OAuth1(_)));
    }

    #[test]
    fn test_partial_key_set_falls_back_to_bearer() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("TWITTER_ACCESS_TOKEN_SECRET", "token-secret"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert!(config.credentials.oauth1_keys().is_none());
        assert!(matches!(
            config.credentials.user_auth(),
            UserAuth::Bearer(token) if token == "access-token-0123456789"
        ));
    }

    #[test]
    fn test_get_server_port() {
        let port = get_server_port(&lookup_from(&[])).unwrap();
        assert_eq!(port, 8000);

        let port = get_server_port(&lookup_from(&[("PORT", "8080")])).unwrap();
        assert_eq!(port, 8080);

        assert!(get_server_port(&lookup_from(&[("PORT", "not-a-port")])).is_err());
    }

    #[test]
    fn test_bot_and_usage_overrides() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend_from_slice(&[
            ("BOT_ENABLED", "true"),
            ("BOT_CHECK_INTERVAL_SECONDS", "120"),
            ("BOT_RESPONSE_PREFIX", "[bot]"),
            ("USAGE_LIMIT_READS", "250"),
            ("TWITTER_API_BASE_URL", "http://localhost:9000/2/"),
        ]);
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert!(config.bot.enabled);
        assert_eq!(config.bot.check_interval_seconds, 120);
        assert_eq!(config.bot.response_prefix, "[bot]");
        assert_eq!(config.usage_limits.reads, 250);
        assert_eq!(config.usage_limits.app_posts, 500);
        assert_eq!(config.twitter_api_base_url, "http://localhost:9000/2");
    }

    #[test]
    fn test_invalid_numbers_and_zero_interval_rejected() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("USAGE_LIMIT_READS", "lots"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("BOT_CHECK_INTERVAL_SECONDS", "0"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("BOT_ENABLED", "maybe"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_use_llm_requires_llm_key() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("BOT_USE_LLM", "true"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(!config.bot.use_llm);

        pairs.push(("OPENAI_API_KEY", "sk-test-0123456789abcdef"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(config.bot.use_llm);
        let llm = config.llm.unwrap();
        assert_eq!(llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(llm.api_url, DEFAULT_LLM_API_URL);
    }

    #[test]
    fn test_mask_secret_never_reveals_short_tokens() {
        assert_eq!(mask_secret("abcdefghijklmnopqrstuvwxyz"), "abcdefgh...stuvwxyz");
        assert_eq!(mask_secret("abcdefghij"), "abcde...");
        assert_eq!(mask_secret("ab"), "a...");
        assert_eq!(mask_secret(""), "...");
    }

    #[test]
    fn test_debug_output_masks_credentials() {
        let config = AppConfig::from_lookup(lookup_from(MINIMAL)).unwrap();
        let debug = format!("{:?}", config.credentials);
        assert!(!debug.contains("access-token-0123456789"));
        assert!(debug.contains("access-t..."));
    }
}
