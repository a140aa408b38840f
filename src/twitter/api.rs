//! Core Twitter API client.
//!
//! [`TwitterClient`] talks to the Twitter/X API v2 over reqwest. Every call goes
//! through [`TwitterClient::send`], which logs the exchange and turns non-2xx
//! responses into [`AppError::RemoteApi`]. Nothing is retried.

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::json;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::oauth::{build_bearer_auth_header, fetch_app_bearer_token, token_endpoint, UserAuth};

use super::types::{parse_mentions, AccountInfo, DataEnvelope, MentionPage, PostedTweet};
use super::SocialApi;

/// Page size for mention timeline requests (the endpoint maximum).
const MENTIONS_PAGE_SIZE: u32 = 100;

/// Sanitizes text for safe logging by truncating and escaping control characters.
///
/// Newlines and tabs become spaces, other control characters become `?`, and
/// text longer than `max_len` characters is cut with a note of its full size.
pub fn sanitize_for_logging(text: &str, max_len: usize) -> String {
    let sanitized: String = text
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => '?',
            c => c,
        })
        .collect();

    if sanitized.chars().count() > max_len {
        let truncated: String = sanitized.chars().take(max_len).collect();
        format!(
            "{}... [truncated, {} total bytes]",
            truncated,
            text.len()
        )
    } else {
        sanitized
    }
}

/// Twitter API v2 client holding both authentication contexts.
#[derive(Clone)]
pub struct TwitterClient {
    http: Client,
    base_url: String,
    user_auth: UserAuth,
    app_token: String,
}

impl TwitterClient {
    /// Creates a client from already-resolved credentials.
    ///
    /// # Parameters
    ///
    /// - `base_url`: API v2 base URL, e.g. `https://api.x.com/2`
    /// - `user_auth`: How posting and `users/me` are authenticated
    /// - `app_token`: App-only bearer token for the mention timeline
    pub fn new(base_url: impl Into<String>, user_auth: UserAuth, app_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_auth,
            app_token: app_token.into(),
        }
    }

    /// Creates a client from the service configuration.
    ///
    /// When no bearer token is configured, an app-only token is requested with
    /// the API key and secret.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let credentials = &config.credentials;
        let app_token = match (&credentials.bearer_token, credentials.app_key_pair()) {
            (Some(token), _) => token.clone(),
            (None, Some((key, secret))) => {
                let token_url = token_endpoint(&config.twitter_api_base_url);
                fetch_app_bearer_token(&Client::new(), &token_url, key, secret).await?
            }
            (None, None) => {
                return Err(AppError::Config(
                    "No bearer token and no API key pair to request one".to_string(),
                ))
            }
        };

        let user_auth = credentials.user_auth();
        info!("User context requests authenticate with {}", user_auth.scheme());

        Ok(Self::new(
            config.twitter_api_base_url.clone(),
            user_auth,
            app_token,
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a request and returns the response body on success.
    ///
    /// Non-success statuses become [`AppError::RemoteApi`] carrying the upstream
    /// status and a sanitized excerpt of the body.
    async fn send(&self, request_builder: RequestBuilder, operation_name: &str) -> Result<String> {
        info!(
            "Making authenticated request for operation: {}",
            operation_name
        );

        let response = request_builder.send().await.map_err(|e| {
            error!("Request for operation '{}' failed: {}", operation_name, e);
            AppError::Http(e)
        })?;

        let status = response.status();
        info!(
            "Received response with status: {} for operation: {}",
            status, operation_name
        );

        let response_text = response.text().await?;
        if status.is_success() {
            debug!(
                "Response summary for '{}': {} bytes received",
                operation_name,
                response_text.len()
            );
            return Ok(response_text);
        }

        error!("Operation '{}' failed - Status: {}", operation_name, status);
        debug!(
            "Error response for '{}': {}",
            operation_name,
            sanitize_for_logging(&response_text, 200)
        );

        let mut message = sanitize_for_logging(&response_text, 200);
        if status == StatusCode::FORBIDDEN && operation_name.contains("tweet") {
            message = format!(
                "Permission error: {}. Ensure your Twitter app has write permissions enabled in the Twitter Developer Portal.",
                message
            );
        }

        Err(AppError::RemoteApi {
            operation: operation_name.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn create_tweet(
        &self,
        payload: serde_json::Value,
        operation_name: &str,
    ) -> Result<PostedTweet> {
        let url = format!("{}/tweets", self.base_url);
        debug!("Request URL: {}", url);
        debug!(
            "Request headers: Authorization: {} [REDACTED], Content-Type: application/json",
            self.user_auth.scheme()
        );
        debug!(
            "Request payload: {}",
            sanitize_for_logging(&payload.to_string(), 400)
        );

        let request_builder = self
            .http
            .post(&url)
            .header("Authorization", self.user_auth.authorization("POST", &url)?)
            .json(&payload);

        let body = self.send(request_builder, operation_name).await?;
        let envelope: DataEnvelope<PostedTweet> = serde_json::from_str(&body)?;
        info!("Created tweet {}", envelope.data.id);
        Ok(envelope.data)
    }
}

#[async_trait]
impl SocialApi for TwitterClient {
    async fn post_tweet(&self, text: &str) -> Result<PostedTweet> {
        info!(
            "Starting tweet post operation for text: '{}'",
            sanitize_for_logging(text, 80)
        );
        self.create_tweet(json!({ "text": text }), "post_tweet").await
    }

    async fn reply_to_tweet(&self, text: &str, in_reply_to_id: &str) -> Result<PostedTweet> {
        info!(
            "Starting reply operation to tweet {} with text: '{}'",
            in_reply_to_id,
            sanitize_for_logging(text, 80)
        );
        let payload = json!({
            "text": text,
            "reply": {
                "in_reply_to_tweet_id": in_reply_to_id
            }
        });
        self.create_tweet(payload, "reply_to_tweet").await
    }

    async fn who_am_i(&self) -> Result<AccountInfo> {
        let url = format!(
            "{}/users/me?user.fields=username,name,description",
            self.base_url
        );
        let request_builder = self
            .http
            .get(&url)
            .header("Authorization", self.user_auth.authorization("GET", &url)?);

        let body = self.send(request_builder, "who_am_i").await?;
        let envelope: DataEnvelope<AccountInfo> = serde_json::from_str(&body)?;
        info!(
            "Authenticated as @{} ({})",
            envelope.data.username, envelope.data.id
        );
        Ok(envelope.data)
    }

    async fn fetch_mentions_page(
        &self,
        account_id: &str,
        since_id: Option<&str>,
        pagination_token: Option<&str>,
    ) -> Result<MentionPage> {
        let mut url = format!(
            "{}/users/{}/mentions?max_results={}&expansions=author_id&user.fields=username&tweet.fields=created_at,author_id",
            self.base_url,
            urlencoding::encode(account_id),
            MENTIONS_PAGE_SIZE
        );
        if let Some(since_id) = since_id {
            url.push_str("&since_id=");
            url.push_str(&urlencoding::encode(since_id));
        }
        if let Some(token) = pagination_token {
            url.push_str("&pagination_token=");
            url.push_str(&urlencoding::encode(token));
        }
        info!("Mentions URL: {}", url);

        let request_builder = self
            .http
            .get(&url)
            .header("Authorization", build_bearer_auth_header(&self.app_token));

        let body = self.send(request_builder, "fetch_mentions").await?;
        let page = parse_mentions(&body)?;
        if page.mentions.is_empty() {
            info!("No new mentions since {}", since_id.unwrap_or("the start"));
        } else {
            info!(
                "Found {} new mentions{}",
                page.mentions.len(),
                if page.next_token.is_some() { ", more pages follow" } else { "" }
            );
        }
        Ok(page)
    }
}
