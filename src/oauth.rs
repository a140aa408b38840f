//! OAuth authentication module for Twitter/X API integration.
//!
//! This module builds the Authorization headers for the three schemes the
//! service uses:
//!
//! - OAuth 1.0a User Context (HMAC-SHA1 signed), used for posting and
//!   `users/me` when the consumer key pair and the access token pair are all
//!   configured
//! - OAuth 2.0 User Context, the fallback for the same endpoints when only an
//!   OAuth 2.0 access token is available
//! - OAuth 2.0 Bearer Token (app-only), used for reading mentions
//!
//! It can also mint an app-only bearer token from the API key and secret.

use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::{debug, error, info};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;
use url::Url;

use crate::config::mask_secret;
use crate::error::{AppError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Length of the random `oauth_nonce` value.
const NONCE_LEN: usize = 32;

/// Builds the Authorization header for OAuth 2.0 Bearer Token authentication.
///
/// App-only bearer tokens are accepted by the read endpoints, including the
/// mention timeline the bot polls.
///
/// # Parameters
///
/// - `bearer_token`: The Bearer Token from the Twitter Developer Portal, or one
///   minted by [`fetch_app_bearer_token`]
///
/// # Returns
///
/// A properly formatted Authorization header string for Bearer Token authentication.
///
/// # Example
///
/// ```rust
/// use tweetgate::build_bearer_auth_header;
///
/// let header = build_bearer_auth_header("your_bearer_token");
/// assert_eq!(header, "Bearer your_bearer_token");
/// ```
pub fn build_bearer_auth_header(bearer_token: &str) -> String {
    format!("Bearer {}", bearer_token)
}

/// Builds the Authorization header for OAuth 2.0 User Context authentication.
///
/// The header format is the same as for app-only tokens; the distinction is
/// which token is passed in.
///
/// # Parameters
///
/// - `access_token`: An OAuth 2.0 access token obtained through the
///   Authorization Code Flow
///
/// # Returns
///
/// A properly formatted Authorization header string for OAuth 2.0 User Context authentication.
///
/// # Example
///
/// ```rust
/// use tweetgate::build_oauth2_user_context_header;
///
/// let header = build_oauth2_user_context_header("your_access_token");
/// assert_eq!(header, "Bearer your_access_token");
/// ```
pub fn build_oauth2_user_context_header(access_token: &str) -> String {
    format!("Bearer {}", access_token)
}

/// Consumer key pair plus access token pair for OAuth 1.0a User Context.
#[derive(Clone)]
pub struct OAuth1Keys {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

impl std::fmt::Debug for OAuth1Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Keys")
            .field("consumer_key", &mask_secret(&self.consumer_key))
            .field("consumer_secret", &mask_secret(&self.consumer_secret))
            .field("token", &mask_secret(&self.token))
            .field("token_secret", &mask_secret(&self.token_secret))
            .finish()
    }
}

/// How user-context requests (posting, `users/me`) are authenticated.
#[derive(Debug, Clone)]
pub enum UserAuth {
    /// Every request is signed with OAuth 1.0a HMAC-SHA1.
    OAuth1(OAuth1Keys),
    /// The access token is sent as an OAuth 2.0 bearer token.
    Bearer(String),
}

impl UserAuth {
    /// Returns the Authorization header value for one request.
    ///
    /// # Parameters
    ///
    /// - `method`: HTTP method of the request
    /// - `url`: Full request URL, including any query string
    ///
    /// # Returns
    ///
    /// An `OAuth ...` header with a fresh nonce and timestamp for
    /// [`UserAuth::OAuth1`], or a `Bearer ...` header otherwise. JSON request
    /// bodies are not part of an OAuth 1.0a signature, so only the query string
    /// is signed.
    pub fn authorization(&self, method: &str, url: &str) -> Result<String> {
        match self {
            UserAuth::OAuth1(keys) => build_oauth1_header(keys, method, url, &[]),
            UserAuth::Bearer(token) => Ok(build_oauth2_user_context_header(token)),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            UserAuth::OAuth1(_) => "OAuth 1.0a",
            UserAuth::Bearer(_) => "OAuth 2.0 bearer",
        }
    }
}

/// Builds a signed OAuth 1.0a Authorization header with a random nonce and the
/// current timestamp.
///
/// # Parameters
///
/// - `keys`: Consumer and access token pairs
/// - `method`: HTTP method of the request
/// - `url`: Full request URL; its query parameters are included in the signature
/// - `form_params`: `application/x-www-form-urlencoded` body parameters, if any
///
/// # Returns
///
/// The `OAuth ...` header value, or [`AppError::Config`] if `url` cannot be parsed.
pub fn build_oauth1_header(
    keys: &OAuth1Keys,
    method: &str,
    url: &str,
    form_params: &[(&str, &str)],
) -> Result<String> {
    let nonce: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect();
    let timestamp = Utc::now().timestamp().to_string();
    build_oauth1_header_with(keys, method, url, form_params, &nonce, &timestamp)
}

/// Same as [`build_oauth1_header`] with an explicit nonce and timestamp.
pub fn build_oauth1_header_with(
    keys: &OAuth1Keys,
    method: &str,
    url: &str,
    form_params: &[(&str, &str)],
    nonce: &str,
    timestamp: &str,
) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| AppError::Config(format!("Invalid request URL '{}': {}", url, e)))?;

    let oauth_params = [
        ("oauth_consumer_key", keys.consumer_key.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp),
        ("oauth_token", keys.token.as_str()),
        ("oauth_version", "1.0"),
    ];

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (percent_encode(&k), percent_encode(&v)))
        .collect();
    params.extend(
        form_params
            .iter()
            .chain(oauth_params.iter())
            .map(|(k, v)| (percent_encode(k), percent_encode(v))),
    );
    params.sort();

    let parameter_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let base_string = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(&signature_base_url(&parsed)?),
        percent_encode(&parameter_string)
    );
    let signing_key = format!(
        "{}&{}",
        percent_encode(&keys.consumer_secret),
        percent_encode(&keys.token_secret)
    );

    let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
        .map_err(|e| AppError::Config(format!("Invalid OAuth 1.0a signing key: {}", e)))?;
    mac.update(base_string.as_bytes());
    let signature =
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    let header_params = oauth_params
        .iter()
        .map(|(k, v)| (*k, *v))
        .chain(std::iter::once(("oauth_signature", signature.as_str())))
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {}", header_params))
}

/// Scheme, host, non-default port and path, as OAuth 1.0a signs them.
fn signature_base_url(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| AppError::Config(format!("Request URL '{}' has no host", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    })
}

/// RFC 3986 encoding: everything but `A-Z a-z 0-9 - . _ ~`.
fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

/// Derives the `oauth2/token` endpoint from the v2 API base URL.
pub(crate) fn token_endpoint(api_base_url: &str) -> String {
    let origin = api_base_url
        .trim_end_matches('/')
        .trim_end_matches("/2")
        .trim_end_matches('/');
    format!("{}/oauth2/token", origin)
}

/// Requests an app-only bearer token with the client-credentials grant.
///
/// This is done once at startup when `TWITTER_BEARER_TOKEN` is not set.
///
/// # Parameters
///
/// - `client`: HTTP client used for the request
/// - `token_url`: The `oauth2/token` endpoint
/// - `api_key`, `api_key_secret`: The app's consumer key pair
///
/// # Returns
///
/// The bearer token string.
///
/// # Errors
///
/// - [`AppError::RemoteApi`] if the token endpoint rejects the key pair
/// - [`AppError::Http`] on transport failures
pub async fn fetch_app_bearer_token(
    client: &Client,
    token_url: &str,
    api_key: &str,
    api_key_secret: &str,
) -> Result<String> {
    info!("Requesting app-only bearer token from {}", token_url);

    let response = client
        .post(token_url)
        .basic_auth(api_key, Some(api_key_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("Bearer token request failed - Status: {}", status);
        return Err(AppError::RemoteApi {
            operation: "fetch_app_bearer_token".to_string(),
            status: status.as_u16(),
            message: crate::twitter::sanitize_for_logging(&body, 200),
        });
    }

    let token: TokenResponse = response.json().await?;
    if !token.token_type.eq_ignore_ascii_case("bearer") {
        return Err(AppError::RemoteApi {
            operation: "fetch_app_bearer_token".to_string(),
            status: status.as_u16(),
            message: format!("unexpected token type '{}'", token.token_type),
        });
    }

    debug!("App-only bearer token received ({} characters)", token.access_token.len());
    Ok(token.access_token)
}
