//! Domain and wire types for the Twitter API v2 responses we consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::Result;

/// A post that mentions the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mention {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub author_username: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// The authenticated account, as returned by `GET /2/users/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A tweet we just created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedTweet {
    pub id: String,
    pub text: String,
}

/// One page of the mention timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionPage {
    pub mentions: Vec<Mention>,
    /// Token of the next, older page; `None` on the last page.
    pub next_token: Option<String>,
}

/// `{"data": ...}` wrapper used by the single-object endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
struct MentionsPage {
    #[serde(default)]
    data: Vec<WireTweet>,
    #[serde(default)]
    includes: Option<Includes>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    username: String,
}

/// Parses a `GET /2/users/:id/mentions` response body.
///
/// Author usernames are resolved from the `includes.users` expansion. A page
/// without `data` (no new mentions) yields an empty list.
pub(crate) fn parse_mentions(body: &str) -> Result<MentionPage> {
    let page: MentionsPage = serde_json::from_str(body)?;

    let usernames: HashMap<String, String> = page
        .includes
        .unwrap_or_default()
        .users
        .into_iter()
        .map(|user| (user.id, user.username))
        .collect();

    let mentions = page
        .data
        .into_iter()
        .map(|tweet| {
            let author_username = tweet
                .author_id
                .as_ref()
                .and_then(|id| usernames.get(id))
                .cloned();
            Mention {
                id: tweet.id,
                text: tweet.text,
                author_id: tweet.author_id,
                author_username,
                created_at: tweet.created_at,
            }
        })
        .collect();

    Ok(MentionPage {
        mentions,
        next_token: page.meta.unwrap_or_default().next_token,
    })
}

/// Orders tweet IDs chronologically.
///
/// IDs are decimal snowflakes without leading zeros, so a longer ID is always
/// newer and equal-length IDs compare lexically.
pub fn compare_tweet_ids(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
