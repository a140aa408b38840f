//! Twitter/X API integration module.
//!
//! [`SocialApi`] is the seam the HTTP handlers and the mention bot talk to.
//! [`TwitterClient`] implements it against the real API v2, and [`MeteredApi`]
//! wraps any implementation to feed the usage tracker.

use async_trait::async_trait;
use log::{debug, warn};

use crate::error::Result;

mod api;
mod metered;
mod types;

pub use api::{sanitize_for_logging, TwitterClient};
pub use metered::MeteredApi;
pub use types::{compare_tweet_ids, AccountInfo, Mention, MentionPage, PostedTweet};

/// Most mentions taken on a poll without a cursor, newest first.
pub const FIRST_POLL_LIMIT: usize = 10;

/// Page cap per poll. The mention timeline serves at most the 800 most recent
/// mentions, which is 8 pages of 100.
pub const MAX_MENTION_PAGES: usize = 8;

/// The operations this service needs from the social network.
///
/// Implementations surface upstream failures as [`crate::AppError::RemoteApi`]
/// and never retry.
#[async_trait]
pub trait SocialApi: Send + Sync {
    /// Posts a new tweet.
    async fn post_tweet(&self, text: &str) -> Result<PostedTweet>;

    /// Posts `text` as a reply to the tweet `in_reply_to_id`.
    async fn reply_to_tweet(&self, text: &str, in_reply_to_id: &str) -> Result<PostedTweet>;

    /// Returns the authenticated account.
    async fn who_am_i(&self) -> Result<AccountInfo>;

    /// Returns one page of mentions of `account_id` newer than `since_id`,
    /// newest first, plus the token of the next (older) page.
    async fn fetch_mentions_page(
        &self,
        account_id: &str,
        since_id: Option<&str>,
        pagination_token: Option<&str>,
    ) -> Result<MentionPage>;

    /// Returns every mention of `account_id` newer than `since_id`, in
    /// whatever order the pages arrive.
    ///
    /// With a cursor, pages are followed until the timeline is exhausted (or
    /// [`MAX_MENTION_PAGES`] is hit) so a burst between polls is never cut
    /// short. Without one, only the [`FIRST_POLL_LIMIT`] newest mentions of the
    /// first page are returned. A failure on any page fails the whole fetch.
    async fn fetch_mentions_since(
        &self,
        account_id: &str,
        since_id: Option<&str>,
    ) -> Result<Vec<Mention>> {
        let first = self.fetch_mentions_page(account_id, since_id, None).await?;
        if since_id.is_none() {
            let mut mentions = first.mentions;
            mentions.sort_by(|a, b| compare_tweet_ids(&b.id, &a.id));
            mentions.truncate(FIRST_POLL_LIMIT);
            return Ok(mentions);
        }

        let mut mentions = first.mentions;
        let mut next_token = first.next_token;
        let mut pages = 1;
        while let Some(token) = next_token {
            if pages >= MAX_MENTION_PAGES {
                warn!(
                    "Stopped after {} mention pages; older mentions since {} are skipped",
                    pages,
                    since_id.unwrap_or("the start")
                );
                break;
            }
            debug!("Fetching mention page {} (token {})", pages + 1, token);
            let page = self
                .fetch_mentions_page(account_id, since_id, Some(&token))
                .await?;
            mentions.extend(page.mentions);
            next_token = page.next_token;
            pages += 1;
        }
        Ok(mentions)
    }
}

#[async_trait]
impl<T: SocialApi + ?Sized> SocialApi for std::sync::Arc<T> {
    async fn post_tweet(&self, text: &str) -> Result<PostedTweet> {
        (**self).post_tweet(text).await
    }

    async fn reply_to_tweet(&self, text: &str, in_reply_to_id: &str) -> Result<PostedTweet> {
        (**self).reply_to_tweet(text, in_reply_to_id).await
    }

    async fn who_am_i(&self) -> Result<AccountInfo> {
        (**self).who_am_i().await
    }

    async fn fetch_mentions_page(
        &self,
        account_id: &str,
        since_id: Option<&str>,
        pagination_token: Option<&str>,
    ) -> Result<MentionPage> {
        (**self)
            .fetch_mentions_page(account_id, since_id, pagination_token)
            .await
    }

    async fn fetch_mentions_since(
        &self,
        account_id: &str,
        since_id: Option<&str>,
    ) -> Result<Vec<Mention>> {
        (**self).fetch_mentions_since(account_id, since_id).await
    }
}
