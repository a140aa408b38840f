//! Usage-metering wrapper around any [`SocialApi`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::usage::{UsageKind, UsageTracker};

use super::types::{AccountInfo, MentionPage, PostedTweet};
use super::SocialApi;

/// Forwards every call to the inner API and counts the successful ones.
///
/// Posts and replies count against both the app-level and user-level post
/// ceilings; account lookups and every mention page count as reads. Failed
/// calls are not counted.
pub struct MeteredApi<A> {
    inner: A,
    usage: Arc<UsageTracker>,
}

impl<A> MeteredApi<A> {
    pub fn new(inner: A, usage: Arc<UsageTracker>) -> Self {
        Self { inner, usage }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn record_post(&self) {
        self.usage.record(UsageKind::AppPost);
        self.usage.record(UsageKind::UserPost);
    }
}

#[async_trait]
impl<A: SocialApi> SocialApi for MeteredApi<A> {
    async fn post_tweet(&self, text: &str) -> Result<PostedTweet> {
        let tweet = self.inner.post_tweet(text).await?;
        self.record_post();
        Ok(tweet)
    }

    async fn reply_to_tweet(&self, text: &str, in_reply_to_id: &str) -> Result<PostedTweet> {
        let tweet = self.inner.reply_to_tweet(text, in_reply_to_id).await?;
        self.record_post();
        Ok(tweet)
    }

    async fn who_am_i(&self) -> Result<AccountInfo> {
        let account = self.inner.who_am_i().await?;
        self.usage.record(UsageKind::Read);
        Ok(account)
    }

    async fn fetch_mentions_page(
        &self,
        account_id: &str,
        since_id: Option<&str>,
        pagination_token: Option<&str>,
    ) -> Result<MentionPage> {
        let page = self
            .inner
            .fetch_mentions_page(account_id, since_id, pagination_token)
            .await?;
        self.usage.record(UsageKind::Read);
        Ok(page)
    }
}
