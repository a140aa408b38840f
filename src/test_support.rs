//! In-memory fakes shared by the unit and HTTP tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{AppError, Result};
use crate::reply::{PromptContext, ReplyGenerator};
use crate::twitter::{compare_tweet_ids, AccountInfo, Mention, MentionPage, PostedTweet, SocialApi};

pub const BOT_ACCOUNT_ID: &str = "1000";

pub fn mention(id: &str, author_id: &str, username: &str, text: &str) -> Mention {
    Mention {
        id: id.to_string(),
        text: text.to_string(),
        author_id: Some(author_id.to_string()),
        author_username: Some(username.to_string()),
        created_at: None,
    }
}

fn remote_error(operation: &str, status: u16) -> AppError {
    AppError::RemoteApi {
        operation: operation.to_string(),
        status,
        message: "fake failure".to_string(),
    }
}

/// Scriptable [`SocialApi`].
///
/// By default `fetch_mentions_page` ignores the cursor and always returns every
/// configured mention as a single page, like an upstream that keeps serving the
/// same page. [`FakeSocialApi::paginated`] instead behaves like the mention
/// timeline: only IDs newer than `since_id`, newest first, `page_size` per page.
#[derive(Default)]
pub struct FakeSocialApi {
    mentions: Mutex<Vec<Mention>>,
    page_size: Option<usize>,
    pages_before_failure: Mutex<Option<(usize, u16)>>,
    posts: Mutex<Vec<(String, Option<String>)>>,
    fetch_cursors: Mutex<Vec<Option<String>>>,
    post_failure: Mutex<Option<u16>>,
    fetch_failure: Mutex<Option<u16>>,
    who_am_i_calls: AtomicUsize,
    post_attempts: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeSocialApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paginated(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size),
            ..Self::default()
        }
    }

    pub fn with_mentions(mentions: Vec<Mention>) -> Self {
        let fake = Self::new();
        fake.set_mentions(mentions);
        fake
    }

    pub fn set_mentions(&self, mentions: Vec<Mention>) {
        *self.mentions.lock().unwrap() = mentions;
    }

    pub fn fail_posts_with(&self, status: u16) {
        *self.post_failure.lock().unwrap() = Some(status);
    }

    pub fn fail_fetches_with(&self, status: u16) {
        *self.fetch_failure.lock().unwrap() = Some(status);
    }

    /// Lets `pages` page requests succeed, then fails the rest with `status`.
    pub fn fail_fetches_after_pages(&self, pages: usize, status: u16) {
        *self.pages_before_failure.lock().unwrap() = Some((pages, status));
    }

    pub fn heal(&self) {
        *self.post_failure.lock().unwrap() = None;
        *self.fetch_failure.lock().unwrap() = None;
        *self.pages_before_failure.lock().unwrap() = None;
    }

    /// Successful posts as `(text, in_reply_to_id)`.
    pub fn posts(&self) -> Vec<(String, Option<String>)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn replies_to(&self, tweet_id: &str) -> usize {
        self.posts()
            .iter()
            .filter(|(_, reply_to)| reply_to.as_deref() == Some(tweet_id))
            .count()
    }

    pub fn fetch_cursors(&self) -> Vec<Option<String>> {
        self.fetch_cursors.lock().unwrap().clone()
    }

    pub fn who_am_i_calls(&self) -> usize {
        self.who_am_i_calls.load(Ordering::SeqCst)
    }

    pub fn post_attempts(&self) -> usize {
        self.post_attempts.load(Ordering::SeqCst)
    }

    fn post(&self, text: &str, reply_to: Option<&str>, operation: &str) -> Result<PostedTweet> {
        self.post_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.post_failure.lock().unwrap() {
            return Err(remote_error(operation, status));
        }
        self.posts
            .lock()
            .unwrap()
            .push((text.to_string(), reply_to.map(str::to_string)));
        let id = 9_000_000 + self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(PostedTweet {
            id: id.to_string(),
            text: text.to_string(),
        })
    }
}

#[async_trait]
impl SocialApi for FakeSocialApi {
    async fn post_tweet(&self, text: &str) -> Result<PostedTweet> {
        self.post(text, None, "post_tweet")
    }

    async fn reply_to_tweet(&self, text: &str, in_reply_to_id: &str) -> Result<PostedTweet> {
        self.post(text, Some(in_reply_to_id), "reply_to_tweet")
    }

    async fn who_am_i(&self) -> Result<AccountInfo> {
        self.who_am_i_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccountInfo {
            id: BOT_ACCOUNT_ID.to_string(),
            username: "gatebot".to_string(),
            name: "Gate Bot".to_string(),
            description: Some("I reply to mentions".to_string()),
        })
    }

    async fn fetch_mentions_page(
        &self,
        _account_id: &str,
        since_id: Option<&str>,
        pagination_token: Option<&str>,
    ) -> Result<MentionPage> {
        self.fetch_cursors
            .lock()
            .unwrap()
            .push(since_id.map(str::to_string));
        if let Some(status) = *self.fetch_failure.lock().unwrap() {
            return Err(remote_error("fetch_mentions", status));
        }
        if let Some((remaining, status)) = self.pages_before_failure.lock().unwrap().as_mut() {
            if *remaining == 0 {
                return Err(remote_error("fetch_mentions", *status));
            }
            *remaining -= 1;
        }

        let mentions = self.mentions.lock().unwrap().clone();
        let Some(page_size) = self.page_size else {
            return Ok(MentionPage {
                mentions,
                next_token: None,
            });
        };

        let mut newer: Vec<Mention> = mentions
            .into_iter()
            .filter(|m| since_id.map_or(true, |since| compare_tweet_ids(&m.id, since).is_gt()))
            .collect();
        newer.sort_by(|a, b| compare_tweet_ids(&b.id, &a.id));
        let offset: usize = pagination_token.map_or(0, |t| t.parse().unwrap());
        let end = (offset + page_size).min(newer.len());
        Ok(MentionPage {
            mentions: newer[offset.min(end)..end].to_vec(),
            next_token: (end < newer.len()).then(|| end.to_string()),
        })
    }
}

/// [`ReplyGenerator`] that counts invocations and returns a fixed answer.
pub struct CountingGenerator {
    calls: AtomicUsize,
    answer: Option<String>,
}

impl CountingGenerator {
    pub fn answering(answer: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            answer: Some(answer.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            answer: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplyGenerator for CountingGenerator {
    async fn generate(&self, context: &PromptContext) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Some(answer) => Ok(format!("{} {}", context.prefix, answer)),
            None => Err(AppError::Llm {
                status: Some(503),
                message: "fake outage".to_string(),
            }),
        }
    }
}
