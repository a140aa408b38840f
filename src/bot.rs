//! Mention bot: polls the account's mentions and replies to each one once.
//!
//! The polling loop sleeps for an interval that can be changed at runtime
//! through `POST /bot/configure`. Each iteration fetches the mentions newer than
//! the last processed one, skips IDs it has already answered, and replies
//! through the same [`SocialApi`] the HTTP handlers use.
//!
//! A mention is marked as seen only after its reply was accepted. A failed
//! reply stops the batch without advancing the cursor, so that mention is
//! fetched again on the next iteration.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, OnceCell};
use tokio::task::JoinHandle;

use crate::config::BotDefaults;
use crate::error::{AppError, Result};
use crate::reply::{fit_tweet, PrefixReply, PromptContext, ReplyGenerator};
use crate::twitter::{compare_tweet_ids, sanitize_for_logging, Mention, SocialApi};

/// Longest accepted response prefix, leaving room for the reply body.
const MAX_PREFIX_CHARS: usize = 100;

/// Runtime-adjustable bot settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotConfig {
    pub check_interval_seconds: u64,
    pub response_prefix: String,
    pub use_llm: bool,
}

impl From<&BotDefaults> for BotConfig {
    fn from(defaults: &BotDefaults) -> Self {
        Self {
            check_interval_seconds: defaults.check_interval_seconds,
            response_prefix: defaults.response_prefix.clone(),
            use_llm: defaults.use_llm,
        }
    }
}

/// Partial update accepted by `POST /bot/configure`; absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfigUpdate {
    pub check_interval_seconds: Option<u64>,
    pub response_prefix: Option<String>,
    pub use_llm: Option<bool>,
}

/// Mention IDs already handled plus the newest handled ID.
#[derive(Debug, Default)]
pub struct SeenMentions {
    ids: HashSet<String>,
    cursor: Option<String>,
}

impl SeenMentions {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Records `id` as handled and moves the cursor forward if it is newer.
    pub fn mark(&mut self, id: &str) {
        self.ids.insert(id.to_string());
        let newer = match &self.cursor {
            Some(cursor) => compare_tweet_ids(id, cursor).is_gt(),
            None => true,
        };
        if newer {
            self.cursor = Some(id.to_string());
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Outcome of one polling iteration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub fetched: usize,
    pub replied: usize,
    pub skipped: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
struct LastPoll {
    at: Option<DateTime<Utc>>,
    report: Option<PollReport>,
    error: Option<String>,
}

/// Snapshot served by `GET /bot/status`.
#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub running: bool,
    pub config: BotConfig,
    pub llm_available: bool,
    pub account_id: Option<String>,
    pub seen_mentions: usize,
    pub cursor: Option<String>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_report: Option<PollReport>,
    pub last_error: Option<String>,
}

/// Stop flag for one run of the polling loop.
#[derive(Debug, Default)]
struct StopSignal {
    stopped: AtomicBool,
    wake: Notify,
}

impl StopSignal {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // notify_one keeps a permit if the loop is not sleeping right now.
        self.wake.notify_one();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless stopped first. Returns whether to stop.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
        self.is_stopped()
    }
}

struct RunHandle {
    stop: Arc<StopSignal>,
    task: JoinHandle<()>,
}

struct BotInner {
    api: Arc<dyn SocialApi>,
    prefix: PrefixReply,
    llm: Option<Arc<dyn ReplyGenerator>>,
    config: Mutex<BotConfig>,
    seen: Mutex<SeenMentions>,
    last_poll: Mutex<LastPoll>,
    account_id: OnceCell<String>,
    poll_lock: tokio::sync::Mutex<()>,
    run: Mutex<Option<RunHandle>>,
}

/// Handle to the mention bot. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct MentionBot {
    inner: Arc<BotInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MentionBot {
    /// Creates a stopped bot. `llm` is the generator used when `use_llm` is set.
    pub fn new(
        api: Arc<dyn SocialApi>,
        llm: Option<Arc<dyn ReplyGenerator>>,
        config: BotConfig,
    ) -> Self {
        let config = if config.use_llm && llm.is_none() {
            BotConfig {
                use_llm: false,
                ..config
            }
        } else {
            config
        };
        Self {
            inner: Arc::new(BotInner {
                api,
                prefix: PrefixReply,
                llm,
                config: Mutex::new(config),
                seen: Mutex::new(SeenMentions::default()),
                last_poll: Mutex::new(LastPoll::default()),
                account_id: OnceCell::new(),
                poll_lock: tokio::sync::Mutex::new(()),
                run: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> BotConfig {
        lock(&self.inner.config).clone()
    }

    pub fn llm_available(&self) -> bool {
        self.inner.llm.is_some()
    }

    /// Applies a partial update, replacing the whole config at once.
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidRequest`] for a zero interval, an over-long prefix, or
    /// `use_llm` without a configured LLM. The current config is left untouched.
    pub fn configure(&self, update: BotConfigUpdate) -> Result<BotConfig> {
        let mut config = lock(&self.inner.config);
        let mut next = config.clone();
        if let Some(interval) = update.check_interval_seconds {
            next.check_interval_seconds = interval;
        }
        if let Some(prefix) = update.response_prefix {
            next.response_prefix = prefix;
        }
        if let Some(use_llm) = update.use_llm {
            next.use_llm = use_llm;
        }
        self.validate(&next)?;

        info!(
            "Bot configured: interval {}s, prefix '{}', use_llm {}",
            next.check_interval_seconds, next.response_prefix, next.use_llm
        );
        *config = next.clone();
        Ok(next)
    }

    pub fn set_use_llm(&self, use_llm: bool) -> Result<BotConfig> {
        self.configure(BotConfigUpdate {
            use_llm: Some(use_llm),
            ..Default::default()
        })
    }

    fn validate(&self, config: &BotConfig) -> Result<()> {
        if config.check_interval_seconds == 0 {
            return Err(AppError::InvalidRequest(
                "check_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if config.response_prefix.chars().count() > MAX_PREFIX_CHARS {
            return Err(AppError::InvalidRequest(format!(
                "response_prefix must be at most {} characters",
                MAX_PREFIX_CHARS
            )));
        }
        if config.use_llm && self.inner.llm.is_none() {
            return Err(AppError::InvalidRequest(
                "LLM reply generation is not configured (set LLM_API_KEY)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.run)
            .as_ref()
            .is_some_and(|run| !run.task.is_finished())
    }

    /// Starts the polling loop. Returns `false` if it was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enable(&self) -> bool {
        let mut run = lock(&self.inner.run);
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            info!("Mention bot already running");
            return false;
        }

        let stop = Arc::new(StopSignal::default());
        let task = tokio::spawn(self.clone().run(stop.clone()));
        *run = Some(RunHandle { stop, task });
        info!("Mention bot enabled");
        true
    }

    /// Signals the polling loop to stop. Returns `false` if it was not running.
    pub fn disable(&self) -> bool {
        match lock(&self.inner.run).take() {
            Some(run) => {
                run.stop.stop();
                let was_running = !run.task.is_finished();
                info!("Mention bot disabled");
                was_running
            }
            None => false,
        }
    }

    pub fn status(&self) -> BotStatus {
        let (seen_mentions, cursor) = {
            let seen = lock(&self.inner.seen);
            (seen.len(), seen.cursor().map(str::to_string))
        };
        let last_poll = lock(&self.inner.last_poll).clone();
        BotStatus {
            running: self.is_running(),
            config: self.config(),
            llm_available: self.llm_available(),
            account_id: self.inner.account_id.get().cloned(),
            seen_mentions,
            cursor,
            last_poll_at: last_poll.at,
            last_report: last_poll.report,
            last_error: last_poll.error,
        }
    }

    async fn run(self, stop: Arc<StopSignal>) {
        info!("Mention polling loop started");
        while !stop.is_stopped() {
            let outcome = self.poll_once().await;
            {
                let mut last_poll = lock(&self.inner.last_poll);
                last_poll.at = Some(Utc::now());
                match outcome {
                    Ok(report) => {
                        last_poll.report = Some(report);
                        last_poll.error = None;
                    }
                    Err(e) => {
                        error!("Mention poll failed, will retry next interval: {}", e);
                        last_poll.error = Some(e.to_string());
                    }
                }
            }

            let interval = self.config().check_interval_seconds;
            debug!("Next mention poll in {}s", interval);
            if stop.sleep(Duration::from_secs(interval)).await {
                break;
            }
        }
        info!("Mention polling loop stopped");
    }

    async fn account_id(&self) -> Result<String> {
        let id = self
            .inner
            .account_id
            .get_or_try_init(|| async {
                let account = self.inner.api.who_am_i().await?;
                info!("Mention bot running as @{} ({})", account.username, account.id);
                Ok::<_, AppError>(account.id)
            })
            .await?;
        Ok(id.clone())
    }

    /// Runs one polling iteration.
    ///
    /// # Errors
    ///
    /// Returns the first upstream failure. Mentions answered before it stay
    /// marked as seen; the failed one and everything after it are left for the
    /// next iteration.
    pub async fn poll_once(&self) -> Result<PollReport> {
        let _guard = self.inner.poll_lock.lock().await;
        let config = self.config();
        let account_id = self.account_id().await?;
        let cursor = lock(&self.inner.seen).cursor().map(str::to_string);

        let mut mentions = self
            .inner
            .api
            .fetch_mentions_since(&account_id, cursor.as_deref())
            .await?;
        mentions.sort_by(|a, b| compare_tweet_ids(&a.id, &b.id));
        mentions.dedup_by(|a, b| a.id == b.id);

        let mut report = PollReport {
            fetched: mentions.len(),
            ..Default::default()
        };

        for mention in &mentions {
            if lock(&self.inner.seen).contains(&mention.id) {
                debug!("Skipping mention {} - already replied", mention.id);
                report.skipped += 1;
                continue;
            }
            if mention.author_id.as_deref() == Some(account_id.as_str()) {
                debug!("Skipping mention {} - posted by this account", mention.id);
                lock(&self.inner.seen).mark(&mention.id);
                report.skipped += 1;
                continue;
            }

            info!(
                "Replying to mention {} from @{}: {}",
                mention.id,
                mention.author_username.as_deref().unwrap_or("unknown"),
                sanitize_for_logging(&mention.text, 120)
            );
            let text = self.compose_reply(&config, mention).await;
            if let Err(e) = self.inner.api.reply_to_tweet(&text, &mention.id).await {
                error!("Failed to reply to mention {}: {}", mention.id, e);
                return Err(e);
            }
            lock(&self.inner.seen).mark(&mention.id);
            report.replied += 1;
        }

        info!(
            "Mention poll finished: {} fetched, {} replied, {} skipped",
            report.fetched, report.replied, report.skipped
        );
        Ok(report)
    }

    /// Picks the generator for the current config.
    fn generator(&self, config: &BotConfig) -> &dyn ReplyGenerator {
        match (&self.inner.llm, config.use_llm) {
            (Some(llm), true) => llm.as_ref(),
            _ => &self.inner.prefix,
        }
    }

    async fn compose_reply(&self, config: &BotConfig, mention: &Mention) -> String {
        let context = PromptContext::new(&config.response_prefix, mention);
        let text = match self.generator(config).generate(&context).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Reply generation failed, falling back to prefix reply: {}", e);
                self.inner.prefix.compose(&context)
            }
        };
        fit_tweet(&text)
    }
}
