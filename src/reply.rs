//! Reply text generation for the mention bot.
//!
//! [`ReplyGenerator`] is the capability the bot uses to turn a mention into
//! reply text. [`PrefixReply`] is the always-available plain variant;
//! [`LlmReply`] asks a language model and may fail, in which case the bot falls
//! back to the prefix variant.

use async_trait::async_trait;
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::Result;
use crate::llm::LlmClient;
use crate::twitter::Mention;

/// Maximum weighted tweet length, see [`weighted_len`].
pub const MAX_TWEET_CHARS: usize = 280;

const ELLIPSIS: char = '…';

/// Everything a generator may use to write a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub prefix: String,
    pub mention_text: String,
    pub author_username: Option<String>,
}

impl PromptContext {
    pub fn new(prefix: &str, mention: &Mention) -> Self {
        Self {
            prefix: prefix.to_string(),
            mention_text: mention.text.clone(),
            author_username: mention.author_username.clone(),
        }
    }
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, context: &PromptContext) -> Result<String>;
}

/// Replies with the configured prefix and a fixed thank-you line.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixReply;

impl PrefixReply {
    pub fn compose(&self, context: &PromptContext) -> String {
        let body = match &context.author_username {
            Some(username) => format!("Thanks for the mention, @{}!", username),
            None => "Thanks for the mention!".to_string(),
        };
        join_prefix(&context.prefix, &body)
    }
}

#[async_trait]
impl ReplyGenerator for PrefixReply {
    async fn generate(&self, context: &PromptContext) -> Result<String> {
        Ok(self.compose(context))
    }
}

/// Lets the LLM write the reply body, then prepends the prefix.
pub struct LlmReply {
    client: LlmClient,
}

impl LlmReply {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplyGenerator for LlmReply {
    async fn generate(&self, context: &PromptContext) -> Result<String> {
        let prompt = build_prompt(context);
        debug!("Asking {} for a reply", self.client.model());
        let body = self.client.complete(&prompt).await?;
        Ok(join_prefix(&context.prefix, &body))
    }
}

fn build_prompt(context: &PromptContext) -> String {
    let text = strip_leading_mentions(&context.mention_text);
    match &context.author_username {
        Some(username) => format!("@{} wrote to you: \"{}\"", username, text),
        None => format!("Someone wrote to you: \"{}\"", text),
    }
}

/// Removes the run of `@handle` tokens that opens reply-chain tweets.
pub fn strip_leading_mentions(text: &str) -> String {
    static LEADING: OnceLock<Regex> = OnceLock::new();
    let re = LEADING.get_or_init(|| {
        Regex::new(r"^(?:\s*@\w+)+\s*").expect("leading mention pattern is valid")
    });
    re.replace(text, "").trim().to_string()
}

fn join_prefix(prefix: &str, body: &str) -> String {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        body.trim().to_string()
    } else {
        format!("{} {}", prefix, body.trim())
    }
}

/// Length of `text` as X counts it against [`MAX_TWEET_CHARS`].
///
/// Latin, Greek, Cyrillic and most punctuation weigh 1; everything else,
/// including CJK and emoji, weighs 2. Each scalar of an emoji ZWJ sequence is
/// counted, so such sequences come out longer than X counts them, and URLs are
/// not shortened to 23. Both errors only make the limit stricter.
pub fn weighted_len(text: &str) -> usize {
    text.chars().map(char_weight).sum()
}

fn char_weight(c: char) -> usize {
    match c as u32 {
        0x0000..=0x10FF | 0x2000..=0x200D | 0x2010..=0x201F | 0x2032..=0x2037 => 1,
        _ => 2,
    }
}

/// Truncates `text` to the weighted tweet limit, marking the cut with an ellipsis.
pub fn fit_tweet(text: &str) -> String {
    if weighted_len(text) <= MAX_TWEET_CHARS {
        return text.to_string();
    }
    let budget = MAX_TWEET_CHARS - char_weight(ELLIPSIS);
    let mut used = 0;
    let mut cut: String = text
        .chars()
        .take_while(|&c| {
            used += char_weight(c);
            used <= budget
        })
        .collect();
    cut.push(ELLIPSIS);
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(prefix: &str, text: &str, username: Option<&str>) -> PromptContext {
        PromptContext {
            prefix: prefix.to_string(),
            mention_text: text.to_string(),
            author_username: username.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_prefix_reply() {
        let reply = PrefixReply
            .generate(&context("🤖", "@gatebot hello", Some("alice")))
            .await
            .unwrap();
        assert_eq!(reply, "🤖 Thanks for the mention, @alice!");

        let reply = PrefixReply
            .generate(&context("", "@gatebot hello", None))
            .await
            .unwrap();
        assert_eq!(reply, "Thanks for the mention!");
    }

    #[test]
    fn test_strip_leading_mentions() {
        assert_eq!(
            strip_leading_mentions("@gatebot @alice what's up?"),
            "what's up?"
        );
        assert_eq!(
            strip_leading_mentions("hey @gatebot, hi"),
            "hey @gatebot, hi"
        );
        assert_eq!(strip_leading_mentions("@gatebot"), "");
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(&context("🤖", "@gatebot tell me a joke", Some("bob")));
        assert_eq!(prompt, "@bob wrote to you: \"tell me a joke\"");
    }

    #[test]
    fn test_fit_tweet() {
        let short = "a".repeat(280);
        assert_eq!(fit_tweet(&short), short);

        let long = "a".repeat(300);
        let fitted = fit_tweet(&long);
        assert_eq!(fitted.chars().count(), 279);
        assert!(fitted.ends_with('…'));

        let emoji = "🤖".repeat(300);
        let fitted = fit_tweet(&emoji);
        assert_eq!(weighted_len(&fitted), 280);
        assert_eq!(fitted.chars().count(), 140);
        assert!(fitted.ends_with('…'));
    }

    #[test]
    fn test_weighted_len() {
        assert_eq!(weighted_len("hello"), 5);
        assert_eq!(weighted_len("Привет"), 6);
        assert_eq!(weighted_len("🤖"), 2);
        assert_eq!(weighted_len("日本語"), 6);
        assert_eq!(weighted_len("“quoted” – ok"), 13);
        assert_eq!(weighted_len(&format!("🤖 {}", "a".repeat(278))), 281);
    }

    #[test]
    fn test_prefixed_reply_is_fitted_by_weight() {
        let reply = join_prefix("🤖", &"a".repeat(279));
        assert_eq!(reply.chars().count(), 281);
        let fitted = fit_tweet(&reply);
        assert!(weighted_len(&fitted) <= MAX_TWEET_CHARS);
        assert!(fitted.starts_with("🤖 aaa"));
    }
}
