//! Model access for article analysis, with exponential backoff.
//!
//! The analysis stage sends article text to an OpenAI-compatible endpoint
//! through `awful_aj` and expects a JSON document back.
//!
//! # Architecture
//!
//! - [`AskAsync`]: async "send text, get a response" seam
//! - [`AskFnWrapper`]: adapts `awful_aj::api::ask` to [`AskAsync`]
//! - [`RetryAsk`]: decorator adding retries to any [`AskAsync`]
//!
//! # Retry Strategy
//!
//! - Up to 5 retries after the first attempt
//! - Delay starts at 1 second and doubles per attempt, capped at 30 seconds
//! - 0-250ms of random jitter on every delay

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use rand::{Rng, rng};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_MAX_RETRIES: usize = 5;
pub const DEFAULT_BASE_DELAY: StdDuration = StdDuration::from_secs(1);
const MAX_DELAY: StdDuration = StdDuration::from_secs(30);
const MAX_JITTER_MS: u64 = 250;

/// Prefix placed before the article body in every analysis prompt.
pub const ARTICLE_PROMPT_PREFIX: &str = "[기사]:\n";

/// Async model interaction.
///
/// Implemented by the real client, by [`RetryAsk`], and by test doubles.
pub trait AskAsync {
    type Response;

    /// Send `text` and wait for the model's reply.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Adds exponential backoff to an [`AskAsync`] implementation.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + jitter(0..=250ms)
/// ```
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: MAX_DELAY,
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn backoff_for(&self, attempt: usize) -> StdDuration {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=MAX_JITTER_MS);
                    let delay = self.backoff_for(attempt) + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// [`AskAsync`] over `awful_aj::api::ask` with a fixed template.
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    pub config: &'a AwfulJadeConfig,
    /// Holds the analyst system prompt and the JSON response format.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(_) => info!(elapsed_ms = dt.as_millis(), "API call succeeded"),
            Err(e) => warn!(elapsed_ms = dt.as_millis(), error = %e, "API call failed"),
        }
        res
    }
}

/// The analyst client used by `analyze`: the `awful_aj` call with the
/// default retry policy.
pub fn analyst<'a>(
    config: &'a AwfulJadeConfig,
    template: &'a ChatTemplate,
) -> RetryAsk<AskFnWrapper<'a>> {
    RetryAsk::new(
        AskFnWrapper { config, template },
        DEFAULT_MAX_RETRIES,
        DEFAULT_BASE_DELAY,
    )
}

/// Prompt for one article.
pub fn article_prompt(article_text: &str) -> String {
    format!("{ARTICLE_PROMPT_PREFIX}{article_text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Flaky {
        failures_left: Mutex<usize>,
        calls: Mutex<usize>,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl AskAsync for Flaky {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            *self.calls.lock().unwrap() += 1;
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err("503 Service Unavailable".into());
            }
            Ok(format!("echo:{text}"))
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let api = RetryAsk::new(Flaky::new(2), 5, StdDuration::from_millis(1));
        let out = api.ask("x").await.unwrap();
        assert_eq!(out, "echo:x");
        assert_eq!(api.inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let api = RetryAsk::new(Flaky::new(10), 2, StdDuration::from_millis(1));
        assert!(api.ask("x").await.is_err());
        assert_eq!(api.inner.calls(), 3);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let api = RetryAsk::new(Flaky::new(0), 5, StdDuration::from_secs(1));
        assert_eq!(api.backoff_for(1), StdDuration::from_secs(1));
        assert_eq!(api.backoff_for(2), StdDuration::from_secs(2));
        assert_eq!(api.backoff_for(5), StdDuration::from_secs(16));
        assert_eq!(api.backoff_for(6), StdDuration::from_secs(30));
        assert_eq!(api.backoff_for(40), StdDuration::from_secs(30));
    }

    #[test]
    fn test_article_prompt_prefix() {
        assert_eq!(article_prompt("본문"), "[기사]:\n본문");
    }
}
