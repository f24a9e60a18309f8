//! Page fetching with exponential backoff retry and age-gate handling.
//!
//! # Architecture
//!
//! - [`PageSource`]: trait for anything that turns a URL into HTML
//! - [`HttpFetcher`]: the real client; rotates User-Agents and clicks through
//!   the board's over-18 interstitial when it shows up
//! - [`RetryFetch`]: decorator that adds bounded retry to any `PageSource`
//!
//! # Retry Strategy
//!
//! - 3 attempts in total
//! - Exponential backoff starting at 2 seconds, capped at 30 seconds
//! - Random jitter (0-1000ms) added so scheduled runs don't retry in lockstep
//! - Only transient failures (network errors, 5xx, 429) are retried

use rand::{Rng, rng};
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, COOKIE, USER_AGENT};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Browser identities rotated per request.
pub const USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE_ZH_TW: &str = "zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7";
const AGE_GATE_PATH: &str = "/ask/over18";
const AGE_GATE_COOKIE: &str = "over18=1";

/// Pick a User-Agent from [`USER_AGENTS`].
pub fn random_user_agent() -> &'static str {
    USER_AGENTS[rng().random_range(0..USER_AGENTS.len())]
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("age gate still shown after confirming for {url}")]
    AgeGate { url: String },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::AgeGate { .. } | FetchError::Exhausted { .. } => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// Anything that can turn a page URL into its HTML.
pub trait PageSource {
    /// Fetch `url` and return the response body as text.
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

/// Delay schedule between attempts.
///
/// ```text
/// delay = min(base * 2^(attempt-1), max) + random_jitter(0..=max_jitter)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: StdDuration,
    /// Ceiling for the doubled delay, before jitter.
    pub max: StdDuration,
    /// Upper bound of the random extra added to every delay.
    pub max_jitter: StdDuration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: StdDuration::from_secs(2),
            max: StdDuration::from_secs(30),
            max_jitter: StdDuration::from_millis(1000),
        }
    }
}

impl Backoff {
    /// Delay before the next attempt after `attempt` failures, without jitter.
    pub fn base_delay(&self, attempt: usize) -> StdDuration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.base.saturating_mul(1 << exp).min(self.max)
    }

    /// Delay before the next attempt after `attempt` failures.
    pub fn delay(&self, attempt: usize) -> StdDuration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = StdDuration::from_millis(rng().random_range(0..=jitter_ms));
        self.base_delay(attempt) + jitter
    }
}

/// Wrapper that adds bounded retry to any [`PageSource`].
///
/// Non-transient errors are returned as-is on the first occurrence; running
/// out of attempts yields [`FetchError::Exhausted`] carrying the last cause.
pub struct RetryFetch<T> {
    /// The source each attempt is delegated to.
    inner: T,
    /// Total attempts, including the first. Never zero.
    max_attempts: usize,
    /// Wait schedule between attempts.
    backoff: Backoff,
}

impl<T> RetryFetch<T>
where
    T: PageSource,
{
    /// # Arguments
    ///
    /// * `inner` - The source to retry.
    /// * `max_attempts` - Total attempts per URL; `0` is treated as `1`.
    /// * `backoff` - Delay schedule between attempts.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let fetcher = HttpFetcher::new(base_url, Duration::from_secs(15))?;
    /// let source = RetryFetch::new(fetcher, 3, Backoff::default());
    /// ```
    pub fn new(inner: T, max_attempts: usize, backoff: Backoff) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<T> PageSource for RetryFetch<T>
where
    T: PageSource,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() {
                        warn!(attempt, error = %e, "fetch failed with non-transient error");
                        return Err(e);
                    }

                    if attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(FetchError::Exhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.backoff.delay(attempt);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Whether a response is the board's over-18 confirmation page.
///
/// # Arguments
///
/// * `final_url` - URL the response came from, after redirects.
/// * `body` - Response body.
///
/// # Returns
///
/// `true` if the request was redirected to the gate or the body is the gate
/// notice itself.
pub fn is_age_gate(final_url: &Url, body: &str) -> bool {
    final_url.path().starts_with(AGE_GATE_PATH) || body.contains("over18-notice")
}

/// HTTP client for board pages.
///
/// Remembers whether the age gate has been acknowledged; once it has, every
/// request carries the acknowledgment cookie.
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    /// Site root; the confirmation form is posted relative to it.
    base_url: Url,
    /// Set once the gate form has been submitted; never cleared.
    gate_acknowledged: AtomicBool,
}

impl HttpFetcher {
    /// Build a fetcher for the site at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Site root, e.g. `https://www.ptt.cc`.
    /// * `timeout` - Per-request timeout, connect to last byte.
    ///
    /// # Returns
    ///
    /// The fetcher, or [`FetchError::Network`] if the HTTP client can't be
    /// built.
    pub fn new(base_url: Url, timeout: StdDuration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            base_url,
            gate_acknowledged: AtomicBool::new(false),
        })
    }

    /// Whether the age gate has been confirmed during this run.
    pub fn gate_acknowledged(&self) -> bool {
        self.gate_acknowledged.load(Ordering::Relaxed)
    }

    /// One GET. Returns the final URL (after redirects) with the body.
    async fn get_once(&self, url: &Url) -> Result<(Url, String), FetchError> {
        let mut req = self
            .client
            .get(url.clone())
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_ZH_TW)
            .header(CONNECTION, "keep-alive");
        if self.gate_acknowledged() {
            req = req.header(COOKIE, AGE_GATE_COOKIE);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let final_url = resp.url().clone();
        let body = resp.text().await?;
        Ok((final_url, body))
    }

    /// Submit the over-18 form for `original` and remember that we did.
    #[instrument(level = "info", skip_all, fields(url = %original))]
    async fn confirm_age_gate(&self, original: &Url) -> Result<(), FetchError> {
        self.gate_acknowledged.store(true, Ordering::Relaxed);

        let confirm_url = self
            .base_url
            .join(AGE_GATE_PATH)
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let from = match original.query() {
            Some(q) => format!("{}?{}", original.path(), q),
            None => original.path().to_string(),
        };

        let resp = self
            .client
            .post(confirm_url)
            .header(USER_AGENT, random_user_agent())
            .header(COOKIE, AGE_GATE_COOKIE)
            .form(&[("from", from.as_str()), ("yes", "yes")])
            .send()
            .await?;
        debug!(status = %resp.status(), "Posted age gate confirmation");
        Ok(())
    }
}

impl PageSource for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let (final_url, body) = self.get_once(url).await?;
        if !is_age_gate(&final_url, &body) {
            debug!(bytes = body.len(), elapsed_ms = t0.elapsed().as_millis(), "Fetched page");
            return Ok(body);
        }

        info!("Age gate encountered; confirming");
        self.confirm_age_gate(url).await?;

        let (final_url, body) = self.get_once(url).await?;
        if is_age_gate(&final_url, &body) {
            return Err(FetchError::AgeGate {
                url: url.to_string(),
            });
        }
        debug!(bytes = body.len(), elapsed_ms = t0.elapsed().as_millis(), "Fetched page past age gate");
        Ok(body)
    }
}
