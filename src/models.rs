//! Data models shared by the scraper, walker, store and notifier.
//!
//! - [`ArticleEntry`]: one row of a board listing page
//! - [`PostedAt`]: how precisely we know when an entry was posted
//! - [`ProcessedRecord`]: one line of the dedupe log
//! - [`RunConfig`]: the validated configuration for a single run
//! - [`PageCursor`]: position in the board's listing pagination

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// When an article was posted.
///
/// The listing page only shows `M/DD`, so most entries carry a [`PostedAt::Day`].
/// The article page itself has a full timestamp, which is used when precise
/// times are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostedAt {
    /// Calendar day (board local time) inferred from the listing.
    Day(NaiveDate),
    /// Exact instant read from the article header.
    Exact(DateTime<FixedOffset>),
}

impl PostedAt {
    /// Whether this post falls before `cutoff`.
    ///
    /// Day precision compares calendar dates so that anything posted on the
    /// cutoff's own day is still inside the window.
    pub fn is_before(&self, cutoff: DateTime<FixedOffset>) -> bool {
        match self {
            PostedAt::Day(day) => *day < cutoff.date_naive(),
            PostedAt::Exact(ts) => *ts < cutoff,
        }
    }

    /// Short `MM/DD` label used in notifications.
    pub fn label(&self) -> String {
        match self {
            PostedAt::Day(day) => day.format("%m/%d").to_string(),
            PostedAt::Exact(ts) => ts.format("%m/%d %H:%M").to_string(),
        }
    }
}

/// A single article as listed on a board page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleEntry {
    /// Board-unique identifier taken from the permalink, e.g. `M.1700000000.A.1B2`.
    pub id: String,
    /// Title as shown in the listing, including any `[分類]` prefix.
    pub title: String,
    /// `None` when the listing shows no author.
    pub author: Option<String>,
    /// `None` when the listing date could not be parsed.
    pub posted_at: Option<PostedAt>,
    /// Rendered below the listing separator (announcements, board rules).
    /// Pinned posts stay on the latest page regardless of age, so their dates
    /// say nothing about where the day window ends.
    pub pinned: bool,
    /// Absolute URL of the article page.
    pub detail_url: Url,
}

/// One line of the dedupe log: an identifier that has already been notified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRecord {
    /// Identifier of the notified article.
    pub id: String,
    /// `None` for lines written before timestamps were recorded.
    pub notified_at: Option<DateTime<FixedOffset>>,
}

impl ProcessedRecord {
    /// Record for `id`, notified at `notified_at`.
    pub fn new(id: impl Into<String>, notified_at: DateTime<FixedOffset>) -> Self {
        Self {
            id: id.into(),
            notified_at: Some(notified_at),
        }
    }
}

impl fmt::Display for ProcessedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.notified_at {
            Some(ts) => write!(
                f,
                "{}|{}",
                self.id,
                ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
            ),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Position in a board's listing.
///
/// `Latest` is `index.html`; its numeric index is only known after fetching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    Latest,
    Index(u32),
}

impl PageCursor {
    /// Listing URL for this cursor on `board`.
    ///
    /// # Arguments
    ///
    /// * `base` - Site root, e.g. `https://www.ptt.cc`.
    /// * `board` - Board name as it appears in the URL path.
    ///
    /// # Returns
    ///
    /// The absolute page URL, or the join error if `base` can't take a path.
    pub fn url(&self, base: &Url, board: &str) -> Result<Url, url::ParseError> {
        let path = match self {
            PageCursor::Latest => format!("/bbs/{board}/index.html"),
            PageCursor::Index(n) => format!("/bbs/{board}/index{n}.html"),
        };
        base.join(&path)
    }
}

/// Validated configuration for one run. Built once by [`crate::cli::Cli::into_config`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Board to watch, e.g. `Gossiping`.
    pub board: String,
    /// Lowercased, trimmed, never empty.
    pub keywords: BTreeSet<String>,
    /// How many days back a post may be and still count. At least 1.
    pub day_range: u32,
    /// Upper bound on listing pages fetched per run, already clamped.
    pub max_pages: u32,
    /// Where notifications are posted.
    pub webhook_endpoint: Url,
    /// Site root the board lives under.
    pub base_url: Url,
    /// Path of the dedupe log.
    pub state_file: PathBuf,
    /// Pause between consecutive requests to the board.
    pub page_delay: Duration,
    /// Per-request timeout for board fetches.
    pub request_timeout: Duration,
    /// Read exact post times from article pages instead of listing dates.
    pub precise_times: bool,
}
