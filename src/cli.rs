//! Command-line interface and run configuration.
//!
//! Every option can come from a flag or an environment variable, so the
//! scheduler that invokes us only needs to set the environment.

use crate::models::RunConfig;
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Upper bound on pages read per run.
pub const MAX_PAGES_LIMIT: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("board name must not be empty")]
    EmptyBoard,

    #[error("no usable keywords in {0:?}")]
    NoKeywords(String),
}

/// Watch a PTT board and post new keyword matches to a webhook.
///
/// # Examples
///
/// ```sh
/// # Everything from the environment
/// PTT_BOARD=Gossiping PTT_KEYWORDS=地震,颱風 DISCORD_WEBHOOK=https://... board_watch
///
/// # Look back three days over at most five pages
/// board_watch --board Gossiping --keywords 地震 --webhook https://... --days 3 --max-pages 5
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Board to watch, e.g. Gossiping
    #[arg(long, env = "PTT_BOARD")]
    pub board: String,

    /// Comma-separated keywords, matched case-insensitively against titles
    #[arg(long, env = "PTT_KEYWORDS")]
    pub keywords: String,

    /// How many days back to look
    #[arg(long, env = "PTT_DAYS", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub days: u32,

    /// Maximum listing pages to read (capped at 5)
    #[arg(long, env = "PTT_MAX_PAGES", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: u32,

    /// Incoming webhook URL notifications are posted to
    #[arg(long, env = "DISCORD_WEBHOOK")]
    pub webhook: Url,

    /// File recording already-notified article ids
    #[arg(long, env = "PTT_STATE_FILE", default_value = "processed_ids.txt")]
    pub state_file: PathBuf,

    /// Board site root
    #[arg(long, env = "PTT_BASE_URL", default_value = "https://www.ptt.cc")]
    pub base_url: Url,

    /// Pause between listing page fetches, in milliseconds
    #[arg(long, env = "PTT_PAGE_DELAY_MS", default_value_t = 1000)]
    pub page_delay_ms: u64,

    /// Per-request timeout for board pages, in seconds
    #[arg(long, env = "PTT_TIMEOUT_SECS", default_value_t = 15)]
    pub timeout_secs: u64,

    /// Read each article's exact post time from its page (one extra request per article)
    #[arg(long, env = "PTT_PRECISE_TIMES")]
    pub precise_times: bool,
}

impl Cli {
    /// Validate and normalize into a [`RunConfig`].
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        let board = self.board.trim().to_string();
        if board.is_empty() {
            return Err(ConfigError::EmptyBoard);
        }

        let keywords = parse_keywords(&self.keywords);
        if keywords.is_empty() {
            return Err(ConfigError::NoKeywords(self.keywords));
        }

        let max_pages = if self.max_pages > MAX_PAGES_LIMIT {
            warn!(requested = self.max_pages, limit = MAX_PAGES_LIMIT, "max_pages too large; clamping");
            MAX_PAGES_LIMIT
        } else {
            self.max_pages
        };

        Ok(RunConfig {
            board,
            keywords,
            day_range: self.days,
            max_pages,
            webhook_endpoint: self.webhook,
            base_url: self.base_url,
            state_file: self.state_file,
            page_delay: Duration::from_millis(self.page_delay_ms),
            request_timeout: Duration::from_secs(self.timeout_secs),
            precise_times: self.precise_times,
        })
    }
}

/// Split on commas, trim, lowercase, drop empties and duplicates.
pub fn parse_keywords(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
