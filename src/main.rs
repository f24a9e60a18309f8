//! # Board Watch
//!
//! Watches a PTT-style forum board for new articles whose titles contain any
//! of a set of keywords, and posts each new match to a webhook (Discord or
//! anything accepting `{"content": ...}`).
//!
//! ## Usage
//!
//! ```sh
//! PTT_BOARD=Gossiping PTT_KEYWORDS=地震,颱風 DISCORD_WEBHOOK=https://... board_watch
//! ```
//!
//! ## Architecture
//!
//! Each invocation is one sequential run, meant to be triggered by an
//! external scheduler:
//! 1. **Load**: read the dedupe store of already-notified article ids
//! 2. **Walk**: fetch listing pages newest-first until the day window or page cap ends
//! 3. **Filter**: keep titles containing a keyword
//! 4. **Notify**: post each match not seen before, recording successes
//! 5. **Flush**: append the new ids to the store
//!
//! The scheduler is expected to persist the store file between runs.
//! Overlapping runs are not guarded against and may notify twice.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod fetch;
mod filter;
mod models;
mod notify;
mod pipeline;
mod scrapers;
mod store;
#[cfg(test)]
mod testing;
mod utils;
mod walker;

use cli::Cli;
use fetch::{Backoff, HttpFetcher, RetryFetch};
use notify::WebhookNotifier;
use store::FlatFileStore;
use utils::board_now;

/// Attempts per page before giving up.
const FETCH_ATTEMPTS: usize = 3;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("board_watch starting up");

    let args = Cli::parse();
    debug!(board = %args.board, max_pages = args.max_pages, "Parsed CLI arguments");

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        board = %config.board,
        keywords = ?config.keywords,
        day_range = config.day_range,
        max_pages = config.max_pages,
        state_file = %config.state_file.display(),
        "Loaded configuration"
    );

    let fetcher = HttpFetcher::new(config.base_url.clone(), config.request_timeout)?;
    let source = RetryFetch::new(fetcher, FETCH_ATTEMPTS, Backoff::default());
    let notifier = WebhookNotifier::new(config.webhook_endpoint.clone(), config.board.clone())?;
    let mut store = FlatFileStore::load(&config.state_file).await?;
    debug!(path = %store.path().display(), known = store.len(), "Dedupe store ready");

    let summary = match pipeline::run(&config, &source, &notifier, &mut store, board_now()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Run aborted");
            return Err(e.into());
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        notified = summary.notified,
        failed = summary.failed,
        "Execution complete"
    );

    Ok(())
}
