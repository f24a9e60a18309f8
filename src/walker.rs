//! Pagination over a board's listing, newest page first.
//!
//! The walk starts at `index.html`, learns its numeric index from the
//! `‹ 上頁` link on that same page, then steps backwards one index at a time
//! until one of these happens:
//!
//! - a page holds a non-pinned post older than `now - day_range`
//! - `max_pages` pages have been read
//! - the board's first page has been read
//! - fetching an older page fails (entries gathered so far are kept)
//!
//! Failing to fetch `index.html` itself is fatal.
//!
//! Pinned posts are returned like any other entry when their date falls inside
//! the window, but never end the walk: they sit on the latest page whatever
//! their age.

use crate::fetch::{FetchError, PageSource};
use crate::models::{ArticleEntry, PageCursor, PostedAt, RunConfig};
use crate::scrapers::ptt::{parse_listing, parse_post_time, parse_prev_index};
use chrono::{DateTime, Duration, FixedOffset};
use itertools::Itertools;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("failed to fetch latest page {url}: {source}")]
    LatestPage {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("invalid listing URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Parameters of one walk.
#[derive(Debug, Clone)]
pub struct WalkPlan {
    pub board: String,
    pub day_range: u32,
    pub max_pages: u32,
    /// Pause before every request after the first, listing or article page.
    pub page_delay: StdDuration,
    /// Read each post's exact time from its article page.
    pub precise_times: bool,
    /// Reference time the day window is measured back from.
    pub now: DateTime<FixedOffset>,
}

impl WalkPlan {
    pub fn from_config(config: &RunConfig, now: DateTime<FixedOffset>) -> Self {
        Self {
            board: config.board.clone(),
            day_range: config.day_range,
            max_pages: config.max_pages,
            page_delay: config.page_delay,
            precise_times: config.precise_times,
            now,
        }
    }

    pub fn cutoff(&self) -> DateTime<FixedOffset> {
        self.now - Duration::days(i64::from(self.day_range))
    }
}

/// Walk the board and return every entry inside the day window, newest
/// first, each identifier at most once.
///
/// # Arguments
///
/// * `source` - Where pages come from, normally a retrying HTTP fetcher.
/// * `base` - Site root the board paths are joined to.
/// * `plan` - Board, window, page cap and pacing for this walk.
///
/// # Returns
///
/// The gathered entries, or [`WalkError::LatestPage`] if the latest page
/// couldn't be fetched. Failures on older pages end the walk early instead.
#[instrument(level = "info", skip_all, fields(board = %plan.board, day_range = plan.day_range, max_pages = plan.max_pages))]
pub async fn walk<S: PageSource>(
    source: &S,
    base: &Url,
    plan: &WalkPlan,
) -> Result<Vec<ArticleEntry>, WalkError> {
    let cutoff = plan.cutoff();
    let today = plan.now.date_naive();

    let latest_url = PageCursor::Latest.url(base, &plan.board)?;
    let mut html = source
        .fetch(&latest_url)
        .await
        .map_err(|source| WalkError::LatestPage {
            url: latest_url.to_string(),
            source,
        })?;

    let latest_index = parse_prev_index(&html).map_or(1, |prev| prev + 1);
    info!(latest_index, %cutoff, "Resolved latest page");

    let mut index = latest_index;
    let mut visited = 1u32;
    let mut gathered: Vec<ArticleEntry> = Vec::new();

    loop {
        let mut entries = parse_listing(&html, base, today);
        if plan.precise_times {
            refine_post_times(source, &mut entries, plan.page_delay).await;
        }

        let crossed = entries
            .iter()
            .filter(|e| !e.pinned)
            .filter_map(|e| e.posted_at)
            .any(|p| p.is_before(cutoff));
        debug!(page = index, count = entries.len(), crossed, "Read listing page");
        gathered.extend(
            entries
                .into_iter()
                .filter(|e| !e.posted_at.is_some_and(|p| p.is_before(cutoff))),
        );

        if crossed {
            info!(page = index, "Reached day-range cutoff");
            break;
        }
        if visited >= plan.max_pages {
            info!(pages = visited, "Reached page cap");
            break;
        }
        if index <= 1 {
            info!("Reached the board's first page");
            break;
        }

        sleep(plan.page_delay).await;
        index -= 1;
        let url = PageCursor::Index(index).url(base, &plan.board)?;
        match source.fetch(&url).await {
            Ok(next) => {
                html = next;
                visited += 1;
            }
            Err(e) => {
                warn!(%url, error = %e, "Page fetch failed; stopping pagination");
                break;
            }
        }
    }

    let entries: Vec<ArticleEntry> = gathered.into_iter().unique_by(|e| e.id.clone()).collect();
    info!(count = entries.len(), pages = visited, "Finished walking board");
    Ok(entries)
}

/// Replace day-precision dates with the exact time from each article page,
/// waiting `delay` before each fetch. Entries whose page can't be fetched or
/// read keep their listing date.
async fn refine_post_times<S: PageSource>(source: &S, entries: &mut [ArticleEntry], delay: StdDuration) {
    for entry in entries.iter_mut().filter(|e| e.posted_at.is_some()) {
        sleep(delay).await;
        match source.fetch(&entry.detail_url).await {
            Ok(html) => {
                if let Some(ts) = parse_post_time(&html) {
                    entry.posted_at = Some(PostedAt::Exact(ts));
                }
            }
            Err(e) => warn!(id = %entry.id, error = %e, "Could not read article time"),
        }
    }
}
