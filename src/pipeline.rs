//! One run of the watcher: walk → filter → dedupe → notify → record → flush.
//!
//! Fatal errors (the latest listing page can't be fetched) return before the
//! store is touched. Everything after that degrades gracefully: a failed
//! notification is logged and left unrecorded, so the next run retries it.

use crate::fetch::PageSource;
use crate::filter;
use crate::models::{ProcessedRecord, RunConfig};
use crate::notify::Notifier;
use crate::store::{DedupeStore, StoreError};
use crate::utils::board_now;
use crate::walker::{self, WalkError, WalkPlan};
use chrono::{DateTime, FixedOffset};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counts from one run, for the closing log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub scanned: usize,
    pub matched: usize,
    pub already_known: usize,
    pub notified: usize,
    pub failed: usize,
}

/// Run the watcher once against `config.board`.
///
/// `now` anchors the day window. Records are stamped with the moment each
/// notification succeeded.
#[instrument(level = "info", skip_all, fields(board = %config.board))]
pub async fn run<S, N, D>(
    config: &RunConfig,
    source: &S,
    notifier: &N,
    store: &mut D,
    now: DateTime<FixedOffset>,
) -> Result<RunSummary, RunError>
where
    S: PageSource,
    N: Notifier,
    D: DedupeStore,
{
    let plan = WalkPlan::from_config(config, now);
    let entries = walker::walk(source, &config.base_url, &plan).await?;

    let mut summary = RunSummary {
        scanned: entries.len(),
        ..RunSummary::default()
    };

    for entry in entries
        .iter()
        .filter(|e| filter::matches(&e.title, &config.keywords))
    {
        summary.matched += 1;
        if !store.is_new(&entry.id) {
            summary.already_known += 1;
            debug!(id = %entry.id, "Already notified; skipping");
            continue;
        }

        info!(id = %entry.id, title = %entry.title, "New matching article");
        match notifier.notify(entry).await {
            Ok(()) => {
                store.append(ProcessedRecord::new(entry.id.clone(), board_now()));
                summary.notified += 1;
            }
            Err(e) => {
                summary.failed += 1;
                error!(id = %entry.id, error = %e, "Notification failed; will retry next run");
            }
        }
    }

    store.flush().await?;
    info!(
        scanned = summary.scanned,
        matched = summary.matched,
        already_known = summary.already_known,
        notified = summary.notified,
        failed = summary.failed,
        "Run complete"
    );
    Ok(summary)
}
