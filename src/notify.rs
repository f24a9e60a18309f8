//! Webhook notifications for matched articles.
//!
//! Messages are posted as `{"content": "..."}`, which is what Discord
//! webhooks expect. There is no retry here: a failed notification is left
//! unrecorded so the next run tries it again.

use crate::models::ArticleEntry;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

const WEBHOOK_TIMEOUT: StdDuration = StdDuration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook transport error: {0}")]
    Transport(String),

    #[error("webhook returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}

/// Something that can announce an article.
pub trait Notifier {
    async fn notify(&self, entry: &ArticleEntry) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Format the message for `entry`:
///
/// ```text
/// [Gossiping] 03/10 | [新聞] 颱風警報發布 (alice) https://www.ptt.cc/bbs/Gossiping/M.1700000001.A.001.html
/// ```
pub fn render_message(board: &str, entry: &ArticleEntry) -> String {
    let date = entry
        .posted_at
        .map(|p| p.label())
        .unwrap_or_else(|| "未知".to_string());
    match &entry.author {
        Some(author) => format!(
            "[{board}] {date} | {} ({author}) {}",
            entry.title, entry.detail_url
        ),
        None => format!("[{board}] {date} | {} {}", entry.title, entry.detail_url),
    }
}

/// Posts to an incoming-webhook URL.
#[derive(Debug)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: Url,
    board: String,
}

impl WebhookNotifier {
    /// # Arguments
    ///
    /// * `endpoint` - Incoming-webhook URL the messages are posted to.
    /// * `board` - Board name shown at the start of every message.
    ///
    /// # Returns
    ///
    /// The notifier, or [`NotifyError::Transport`] if the HTTP client can't
    /// be built.
    pub fn new(endpoint: Url, board: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint,
            board: board.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    #[instrument(level = "info", skip_all, fields(id = %entry.id))]
    async fn notify(&self, entry: &ArticleEntry) -> Result<(), NotifyError> {
        let t0 = Instant::now();
        let content = render_message(&self.board, entry);
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&WebhookPayload { content: &content })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, body = %truncate_for_log(&body, 300), "Webhook rejected notification");
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        info!(elapsed_ms = t0.elapsed().as_millis(), title = %entry.title, "Sent notification");
        Ok(())
    }
}
