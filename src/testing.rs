//! In-memory collaborators shared by the unit tests.

use crate::fetch::{FetchError, PageSource};
use crate::models::ArticleEntry;
use crate::notify::{NotifyError, Notifier};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

/// One listing row for [`listing_html`].
pub struct Row {
    pub id: String,
    pub title: String,
    pub date: String,
}

impl Row {
    pub fn new(id: &str, title: &str, date: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            date: date.to_string(),
        }
    }
}

/// Render a listing page the way the board does: rows oldest-first, in the
/// order given, with an optional `‹ 上頁` link to `index<prev>.html`.
pub fn listing_html(prev: Option<u32>, rows: &[Row]) -> String {
    listing_html_with_pinned(prev, rows, &[])
}

/// Like [`listing_html`], followed by a `r-list-sep` separator and `pinned`
/// rows when there are any.
pub fn listing_html_with_pinned(prev: Option<u32>, rows: &[Row], pinned: &[Row]) -> String {
    let mut html = String::from("<html><body><div class=\"btn-group btn-group-paging\">");
    match prev {
        Some(n) => write!(html, "<a class=\"btn wide\" href=\"/bbs/Test/index{n}.html\">&lsaquo; 上頁</a>").unwrap(),
        None => html.push_str("<a class=\"btn wide disabled\">&lsaquo; 上頁</a>"),
    }
    html.push_str("</div><div class=\"r-list-container\">");
    for row in rows {
        push_row(&mut html, row);
    }
    if !pinned.is_empty() {
        html.push_str("<div class=\"r-list-sep\"></div>");
        for row in pinned {
            push_row(&mut html, row);
        }
    }
    html.push_str("</div></body></html>");
    html
}

fn push_row(html: &mut String, row: &Row) {
    write!(
        html,
        "<div class=\"r-ent\"><div class=\"title\"><a href=\"/bbs/Test/{}.html\">{}</a></div>\
         <div class=\"meta\"><div class=\"author\">tester</div><div class=\"date\">{}</div></div></div>",
        row.id, row.title, row.date
    )
    .unwrap();
}

/// A board served from memory. Records every URL requested.
#[derive(Default)]
pub struct FakeBoard {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    pub requested: RefCell<Vec<String>>,
}

impl FakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: String) -> Self {
        self.pages.insert(url.to_string(), html);
        self
    }

    /// Make `url` fail as if every retry had been used up.
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl PageSource for FakeBoard {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let key = url.to_string();
        self.requested.borrow_mut().push(key.clone());
        if self.failing.contains(&key) {
            return Err(FetchError::Exhausted {
                attempts: 3,
                last: Box::new(FetchError::Network("connection reset".into())),
            });
        }
        self.pages
            .get(&key)
            .cloned()
            .ok_or(FetchError::Status { status: 404, url: key })
    }
}

/// Records notified ids; fails for ids in `fail_ids`.
#[derive(Default)]
pub struct FakeNotifier {
    pub fail_ids: HashSet<String>,
    pub sent: RefCell<Vec<String>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            fail_ids: ids.iter().map(|s| s.to_string()).collect(),
            sent: RefCell::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }
}

impl Notifier for FakeNotifier {
    async fn notify(&self, entry: &ArticleEntry) -> Result<(), NotifyError> {
        if self.fail_ids.contains(&entry.id) {
            return Err(NotifyError::Status {
                status: 500,
                body: "webhook down".into(),
            });
        }
        self.sent.borrow_mut().push(entry.id.clone());
        Ok(())
    }
}

/// A raw HTTP/1.1 response with `Connection: close`, so every request
/// arrives on its own connection.
pub fn http_response(status: &str, body: &str) -> String {
    if status.starts_with("204") {
        return format!("HTTP/1.1 {status}\r\nConnection: close\r\n\r\n");
    }
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serve `responses` in order on a local port, one connection each.
///
/// Returns the server's root URL and a handle resolving to the raw requests
/// received, lowercased. The handle only resolves once every response has
/// been served.
pub async fn serve_script(responses: Vec<String>) -> (Url, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
        requests
    });
    (Url::parse(&format!("http://{addr}")).unwrap(), handle)
}

/// Read one request: the head, then `content-length` bytes of body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_lowercase()
}
