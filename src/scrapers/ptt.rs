//! PTT web board scraper.
//!
//! Listing pages live at `/bbs/<board>/index.html` (latest) and
//! `/bbs/<board>/index<N>.html`. Each page renders articles oldest-first as
//! `div.r-ent` rows; pinned posts follow a `div.r-list-sep` separator at the
//! bottom of the latest page.
//!
//! The date column is `M/DD` with no year, so the year is inferred from the
//! current date: a month later than the current month must belong to the
//! previous year.

use crate::models::{ArticleEntry, PostedAt};
use crate::utils::board_offset;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("div.r-ent, div.r-list-sep").unwrap());
static TITLE_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("div.title a").unwrap());
static AUTHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("div.meta div.author").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.meta div.date").unwrap());
static PAGING_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.btn-group-paging a").unwrap());
static META_TAG: Lazy<Selector> = Lazy::new(|| Selector::parse("span.article-meta-tag").unwrap());
static META_VALUE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.article-meta-value").unwrap());
static INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"index(\d+)\.html$").unwrap());

/// Parse a listing page into entries, newest first.
///
/// # Arguments
///
/// * `html` - The listing page.
/// * `base` - Site root used to absolutize article links.
/// * `today` - Board-local date used to infer the year of `M/DD` dates.
///
/// Deleted posts (no title link) are skipped. Pinned posts come first in the
/// returned order and are flagged with [`ArticleEntry::pinned`].
pub fn parse_listing(html: &str, base: &Url, today: NaiveDate) -> Vec<ArticleEntry> {
    let document = Html::parse_document(html);
    let mut pinned = false;
    let mut skipped = 0usize;
    let mut entries = Vec::new();

    for row in document.select(&ROW) {
        if row.value().classes().any(|c| c == "r-list-sep") {
            pinned = true;
            continue;
        }
        match parse_row(row, base, today, pinned) {
            Some(entry) => {
                if entries.iter().any(|e: &ArticleEntry| e.id == entry.id) {
                    skipped += 1;
                    continue;
                }
                entries.push(entry);
            }
            None => skipped += 1,
        }
    }

    entries.reverse();
    debug!(count = entries.len(), skipped, "Parsed listing page");
    entries
}

fn parse_row(row: ElementRef<'_>, base: &Url, today: NaiveDate, pinned: bool) -> Option<ArticleEntry> {
    let link = row.select(&TITLE_LINK).next()?;
    let title = element_text(link);
    let href = link.value().attr("href")?;
    let id = article_id(href)?;
    if title.is_empty() {
        return None;
    }
    let detail_url = base.join(href).ok()?;

    let author = row
        .select(&AUTHOR)
        .next()
        .map(element_text)
        .filter(|a| !a.is_empty() && a != "-");

    let raw = row.select(&DATE).next().map(element_text).unwrap_or_default();
    let posted_at = parse_list_date(&raw, today).map(PostedAt::Day);
    if posted_at.is_none() {
        warn!(%id, date = %raw, pinned, "Unparseable listing date");
    }

    Some(ArticleEntry {
        id,
        title,
        author,
        posted_at,
        pinned,
        detail_url,
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Article identifier from a permalink: `/bbs/X/M.1700000000.A.1B2.html` -> `M.1700000000.A.1B2`.
pub fn article_id(href: &str) -> Option<String> {
    let last = href.trim_end_matches('/').rsplit('/').next()?;
    let id = last.strip_suffix(".html").unwrap_or(last);
    if id.is_empty() || id.starts_with("index") {
        None
    } else {
        Some(id.to_string())
    }
}

/// Parse the listing's `M/DD` date column, inferring the year from `today`.
pub fn parse_list_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let (month, day) = raw.trim().split_once('/')?;
    let month: u32 = month.trim().parse().ok()?;
    let day: u32 = day.trim().parse().ok()?;
    let year = if month > today.month() {
        today.year() - 1
    } else {
        today.year()
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Numeric index of the previous (older) page, from the `‹ 上頁` paging link.
///
/// `None` when the link is disabled, which happens on a board's first page.
pub fn parse_prev_index(html: &str) -> Option<u32> {
    let document = Html::parse_document(html);
    document
        .select(&PAGING_LINK)
        .filter(|a| element_text(*a).contains("上頁"))
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| INDEX_RE.captures(href)?.get(1)?.as_str().parse().ok())
}

/// Exact post time from an article page's `時間` header row.
///
/// The header looks like `Mon Feb  3 12:34:56 2026` in board local time.
pub fn parse_post_time(html: &str) -> Option<DateTime<FixedOffset>> {
    let document = Html::parse_document(html);
    let tags = document.select(&META_TAG);
    let values = document.select(&META_VALUE);

    let raw = tags
        .zip(values)
        .find(|(tag, _)| element_text(*tag) == "時間")
        .map(|(_, value)| element_text(value))?;

    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match NaiveDateTime::parse_from_str(&normalized, "%a %b %d %H:%M:%S %Y") {
        Ok(naive) => board_offset().from_local_datetime(&naive).single(),
        Err(e) => {
            warn!(time = %raw, error = %e, "Unparseable article header time");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing_html, Row};

    fn base() -> Url {
        Url::parse("https://www.ptt.cc").unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const LISTING: &str = r#"
<div id="action-bar-container">
  <div class="btn-group btn-group-paging">
    <a class="btn wide" href="/bbs/Test/index1.html">最舊</a>
    <a class="btn wide" href="/bbs/Test/index3999.html">&lsaquo; 上頁</a>
    <a class="btn wide disabled">下頁 &rsaquo;</a>
    <a class="btn wide" href="/bbs/Test/index.html">最新</a>
  </div>
</div>
<div class="r-list-container action-bar-margin bbs-screen">
  <div class="r-ent">
    <div class="nrec"><span class="hl f2">5</span></div>
    <div class="title"><a href="/bbs/Test/M.1700000001.A.001.html">[新聞] 颱風警報發布</a></div>
    <div class="meta"><div class="author">alice</div><div class="article-menu"></div><div class="date"> 3/09</div></div>
  </div>
  <div class="r-ent">
    <div class="nrec"></div>
    <div class="title">(本文已被刪除) [bob]</div>
    <div class="meta"><div class="author">-</div><div class="date"> 3/09</div></div>
  </div>
  <div class="r-ent">
    <div class="nrec"></div>
    <div class="title"><a href="/bbs/Test/M.1700000002.A.002.html">[問卦] 今天吃什麼</a></div>
    <div class="meta"><div class="author">carol</div><div class="date"> 3/10</div></div>
  </div>
  <div class="r-list-sep"></div>
  <div class="r-ent">
    <div class="nrec"><span class="hl f1">爆</span></div>
    <div class="title"><a href="/bbs/Test/M.1500000000.A.0AA.html">[公告] 板規</a></div>
    <div class="meta"><div class="author">mod</div><div class="date">11/20</div></div>
  </div>
</div>
"#;

    #[test]
    fn test_parse_listing_newest_first_skips_deleted() {
        let entries = parse_listing(LISTING, &base(), day(2026, 3, 10));
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["M.1500000000.A.0AA", "M.1700000002.A.002", "M.1700000001.A.001"]
        );

        // 11/20 is after March, so it belongs to last year
        let pinned = &entries[0];
        assert!(pinned.pinned);
        assert_eq!(pinned.posted_at, Some(PostedAt::Day(day(2025, 11, 20))));

        let newest = &entries[1];
        assert!(!newest.pinned);
        assert_eq!(newest.title, "[問卦] 今天吃什麼");
        assert_eq!(newest.author.as_deref(), Some("carol"));
        assert_eq!(newest.posted_at, Some(PostedAt::Day(day(2026, 3, 10))));
        assert_eq!(
            newest.detail_url.as_str(),
            "https://www.ptt.cc/bbs/Test/M.1700000002.A.002.html"
        );
    }

    #[test]
    fn test_parse_listing_empty_page() {
        assert!(parse_listing("<html><body></body></html>", &base(), day(2026, 3, 10)).is_empty());
        assert!(parse_listing("not even html", &base(), day(2026, 3, 10)).is_empty());
    }

    #[test]
    fn test_parse_listing_from_builder() {
        let html = listing_html(
            Some(7),
            &[Row::new("A1", "Storm warning issued", "1/02"), Row::new("A2", "Daily thread", "1/03")],
        );
        let entries = parse_listing(&html, &base(), day(2026, 1, 3));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "A2");
        assert_eq!(entries[1].id, "A1");
        assert_eq!(parse_prev_index(&html), Some(7));
    }

    #[test]
    fn test_year_inference_across_new_year() {
        let today = day(2026, 1, 2);
        assert_eq!(parse_list_date("12/31", today), Some(day(2025, 12, 31)));
        assert_eq!(parse_list_date(" 1/02", today), Some(day(2026, 1, 2)));
        assert_eq!(parse_list_date("1/01", today), Some(day(2026, 1, 1)));
    }

    #[test]
    fn test_list_date_rejects_garbage() {
        let today = day(2026, 3, 10);
        assert_eq!(parse_list_date("", today), None);
        assert_eq!(parse_list_date("3-10", today), None);
        assert_eq!(parse_list_date("x/10", today), None);
        // 2026 is not a leap year
        assert_eq!(parse_list_date("2/29", today), None);
    }

    #[test]
    fn test_article_id_from_href() {
        assert_eq!(
            article_id("/bbs/Test/M.1700000001.A.001.html").as_deref(),
            Some("M.1700000001.A.001")
        );
        assert_eq!(article_id("/bbs/Test/index.html"), None);
        assert_eq!(article_id(""), None);
    }

    #[test]
    fn test_parse_prev_index() {
        assert_eq!(parse_prev_index(LISTING), Some(3999));
        let first_page = r#"<div class="btn-group btn-group-paging">
            <a class="btn wide disabled">最舊</a>
            <a class="btn wide disabled">&lsaquo; 上頁</a>
        </div>"#;
        assert_eq!(parse_prev_index(first_page), None);
    }

    #[test]
    fn test_parse_post_time() {
        let html = r#"<div id="main-content">
            <div class="article-metaline"><span class="article-meta-tag">作者</span><span class="article-meta-value">alice (Alice)</span></div>
            <div class="article-metaline"><span class="article-meta-tag">標題</span><span class="article-meta-value">[新聞] 颱風警報發布</span></div>
            <div class="article-metaline"><span class="article-meta-tag">時間</span><span class="article-meta-value">Tue Feb  3 12:34:56 2026</span></div>
        </div>"#;
        let ts = parse_post_time(html).unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-02-03T12:34:56+08:00");

        assert_eq!(parse_post_time("<div>no header</div>"), None);
    }
}
