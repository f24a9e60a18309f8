//! Board page scrapers.
//!
//! Each scraper turns raw HTML into [`crate::models::ArticleEntry`] values and
//! exposes the pagination hints the walker needs. Only PTT-style boards are
//! supported:
//!
//! | Board family | Module | Listing | Paging |
//! |--------------|--------|---------|--------|
//! | PTT web (`www.ptt.cc`) | [`ptt`] | `div.r-ent` rows, oldest at top | `‹ 上頁` link to `index<N>.html` |
//!
//! Scrapers never fail on bad markup: rows they can't read are skipped and
//! missing data comes back as `None`.

pub mod ptt;
