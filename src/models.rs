//! Data models for the top-pageviews report and the records we persist.
//!
//! This module defines the core data structures used throughout the application:
//! - [`TopPageviewsResponse`]: The raw report as returned by the Wikimedia REST API
//! - [`RawArticleEntry`]: One entry of that report, unfiltered
//! - [`PageviewRecord`]: A cleaned, densely ranked row ready for storage
//! - [`Article`]: An article row in the relational store

use serde::Deserialize;

/// The top-pageviews report for one project and one day.
///
/// Only `items` is required; the API wraps a single item per request.
///
/// ```json
/// { "items": [ { "articles": [ { "article": "Cat", "views": 500, "rank": 1 } ] } ] }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopPageviewsResponse {
    pub items: Vec<TopPageviewsItem>,
}

/// A single item of the report. The API echoes the request parameters
/// alongside the ranked article list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopPageviewsItem {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default)]
    pub articles: Vec<RawArticleEntry>,
}

impl TopPageviewsResponse {
    /// The flat article list of the first item, or an empty slice when the
    /// report has no items.
    pub fn articles(&self) -> &[RawArticleEntry] {
        self.items
            .first()
            .map(|item| item.articles.as_slice())
            .unwrap_or(&[])
    }
}

/// One ranked entry as returned by the source. The rank is not dense once
/// non-article pages are removed, so it is never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawArticleEntry {
    /// Article title with underscores, e.g. `Main_Page`.
    pub article: String,
    pub views: u64,
    pub rank: u32,
}

/// A cleaned pageview row for one `(date, article)` pair.
///
/// `date` is always zero-padded `YYYY/MM/DD`, so string ordering matches
/// calendar ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageviewRecord {
    /// Dense rank, starting at 1.
    pub rank: u32,
    pub article: String,
    pub views: u64,
    pub date: String,
}

/// An article row in the relational store. The flat-file store has no
/// equivalent and keeps the title inline on every record.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub title: String,
}
