//! Turn a raw top-pageviews report into a dense, capped top list of real articles.
//!
//! The report mixes meta and administrative pages (user pages, special pages,
//! the main page) with encyclopedia articles. Those are removed, the
//! survivors keep the source order, and ranks are reassigned as `1..=K`.

use crate::models::{PageviewRecord, TopPageviewsResponse};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};

/// Maximum number of records kept per date.
pub const MAX_RECORDS: usize = 100;

/// Title of the main page, which tops the report every day.
pub const MAIN_PAGE: &str = "Main_Page";

/// Namespaces whose pages are not articles.
pub const RESERVED_NAMESPACES: [&str; 14] = [
    "User",
    "Wikipedia",
    "File",
    "MediaWiki",
    "Template",
    "Help",
    "Category",
    "Portal",
    "Draft",
    "MOS",
    "TimedText",
    "Module",
    "Special",
    "Media",
];

static NAMESPACE_MARKER: Lazy<Regex> = Lazy::new(|| {
    let alternation = RESERVED_NAMESPACES
        .iter()
        .map(|ns| regex::escape(ns))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?:{alternation}):")).expect("namespace pattern is a valid regex")
});

/// True when `title` names an encyclopedia article rather than a meta page.
pub fn is_article(title: &str) -> bool {
    title != MAIN_PAGE && !NAMESPACE_MARKER.is_match(title)
}

/// Clean and re-rank a report for `date`.
///
/// Returns `None` when `raw` is `None`, and also when nothing survives
/// filtering. Callers log the two cases differently but both end the run
/// without writing.
#[instrument(level = "info", skip(raw))]
pub fn clean_and_rank(raw: Option<&TopPageviewsResponse>, date: &str) -> Option<Vec<PageviewRecord>> {
    let raw = raw?;
    let entries = raw.articles();

    let records: Vec<PageviewRecord> = entries
        .iter()
        .filter(|entry| is_article(&entry.article))
        .take(MAX_RECORDS)
        .enumerate()
        .map(|(i, entry)| PageviewRecord {
            rank: i as u32 + 1,
            article: entry.article.clone(),
            views: entry.views,
            date: date.to_string(),
        })
        .collect();

    debug!(
        raw = entries.len(),
        dropped = entries.len().saturating_sub(records.len()),
        "Filtered report"
    );

    if records.is_empty() {
        info!("No articles survived filtering");
        return None;
    }

    info!(kept = records.len(), "Ranked articles");
    Some(records)
}
