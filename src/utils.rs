//! Utility functions for date handling, log formatting and file system setup.
//!
//! This module provides helper functions used throughout the application:
//! - Formatting and parsing the `YYYY/MM/DD` dates used by the report API and the stores
//! - String truncation for logging response bodies
//! - Creating the parent directory of a store before first use

use chrono::NaiveDate;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

/// Date format of the report endpoint and of every stored record.
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// Format a date as zero-padded `YYYY/MM/DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY/MM/DD` date, returning `None` for anything else.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// True only for a date already in stored form: a valid `YYYY/MM/DD` with
/// zero-padded month and day. A row cut short inside its date field fails.
pub fn is_stored_date(s: &str) -> bool {
    parse_date(s).is_some_and(|d| format_date(d) == s)
}

/// `clap` value parser for `--date`: accepts `YYYY/MM/DD` and re-emits it zero-padded.
pub fn date_arg(s: &str) -> Result<String, String> {
    parse_date(s)
        .map(format_date)
        .ok_or_else(|| format!("expected a date as YYYY/MM/DD, got {s:?}"))
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with an
/// ellipsis and a count of the omitted bytes appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Create the parent directory of `path` if it has one and it is missing.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).await?;
            debug!(parent = %parent.display(), "Parent directory ready");
            Ok(())
        }
        _ => Ok(()),
    }
}
