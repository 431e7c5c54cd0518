//! Command-line interface definitions for Curiosity Index.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option has a default or is optional, so a scheduler can invoke the
//! binary with no arguments; most can also be set through environment variables.

use crate::api::{ClientSettings, DEFAULT_API_URL, DEFAULT_PAGEVIEWS_URL, DEFAULT_USER_AGENT};
use crate::storage::BackendKind;
use crate::utils::date_arg;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the Curiosity Index ingester.
///
/// # Examples
///
/// ```sh
/// # Ingest the report from two days ago into pageviews.csv
/// curiosity_index
///
/// # Use SQLite instead, and pick the date explicitly
/// curiosity_index --backend sqlite --db-path data/wikipedia.db --date 2024/01/10
///
/// # Look up an article's categories
/// curiosity_index categories Cat
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Storage backend
    #[arg(long, env = "CURIOSITY_BACKEND", value_enum, default_value_t = BackendKind::Csv)]
    pub backend: BackendKind,

    /// Path of the flat-file store
    #[arg(long, env = "CURIOSITY_CSV_PATH", default_value = "pageviews.csv")]
    pub csv_path: PathBuf,

    /// Path of the SQLite database
    #[arg(long, env = "CURIOSITY_DB_PATH", default_value = "wikipedia.db")]
    pub db_path: PathBuf,

    /// Wikimedia API access token, sent as a bearer token
    #[arg(long, env = "MEDIAWIKI_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// User-Agent header for every request
    #[arg(long, env = "CURIOSITY_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Base URL of the top-pageviews endpoint; the date is appended
    #[arg(long, env = "CURIOSITY_PAGEVIEWS_URL", default_value = DEFAULT_PAGEVIEWS_URL)]
    pub pageviews_url: String,

    /// URL of the MediaWiki action API
    #[arg(long, env = "CURIOSITY_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Days to step back from today, to allow for publication lag
    #[arg(long, env = "CURIOSITY_OFFSET_DAYS", default_value_t = 2)]
    pub offset_days: u32,

    /// Ingest this date (YYYY/MM/DD) instead of today minus the offset
    #[arg(long, value_parser = date_arg)]
    pub date: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(
        long,
        env = "CURIOSITY_TIMEOUT_SECS",
        default_value_t = 20,
        value_parser = clap::value_parser!(u64).range(1..=120)
    )]
    pub timeout_secs: u64,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch, clean and store the daily top list (the default)
    Ingest,
    /// Print the categories of an article as JSON
    Categories { title: String },
    /// Print the plain-text extract of an article as JSON
    Extract { title: String },
    /// Print the most recent date in the store
    LastDate,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Ingest)
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            pageviews_url: self.pageviews_url.clone(),
            api_url: self.api_url.clone(),
            user_agent: self.user_agent.clone(),
            access_token: self.access_token.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
