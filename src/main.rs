//! # Curiosity Index
//!
//! A batch ingester for the daily "top viewed articles" report of English
//! Wikipedia. Each run fetches one day's report, drops non-article pages,
//! re-ranks the rest into a dense top 100 and records it, once per date,
//! in either a CSV file or a SQLite database.
//!
//! ## Usage
//!
//! ```sh
//! MEDIAWIKI_ACCESS_TOKEN=... curiosity_index --backend sqlite
//! ```
//!
//! ## Architecture
//!
//! The run is a straight pipeline:
//! 1. **Fetch**: GET the top-pageviews report for `today - offset`
//! 2. **Clean**: drop reserved-namespace pages and `Main_Page`, re-rank 1..=100
//! 3. **Gate**: skip unless the date is newer than the newest stored date
//! 4. **Store**: append the records (one transaction on SQLite)
//!
//! The outcome is printed as a single line on stdout; logs go to stderr.

use chrono::Local;
use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod error;
mod ledger;
mod models;
mod pipeline;
mod ranking;
mod storage;
mod utils;

use api::WikimediaClient;
use cli::{Cli, Command};
use pipeline::{EXIT_FETCH_FAILED, EXIT_STORAGE_FAILED};
use storage::{PageviewStore, Store};

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    let args = Cli::parse();
    debug!(?args.backend, ?args.csv_path, ?args.db_path, "Parsed CLI arguments");

    let code = match args.command() {
        Command::Ingest => ingest(&args).await,
        Command::Categories { title } => {
            lookup(&args, |client| async move { client.fetch_article_categories(&title).await }).await
        }
        Command::Extract { title } => {
            lookup(&args, |client| async move { client.fetch_article_text(&title).await }).await
        }
        Command::LastDate => last_date(&args).await,
    };

    let elapsed = start_time.elapsed();
    info!(?elapsed, exit_code = code, "Execution complete");
    ExitCode::from(code)
}

async fn ingest(args: &Cli) -> u8 {
    let date = args
        .date
        .clone()
        .unwrap_or_else(|| pipeline::target_date(Local::now().date_naive(), args.offset_days));
    info!(%date, backend = %args.backend, "Pageview ingestion starting");

    let client = match WikimediaClient::new(&args.client_settings()) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Could not set up HTTP client");
            println!("Failed to fetch data for {date}");
            return EXIT_FETCH_FAILED;
        }
    };

    match pipeline::run_with_store(&client, args.backend, &args.csv_path, &args.db_path, &date).await {
        Ok(outcome) => {
            println!("{outcome}");
            outcome.exit_code()
        }
        Err(e) => {
            println!("Failed to store data for {date}: {e}");
            EXIT_STORAGE_FAILED
        }
    }
}

async fn lookup<F, Fut>(args: &Cli, query: F) -> u8
where
    F: FnOnce(WikimediaClient) -> Fut,
    Fut: Future<Output = Option<serde_json::Value>>,
{
    let client = match WikimediaClient::new(&args.client_settings()) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Could not set up HTTP client");
            return EXIT_FETCH_FAILED;
        }
    };

    match query(client).await {
        Some(json) => match serde_json::to_string_pretty(&json) {
            Ok(pretty) => {
                println!("{pretty}");
                0
            }
            Err(e) => {
                error!(error = %e, "Could not render response");
                EXIT_FETCH_FAILED
            }
        },
        None => {
            println!("Lookup failed");
            EXIT_FETCH_FAILED
        }
    }
}

async fn last_date(args: &Cli) -> u8 {
    let store = match Store::open(args.backend, &args.csv_path, &args.db_path).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Could not open store");
            return EXIT_STORAGE_FAILED;
        }
    };

    let result = store.last_recorded_date().await;
    store.close().await;
    match result {
        Ok(Some(date)) => {
            println!("{date}");
            0
        }
        Ok(None) => {
            println!("none");
            0
        }
        Err(e) => {
            error!(error = %e, "Could not read store");
            EXIT_STORAGE_FAILED
        }
    }
}
