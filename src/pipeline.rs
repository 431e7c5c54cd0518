//! The ingestion run: fetch → clean/rank → ledger check → append.
//!
//! Every run ends in exactly one [`Outcome`], or in a [`StorageError`] when
//! the store cannot be read or written.

use crate::api::PageviewSource;
use crate::error::StorageError;
use crate::ledger::{self, Decision};
use crate::ranking::clean_and_rank;
use crate::storage::{BackendKind, PageviewStore, Store};
use crate::utils::format_date;
use chrono::{Days, NaiveDate};
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

/// Exit status when the report could not be fetched.
pub const EXIT_FETCH_FAILED: u8 = 1;
/// Exit status when the store could not be opened, read or written.
pub const EXIT_STORAGE_FAILED: u8 = 2;

/// Terminal state of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    FetchFailed { date: String },
    EmptyDataset { date: String },
    AlreadyIngested { date: String, last: String },
    Ingested { date: String, count: usize },
}

impl Outcome {
    /// Process exit status for this outcome. Only a failed fetch is an
    /// error; having nothing to do is not.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::FetchFailed { .. } => EXIT_FETCH_FAILED,
            _ => 0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::FetchFailed { date } => write!(f, "Failed to fetch data for {date}"),
            Outcome::EmptyDataset { date } => write!(f, "No data to insert for {date}"),
            Outcome::AlreadyIngested { date, last } => write!(
                f,
                "Data for {date} has already been ingested (last recorded date {last})"
            ),
            Outcome::Ingested { date, count } => {
                write!(f, "Successfully inserted {count} records for {date}")
            }
        }
    }
}

/// `today - offset_days`, formatted `YYYY/MM/DD`.
pub fn target_date(today: NaiveDate, offset_days: u32) -> String {
    let date = today
        .checked_sub_days(Days::new(u64::from(offset_days)))
        .unwrap_or(NaiveDate::MIN);
    format_date(date)
}

/// Run the pipeline for `date` against an already-open store.
#[instrument(level = "info", skip(source, store))]
pub async fn run<S, T>(source: &S, store: &T, date: &str) -> Result<Outcome, StorageError>
where
    S: PageviewSource,
    T: PageviewStore,
{
    let raw = source.fetch_top_pageviews(date).await;
    if raw.is_none() {
        warn!("No report fetched");
        return Ok(Outcome::FetchFailed {
            date: date.to_string(),
        });
    }

    let Some(records) = clean_and_rank(raw.as_ref(), date) else {
        return Ok(Outcome::EmptyDataset {
            date: date.to_string(),
        });
    };

    match ledger::check(store, date).await? {
        Decision::Skip { last } => {
            info!(%last, "Date already ingested");
            return Ok(Outcome::AlreadyIngested {
                date: date.to_string(),
                last,
            });
        }
        Decision::Ingest { last } => debug!(?last, "Date is new"),
    }

    store.append(&records).await?;
    info!(count = records.len(), "Ingestion complete");
    Ok(Outcome::Ingested {
        date: date.to_string(),
        count: records.len(),
    })
}

/// Open the selected store, run the pipeline, and close the store on every
/// path out of the run.
#[instrument(level = "info", skip(source, csv_path, db_path))]
pub async fn run_with_store<S>(
    source: &S,
    backend: BackendKind,
    csv_path: &Path,
    db_path: &Path,
    date: &str,
) -> Result<Outcome, StorageError>
where
    S: PageviewSource,
{
    let store = Store::open(backend, csv_path, db_path).await?;
    info!(backend = %store.kind(), "Running against store");
    let result = run(source, &store, date).await;
    store.close().await;
    if let Err(ref e) = result {
        error!(error = %e, "Storage failure");
    }
    result
}
