//! Durable storage for cleaned pageview records.
//!
//! Two interchangeable backends implement [`PageviewStore`]:
//!
//! | Backend | Module | Layout | "Last date" query |
//! |---------|--------|--------|-------------------|
//! | Flat file | [`flat_file`] | `rank,article,views,date` rows appended to one file | Date field of the final line |
//! | SQLite | [`sqlite`] | `article` + `pageview` tables | `MAX(date)` over `pageview` |
//!
//! [`Store`] picks one at construction time and owns it for the run.
//! It must be released with [`Store::close`] on every exit path.

pub mod flat_file;
pub mod sqlite;

use crate::error::StorageError;
use crate::models::PageviewRecord;
use clap::ValueEnum;
use flat_file::CsvStore;
use sqlite::SqliteStore;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Common contract of the storage backends.
pub trait PageviewStore {
    /// The most recent date with at least one record, if any.
    async fn last_recorded_date(&self) -> Result<Option<String>, StorageError>;

    /// Persist one date's worth of records. Either all of them become
    /// visible or, on error, none do (SQLite) or the error is surfaced
    /// before the date is considered recorded (flat file).
    async fn append(&self, records: &[PageviewRecord]) -> Result<(), StorageError>;

    /// Every record stored for `date`, ordered by rank.
    async fn records_for_date(&self, date: &str) -> Result<Vec<PageviewRecord>, StorageError>;
}

/// Which backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Append-only delimited text file.
    Csv,
    /// SQLite database with normalized article titles.
    Sqlite,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Csv => f.write_str("csv"),
            BackendKind::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// The store handle owned by a run.
#[derive(Debug)]
pub enum Store {
    Csv(CsvStore),
    Sqlite(SqliteStore),
}

impl Store {
    /// Open the selected backend. The SQLite variant connects and creates
    /// its schema here; the flat file is only touched on first use.
    #[instrument(level = "info", skip_all, fields(backend = %kind))]
    pub async fn open(kind: BackendKind, csv_path: &Path, db_path: &Path) -> Result<Self, StorageError> {
        let store = match kind {
            BackendKind::Csv => {
                let store = CsvStore::new(csv_path);
                debug!(path = %store.path().display(), "Using flat file");
                Store::Csv(store)
            }
            BackendKind::Sqlite => Store::Sqlite(SqliteStore::open(db_path).await?),
        };
        info!("Store opened");
        Ok(store)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Store::Csv(_) => BackendKind::Csv,
            Store::Sqlite(_) => BackendKind::Sqlite,
        }
    }

    /// Release the backend. Closing the SQLite pool waits for the
    /// connection to be returned and shut down.
    pub async fn close(self) {
        match self {
            Store::Csv(_) => {}
            Store::Sqlite(store) => store.close().await,
        }
        info!("Store closed");
    }
}

impl PageviewStore for Store {
    async fn last_recorded_date(&self) -> Result<Option<String>, StorageError> {
        match self {
            Store::Csv(store) => store.last_recorded_date().await,
            Store::Sqlite(store) => store.last_recorded_date().await,
        }
    }

    async fn append(&self, records: &[PageviewRecord]) -> Result<(), StorageError> {
        match self {
            Store::Csv(store) => store.append(records).await,
            Store::Sqlite(store) => store.append(records).await,
        }
    }

    async fn records_for_date(&self, date: &str) -> Result<Vec<PageviewRecord>, StorageError> {
        match self {
            Store::Csv(store) => store.records_for_date(date).await,
            Store::Sqlite(store) => store.records_for_date(date).await,
        }
    }
}
