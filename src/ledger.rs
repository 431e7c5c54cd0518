//! Idempotency guard: decide whether a date still needs to be ingested.
//!
//! A date is written only when it is strictly newer than the newest date
//! already in the store. Re-running for the same day, or for an older one,
//! is a no-op rather than an error.

use crate::error::StorageError;
use crate::storage::PageviewStore;
use crate::utils::parse_date;
use std::cmp::Ordering;
use tracing::{info, instrument};

/// Outcome of consulting the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing recorded yet, or the candidate is newer than `last`.
    Ingest { last: Option<String> },
    /// The candidate is not newer than `last`.
    Skip { last: String },
}

impl Decision {
    pub fn should_ingest(&self) -> bool {
        matches!(self, Decision::Ingest { .. })
    }
}

/// Compare two `YYYY/MM/DD` dates, by calendar when both parse and
/// lexicographically otherwise.
pub fn compare_dates(a: &str, b: &str) -> Ordering {
    match (parse_date(a), parse_date(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Pure decision rule: ingest iff there is no `last` or `candidate > last`.
pub fn decide(candidate: &str, last: Option<String>) -> Decision {
    match last {
        Some(last) if compare_dates(candidate, &last) != Ordering::Greater => Decision::Skip { last },
        last => Decision::Ingest { last },
    }
}

/// Ask `store` for its newest date and decide about `candidate`.
#[instrument(level = "info", skip(store))]
pub async fn check<S: PageviewStore>(store: &S, candidate: &str) -> Result<Decision, StorageError> {
    let last = store.last_recorded_date().await?;
    let decision = decide(candidate, last);
    info!(?decision, ingest = decision.should_ingest(), "Ledger decision");
    Ok(decision)
}
