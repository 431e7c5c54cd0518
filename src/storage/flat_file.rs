//! Append-only CSV backend.
//!
//! Rows are `rank,article,views,date`, appended one date at a time in
//! chronological order. The header is written once, when the file is first
//! created. Because `date` is the last column and dates never contain a
//! comma, the ledger only has to look at the tail of the final line.

use crate::error::StorageError;
use crate::models::PageviewRecord;
use crate::storage::PageviewStore;
use crate::utils::{ensure_parent_dir, is_stored_date};
use itertools::Itertools;
use std::io::{ErrorKind, SeekFrom};
use std::mem::take;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

/// Column order of every row.
pub const HEADER: [&str; 4] = ["rank", "article", "views", "date"];

/// Bytes read per step while scanning backwards for the last line.
const TAIL_CHUNK: u64 = 4096;

#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn io_err(&self, e: std::io::Error) -> StorageError {
        StorageError::io(self.display_path(), e)
    }

    fn corrupt(&self, reason: impl Into<String>) -> StorageError {
        StorageError::Corrupt {
            path: self.display_path(),
            reason: reason.into(),
        }
    }

    fn parse_record(&self, fields: Vec<String>) -> Result<PageviewRecord, StorageError> {
        let [rank, article, views, date]: [String; 4] = fields
            .try_into()
            .map_err(|f: Vec<String>| self.corrupt(format!("expected 4 fields, found {}", f.len())))?;

        Ok(PageviewRecord {
            rank: rank
                .parse()
                .map_err(|_| self.corrupt(format!("bad rank {rank:?}")))?,
            views: views
                .parse()
                .map_err(|_| self.corrupt(format!("bad views {views:?}")))?,
            article,
            date,
        })
    }
}

impl PageviewStore for CsvStore {
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    async fn last_recorded_date(&self) -> Result<Option<String>, StorageError> {
        let Some(line) = read_last_line(&self.path).await.map_err(|e| self.io_err(e))? else {
            debug!("No rows yet");
            return Ok(None);
        };

        let fields = parse_line(&line);
        if fields.iter().map(String::as_str).eq(HEADER) {
            debug!("Only the header is present");
            return Ok(None);
        }

        let date = fields.last().map(|d| d.trim()).unwrap_or_default();
        if !is_stored_date(date) {
            return Err(self.corrupt(format!("last row has no valid date: {line:?}")));
        }
        debug!(date, "Read last recorded date");
        Ok(Some(date.to_string()))
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = records.len()))]
    async fn append(&self, records: &[PageviewRecord]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        ensure_parent_dir(&self.path).await.map_err(|e| self.io_err(e))?;

        let needs_header = match fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => return Err(self.io_err(e)),
        };

        let mut out = String::new();
        if needs_header {
            out.push_str(&format_row(HEADER));
        }
        for r in records {
            out.push_str(&format_row([
                r.rank.to_string(),
                r.article.clone(),
                r.views.to_string(),
                r.date.clone(),
            ]));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        let original_len = file.metadata().await.map_err(|e| self.io_err(e))?.len();

        if let Err(e) = write_synced(&mut file, out.as_bytes()).await {
            warn!(error = %e, original_len, "Append failed; cutting the file back");
            if let Err(restore) = file.set_len(original_len).await {
                warn!(error = %restore, "Could not cut the file back");
            }
            return Err(self.io_err(e));
        }

        info!(bytes = out.len(), header = needs_header, "Appended rows");
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display(), date = %date))]
    async fn records_for_date(&self, date: &str) -> Result<Vec<PageviewRecord>, StorageError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };

        let mut records = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let fields = parse_line(line);
            if fields.iter().map(String::as_str).eq(HEADER) {
                continue;
            }
            if fields.last().map(|d| d.trim()) != Some(date) {
                continue;
            }
            records.push(self.parse_record(fields)?);
        }
        records.sort_by_key(|r| r.rank);
        Ok(records)
    }
}

async fn write_synced(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Read the final non-empty line of `path` without loading the whole file.
///
/// Returns `None` for a missing or blank file.
pub async fn read_last_line(path: &Path) -> std::io::Result<Option<String>> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut pos = file.metadata().await?.len();
    let mut tail: Vec<u8> = Vec::new();

    while pos > 0 {
        let start = pos.saturating_sub(TAIL_CHUNK);
        let mut chunk = vec![0u8; (pos - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut chunk).await?;
        chunk.extend_from_slice(&tail);
        tail = chunk;
        pos = start;

        if let Some(end) = last_content_byte(&tail) {
            if let Some(newline) = tail[..end].iter().rposition(|&b| b == b'\n') {
                return Ok(Some(String::from_utf8_lossy(&tail[newline + 1..=end]).into_owned()));
            }
        }
    }

    // Reached the start of the file: the whole remainder is one line.
    Ok(last_content_byte(&tail).map(|end| String::from_utf8_lossy(&tail[..=end]).into_owned()))
}

fn last_content_byte(buf: &[u8]) -> Option<usize> {
    buf.iter().rposition(|b| !matches!(b, b'\n' | b'\r'))
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn quote(field: &str) -> String {
    if needs_quotes(field) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One CSV row, newline-terminated.
fn format_row<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut row = fields.into_iter().map(|f| quote(f.as_ref())).join(",");
    row.push('\n');
    row
}

/// Split one CSV line into fields, honouring double-quoted fields.
fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}
