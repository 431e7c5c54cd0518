//! SQLite backend.
//!
//! Titles are normalized into `article`; each day's ranking lives in
//! `pageview`, keyed by `(date, article_id)`. One call to `append` is one
//! transaction, so a date is either fully recorded or absent.

use crate::error::StorageError;
use crate::models::{Article, PageviewRecord};
use crate::storage::PageviewStore;
use crate::utils::ensure_parent_dir;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS article (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pageview (
        date TEXT,
        article_id INTEGER,
        views INTEGER,
        rank INTEGER,
        FOREIGN KEY (article_id) REFERENCES article (id),
        PRIMARY KEY (date, article_id),
        UNIQUE (date, article_id, rank)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pageview_date ON pageview (date)",
    "CREATE INDEX IF NOT EXISTS idx_pageview_article_id ON pageview (article_id)",
];

#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema exists.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        ensure_parent_dir(path)
            .await
            .map_err(|e| StorageError::io(path.display().to_string(), e))?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        // Single writer per run; one connection keeps every statement on
        // the same handle.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("SQLite store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
        debug!("SQLite pool closed");
    }

    async fn write_all(tx: &mut Transaction<'_, Sqlite>, records: &[PageviewRecord]) -> Result<(), sqlx::Error> {
        for r in records {
            let id = article_id(&mut **tx, &r.article).await?;
            sqlx::query(
                "INSERT OR REPLACE INTO pageview (date, article_id, views, rank) VALUES (?, ?, ?, ?)",
            )
            .bind(&r.date)
            .bind(id)
            .bind(i64::try_from(r.views).unwrap_or(i64::MAX))
            .bind(i64::from(r.rank))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

/// Look up an article by title, inserting it when first seen.
async fn article_id(conn: &mut SqliteConnection, title: &str) -> Result<i64, sqlx::Error> {
    let existing = sqlx::query_as::<_, Article>("SELECT id, title FROM article WHERE title = ?")
        .bind(title)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(article) = existing {
        debug!(title = %article.title, id = article.id, "Known article");
        return Ok(article.id);
    }

    let inserted = sqlx::query("INSERT INTO article (title) VALUES (?)")
        .bind(title)
        .execute(&mut *conn)
        .await?;
    debug!(title, id = inserted.last_insert_rowid(), "New article");
    Ok(inserted.last_insert_rowid())
}

impl PageviewStore for SqliteStore {
    #[instrument(level = "info", skip_all)]
    async fn last_recorded_date(&self) -> Result<Option<String>, StorageError> {
        let date: Option<String> = sqlx::query_scalar("SELECT MAX(date) FROM pageview")
            .fetch_one(&self.pool)
            .await?;
        debug!(?date, "Read last recorded date");
        Ok(date)
    }

    #[instrument(level = "info", skip_all, fields(count = records.len()))]
    async fn append(&self, records: &[PageviewRecord]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        match Self::write_all(&mut tx, records).await {
            Ok(()) => {
                tx.commit().await?;
                info!("Committed pageviews");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Write failed; rolling back");
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e.into())
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(date = %date))]
    async fn records_for_date(&self, date: &str) -> Result<Vec<PageviewRecord>, StorageError> {
        let rows: Vec<(i64, String, i64, String)> = sqlx::query_as(
            r#"
            SELECT p.rank, a.title, p.views, p.date
            FROM pageview p
            JOIN article a ON a.id = p.article_id
            WHERE p.date = ?
            ORDER BY p.rank
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(rank, article, views, date)| PageviewRecord {
                rank: u32::try_from(rank).unwrap_or_default(),
                article,
                views: u64::try_from(views).unwrap_or_default(),
                date,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(rank: u32, article: &str, views: u64, date: &str) -> PageviewRecord {
        PageviewRecord {
            rank,
            article: article.to_string(),
            views,
            date: date.to_string(),
        }
    }

    async fn open_temp(dir: &TempDir) -> SqliteStore {
        SqliteStore::open(&dir.path().join("db").join("wikipedia.db"))
            .await
            .unwrap()
    }

    async fn article_count(store: &SqliteStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM article")
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir).await;
        store.close().await;
        let store = open_temp(&dir).await;
        assert_eq!(store.last_recorded_date().await.unwrap(), None);
        store.close().await;
    }

    #[tokio::test]
    async fn test_articles_are_reused_across_dates() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir).await;

        store
            .append(&[record(1, "Cat", 500, "2024/01/09"), record(2, "Dog", 300, "2024/01/09")])
            .await
            .unwrap();
        store
            .append(&[record(1, "Dog", 800, "2024/01/10"), record(2, "Eel", 10, "2024/01/10")])
            .await
            .unwrap();

        assert_eq!(article_count(&store).await, 3);
        assert_eq!(
            store.last_recorded_date().await.unwrap().as_deref(),
            Some("2024/01/10")
        );
        assert_eq!(
            store.records_for_date("2024/01/10").await.unwrap(),
            vec![record(1, "Dog", 800, "2024/01/10"), record(2, "Eel", 10, "2024/01/10")]
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_same_key_is_replaced() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir).await;

        store.append(&[record(1, "Cat", 500, "2024/01/10")]).await.unwrap();
        store.append(&[record(1, "Cat", 650, "2024/01/10")]).await.unwrap();

        assert_eq!(
            store.records_for_date("2024/01/10").await.unwrap(),
            vec![record(1, "Cat", 650, "2024/01/10")]
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_whole_date() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir).await;

        sqlx::query(
            r#"
            CREATE TRIGGER reject_poison BEFORE INSERT ON pageview
            WHEN NEW.views = 666
            BEGIN
                SELECT RAISE(ABORT, 'poisoned row');
            END
            "#,
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let result = store
            .append(&[
                record(1, "Cat", 500, "2024/01/10"),
                record(2, "Dog", 666, "2024/01/10"),
                record(3, "Eel", 10, "2024/01/10"),
            ])
            .await;

        assert!(matches!(result, Err(StorageError::Database(_))));
        assert_eq!(store.last_recorded_date().await.unwrap(), None);
        assert!(store.records_for_date("2024/01/10").await.unwrap().is_empty());
        assert_eq!(article_count(&store).await, 0);
        store.close().await;
    }

    #[tokio::test]
    async fn test_schema_has_indexes() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir).await;

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'pageview' ORDER BY name",
        )
        .fetch_all(&store.pool)
        .await
        .unwrap();

        assert!(names.contains(&"idx_pageview_date".to_string()));
        assert!(names.contains(&"idx_pageview_article_id".to_string()));
        store.close().await;
    }
}
