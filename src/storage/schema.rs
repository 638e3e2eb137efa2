use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database, used by tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Locked` if another process has the database
    /// locked (SQLITE_BUSY, SQLITE_LOCKED).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let in_memory = path == ":memory:";

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release before returning SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // Every in-memory connection is its own database, so tests get exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| match e {
            DatabaseError::Other(err) => match DatabaseError::from_sqlx(err) {
                DatabaseError::Locked => DatabaseError::Locked,
                other => DatabaseError::Migration(other.to_string()),
            },
            other => other,
        })?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        // external_id UNIQUE backs the dedup invariant the synchronizer relies on
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                external_id INTEGER NOT NULL UNIQUE,
                opta_match_id TEXT,
                title TEXT NOT NULL,
                types TEXT NOT NULL DEFAULT '[]',
                teaser TEXT NOT NULL,
                content TEXT NOT NULL,
                url TEXT NOT NULL,
                image_url TEXT NOT NULL,
                gallery_urls TEXT,
                video_url TEXT,
                published INTEGER NOT NULL,
                fetched_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Team listing filters by team_id and sorts by published DESC
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_team_published ON articles(team_id, published DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
