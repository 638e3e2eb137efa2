use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Team every article from the club feed is filed under.
pub const DEFAULT_TEAM_ID: &str = "t94";

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("Database is locked by another process. Please close it and try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored row could not be turned back into an [`Article`]
    #[error("Corrupt article row {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// Internal row type for Article queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: String,
    pub team_id: String,
    pub external_id: i64,
    pub opta_match_id: Option<String>,
    pub title: String,
    /// JSON array of taxonomy tags
    pub types: String,
    pub teaser: String,
    pub content: String,
    pub url: String,
    pub image_url: String,
    pub gallery_urls: Option<String>,
    pub video_url: Option<String>,
    /// Unix seconds
    pub published: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Result<Article, DatabaseError> {
        let types: Vec<String> =
            serde_json::from_str(&self.types).map_err(|e| DatabaseError::CorruptRow {
                id: self.id.clone(),
                reason: format!("types column is not a JSON array: {}", e),
            })?;
        let published =
            DateTime::from_timestamp(self.published, 0).ok_or_else(|| DatabaseError::CorruptRow {
                id: self.id.clone(),
                reason: format!("published timestamp {} out of range", self.published),
            })?;

        Ok(Article {
            id: self.id,
            team_id: self.team_id,
            external_id: self.external_id,
            opta_match_id: self.opta_match_id,
            title: self.title,
            types,
            teaser: self.teaser,
            content: self.content,
            url: self.url,
            image_url: self.image_url,
            gallery_urls: self.gallery_urls,
            video_url: self.video_url,
            published,
        })
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A fully assembled news article as persisted in the store.
///
/// `external_id` is the upstream feed's identifier and is unique across
/// the store; `id` is a UUID generated at ingestion time. The external id
/// is not part of the JSON shape handed to readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub team_id: String,
    #[serde(skip)]
    pub external_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opta_match_id: Option<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub teaser: String,
    pub content: String,
    pub url: String,
    pub image_url: String,
    pub gallery_urls: Option<String>,
    pub video_url: Option<String>,
    pub published: DateTime<Utc>,
}
