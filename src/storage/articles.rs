use async_trait::async_trait;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, ArticleDbRow, DatabaseError};
use super::{ArticleStore, KnownIds};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Default page size for team listings
const DEFAULT_TEAM_LIMIT: i64 = 50;

/// Maximum number of articles to return from any single query (OOM protection)
const MAX_ARTICLES: i64 = 2000;

/// 14 bound columns * 50 rows = 700, under SQLite's 999 parameter limit
const INSERT_BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Sync Operations
    // ========================================================================

    /// All external ids currently stored.
    pub async fn known_external_ids(&self) -> Result<KnownIds, DatabaseError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT external_id FROM articles")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Insert a batch of new articles in one transaction.
    ///
    /// All-or-nothing: a duplicate `external_id` (or any other failure)
    /// rolls back the whole batch. Returns the number of rows inserted.
    pub async fn insert_articles(&self, articles: &[Article]) -> Result<usize, DatabaseError> {
        if articles.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted: u64 = 0;

        for chunk in articles.chunks(INSERT_BATCH_SIZE) {
            let rows = chunk
                .iter()
                .map(|article| {
                    serde_json::to_string(&article.types)
                        .map(|types| (article, types))
                        .map_err(|e| DatabaseError::CorruptRow {
                            id: article.id.clone(),
                            reason: format!("types not serializable: {}", e),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO articles (id, team_id, external_id, opta_match_id, title, types, \
                 teaser, content, url, image_url, gallery_urls, video_url, published, fetched_at) ",
            );

            builder.push_values(rows, |mut b, (article, types)| {
                b.push_bind(article.id.clone())
                    .push_bind(article.team_id.clone())
                    .push_bind(article.external_id)
                    .push_bind(article.opta_match_id.clone())
                    .push_bind(article.title.clone())
                    .push_bind(types)
                    .push_bind(article.teaser.clone())
                    .push_bind(article.content.clone())
                    .push_bind(article.url.clone())
                    .push_bind(article.image_url.clone())
                    .push_bind(article.gallery_urls.clone())
                    .push_bind(article.video_url.clone())
                    .push_bind(article.published.timestamp())
                    .push_bind(now);
            });

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted as usize)
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Newest articles for a team, `limit` defaults to 50 and is capped at MAX_ARTICLES.
    pub async fn articles_for_team(
        &self,
        team_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Article>, DatabaseError> {
        let limit = limit.unwrap_or(DEFAULT_TEAM_LIMIT).clamp(1, MAX_ARTICLES);

        let rows = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            SELECT id, team_id, external_id, opta_match_id, title, types, teaser, content,
                   url, image_url, gallery_urls, video_url, published
            FROM articles
            WHERE team_id = ?
            ORDER BY published DESC
            LIMIT ?
        "#,
        )
        .bind(team_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ArticleDbRow::into_article).collect()
    }

    /// A single article by its generated id, scoped to a team.
    pub async fn article_by_id(
        &self,
        team_id: &str,
        id: &str,
    ) -> Result<Option<Article>, DatabaseError> {
        let row = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            SELECT id, team_id, external_id, opta_match_id, title, types, teaser, content,
                   url, image_url, gallery_urls, video_url, published
            FROM articles
            WHERE team_id = ? AND id = ?
        "#,
        )
        .bind(team_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ArticleDbRow::into_article).transpose()
    }

    /// Whether any article is filed under `team_id`.
    pub async fn team_exists(&self, team_id: &str) -> Result<bool, DatabaseError> {
        let row: (i64,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM articles WHERE team_id = ?)")
                .bind(team_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 != 0)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Delete every article, returns count of rows removed.
    pub async fn delete_all(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM articles")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ArticleStore for Database {
    async fn known_external_ids(&self) -> Result<KnownIds, DatabaseError> {
        Database::known_external_ids(self).await
    }

    async fn insert_articles(&self, articles: &[Article]) -> Result<usize, DatabaseError> {
        Database::insert_articles(self, articles).await
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Article, Database, DatabaseError, DEFAULT_TEAM_ID};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_article(external_id: i64, published_secs: i64) -> Article {
        Article {
            id: format!("uuid-{}", external_id),
            team_id: DEFAULT_TEAM_ID.to_string(),
            external_id,
            opta_match_id: None,
            title: format!("Article {}", external_id),
            types: vec!["First Team".to_string()],
            teaser: "Teaser".to_string(),
            content: "<p>Body</p>".to_string(),
            url: format!("https://example.com/news/{}", external_id),
            image_url: "https://example.com/thumb.jpg".to_string(),
            gallery_urls: Some("https://example.com/g.jpg".to_string()),
            video_url: None,
            published: Utc.timestamp_opt(published_secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_known_ids() {
        let db = test_db().await;
        assert!(db.known_external_ids().await.unwrap().is_empty());

        let count = db
            .insert_articles(&[test_article(1, 1704067200), test_article(2, 1704067300)])
            .await
            .unwrap();
        assert_eq!(count, 2);

        let known = db.known_external_ids().await.unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains(&1));
        assert!(known.contains(&2));
    }

    #[tokio::test]
    async fn test_insert_empty_is_noop() {
        let db = test_db().await;
        assert_eq!(db.insert_articles(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_more_than_one_batch() {
        let db = test_db().await;
        let articles: Vec<Article> = (0..120).map(|i| test_article(i, 1704067200 + i)).collect();
        assert_eq!(db.insert_articles(&articles).await.unwrap(), 120);
        assert_eq!(db.known_external_ids().await.unwrap().len(), 120);
    }

    #[tokio::test]
    async fn test_duplicate_external_id_rolls_back_batch() {
        let db = test_db().await;
        db.insert_articles(&[test_article(1, 1704067200)])
            .await
            .unwrap();

        let mut dup = test_article(1, 1704067200);
        dup.id = "another-uuid".to_string();
        let result = db.insert_articles(&[test_article(2, 1704067200), dup]).await;
        assert!(matches!(result, Err(DatabaseError::Other(_))));

        // Nothing from the failed batch was persisted
        let known = db.known_external_ids().await.unwrap();
        assert_eq!(known.len(), 1);
        assert!(!known.contains(&2));
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let db = test_db().await;
        let mut article = test_article(42, 1704103200);
        article.opta_match_id = Some("g2367712".to_string());
        article.types = vec!["First Team".to_string(), "Match Report".to_string()];
        db.insert_articles(std::slice::from_ref(&article))
            .await
            .unwrap();

        let stored = db
            .article_by_id(DEFAULT_TEAM_ID, &article.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, article);
    }

    #[tokio::test]
    async fn test_articles_for_team_newest_first() {
        let db = test_db().await;
        db.insert_articles(&[
            test_article(1, 1704067200),
            test_article(2, 1704153600),
            test_article(3, 1704110400),
        ])
        .await
        .unwrap();

        let articles = db.articles_for_team(DEFAULT_TEAM_ID, None).await.unwrap();
        let ids: Vec<i64> = articles.iter().map(|a| a.external_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let limited = db.articles_for_team(DEFAULT_TEAM_ID, Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].external_id, 2);

        assert!(db.articles_for_team("t1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_article_by_id_scoped_to_team() {
        let db = test_db().await;
        let article = test_article(5, 1704067200);
        db.insert_articles(std::slice::from_ref(&article))
            .await
            .unwrap();

        assert!(db.article_by_id("t1", &article.id).await.unwrap().is_none());
        assert!(db
            .article_by_id(DEFAULT_TEAM_ID, "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_team_exists_and_delete_all() {
        let db = test_db().await;
        assert!(!db.team_exists(DEFAULT_TEAM_ID).await.unwrap());

        db.insert_articles(&[test_article(1, 1704067200), test_article(2, 1704067200)])
            .await
            .unwrap();
        assert!(db.team_exists(DEFAULT_TEAM_ID).await.unwrap());

        assert_eq!(db.delete_all().await.unwrap(), 2);
        assert!(!db.team_exists(DEFAULT_TEAM_ID).await.unwrap());
        assert!(db.known_external_ids().await.unwrap().is_empty());
    }
}
