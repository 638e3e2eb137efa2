use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;
use uuid::Uuid;

use crate::feed::model::non_empty;
use crate::feed::{FeedClient, NewsArticle, NewsItem};
use crate::storage::{Article, DEFAULT_TEAM_ID};

/// Layout of `PublishDate` in the list feed, interpreted as UTC.
pub const PUBLISH_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What the fan-out produced for one run.
#[derive(Debug, Default)]
pub struct EnrichOutcome {
    /// Assembled articles, in completion order
    pub articles: Vec<Article>,
    /// Summaries dropped for a bad date, a failed detail fetch, or the deadline
    pub dropped: usize,
    /// True when the deadline cut the fan-out short
    pub timed_out: bool,
}

pub fn parse_publish_date(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), PUBLISH_DATE_FORMAT).map(|dt| dt.and_utc())
}

/// Merge a summary with its detail document into a new [`Article`].
pub fn assemble(summary: NewsItem, detail: NewsArticle, published: DateTime<Utc>) -> Article {
    Article {
        id: Uuid::new_v4().to_string(),
        team_id: DEFAULT_TEAM_ID.to_string(),
        external_id: summary.id,
        opta_match_id: non_empty(summary.opta_match_id),
        title: summary.title,
        types: vec![summary.taxonomies],
        teaser: summary.teaser_text,
        content: detail.body_text,
        url: summary.article_url,
        image_url: summary.thumbnail_image_url,
        gallery_urls: non_empty(detail.gallery_image_urls),
        video_url: non_empty(detail.video_url),
        published,
    }
}

/// Enrich every new summary concurrently, at most `max_in_flight` at a time.
///
/// A failed item is logged and dropped without touching the others. The
/// wait for completion is bounded by `deadline`: whatever finished by then
/// is returned and the rest is cancelled.
pub async fn enrich_all(
    feed: &FeedClient,
    items: HashMap<i64, NewsItem>,
    max_in_flight: usize,
    deadline: Instant,
) -> EnrichOutcome {
    let total = items.len();
    if total == 0 {
        return EnrichOutcome::default();
    }

    let collected = Mutex::new(Vec::with_capacity(total));
    let collected_ref = &collected;

    let tasks = stream::iter(items.into_values()).for_each_concurrent(
        max_in_flight.max(1),
        move |item| async move {
            if let Some(article) = enrich_one(feed, item, deadline).await {
                collected_ref
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(article);
            }
        },
    );

    let timed_out = tokio::time::timeout_at(deadline, tasks).await.is_err();

    let articles = collected
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);

    if timed_out {
        tracing::warn!(
            completed = articles.len(),
            abandoned = total - articles.len(),
            "Run deadline reached during enrichment, abandoning unfinished articles"
        );
    }

    EnrichOutcome {
        dropped: total - articles.len(),
        articles,
        timed_out,
    }
}

async fn enrich_one(feed: &FeedClient, item: NewsItem, deadline: Instant) -> Option<Article> {
    let published = match parse_publish_date(&item.publish_date) {
        Ok(published) => published,
        Err(e) => {
            tracing::warn!(
                external_id = item.id,
                publish_date = %item.publish_date,
                error = %e,
                "Failed to parse publish date, dropping article"
            );
            return None;
        }
    };

    match feed.fetch_detail(item.id, deadline).await {
        Ok(detail) => Some(assemble(item, detail, published)),
        Err(e) => {
            tracing::warn!(
                external_id = item.id,
                url = %feed.detail_url(item.id),
                error = %e,
                "Failed to fetch article detail, dropping article"
            );
            None
        }
    }
}
