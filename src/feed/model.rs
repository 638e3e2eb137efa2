//! Wire types for the club news XML feed.
//!
//! Both documents are decoded with `quick-xml`'s serde support. Element
//! names follow the upstream PascalCase naming; fields we never read
//! (club name, website) are still declared so a decoded document can be
//! logged in full when something looks off.

use serde::{Deserialize, Deserializer};

/// Response of `getnewlistinformation`: a page of article summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename = "NewListInformation")]
pub struct NewsList {
    #[serde(rename = "ClubName", default)]
    pub club_name: String,
    #[serde(rename = "ClubWebsiteURL", default)]
    pub club_website_url: String,
    #[serde(rename = "NewsletterNewsItems", default)]
    pub items: NewsItems,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsItems {
    #[serde(rename = "NewsletterNewsItem", default)]
    pub entries: Vec<NewsItem>,
}

/// One article summary from the list feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewsItem {
    #[serde(rename = "ArticleURL", default)]
    pub article_url: String,
    /// Zero when the element is missing or not a number.
    #[serde(rename = "NewsArticleID", default, deserialize_with = "lenient_id")]
    pub id: i64,
    /// Raw `YYYY-MM-DD HH:MM:SS` string, parsed during enrichment.
    #[serde(rename = "PublishDate", default)]
    pub publish_date: String,
    #[serde(rename = "Taxonomies", default)]
    pub taxonomies: String,
    #[serde(rename = "TeaserText", default)]
    pub teaser_text: String,
    #[serde(rename = "ThumbnailImageURL", default)]
    pub thumbnail_image_url: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "OptaMatchId", default)]
    pub opta_match_id: Option<String>,
    #[serde(rename = "LastUpdateDate", default)]
    pub last_update_date: String,
    #[serde(rename = "IsPublished", default)]
    pub is_published: String,
}

/// Response of `getnewsarticleinformation`: one full article.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "NewsArticleInformation")]
pub struct NewsArticleInformation {
    #[serde(rename = "ClubName", default)]
    pub club_name: String,
    #[serde(rename = "ClubWebsiteURL", default)]
    pub club_website_url: String,
    #[serde(rename = "NewsArticle")]
    pub article: NewsArticle,
}

/// Full article body from the detail feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewsArticle {
    #[serde(rename = "ArticleURL", default)]
    pub article_url: String,
    #[serde(rename = "NewsArticleID", default)]
    pub id: i64,
    #[serde(rename = "PublishDate", default)]
    pub publish_date: String,
    #[serde(rename = "Taxonomies", default)]
    pub taxonomies: String,
    #[serde(rename = "TeaserText", default)]
    pub teaser_text: String,
    #[serde(rename = "Subtitle", default)]
    pub subtitle: String,
    #[serde(rename = "ThumbnailImageURL", default)]
    pub thumbnail_image_url: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "BodyText", default)]
    pub body_text: String,
    #[serde(rename = "GalleryImageURLs", default)]
    pub gallery_image_urls: Option<String>,
    #[serde(rename = "VideoURL", default)]
    pub video_url: Option<String>,
    #[serde(rename = "OptaMatchId", default)]
    pub opta_match_id: Option<String>,
    #[serde(rename = "LastUpdateDate", default)]
    pub last_update_date: String,
    #[serde(rename = "IsPublished", default)]
    pub is_published: String,
}

/// Missing, empty or non-numeric ids decode to 0 so one bad entry does not
/// fail the whole page.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0))
}

impl NewsItem {
    /// Whether the entry carries an id the detail feed can be asked about.
    pub fn has_valid_id(&self) -> bool {
        self.id > 0
    }
}

/// Collapses empty or whitespace-only optional elements to `None`.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
