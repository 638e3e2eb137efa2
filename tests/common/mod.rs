//! Shared fixtures: a wiremock club feed and an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use sport_news::feed::FeedClient;
use sport_news::storage::Database;
use sport_news::sync::{SyncSettings, Synchronizer};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub async fn test_db() -> Arc<Database> {
    Arc::new(Database::open(":memory:").await.unwrap())
}

pub fn synchronizer(db: Arc<Database>, server: &MockServer) -> Synchronizer<Database> {
    let feed = FeedClient::with_client(reqwest::Client::new(), server.uri())
        .with_backoff(Duration::from_millis(10));
    Synchronizer::new(db, feed, SyncSettings::default())
}

pub fn list_xml(ids: &[i64]) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                "<NewsletterNewsItem>\
                 <ArticleURL>https://www.htafc.com/news/{id}</ArticleURL>\
                 <NewsArticleID>{id}</NewsArticleID>\
                 <PublishDate>2024-01-01 10:00:00</PublishDate>\
                 <Taxonomies>First Team</Taxonomies>\
                 <TeaserText>Teaser {id}</TeaserText>\
                 <ThumbnailImageURL>https://cdn.example.com/{id}.jpg</ThumbnailImageURL>\
                 <Title>Headline {id}</Title>\
                 <OptaMatchId></OptaMatchId>\
                 <LastUpdateDate>2024-01-01 10:05:00</LastUpdateDate>\
                 <IsPublished>True</IsPublished>\
                 </NewsletterNewsItem>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <NewListInformation><ClubName>Huddersfield Town</ClubName>\
         <ClubWebsiteURL>https://www.htafc.com</ClubWebsiteURL>\
         <NewsletterNewsItems>{items}</NewsletterNewsItems></NewListInformation>"
    )
}

pub fn detail_xml(id: i64) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <NewsArticleInformation><ClubName>Huddersfield Town</ClubName>\
         <NewsArticle>\
         <NewsArticleID>{id}</NewsArticleID>\
         <Subtitle>Sub {id}</Subtitle>\
         <BodyText>&lt;p&gt;Body {id}&lt;/p&gt;</BodyText>\
         <GalleryImageURLs></GalleryImageURLs>\
         <VideoURL></VideoURL>\
         </NewsArticle></NewsArticleInformation>"
    )
}

pub async fn mount_list(server: &MockServer, ids: &[i64]) {
    Mock::given(method("GET"))
        .and(path("/getnewlistinformation"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_xml(ids)))
        .mount(server)
        .await;
}

/// Serve the detail document for `id`, asserting it is requested `times` times.
pub async fn mount_detail(server: &MockServer, id: i64, times: u64) {
    Mock::given(method("GET"))
        .and(path("/getnewsarticleinformation"))
        .and(query_param("id", id.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_xml(id)))
        .expect(times)
        .mount(server)
        .await;
}

pub async fn mount_failing_detail(server: &MockServer, id: i64) {
    Mock::given(method("GET"))
        .and(path("/getnewsarticleinformation"))
        .and(query_param("id", id.to_string()))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream error"))
        .expect(1) // detail fetches are never retried
        .mount(server)
        .await;
}
