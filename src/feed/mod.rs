//! Client for the club news XML feed.
//!
//! - [`transport`] - GET with bounded retries, status classification and XML decoding
//! - [`model`] - serde wire types for the list and detail documents
//! - [`FeedClient`] - the two endpoints (`getnewlistinformation`, `getnewsarticleinformation`)
//!
//! # Example
//!
//! ```ignore
//! let feed = FeedClient::new("https://www.htafc.com/api/incrowd")?;
//! let items = feed.fetch_list(50, deadline).await?;
//! let detail = feed.fetch_detail(items[0].id, deadline).await?;
//! ```

mod client;
pub mod model;
pub mod transport;

pub use client::{FeedClient, LIST_RETRIES};
pub use model::{NewsArticle, NewsItem};
pub use transport::{AttemptError, RetryPolicy, TransportError};
