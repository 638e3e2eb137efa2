//! Article persistence.
//!
//! The synchronizer only depends on [`ArticleStore`]; [`Database`] is the
//! SQLite implementation shipped with the binary and also provides the
//! read-side queries used by the CLI.

mod articles;
mod schema;
mod types;

use async_trait::async_trait;
use std::collections::HashSet;

pub use schema::Database;
pub use types::{Article, DatabaseError, DEFAULT_TEAM_ID};

/// External ids already present in the store.
pub type KnownIds = HashSet<i64>;

/// The two operations the synchronizer needs from a store.
///
/// `external_id` must be unique across the store for reconciliation to
/// stay correct; implementations should reject a batch that breaks it.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Snapshot of every stored external id.
    async fn known_external_ids(&self) -> Result<KnownIds, DatabaseError>;

    /// Persist a batch atomically, returning the number of rows written.
    async fn insert_articles(&self, articles: &[Article]) -> Result<usize, DatabaseError>;
}
