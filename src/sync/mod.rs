//! One synchronization run: known ids, list fetch, reconcile, enrich, persist.
//!
//! A run is bounded by a single deadline. Loading known ids is wrapped in
//! `timeout_at` and network calls cap their own timeouts at it. The
//! enrichment barrier stops `persist_reserve` earlier so the insert has
//! time left. An insert that has started is never cancelled.

pub mod enrich;
pub mod reconcile;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::feed::{FeedClient, TransportError};
use crate::storage::{ArticleStore, DatabaseError};

pub use enrich::{EnrichOutcome, PUBLISH_DATE_FORMAT};
pub use reconcile::new_summaries;

/// Tunables for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Page size requested from the list feed
    pub count: u32,
    /// Hard deadline for the whole run
    pub run_timeout: Duration,
    /// Upper bound on concurrent detail fetches
    pub max_in_flight: usize,
    /// Slice of `run_timeout` kept free of enrichment for the insert
    pub persist_reserve: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            count: 50,
            run_timeout: Duration::from_secs(30),
            max_in_flight: 16,
            persist_reserve: Duration::from_secs(5),
        }
    }
}

/// Step of a run that touches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadKnownIds,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::LoadKnownIds => f.write_str("loading known ids"),
            Stage::Persist => f.write_str("persisting articles"),
        }
    }
}

/// Reasons a run aborts. Nothing is persisted when a run aborts: the
/// deadline is only checked before the insert starts, never during it.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to load known external ids: {0}")]
    LoadKnownIds(#[source] DatabaseError),
    #[error("Failed to fetch news list: {0}")]
    FetchList(#[source] TransportError),
    #[error("Failed to insert articles: {0}")]
    Persist(#[source] DatabaseError),
    #[error("Run deadline exceeded while {stage}")]
    DeadlineExceeded { stage: Stage },
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Summaries returned by the list feed
    pub listed: usize,
    /// Distinct summaries not yet in the store
    pub discovered: usize,
    /// Summaries dropped during enrichment
    pub dropped: usize,
    /// Articles written to the store
    pub inserted: usize,
    /// Enrichment hit its deadline and abandoned unfinished items
    pub enrichment_timed_out: bool,
    pub elapsed: Duration,
}

/// Runs the ingestion pipeline against a store.
pub struct Synchronizer<S> {
    store: Arc<S>,
    feed: FeedClient,
    settings: SyncSettings,
}

impl<S: ArticleStore> Synchronizer<S> {
    pub fn new(store: Arc<S>, feed: FeedClient, settings: SyncSettings) -> Self {
        Self {
            store,
            feed,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Execute one run.
    ///
    /// Per-item failures (bad publish date, failed detail fetch) only shrink
    /// the batch. Failing to load known ids, fetch the list, or insert the
    /// batch aborts the run with nothing persisted.
    pub async fn run(&self) -> Result<RunReport, SyncError> {
        let started = Instant::now();
        let deadline = started + self.settings.run_timeout;

        let known = tokio::time::timeout_at(deadline, self.store.known_external_ids())
            .await
            .map_err(|_| SyncError::DeadlineExceeded {
                stage: Stage::LoadKnownIds,
            })?
            .map_err(SyncError::LoadKnownIds)?;

        let items = self
            .feed
            .fetch_list(self.settings.count, deadline)
            .await
            .map_err(SyncError::FetchList)?;
        let listed = items.len();

        let fresh = reconcile::new_summaries(&known, items);
        let discovered = fresh.len();
        tracing::debug!(
            listed = listed,
            known = known.len(),
            new = discovered,
            "Reconciled feed against store"
        );

        if fresh.is_empty() {
            let report = RunReport {
                listed,
                discovered: 0,
                dropped: 0,
                inserted: 0,
                enrichment_timed_out: false,
                elapsed: started.elapsed(),
            };
            tracing::info!(added = 0, listed = listed, "Sync run complete, nothing new");
            return Ok(report);
        }

        let enrich_deadline = deadline
            .checked_sub(self.settings.persist_reserve)
            .map_or(started, |at| at.max(started));
        let outcome = enrich::enrich_all(
            &self.feed,
            fresh,
            self.settings.max_in_flight,
            enrich_deadline,
        )
        .await;

        let inserted = if outcome.articles.is_empty() {
            0
        } else {
            if Instant::now() >= deadline {
                return Err(SyncError::DeadlineExceeded {
                    stage: Stage::Persist,
                });
            }
            // Runs to completion even past the deadline: dropping it could
            // leave a committed batch reported as failed.
            self.store
                .insert_articles(&outcome.articles)
                .await
                .map_err(SyncError::Persist)?
        };

        let report = RunReport {
            listed,
            discovered,
            dropped: outcome.dropped,
            inserted,
            enrichment_timed_out: outcome.timed_out,
            elapsed: started.elapsed(),
        };
        if report.enrichment_timed_out {
            tracing::warn!(
                dropped = report.dropped,
                reserve_ms = self.settings.persist_reserve.as_millis() as u64,
                "Enrichment cut short by the run deadline"
            );
        }
        tracing::info!(
            added = report.inserted,
            dropped = report.dropped,
            listed = report.listed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Sync run complete"
        );
        Ok(report)
    }
}
