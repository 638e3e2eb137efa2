//! Fixed-interval trigger for synchronization runs.
//!
//! Each tick spawns an independent run. A run-level guard makes a tick
//! that lands while the previous run is still going a logged no-op, so
//! slow runs never overlap.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::storage::ArticleStore;
use crate::sync::{RunReport, SyncError, Synchronizer};

pub struct Scheduler<S> {
    sync: Arc<Synchronizer<S>>,
    interval: Duration,
    guard: Arc<Mutex<()>>,
}

impl<S> Clone for Scheduler<S> {
    fn clone(&self) -> Self {
        Self {
            sync: Arc::clone(&self.sync),
            interval: self.interval,
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<S: ArticleStore + 'static> Scheduler<S> {
    pub fn new(sync: Arc<Synchronizer<S>>, interval: Duration) -> Self {
        Self {
            sync,
            interval,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run immediately, unless a run is already in flight.
    ///
    /// Returns `None` when skipped by the overlap guard.
    pub async fn run_once(&self) -> Option<Result<RunReport, SyncError>> {
        let _running = match Arc::clone(&self.guard).try_lock_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::info!("Previous sync run still in progress, skipping trigger");
                return None;
            }
        };
        Some(self.sync.run().await)
    }

    /// Spawn the timer loop. The first tick fires one interval from now.
    pub fn start(self) -> SchedulerHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Registered sync job"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + self.interval,
                self.interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut runs = JoinSet::new();

            loop {
                tokio::select! {
                    // A queued trigger is honoured before a pending shutdown
                    biased;
                    _ = ticker.tick() => self.fire(&mut runs),
                    Some(()) = trigger_rx.recv() => {
                        tracing::debug!("On-demand sync triggered");
                        self.fire(&mut runs);
                    }
                    Some(joined) = runs.join_next(), if !runs.is_empty() => {
                        log_join_error(joined);
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            // Every spawned run, started or not, completes before shutdown returns
            if !runs.is_empty() {
                tracing::info!(pending = runs.len(), "Waiting for sync runs to finish");
            }
            while let Some(joined) = runs.join_next().await {
                log_join_error(joined);
            }
            tracing::info!("Sync scheduler stopped");
        });

        SchedulerHandle {
            trigger_tx,
            shutdown_tx,
            task,
        }
    }

    fn fire(&self, runs: &mut JoinSet<()>) {
        let scheduler = self.clone();
        runs.spawn(async move {
            match scheduler.run_once().await {
                None => {}
                Some(Ok(report)) => {
                    tracing::debug!(added = report.inserted, "Scheduled sync finished");
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Sync run failed");
                }
            }
        });
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::warn!(error = %e, "Sync run task ended abnormally");
    }
}

/// Control side of a started [`Scheduler`].
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Request an immediate run. Returns false if one is already queued.
    pub fn run_now(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Stop the timer and wait for every run it has spawned to complete.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Sync scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedClient;
    use crate::storage::Database;
    use crate::sync::SyncSettings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EMPTY_LIST: &str =
        "<NewListInformation><NewsletterNewsItems></NewsletterNewsItems></NewListInformation>";

    async fn scheduler_for(server: &MockServer, interval: Duration) -> Scheduler<Database> {
        let db = Database::open(":memory:").await.unwrap();
        let feed = FeedClient::with_client(reqwest::Client::new(), server.uri());
        let sync = Synchronizer::new(Arc::new(db), feed, SyncSettings::default());
        Scheduler::new(Arc::new(sync), interval)
    }

    #[tokio::test]
    async fn test_run_once_reports() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getnewlistinformation"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_LIST))
            .expect(1)
            .mount(&server)
            .await;

        let scheduler = scheduler_for(&server, Duration::from_secs(3600)).await;
        let report = scheduler.run_once().await.unwrap().unwrap();
        assert_eq!(report.inserted, 0);
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getnewlistinformation"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(EMPTY_LIST)
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let scheduler = scheduler_for(&server, Duration::from_secs(3600)).await;
        let second = scheduler.clone();

        let slow = tokio::spawn(async move { scheduler.run_once().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(second.run_once().await.is_none());

        let first = slow.await.unwrap();
        assert!(matches!(first, Some(Ok(_))));
    }

    #[tokio::test]
    async fn test_run_now_triggers_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getnewlistinformation"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_LIST))
            .expect(1)
            .mount(&server)
            .await;

        let scheduler = scheduler_for(&server, Duration::from_secs(3600)).await;
        let handle = scheduler.start();
        assert!(handle.run_now());

        // Give the spawned run time to hit the mock server
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_interval_fires_repeatedly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getnewlistinformation"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_LIST))
            .mount(&server)
            .await;

        let scheduler = scheduler_for(&server, Duration::from_millis(100)).await;
        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(450)).await;
        handle.shutdown().await;

        let requests = server.received_requests().await.unwrap();
        assert!(requests.len() >= 2, "expected at least 2 runs, got {}", requests.len());
    }

    #[tokio::test]
    async fn test_no_run_before_first_interval() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_LIST))
            .expect(0)
            .mount(&server)
            .await;

        let scheduler = scheduler_for(&server, Duration::from_secs(3600)).await;
        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_triggered_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getnewlistinformation"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(
                        "<NewListInformation><NewsletterNewsItems>\
                         <NewsletterNewsItem><NewsArticleID>5</NewsArticleID>\
                         <PublishDate>2024-01-01 10:00:00</PublishDate></NewsletterNewsItem>\
                         </NewsletterNewsItems></NewListInformation>",
                    )
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/getnewsarticleinformation"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<NewsArticleInformation><NewsArticle><BodyText>b</BodyText></NewsArticle></NewsArticleInformation>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let db = Arc::new(Database::open(":memory:").await.unwrap());
        let feed = FeedClient::with_client(reqwest::Client::new(), server.uri());
        let sync = Synchronizer::new(db.clone(), feed, SyncSettings::default());
        let handle = Scheduler::new(Arc::new(sync), Duration::from_secs(3600)).start();

        // Shut down before the spawned run has had a chance to take the guard
        assert!(handle.run_now());
        handle.shutdown().await;

        let known = db.known_external_ids().await.unwrap();
        assert!(known.contains(&5), "run triggered before shutdown must complete");
    }
}
