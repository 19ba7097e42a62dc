use linkvault_core::{Repository, ShortCode};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default number of deletes allowed in flight at once.
pub const DEFAULT_DELETE_CONCURRENCY: usize = 16;

/// The result of one attempted soft delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub code: ShortCode,
    /// `false` if the backend reported a failure for this code.
    pub deleted: bool,
}

/// Every outcome of a drained bulk delete, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteReport {
    pub outcomes: Vec<DeleteOutcome>,
}

impl BulkDeleteReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.deleted).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ShortCode> {
        self.outcomes
            .iter()
            .filter(|o| !o.deleted)
            .map(|o| &o.code)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.deleted)
    }
}

/// Fans a batch of soft deletes out over a repository.
///
/// Each distinct short code gets its own task. A shared semaphore bounds how
/// many of them talk to the backend at once. Outcomes are streamed back on a
/// channel that closes once every task has finished.
pub struct BulkDeleter<R> {
    repo: Arc<R>,
    permits: Arc<Semaphore>,
}

impl<R> Clone for BulkDeleter<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            permits: Arc::clone(&self.permits),
        }
    }
}

impl<R: Repository> BulkDeleter<R> {
    /// Creates a deleter allowing at most `concurrency` deletes in flight.
    ///
    /// A concurrency of zero is treated as one.
    pub fn new(repo: Arc<R>, concurrency: usize) -> Self {
        Self {
            repo,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Starts deleting `codes` in the background and returns the outcome stream.
    ///
    /// Must be called inside a tokio runtime. Repeated codes are attempted
    /// once. Dropping the receiver does not cancel the deletes.
    pub fn dispatch(&self, codes: Vec<ShortCode>) -> mpsc::UnboundedReceiver<DeleteOutcome> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut seen = HashSet::with_capacity(codes.len());
        let codes: Vec<ShortCode> = codes
            .into_iter()
            .filter(|code| seen.insert(code.clone()))
            .collect();
        debug!(count = codes.len(), "dispatching bulk delete");

        let repo = Arc::clone(&self.repo);
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let mut tasks = JoinSet::new();

            for code in codes {
                let repo = Arc::clone(&repo);
                let permits = Arc::clone(&permits);
                let tx = tx.clone();
                tasks.spawn(async move {
                    // The semaphore is never closed.
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    let deleted = repo.delete_by_short_code(&code).await;
                    if !deleted {
                        warn!(code = %code, "delete failed");
                    }
                    let _ = tx.send(DeleteOutcome { code, deleted });
                });
            }
            drop(tx);

            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    warn!(error = %err, "delete task did not complete");
                }
            }
        });

        rx
    }

    /// Deletes `codes` and waits for every attempt to finish.
    pub async fn delete_all(&self, codes: Vec<ShortCode>) -> BulkDeleteReport {
        let mut rx = self.dispatch(codes);
        let mut report = BulkDeleteReport::default();
        while let Some(outcome) = rx.recv().await {
            report.outcomes.push(outcome);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VolatileRepository;
    use async_trait::async_trait;
    use linkvault_core::{NewEntry, OwnerId, Result, ShortenEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    /// Fails deletes for a fixed set of codes and records peak concurrency.
    #[derive(Default)]
    struct CountingRepository {
        failing: HashSet<ShortCode>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Repository for CountingRepository {
        async fn save(&self, _: &ShortCode, _: &str, _: OwnerId) -> Result<ShortenEntry> {
            unimplemented!()
        }

        async fn save_all(&self, _: Vec<NewEntry>) -> Result<Vec<ShortenEntry>> {
            unimplemented!()
        }

        async fn find_by_url(&self, _: &str) -> Result<Option<ShortenEntry>> {
            Ok(None)
        }

        async fn find_by_urls(&self, _: &[String]) -> Result<Vec<ShortenEntry>> {
            Ok(vec![])
        }

        async fn find_by_key(&self, _: &ShortCode) -> Result<Option<ShortenEntry>> {
            Ok(None)
        }

        async fn find_all(&self) -> Result<Vec<ShortenEntry>> {
            Ok(vec![])
        }

        async fn find_all_by_owner(&self, _: OwnerId) -> Result<Vec<ShortenEntry>> {
            Ok(vec![])
        }

        async fn delete_by_short_code(&self, code: &ShortCode) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            !self.failing.contains(code)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn every_code_gets_an_outcome() {
        let repo = Arc::new(VolatileRepository::new());
        repo.save(&code("abc1234"), "https://a.example", 1)
            .await
            .unwrap();
        repo.save(&code("def5678"), "https://b.example", 1)
            .await
            .unwrap();

        let deleter = BulkDeleter::new(Arc::clone(&repo), DEFAULT_DELETE_CONCURRENCY);
        let report = deleter
            .delete_all(vec![code("abc1234"), code("missing"), code("def5678")])
            .await;

        assert_eq!(report.len(), 3);
        assert!(report.all_succeeded());
        assert!(repo.find_by_key(&code("abc1234")).await.unwrap().unwrap().deleted);
        assert!(repo.find_by_key(&code("def5678")).await.unwrap().unwrap().deleted);
        assert!(repo.find_by_key(&code("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_codes_are_attempted_once() {
        let repo = Arc::new(CountingRepository::default());
        let deleter = BulkDeleter::new(Arc::clone(&repo), 4);

        let report = deleter
            .delete_all(vec![code("abc1234"), code("abc1234"), code("def5678")])
            .await;

        assert_eq!(report.len(), 2);
        assert_eq!(repo.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_reported_per_code() {
        let repo = Arc::new(CountingRepository {
            failing: [code("bad0001")].into_iter().collect(),
            ..Default::default()
        });
        let deleter = BulkDeleter::new(repo, 4);

        let report = deleter
            .delete_all(vec![code("good001"), code("bad0001"), code("good002")])
            .await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert!(!report.all_succeeded());
        assert_eq!(report.failed().collect::<Vec<_>>(), [&code("bad0001")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded() {
        let repo = Arc::new(CountingRepository::default());
        let deleter = BulkDeleter::new(Arc::clone(&repo), 3);

        let codes = (0..30).map(|i| code(&format!("code{i:03}"))).collect();
        let report = deleter.delete_all(codes).await;

        assert_eq!(report.len(), 30);
        assert!(repo.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_batch_closes_immediately() {
        let deleter = BulkDeleter::new(Arc::new(VolatileRepository::new()), 4);
        let report = deleter.delete_all(vec![]).await;
        assert!(report.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dropped_receiver_still_deletes() {
        let repo = Arc::new(VolatileRepository::new());
        repo.save(&code("abc1234"), "https://a.example", 1)
            .await
            .unwrap();

        let deleter = BulkDeleter::new(Arc::clone(&repo), 4);
        drop(deleter.dispatch(vec![code("abc1234")]));

        awaitility::at_most(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(10))
            .until_async(|| async {
                repo.find_by_key(&code("abc1234")).await.unwrap().unwrap().deleted
            })
            .await;
    }
}
