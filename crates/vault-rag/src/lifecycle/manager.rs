//! Expiry sweep, pre-expiry notification and the background worker

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::providers::{DocumentStore, ExpiryNotifier, VectorIndex};
use crate::types::DocumentId;

use super::locks::DocumentLocks;

/// Outcome of one expiry sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Expired documents found
    pub expired: usize,
    /// Documents whose chunks and metadata were removed
    pub deleted: Vec<DocumentId>,
    /// Index entries removed
    pub chunks_removed: usize,
    /// Documents that could not be removed, with the reason
    pub failures: Vec<(DocumentId, String)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes expired documents and warns owners ahead of expiry
pub struct LifecycleManager {
    documents: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    notifier: Arc<dyn ExpiryNotifier>,
    locks: Arc<DocumentLocks>,
    config: LifecycleConfig,
    /// Documents already warned about
    notified: Mutex<HashSet<DocumentId>>,
}

impl LifecycleManager {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        notifier: Arc<dyn ExpiryNotifier>,
        locks: Arc<DocumentLocks>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            documents,
            index,
            notifier,
            locks,
            config,
            notified: Mutex::new(HashSet::new()),
        }
    }

    /// Remove every document expired at `now`: index entries first, then metadata.
    ///
    /// A failure on one document is logged and reported; the sweep moves on.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self.documents.list_expired(now).await?;
        let mut report = SweepReport {
            expired: expired.len(),
            ..SweepReport::default()
        };

        for document in expired {
            let id = document.id;
            let _guard = self.locks.lock(id).await;

            let removed = match self.index.delete(id).await {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::error!("Failed to delete chunks of expired document {}: {}", id, e);
                    report.failures.push((id, e.to_string()));
                    continue;
                }
            };
            report.chunks_removed += removed;

            match self.documents.delete(id).await {
                Ok(_) => {
                    tracing::info!(
                        "Deleted expired document {} ({} chunks)",
                        document.display_name(),
                        removed
                    );
                    report.deleted.push(id);
                    self.notified.lock().remove(&id);
                }
                Err(e) => {
                    tracing::error!("Failed to delete expired document {}: {}", id, e);
                    report.failures.push((id, e.to_string()));
                }
            }
        }

        self.locks.prune();
        if report.expired > 0 {
            tracing::info!(
                "Expiry sweep: {} expired, {} deleted, {} failed",
                report.expired,
                report.deleted.len(),
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Notify owners of documents expiring within the warning window.
    ///
    /// Each document is notified at most once while it stays in the window;
    /// a failed notification is logged and not retried. Documents that left
    /// the window (forgotten, or expiry extended) are forgotten here too.
    /// Returns the number of notifications sent.
    pub async fn notify_expiring(&self, now: DateTime<Utc>) -> Result<usize> {
        let deadline = now + chrono::Duration::days(self.config.warning_days);
        let expiring = self.documents.list_expiring(deadline).await?;
        let listed: HashSet<DocumentId> = expiring.iter().map(|document| document.id).collect();
        self.notified.lock().retain(|id| listed.contains(id));
        let mut sent = 0;

        for document in expiring {
            let Some(expires_at) = document.expires_at else {
                continue;
            };
            if expires_at <= now {
                continue;
            }
            let first_notice = self.notified.lock().insert(document.id);
            if !first_notice {
                continue;
            }

            match self.notifier.notify(&document, expires_at).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(
                    "Failed to send expiry notification for document {}: {}",
                    document.id,
                    e
                ),
            }
        }

        Ok(sent)
    }

    /// One pass of the background loop
    async fn tick(&self) {
        let now = Utc::now();
        if let Err(e) = self.notify_expiring(now).await {
            tracing::error!("Expiry notification pass failed: {}", e);
        }
        if let Err(e) = self.sweep(now).await {
            tracing::error!("Expiry sweep failed: {}", e);
        }
    }

    /// Run until `shutdown` turns true (or its sender is dropped)
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        tracing::info!("Lifecycle manager started, checking every {:?}", period);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Lifecycle manager stopped");
    }

    /// Start `run` on a background task
    pub fn spawn(self: Arc<Self>) -> LifecycleHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        LifecycleHandle { shutdown: tx, task }
    }
}

/// Handle to a running lifecycle worker
pub struct LifecycleHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LifecycleHandle {
    /// Signal the worker and wait for it to finish its current pass
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| Error::internal(format!("lifecycle task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockDocumentStore, MockExpiryNotifier, MockVectorIndex};
    use crate::types::Document;
    use chrono::Duration as ChronoDuration;
    use mockall::Sequence;

    fn manager(
        documents: MockDocumentStore,
        index: MockVectorIndex,
        notifier: MockExpiryNotifier,
    ) -> LifecycleManager {
        LifecycleManager::new(
            Arc::new(documents),
            Arc::new(index),
            Arc::new(notifier),
            Arc::new(DocumentLocks::new()),
            LifecycleConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_sweep_deletes_index_before_metadata() {
        let now = Utc::now();
        let mut seq = Sequence::new();
        let mut documents = MockDocumentStore::new();
        let mut index = MockVectorIndex::new();

        documents
            .expect_list_expired()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(vec![Document::new(1, 9, 10).with_expiry(now)]));
        index
            .expect_delete()
            .withf(|id| *id == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(3));
        documents
            .expect_delete()
            .withf(|id| *id == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));

        let report = manager(documents, index, MockExpiryNotifier::new())
            .sweep(now)
            .await
            .unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(report.deleted, vec![1]);
        assert_eq!(report.chunks_removed, 3);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_index_failure_keeps_metadata_and_continues() {
        let now = Utc::now();
        let mut documents = MockDocumentStore::new();
        let mut index = MockVectorIndex::new();

        documents.expect_list_expired().returning(move |_| {
            Ok(vec![
                Document::new(1, 9, 10).with_expiry(now),
                Document::new(2, 9, 10).with_expiry(now),
            ])
        });
        index.expect_delete().returning(|id| {
            if id == 1 {
                Err(Error::vector_db("disk full"))
            } else {
                Ok(1)
            }
        });
        // Metadata of document 1 must survive its failed index delete
        documents
            .expect_delete()
            .withf(|id| *id == 2)
            .times(1)
            .returning(|_| Ok(true));

        let report = manager(documents, index, MockExpiryNotifier::new())
            .sweep(now)
            .await
            .unwrap();

        assert_eq!(report.deleted, vec![2]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 1);
    }

    #[tokio::test]
    async fn test_notifies_each_document_once() {
        let now = Utc::now();
        let soon = now + ChronoDuration::days(2);
        let mut documents = MockDocumentStore::new();
        let mut notifier = MockExpiryNotifier::new();

        documents.expect_list_expiring().returning(move |_| {
            Ok(vec![
                Document::new(1, 9, 10).with_expiry(soon),
                Document::new(2, 9, 10).with_expiry(now - ChronoDuration::hours(1)),
            ])
        });
        notifier
            .expect_notify()
            .withf(|doc, _| doc.id == 1)
            .times(1)
            .returning(|_, _| Ok(()));

        let manager = manager(documents, MockVectorIndex::new(), notifier);
        assert_eq!(manager.notify_expiring(now).await.unwrap(), 1);
        assert_eq!(manager.notify_expiring(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_document_leaving_window_is_notified_again_on_return() {
        let now = Utc::now();
        let soon = now + ChronoDuration::days(3);
        let mut documents = MockDocumentStore::new();
        let mut notifier = MockExpiryNotifier::new();

        // Second pass: expiry was extended out of the window
        let mut pass = 0;
        documents.expect_list_expiring().returning(move |_| {
            pass += 1;
            if pass == 2 {
                Ok(Vec::new())
            } else {
                Ok(vec![Document::new(3, 9, 10).with_expiry(soon)])
            }
        });
        notifier
            .expect_notify()
            .withf(|doc, _| doc.id == 3)
            .times(2)
            .returning(|_, _| Ok(()));

        let manager = manager(documents, MockVectorIndex::new(), notifier);
        assert_eq!(manager.notify_expiring(now).await.unwrap(), 1);
        assert_eq!(manager.notify_expiring(now).await.unwrap(), 0);
        assert!(manager.notified.lock().is_empty());
        assert_eq!(manager.notify_expiring(now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_notification_not_retried() {
        let now = Utc::now();
        let soon = now + ChronoDuration::days(1);
        let mut documents = MockDocumentStore::new();
        let mut notifier = MockExpiryNotifier::new();

        documents
            .expect_list_expiring()
            .returning(move |_| Ok(vec![Document::new(5, 9, 10).with_expiry(soon)]));
        notifier
            .expect_notify()
            .times(1)
            .returning(|_, _| Err(Error::internal("mail server down")));

        let manager = manager(documents, MockVectorIndex::new(), notifier);
        assert_eq!(manager.notify_expiring(now).await.unwrap(), 0);
        assert_eq!(manager.notify_expiring(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawned_worker_sweeps_and_stops() {
        let mut documents = MockDocumentStore::new();
        documents.expect_list_expiring().returning(|_| Ok(Vec::new()));
        documents
            .expect_list_expired()
            .times(1..)
            .returning(|_| Ok(Vec::new()));

        let manager = Arc::new(manager(documents, MockVectorIndex::new(), MockExpiryNotifier::new()));
        let handle = manager.spawn();

        // The first interval tick fires immediately
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.shutdown().await.unwrap();
    }
}
