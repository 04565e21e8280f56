//! Snapshot store and the background list/watch task

use super::{PolicySource, SourceEvent};
use crate::health::{components, HealthRegistry};
use crate::observability::{events, CommitMetrics};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Eventually-consistent mirror of a remotely managed object collection
///
/// Entries are only ever replaced or removed as a whole, so a snapshot
/// taken with [`PolicyReplica::list_all`] never shows a half-updated object.
pub struct PolicyReplica<T> {
    /// Map of object name -> latest observed object
    objects: DashMap<String, Arc<T>>,
    /// Set after the first full list has been applied
    synced: AtomicBool,
    metrics: CommitMetrics,
    health: Option<HealthRegistry>,
}

impl<T> Default for PolicyReplica<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PolicyReplica<T> {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            synced: AtomicBool::new(false),
            metrics: CommitMetrics::new(),
            health: None,
        }
    }

    /// Report watch errors and the first sync to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Current snapshot; empty until the first list has been applied
    pub fn list_all(&self) -> Vec<Arc<T>> {
        self.objects.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.objects.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether a full list has been observed since startup
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Apply one source event to the snapshot
    pub fn apply(&self, event: SourceEvent<T>) {
        match event {
            SourceEvent::Restarted(objects) => {
                let names: HashSet<String> = objects.iter().map(|(name, _)| name.clone()).collect();
                for (name, object) in objects {
                    self.objects.insert(name, Arc::new(object));
                }
                self.objects.retain(|name, _| names.contains(name));
                self.synced.store(true, Ordering::Release);
                self.metrics.inc_watch_event(events::RESTARTED);
                info!(objects = self.objects.len(), "CommitClass snapshot relisted");
            }
            SourceEvent::Applied(name, object) => {
                debug!(name = %name, "CommitClass applied");
                self.objects.insert(name, Arc::new(object));
                self.metrics.inc_watch_event(events::APPLIED);
            }
            SourceEvent::Deleted(name) => {
                debug!(name = %name, "CommitClass deleted");
                self.objects.remove(&name);
                self.metrics.inc_watch_event(events::DELETED);
            }
        }
        self.metrics.set_replica_objects(self.objects.len());
    }
}

impl<T: Send + Sync + 'static> PolicyReplica<T> {
    /// Consume the source until shutdown fires or the source ends
    pub async fn run<S: PolicySource<T>>(&self, source: S, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting CommitClass replica");

        let mut events = source.into_events();
        let mut degraded = false;

        loop {
            tokio::select! {
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        let first_sync = matches!(event, SourceEvent::Restarted(_)) && !self.has_synced();
                        self.apply(event);

                        if let Some(health) = &self.health {
                            if first_sync {
                                health.set_ready(true).await;
                            }
                            if degraded {
                                health.set_healthy(components::POLICY_REPLICA).await;
                            }
                        }
                        degraded = false;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "CommitClass watch error, serving last snapshot");
                        self.metrics.inc_watch_errors();
                        if !degraded {
                            degraded = true;
                            if let Some(health) = &self.health {
                                health
                                    .set_degraded(components::POLICY_REPLICA, e.to_string())
                                    .await;
                            }
                        }
                    }
                    None => {
                        warn!("CommitClass source ended, snapshot will no longer update");
                        if let Some(health) = &self.health {
                            health
                                .set_unhealthy(components::POLICY_REPLICA, "policy source ended")
                                .await;
                        }
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Stopping CommitClass replica");
                    break;
                }
            }
        }
    }

    /// Run the replica on a background task
    pub fn spawn<S: PolicySource<T>>(self: Arc<Self>, source: S) -> ReplicaHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(async move { self.run(source, shutdown_rx).await });

        ReplicaHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running replica task
///
/// Dropping the handle also stops the task.
pub struct ReplicaHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl ReplicaHandle {
    /// Signal the task to stop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "CommitClass replica task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
