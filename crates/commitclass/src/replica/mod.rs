//! Local replica of the CommitClass collection
//!
//! This module provides:
//! - The list-then-watch source abstraction the replica consumes
//! - An eventually-consistent snapshot store with lock-free readers
//! - A background task with an explicit stop handle

mod store;


pub use store::{PolicyReplica, ReplicaHandle};

use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// Change observed on the policy source
#[derive(Debug, Clone)]
pub enum SourceEvent<T> {
    /// A full list replaces the whole snapshot
    Restarted(Vec<(String, T)>),
    /// An object was added or updated
    Applied(String, T),
    /// An object was removed
    Deleted(String),
}

/// Event stream produced by a policy source
///
/// Errors are reported and skipped; reconnecting is up to the source.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = anyhow::Result<SourceEvent<T>>> + Send>>;

/// A collection that can be listed and then watched for changes
pub trait PolicySource<T>: Send + 'static {
    /// Start listing and watching; the initial list arrives as `Restarted`
    fn into_events(self) -> EventStream<T>;
}

/// Read access to the current set of raw CommitClass objects
///
/// Returned objects are shared with the replica and must not be mutated.
pub trait PolicyLister: Send + Sync {
    fn list_all(&self) -> Vec<Arc<Value>>;
}

impl PolicyLister for PolicyReplica<Value> {
    fn list_all(&self) -> Vec<Arc<Value>> {
        PolicyReplica::list_all(self)
    }
}
