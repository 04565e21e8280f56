//! Commit class resolution for node allocatable accounting
//!
//! This crate provides the core functionality for:
//! - Replicating CommitClass policies from a list/watch source
//! - Matching node labels against CommitClass selectors
//! - Resolving and applying per-resource commit scale factors
//! - Health checks and observability

pub mod health;
pub mod observability;
pub mod policy;
pub mod quantity;
pub mod replica;
pub mod resolver;
pub mod selector;
pub mod settings;
pub mod source;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use observability::{CommitMetrics, StructuredLogger};
pub use policy::{decode, CommitClass, CommitClassError, CommitClassSpec, ResourceCommitPercent};
pub use quantity::{Format, Quantity, QuantityError};
pub use replica::{PolicyLister, PolicyReplica, PolicySource, ReplicaHandle, SourceEvent};
pub use resolver::{Resolution, Resolver, ResourceWhitelist, DEFAULT_RESOURCE_WHITELIST};
pub use settings::Settings;
pub use source::{CommitClassResource, KubeNodeSource, KubePolicySource, NodeSource};
