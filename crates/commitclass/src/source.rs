//! Kubernetes-backed policy and node sources

use crate::policy::{API_GROUP, API_VERSION, KIND, PLURAL};
use crate::replica::{EventStream, PolicySource, SourceEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::watcher::{self, watcher, Event};
use kube::runtime::WatchStreamExt;
use kube::{Client, ResourceExt};
use serde_json::Value;
use tokio_stream::StreamExt;

/// Coordinates of the CommitClass custom resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitClassResource {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl Default for CommitClassResource {
    fn default() -> Self {
        Self {
            group: API_GROUP.to_string(),
            version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            plural: PLURAL.to_string(),
        }
    }
}

impl CommitClassResource {
    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, &self.kind);
        ApiResource::from_gvk_with_plural(&gvk, &self.plural)
    }
}

/// Lists and watches cluster-scoped CommitClass objects
///
/// Reconnects with the watcher's default backoff; errors in between are
/// passed on to the replica.
pub struct KubePolicySource {
    api: Api<DynamicObject>,
    config: watcher::Config,
}

impl KubePolicySource {
    pub fn new(client: Client, resource: &CommitClassResource) -> Self {
        Self {
            api: Api::all_with(client, &resource.api_resource()),
            config: watcher::Config::default(),
        }
    }
}

impl PolicySource<Value> for KubePolicySource {
    fn into_events(self) -> EventStream<Value> {
        let events = watcher(self.api, self.config)
            .default_backoff()
            .map(|event| match event.context("CommitClass watch failed")? {
                Event::Restarted(objects) => objects
                    .into_iter()
                    .map(keyed)
                    .collect::<Result<Vec<_>>>()
                    .map(SourceEvent::Restarted),
                Event::Applied(object) => {
                    let (name, value) = keyed(object)?;
                    Ok(SourceEvent::Applied(name, value))
                }
                Event::Deleted(object) => Ok(SourceEvent::Deleted(object.name_any())),
            });

        Box::pin(events)
    }
}

/// Store key and untyped body of a watched object
fn keyed(object: DynamicObject) -> Result<(String, Value)> {
    let name = object.name_any();
    let value = serde_json::to_value(&object)
        .with_context(|| format!("Failed to encode CommitClass {name}"))?;
    Ok((name, value))
}

/// Looks up the node a resolution is made for
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn node(&self, name: &str) -> Result<Node>;
}

pub struct KubeNodeSource {
    api: Api<Node>,
}

impl KubeNodeSource {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NodeSource for KubeNodeSource {
    async fn node(&self, name: &str) -> Result<Node> {
        self.api
            .get(name)
            .await
            .with_context(|| format!("Failed to fetch node {name}"))
    }
}
