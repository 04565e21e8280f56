//! Per-node commit settings resolution
//!
//! Resolution decodes every object in the current snapshot, orders the
//! classes by name and applies the first one whose selector matches the
//! node labels. Node fields never take part in matching.

use crate::observability::{outcomes, CommitMetrics};
use crate::policy::{decode, CommitClass, CommitClassError};
use crate::replica::PolicyLister;
use crate::selector::{matches_term, LabelSet};
use crate::settings::Settings;
use k8s_openapi::api::core::v1::Node;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Resources eligible for commit scaling unless configured otherwise
pub const DEFAULT_RESOURCE_WHITELIST: &[&str] = &["cpu", "memory", "ephemeral-storage"];

/// Fixed set of resource names a CommitClass may scale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceWhitelist {
    names: BTreeSet<String>,
}

impl ResourceWhitelist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for ResourceWhitelist {
    fn default() -> Self {
        Self::new(DEFAULT_RESOURCE_WHITELIST.iter().copied())
    }
}

/// Settings together with the class they came from
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Name of the matching CommitClass, if any matched
    pub commit_class: Option<String>,
    pub settings: Settings,
}

pub struct Resolver {
    lister: Arc<dyn PolicyLister>,
    whitelist: ResourceWhitelist,
    metrics: CommitMetrics,
}

impl Resolver {
    pub fn new(lister: Arc<dyn PolicyLister>, whitelist: ResourceWhitelist) -> Self {
        Self {
            lister,
            whitelist,
            metrics: CommitMetrics::new(),
        }
    }

    pub fn whitelist(&self) -> &ResourceWhitelist {
        &self.whitelist
    }

    /// Resolve commit settings for a node from its labels
    pub fn resolve(&self, node: &Node) -> Result<Settings, CommitClassError> {
        self.resolve_node(node).map(|resolution| resolution.settings)
    }

    pub fn resolve_node(&self, node: &Node) -> Result<Resolution, CommitClassError> {
        match &node.metadata.labels {
            Some(labels) => self.resolve_labels(labels),
            None => self.resolve_labels(&LabelSet::new()),
        }
    }

    pub fn resolve_labels(&self, labels: &LabelSet) -> Result<Resolution, CommitClassError> {
        let start = Instant::now();
        let result = self.select(labels);
        self.metrics
            .observe_resolution_latency(start.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(Resolution {
                commit_class: Some(_),
                ..
            }) => outcomes::MATCHED,
            Ok(_) => outcomes::UNMATCHED,
            Err(_) => outcomes::ERROR,
        };
        self.metrics.inc_resolution(outcome);

        result
    }

    fn select(&self, labels: &LabelSet) -> Result<Resolution, CommitClassError> {
        let objects = self.lister.list_all();
        let mut classes = objects
            .iter()
            .map(|object| decode(object))
            .collect::<Result<Vec<CommitClass>, _>>()?;

        // Byte-wise name order is the only tie-break between overlapping classes
        classes.sort_by(|a, b| a.name().cmp(b.name()));

        let no_fields = LabelSet::new();
        let Some(class) = classes
            .iter()
            .find(|class| matches_term(&class.spec.selector, labels, &no_fields))
        else {
            return Ok(Resolution {
                commit_class: None,
                settings: Settings::new(),
            });
        };

        let mut settings = Settings::new();
        for resource in &class.spec.resources {
            if self.whitelist.contains(&resource.name) {
                settings.set(&resource.name, resource.percent);
            } else {
                debug!(
                    commit_class = %class.name(),
                    resource = %resource.name,
                    "Skipping resource outside whitelist"
                );
            }
        }

        Ok(Resolution {
            commit_class: Some(class.name().to_string()),
            settings,
        })
    }
}
