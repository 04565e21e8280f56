//! Agent configuration

use anyhow::Result;
use commitclass::{CommitClassResource, ResourceWhitelist, DEFAULT_RESOURCE_WHITELIST};
use serde::Deserialize;
use tracing::warn;

/// Agent configuration, read from `AGENT_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics/settings
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Resource names a CommitClass may scale
    #[serde(default = "default_resource_whitelist")]
    pub resource_whitelist: Vec<String>,

    #[serde(default = "default_api_group")]
    pub api_group: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default = "default_plural")]
    pub plural: String,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_resource_whitelist() -> Vec<String> {
    DEFAULT_RESOURCE_WHITELIST
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn default_api_group() -> String {
    commitclass::policy::API_GROUP.to_string()
}

fn default_api_version() -> String {
    commitclass::policy::API_VERSION.to_string()
}

fn default_kind() -> String {
    commitclass::policy::KIND.to_string()
}

fn default_plural() -> String {
    commitclass::policy::PLURAL.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            resource_whitelist: default_resource_whitelist(),
            api_group: default_api_group(),
            api_version: default_api_version(),
            kind: default_kind(),
            plural: default_plural(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("resource_whitelist"),
            )
            .build()?;

        Ok(Self::from_config(config))
    }

    /// Deserialize, falling back to defaults when the values do not fit
    pub fn from_config(config: config::Config) -> Self {
        config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid agent configuration, using defaults");
            Self::default()
        })
    }

    pub fn resource(&self) -> CommitClassResource {
        CommitClassResource {
            group: self.api_group.clone(),
            version: self.api_version.clone(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }

    pub fn whitelist(&self) -> ResourceWhitelist {
        ResourceWhitelist::new(self.resource_whitelist.iter().map(|name| name.trim()))
    }
}
