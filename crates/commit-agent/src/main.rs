//! Commit Agent - node-local CommitClass resolution
//!
//! This binary runs as a DaemonSet on each Kubernetes node, keeping a
//! replica of the cluster's CommitClass objects and serving the commit
//! settings that apply to its node.

use anyhow::{Context, Result};
use commitclass::{
    health::{components, HealthRegistry},
    KubeNodeSource, KubePolicySource, PolicyReplica, Resolver, StructuredLogger,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting commit-agent");

    let config = config::AgentConfig::load()?;
    let resource = config.resource();
    info!(
        node_name = %config.node_name,
        resources = ?config.resource_whitelist,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::POLICY_REPLICA).await;
    health_registry.register(components::RESOLVER).await;

    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(
        AGENT_VERSION,
        &format!("{}.{}/{}", resource.plural, resource.group, resource.version),
    );

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    // Readiness flips once the replica completes its first list
    let replica: Arc<PolicyReplica<Value>> =
        Arc::new(PolicyReplica::new().with_health(health_registry.clone()));
    let replica_handle =
        Arc::clone(&replica).spawn(KubePolicySource::new(client.clone(), &resource));

    let resolver = Arc::new(Resolver::new(replica, config.whitelist()));

    let app_state = Arc::new(api::AppState {
        health_registry,
        resolver,
        nodes: Arc::new(KubeNodeSource::new(client)),
        node_name: config.node_name.clone(),
        logger: logger.clone(),
    });

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let reason = shutdown_signal()?.await;
    logger.log_shutdown(reason);

    replica_handle.stop().await;
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}

/// Resolves on SIGTERM (sent by the kubelet on pod termination) or SIGINT
///
/// Handlers are installed before returning, so a signal delivered after
/// this call is never lost.
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => "SIGTERM received",
            _ = interrupt.recv() => "SIGINT received",
        }
    })
}
