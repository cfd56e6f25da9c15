//! In-cluster change observer (spec §4.L, supplemented): watches `Node`
//! objects and, after a debounce, POSTs to `/v1/generate` so the service
//! re-discovers topology. Adapted from the teacher's commented-out
//! reflector watcher, using a bare `kube::runtime::watcher` stream since
//! a fire-and-forget signal doesn't need the full `Controller` machinery.

use crate::error::Error;
use crate::model::{ComputeInstanceGroup, EngineRequest, ProviderRequest, TopologyRequest};
use crate::retry::RetryClient;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::watcher;
use kube::Api;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

pub struct ObserverConfig {
    pub forward_service_url: String,
    pub provider_name: String,
    pub engine_name: String,
    pub label_prefix: String,
    pub debounce: Duration,
}

/// Builds the body posted to `/v1/generate`: the configured
/// provider/engine names plus every node currently seen, labelled by the
/// orchestrator-label prefix passed on the CLI.
fn build_request(config: &ObserverConfig, nodes: &[Node]) -> TopologyRequest {
    let mut instances = BTreeMap::new();
    for node in nodes {
        if let Some(name) = &node.metadata.name {
            instances.insert(name.clone(), name.clone());
        }
    }
    TopologyRequest {
        provider: ProviderRequest {
            name: config.provider_name.clone(),
            creds: serde_json::Value::Null,
            params: serde_json::json!({ "label_prefix": config.label_prefix }),
        },
        engine: EngineRequest {
            name: config.engine_name.clone(),
            params: serde_json::Value::Null,
        },
        nodes: vec![ComputeInstanceGroup {
            region: "cluster".to_string(),
            instances,
        }],
    }
}

async fn notify(retry: &RetryClient, config: &ObserverConfig, nodes: &[Node]) -> Result<(), Error> {
    let body = build_request(config, nodes);
    let url = format!("{}/v1/generate", config.forward_service_url.trim_end_matches('/'));
    retry
        .do_with_retries(|| retry.client().post(&url).json(&body))
        .await?;
    Ok(())
}

/// Runs until the watch stream ends (process shutdown). Every `Node`
/// add/remove/update restarts a debounce timer; the timer firing is what
/// actually triggers a `/v1/generate` call, so a burst of node churn
/// produces one request instead of one per event.
pub async fn run(client: kube::Client, config: ObserverConfig) {
    let nodes: Api<Node> = Api::all(client);
    let retry = RetryClient::new(false);
    let mut stream = Box::pin(watcher::watcher(nodes.clone(), watcher::Config::default()));

    let mut pending = false;
    loop {
        let timeout = tokio::time::sleep(config.debounce);
        tokio::select! {
            event = stream.next() => {
                match event {
                    Some(Ok(_)) => pending = true,
                    Some(Err(err)) => warn!(error = %err, "node watch error"),
                    None => {
                        info!("node watch stream ended");
                        break;
                    }
                }
            }
            _ = timeout, if pending => {
                pending = false;
                match nodes.list(&Default::default()).await {
                    Ok(list) => {
                        if let Err(err) = notify(&retry, &config, &list.items).await {
                            warn!(error = %err.message(), "failed to notify topograph of node change");
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to list nodes after watch event"),
                }
            }
        }
    }
}
