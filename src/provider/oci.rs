//! Cloud C (OCI-shaped) provider: mirrors the GCP builtin's single-call
//! shape with OCI's field names (spec §4.E).

use super::{flatten_instances, Provider, ProviderContext};
use crate::error::Error;
use crate::graph::{to_three_tier, InstanceRecord, Vertex};
use crate::model::ComputeInstanceSet;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
struct RawComputeHost {
    #[serde(rename = "instanceId")]
    instance_id: String,
    #[serde(rename = "networkBlockId")]
    network_block: String,
    #[serde(rename = "localBlockId")]
    local_block: String,
    #[serde(rename = "hpcIslandId")]
    hpc_island: String,
}

#[derive(Debug, Deserialize, Default)]
struct ListComputeHostsResponse {
    #[serde(default)]
    items: Vec<RawComputeHost>,
}

#[derive(Debug, Serialize)]
struct ListComputeHostsRequest<'a> {
    #[serde(rename = "instanceIds")]
    instance_ids: &'a [String],
}

pub struct OciProvider;

impl OciProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OciProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for OciProvider {
    fn name(&self) -> &str {
        "oci"
    }

    fn generate_topology_config<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        instances: &'a ComputeInstanceSet,
    ) -> BoxFuture<'a, Result<Vertex, Error>> {
        Box::pin(async move {
            let endpoint = ctx
                .param_str("endpoint")
                .ok_or_else(|| Error::user("oci provider requires params.endpoint"))?;
            let requested = flatten_instances(instances);
            let ids: Vec<String> = requested.iter().map(|(id, _)| id.clone()).collect();
            let body = ListComputeHostsRequest { instance_ids: &ids };
            let body_json = serde_json::to_value(&body).map_err(Error::from)?;

            let text = ctx
                .retry
                .do_with_retries(|| ctx.retry.client().post(&endpoint).json(&body_json))
                .await?;
            let response: ListComputeHostsResponse =
                serde_json::from_str(&text).map_err(|e| Error::fatal(e.to_string()))?;

            let mut by_id = std::collections::HashMap::new();
            for (id, name) in &requested {
                by_id.insert(id.as_str(), name.as_str());
            }
            let mut seen = std::collections::HashSet::new();
            let mut instance_records = Vec::new();
            for host in &response.items {
                let Some(node_name) = by_id.get(host.instance_id.as_str()) else {
                    continue;
                };
                seen.insert(host.instance_id.as_str());
                // OCI reports [HPC island, network block, local block] top-down.
                instance_records.push(InstanceRecord {
                    instance_id: host.instance_id.clone(),
                    switches: [
                        host.hpc_island.clone(),
                        host.network_block.clone(),
                        host.local_block.clone(),
                    ],
                    node_name: node_name.to_string(),
                });
            }
            let missing: Vec<(String, String)> = requested
                .into_iter()
                .filter(|(id, _)| !seen.contains(id.as_str()))
                .collect();

            to_three_tier("oci", &instance_records, &missing, true)
        })
    }
}
