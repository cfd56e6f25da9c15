//! Cloud B (GCP-shaped) provider: single-call instance-topology fetch,
//! same three-level conversion as cloud A but without the explicit
//! pagination contract (spec §4.E).

use super::{flatten_instances, Provider, ProviderContext};
use crate::error::Error;
use crate::graph::{to_three_tier, InstanceRecord, Vertex};
use crate::model::ComputeInstanceSet;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
struct RawInstanceTopology {
    instance_id: String,
    network_nodes: [String; 3],
}

#[derive(Debug, Deserialize, Default)]
struct ListInstanceTopologiesResponse {
    #[serde(default)]
    instances: Vec<RawInstanceTopology>,
}

#[derive(Debug, Serialize)]
struct ListInstanceTopologiesRequest<'a> {
    instance_ids: &'a [String],
}

pub struct GcpProvider;

impl GcpProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GcpProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for GcpProvider {
    fn name(&self) -> &str {
        "gcp"
    }

    fn generate_topology_config<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        instances: &'a ComputeInstanceSet,
    ) -> BoxFuture<'a, Result<Vertex, Error>> {
        Box::pin(async move {
            let endpoint = ctx.param_str("endpoint").unwrap_or_else(|| {
                "https://compute.googleapis.com/compute/v1/instanceTopologies:list".to_string()
            });
            let requested = flatten_instances(instances);
            let ids: Vec<String> = requested.iter().map(|(id, _)| id.clone()).collect();
            let body = ListInstanceTopologiesRequest { instance_ids: &ids };
            let body_json = serde_json::to_value(&body).map_err(Error::from)?;

            let text = ctx
                .retry
                .do_with_retries(|| ctx.retry.client().post(&endpoint).json(&body_json))
                .await?;
            let response: ListInstanceTopologiesResponse =
                serde_json::from_str(&text).map_err(|e| Error::fatal(e.to_string()))?;

            let mut by_id = std::collections::HashMap::new();
            for (id, name) in &requested {
                by_id.insert(id.as_str(), name.as_str());
            }
            let mut seen = std::collections::HashSet::new();
            let mut instance_records = Vec::new();
            for record in &response.instances {
                let Some(node_name) = by_id.get(record.instance_id.as_str()) else {
                    continue;
                };
                seen.insert(record.instance_id.as_str());
                instance_records.push(InstanceRecord {
                    instance_id: record.instance_id.clone(),
                    switches: record.network_nodes.clone(),
                    node_name: node_name.to_string(),
                });
            }
            let missing: Vec<(String, String)> = requested
                .into_iter()
                .filter(|(id, _)| !seen.contains(id.as_str()))
                .collect();

            to_three_tier("gcp", &instance_records, &missing, true)
        })
    }
}
