//! Cloud A (AWS-shaped) provider: paginated instance-topology fetch with
//! at most 100 explicit instance ids per call, opaque-token pagination
//! above that, and three-level conversion (spec §4.E).

use super::{flatten_instances, Provider, ProviderContext};
use crate::error::Error;
use crate::graph::{to_three_tier, InstanceRecord, Vertex};
use crate::model::ComputeInstanceSet;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub const MAX_IDS_PER_CALL: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct RawInstanceTopology {
    pub instance_id: String,
    pub network_nodes: [String; 3],
    #[serde(default)]
    pub capacity_block_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeInstanceTopologyPage {
    #[serde(default)]
    instances: Vec<RawInstanceTopology>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct DescribeInstanceTopologyRequest<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    instance_ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

pub struct AwsProvider;

impl AwsProvider {
    pub fn new() -> Self {
        Self
    }

    /// Drives pagination: ids are sent in chunks of at most
    /// [`MAX_IDS_PER_CALL`]; beyond that the caller must follow
    /// `next_token`. Pagination errors mid-stream are fatal and discard
    /// earlier pages (spec §4.E Failure semantics).
    async fn fetch_all(
        &self,
        ctx: &ProviderContext,
        instance_ids: &[String],
    ) -> Result<Vec<RawInstanceTopology>, Error> {
        let endpoint = ctx
            .param_str("endpoint")
            .unwrap_or_else(|| "https://ec2.amazonaws.com/describe-instance-topology".to_string());

        let mut all = Vec::new();
        for chunk in instance_ids.chunks(MAX_IDS_PER_CALL.max(1)) {
            let mut next_token: Option<String> = None;
            loop {
                let body = DescribeInstanceTopologyRequest {
                    instance_ids: chunk,
                    next_token: next_token.as_deref(),
                };
                let endpoint = endpoint.clone();
                let body_json = serde_json::to_value(&body).map_err(Error::from)?;
                let text = ctx
                    .retry
                    .do_with_retries(move || {
                        ctx.retry.client().post(&endpoint).json(&body_json)
                    })
                    .await
                    .map_err(|e| match e {
                        Error::Transient(m) => Error::Transient(m),
                        other => Error::Fatal(other.message().to_string()),
                    })?;
                let page: DescribeInstanceTopologyPage =
                    serde_json::from_str(&text).map_err(|e| Error::fatal(e.to_string()))?;
                all.extend(page.instances);
                match page.next_token {
                    Some(token) if !token.is_empty() => next_token = Some(token),
                    _ => break,
                }
            }
        }
        Ok(all)
    }
}

impl Default for AwsProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts raw AWS topology records into a three-level tree. Instances
/// present in `requested` but absent from `records` go under
/// `no-topology` so the scheduler still sees them (spec §4.E Conversion).
pub fn convert(
    records: &[RawInstanceTopology],
    requested: &[(String, String)],
) -> Result<Vertex, Error> {
    let mut by_id = std::collections::HashMap::new();
    for (id, name) in requested {
        by_id.insert(id.as_str(), name.as_str());
    }

    let mut instance_records = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for record in records {
        let node_name = match by_id.get(record.instance_id.as_str()) {
            Some(name) => name.to_string(),
            None => continue, // not part of this request, ignore
        };
        seen.insert(record.instance_id.as_str());
        instance_records.push(InstanceRecord {
            instance_id: record.instance_id.clone(),
            switches: record.network_nodes.clone(),
            node_name,
        });
    }

    let missing: Vec<(String, String)> = requested
        .iter()
        .filter(|(id, _)| !seen.contains(id.as_str()))
        .cloned()
        .collect();

    to_three_tier("aws", &instance_records, &missing, true)
}

impl Provider for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    fn generate_topology_config<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        instances: &'a ComputeInstanceSet,
    ) -> BoxFuture<'a, Result<Vertex, Error>> {
        Box::pin(async move {
            let requested = flatten_instances(instances);
            let ids: Vec<String> = requested.iter().map(|(id, _)| id.clone()).collect();
            let records = self.fetch_all(ctx, &ids).await?;
            convert(&records, &requested)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_builds_three_tier_tree_and_no_topology_bucket() {
        let records = vec![
            RawInstanceTopology {
                instance_id: "i-1".into(),
                network_nodes: ["sw1".into(), "sw2".into(), "sw3".into()],
                capacity_block_id: None,
            },
            RawInstanceTopology {
                instance_id: "i-2".into(),
                network_nodes: ["sw1".into(), "sw2".into(), "sw3".into()],
                capacity_block_id: None,
            },
        ];
        let requested = vec![
            ("i-1".to_string(), "node1".to_string()),
            ("i-2".to_string(), "node2".to_string()),
            ("i-cpu".to_string(), "n-CPU".to_string()),
        ];
        let root = convert(&records, &requested).unwrap();
        let tree = root.tree().unwrap();
        assert!(tree.children.contains_key("sw1"));
        let bucket = tree.children.get(crate::graph::NO_TOPOLOGY).unwrap();
        assert!(bucket.children.contains_key("n-CPU"));
    }
}
