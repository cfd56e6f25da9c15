//! On-cluster label-reader provider: builds the topology straight from
//! Kubernetes `Node` labels rather than calling an external cloud API,
//! grounded on the teacher's `controller.rs` Node reconciliation reads.

use super::{Provider, ProviderContext};
use crate::error::Error;
use crate::graph::{to_three_tier, InstanceRecord, Vertex};
use crate::model::ComputeInstanceSet;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};

const LABEL_TOP: &str = "topology.topograph.io/top-switch";
const LABEL_MID: &str = "topology.topograph.io/mid-switch";
const LABEL_LEAF: &str = "topology.topograph.io/leaf-switch";

pub struct DraProvider;

impl DraProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DraProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for DraProvider {
    fn name(&self) -> &str {
        "dra"
    }

    fn generate_topology_config<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        instances: &'a ComputeInstanceSet,
    ) -> BoxFuture<'a, Result<Vertex, Error>> {
        Box::pin(async move {
            let client = ctx
                .kube_client
                .clone()
                .ok_or_else(|| Error::fatal("dra provider requires an in-cluster kube client"))?;
            let nodes: Api<Node> = Api::all(client);
            let list = nodes
                .list(&ListParams::default())
                .await
                .map_err(Error::from)?;

            let requested_names: std::collections::HashSet<String> = super::flatten_instances(instances)
                .into_iter()
                .map(|(_, name)| name)
                .collect();

            let mut instance_records = Vec::new();
            let mut missing = Vec::new();
            for node in list.items {
                let name = match node.metadata.name.clone() {
                    Some(name) => name,
                    None => continue,
                };
                if !requested_names.is_empty() && !requested_names.contains(&name) {
                    continue;
                }
                let labels = node.metadata.labels.clone().unwrap_or_default();
                let top = labels.get(LABEL_TOP).cloned();
                let mid = labels.get(LABEL_MID).cloned();
                let leaf = labels.get(LABEL_LEAF).cloned();
                match (top, mid, leaf) {
                    (Some(top), Some(mid), Some(leaf)) => {
                        instance_records.push(InstanceRecord {
                            instance_id: name.clone(),
                            switches: [top, mid, leaf],
                            node_name: name,
                        });
                    }
                    _ => missing.push((name.clone(), name)),
                }
            }

            to_three_tier("dra", &instance_records, &missing, true)
        })
    }
}
