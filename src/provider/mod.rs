//! Provider interface and built-in providers (spec §4.E).

pub mod aws;
pub mod baremetal;
pub mod dra;
pub mod gcp;
pub mod oci;
pub mod test_provider;

use crate::error::Error;
use crate::graph::Vertex;
use crate::model::ComputeInstanceSet;
use crate::retry::RetryClient;
use futures::future::BoxFuture;

/// Everything a provider call needs: credentials, free-form params, and
/// the shared retry-aware HTTP client.
pub struct ProviderContext {
    pub creds: serde_json::Value,
    pub params: serde_json::Value,
    pub retry: RetryClient,
    pub kube_client: Option<kube::Client>,
    pub page_size: Option<u32>,
}

impl ProviderContext {
    pub fn new(creds: serde_json::Value, params: serde_json::Value) -> Self {
        Self {
            creds,
            params,
            retry: RetryClient::new(false),
            kube_client: None,
            page_size: None,
        }
    }

    pub fn with_kube_client(mut self, client: kube::Client) -> Self {
        self.kube_client = Some(client);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<String> {
        self.params.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    pub fn cred_str(&self, key: &str) -> Option<String> {
        self.creds.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }
}

/// A cloud or on-prem fabric that can enumerate compute instances and
/// translate them into a raw topology graph.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Optional: returns the instances the provider itself knows about.
    /// Errors with `Error::User` ("unsupported") unless overridden.
    fn get_compute_instances<'a>(
        &'a self,
        _ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<ComputeInstanceSet, Error>> {
        Box::pin(async move {
            Err(Error::user(format!(
                "provider {} does not support instance enumeration",
                self.name()
            )))
        })
    }

    fn generate_topology_config<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        instances: &'a ComputeInstanceSet,
    ) -> BoxFuture<'a, Result<Vertex, Error>>;
}

/// Flattens a [`ComputeInstanceSet`] into `(instance_id, node_name)`
/// pairs, used by builtins to know which instance ids to request and
/// which fell through to "no-topology".
pub fn flatten_instances(nodes: &ComputeInstanceSet) -> Vec<(String, String)> {
    nodes
        .iter()
        .flat_map(|group| group.instances.iter().map(|(id, name)| (id.clone(), name.clone())))
        .collect()
}
