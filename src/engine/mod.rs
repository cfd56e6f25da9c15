//! Engine interface and built-in engines (spec §4.F).

pub mod batch;
pub mod batch_in_orchestrator;
pub mod orchestrator;
pub mod test_engine;

use crate::error::Error;
use crate::graph::Vertex;
use crate::metrics::Metrics;
use crate::model::ComputeInstanceSet;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Everything an engine call needs to deliver rendered output.
pub struct EngineContext {
    pub metrics: Arc<Metrics>,
    pub kube_client: Option<kube::Client>,
}

impl EngineContext {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            kube_client: None,
        }
    }

    pub fn with_kube_client(mut self, client: kube::Client) -> Self {
        self.kube_client = Some(client);
        self
    }
}

/// A scheduler or orchestrator-facing sink that turns a built graph into
/// whatever that consumer expects (file, label writes, a config object,
/// or plain bytes for the caller to forward).
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    /// Optional: returns the instances the engine itself knows about for
    /// the given environment (e.g. a Kubernetes namespace). Unsupported
    /// by default.
    fn get_compute_instances<'a>(
        &'a self,
        _ctx: &'a EngineContext,
        _environment: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<ComputeInstanceSet, Error>> {
        Box::pin(async move {
            Err(Error::user(format!(
                "engine {} does not support instance enumeration",
                self.name()
            )))
        })
    }

    fn generate_output<'a>(
        &'a self,
        ctx: &'a EngineContext,
        root: &'a Vertex,
        params: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Vec<u8>, Error>>;
}

/// Parses a [`crate::render::RendererConfig`] out of an engine's free-form
/// `params`, the shape every builtin engine shares before handing off to
/// the renderer.
pub fn parse_renderer_config(params: &serde_json::Value) -> Result<crate::render::RendererConfig, Error> {
    if params.is_null() {
        return Ok(crate::render::RendererConfig::default());
    }
    serde_json::from_value(params.clone()).map_err(|e| Error::user(e.to_string()))
}
