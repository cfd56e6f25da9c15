//! Batch-scheduler engine: renders tree or block text and either writes
//! it to a filesystem path or hands it back for the caller to forward
//! (spec §4.F "batch-scheduler engine").

use super::{parse_renderer_config, Engine, EngineContext};
use crate::error::Error;
use crate::graph::Vertex;
use crate::render;
use futures::future::BoxFuture;

pub struct BatchSchedulerEngine;

impl BatchSchedulerEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BatchSchedulerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for BatchSchedulerEngine {
    fn name(&self) -> &str {
        "batch-scheduler"
    }

    fn generate_output<'a>(
        &'a self,
        ctx: &'a EngineContext,
        root: &'a Vertex,
        params: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        Box::pin(async move {
            let config = parse_renderer_config(params)?;
            let bytes = render::render(root, &config, &ctx.metrics)?;
            if let Some(path) = params.get("output_path").and_then(|v| v.as_str()) {
                tokio::fs::write(path, &bytes)
                    .await
                    .map_err(|e| Error::fatal(format!("writing {path}: {e}")))?;
            }
            Ok(bytes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_rendered_bytes_without_output_path() {
        let mut root = Vertex::root();
        let tree = root.tree_mut();
        let mut s1 = Vertex::new("S1");
        s1.add_child(Vertex::leaf("Node1"));
        tree.add_child(s1);

        let ctx = EngineContext::new(Arc::new(Metrics::new("test")));
        let engine = BatchSchedulerEngine::new();
        let params = serde_json::json!({"plugin": "tree"});
        let bytes = engine.generate_output(&ctx, &root, &params).await.unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("SwitchName=S1"));
    }
}
