//! Deterministic test engine: renders exactly like the batch-scheduler
//! engine but never touches the filesystem or the cluster, for use in
//! HTTP pipeline scenario tests (spec §4.F "test engine", Open Question
//! (b), unified with no duplicate wrapper).

use super::{parse_renderer_config, Engine, EngineContext};
use crate::error::Error;
use crate::graph::Vertex;
use crate::render;
use futures::future::BoxFuture;

pub struct TestEngine;

impl TestEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for TestEngine {
    fn name(&self) -> &str {
        "test"
    }

    fn generate_output<'a>(
        &'a self,
        ctx: &'a EngineContext,
        root: &'a Vertex,
        params: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        Box::pin(async move {
            let config = parse_renderer_config(params)?;
            render::render(root, &config, &ctx.metrics)
        })
    }
}
