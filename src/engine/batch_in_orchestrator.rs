//! Batch-inside-orchestrator engine: renders to a text blob and writes it
//! into a `ConfigMap` named by namespace + name, fetching first and
//! merging on hit, creating on a clean "not found" miss (spec §4.F),
//! grounded on Materialize's `ensure_service` fetch-or-create pattern.

use super::{parse_renderer_config, Engine, EngineContext};
use crate::error::Error;
use crate::graph::Vertex;
use crate::render;
use chrono::Utc;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams, PostParams};
use std::collections::BTreeMap;

const MANAGED_BY: &str = "topograph";
const DATA_KEY: &str = "topology";

pub struct BatchInOrchestratorEngine;

impl BatchInOrchestratorEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BatchInOrchestratorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for BatchInOrchestratorEngine {
    fn name(&self) -> &str {
        "batch-in-orchestrator"
    }

    fn generate_output<'a>(
        &'a self,
        ctx: &'a EngineContext,
        root: &'a Vertex,
        params: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        Box::pin(async move {
            let client = ctx.kube_client.clone().ok_or_else(|| {
                Error::fatal("batch-in-orchestrator engine requires an in-cluster kube client")
            })?;
            let namespace = params
                .get("namespace")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::user("params.namespace is required"))?;
            let name = params
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::user("params.name is required"))?;

            let config = parse_renderer_config(params)?;
            let bytes = render::render(root, &config, &ctx.metrics)?;
            let text = String::from_utf8(bytes.clone())
                .map_err(|e| Error::fatal(format!("rendered output is not valid utf-8: {e}")))?;

            let config_maps: Api<ConfigMap> = Api::namespaced(client, namespace);
            let last_updated = Utc::now().to_rfc3339();

            match config_maps.get(name).await {
                Ok(_existing) => {
                    let mut data = BTreeMap::new();
                    data.insert(DATA_KEY.to_string(), text);
                    let mut annotations = BTreeMap::new();
                    annotations.insert("topograph.io/last-updated".to_string(), last_updated);
                    annotations.insert("topograph.io/managed-by".to_string(), MANAGED_BY.to_string());
                    let patch = serde_json::json!({
                        "data": data,
                        "metadata": { "annotations": annotations },
                    });
                    config_maps
                        .patch(name, &PatchParams::apply(MANAGED_BY), &Patch::Merge(&patch))
                        .await
                        .map_err(Error::from)?;
                }
                Err(kube::Error::Api(err)) if err.code == 404 => {
                    let mut data = BTreeMap::new();
                    data.insert(DATA_KEY.to_string(), text);
                    let mut annotations = BTreeMap::new();
                    annotations.insert("topograph.io/last-updated".to_string(), last_updated);
                    annotations.insert("topograph.io/managed-by".to_string(), MANAGED_BY.to_string());
                    let config_map = ConfigMap {
                        metadata: ObjectMeta {
                            name: Some(name.to_string()),
                            namespace: Some(namespace.to_string()),
                            annotations: Some(annotations),
                            ..Default::default()
                        },
                        data: Some(data),
                        ..Default::default()
                    };
                    config_maps
                        .create(&PostParams::default(), &config_map)
                        .await
                        .map_err(Error::from)?;
                }
                Err(err) => return Err(Error::fatal(format!("fetching config map {name}: {err}"))),
            }

            Ok(bytes)
        })
    }
}
