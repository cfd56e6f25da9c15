//! HTTP request pipeline: shared state and route wiring (spec §4.H).

use crate::config::ServiceConfig;
use crate::engine::Engine;
use crate::handlers;
use crate::metrics::Metrics;
use crate::middleware::track_request;
use crate::provider::Provider;
use crate::queue::Queue;
use crate::registry::Registry;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub providers: Arc<Registry<dyn Provider>>,
    pub engines: Arc<Registry<dyn Engine>>,
    pub queue: Arc<Queue>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<ServiceConfig>,
}

/// Builds the closure the aggregating queue invokes on fire: resolve
/// provider/engine from the registries, fetch or accept the supplied
/// node set, build the graph, then render it (spec §2 control flow
/// **E → C → F → D**).
pub fn build_regeneration_handler(
    providers: Arc<Registry<dyn Provider>>,
    engines: Arc<Registry<dyn Engine>>,
    metrics: Arc<Metrics>,
    kube_client: Option<kube::Client>,
    default_page_size: Option<u32>,
) -> crate::queue::Handler {
    Arc::new(move |req| {
        let providers = providers.clone();
        let engines = engines.clone();
        let metrics = metrics.clone();
        let kube_client = kube_client.clone();
        Box::pin(async move {
            let start = std::time::Instant::now();
            let provider = providers.get(&req.provider.name)?;
            let engine = engines.get(&req.engine.name)?;

            let mut provider_ctx = crate::provider::ProviderContext::new(
                req.provider.creds.clone(),
                req.provider.params.clone(),
            );
            provider_ctx.page_size = default_page_size;
            if let Some(client) = kube_client.clone() {
                provider_ctx = provider_ctx.with_kube_client(client);
            }

            let instances = if req.nodes.is_empty() {
                match provider.get_compute_instances(&provider_ctx).await {
                    Ok(instances) => instances,
                    Err(crate::error::Error::User(_)) => req.nodes.clone(),
                    Err(err) => return Err(err),
                }
            } else {
                req.nodes.clone()
            };

            let root = provider.generate_topology_config(&provider_ctx, &instances).await?;

            let mut engine_ctx = crate::engine::EngineContext::new(metrics.clone());
            if let Some(client) = kube_client {
                engine_ctx = engine_ctx.with_kube_client(client);
            }
            let bytes = engine.generate_output(&engine_ctx, &root, &req.engine.params).await;

            let status = match &bytes {
                Ok(_) => 200,
                Err(err) => err.status().as_u16(),
            };
            metrics.observe_request(&req.provider.name, &req.engine.name, status, start.elapsed());
            bytes
        })
    })
}

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/generate", post(handlers::generate))
        .route("/v1/topology", get(handlers::topology))
        .route("/v1/lookup", post(handlers::lookup))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(state.clone(), track_request)),
        )
        .with_state(state)
}
