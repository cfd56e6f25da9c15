//! End-to-end HTTP pipeline coverage against a live `axum::serve`
//! instance bound to an ephemeral port, driven with `reqwest`, the same
//! split the teacher uses between the in-process router and an external
//! client, just without the k3s container the teacher's functional suite
//! spins up (this crate's HTTP surface needs no live cluster to exercise).

use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use topograph::engine::test_engine::TestEngine;
use topograph::engine::Engine;
use topograph::metrics::Metrics;
use topograph::provider::test_provider::TestProvider;
use topograph::provider::Provider;
use topograph::queue::Queue;
use topograph::registry::Registry;
use topograph::router::{build_regeneration_handler, new_router, AppState};

async fn spawn_server(delay: Duration) -> (String, Arc<Queue>) {
    let mut providers: Registry<dyn Provider> = Registry::new();
    providers.register("test", Arc::new(TestProvider::default_model()));
    let providers = Arc::new(providers);

    let mut engines: Registry<dyn Engine> = Registry::new();
    engines.register("test", Arc::new(TestEngine::new()));
    let engines = Arc::new(engines);

    let metrics = Arc::new(Metrics::new("test"));
    let handler = build_regeneration_handler(providers.clone(), engines.clone(), metrics.clone(), None, None);
    let queue = Queue::new(delay, 100, handler);

    let config_yaml = "http:\n  port: 0\nrequest_aggregation_delay: 1\nprovider:\n  name: test\nengine:\n  name: test\n";
    let config: topograph::config::ServiceConfig = serde_yaml::from_str(config_yaml).unwrap();

    let state = AppState {
        providers,
        engines,
        queue: queue.clone(),
        metrics,
        config: Arc::new(config),
    };
    let router = new_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), queue)
}

#[tokio::test]
async fn bad_generate_response_code_short_circuits_without_enqueueing() {
    let (base, queue) = spawn_server(Duration::from_secs(60)).await;
    let client = reqwest::Client::new();

    let body = json!({
        "provider": {"name": "test", "params": {"generateResponseCode": 500, "message": "boom"}},
        "engine": {"name": "test"},
    });
    let resp = client.post(format!("{base}/v1/generate")).json(&body).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 500);
    let parsed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(parsed["message"], "boom");

    // nothing was queued: looking the request up by content hash finds nothing.
    let req: topograph::model::TopologyRequest = serde_json::from_value(json!({
        "provider": {"name": "test"},
        "engine": {"name": "test"},
    }))
    .unwrap();
    let record = queue.get(&req.content_hash());
    assert_eq!(record.status, 404);
}

#[tokio::test]
async fn duplicate_generate_requests_share_one_id_and_topology_returns_the_render() {
    let (base, _queue) = spawn_server(Duration::from_millis(50)).await;
    let client = reqwest::Client::new();

    let body = json!({
        "provider": {"name": "test"},
        "engine": {"name": "test"},
    });
    let first = client.post(format!("{base}/v1/generate")).json(&body).send().await.unwrap();
    assert_eq!(first.status().as_u16(), 202);
    let first_id = first.json::<serde_json::Value>().await.unwrap()["id"].as_str().unwrap().to_string();

    let second = client.post(format!("{base}/v1/generate")).json(&body).send().await.unwrap();
    assert_eq!(second.status().as_u16(), 202);
    let second_id = second.json::<serde_json::Value>().await.unwrap()["id"].as_str().unwrap().to_string();
    assert_eq!(first_id, second_id);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let topology = client
        .get(format!("{base}/v1/topology"))
        .query(&[("uid", first_id.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(topology.status().as_u16(), 200);
    let text = topology.text().await.unwrap();
    assert!(text.contains("SwitchName=S1"));
}

#[tokio::test]
async fn lookup_of_unknown_uid_returns_not_found() {
    let (base, _queue) = spawn_server(Duration::from_secs(60)).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/v1/topology"))
        .query(&[("uid", "unknown")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let parsed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(parsed["message"], "request ID unknown not found");
}

#[tokio::test]
async fn healthz_and_metrics_respond() {
    let (base, _queue) = spawn_server(Duration::from_secs(60)).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(health.status().as_u16(), 200);

    let metrics = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert_eq!(metrics.status().as_u16(), 200);
}
