use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use topograph::config::ServiceConfig;
use topograph::engine::batch::BatchSchedulerEngine;
use topograph::engine::batch_in_orchestrator::BatchInOrchestratorEngine;
use topograph::engine::orchestrator::OrchestratorEngine;
use topograph::engine::test_engine::TestEngine;
use topograph::engine::Engine;
use topograph::metrics::Metrics;
use topograph::provider::aws::AwsProvider;
use topograph::provider::baremetal::BaremetalProvider;
use topograph::provider::dra::DraProvider;
use topograph::provider::gcp::GcpProvider;
use topograph::provider::oci::OciProvider;
use topograph::provider::test_provider::TestProvider;
use topograph::provider::Provider;
use topograph::queue::Queue;
use topograph::registry::Registry;
use topograph::router::{build_regeneration_handler, new_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "topograph", version)]
struct Cli {
    /// Path to the service configuration YAML.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,
}

fn build_provider_registry() -> Registry<dyn Provider> {
    let mut registry: Registry<dyn Provider> = Registry::new();
    registry.register("aws", Arc::new(AwsProvider::new()));
    registry.register("gcp", Arc::new(GcpProvider::new()));
    registry.register("oci", Arc::new(OciProvider::new()));
    registry.register("baremetal", Arc::new(BaremetalProvider::new()));
    registry.register("dra", Arc::new(DraProvider::new()));
    registry.register("test", Arc::new(TestProvider::default_model()));
    registry
}

fn build_engine_registry() -> Registry<dyn Engine> {
    let mut registry: Registry<dyn Engine> = Registry::new();
    registry.register("batch-scheduler", Arc::new(BatchSchedulerEngine::new()));
    registry.register("orchestrator", Arc::new(OrchestratorEngine::new()));
    registry.register("batch-in-orchestrator", Arc::new(BatchInOrchestratorEngine::new()));
    registry.register("test", Arc::new(TestEngine::new()));
    registry
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().compact().init();
    let cli = Cli::parse();

    let config = match ServiceConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err.message(), "failed to load configuration");
            std::process::exit(1);
        }
    };
    let config = Arc::new(config);

    let kube_client = match kube::Client::try_default().await {
        Ok(client) => Some(client),
        Err(err) => {
            tracing::warn!(error = %err, "no in-cluster kube client available; dra/orchestrator engines will fail if used");
            None
        }
    };

    let providers = Arc::new(build_provider_registry());
    let engines = Arc::new(build_engine_registry());
    let metrics = Arc::new(Metrics::new(env!("CARGO_PKG_VERSION")));

    let handler = build_regeneration_handler(
        providers.clone(),
        engines.clone(),
        metrics.clone(),
        kube_client.clone(),
        config.page_size,
    );
    let queue = Queue::new(config.request_aggregation_delay, config.request_history_size, handler);

    let state = AppState {
        providers,
        engines,
        queue: queue.clone(),
        metrics,
        config: config.clone(),
    };

    let router = new_router(state).into_make_service_with_connect_info::<std::net::SocketAddr>();
    let addr = format!("0.0.0.0:{}", config.http.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind HTTP listener");
            std::process::exit(2);
        }
    };

    tracing::info!(%addr, "topograph listening");
    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        tracing::error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
    queue.shutdown();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
