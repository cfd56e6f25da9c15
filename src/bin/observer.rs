use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use topograph::config::ServiceConfig;
use topograph::observer::{self, ObserverConfig};

#[derive(Parser, Debug)]
#[command(name = "topograph-observer", version)]
struct Cli {
    /// Path to the service configuration YAML (reused for provider/engine
    /// defaults and `forward_service_url`).
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Label prefix the orchestrator engine writes switch labels under.
    #[arg(long, default_value = "topology.topograph.io")]
    label_prefix: String,

    /// Quiet interval after the last node event before posting `/v1/generate`.
    #[arg(long, default_value = "5")]
    debounce_seconds: u64,
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

    let forward_service_url = match config.forward_service_url {
        Some(url) => url,
        None => {
            tracing::error!("config.forward_service_url is required for the observer");
            std::process::exit(1);
        }
    };

    let client = match kube::Client::try_default().await {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "failed to build in-cluster kube client");
            std::process::exit(2);
        }
    };

    let observer_config = ObserverConfig {
        forward_service_url,
        provider_name: config.provider.name.clone(),
        engine_name: config.engine.name.clone(),
        label_prefix: cli.label_prefix,
        debounce: Duration::from_secs(cli.debounce_seconds),
    };

    tracing::info!("topograph-observer watching nodes");
    observer::run(client, observer_config).await;
}
