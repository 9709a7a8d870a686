//! Entity Graph HTTP server
//!
//! Usage:
//!   cargo run -- --host 0.0.0.0 --port 8080 \
//!     --store-url http://localhost:3030/dataset --store-kind jena
//!   cargo run -- --store-kind memory

use clap::Parser;
use entity_graph::{
    config::{ServerConfig, StoreConfig, StoreKind, DEFAULT_API_ROOT, DEFAULT_NAMESPACE},
    http::start_server,
    store::{http_client::HttpGraphClient, memory::MemoryGraphClient, GraphClient},
};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "entity-graph")]
#[command(
    about = "REST gateway for typed entities stored in an RDF triple store",
    long_about = None
)]
struct Args {
    #[arg(short = 'H', long, env = "ENTITY_GRAPH_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, env = "ENTITY_GRAPH_PORT", default_value = "8080")]
    port: u16,

    /// Path the REST resources are mounted under
    #[arg(long, env = "ENTITY_GRAPH_API_ROOT", default_value = DEFAULT_API_ROOT)]
    api_root: String,

    /// Externally visible URL of the API root, used in Location headers
    #[arg(long, env = "ENTITY_GRAPH_PUBLIC_URL")]
    public_url: Option<String>,

    /// Namespace of entity types, predicates and subjects
    #[arg(long, env = "ENTITY_GRAPH_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Base URL of the SPARQL dataset
    #[arg(long, env = "ENTITY_GRAPH_STORE_URL", default_value = "http://localhost:3030/dataset")]
    store_url: String,

    #[arg(long, env = "ENTITY_GRAPH_STORE_KIND", value_enum, default_value = "jena")]
    store_kind: StoreKind,

    /// Bearer token sent with every store request
    #[arg(long, env = "ENTITY_GRAPH_STORE_TOKEN")]
    store_token: Option<String>,

    #[arg(long, env = "ENTITY_GRAPH_STORE_TIMEOUT_SECS", default_value = "30")]
    store_timeout_secs: u64,

    #[arg(long, env = "ENTITY_GRAPH_WRITE_GATE_TIMEOUT_SECS", default_value = "10")]
    write_gate_timeout_secs: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            api_root: self.api_root,
            public_url: self.public_url,
            namespace: self.namespace,
            store: StoreConfig {
                url: self.store_url,
                kind: self.store_kind,
                auth_token: self.store_token,
                request_timeout: Duration::from_secs(self.store_timeout_secs),
                write_gate_timeout: Duration::from_secs(self.write_gate_timeout_secs),
            },
        }
    }
}

fn build_client(store: &StoreConfig) -> Result<Arc<dyn GraphClient>, Box<dyn std::error::Error>> {
    let client: Arc<dyn GraphClient> = match store.kind {
        StoreKind::Memory => {
            Arc::new(MemoryGraphClient::with_gate_timeout(store.write_gate_timeout)?)
        }
        StoreKind::Jena | StoreKind::Oxigraph => Arc::new(HttpGraphClient::new(store)?),
    };
    Ok(client)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("entity_graph=info,tower_http=debug")),
        )
        .init();

    let config = Args::parse().into_config();

    info!(kind = ?config.store.kind, url = %config.store.url, "connecting graph store");
    let client = build_client(&config.store)?;

    // Set up graceful shutdown
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received, stopping server");
    };

    if let Err(e) = start_server(&config, client, shutdown_signal).await {
        error!(error = %e, "server error");
        return Err(e);
    }
    info!("server shut down gracefully");

    Ok(())
}
