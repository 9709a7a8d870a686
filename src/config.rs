//! Configuration structures for the service and its graph store

use std::time::Duration;

/// Namespace used for predicate, type and subject URIs unless configured otherwise
pub const DEFAULT_NAMESPACE: &str = "http://cauldron.systems/graph/";

/// Path under which the REST resources are mounted
pub const DEFAULT_API_ROOT: &str = "/graph";

/// Which graph store backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    /// Apache Jena Fuseki (`/sparql`, `/update`, form-encoded)
    Jena,
    /// Oxigraph server (`/query`, `/update`, raw SPARQL bodies)
    Oxigraph,
    /// Embedded in-memory Oxigraph store
    Memory,
}

/// Connection settings for the graph store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub kind: StoreKind,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub write_gate_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3030/dataset".to_string(),
            kind: StoreKind::Jena,
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            write_gate_timeout: Duration::from_secs(10),
        }
    }
}

/// Top level service configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_root: String,
    /// Externally visible URL of the API root, used for `Location` headers
    pub public_url: Option<String>,
    pub namespace: String,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            api_root: DEFAULT_API_ROOT.to_string(),
            public_url: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Socket address the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Public URL of the API root without a trailing slash
    pub fn api_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}{}", self.server_url(), self.normalized_api_root()),
        }
    }

    /// API root with a leading slash and no trailing slash; empty for `/`
    pub fn normalized_api_root(&self) -> String {
        let trimmed = self.api_root.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}
