//! HTTP client for remote SPARQL 1.1 protocol endpoints (Apache Jena Fuseki,
//! Oxigraph server).

use super::results::{parse_boolean, parse_solutions};
use super::{
    sparql, Bindings, GraphClient, GraphTransaction, ResultStream, TxnMode, WriteBuffer, WriteGate,
    SPARQL_RESULTS_JSON,
};
use crate::config::{StoreConfig, StoreKind};
use crate::error::GraphError;
use crate::model::Statement;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Remote graph store reached over the SPARQL protocol
#[derive(Debug, Clone)]
pub struct HttpGraphClient {
    endpoint: SparqlEndpoint,
    client: Client,
    gate: WriteGate,
}

/// Resolved protocol URLs of one remote store
#[derive(Debug, Clone)]
struct SparqlEndpoint {
    url: String,
    kind: StoreKind,
    auth_token: Option<String>,
}

impl SparqlEndpoint {
    fn query_url(&self) -> String {
        match self.kind {
            StoreKind::Jena => format!("{}/sparql", self.url.trim_end_matches('/')),
            StoreKind::Oxigraph | StoreKind::Memory => {
                format!("{}/query", self.url.trim_end_matches('/'))
            }
        }
    }

    fn update_url(&self) -> String {
        format!("{}/update", self.url.trim_end_matches('/'))
    }
}

impl HttpGraphClient {
    pub fn new(config: &StoreConfig) -> Result<Self, GraphError> {
        if config.kind == StoreKind::Memory {
            return Err(GraphError::Config(
                "the memory store is not reached over HTTP".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GraphError::Config(e.to_string()))?;

        Ok(Self {
            endpoint: SparqlEndpoint {
                url: config.url.clone(),
                kind: config.kind,
                auth_token: config.auth_token.clone(),
            },
            client,
            gate: WriteGate::new(config.write_gate_timeout),
        })
    }

    pub fn query_url(&self) -> String {
        self.endpoint.query_url()
    }

    pub fn update_url(&self) -> String {
        self.endpoint.update_url()
    }

    fn add_auth_header(&self, request: RequestBuilder) -> RequestBuilder {
        add_auth_header(&self.endpoint, request)
    }

    /// Sends a query and returns the successful response
    async fn send_query(&self, query: &str) -> Result<Response, GraphError> {
        let request = self.add_auth_header(self.client.post(self.endpoint.query_url()));
        let request = match self.endpoint.kind {
            // Fuseki takes the query as a form parameter
            StoreKind::Jena => request.form(&[("query", query)]),
            StoreKind::Oxigraph | StoreKind::Memory => {
                request.header("Content-Type", "application/sparql-query").body(query.to_string())
            }
        };
        let response = request.header("Accept", SPARQL_RESULTS_JSON).send().await?;
        check_status("Query", response).await
    }
}

fn add_auth_header(endpoint: &SparqlEndpoint, request: RequestBuilder) -> RequestBuilder {
    if let Some(token) = &endpoint.auth_token {
        request.header("Authorization", format!("Bearer {}", token))
    } else {
        request
    }
}

async fn check_status(operation: &'static str, response: Response) -> Result<Response, GraphError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    Err(GraphError::Status {
        operation,
        status,
        body,
    })
}

/// Posts one update request. Runs on its own task so that a commit that has
/// started is not cut short when the caller goes away.
async fn send_update(
    client: Client,
    endpoint: SparqlEndpoint,
    update: String,
    guard: Option<OwnedMutexGuard<()>>,
) -> Result<(), GraphError> {
    let task = tokio::spawn(async move {
        let request = add_auth_header(&endpoint, client.post(endpoint.update_url()));
        let request = match endpoint.kind {
            StoreKind::Jena => request.form(&[("update", update.as_str())]),
            StoreKind::Oxigraph | StoreKind::Memory => {
                request.header("Content-Type", "application/sparql-update").body(update)
            }
        };
        let result = match request.send().await {
            Ok(response) => check_status("Update", response).await.map(|_| ()),
            Err(err) => Err(GraphError::from(err)),
        };
        drop(guard);
        result
    });
    task.await.map_err(|e| GraphError::Http(e.to_string()))?
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    async fn begin(&self, mode: TxnMode) -> Result<Box<dyn GraphTransaction>, GraphError> {
        let guard = match mode {
            TxnMode::Write => Some(self.gate.acquire().await?),
            TxnMode::Read => None,
        };
        Ok(Box::new(HttpTransaction {
            client: self.clone(),
            mode,
            pending: WriteBuffer::default(),
            guard,
        }))
    }
}

struct HttpTransaction {
    client: HttpGraphClient,
    mode: TxnMode,
    pending: WriteBuffer,
    guard: Option<OwnedMutexGuard<()>>,
}

#[async_trait]
impl GraphTransaction for HttpTransaction {
    async fn ask(&mut self, query: &str) -> Result<bool, GraphError> {
        let body = self.client.send_query(query).await?.bytes().await?;
        parse_boolean(&body)
    }

    async fn select(
        &mut self,
        query: &str,
        on_row: &mut (dyn FnMut(Bindings) + Send),
    ) -> Result<(), GraphError> {
        let body = self.client.send_query(query).await?.bytes().await?;
        for row in parse_solutions(&body)? {
            on_row(row);
        }
        Ok(())
    }

    async fn select_stream(&mut self, query: &str) -> Result<ResultStream, GraphError> {
        let response = self.client.send_query(query).await?;
        Ok(response.bytes_stream().map(|chunk| chunk.map_err(GraphError::from)).boxed())
    }

    async fn update(&mut self, update: &str) -> Result<(), GraphError> {
        self.pending.push(self.mode, update.to_string())
    }

    async fn load(&mut self, statements: &[Statement]) -> Result<(), GraphError> {
        if statements.is_empty() {
            return Ok(());
        }
        self.pending.push(self.mode, sparql::insert_data(statements))
    }

    async fn commit(self: Box<Self>) -> Result<(), GraphError> {
        let HttpTransaction { client, pending, guard, .. } = *self;
        let operations = pending.len();
        let Some(request) = pending.into_request() else {
            return Ok(());
        };
        debug!(operations, "committing update request");
        send_update(client.client, client.endpoint, request, guard).await
    }

    async fn abort(self: Box<Self>) -> Result<(), GraphError> {
        debug!(discarded = self.pending.len(), "aborting transaction");
        Ok(())
    }
}
