//! Graph store clients
//!
//! A [`GraphClient`] opens [`GraphTransaction`]s against a SPARQL store. The
//! gateways only ever talk to these two traits, so the remote SPARQL protocol
//! client and the embedded Oxigraph store are interchangeable.
//!
//! Transactions follow a begin → body → commit|abort lifecycle. Dropping a
//! transaction without committing ends it and behaves like an abort.
//!
//! Writes issued inside a transaction are buffered and reach the store on
//! commit as one SPARQL update request, which the store applies atomically.
//! Write transactions are serialised per client by a [`WriteGate`]. The gate
//! does not span processes, so writes that must not race with other clients
//! of the same store carry their precondition inside the update itself.

pub mod http_client;
pub mod memory;
pub mod results;
pub mod sparql;

use crate::error::GraphError;
use crate::model::Statement;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use oxigraph::model::Term;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One row of a SELECT result, keyed by variable name
pub type Bindings = HashMap<String, Term>;

/// Chunks of an `application/sparql-results+json` document
pub type ResultStream = BoxStream<'static, Result<Bytes, GraphError>>;

/// Media type of the SPARQL JSON results format
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    Read,
    Write,
}

/// Factory for store transactions
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Starts a transaction. Write transactions wait for the client's write gate.
    async fn begin(&self, mode: TxnMode) -> Result<Box<dyn GraphTransaction>, GraphError>;
}

/// A single store transaction
#[async_trait]
pub trait GraphTransaction: Send {
    async fn ask(&mut self, query: &str) -> Result<bool, GraphError>;

    /// Runs a SELECT query and hands every row to `on_row`
    async fn select(
        &mut self,
        query: &str,
        on_row: &mut (dyn FnMut(Bindings) + Send),
    ) -> Result<(), GraphError>;

    /// Runs a SELECT query and returns the serialized results document as a stream
    async fn select_stream(&mut self, query: &str) -> Result<ResultStream, GraphError>;

    /// Queues a SPARQL update for commit
    async fn update(&mut self, update: &str) -> Result<(), GraphError>;

    /// Queues the insertion of `statements` for commit
    async fn load(&mut self, statements: &[Statement]) -> Result<(), GraphError>;

    async fn commit(self: Box<Self>) -> Result<(), GraphError>;

    async fn abort(self: Box<Self>) -> Result<(), GraphError>;
}

/// Serialises write transactions of one client
#[derive(Debug, Clone)]
pub struct WriteGate {
    lock: Arc<Mutex<()>>,
    timeout: Duration,
}

impl WriteGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            timeout,
        }
    }

    /// Waits at most the configured timeout for exclusive write access
    pub async fn acquire(&self) -> Result<OwnedMutexGuard<()>, GraphError> {
        tokio::time::timeout(self.timeout, Arc::clone(&self.lock).lock_owned())
            .await
            .map_err(|_| {
                GraphError::Timeout(format!("write gate not acquired within {:?}", self.timeout))
            })
    }
}

/// Updates queued by a transaction until commit
#[derive(Debug, Default)]
pub struct WriteBuffer {
    operations: Vec<String>,
}

impl WriteBuffer {
    pub fn push(&mut self, mode: TxnMode, operation: String) -> Result<(), GraphError> {
        if mode == TxnMode::Read {
            return Err(GraphError::ReadOnly);
        }
        self.operations.push(operation);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// The whole buffer as one update request, `None` when nothing was queued
    pub fn into_request(self) -> Option<String> {
        if self.operations.is_empty() {
            None
        } else {
            Some(sparql::join_updates(&self.operations))
        }
    }
}
