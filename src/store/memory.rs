//! Embedded in-memory graph store backed by Oxigraph.
//!
//! Used by the test suite and by `--store-kind memory` deployments that do
//! not need an external triple store. Reads evaluate against the live store;
//! queued writes are applied on commit as one SPARQL update, which Oxigraph
//! executes in a single storage transaction. Evaluation is synchronous in
//! Oxigraph and always runs on the blocking thread pool.

use super::results::SolutionsWriter;
use super::{
    sparql, Bindings, GraphClient, GraphTransaction, ResultStream, TxnMode, WriteBuffer, WriteGate,
};
use crate::error::GraphError;
use crate::model::Statement;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedMutexGuard};

/// Result chunks buffered between the evaluating thread and the consumer
const STREAM_BUFFER: usize = 32;

pub struct MemoryGraphClient {
    store: Store,
    gate: WriteGate,
}

impl MemoryGraphClient {
    pub fn new() -> Result<Self, GraphError> {
        Self::with_gate_timeout(Duration::from_secs(10))
    }

    pub fn with_gate_timeout(timeout: Duration) -> Result<Self, GraphError> {
        let store = Store::new().map_err(store_error)?;
        Ok(Self {
            store,
            gate: WriteGate::new(timeout),
        })
    }

    /// Number of statements currently stored
    pub fn len(&self) -> Result<usize, GraphError> {
        self.store.len().map_err(store_error)
    }

    pub fn is_empty(&self) -> Result<bool, GraphError> {
        self.store.is_empty().map_err(store_error)
    }
}

#[async_trait]
impl GraphClient for MemoryGraphClient {
    async fn begin(&self, mode: TxnMode) -> Result<Box<dyn GraphTransaction>, GraphError> {
        let guard = match mode {
            TxnMode::Write => Some(self.gate.acquire().await?),
            TxnMode::Read => None,
        };
        Ok(Box::new(MemoryTransaction {
            store: self.store.clone(),
            mode,
            pending: WriteBuffer::default(),
            guard,
        }))
    }
}

struct MemoryTransaction {
    store: Store,
    mode: TxnMode,
    pending: WriteBuffer,
    guard: Option<OwnedMutexGuard<()>>,
}

fn store_error(err: impl Display) -> GraphError {
    GraphError::Store(err.to_string())
}

fn evaluate<'a>(store: &'a Store, query: &str) -> Result<QueryResults<'a>, GraphError> {
    SparqlEvaluator::new()
        .parse_query(query)
        .map_err(store_error)?
        .on_store(store)
        .execute()
        .map_err(store_error)
}

/// Runs `work` on the blocking pool so evaluation never stalls a runtime worker
async fn off_runtime<T, F>(work: F) -> Result<T, GraphError>
where
    F: FnOnce() -> Result<T, GraphError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(store_error)?
}

/// Evaluates a SELECT query and feeds the serialized document into `tx`.
///
/// Stops early without error once the receiving side is gone.
fn stream_solutions(
    store: &Store,
    query: &str,
    tx: &mpsc::Sender<Result<Bytes, GraphError>>,
) -> Result<(), GraphError> {
    let QueryResults::Solutions(solutions) = evaluate(store, query)? else {
        return Err(GraphError::Protocol("query did not produce solutions".to_string()));
    };
    let variables: Vec<String> =
        solutions.variables().iter().map(|v| v.as_str().to_string()).collect();
    let mut writer = SolutionsWriter::new();
    if tx.blocking_send(Ok(writer.head(&variables))).is_err() {
        return Ok(());
    }
    for solution in solutions {
        let solution = solution.map_err(store_error)?;
        let chunk = writer.row(solution.iter().map(|(var, term)| (var.as_str(), term)));
        if tx.blocking_send(Ok(chunk)).is_err() {
            return Ok(());
        }
    }
    let _ = tx.blocking_send(Ok(writer.finish()));
    Ok(())
}

#[async_trait]
impl GraphTransaction for MemoryTransaction {
    async fn ask(&mut self, query: &str) -> Result<bool, GraphError> {
        let store = self.store.clone();
        let query = query.to_string();
        off_runtime(move || match evaluate(&store, &query)? {
            QueryResults::Boolean(value) => Ok(value),
            _ => Err(GraphError::Protocol("query did not produce a boolean".to_string())),
        })
        .await
    }

    async fn select(
        &mut self,
        query: &str,
        on_row: &mut (dyn FnMut(Bindings) + Send),
    ) -> Result<(), GraphError> {
        let store = self.store.clone();
        let query = query.to_string();
        let rows = off_runtime(move || {
            let QueryResults::Solutions(solutions) = evaluate(&store, &query)? else {
                return Err(GraphError::Protocol("query did not produce solutions".to_string()));
            };
            solutions
                .map(|solution| {
                    let solution = solution.map_err(store_error)?;
                    Ok(solution
                        .iter()
                        .map(|(var, term)| (var.as_str().to_string(), term.clone()))
                        .collect::<Bindings>())
                })
                .collect::<Result<Vec<_>, GraphError>>()
        })
        .await?;
        for row in rows {
            on_row(row);
        }
        Ok(())
    }

    async fn select_stream(&mut self, query: &str) -> Result<ResultStream, GraphError> {
        let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);
        let store = self.store.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = stream_solutions(&store, &query, &tx) {
                let _ = tx.blocking_send(Err(err));
            }
        });

        // evaluation errors surface before any byte is streamed
        let first = match rx.recv().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => return Err(err),
            None => {
                return Err(GraphError::Store("query evaluation ended without output".to_string()))
            }
        };
        let rest =
            stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        Ok(stream::once(async move { Ok(first) }).chain(rest).boxed())
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
        let MemoryTransaction { store, pending, guard, .. } = *self;
        let Some(request) = pending.into_request() else {
            return Ok(());
        };
        // runs to completion even if the caller stops polling
        off_runtime(move || {
            let result = SparqlEvaluator::new()
                .parse_update(&request)
                .map_err(store_error)?
                .on_store(&store)
                .execute()
                .map_err(store_error);
            drop(guard);
            result
        })
        .await
    }

    async fn abort(self: Box<Self>) -> Result<(), GraphError> {
        Ok(())
    }
}
