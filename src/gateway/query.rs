//! Read-only SPARQL passthrough

use crate::error::{GatewayError, GraphError, Result};
use crate::store::{GraphClient, ResultStream, TxnMode};
use spargebra::{Query, SparqlParser};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone)]
pub struct QueryGateway {
    client: Arc<dyn GraphClient>,
}

impl QueryGateway {
    pub fn new(client: Arc<dyn GraphClient>) -> Self {
        Self { client }
    }

    /// Runs a SELECT query and streams its `application/sparql-results+json`
    /// answer. Anything other than a SELECT is rejected before the store is
    /// contacted.
    pub async fn query(&self, query: &str) -> Result<ResultStream> {
        check_select(query)?;
        let mut txn = self.client.begin(TxnMode::Read).await.map_err(log_failure)?;
        let stream = match txn.select_stream(query).await {
            Ok(stream) => stream,
            Err(err) => {
                let _ = txn.abort().await;
                return Err(log_failure(err));
            }
        };
        txn.commit().await.map_err(log_failure)?;
        debug!(op = "query", "streaming query results");
        Ok(stream)
    }
}

fn log_failure(err: GraphError) -> GatewayError {
    error!(op = "query", error = %err, "store operation failed");
    err.into()
}

/// Accepts only parseable SELECT queries
pub fn check_select(query: &str) -> Result<()> {
    let parsed = SparqlParser::new()
        .parse_query(query)
        .map_err(|e| GatewayError::InvalidQuery(e.to_string()))?;
    let form = match parsed {
        Query::Select { .. } => return Ok(()),
        Query::Construct { .. } => "CONSTRUCT",
        Query::Ask { .. } => "ASK",
        Query::Describe { .. } => "DESCRIBE",
    };
    Err(GatewayError::InvalidQuery(format!("{} queries are not supported", form)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_select_is_accepted() {
        assert!(check_select("SELECT ?s WHERE { ?s ?p ?o }").is_ok());
        let prefixed = "PREFIX ex: <http://ex.org/> SELECT * WHERE { ?s ex:name ?n } LIMIT 3";
        assert!(check_select(prefixed).is_ok());

        for query in [
            "ASK { ?s ?p ?o }",
            "CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }",
            "DESCRIBE <http://ex.org/a>",
            "DELETE WHERE { ?s ?p ?o }",
            "INSERT DATA { <http://ex.org/a> <http://ex.org/b> <http://ex.org/c> }",
            "not sparql at all",
            "",
        ] {
            let checked = check_select(query);
            assert!(
                matches!(checked, Err(GatewayError::InvalidQuery(_))),
                "{} was accepted",
                query
            );
        }
    }
}
