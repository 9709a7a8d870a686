//! Exercises the SPARQL protocol client against a mock endpoint that records
//! every request and answers from an embedded Oxigraph store.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use entity_graph::config::{StoreConfig, StoreKind};
use entity_graph::gateway::{EntityGateway, QueryGateway};
use entity_graph::model::{PLACE, USER};
use entity_graph::store::http_client::HttpGraphClient;
use entity_graph::store::results::{boolean_document, SolutionsWriter};
use entity_graph::store::{GraphClient, TxnMode};
use entity_graph::GatewayError;
use futures_util::StreamExt;
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const NS: &str = "http://cauldron.systems/graph/";
const QUERY_DELAY: Duration = Duration::from_millis(200);

/// One request received by the mock endpoint
#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    content_type: String,
    authorization: Option<String>,
    sparql: String,
}

#[derive(Clone)]
struct MockEndpoint {
    store: Store,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockEndpoint {
    fn updates(&self) -> Vec<Recorded> {
        let requests = self.requests.lock().unwrap();
        requests.iter().filter(|r| r.path.ends_with("/update")).cloned().collect()
    }

    fn all(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Reads the SPARQL text from a form field or a raw body
fn sparql_text(headers: &HeaderMap, body: &Bytes, field: &str) -> String {
    let content_type = header(headers, "content-type").unwrap_or_default();
    if content_type.starts_with("application/x-www-form-urlencoded") {
        form_pairs(body).remove(field).unwrap_or_default()
    } else {
        String::from_utf8(body.to_vec()).unwrap()
    }
}

fn form_pairs(body: &Bytes) -> HashMap<String, String> {
    let query = String::from_utf8_lossy(body);
    let url = reqwest::Url::parse(&format!("http://mock/?{}", query)).unwrap();
    url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
}

fn record(mock: &MockEndpoint, path: &str, headers: &HeaderMap, sparql: &str) {
    mock.requests.lock().unwrap().push(Recorded {
        path: path.to_string(),
        content_type: header(headers, "content-type").unwrap_or_default(),
        authorization: header(headers, "authorization"),
        sparql: sparql.to_string(),
    });
}

fn answer_query(store: &Store, query: &str) -> Response {
    let results = match SparqlEvaluator::new().parse_query(query) {
        Ok(prepared) => prepared.on_store(store).execute(),
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let body = match results {
        Ok(QueryResults::Boolean(value)) => boolean_document(value).to_vec(),
        Ok(QueryResults::Solutions(solutions)) => {
            let variables: Vec<String> =
                solutions.variables().iter().map(|v| v.as_str().to_string()).collect();
            let mut writer = SolutionsWriter::new();
            let mut body = writer.head(&variables).to_vec();
            for solution in solutions {
                let solution = solution.unwrap();
                let row = writer.row(solution.iter().map(|(v, t)| (v.as_str(), t)));
                body.extend_from_slice(&row);
            }
            body.extend_from_slice(&writer.finish());
            body
        }
        Ok(_) => return (StatusCode::NOT_ACCEPTABLE, "graph results").into_response(),
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    ([("content-type", "application/sparql-results+json")], body).into_response()
}

fn apply_update(store: &Store, update: &str) -> Response {
    let result = SparqlEvaluator::new()
        .parse_update(update)
        .map_err(|e| e.to_string())
        .and_then(|prepared| prepared.on_store(store).execute().map_err(|e| e.to_string()));
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e).into_response(),
    }
}

async fn jena_query(
    State(mock): State<MockEndpoint>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = sparql_text(&headers, &body, "query");
    record(&mock, "/ds/sparql", &headers, &query);
    answer_query(&mock.store, &query)
}

async fn jena_update(
    State(mock): State<MockEndpoint>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let update = sparql_text(&headers, &body, "update");
    record(&mock, "/ds/update", &headers, &update);
    apply_update(&mock.store, &update)
}

async fn oxigraph_query(
    State(mock): State<MockEndpoint>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = sparql_text(&headers, &body, "query");
    record(&mock, "/ox/query", &headers, &query);
    answer_query(&mock.store, &query)
}

async fn oxigraph_update(
    State(mock): State<MockEndpoint>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let update = sparql_text(&headers, &body, "update");
    record(&mock, "/ox/update", &headers, &update);
    apply_update(&mock.store, &update)
}

/// Answers from the state at arrival but responds late, so that requests of
/// concurrent writers interleave
async fn slow_query(
    State(mock): State<MockEndpoint>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = sparql_text(&headers, &body, "query");
    record(&mock, "/slow/sparql", &headers, &query);
    let response = answer_query(&mock.store, &query);
    tokio::time::sleep(QUERY_DELAY).await;
    response
}

async fn slow_update(
    State(mock): State<MockEndpoint>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let update = sparql_text(&headers, &body, "update");
    record(&mock, "/slow/update", &headers, &update);
    apply_update(&mock.store, &update)
}

async fn broken() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "dataset offline").into_response()
}

/// Starts the mock endpoint and returns its base URL
async fn start_mock() -> (String, MockEndpoint) {
    let mock = MockEndpoint {
        store: Store::new().unwrap(),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/ds/sparql", post(jena_query))
        .route("/ds/update", post(jena_update))
        .route("/ox/query", post(oxigraph_query))
        .route("/ox/update", post(oxigraph_update))
        .route("/slow/sparql", post(slow_query))
        .route("/slow/update", post(slow_update))
        .route("/broken/sparql", post(broken))
        .route("/broken/update", post(broken))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), mock)
}

fn client(
    base: &str,
    dataset: &str,
    kind: StoreKind,
    token: Option<&str>,
) -> Arc<HttpGraphClient> {
    let config = StoreConfig {
        url: format!("{}/{}", base, dataset),
        kind,
        auth_token: token.map(str::to_string),
        request_timeout: Duration::from_secs(5),
        write_gate_timeout: Duration::from_secs(5),
    };
    Arc::new(HttpGraphClient::new(&config).unwrap())
}

#[tokio::test]
async fn test_jena_dialect_uses_form_encoded_requests() {
    let (base, mock) = start_mock().await;
    let users = EntityGateway::new(client(&base, "ds", StoreKind::Jena, None), NS, &USER);

    users.create("u1", &json!({ "userId": "u1", "name": "Ann" })).await.unwrap();
    assert_eq!(users.read("u1").await.unwrap(), json!({ "userId": "u1", "name": "Ann" }));

    // existence check, guarded insert, claim check, claim release, read
    let requests = mock.all();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0].path, "/ds/sparql");
    assert!(requests[0].sparql.starts_with("ASK"));
    assert_eq!(requests[1].path, "/ds/update");
    assert!(requests[1].sparql.starts_with("INSERT {"));
    assert!(requests[1].sparql.contains("FILTER NOT EXISTS"));
    assert!(requests[2].sparql.contains("<urn:entity-graph:claim>"));
    assert!(requests[3].sparql.starts_with("DELETE DATA"));
    assert!(requests
        .iter()
        .all(|r| r.content_type.starts_with("application/x-www-form-urlencoded")));
    assert!(requests.iter().all(|r| r.authorization.is_none()));
}

#[tokio::test]
async fn test_oxigraph_dialect_sends_raw_bodies_with_token() {
    let (base, mock) = start_mock().await;
    let store = client(&base, "ox", StoreKind::Oxigraph, Some("s3cret"));
    let places = EntityGateway::new(store, NS, &PLACE);

    places.create("p1", &json!({ "name": "HQ", "zipcode": 10001 })).await.unwrap();
    assert_eq!(places.read("p1").await.unwrap()["zipcode"], 10001);

    let requests = mock.all();
    assert!(!requests.is_empty());
    for request in &requests {
        assert_eq!(request.authorization.as_deref(), Some("Bearer s3cret"));
        if request.path == "/ox/update" {
            assert_eq!(request.content_type, "application/sparql-update");
        } else {
            assert_eq!(request.path, "/ox/query");
            assert_eq!(request.content_type, "application/sparql-query");
        }
    }
}

#[tokio::test]
async fn test_commit_is_a_single_update_request() {
    let (base, mock) = start_mock().await;
    let users = EntityGateway::new(client(&base, "ds", StoreKind::Jena, None), NS, &USER);
    users.create("u1", &json!({ "name": "Ann", "email": "ann@example.org" })).await.unwrap();

    assert!(!users.create_or_update("u1", &json!({ "name": "Anne" })).await.unwrap());
    users.patch("u1", &json!({ "bio": "hi", "company": "Acme" })).await.unwrap();

    // create commits its insert and then releases its claim
    let updates = mock.updates();
    assert_eq!(updates.len(), 4);
    assert!(updates[2].sparql.starts_with("DELETE WHERE"));
    assert!(updates[2].sparql.contains(" ;\nINSERT DATA"));
    assert!(updates[3].sparql.contains("<http://cauldron.systems/graph/bio> ?o"));
    assert!(updates[3].sparql.contains("FILTER EXISTS"));
    assert_eq!(
        users.read("u1").await.unwrap(),
        json!({ "userId": "u1", "name": "Anne", "bio": "hi", "company": "Acme" })
    );
}

#[tokio::test]
async fn test_conflict_sends_no_update() {
    let (base, mock) = start_mock().await;
    let users = EntityGateway::new(client(&base, "ds", StoreKind::Jena, None), NS, &USER);
    users.create("u1", &json!({ "name": "Ann" })).await.unwrap();
    let before = mock.updates().len();

    let created = users.create("u1", &json!({ "name": "Bob" })).await;
    assert!(matches!(created, Err(GatewayError::Conflict(_))));
    let patched = users.patch("u2", &json!({ "name": "Bob" })).await;
    assert!(matches!(patched, Err(GatewayError::NotFound(_))));
    assert_eq!(mock.updates().len(), before);
}

#[tokio::test]
async fn test_error_status_is_store_unavailable() {
    let (base, _mock) = start_mock().await;
    let users = EntityGateway::new(client(&base, "broken", StoreKind::Jena, None), NS, &USER);

    match users.read("u1").await {
        Err(GatewayError::StoreUnavailable(err)) => {
            assert!(err.to_string().contains("500"), "{}", err);
            assert!(err.to_string().contains("dataset offline"), "{}", err);
        }
        other => panic!("expected StoreUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_query_results_are_streamed_through() {
    let (base, _mock) = start_mock().await;
    let http = client(&base, "ds", StoreKind::Jena, None);
    let users = EntityGateway::new(http.clone(), NS, &USER);
    users.create("u1", &json!({ "name": "Ann" })).await.unwrap();

    let mut stream = QueryGateway::new(http)
        .query("SELECT ?s ?o WHERE { ?s <http://cauldron.systems/graph/name> ?o }")
        .await
        .unwrap();
    let mut document = Vec::new();
    while let Some(chunk) = stream.next().await {
        document.extend_from_slice(&chunk.unwrap());
    }
    let document: serde_json::Value = serde_json::from_slice(&document).unwrap();
    let binding = &document["results"]["bindings"][0];
    assert_eq!(binding["s"]["value"], "http://cauldron.systems/graph/users/u1");
    assert_eq!(binding["o"]["value"], "Ann");
}

#[tokio::test]
async fn test_read_transaction_cannot_write() {
    let (base, _mock) = start_mock().await;
    let http = client(&base, "ds", StoreKind::Jena, None);
    let mut txn = http.begin(TxnMode::Read).await.unwrap();
    assert!(txn.update("CLEAR ALL").await.is_err());
}

#[tokio::test]
async fn test_concurrent_creates_from_separate_clients() {
    let (base, mock) = start_mock().await;
    // two service instances share the store but not a write gate
    let first = EntityGateway::new(client(&base, "slow", StoreKind::Jena, None), NS, &USER);
    let second = EntityGateway::new(client(&base, "slow", StoreKind::Jena, None), NS, &USER);
    let ann = json!({ "userId": "u1", "name": "Ann" });
    let bob = json!({ "userId": "u1", "name": "Bob", "email": "bob@example.org" });

    let (a, b) = tokio::join!(first.create("u1", &ann), second.create("u1", &bob));
    let winner = match (a, b) {
        (Ok(()), Err(GatewayError::Conflict(_))) => ann,
        (Err(GatewayError::Conflict(_)), Ok(())) => bob,
        other => panic!("expected exactly one create to succeed, got {:?}", other),
    };

    // both existence checks were answered before either insert arrived
    let requests = mock.all();
    let first_update = requests.iter().position(|r| r.path == "/slow/update").unwrap();
    let existence_check = "ASK { <http://cauldron.systems/graph/users/u1> ?p ?o }";
    let checks = requests[..first_update].iter().filter(|r| r.sparql == existence_check).count();
    assert_eq!(checks, 2);
    assert_eq!(second.read("u1").await.unwrap(), winner);
    // the type statement stands in for the id field, no claim is left behind
    assert_eq!(mock.store.len().unwrap(), winner.as_object().unwrap().len());
}

#[tokio::test]
async fn test_patch_does_not_resurrect_a_concurrent_delete() {
    let (base, mock) = start_mock().await;
    let patcher = EntityGateway::new(client(&base, "slow", StoreKind::Jena, None), NS, &USER);
    let deleter = EntityGateway::new(client(&base, "ds", StoreKind::Jena, None), NS, &USER);
    deleter.create("u1", &json!({ "name": "Ann" })).await.unwrap();

    let delayed_delete = async {
        tokio::time::sleep(QUERY_DELAY / 4).await;
        deleter.delete("u1").await
    };
    let patch_body = json!({ "name": "Anne" });
    let (patched, deleted) = tokio::join!(patcher.patch("u1", &patch_body), delayed_delete);
    patched.unwrap();
    deleted.unwrap();

    assert!(matches!(deleter.read("u1").await, Err(GatewayError::NotFound(_))));
    assert!(mock.store.is_empty().unwrap());
}
