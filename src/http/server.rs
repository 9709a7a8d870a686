//! HTTP API server for Entity Graph
//!
//! Exposes one REST collection per entity type plus a SPARQL query endpoint
//! and liveness/readiness probes, all mounted under the configured API root.

use crate::{
    config::ServerConfig,
    error::{GatewayError, GraphError},
    gateway::{EntityGateway, QueryGateway},
    model::{EntitySchema, ENTITY_TYPES},
    store::{GraphClient, TxnMode, SPARQL_RESULTS_JSON},
};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::{future::Future, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Client-facing text of every store failure. Store URLs, connection errors
/// and upstream bodies stay in the logs.
const STORE_UNAVAILABLE_MESSAGE: &str = "graph store unavailable";

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Probe response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Shared state of the query and probe endpoints
pub struct AppState {
    pub client: Arc<dyn GraphClient>,
    pub queries: QueryGateway,
}

/// State of one entity collection
pub struct EntityResource {
    pub gateway: EntityGateway,
    /// Public URL of the collection, prefix of `Location` headers
    pub collection_url: String,
}

impl EntityResource {
    fn location(&self, entity_id: &str) -> String {
        format!("{}/{}", self.collection_url, entity_id)
    }

    fn schema(&self) -> &'static EntitySchema {
        self.gateway.schema()
    }
}

/// Custom error type for API errors
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::BadRequest(_)
            | GatewayError::SchemaViolation(_)
            | GatewayError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, error_body(&self.0)).into_response()
    }
}

fn error_body(err: &GatewayError) -> Json<ErrorResponse> {
    let error = match err {
        GatewayError::StoreUnavailable(_) => STORE_UNAVAILABLE_MESSAGE.to_string(),
        other => other.to_string(),
    };
    Json(ErrorResponse {
        error,
        code: err.code().to_string(),
    })
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

/// Create the HTTP server with all routes
pub fn create_server(config: &ServerConfig, client: Arc<dyn GraphClient>) -> Router {
    let root = config.normalized_api_root();
    let api_url = config.api_url();

    let state = Arc::new(AppState {
        client: Arc::clone(&client),
        queries: QueryGateway::new(Arc::clone(&client)),
    });

    // Configure CORS
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let mut router = Router::new()
        .route(&format!("{}/query", root), post(run_query))
        .route(&format!("{}/live", root), get(live))
        .route(&format!("{}/ready", root), get(ready))
        .with_state(state);

    for schema in ENTITY_TYPES {
        let resource = Arc::new(EntityResource {
            gateway: EntityGateway::new(Arc::clone(&client), config.namespace.clone(), schema),
            collection_url: format!("{}/{}", api_url, schema.plural()),
        });
        router = router.merge(entity_routes(&root, schema, resource));
    }

    router.layer(cors).layer(TraceLayer::new_for_http())
}

fn entity_routes(root: &str, schema: &EntitySchema, resource: Arc<EntityResource>) -> Router {
    let collection = format!("{}/{}", root, schema.plural());
    Router::new()
        .route(
            &collection,
            post(create_entity).get(list_entities).head(no_content).options(no_content),
        )
        .route(
            &format!("{}/:id", collection),
            get(read_entity).put(replace_entity).patch(patch_entity).delete(delete_entity),
        )
        .with_state(resource)
}

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError(GatewayError::BadRequest(format!("malformed JSON body: {}", e))))
}

/// POST /{type}s - Create an entity whose id is carried in the body
async fn create_entity(
    State(resource): State<Arc<EntityResource>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let json = parse_body(&body)?;
    let id_field = resource.schema().id_field;
    let entity_id = json
        .get(id_field)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ApiError(GatewayError::BadRequest(format!("body must carry a string {}", id_field)))
        })?
        .to_string();

    resource.gateway.create(&entity_id, &json).await?;
    Ok((StatusCode::CREATED, [(header::LOCATION, resource.location(&entity_id))]))
}

/// GET /{type}s - Summary view of every entity
async fn list_entities(
    State(resource): State<Arc<EntityResource>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    Ok(Json(resource.gateway.list().await?))
}

/// GET /{type}s/:id
async fn read_entity(
    State(resource): State<Arc<EntityResource>>,
    Path(entity_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(resource.gateway.read(&entity_id).await?))
}

/// PUT /{type}s/:id - Create or fully replace an entity
async fn replace_entity(
    State(resource): State<Arc<EntityResource>>,
    Path(entity_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let json = parse_body(&body)?;
    if resource.gateway.create_or_update(&entity_id, &json).await? {
        let location = [(header::LOCATION, resource.location(&entity_id))];
        Ok((StatusCode::CREATED, location).into_response())
    } else {
        Ok(StatusCode::OK.into_response())
    }
}

/// PATCH /{type}s/:id - Overwrite the given properties only
async fn patch_entity(
    State(resource): State<Arc<EntityResource>>,
    Path(entity_id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let json = parse_body(&body)?;
    resource.gateway.patch(&entity_id, &json).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /{type}s/:id
async fn delete_entity(
    State(resource): State<Arc<EntityResource>>,
    Path(entity_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    resource.gateway.delete(&entity_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// POST /query - Stream the results of a SPARQL SELECT query
async fn run_query(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    let query = String::from_utf8(body.to_vec())
        .map_err(|_| ApiError(GatewayError::BadRequest("query is not valid UTF-8".to_string())))?;
    let stream = state.queries.query(&query).await?;
    let content_type = [(header::CONTENT_TYPE, SPARQL_RESULTS_JSON)];
    Ok((content_type, Body::from_stream(stream)).into_response())
}

/// GET /live
async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready - 200 once the graph store answers a query
async fn ready(State(state): State<Arc<AppState>>) -> Response {
    match probe_store(state.client.as_ref()).await {
        Ok(()) => Json(StatusResponse {
            status: "ready".to_string(),
        })
        .into_response(),
        Err(err) => {
            warn!(error = %err, "readiness check failed");
            let body = error_body(&GatewayError::from(err));
            (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
        }
    }
}

async fn probe_store(client: &dyn GraphClient) -> Result<(), GraphError> {
    let mut txn = client.begin(TxnMode::Read).await?;
    txn.ask("ASK { ?s ?p ?o }").await?;
    txn.commit().await
}

/// Binds the configured address and serves until `shutdown` resolves
pub async fn start_server(
    config: &ServerConfig,
    client: Arc<dyn GraphClient>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(config, client);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;

    let root = config.normalized_api_root();
    info!(
        addr = %config.bind_addr(),
        api_url = %config.api_url(),
        "Entity Graph HTTP API listening"
    );
    for schema in ENTITY_TYPES {
        info!("  {}/{}[/:id]  POST GET PUT PATCH DELETE HEAD OPTIONS", root, schema.plural());
    }
    info!("  {}/query  POST  SPARQL SELECT passthrough", root);
    info!("  {}/live {}/ready  GET  probes", root, root);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    Ok(())
}
