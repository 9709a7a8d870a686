//! HTTP API module for Entity Graph
//!
//! Provides REST endpoints for:
//! - Entity collections (`/users`, `/places`, `/trips`)
//! - SPARQL SELECT passthrough (`/query`)
//! - Liveness and readiness probes

pub mod server;

pub use server::{
    create_server, start_server, ApiError, AppState, EntityResource, ErrorResponse, StatusResponse,
};
