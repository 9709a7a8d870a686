//! # Entity Graph
//!
//! Entity Graph exposes a small set of typed entities (users, places and trips)
//! as REST resources whose state lives in an RDF triple store reached over the
//! SPARQL 1.1 protocol.
//!
//! ## Features
//!
//! - Schema-driven mapping between JSON entities and RDF statements
//! - Check-then-write operations (create, replace, patch, delete) executed as
//!   single store transactions
//! - Streaming passthrough for read-only SPARQL SELECT queries
//! - Remote (Fuseki / Oxigraph server) and embedded in-memory store backends
//!
//! ## Example
//!
//! ```rust
//! use entity_graph::gateway::EntityGateway;
//! use entity_graph::model::USER;
//! use entity_graph::store::memory::MemoryGraphClient;
//! use std::sync::Arc;
//!
//! # async fn example() -> entity_graph::Result<()> {
//! let client = Arc::new(MemoryGraphClient::new()?);
//! let users = EntityGateway::new(client, "http://cauldron.systems/graph/", &USER);
//! users.create("u1", &serde_json::json!({ "userId": "u1", "name": "Ann" })).await?;
//! let ann = users.read("u1").await?;
//! assert_eq!(ann["name"], "Ann");
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]

/// Service configuration
pub mod config;

/// Error types and result definitions
pub mod error;

/// Entity schemas and the JSON/RDF codec
pub mod model;

/// Graph store clients and transactions
pub mod store;

/// Entity and query gateways
pub mod gateway;

/// HTTP resource layer
pub mod http;

// Re-export commonly used types
pub use error::{GatewayError, Result};
