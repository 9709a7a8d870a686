//! Gateways between JSON resources and the graph store
//!
//! [`EntityGateway`] runs the check-then-write operations of one entity type,
//! each inside a single store transaction. [`QueryGateway`] passes read-only
//! SELECT queries through to the store and streams the answer back.

pub mod entity;
pub mod query;

pub use entity::EntityGateway;
pub use query::QueryGateway;
