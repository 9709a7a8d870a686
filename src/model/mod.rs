//! Entity schemas and RDF statements
//!
//! Every entity type is described by a static [`EntitySchema`] table. The
//! same table drives both directions of the [`codec::EntityCodec`], so the
//! JSON and graph shapes of an entity cannot drift apart.

pub mod codec;

pub use codec::EntityCodec;

use oxigraph::model::{NamedNode, Term};
use std::fmt;

/// How a property value is represented in JSON and in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// JSON string, `xsd:string` literal
    String,
    /// JSON integer, `xsd:integer` literal
    Integer,
    /// RFC 3339 JSON string, `xsd:dateTimeStamp` literal
    Timestamp,
    /// JSON id of another entity, subject URI of that entity in the graph
    Reference(&'static str),
}

/// A declared property of an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    pub name: &'static str,
    pub kind: PropertyKind,
}

impl Property {
    pub const fn string(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::String,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Integer,
        }
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Timestamp,
        }
    }

    pub const fn reference(name: &'static str, target_type: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Reference(target_type),
        }
    }
}

/// Static description of one entity type
#[derive(Debug, PartialEq, Eq)]
pub struct EntitySchema {
    pub entity_type: &'static str,
    /// JSON key holding the entity id, always `entity_type + "Id"`
    pub id_field: &'static str,
    pub properties: &'static [Property],
    /// Properties projected by list views
    pub summary: &'static [&'static str],
}

impl EntitySchema {
    /// Plural path segment used in URIs and routes, e.g. `users`
    pub fn plural(&self) -> String {
        format!("{}s", self.entity_type)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn summary_properties(&self) -> impl Iterator<Item = &Property> + '_ {
        self.properties.iter().filter(|p| self.summary.contains(&p.name))
    }
}

pub static USER: EntitySchema = EntitySchema {
    entity_type: "user",
    id_field: "userId",
    properties: &[
        Property::string("name"),
        Property::string("email"),
        Property::string("bio"),
        Property::string("company"),
    ],
    summary: &["name"],
};

pub static PLACE: EntitySchema = EntitySchema {
    entity_type: "place",
    id_field: "placeId",
    properties: &[
        Property::string("name"),
        Property::integer("zipcode"),
        Property::string("city"),
        Property::string("state"),
        Property::string("county"),
        Property::string("country"),
    ],
    summary: &["name"],
};

pub static TRIP: EntitySchema = EntitySchema {
    entity_type: "trip",
    id_field: "tripId",
    properties: &[
        Property::reference("userId", "user"),
        Property::reference("origin", "place"),
        Property::reference("destination", "place"),
        Property::timestamp("departureDateTime"),
        Property::timestamp("arrivalDateTime"),
        Property::string("purpose"),
    ],
    summary: &["userId", "departureDateTime"],
};

/// Every entity type served by the gateway
pub static ENTITY_TYPES: [&EntitySchema; 3] = [&USER, &PLACE, &TRIP];

/// One RDF statement about an entity subject
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement {
    pub subject: NamedNode,
    pub predicate: NamedNode,
    pub object: Term,
}

impl Statement {
    pub fn new(subject: NamedNode, predicate: NamedNode, object: impl Into<Term>) -> Self {
        Self {
            subject,
            predicate,
            object: object.into(),
        }
    }
}

/// N-Triples form, usable verbatim inside SPARQL data blocks
impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_field_follows_entity_type() {
        for schema in ENTITY_TYPES {
            assert_eq!(schema.id_field, format!("{}Id", schema.entity_type));
        }
    }

    #[test]
    fn test_summary_fields_are_declared() {
        for schema in ENTITY_TYPES {
            for name in schema.summary {
                assert!(
                    schema.property(name).is_some(),
                    "{} is not a {} property",
                    name,
                    schema.entity_type
                );
            }
        }
    }

    #[test]
    fn test_reference_targets_exist() {
        for schema in ENTITY_TYPES {
            for property in schema.properties {
                if let PropertyKind::Reference(target) = property.kind {
                    assert!(ENTITY_TYPES.iter().any(|s| s.entity_type == target));
                }
            }
        }
    }

    #[test]
    fn test_statement_display() {
        let statement = Statement::new(
            NamedNode::new_unchecked("http://example.org/users/u1"),
            NamedNode::new_unchecked("http://example.org/name"),
            oxigraph::model::Literal::new_simple_literal("Ann"),
        );
        assert_eq!(
            statement.to_string(),
            "<http://example.org/users/u1> <http://example.org/name> \"Ann\" ."
        );
    }
}
