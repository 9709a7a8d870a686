//! Bidirectional mapping between JSON entities and RDF statements.

use super::{EntitySchema, Property, PropertyKind, Statement};
use crate::error::{GatewayError, Result};
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{Literal, NamedNode, Term};
use serde_json::{Map, Value};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use tracing::warn;

const XSD_DATE_TIME_STAMP: &str = "http://www.w3.org/2001/XMLSchema#dateTimeStamp";

/// Characters that may not appear in an entity id because they would break
/// the subject IRI or the `{type}s/{id}` path convention. `%` is included
/// because ids arrive percent-decoded from request paths; an id holding an
/// escape would name a different resource once it is part of a URL again.
const ILLEGAL_ID_CHARS: &[char] =
    &['<', '>', '"', '{', '}', '|', '\\', '^', '`', '/', '?', '#', '%'];

/// Schema-driven codec for one entity type under one namespace
#[derive(Debug, Clone)]
pub struct EntityCodec {
    namespace: String,
    schema: &'static EntitySchema,
}

impl EntityCodec {
    pub fn new(namespace: impl Into<String>, schema: &'static EntitySchema) -> Self {
        Self {
            namespace: namespace.into(),
            schema,
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    /// URI of the entity type, object of every `rdf:type` statement
    pub fn type_uri(&self) -> NamedNode {
        NamedNode::new_unchecked(format!("{}{}", self.namespace, self.schema.entity_type))
    }

    pub fn predicate_uri(&self, property: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("{}{}", self.namespace, property))
    }

    /// Prefix shared by all subject URIs of `entity_type`
    pub fn entity_base_uri(&self, entity_type: &str) -> String {
        format!("{}{}s/", self.namespace, entity_type)
    }

    /// Subject URI of one entity of this codec's type
    pub fn subject(&self, entity_id: &str) -> Result<NamedNode> {
        self.entity_uri(self.schema.entity_type, entity_id).map_err(|reason| {
            GatewayError::BadRequest(format!("illegal {}: {}", self.schema.id_field, reason))
        })
    }

    /// Recovers the entity id from a subject URI of this codec's type
    pub fn id_from_subject<'a>(&self, subject: &'a str) -> Option<&'a str> {
        subject
            .strip_prefix(&self.entity_base_uri(self.schema.entity_type))
            .filter(|id| !id.is_empty())
    }

    fn entity_uri(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> std::result::Result<NamedNode, String> {
        if entity_id.is_empty() {
            return Err("id is empty".to_string());
        }
        let illegal =
            |c: &char| c.is_whitespace() || c.is_control() || ILLEGAL_ID_CHARS.contains(c);
        if let Some(c) = entity_id.chars().find(illegal) {
            return Err(format!("'{}' contains illegal character {:?}", entity_id, c));
        }
        NamedNode::new(format!("{}{}", self.entity_base_uri(entity_type), entity_id))
            .map_err(|e| format!("'{}' does not form a valid IRI: {}", entity_id, e))
    }

    /// Encodes `json` as the statements describing entity `entity_id`.
    ///
    /// The whole object is validated before anything is returned; a caller
    /// never sees a partial encoding. The `rdf:type` statement is always
    /// first.
    pub fn encode(&self, entity_id: &str, json: &Value) -> Result<Vec<Statement>> {
        let object = json.as_object().ok_or_else(|| {
            GatewayError::BadRequest("entity body must be a JSON object".to_string())
        })?;
        let subject = self.subject(entity_id)?;
        self.check_keys(entity_id, object)?;

        let mut statements =
            vec![Statement::new(subject.clone(), rdf::TYPE.into_owned(), self.type_uri())];
        for property in self.schema.properties {
            match object.get(property.name) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    let term = self.encode_value(property, value)?;
                    let predicate = self.predicate_uri(property.name);
                    statements.push(Statement::new(subject.clone(), predicate, term));
                }
            }
        }
        Ok(statements)
    }

    /// Rejects a mismatching id field and keys that cannot name a predicate.
    fn check_keys(&self, entity_id: &str, object: &Map<String, Value>) -> Result<()> {
        for (key, value) in object {
            if key == self.schema.id_field {
                if value.as_str() != Some(entity_id) {
                    return Err(GatewayError::BadRequest(format!(
                        "{} in body does not match entity id '{}'",
                        self.schema.id_field, entity_id
                    )));
                }
            } else if self.schema.property(key).is_none() && !is_local_name(key) {
                return Err(GatewayError::SchemaViolation(format!(
                    "'{}' is not a legal property name",
                    key
                )));
            }
        }
        Ok(())
    }

    fn encode_value(&self, property: &Property, value: &Value) -> Result<Term> {
        let violation = |expected: &str| {
            GatewayError::SchemaViolation(format!(
                "{} must be {}, got {}",
                property.name, expected, value
            ))
        };
        let term: Term = match property.kind {
            PropertyKind::String => {
                let s = value.as_str().ok_or_else(|| violation("a string"))?;
                Literal::new_typed_literal(s, xsd::STRING).into()
            }
            PropertyKind::Integer => {
                let n = value.as_i64().ok_or_else(|| violation("an integer"))?;
                Literal::new_typed_literal(n.to_string(), xsd::INTEGER).into()
            }
            PropertyKind::Timestamp => {
                let instant = value
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .ok_or_else(|| violation("an RFC 3339 timestamp"))?;
                let datatype = NamedNode::new_unchecked(XSD_DATE_TIME_STAMP);
                Literal::new_typed_literal(canonical_timestamp(&instant), datatype).into()
            }
            PropertyKind::Reference(target_type) => {
                let id =
                    value.as_str().ok_or_else(|| violation(&format!("a {} id", target_type)))?;
                self.entity_uri(target_type, id)
                    .map_err(|reason| {
                        GatewayError::SchemaViolation(format!(
                            "{} is not a valid {} id: {}",
                            property.name, target_type, reason
                        ))
                    })?
                    .into()
            }
        };
        Ok(term)
    }

    /// Decodes the (predicate, object) pairs stored for `entity_id`.
    ///
    /// Predicates outside the schema are ignored. Objects that do not fit
    /// their declared kind are skipped with a warning.
    pub fn decode<I>(&self, entity_id: &str, statements: I) -> Value
    where
        I: IntoIterator<Item = (NamedNode, Term)>,
    {
        let mut object = Map::new();
        object.insert(self.schema.id_field.to_string(), Value::String(entity_id.to_string()));
        for (predicate, term) in statements {
            let Some(name) = predicate.as_str().strip_prefix(self.namespace.as_str()) else {
                continue;
            };
            let Some(property) = self.schema.property(name) else {
                continue;
            };
            match self.decode_term(property, &term) {
                Some(value) => {
                    object.insert(property.name.to_string(), value);
                }
                None => warn!(
                    entity_type = self.schema.entity_type,
                    entity_id,
                    property = property.name,
                    "skipping stored value that does not match the declared kind"
                ),
            }
        }
        Value::Object(object)
    }

    fn decode_term(&self, property: &Property, term: &Term) -> Option<Value> {
        match (property.kind, term) {
            (PropertyKind::String, Term::Literal(literal)) => {
                Some(Value::String(literal.value().to_string()))
            }
            // stores may rewrite the lexical form, the instant and offset survive
            (PropertyKind::Timestamp, Term::Literal(literal)) => {
                DateTime::parse_from_rfc3339(literal.value())
                    .ok()
                    .map(|instant| Value::String(canonical_timestamp(&instant)))
            }
            (PropertyKind::Integer, Term::Literal(literal)) => {
                literal.value().trim().parse::<i64>().ok().map(Value::from)
            }
            (PropertyKind::Reference(target_type), Term::NamedNode(node)) => node
                .as_str()
                .strip_prefix(&self.entity_base_uri(target_type))
                .filter(|id| !id.is_empty())
                .map(|id| Value::String(id.to_string())),
            _ => None,
        }
    }
}

/// RFC 3339 with `Z` for UTC and only as many fraction digits as needed
fn canonical_timestamp(instant: &DateTime<FixedOffset>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Whether `key` can be appended to the namespace as a predicate local name
fn is_local_name(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        }
        _ => false,
    }
}
