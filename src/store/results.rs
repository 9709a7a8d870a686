//! Reading and writing the SPARQL 1.1 JSON results format

use super::Bindings;
use crate::error::GraphError;
use bytes::Bytes;
use oxigraph::model::vocab::xsd;
use oxigraph::model::{BlankNode, Literal, NamedNode, Term};
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Deserialize)]
struct JsonResults {
    #[serde(default)]
    results: Option<JsonSolutions>,
    #[serde(default)]
    boolean: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct JsonSolutions {
    bindings: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum JsonTerm {
    Uri {
        value: String,
    },
    Bnode {
        value: String,
    },
    #[serde(alias = "typed-literal")]
    Literal {
        value: String,
        datatype: Option<String>,
        #[serde(rename = "xml:lang")]
        lang: Option<String>,
    },
}

impl TryFrom<JsonTerm> for Term {
    type Error = GraphError;

    fn try_from(term: JsonTerm) -> Result<Self, Self::Error> {
        let invalid = |e: &dyn std::fmt::Display| {
            GraphError::Protocol(format!("invalid term in results: {}", e))
        };
        Ok(match term {
            JsonTerm::Uri { value } => NamedNode::new(value).map_err(|e| invalid(&e))?.into(),
            JsonTerm::Bnode { value } => BlankNode::new(value).map_err(|e| invalid(&e))?.into(),
            JsonTerm::Literal { value, lang: Some(lang), .. } => {
                Literal::new_language_tagged_literal(value, lang).map_err(|e| invalid(&e))?.into()
            }
            JsonTerm::Literal { value, datatype: Some(datatype), .. } => {
                let datatype = NamedNode::new(datatype).map_err(|e| invalid(&e))?;
                Literal::new_typed_literal(value, datatype).into()
            }
            JsonTerm::Literal { value, .. } => Literal::new_simple_literal(value).into(),
        })
    }
}

/// Parses the answer to an ASK query
pub fn parse_boolean(body: &[u8]) -> Result<bool, GraphError> {
    let results: JsonResults = serde_json::from_slice(body)?;
    results
        .boolean
        .ok_or_else(|| GraphError::Protocol("ASK response carries no boolean".to_string()))
}

/// Parses the rows of a SELECT answer
pub fn parse_solutions(body: &[u8]) -> Result<Vec<Bindings>, GraphError> {
    let results: JsonResults = serde_json::from_slice(body)?;
    let solutions = results
        .results
        .ok_or_else(|| GraphError::Protocol("SELECT response carries no results".to_string()))?;
    solutions
        .bindings
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(var, value)| -> Result<(String, Term), GraphError> {
                    let term: JsonTerm = serde_json::from_value(value)?;
                    Ok((var, Term::try_from(term)?))
                })
                .collect::<Result<Bindings, GraphError>>()
        })
        .collect()
}

/// JSON representation of one bound term
pub fn term_to_json(term: &Term) -> Value {
    match term {
        Term::NamedNode(node) => json!({ "type": "uri", "value": node.as_str() }),
        Term::BlankNode(node) => json!({ "type": "bnode", "value": node.as_str() }),
        Term::Literal(literal) => {
            let mut value = json!({ "type": "literal", "value": literal.value() });
            if let Some(lang) = literal.language() {
                value["xml:lang"] = json!(lang);
            } else if literal.datatype() != xsd::STRING {
                value["datatype"] = json!(literal.datatype().as_str());
            }
            value
        }
        #[allow(unreachable_patterns)]
        other => json!({ "type": "literal", "value": other.to_string() }),
    }
}

/// Incremental writer producing a results document chunk by chunk
#[derive(Debug, Default)]
pub struct SolutionsWriter {
    rows: usize,
}

impl SolutionsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening of the document, up to the start of the bindings array
    pub fn head(&self, variables: &[String]) -> Bytes {
        let head = json!({ "vars": variables });
        Bytes::from(format!("{{\"head\":{},\"results\":{{\"bindings\":[", head))
    }

    pub fn row<'a, I>(&mut self, bindings: I) -> Bytes
    where
        I: IntoIterator<Item = (&'a str, &'a Term)>,
    {
        let row: Map<String, Value> =
            bindings.into_iter().map(|(var, term)| (var.to_string(), term_to_json(term))).collect();
        let separator = if self.rows == 0 { "" } else { "," };
        self.rows += 1;
        Bytes::from(format!("{}{}", separator, Value::Object(row)))
    }

    pub fn finish(&self) -> Bytes {
        Bytes::from_static(b"]}}")
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// A complete boolean results document
pub fn boolean_document(value: bool) -> Bytes {
    Bytes::from(json!({ "head": {}, "boolean": value }).to_string())
}
