//! The fixed family of SPARQL shapes issued by the entity gateway

use crate::model::Statement;
use oxigraph::model::NamedNode;
use std::fmt::Write;

/// `true` when `subject` has at least one statement
pub fn ask_subject(subject: &NamedNode) -> String {
    format!("ASK {{ {} ?p ?o }}", subject)
}

/// Every (predicate, object) pair of `subject`
pub fn select_subject(subject: &NamedNode) -> String {
    format!("SELECT ?p ?o WHERE {{ {} ?p ?o }}", subject)
}

/// Every subject typed as `entity_type`, with its statements restricted to
/// `predicates`. Subjects without any of those predicates still yield one
/// row with `?p` and `?o` unbound.
pub fn select_typed(entity_type: &NamedNode, predicates: &[NamedNode]) -> String {
    if predicates.is_empty() {
        return format!("SELECT ?s WHERE {{ ?s a {} }}", entity_type);
    }
    let values = predicates.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
    format!(
        "SELECT ?s ?p ?o WHERE {{ ?s a {} . OPTIONAL {{ ?s ?p ?o . VALUES ?p {{ {} }} }} }}",
        entity_type, values
    )
}

/// Removes every statement of `subject`
pub fn delete_subject(subject: &NamedNode) -> String {
    format!("DELETE WHERE {{ {} ?p ?o }}", subject)
}

/// Removes every value of one property of `subject`
pub fn delete_property(subject: &NamedNode, predicate: &NamedNode) -> String {
    format!("DELETE WHERE {{ {} {} ?o }}", subject, predicate)
}

/// `true` when exactly this statement is stored
pub fn ask_statement(statement: &Statement) -> String {
    format!("ASK {{ {} }}", statement)
}

pub fn insert_data(statements: &[Statement]) -> String {
    format!("INSERT DATA {{{} }}", triples(statements))
}

pub fn delete_data(statements: &[Statement]) -> String {
    format!("DELETE DATA {{{} }}", triples(statements))
}

/// Inserts `statements` only while `subject` has no statements at all. The
/// check runs inside the store, so concurrent writers cannot both succeed.
pub fn insert_if_absent(subject: &NamedNode, statements: &[Statement]) -> String {
    format!(
        "INSERT {{{} }} WHERE {{ FILTER NOT EXISTS {{ {} ?p ?o }} }}",
        triples(statements),
        subject
    )
}

/// Inserts `statements` only while `subject` still has statements
pub fn insert_if_present(subject: &NamedNode, statements: &[Statement]) -> String {
    format!(
        "INSERT {{{} }} WHERE {{ FILTER EXISTS {{ {} ?p ?o }} }}",
        triples(statements),
        subject
    )
}

fn triples(statements: &[Statement]) -> String {
    let mut block = String::new();
    for statement in statements {
        // writing into a String cannot fail
        let _ = write!(block, " {}", statement);
    }
    block
}

/// Sequence of update operations executed as one request
pub fn join_updates(operations: &[String]) -> String {
    operations.join(" ;\n")
}
