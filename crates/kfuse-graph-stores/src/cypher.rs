//! Cypher statement building.
//!
//! Labels, relation types and property keys cannot be bound as parameters, so
//! they are spliced into the statement as backtick-quoted identifiers.

use kfuse_core::traits::{GraphEdge, GraphNode};

/// Quote an identifier, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Statement plus positional parameters (`$p0`, `$p1`, ...) for a node upsert.
///
/// The node's property map replaces whatever the stored node carried, and
/// `id` is always present.
pub fn node_upsert(node: &GraphNode) -> (String, Vec<(String, String)>) {
    let mut params = vec![("id".to_string(), node.id.clone())];
    let mut assignments = vec!["`id`: $id".to_string()];

    for (i, (key, value)) in node.properties.iter().filter(|(k, _)| k.as_str() != "id").enumerate() {
        let param = format!("p{}", i);
        assignments.push(format!("{}: ${}", quote_identifier(key), param));
        params.push((param, value.clone()));
    }

    let statement = format!(
        "MERGE (n:{label} {{id: $id}}) SET n = {{{props}}}",
        label = quote_identifier(&node.label),
        props = assignments.join(", ")
    );
    (statement, params)
}

/// Statement for an edge upsert, parameterized by `$source` and `$target`.
pub fn edge_upsert(edge: &GraphEdge) -> String {
    format!(
        "MATCH (a {{id: $source}}), (b {{id: $target}}) MERGE (a)-[:{rel}]->(b)",
        rel = quote_identifier(&edge.relation)
    )
}
