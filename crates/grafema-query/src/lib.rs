//! Query surface over the graph store: structural queries, traversal,
//! call resolution, data-flow tracing, and guard chains. Everything
//! list-shaped comes back as a cursor-paginated connection.

pub mod calls;
pub mod dataflow;
pub mod guards;
pub mod pagination;
pub mod traverse;

#[cfg(test)]
mod tests;

use grafema_core::model::{Node, NodeKind};
use grafema_core::store::{GraphStore, NodeFilter};
use pagination::Connection;

pub use calls::{find_calls, get_function_details, FunctionDetails};
pub use dataflow::{trace_alias, trace_data_flow, Direction};
pub use guards::{find_guards, Constraint, Guard};
pub use pagination::{decode_cursor, encode_cursor, PageInfo, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use traverse::{bfs, dfs, reachability};

/// Single-node lookup.
pub fn node(store: &dyn GraphStore, id: &str) -> anyhow::Result<Option<Node>> {
    Ok(store.get_node(id)?)
}

/// Filtered node listing as a Relay-style connection.
pub fn nodes(
    store: &dyn GraphStore,
    filter: &NodeFilter,
    first: Option<usize>,
    after: Option<&str>,
) -> anyhow::Result<Connection<Node>> {
    let matched: Vec<Node> = store.query_nodes(filter)?.collect();
    Ok(pagination::paginate(matched, first, after, |n| n.id.clone()))
}

/// Node/edge counts, total and by type.
pub fn stats(store: &dyn GraphStore) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::json!({
        "nodes": store.node_count()?,
        "edges": store.edge_count()?,
        "nodesByType": store.count_nodes_by_type(None)?,
        "edgesByType": store.count_edges_by_type(None)?,
    }))
}

/// MODULE node + contained declarations grouped by kind.
pub fn file_overview(store: &dyn GraphStore, file: &str) -> anyhow::Result<serde_json::Value> {
    let nodes: Vec<Node> = store
        .query_nodes(&NodeFilter::new().file_contains(file))?
        .collect();
    let module = nodes.iter().find(|n| n.kind == NodeKind::Module);
    let mut by_kind = std::collections::BTreeMap::<String, Vec<serde_json::Value>>::new();
    for node in &nodes {
        if node.kind == NodeKind::Module {
            continue;
        }
        by_kind
            .entry(node.kind.as_str().to_string())
            .or_default()
            .push(serde_json::json!({
                "id": node.id,
                "name": node.name,
                "line": node.line,
            }));
    }
    Ok(serde_json::json!({
        "file": file,
        "module": module.map(|m| serde_json::json!({
            "id": m.id,
            "contentHash": m.meta_str("contentHash"),
            "language": m.meta_str("language"),
        })),
        "declarations": by_kind,
    }))
}
