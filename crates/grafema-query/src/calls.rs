//! Call-site queries.

use grafema_core::model::{EdgeKind, Node, NodeKind};
use grafema_core::store::{GraphStore, NodeFilter};
use serde::Serialize;
use std::collections::HashSet;

/// Resolve call sites by static name and optional receiver class.
/// Matches direct calls (`target(...)`) and member calls whose method part
/// is `target`; `class_name` narrows to receivers or resolved methods of
/// that class.
pub fn find_calls(
    store: &dyn GraphStore,
    target: &str,
    class_name: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<Vec<Node>> {
    let limit = limit.unwrap_or(100);
    let mut matches = Vec::new();

    for call in store.query_nodes(&NodeFilter::new().kind(NodeKind::Call))? {
        let method = call.name.rsplit('.').next().unwrap_or(&call.name);
        if method != target && call.name != target {
            continue;
        }
        if let Some(class_name) = class_name {
            let receiver_matches = call
                .meta_str("object")
                .is_some_and(|o| o == class_name || o.starts_with(&format!("{class_name}.")));
            let resolved_matches = resolved_class(store, &call)
                .is_some_and(|c| c == class_name);
            if !receiver_matches && !resolved_matches {
                continue;
            }
        }
        matches.push(call);
        if matches.len() >= limit {
            break;
        }
    }
    Ok(matches)
}

fn resolved_class(store: &dyn GraphStore, call: &Node) -> Option<String> {
    let target_id = call.meta_str("resolvedTarget")?;
    let target = store.get_node(target_id).ok()??;
    target.meta_str("className").map(String::from)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDetails {
    pub function: Node,
    /// Callers, nearest first. With `transitive`, includes indirect callers
    /// up to depth 5.
    pub incoming_calls: Vec<Node>,
    /// Callees, nearest first; same transitivity rule.
    pub outgoing_calls: Vec<Node>,
}

const TRANSITIVE_DEPTH_CAP: usize = 5;

/// A function plus its incoming and outgoing CALLS edges.
pub fn get_function_details(
    store: &dyn GraphStore,
    name: &str,
    file: Option<&str>,
    transitive: bool,
) -> anyhow::Result<Option<FunctionDetails>> {
    let mut filter = NodeFilter::new().kind(NodeKind::Function).name_contains(name);
    if let Some(file) = file {
        filter = filter.file_contains(file);
    }
    let mut function = store.query_nodes(&filter)?.find(|n| n.name == name);
    if function.is_none() {
        let mut filter = NodeFilter::new().kind(NodeKind::Method).name_contains(name);
        if let Some(file) = file {
            filter = filter.file_contains(file);
        }
        function = store.query_nodes(&filter)?.find(|n| n.name == name);
    }
    let Some(function) = function else {
        return Ok(None);
    };

    let depth = if transitive { TRANSITIVE_DEPTH_CAP } else { 1 };
    let incoming_calls = collect_linked(store, &function.id, depth, EdgeKind::Calls, false)?;
    let outgoing_calls = collect_linked(store, &function.id, depth, EdgeKind::Calls, true)?;

    Ok(Some(FunctionDetails {
        function,
        incoming_calls,
        outgoing_calls,
    }))
}

fn collect_linked(
    store: &dyn GraphStore,
    start: &str,
    max_depth: usize,
    kind: EdgeKind,
    outgoing: bool,
) -> anyhow::Result<Vec<Node>> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.to_string());
    let mut result = Vec::new();
    let mut frontier = vec![start.to_string()];

    for _ in 0..max_depth {
        let mut next = Vec::new();
        for id in &frontier {
            let edges = if outgoing {
                store.get_outgoing_edges(id, Some(&[kind]))?
            } else {
                store.get_incoming_edges(id, Some(&[kind]))?
            };
            for edge in edges {
                let linked = if outgoing { edge.dst } else { edge.src };
                if visited.insert(linked.clone()) {
                    if let Some(node) = store.get_node(&linked)? {
                        result.push(node);
                    }
                    next.push(linked);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    Ok(result)
}
