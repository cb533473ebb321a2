//! Data-flow tracing over ASSIGNED_FROM / PASSES_ARGUMENT / FLOWS_INTO.
//!
//! Edge directions: ASSIGNED_FROM and PASSES_ARGUMENT point consumer →
//! producer; FLOWS_INTO points producer → consumer. Backward tracing asks
//! "where does this value come from", forward asks "where does it go".

use grafema_core::model::{EdgeKind, Node, NodeKind};
use grafema_core::store::{GraphStore, NodeFilter};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Both,
}

impl std::str::FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            "both" => Ok(Direction::Both),
            _ => Err(()),
        }
    }
}

/// Find the declaration node a `(variable, file)` pair names.
fn find_binding(store: &dyn GraphStore, name: &str, file: &str) -> anyhow::Result<Option<Node>> {
    for kind in [NodeKind::Variable, NodeKind::Constant, NodeKind::Parameter] {
        let found = store
            .query_nodes(
                &NodeFilter::new()
                    .kind(kind)
                    .file_contains(file)
                    .name_contains(name),
            )?
            .find(|n| n.name == name && n.file == file);
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Follow ASSIGNED_FROM from a variable until a non-variable source is hit.
/// The returned chain starts at the variable and ends at the terminal;
/// cycles terminate the walk at the point of revisit.
pub fn trace_alias(
    store: &dyn GraphStore,
    variable: &str,
    file: &str,
) -> anyhow::Result<Vec<Node>> {
    let Some(start) = find_binding(store, variable, file)? else {
        return Ok(Vec::new());
    };

    let mut chain = vec![start.clone()];
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.id.clone());
    let mut current = start;

    loop {
        let edges = store.get_outgoing_edges(&current.id, Some(&[EdgeKind::AssignedFrom]))?;
        let Some(edge) = edges.first() else { break };
        if !visited.insert(edge.dst.clone()) {
            break;
        }
        let Some(next) = store.get_node(&edge.dst)? else {
            break;
        };
        chain.push(next.clone());
        if !matches!(next.kind, NodeKind::Variable | NodeKind::Parameter) {
            break;
        }
        current = next;
    }
    Ok(chain)
}

/// Enumerate the data-flow neighborhood of a source node. Each reachable
/// node appears exactly once; cycles are cut by the visited set.
pub fn trace_data_flow(
    store: &dyn GraphStore,
    source: &str,
    direction: Direction,
    max_depth: usize,
) -> anyhow::Result<Vec<Node>> {
    let Some(start) = store.get_node(source)? else {
        return Ok(Vec::new());
    };

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.id.clone());
    let mut order = vec![start.clone()];
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((start.id, 0));

    let backward_kinds = [EdgeKind::AssignedFrom, EdgeKind::PassesArgument];
    let forward_kinds = backward_kinds;

    while let Some((id, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let mut neighbors: Vec<String> = Vec::new();

        if matches!(direction, Direction::Backward | Direction::Both) {
            for edge in store.get_outgoing_edges(&id, Some(&backward_kinds))? {
                neighbors.push(edge.dst);
            }
            for edge in store.get_incoming_edges(&id, Some(&[EdgeKind::FlowsInto]))? {
                neighbors.push(edge.src);
            }
        }
        if matches!(direction, Direction::Forward | Direction::Both) {
            for edge in store.get_incoming_edges(&id, Some(&forward_kinds))? {
                neighbors.push(edge.src);
            }
            for edge in store.get_outgoing_edges(&id, Some(&[EdgeKind::FlowsInto]))? {
                neighbors.push(edge.dst);
            }
        }

        for neighbor in neighbors {
            if visited.insert(neighbor.clone()) {
                if let Some(node) = store.get_node(&neighbor)? {
                    order.push(node);
                }
                queue.push_back((neighbor, depth + 1));
            }
        }
    }
    Ok(order)
}

/// Variant taking a `(variable, file)` pair instead of a node ID.
pub fn trace_data_flow_from_name(
    store: &dyn GraphStore,
    variable: &str,
    file: &str,
    direction: Direction,
    max_depth: usize,
) -> anyhow::Result<Vec<Node>> {
    match find_binding(store, variable, file)? {
        Some(binding) => trace_data_flow(store, &binding.id, direction, max_depth),
        None => Ok(Vec::new()),
    }
}
