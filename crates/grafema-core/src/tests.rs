//! Unit tests for grafema-core: store semantics and wire protocol.

use crate::identity;
use crate::model::*;
use crate::schema::NodeBuilder;
use crate::store::memory::MemoryStore;
use crate::store::wire::WireClient;
use crate::store::{GraphStore, NodeFilter};
use std::sync::Arc;

fn function_node(name: &str, file: &str) -> Node {
    let id = identity::compute_compact(NodeKind::Function, name, file, None, None, 0);
    NodeBuilder::new(NodeKind::Function, name, file)
        .id(id)
        .build()
        .unwrap()
}

#[test]
fn node_upsert_is_idempotent() {
    let store = MemoryStore::new();
    let node = function_node("foo", "a.js");
    store.add_node(node.clone()).unwrap();
    store.add_node(node.clone()).unwrap();
    assert_eq!(store.node_count().unwrap(), 1);
}

#[test]
fn upsert_preserves_identity_triple() {
    let store = MemoryStore::new();
    store.add_node(function_node("foo", "a.js")).unwrap();

    // Rewriting fields is allowed.
    let mut updated = function_node("foo", "a.js");
    updated.metadata.insert("async".to_string(), true.into());
    store.add_node(updated).unwrap();
    let read = store.get_node("a.js->FUNCTION->foo").unwrap().unwrap();
    assert!(read.meta_bool("async"));

    // Changing the kind under the same ID is a conflict.
    let mut conflicting = function_node("foo", "a.js");
    conflicting.kind = NodeKind::Method;
    assert!(store.add_node(conflicting).is_err());
}

#[test]
fn edge_triple_is_unique() {
    let store = MemoryStore::new();
    store.add_node(function_node("a", "f.js")).unwrap();
    store.add_node(function_node("b", "f.js")).unwrap();
    let edge = Edge::new(EdgeKind::Calls, "f.js->FUNCTION->a", "f.js->FUNCTION->b").unwrap();
    store.add_edge(edge.clone()).unwrap();
    store.add_edge(edge).unwrap();
    assert_eq!(store.edge_count().unwrap(), 1);
}

#[test]
fn out_of_order_edges_resolve_at_flush() {
    let store = MemoryStore::new();
    store.add_node(function_node("a", "f.js")).unwrap();
    // Edge arrives before its destination node (as happens across workers
    // within a phase).
    store
        .add_edge(Edge::new(EdgeKind::Calls, "f.js->FUNCTION->a", "g.js->FUNCTION->b").unwrap())
        .unwrap();
    assert_eq!(store.edge_count().unwrap(), 0);
    assert_eq!(store.pending_edge_count(), 1);

    store.add_node(function_node("b", "g.js")).unwrap();
    store.flush().unwrap();
    assert_eq!(store.edge_count().unwrap(), 1);
    assert_eq!(store.pending_edge_count(), 0);

    let out = store
        .get_outgoing_edges("f.js->FUNCTION->a", Some(&[EdgeKind::Calls]))
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dst, "g.js->FUNCTION->b");
}

#[test]
fn query_nodes_filters_and_preserves_insertion_order() {
    let store = MemoryStore::new();
    for (name, file) in [("alpha", "a.js"), ("beta", "b.js"), ("gamma", "a.js")] {
        store.add_node(function_node(name, file)).unwrap();
    }
    store
        .add_node(
            NodeBuilder::new(NodeKind::HttpRoute, "GET /users", "a.js")
                .meta("method", "GET")
                .meta("path", "/users")
                .build()
                .unwrap(),
        )
        .unwrap();

    let functions: Vec<Node> = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Function))
        .unwrap()
        .collect();
    assert_eq!(
        functions.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
        vec!["alpha", "beta", "gamma"]
    );

    let in_a: Vec<Node> = store
        .query_nodes(&NodeFilter::new().file_contains("a.js"))
        .unwrap()
        .collect();
    assert_eq!(in_a.len(), 3);

    // Namespace wildcard.
    let http: Vec<Node> = store
        .query_nodes(&NodeFilter::new().node_type("http:*"))
        .unwrap()
        .collect();
    assert_eq!(http.len(), 1);
    assert_eq!(http[0].kind, NodeKind::HttpRoute);
}

#[test]
fn delete_node_removes_edges() {
    let store = MemoryStore::new();
    store.add_node(function_node("a", "f.js")).unwrap();
    store.add_node(function_node("b", "f.js")).unwrap();
    store
        .add_edge(Edge::new(EdgeKind::Calls, "f.js->FUNCTION->a", "f.js->FUNCTION->b").unwrap())
        .unwrap();

    assert!(store.delete_node("f.js->FUNCTION->b").unwrap());
    assert_eq!(store.edge_count().unwrap(), 0);
    assert!(!store.delete_node("f.js->FUNCTION->b").unwrap());
}

#[test]
fn counts_by_type() {
    let store = MemoryStore::new();
    store.add_node(function_node("a", "f.js")).unwrap();
    store.add_node(function_node("b", "g.js")).unwrap();
    store
        .add_node(
            NodeBuilder::new(NodeKind::Module, "f.js", "f.js")
                .id("f.js->MODULE->f.js")
                .build()
                .unwrap(),
        )
        .unwrap();

    let counts = store.count_nodes_by_type(None).unwrap();
    assert_eq!(counts.get("FUNCTION"), Some(&2));
    assert_eq!(counts.get("MODULE"), Some(&1));

    let only_functions = store
        .count_nodes_by_type(Some(&[NodeKind::Function]))
        .unwrap();
    assert_eq!(only_functions.len(), 1);
}

#[test]
fn strict_store_rejects_invalid_records() {
    let store = MemoryStore::strict();
    let mut bad = function_node("foo", "a.js");
    bad.name = String::new();
    assert!(store.add_node(bad).is_err());

    // add_nodes drops invalid records instead of failing the batch.
    let mut bad2 = function_node("bar", "a.js");
    bad2.name = String::new();
    let written = store
        .add_nodes(vec![function_node("ok", "a.js"), bad2])
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(store.node_count().unwrap(), 1);
}

#[test]
fn node_serialization_round_trip() {
    let node = NodeBuilder::new(NodeKind::HttpRoute, "GET /users", "src/routes.js")
        .at(12, 4)
        .meta("method", "GET")
        .meta("path", "/users")
        .build()
        .unwrap();
    let json = serde_json::to_string(&node).unwrap();
    assert!(json.contains("\"type\":\"http:route\""));
    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(node, back);
}

#[test]
fn edge_serialization_round_trip() {
    let edge = Edge::new(EdgeKind::PassesArgument, "a", "b")
        .unwrap()
        .with_index(2);
    let json = serde_json::to_string(&edge).unwrap();
    assert!(json.contains("\"type\":\"PASSES_ARGUMENT\""));
    let back: Edge = serde_json::from_str(&json).unwrap();
    assert_eq!(edge, back);
}

#[test]
fn wire_client_round_trips_through_server() {
    let backing: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
    let client = WireClient::connect(backing);

    client.add_node(function_node("foo", "a.js")).unwrap();
    client.add_node(function_node("bar", "a.js")).unwrap();
    client
        .add_edge(Edge::new(EdgeKind::Calls, "a.js->FUNCTION->foo", "a.js->FUNCTION->bar").unwrap())
        .unwrap();
    client.flush().unwrap();

    assert_eq!(client.node_count().unwrap(), 2);
    let node = client.get_node("a.js->FUNCTION->foo").unwrap().unwrap();
    assert_eq!(node.name, "foo");

    let streamed: Vec<Node> = client
        .query_nodes(&NodeFilter::new().kind(NodeKind::Function))
        .unwrap()
        .collect();
    assert_eq!(streamed.len(), 2);

    let out = client
        .get_outgoing_edges("a.js->FUNCTION->foo", None)
        .unwrap();
    assert_eq!(out.len(), 1);

    client.close();
}

#[test]
fn wire_streams_large_result_sets() {
    let backing: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
    let client = WireClient::connect(backing);
    let nodes: Vec<Node> = (0..700)
        .map(|i| function_node(&format!("f{i}"), "big.js"))
        .collect();
    client.add_nodes(nodes).unwrap();

    let streamed: Vec<Node> = client.query_nodes(&NodeFilter::new()).unwrap().collect();
    assert_eq!(streamed.len(), 700);
    client.close();
}
