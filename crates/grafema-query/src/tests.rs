//! Query surface tests over extracted and hand-built graphs.

use crate::dataflow::{trace_alias, trace_data_flow_from_name, Direction};
use crate::{bfs, dfs, find_calls, find_guards, get_function_details, nodes, reachability};
use grafema_analyzer::extract::{default_extractors, ModuleInfo};
use grafema_analyzer::language::SourceLanguage;
use grafema_analyzer::NodeBuffers;
use grafema_core::model::{Edge, EdgeKind, NodeKind};
use grafema_core::schema::NodeBuilder;
use grafema_core::scope::ScopeTracker;
use grafema_core::store::memory::MemoryStore;
use grafema_core::store::{GraphStore, NodeFilter};
use tree_sitter::Parser;

/// Extract one source file into a fresh store.
fn store_from_source(source: &str, file: &str) -> MemoryStore {
    let language =
        SourceLanguage::from_path(std::path::Path::new(file)).unwrap_or(SourceLanguage::JavaScript);
    let mut parser = Parser::new();
    parser.set_language(&language.grammar()).unwrap();
    let tree = parser.parse(source, None).unwrap();

    let basename = file.rsplit('/').next().unwrap_or(file);
    let module_id = format!("{file}->MODULE->{basename}");
    let module = ModuleInfo {
        file: file.to_string(),
        module_id: module_id.clone(),
        language,
        service: None,
    };

    let store = MemoryStore::new();
    store
        .add_node(
            NodeBuilder::new(NodeKind::Module, basename, file)
                .id(module_id)
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut buffers = NodeBuffers::new();
    for extractor in default_extractors() {
        let mut tracker = ScopeTracker::new(file);
        extractor
            .extract(&tree, source, &module, &mut buffers, &mut tracker)
            .unwrap();
    }
    let (extracted_nodes, extracted_edges) = buffers.drain();
    store.add_nodes(extracted_nodes).unwrap();
    store.add_edges(extracted_edges, false).unwrap();
    store.flush().unwrap();
    store
}

#[test]
fn pagination_caps_at_250() {
    let store = MemoryStore::new();
    let batch: Vec<_> = (0..500)
        .map(|i| {
            NodeBuilder::new(NodeKind::Function, format!("f{i}"), "big.js")
                .build()
                .unwrap()
        })
        .collect();
    store.add_nodes(batch).unwrap();

    let connection = nodes(
        &store,
        &NodeFilter::new().kind(NodeKind::Function),
        Some(1000),
        None,
    )
    .unwrap();
    assert_eq!(connection.edges.len(), 250);
    assert_eq!(connection.total_count, 500);
    assert!(connection.page_info.has_next_page);
    assert!(!connection.page_info.has_previous_page);
}

#[test]
fn pagination_round_trip_matches_unpaginated_stream() {
    let store = MemoryStore::new();
    let batch: Vec<_> = (0..120)
        .map(|i| {
            NodeBuilder::new(NodeKind::Function, format!("f{i:03}"), "big.js")
                .build()
                .unwrap()
        })
        .collect();
    store.add_nodes(batch).unwrap();
    let filter = NodeFilter::new().kind(NodeKind::Function);

    let first_page = nodes(&store, &filter, Some(50), None).unwrap();
    let end = first_page.page_info.end_cursor.clone().unwrap();
    let second_page = nodes(&store, &filter, Some(50), Some(&end)).unwrap();
    assert!(second_page.page_info.has_previous_page);

    let paged: Vec<String> = first_page
        .edges
        .iter()
        .chain(second_page.edges.iter())
        .map(|e| e.node.id.clone())
        .collect();
    let unpaginated: Vec<String> = store
        .query_nodes(&filter)
        .unwrap()
        .take(100)
        .map(|n| n.id)
        .collect();
    assert_eq!(paged, unpaginated);
}

#[test]
fn bfs_dfs_and_reachability() {
    let store = MemoryStore::new();
    for name in ["a", "b", "c", "d"] {
        store
            .add_node(
                NodeBuilder::new(NodeKind::Function, name, "g.js")
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }
    let id = |n: &str| format!("g.js->FUNCTION->{n}");
    // a → b → c, a → c (diamond), d isolated; plus a cycle c → a.
    for (src, dst) in [("a", "b"), ("b", "c"), ("a", "c"), ("c", "a")] {
        store
            .add_edge(Edge::new(EdgeKind::Calls, id(src), id(dst)).unwrap())
            .unwrap();
    }

    let bfs_order = bfs(&store, &[id("a")], 10, Some(&[EdgeKind::Calls])).unwrap();
    assert_eq!(bfs_order, vec![id("a"), id("b"), id("c")]);

    let dfs_order = dfs(&store, &[id("a")], 10, Some(&[EdgeKind::Calls])).unwrap();
    assert_eq!(dfs_order[0], id("a"));
    assert_eq!(dfs_order.len(), 3);

    assert!(reachability(&store, &id("a"), &id("c"), None, 10).unwrap());
    assert!(!reachability(&store, &id("a"), &id("d"), None, 10).unwrap());
    // Depth bound cuts the walk.
    assert!(!reachability(&store, &id("a"), &id("c"), Some(&[EdgeKind::Calls]), 0).unwrap());
}

#[test]
fn alias_trace_ends_at_console_log() {
    let store = store_from_source("const log = console.log;\nlog('x');\n", "src/a.js");
    let chain = trace_alias(&store, "log", "src/a.js").unwrap();
    assert!(chain.len() >= 2);
    assert_eq!(chain[0].name, "log");
    let terminal = chain.last().unwrap();
    assert_eq!(terminal.kind, NodeKind::PropertyAccess);
    assert_eq!(terminal.name, "console.log");
}

#[test]
fn data_flow_cycle_terminates_with_unique_nodes() {
    let store = store_from_source("let a = seed();\nlet b = a;\na = b;\n", "src/cycle.js");
    let reached = trace_data_flow_from_name(&store, "a", "src/cycle.js", Direction::Both, 10)
        .unwrap();

    let a_count = reached.iter().filter(|n| n.name == "a").count();
    let b_count = reached.iter().filter(|n| n.name == "b").count();
    assert_eq!(a_count, 1, "cycle must not duplicate nodes");
    assert_eq!(b_count, 1);
}

#[test]
fn finds_calls_by_name_and_receiver() {
    let store = store_from_source(
        r#"
db.insert(record);
cache.insert(record);
insert(record);
"#,
        "src/calls.js",
    );
    let all = find_calls(&store, "insert", None, None).unwrap();
    assert_eq!(all.len(), 3);

    let on_db = find_calls(&store, "insert", Some("db"), None).unwrap();
    assert_eq!(on_db.len(), 1);
    assert_eq!(on_db[0].meta_str("object"), Some("db"));

    let limited = find_calls(&store, "insert", None, Some(2)).unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn function_details_with_call_edges() {
    let store = store_from_source(
        r#"
function a() { return b(); }
function b() { return c(); }
function c() { return 1; }
"#,
        "src/chain.js",
    );
    // Wire CALLS edges the way enrichment would.
    let id = |n: &str| {
        store
            .query_nodes(
                &NodeFilter::new()
                    .kind(NodeKind::Function)
                    .name_contains(n),
            )
            .unwrap()
            .next()
            .unwrap()
            .id
    };
    store
        .add_edge(Edge::new(EdgeKind::Calls, id("a"), id("b")).unwrap())
        .unwrap();
    store
        .add_edge(Edge::new(EdgeKind::Calls, id("b"), id("c")).unwrap())
        .unwrap();

    let details = get_function_details(&store, "b", None, false)
        .unwrap()
        .unwrap();
    assert_eq!(details.incoming_calls.len(), 1);
    assert_eq!(details.incoming_calls[0].name, "a");
    assert_eq!(details.outgoing_calls.len(), 1);
    assert_eq!(details.outgoing_calls[0].name, "c");

    // Transitive closure from `a` reaches both `b` and `c`, capped at 5.
    let transitive = get_function_details(&store, "a", None, true)
        .unwrap()
        .unwrap();
    let names: Vec<&str> = transitive
        .outgoing_calls
        .iter()
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(names, vec!["b", "c"]);
}

#[test]
fn guards_walk_the_scope_chain() {
    let store = store_from_source(
        r#"
function gate(user) {
  if (user.isAdmin) {
    if (user.active && attempts < 3) {
      grant(user);
    }
  }
}
"#,
        "src/guards.js",
    );
    let grant = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Call).name_contains("grant"))
        .unwrap()
        .next()
        .unwrap();

    let guards = find_guards(&store, &grant.id).unwrap();
    assert_eq!(guards.len(), 2, "both if scopes guard the call");
    // Innermost first.
    assert!(guards[0].condition.as_deref().unwrap().contains("user.active"));
    assert_eq!(guards[0].constraints.len(), 2);
    assert_eq!(guards[0].constraints[1].operator, "<");
    assert!(guards[1].condition.as_deref().unwrap().contains("isAdmin"));
}

#[test]
fn file_overview_groups_declarations() {
    let store = store_from_source(
        "function a() {}\nfunction b() {}\nconst x = 1;\n",
        "src/overview.js",
    );
    let overview = crate::file_overview(&store, "src/overview.js").unwrap();
    assert_eq!(overview["declarations"]["FUNCTION"].as_array().unwrap().len(), 2);
    assert!(overview["module"].is_object());
}
