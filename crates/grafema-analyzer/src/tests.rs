//! Extraction and orchestration tests.

use crate::buffers::NodeBuffers;
use crate::extract::{default_extractors, ModuleInfo};
use crate::language::SourceLanguage;
use crate::orchestrator::{AnalyzeConfig, Orchestrator};
use grafema_core::diagnostics::DiagnosticCollector;
use grafema_core::model::{Edge, EdgeKind, Node, NodeKind};
use grafema_core::scope::ScopeTracker;
use grafema_core::store::memory::MemoryStore;
use grafema_core::store::{GraphStore, NodeFilter};
use std::sync::Arc;
use tree_sitter::Parser;

fn extract_source(source: &str, file: &str) -> (Vec<Node>, Vec<Edge>) {
    let language = SourceLanguage::from_path(std::path::Path::new(file))
        .unwrap_or(SourceLanguage::JavaScript);
    let mut parser = Parser::new();
    parser.set_language(&language.grammar()).unwrap();
    let tree = parser.parse(source, None).unwrap();

    let basename = file.rsplit('/').next().unwrap_or(file);
    let module = ModuleInfo {
        file: file.to_string(),
        module_id: format!("{file}->MODULE->{basename}"),
        language,
        service: None,
    };
    let mut buffers = NodeBuffers::new();
    for extractor in default_extractors() {
        let mut tracker = ScopeTracker::new(file);
        extractor
            .extract(&tree, source, &module, &mut buffers, &mut tracker)
            .unwrap();
    }
    buffers.drain()
}

fn find<'a>(nodes: &'a [Node], kind: NodeKind, name: &str) -> Option<&'a Node> {
    nodes.iter().find(|n| n.kind == kind && n.name == name)
}

#[test]
fn extracts_functions_parameters_and_calls() {
    let (nodes, edges) = extract_source(
        r#"
function greet(name, punctuation = '!') {
  return 'hi ' + name + punctuation;
}
greet('world');
"#,
        "src/greet.js",
    );

    let function = find(&nodes, NodeKind::Function, "greet").unwrap();
    assert_eq!(function.meta_u64("arity"), Some(2));
    assert!(!function.meta_bool("async"));

    let params: Vec<&Node> = nodes.iter().filter(|n| n.kind == NodeKind::Parameter).collect();
    assert_eq!(params.len(), 2);
    assert_eq!(params[0].meta_u64("index"), Some(0));

    let call = find(&nodes, NodeKind::Call, "greet").unwrap();
    assert_eq!(call.meta_u64("args"), Some(1));
    assert!(!call.meta_bool("resolved"));

    // The function owns its parameters.
    let has_param_edges = edges
        .iter()
        .filter(|e| e.kind == EdgeKind::HasParameter && e.src == function.id)
        .count();
    assert_eq!(has_param_edges, 2);
}

#[test]
fn v2_ids_survive_wrapping_anonymous_scope() {
    let source_a = "function foo(){ return 1; }\n";
    let source_b = "if (DEBUG) { /* toggle */ }\nfunction foo(){ return 1; }\n";

    let (nodes_a, _) = extract_source(source_a, "src/x.js");
    let (nodes_b, _) = extract_source(source_b, "src/x.js");

    let foo_a = find(&nodes_a, NodeKind::Function, "foo").unwrap();
    let foo_b = find(&nodes_b, NodeKind::Function, "foo").unwrap();
    assert_eq!(foo_a.id, foo_b.id);
}

#[test]
fn extraction_is_deterministic() {
    let source = r#"
const a = 1;
function f(x) { return g(x); }
function g(y) { return y + a; }
f(2);
"#;
    let (nodes_1, edges_1) = extract_source(source, "src/d.js");
    let (nodes_2, edges_2) = extract_source(source, "src/d.js");
    let ids_1: Vec<&str> = nodes_1.iter().map(|n| n.id.as_str()).collect();
    let ids_2: Vec<&str> = nodes_2.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids_1, ids_2);
    assert_eq!(edges_1.len(), edges_2.len());
}

#[test]
fn same_name_calls_get_counters() {
    let (nodes, _) = extract_source(
        r#"
function main() {
  log('a');
  log('a');
  log('a');
}
"#,
        "src/log.js",
    );
    let calls: Vec<&Node> = nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Call && n.name == "log")
        .collect();
    assert_eq!(calls.len(), 3);
    let mut ids: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 3, "same-name calls must not collide: {ids:?}");
}

#[test]
fn anonymous_siblings_get_counted_names_and_unique_ids() {
    let (nodes, _) = extract_source(
        r#"
register(() => { first(); });
register(() => { second(); });
"#,
        "src/anon.js",
    );
    let anonymous: Vec<&Node> = nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Function && n.name.starts_with("anonymous#"))
        .collect();
    assert_eq!(anonymous.len(), 2);
    assert_eq!(anonymous[0].name, "anonymous#0");
    assert_eq!(anonymous[1].name, "anonymous#1");
    assert_ne!(
        anonymous[0].id, anonymous[1].id,
        "params-identical anonymous siblings must not collide"
    );
}

#[test]
fn imports_one_node_per_binding() {
    let (nodes, edges) = extract_source(
        r#"
import express from 'express';
import * as fs from 'fs';
import { readFile, writeFile as write } from 'fs/promises';
import './side-effect.css';
"#,
        "src/imports.js",
    );

    let imports: Vec<&Node> = nodes.iter().filter(|n| n.kind == NodeKind::Import).collect();
    assert_eq!(imports.len(), 4);

    let express = find(&nodes, NodeKind::Import, "express").unwrap();
    assert_eq!(express.meta_str("importType"), Some("default"));
    let fs = find(&nodes, NodeKind::Import, "fs").unwrap();
    assert_eq!(fs.meta_str("importType"), Some("namespace"));
    let write = find(&nodes, NodeKind::Import, "write").unwrap();
    assert_eq!(write.meta_str("importType"), Some("named"));
    assert_eq!(write.meta_str("imported"), Some("writeFile"));

    // External module singletons + DEPENDS_ON from the module.
    assert!(nodes.iter().any(|n| n.id == "EXTERNAL_MODULE->express"));
    assert!(edges
        .iter()
        .any(|e| e.kind == EdgeKind::DependsOn && e.dst == "EXTERNAL_MODULE->express"));
}

#[test]
fn exports_and_alias_dataflow() {
    let (nodes, edges) = extract_source(
        r#"
const log = console.log;
export function run() { log('x'); }
export default run;
"#,
        "src/run.js",
    );

    // const log = console.log → VARIABLE with ASSIGNED_FROM to the access.
    let log_var = find(&nodes, NodeKind::Variable, "log").unwrap();
    let access = find(&nodes, NodeKind::PropertyAccess, "console.log").unwrap();
    assert!(edges
        .iter()
        .any(|e| e.kind == EdgeKind::AssignedFrom && e.src == log_var.id && e.dst == access.id));

    let exports: Vec<&Node> = nodes.iter().filter(|n| n.kind == NodeKind::Export).collect();
    assert_eq!(exports.len(), 2);
}

#[test]
fn classes_methods_and_constructor_calls() {
    let (nodes, edges) = extract_source(
        r#"
class Repo extends Base {
  constructor(db) { this.db = db; }
  find(id) { return this.db.get(id); }
}
const repo = new Repo(conn);
const set = new Set();
"#,
        "src/repo.js",
    );

    let class = find(&nodes, NodeKind::Class, "Repo").unwrap();
    assert_eq!(class.meta_str("extends"), Some("Base"));

    let method = find(&nodes, NodeKind::Method, "find").unwrap();
    assert_eq!(method.meta_str("className"), Some("Repo"));

    let ctor_repo = find(&nodes, NodeKind::ConstructorCall, "Repo").unwrap();
    assert!(!ctor_repo.meta_bool("isBuiltin"));
    let ctor_set = find(&nodes, NodeKind::ConstructorCall, "Set").unwrap();
    assert!(ctor_set.meta_bool("isBuiltin"));

    // new Repo(...) is an instance of the locally declared class.
    assert!(edges
        .iter()
        .any(|e| e.kind == EdgeKind::InstanceOf && e.src == ctor_repo.id && e.dst == class.id));
}

#[test]
fn control_flow_scopes_and_guards() {
    let (nodes, edges) = extract_source(
        r#"
function gate(user) {
  if (user.isAdmin) {
    grant(user);
  } else {
    deny(user);
  }
  for (const role of user.roles) {
    audit(role);
  }
}
"#,
        "src/gate.js",
    );

    let scopes: Vec<&Node> = nodes.iter().filter(|n| n.kind == NodeKind::Scope).collect();
    let scope_types: Vec<&str> = scopes.iter().filter_map(|s| s.meta_str("scopeType")).collect();
    assert!(scope_types.contains(&"if"));
    assert!(scope_types.contains(&"else"));
    assert!(scope_types.contains(&"for"));

    let branch = find(&nodes, NodeKind::Branch, "if").unwrap();
    assert_eq!(branch.meta_str("condition"), Some("(user.isAdmin)"));
    assert!(edges.iter().any(|e| e.kind == EdgeKind::Guards && e.src == branch.id));

    let grant_call = find(&nodes, NodeKind::Call, "grant").unwrap();
    let if_scope = scopes
        .iter()
        .find(|s| s.meta_str("scopeType") == Some("if"))
        .unwrap();
    assert!(edges
        .iter()
        .any(|e| e.kind == EdgeKind::Contains && e.src == if_scope.id && e.dst == grant_call.id));
}

#[test]
fn catches_from_stops_at_function_boundaries() {
    let (nodes, edges) = extract_source(
        r#"
function f() {
  try {
    risky();
    const t = new Thing();
    const inner = () => { nested(); };
  } catch (e) {
    console.error(e);
  }
}
"#,
        "src/try.js",
    );

    let catch_block = find(&nodes, NodeKind::CatchBlock, "catch").unwrap();
    let caught: Vec<&Edge> = edges
        .iter()
        .filter(|e| e.kind == EdgeKind::CatchesFrom && e.src == catch_block.id)
        .collect();

    let risky = find(&nodes, NodeKind::Call, "risky").unwrap();
    let thing = find(&nodes, NodeKind::ConstructorCall, "Thing").unwrap();
    let nested = find(&nodes, NodeKind::Call, "nested").unwrap();

    let caught_ids: Vec<&str> = caught.iter().map(|e| e.dst.as_str()).collect();
    assert!(caught_ids.contains(&risky.id.as_str()));
    assert!(caught_ids.contains(&thing.id.as_str()));
    // The nested arrow body is a separate throw domain.
    assert!(!caught_ids.contains(&nested.id.as_str()));
    // console.error in the handler is not caught by its own catch.
    assert_eq!(caught.len(), 2);
}

#[test]
fn array_mutation_flows_into_receiver() {
    let (nodes, edges) = extract_source(
        r#"
const items = [];
const value = compute();
items.push(value);
"#,
        "src/flow.js",
    );
    let items = find(&nodes, NodeKind::Variable, "items").unwrap();
    let value = find(&nodes, NodeKind::Variable, "value").unwrap();
    assert!(edges
        .iter()
        .any(|e| e.kind == EdgeKind::FlowsInto && e.src == value.id && e.dst == items.id));
}

#[test]
fn assignment_cycles_are_representable() {
    let (nodes, edges) = extract_source(
        r#"
let a = init();
let b = a;
a = b;
"#,
        "src/cycle.js",
    );
    let a = find(&nodes, NodeKind::Variable, "a").unwrap();
    let b = find(&nodes, NodeKind::Variable, "b").unwrap();
    assert!(edges
        .iter()
        .any(|e| e.kind == EdgeKind::AssignedFrom && e.src == b.id && e.dst == a.id));
    assert!(edges
        .iter()
        .any(|e| e.kind == EdgeKind::AssignedFrom && e.src == a.id && e.dst == b.id));
}

// ── Orchestrator ────────────────────────────────────────────

fn write_project(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
    dir
}

#[test]
fn orchestrator_runs_all_phases_and_resolves_cross_file_calls() {
    let dir = write_project(&[
        ("package.json", r#"{"name": "fixture"}"#),
        (
            "a.js",
            "import { helper } from './b.js';\nexport function main() { return helper(); }\n",
        ),
        ("b.js", "export function helper() { return 2; }\n"),
    ]);

    let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
    let diagnostics = Arc::new(DiagnosticCollector::new());
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&diagnostics),
        AnalyzeConfig {
            root: dir.path().to_path_buf(),
            workers: 2,
            ..AnalyzeConfig::default()
        },
    );
    let status = orchestrator.status_handle();
    let summary = orchestrator.run().unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.tasks_completed, 2);
    assert_eq!(summary.tasks_failed, 0);
    assert!(!summary.fatal);

    // tasksTotal == tasksCompleted + tasksFailed, and all phases ran.
    let status = status.read().unwrap();
    assert_eq!(
        status.tasks_total,
        status.tasks_completed + status.tasks_failed
    );
    let phases: Vec<&str> = status
        .phase_durations
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(
        phases,
        vec!["DISCOVERY", "INDEXING", "ANALYSIS", "ENRICHMENT", "VALIDATION"]
    );

    // Cross-file resolution: main CALLS helper exists after the run even
    // though the files were analyzed by different workers.
    let helper = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Function).name_contains("helper"))
        .unwrap()
        .next()
        .unwrap();
    let incoming = store
        .get_incoming_edges(&helper.id, Some(&[EdgeKind::Calls]))
        .unwrap();
    assert_eq!(incoming.len(), 1);
    let caller = store.get_node(&incoming[0].src).unwrap().unwrap();
    assert_eq!(caller.name, "main");

    // Module nodes carry 12-hex content hashes.
    let module = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Module).file_contains("a.js"))
        .unwrap()
        .next()
        .unwrap();
    let hash = module.meta_str("contentHash").unwrap();
    assert_eq!(hash.len(), 12);
    assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));
}

#[test]
fn orchestrator_skips_unchanged_files() {
    let dir = write_project(&[("only.js", "export const x = 1;\n")]);
    let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());

    let run = |force: bool| {
        let diagnostics = Arc::new(DiagnosticCollector::new());
        Orchestrator::new(
            Arc::clone(&store),
            diagnostics,
            AnalyzeConfig {
                root: dir.path().to_path_buf(),
                workers: 1,
                force,
                ..AnalyzeConfig::default()
            },
        )
        .run()
        .unwrap()
    };

    let first = run(false);
    assert_eq!(first.tasks_completed, 1);

    let second = run(false);
    assert_eq!(second.tasks_completed, 0, "unchanged file must be skipped");

    let forced = run(true);
    assert_eq!(forced.tasks_completed, 1, "force reanalyzes everything");
}

#[test]
fn parse_failures_become_diagnostics_not_aborts() {
    let dir = write_project(&[
        ("ok.js", "export const fine = true;\n"),
        ("broken.js", "function {{{{\n"),
    ]);
    let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
    let diagnostics = Arc::new(DiagnosticCollector::new());
    let summary = Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&diagnostics),
        AnalyzeConfig {
            root: dir.path().to_path_buf(),
            workers: 1,
            ..AnalyzeConfig::default()
        },
    )
    .run()
    .unwrap();

    // tree-sitter recovers from most garbage, so the broken file may still
    // complete; either way the run finishes and accounts for both tasks.
    assert_eq!(summary.tasks_completed + summary.tasks_failed, 2);
    assert!(!summary.fatal);
}
