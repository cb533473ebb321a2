//! Integration tests: full pipeline → query surface → guarantees.

use grafema_analyzer::orchestrator::{AnalyzeConfig, Orchestrator};
use grafema_core::diagnostics::DiagnosticCollector;
use grafema_core::model::NodeKind;
use grafema_core::snapshot;
use grafema_core::store::memory::MemoryStore;
use grafema_core::store::{GraphStore, NodeFilter};
use grafema_guarantees::GuaranteeRunner;
use grafema_server::CheckerBridge;
use std::sync::Arc;

fn fixture_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("src")).unwrap();

    std::fs::write(root.join("package.json"), r#"{"name": "shop"}"#).unwrap();
    std::fs::write(
        root.join("src/routes.js"),
        r#"
import express from 'express';
import { createOrder } from './orders.js';

const app = express();

app.get('/orders', (req, res) => {
  res.json(listOrders());
});

app.post('/orders', (req, res) => {
  const order = createOrder(req.body);
  res.json(order);
});

function listOrders() {
  return db.query('SELECT id, total FROM orders');
}
"#,
    )
    .unwrap();
    std::fs::write(
        root.join("src/orders.js"),
        r#"
export function createOrder(payload) {
  const order = { id: next(), total: payload.total };
  try {
    validate(order);
  } catch (e) {
    console.error(e);
  }
  return order;
}

function validate(order) {
  if (order.total < 0) {
    throw new Error('negative total');
  }
  eval('audit()');
}

function next() {
  return 1;
}
"#,
    )
    .unwrap();
    dir
}

fn analyze(
    dir: &tempfile::TempDir,
) -> (
    Arc<dyn GraphStore>,
    Arc<DiagnosticCollector>,
    Arc<GuaranteeRunner>,
) {
    let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
    let diagnostics = Arc::new(DiagnosticCollector::new());
    let runner = Arc::new(GuaranteeRunner::new());
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&diagnostics),
        AnalyzeConfig {
            root: dir.path().to_path_buf(),
            workers: 2,
            ..AnalyzeConfig::default()
        },
    )
    .with_checker(Arc::new(CheckerBridge(Arc::clone(&runner))));
    let summary = orchestrator.run().unwrap();
    assert!(!summary.fatal);
    assert_eq!(summary.tasks_failed, 0);
    (store, diagnostics, runner)
}

#[test]
fn pipeline_builds_a_queryable_graph() {
    let dir = fixture_project();
    let (store, _diagnostics, _runner) = analyze(&dir);

    // Structural nodes from both files.
    let functions: Vec<_> = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Function))
        .unwrap()
        .collect();
    assert!(functions.iter().any(|f| f.name == "createOrder"));
    assert!(functions.iter().any(|f| f.name == "validate"));

    // Domain extractors fired: express routes and the SQL call.
    let routes: Vec<_> = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::HttpRoute))
        .unwrap()
        .collect();
    let paths: Vec<&str> = routes.iter().filter_map(|r| r.meta_str("path")).collect();
    assert_eq!(routes.len(), 2);
    assert!(paths.contains(&"/orders"));

    let queries: Vec<_> = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::DbQuery))
        .unwrap()
        .collect();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].metadata["tables"][0], "orders");

    // Cross-file call resolution survived the worker fan-out.
    let create_order = functions.iter().find(|f| f.name == "createOrder").unwrap();
    let callers = store
        .get_incoming_edges(&create_order.id, Some(&[grafema_core::EdgeKind::Calls]))
        .unwrap();
    assert!(!callers.is_empty(), "createOrder should have a resolved caller");
}

#[test]
fn guarantees_catch_the_eval_call() {
    let dir = fixture_project();
    let (store, _diagnostics, runner) = analyze(&dir);

    let collector = DiagnosticCollector::new();
    let violations = runner
        .check_invariant(
            store.as_ref(),
            r#"violation(X) :- node(X, "CALL"), attr(X, "name", "eval")."#,
            Some("no eval"),
            &collector,
        )
        .unwrap();
    assert_eq!(violations, 1);
    let diagnostic = &collector.all()[0];
    assert_eq!(diagnostic.code, "ERR_GUARANTEE_VIOLATION");
}

#[test]
fn snapshots_round_trip_the_graph() {
    let dir = fixture_project();
    let (store, _diagnostics, _runner) = analyze(&dir);

    snapshot::save_snapshot(store.as_ref(), dir.path(), "baseline").unwrap();
    let restored = MemoryStore::new();
    snapshot::load_snapshot(&restored, dir.path(), "baseline").unwrap();

    assert_eq!(restored.node_count().unwrap(), store.node_count().unwrap());
    assert_eq!(restored.edge_count().unwrap(), store.edge_count().unwrap());
}

#[test]
fn diagnostics_log_is_appendable_jsonl() {
    let dir = fixture_project();
    let (_store, diagnostics, _runner) = analyze(&dir);

    if diagnostics.is_empty() {
        return;
    }
    let path = snapshot::diagnostics_log_path(dir.path());
    diagnostics.append_log(&path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    for line in content.lines() {
        let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(parsed["code"].is_string());
    }
}
