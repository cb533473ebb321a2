//! Datalog engine over the code property graph.
//!
//! The graph is exposed as three extensional predicates:
//!
//! - `node(Id, Type)` — every node.
//! - `edge(Src, Dst, Type)` — every edge.
//! - `attr(Id, Name, Value)` — name, file, line, column, and every scalar
//!   metadata field of a node.
//!
//! Users write rules deriving a `violation/1` predicate (or any named
//! goal); evaluation is stratified semi-naive bottom-up, results are
//! ordered lexicographically by the head tuple.

pub mod ast;
pub mod eval;
pub mod parser;

use ast::{is_extensional, Value};
use eval::Relation;
use grafema_core::store::{GraphStore, NodeFilter, StoreError};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatalogError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unsafe rule: {0}")]
    UnsafeRule(String),
    #[error("cyclic negation: {0}")]
    CyclicNegation(String),
    #[error("unknown predicate: {0}")]
    UnknownPredicate(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An engine instance holds the extensional database snapshot; each query
/// evaluates a program against it.
pub struct DatalogEngine {
    edb: HashMap<String, Relation>,
}

impl DatalogEngine {
    /// Snapshot the store into the extensional database.
    pub fn from_store(store: &dyn GraphStore) -> Result<DatalogEngine, DatalogError> {
        let mut node = Relation::new(vec![0, 1]);
        let mut attr = Relation::new(vec![0, 1]);
        let mut edge = Relation::new(vec![0, 1, 2]);

        for record in store.query_nodes(&NodeFilter::new())? {
            let id = Value::Str(record.id.clone());
            node.insert(vec![id.clone(), Value::Str(record.kind.as_str().to_string())]);
            attr.insert(vec![
                id.clone(),
                Value::Str("name".to_string()),
                Value::Str(record.name.clone()),
            ]);
            if !record.file.is_empty() {
                attr.insert(vec![
                    id.clone(),
                    Value::Str("file".to_string()),
                    Value::Str(record.file.clone()),
                ]);
            }
            attr.insert(vec![
                id.clone(),
                Value::Str("line".to_string()),
                Value::Int(i64::from(record.line)),
            ]);
            attr.insert(vec![
                id.clone(),
                Value::Str("column".to_string()),
                Value::Int(i64::from(record.column)),
            ]);
            for (key, value) in &record.metadata {
                let Some(scalar) = scalar_value(value) else {
                    continue;
                };
                attr.insert(vec![id.clone(), Value::Str(key.clone()), scalar]);
            }
        }

        match store.all_edges()? {
            Some(edges) => {
                for record in edges {
                    edge.insert(vec![
                        Value::Str(record.src),
                        Value::Str(record.dst),
                        Value::Str(record.kind.as_str().to_string()),
                    ]);
                }
            }
            None => {
                tracing::warn!("store does not expose full edge scans; edge/3 will be empty");
            }
        }

        let mut edb = HashMap::new();
        edb.insert("node".to_string(), node);
        edb.insert("edge".to_string(), edge);
        edb.insert("attr".to_string(), attr);
        Ok(DatalogEngine { edb })
    }

    /// An engine over an empty graph; facts can be injected for tests.
    pub fn empty() -> DatalogEngine {
        let mut edb = HashMap::new();
        edb.insert("node".to_string(), Relation::new(vec![0, 1]));
        edb.insert("edge".to_string(), Relation::new(vec![0, 1, 2]));
        edb.insert("attr".to_string(), Relation::new(vec![0, 1]));
        DatalogEngine { edb }
    }

    pub fn add_fact(&mut self, predicate: &str, tuple: Vec<Value>) -> Result<(), DatalogError> {
        let relation = self
            .edb
            .get_mut(predicate)
            .ok_or_else(|| DatalogError::UnknownPredicate(predicate.to_string()))?;
        relation.insert(tuple);
        Ok(())
    }

    /// Evaluate a program and return the extension of `goal`, ordered
    /// lexicographically by tuple. The goal may also name an extensional
    /// predicate, in which case the program may be empty.
    pub fn query(&self, program: &str, goal: &str) -> Result<Vec<Vec<Value>>, DatalogError> {
        let parsed = parser::parse(program)?;
        let derived = eval::evaluate(&parsed, &self.edb)?;

        let relation = if is_extensional(goal) {
            self.edb.get(goal)
        } else {
            derived.get(goal)
        };
        let relation = relation
            .ok_or_else(|| DatalogError::UnknownPredicate(goal.to_string()))?;

        let mut rows: Vec<Vec<Value>> = relation.tuples().to_vec();
        rows.sort();
        Ok(rows)
    }

    /// Shorthand for the conventional `violation/1` goal.
    pub fn violations(&self, program: &str) -> Result<Vec<Vec<Value>>, DatalogError> {
        self.query(program, "violation")
    }

    pub fn edb_size(&self) -> usize {
        self.edb.values().map(Relation::len).sum()
    }
}

fn scalar_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::Str(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grafema_core::model::{Edge, EdgeKind, NodeKind};
    use grafema_core::schema::NodeBuilder;
    use grafema_core::store::memory::MemoryStore;

    fn fixture_store() -> MemoryStore {
        let store = MemoryStore::new();
        for (kind, name) in [
            (NodeKind::Function, "main"),
            (NodeKind::Function, "helper"),
            (NodeKind::Call, "eval"),
            (NodeKind::Call, "helper"),
        ] {
            store
                .add_node(
                    NodeBuilder::new(kind, name, "app.js")
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        store
            .add_edge(
                Edge::new(
                    EdgeKind::Calls,
                    "app.js->FUNCTION->main",
                    "app.js->FUNCTION->helper",
                )
                .unwrap(),
            )
            .unwrap();
        store
    }

    #[test]
    fn eval_violation_scenario() {
        let engine = DatalogEngine::from_store(&fixture_store()).unwrap();
        let rows = engine
            .violations(r#"violation(X) :- node(X, "CALL"), attr(X, "name", "eval")."#)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_str(), Some("app.js->CALL->eval"));
    }

    #[test]
    fn extensional_queries_agree_with_store_enumeration() {
        let store = fixture_store();
        let engine = DatalogEngine::from_store(&store).unwrap();

        // With no rules loaded, node/2 equals the store's node set.
        let rows = engine.query("", "node").unwrap();
        assert_eq!(rows.len(), 4);
        let mut ids: Vec<&str> = rows.iter().filter_map(|r| r[0].as_str()).collect();
        ids.sort();
        let mut expected: Vec<String> = store
            .all_nodes()
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        expected.sort();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());

        let edges = engine.query("", "edge").unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn recursive_reachability() {
        let mut engine = DatalogEngine::empty();
        for (src, dst) in [("a", "b"), ("b", "c"), ("c", "d")] {
            engine
                .add_fact(
                    "edge",
                    vec![
                        Value::Str(src.to_string()),
                        Value::Str(dst.to_string()),
                        Value::Str("CALLS".to_string()),
                    ],
                )
                .unwrap();
        }
        let rows = engine
            .query(
                r#"
reach(X, Y) :- edge(X, Y, "CALLS").
reach(X, Z) :- reach(X, Y), edge(Y, Z, "CALLS").
"#,
                "reach",
            )
            .unwrap();
        assert_eq!(rows.len(), 6); // ab ac ad bc bd cd
        assert_eq!(rows[0][0].as_str(), Some("a"));
    }

    #[test]
    fn recursion_through_a_cycle_terminates() {
        let mut engine = DatalogEngine::empty();
        for (src, dst) in [("a", "b"), ("b", "a")] {
            engine
                .add_fact(
                    "edge",
                    vec![
                        Value::Str(src.to_string()),
                        Value::Str(dst.to_string()),
                        Value::Str("FLOWS_INTO".to_string()),
                    ],
                )
                .unwrap();
        }
        let rows = engine
            .query(
                r#"
flows(X, Y) :- edge(X, Y, "FLOWS_INTO").
flows(X, Z) :- flows(X, Y), edge(Y, Z, "FLOWS_INTO").
"#,
                "flows",
            )
            .unwrap();
        // aa ab ba bb — and the fixed point stops there.
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn stratified_negation() {
        let mut engine = DatalogEngine::empty();
        for name in ["f", "g"] {
            engine
                .add_fact(
                    "node",
                    vec![Value::Str(name.to_string()), Value::Str("FUNCTION".to_string())],
                )
                .unwrap();
        }
        engine
            .add_fact(
                "edge",
                vec![
                    Value::Str("f".to_string()),
                    Value::Str("g".to_string()),
                    Value::Str("CALLS".to_string()),
                ],
            )
            .unwrap();

        let rows = engine
            .query(
                r#"
called(X) :- edge(_, X, "CALLS"), node(X, "FUNCTION").
violation(X) :- node(X, "FUNCTION"), not called(X).
"#,
                "violation",
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_str(), Some("f"));
    }

    #[test]
    fn cyclic_negation_is_rejected() {
        let engine = DatalogEngine::empty();
        let err = engine
            .query(
                r#"
p(X) :- node(X, "CALL"), not q(X).
q(X) :- node(X, "CALL"), not p(X).
"#,
                "p",
            )
            .unwrap_err();
        assert!(matches!(err, DatalogError::CyclicNegation(_)));
    }

    #[test]
    fn results_are_ordered_lexicographically() {
        let mut engine = DatalogEngine::empty();
        for id in ["zeta", "alpha", "mid"] {
            engine
                .add_fact(
                    "node",
                    vec![Value::Str(id.to_string()), Value::Str("CALL".to_string())],
                )
                .unwrap();
        }
        let rows = engine
            .query(r#"violation(X) :- node(X, "CALL")."#, "violation")
            .unwrap();
        let ids: Vec<&str> = rows.iter().filter_map(|r| r[0].as_str()).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn unknown_goal_errors() {
        let engine = DatalogEngine::empty();
        assert!(matches!(
            engine.query("", "nonsense"),
            Err(DatalogError::UnknownPredicate(_))
        ));
    }
}
