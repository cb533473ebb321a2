//! Tool surface: a closed set of named tools with JSON-schema inputs,
//! mapping 1:1 onto query and guarantee operations. This is the same
//! capability set an MCP server would expose; the registry here serves
//! both the HTTP shell and any future stdio transport.

use crate::{CheckerBridge, ServerState};
use grafema_analyzer::orchestrator::{AnalyzeConfig, Orchestrator};
use grafema_core::model::EdgeKind;
use grafema_core::store::NodeFilter;
use grafema_guarantees::{GuaranteeBody, GuaranteeFilter, GuaranteeSpec};
use grafema_query as query;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: fn() -> Value,
}

/// The closed tool set. Names are the contract.
pub const TOOL_NAMES: &[&str] = &[
    "query_graph",
    "find_nodes",
    "find_calls",
    "trace_alias",
    "trace_dataflow",
    "get_context",
    "get_function_details",
    "get_file_overview",
    "find_guards",
    "discover_services",
    "analyze_project",
    "get_analysis_status",
    "get_stats",
    "get_schema",
    "create_guarantee",
    "list_guarantees",
    "check_guarantees",
    "delete_guarantee",
    "check_invariant",
];

pub fn tool_definitions() -> Vec<Value> {
    definitions()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": (tool.input_schema)(),
            })
        })
        .collect()
}

fn definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "query_graph",
            description: "Evaluate a Datalog program against the graph and return the goal's extension.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "goal": { "type": "string", "default": "violation" },
                        "limit": { "type": "integer" },
                        "offset": { "type": "integer" },
                    },
                    "required": ["query"],
                })
            },
        },
        ToolDef {
            name: "find_nodes",
            description: "List nodes filtered by type, file substring, and name substring.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "type": { "type": "string" },
                        "file": { "type": "string" },
                        "name": { "type": "string" },
                        "first": { "type": "integer", "default": 50, "maximum": 250 },
                        "after": { "type": "string" },
                    },
                })
            },
        },
        ToolDef {
            name: "find_calls",
            description: "Resolve call sites by static name and optional receiver class.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "target": { "type": "string" },
                        "className": { "type": "string" },
                        "limit": { "type": "integer" },
                    },
                    "required": ["target"],
                })
            },
        },
        ToolDef {
            name: "trace_alias",
            description: "Follow ASSIGNED_FROM from a variable until a non-variable source.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "variable": { "type": "string" },
                        "file": { "type": "string" },
                    },
                    "required": ["variable", "file"],
                })
            },
        },
        ToolDef {
            name: "trace_dataflow",
            description: "Enumerate data-flow paths from a node, forward, backward, or both.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "source": { "type": "string" },
                        "direction": { "type": "string", "enum": ["forward", "backward", "both"] },
                        "maxDepth": { "type": "integer", "default": 10 },
                    },
                    "required": ["source"],
                })
            },
        },
        ToolDef {
            name: "get_context",
            description: "A node plus its immediate neighborhood: parents, children, and edges.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": { "id": { "type": "string" } },
                    "required": ["id"],
                })
            },
        },
        ToolDef {
            name: "get_function_details",
            description: "A function with its incoming and outgoing CALLS, optionally transitive.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "file": { "type": "string" },
                        "transitive": { "type": "boolean", "default": false },
                    },
                    "required": ["name"],
                })
            },
        },
        ToolDef {
            name: "get_file_overview",
            description: "The MODULE node of a file plus its declarations grouped by kind.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": { "file": { "type": "string" } },
                    "required": ["file"],
                })
            },
        },
        ToolDef {
            name: "find_guards",
            description: "Conditional scopes guarding a node, innermost first, with parsed constraints.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": { "id": { "type": "string" } },
                    "required": ["id"],
                })
            },
        },
        ToolDef {
            name: "discover_services",
            description: "Detect service roots (package.json boundaries) under the analysis root.",
            input_schema: || json!({ "type": "object", "properties": {} }),
        },
        ToolDef {
            name: "analyze_project",
            description: "Run the full analysis pipeline over the project root.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "service": { "type": "string" },
                        "force": { "type": "boolean", "default": false },
                    },
                })
            },
        },
        ToolDef {
            name: "get_analysis_status",
            description: "Phase, task counts, and per-phase durations of the latest run.",
            input_schema: || json!({ "type": "object", "properties": {} }),
        },
        ToolDef {
            name: "get_stats",
            description: "Node and edge counts, total and by type.",
            input_schema: || json!({ "type": "object", "properties": {} }),
        },
        ToolDef {
            name: "get_schema",
            description: "The node kinds, edge kinds, and extensional predicates the graph exposes.",
            input_schema: || json!({ "type": "object", "properties": {} }),
        },
        ToolDef {
            name: "create_guarantee",
            description: "Register a Datalog or JSON-schema contract guarantee.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": ["guarantee:queue", "guarantee:api", "guarantee:permission"],
                        },
                        "name": { "type": "string" },
                        "severity": { "type": "string", "enum": ["fatal", "error", "warning", "info"] },
                        "description": { "type": "string" },
                        "rule": { "type": "string" },
                        "schema": { "type": "object" },
                    },
                    "required": ["type", "name"],
                })
            },
        },
        ToolDef {
            name: "list_guarantees",
            description: "List registered guarantees.",
            input_schema: || json!({ "type": "object", "properties": {} }),
        },
        ToolDef {
            name: "check_guarantees",
            description: "Run all guarantees (or a named subset) and report violations.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "names": { "type": "array", "items": { "type": "string" } },
                    },
                })
            },
        },
        ToolDef {
            name: "delete_guarantee",
            description: "Delete a guarantee, cascading its GOVERNS edges.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": { "id": { "type": "string" } },
                    "required": ["id"],
                })
            },
        },
        ToolDef {
            name: "check_invariant",
            description: "Evaluate an ad-hoc Datalog rule as a one-off guarantee.",
            input_schema: || {
                json!({
                    "type": "object",
                    "properties": {
                        "rule": { "type": "string" },
                        "description": { "type": "string" },
                    },
                    "required": ["rule"],
                })
            },
        },
    ]
}

fn str_arg(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{key}'"))
}

fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn opt_usize(args: &Value, key: &str) -> Option<usize> {
    args.get(key).and_then(|v| v.as_u64()).map(|v| v as usize)
}

pub async fn dispatch(state: &Arc<ServerState>, name: &str, args: Value) -> anyhow::Result<Value> {
    let store = state.store.as_ref();
    match name {
        "query_graph" => {
            let engine = grafema_datalog::DatalogEngine::from_store(store)?;
            let goal = opt_str(&args, "goal").unwrap_or_else(|| "violation".to_string());
            let rows = engine.query(&str_arg(&args, "query")?, &goal)?;
            let total = rows.len();
            let offset = opt_usize(&args, "offset").unwrap_or(0);
            let limit = opt_usize(&args, "limit")
                .unwrap_or(query::DEFAULT_PAGE_SIZE)
                .min(query::MAX_PAGE_SIZE);
            let page: Vec<_> = rows.into_iter().skip(offset).take(limit).collect();
            Ok(json!({ "goal": goal, "totalCount": total, "rows": page }))
        }
        "find_nodes" => {
            let mut filter = NodeFilter::new();
            if let Some(t) = opt_str(&args, "type") {
                filter = filter.node_type(t);
            }
            if let Some(f) = opt_str(&args, "file") {
                filter = filter.file_contains(f);
            }
            if let Some(n) = opt_str(&args, "name") {
                filter = filter.name_contains(n);
            }
            let connection = query::nodes(
                store,
                &filter,
                opt_usize(&args, "first"),
                opt_str(&args, "after").as_deref(),
            )?;
            Ok(serde_json::to_value(connection)?)
        }
        "find_calls" => {
            let calls = query::find_calls(
                store,
                &str_arg(&args, "target")?,
                opt_str(&args, "className").as_deref(),
                opt_usize(&args, "limit"),
            )?;
            Ok(json!({ "calls": calls }))
        }
        "trace_alias" => {
            let chain = query::trace_alias(
                store,
                &str_arg(&args, "variable")?,
                &str_arg(&args, "file")?,
            )?;
            Ok(json!({ "chain": chain }))
        }
        "trace_dataflow" => {
            let direction = opt_str(&args, "direction")
                .unwrap_or_else(|| "both".to_string())
                .parse::<query::Direction>()
                .map_err(|_| anyhow::anyhow!("direction must be forward, backward, or both"))?;
            let nodes = query::trace_data_flow(
                store,
                &str_arg(&args, "source")?,
                direction,
                opt_usize(&args, "maxDepth").unwrap_or(10),
            )?;
            Ok(json!({ "nodes": nodes }))
        }
        "get_context" => {
            let id = str_arg(&args, "id")?;
            let Some(node) = store.get_node(&id)? else {
                anyhow::bail!("node not found: {id}");
            };
            let outgoing = store.get_outgoing_edges(&id, None)?;
            let incoming = store.get_incoming_edges(&id, None)?;
            let parent = incoming
                .iter()
                .find(|e| e.kind == EdgeKind::Contains)
                .map(|e| e.src.clone());
            Ok(json!({
                "node": node,
                "parent": parent,
                "outgoing": outgoing,
                "incoming": incoming,
            }))
        }
        "get_function_details" => {
            let details = query::get_function_details(
                store,
                &str_arg(&args, "name")?,
                opt_str(&args, "file").as_deref(),
                args.get("transitive").and_then(|v| v.as_bool()).unwrap_or(false),
            )?;
            Ok(serde_json::to_value(details)?)
        }
        "get_file_overview" => query::file_overview(store, &str_arg(&args, "file")?),
        "find_guards" => {
            let guards = query::find_guards(store, &str_arg(&args, "id")?)?;
            Ok(serde_json::to_value(guards)?)
        }
        "discover_services" => {
            let services = grafema_analyzer::discover_services(&state.root)?;
            Ok(json!({
                "services": services
                    .iter()
                    .map(|s| json!({
                        "name": s.name,
                        "root": s.root,
                        "packageName": s.package_name,
                    }))
                    .collect::<Vec<_>>(),
            }))
        }
        "analyze_project" => {
            let orchestrator = Orchestrator::new(
                Arc::clone(&state.store),
                Arc::clone(&state.diagnostics),
                AnalyzeConfig {
                    root: state.root.clone(),
                    service: opt_str(&args, "service"),
                    force: args.get("force").and_then(|v| v.as_bool()).unwrap_or(false),
                    ..AnalyzeConfig::default()
                },
            )
            .with_checker(Arc::new(CheckerBridge(Arc::clone(&state.runner))));
            if let Ok(mut slot) = state.analysis.write() {
                *slot = Some(orchestrator.status_handle());
            }
            let summary = tokio::task::spawn_blocking(move || orchestrator.run()).await??;
            Ok(json!({
                "files": summary.files,
                "nodes": summary.nodes,
                "edges": summary.edges,
                "tasksCompleted": summary.tasks_completed,
                "tasksFailed": summary.tasks_failed,
                "violations": summary.violations,
            }))
        }
        "get_analysis_status" => {
            let guard = state
                .analysis
                .read()
                .map_err(|_| anyhow::anyhow!("status lock poisoned"))?;
            match guard.as_ref() {
                Some(status) => {
                    let status = status
                        .read()
                        .map_err(|_| anyhow::anyhow!("status lock poisoned"))?;
                    Ok(json!({
                        "phase": status.phase,
                        "tasksTotal": status.tasks_total,
                        "tasksCompleted": status.tasks_completed,
                        "tasksFailed": status.tasks_failed,
                        "finished": status.finished,
                    }))
                }
                None => Ok(json!({ "phase": null, "finished": false })),
            }
        }
        "get_stats" => query::stats(store),
        "get_schema" => Ok(json!({
            "nodeKinds": grafema_core::NodeKind::all()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>(),
            "edgeKinds": grafema_core::EdgeKind::all()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>(),
            "predicates": ["node(Id, Type)", "edge(Src, Dst, Type)", "attr(Id, Name, Value)"],
        })),
        "create_guarantee" => {
            let kind = grafema_core::NodeKind::from_str(&str_arg(&args, "type")?)
                .map_err(|_| anyhow::anyhow!("type must be a guarantee:* kind"))?;
            let severity = match opt_str(&args, "severity").as_deref() {
                Some("fatal") => grafema_core::Severity::Fatal,
                Some("warning") => grafema_core::Severity::Warning,
                Some("info") => grafema_core::Severity::Info,
                _ => grafema_core::Severity::Error,
            };
            let body = match (opt_str(&args, "rule"), args.get("schema")) {
                (Some(rule), None) => GuaranteeBody::Datalog { rule },
                (None, Some(schema)) => GuaranteeBody::Contract {
                    schema: schema.clone(),
                },
                _ => anyhow::bail!("provide exactly one of 'rule' or 'schema'"),
            };
            let node = state.runner.create_guarantee(
                store,
                GuaranteeSpec {
                    kind,
                    name: str_arg(&args, "name")?,
                    severity,
                    description: opt_str(&args, "description").unwrap_or_default(),
                    body,
                },
            )?;
            Ok(serde_json::to_value(node)?)
        }
        "list_guarantees" => {
            let guarantees = state
                .runner
                .find_guarantees(store, &GuaranteeFilter::default())?;
            Ok(json!({ "guarantees": guarantees }))
        }
        "check_guarantees" => {
            let collector = grafema_core::DiagnosticCollector::new();
            let violations = state.runner.check_all_guarantees(store, &collector)?;
            Ok(json!({ "violations": violations, "diagnostics": collector.all() }))
        }
        "delete_guarantee" => {
            let deleted = state
                .runner
                .delete_guarantee(store, &str_arg(&args, "id")?)?;
            Ok(json!({ "deleted": deleted }))
        }
        "check_invariant" => {
            let collector = grafema_core::DiagnosticCollector::new();
            let violations = state.runner.check_invariant(
                store,
                &str_arg(&args, "rule")?,
                opt_str(&args, "description").as_deref(),
                &collector,
            )?;
            Ok(json!({ "violations": violations, "diagnostics": collector.all() }))
        }
        other => anyhow::bail!("unknown tool '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grafema_core::schema::NodeBuilder;
    use grafema_core::store::memory::MemoryStore;
    use grafema_core::GraphStore;
    use grafema_core::NodeKind;
    use std::path::PathBuf;

    fn test_state() -> Arc<ServerState> {
        let store = MemoryStore::new();
        store
            .add_node(
                NodeBuilder::new(NodeKind::Call, "eval", "app.js")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        Arc::new(ServerState::new(Arc::new(store), PathBuf::from(".")))
    }

    #[test]
    fn every_tool_has_a_definition() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), TOOL_NAMES.len());
        for name in TOOL_NAMES {
            assert!(
                defs.iter().any(|d| d["name"] == *name),
                "missing tool definition for {name}"
            );
        }
    }

    #[tokio::test]
    async fn dispatch_query_graph() {
        let state = test_state();
        let result = dispatch(
            &state,
            "query_graph",
            json!({ "query": r#"violation(X) :- node(X, "CALL"), attr(X, "name", "eval")."# }),
        )
        .await
        .unwrap();
        assert_eq!(result["totalCount"], 1);
    }

    #[tokio::test]
    async fn dispatch_find_nodes_and_stats() {
        let state = test_state();
        let found = dispatch(&state, "find_nodes", json!({ "type": "CALL" }))
            .await
            .unwrap();
        assert_eq!(found["totalCount"], 1);

        let stats = dispatch(&state, "get_stats", json!({})).await.unwrap();
        assert_eq!(stats["nodes"], 1);
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_tool() {
        let state = test_state();
        assert!(dispatch(&state, "not_a_tool", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn dispatch_get_schema_lists_kinds() {
        let state = test_state();
        let schema = dispatch(&state, "get_schema", json!({})).await.unwrap();
        assert!(schema["nodeKinds"]
            .as_array()
            .unwrap()
            .iter()
            .any(|k| k == "http:route"));
    }
}
