//! REST handlers for the query API. Shapes mirror the query surface:
//! connections for lists, plain JSON objects elsewhere.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use grafema_analyzer::orchestrator::{AnalyzeConfig, Orchestrator};
use grafema_core::model::{EdgeKind, NodeKind};
use grafema_core::store::NodeFilter;
use grafema_guarantees::{GuaranteeBody, GuaranteeFilter, GuaranteeSpec};
use grafema_query as query;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{CheckerBridge, ServerState};

pub type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn internal(e: impl ToString) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
}

fn parse_edge_kinds(raw: Option<&str>) -> Result<Option<Vec<EdgeKind>>, (StatusCode, Json<Value>)> {
    let Some(raw) = raw else { return Ok(None) };
    let mut kinds = Vec::new();
    for part in raw.split(',').filter(|p| !p.is_empty()) {
        let kind = EdgeKind::from_str(part)
            .map_err(|_| bad_request(&format!("unknown edge type '{part}'")))?;
        kinds.push(kind);
    }
    Ok(Some(kinds))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_node(State(state): State<Arc<ServerState>>, Path(id): Path<String>) -> ApiResult {
    match query::node(state.store.as_ref(), &id).map_err(internal)? {
        Some(node) => Ok(Json(serde_json::to_value(node).map_err(internal)?)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "node not found" })),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct NodesParams {
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    pub file: Option<String>,
    pub name: Option<String>,
    pub first: Option<usize>,
    pub after: Option<String>,
}

pub async fn list_nodes(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<NodesParams>,
) -> ApiResult {
    let mut filter = NodeFilter::new();
    if let Some(node_type) = params.node_type {
        filter = filter.node_type(node_type);
    }
    if let Some(file) = params.file {
        filter = filter.file_contains(file);
    }
    if let Some(name) = params.name {
        filter = filter.name_contains(name);
    }
    let connection = query::nodes(
        state.store.as_ref(),
        &filter,
        params.first,
        params.after.as_deref(),
    )
    .map_err(internal)?;
    Ok(Json(serde_json::to_value(connection).map_err(internal)?))
}

#[derive(Debug, Deserialize)]
pub struct TraverseParams {
    pub start: String,
    pub depth: Option<usize>,
    pub edges: Option<String>,
}

pub async fn bfs(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<TraverseParams>,
) -> ApiResult {
    let kinds = parse_edge_kinds(params.edges.as_deref())?;
    let starts: Vec<String> = params.start.split(',').map(String::from).collect();
    let visited = query::bfs(
        state.store.as_ref(),
        &starts,
        params.depth.unwrap_or(10),
        kinds.as_deref(),
    )
    .map_err(internal)?;
    Ok(Json(json!({ "visited": visited })))
}

pub async fn dfs(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<TraverseParams>,
) -> ApiResult {
    let kinds = parse_edge_kinds(params.edges.as_deref())?;
    let starts: Vec<String> = params.start.split(',').map(String::from).collect();
    let visited = query::dfs(
        state.store.as_ref(),
        &starts,
        params.depth.unwrap_or(10),
        kinds.as_deref(),
    )
    .map_err(internal)?;
    Ok(Json(json!({ "visited": visited })))
}

#[derive(Debug, Deserialize)]
pub struct ReachabilityParams {
    pub from: String,
    pub to: String,
    pub depth: Option<usize>,
    pub edges: Option<String>,
}

pub async fn reachability(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ReachabilityParams>,
) -> ApiResult {
    let kinds = parse_edge_kinds(params.edges.as_deref())?;
    let reachable = query::reachability(
        state.store.as_ref(),
        &params.from,
        &params.to,
        kinds.as_deref(),
        params.depth.unwrap_or(10),
    )
    .map_err(internal)?;
    Ok(Json(json!({ "reachable": reachable })))
}

#[derive(Debug, Deserialize)]
pub struct CallsParams {
    pub target: String,
    pub class: Option<String>,
    pub limit: Option<usize>,
}

pub async fn find_calls(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CallsParams>,
) -> ApiResult {
    let calls = query::find_calls(
        state.store.as_ref(),
        &params.target,
        params.class.as_deref(),
        params.limit,
    )
    .map_err(internal)?;
    let count = calls.len();
    Ok(Json(json!({ "calls": calls, "count": count })))
}

#[derive(Debug, Deserialize)]
pub struct FunctionParams {
    pub name: String,
    pub file: Option<String>,
    pub transitive: Option<bool>,
}

pub async fn function_details(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<FunctionParams>,
) -> ApiResult {
    let details = query::get_function_details(
        state.store.as_ref(),
        &params.name,
        params.file.as_deref(),
        params.transitive.unwrap_or(false),
    )
    .map_err(internal)?;
    match details {
        Some(details) => Ok(Json(serde_json::to_value(details).map_err(internal)?)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "function not found" })),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct GuardsParams {
    pub node: String,
}

pub async fn find_guards(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<GuardsParams>,
) -> ApiResult {
    let guards = query::find_guards(state.store.as_ref(), &params.node).map_err(internal)?;
    Ok(Json(serde_json::to_value(guards).map_err(internal)?))
}

#[derive(Debug, Deserialize)]
pub struct AliasParams {
    pub variable: String,
    pub file: String,
}

pub async fn trace_alias(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<AliasParams>,
) -> ApiResult {
    let chain = query::trace_alias(state.store.as_ref(), &params.variable, &params.file)
        .map_err(internal)?;
    Ok(Json(json!({ "chain": chain })))
}

#[derive(Debug, Deserialize)]
pub struct DataflowParams {
    pub source: String,
    pub direction: Option<String>,
    pub depth: Option<usize>,
}

pub async fn trace_dataflow(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<DataflowParams>,
) -> ApiResult {
    let direction = params
        .direction
        .as_deref()
        .unwrap_or("both")
        .parse::<query::Direction>()
        .map_err(|_| bad_request("direction must be forward, backward, or both"))?;
    let nodes = query::trace_data_flow(
        state.store.as_ref(),
        &params.source,
        direction,
        params.depth.unwrap_or(10),
    )
    .map_err(internal)?;
    Ok(Json(json!({ "nodes": nodes })))
}

pub async fn stats(State(state): State<Arc<ServerState>>) -> ApiResult {
    Ok(Json(query::stats(state.store.as_ref()).map_err(internal)?))
}

pub async fn analysis_status(State(state): State<Arc<ServerState>>) -> ApiResult {
    let guard = state.analysis.read().map_err(internal)?;
    match guard.as_ref() {
        Some(status) => {
            let status = status.read().map_err(internal)?;
            Ok(Json(json!({
                "phase": status.phase,
                "tasksTotal": status.tasks_total,
                "tasksCompleted": status.tasks_completed,
                "tasksFailed": status.tasks_failed,
                "finished": status.finished,
                "phaseDurationsMs": status
                    .phase_durations
                    .iter()
                    .map(|(phase, d)| json!({ "phase": phase, "ms": d.as_millis() as u64 }))
                    .collect::<Vec<_>>(),
            })))
        }
        None => Ok(Json(json!({ "phase": null, "finished": false }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct FileParams {
    pub path: String,
}

pub async fn file_overview(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<FileParams>,
) -> ApiResult {
    Ok(Json(
        query::file_overview(state.store.as_ref(), &params.path).map_err(internal)?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct DatalogRequest {
    pub query: String,
    pub goal: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn datalog(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<DatalogRequest>,
) -> ApiResult {
    let engine =
        grafema_datalog::DatalogEngine::from_store(state.store.as_ref()).map_err(internal)?;
    let goal = request.goal.as_deref().unwrap_or("violation");
    let rows = engine
        .query(&request.query, goal)
        .map_err(|e| bad_request(&e.to_string()))?;
    let total = rows.len();
    let offset = request.offset.unwrap_or(0);
    let limit = request.limit.unwrap_or(query::DEFAULT_PAGE_SIZE).min(query::MAX_PAGE_SIZE);
    let page: Vec<_> = rows.into_iter().skip(offset).take(limit).collect();
    Ok(Json(json!({
        "goal": goal,
        "totalCount": total,
        "rows": page,
    })))
}

#[derive(Debug, Deserialize, Default)]
pub struct AnalyzeRequest {
    pub service: Option<String>,
    pub force: Option<bool>,
}

pub async fn analyze(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult {
    let orchestrator = Orchestrator::new(
        Arc::clone(&state.store),
        Arc::clone(&state.diagnostics),
        AnalyzeConfig {
            root: state.root.clone(),
            service: request.service,
            force: request.force.unwrap_or(false),
            ..AnalyzeConfig::default()
        },
    )
    .with_checker(Arc::new(CheckerBridge(Arc::clone(&state.runner))));

    *state.analysis.write().map_err(internal)? = Some(orchestrator.status_handle());

    let summary = tokio::task::spawn_blocking(move || orchestrator.run())
        .await
        .map_err(internal)?
        .map_err(internal)?;

    Ok(Json(json!({
        "services": summary.services,
        "files": summary.files,
        "tasksCompleted": summary.tasks_completed,
        "tasksFailed": summary.tasks_failed,
        "nodes": summary.nodes,
        "edges": summary.edges,
        "violations": summary.violations,
        "fatal": summary.fatal,
        "durationMs": summary.duration.as_millis() as u64,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateGuaranteeRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub severity: Option<String>,
    pub description: Option<String>,
    pub rule: Option<String>,
    pub schema: Option<Value>,
}

pub async fn create_guarantee(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateGuaranteeRequest>,
) -> ApiResult {
    let kind = NodeKind::from_str(&request.kind)
        .map_err(|_| bad_request("type must be a guarantee:* kind"))?;
    let severity = match request.severity.as_deref() {
        Some("fatal") => grafema_core::Severity::Fatal,
        Some("warning") => grafema_core::Severity::Warning,
        Some("info") => grafema_core::Severity::Info,
        _ => grafema_core::Severity::Error,
    };
    let body = match (request.rule, request.schema) {
        (Some(rule), None) => GuaranteeBody::Datalog { rule },
        (None, Some(schema)) => GuaranteeBody::Contract { schema },
        _ => return Err(bad_request("provide exactly one of 'rule' or 'schema'")),
    };
    let node = state
        .runner
        .create_guarantee(
            state.store.as_ref(),
            GuaranteeSpec {
                kind,
                name: request.name,
                severity,
                description: request.description.unwrap_or_default(),
                body,
            },
        )
        .map_err(|e| bad_request(&e.to_string()))?;
    Ok(Json(serde_json::to_value(node).map_err(internal)?))
}

pub async fn list_guarantees(State(state): State<Arc<ServerState>>) -> ApiResult {
    let guarantees = state
        .runner
        .find_guarantees(state.store.as_ref(), &GuaranteeFilter::default())
        .map_err(internal)?;
    Ok(Json(json!({ "guarantees": guarantees })))
}

pub async fn delete_guarantee(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let deleted = state
        .runner
        .delete_guarantee(state.store.as_ref(), &id)
        .map_err(internal)?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Debug, Deserialize, Default)]
pub struct CheckGuaranteesRequest {
    pub names: Option<Vec<String>>,
}

pub async fn check_guarantees(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CheckGuaranteesRequest>,
) -> ApiResult {
    let collector = grafema_core::DiagnosticCollector::new();
    let violations = match request.names {
        Some(names) => {
            let mut total = 0;
            let all = state
                .runner
                .find_guarantees(state.store.as_ref(), &GuaranteeFilter::default())
                .map_err(internal)?;
            for guarantee in all.iter().filter(|g| names.contains(&g.name)) {
                total += state
                    .runner
                    .check_guarantee(state.store.as_ref(), &guarantee.id, &collector)
                    .map_err(internal)?;
            }
            total
        }
        None => state
            .runner
            .check_all_guarantees(state.store.as_ref(), &collector)
            .map_err(internal)?,
    };
    Ok(Json(json!({
        "violations": violations,
        "diagnostics": collector.all(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct InvariantRequest {
    pub rule: String,
    pub description: Option<String>,
}

pub async fn check_invariant(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<InvariantRequest>,
) -> ApiResult {
    let collector = grafema_core::DiagnosticCollector::new();
    let violations = state
        .runner
        .check_invariant(
            state.store.as_ref(),
            &request.rule,
            request.description.as_deref(),
            &collector,
        )
        .map_err(|e| bad_request(&e.to_string()))?;
    Ok(Json(json!({
        "violations": violations,
        "diagnostics": collector.all(),
    })))
}

pub async fn list_tools() -> Json<Value> {
    Json(json!({ "tools": crate::tools::tool_definitions() }))
}

pub async fn call_tool(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> ApiResult {
    crate::tools::dispatch(&state, &name, args)
        .await
        .map(Json)
        .map_err(|e| bad_request(&e.to_string()))
}
