//! Guarantee management and checking.
//!
//! Two guarantee families live as nodes in the graph itself:
//!
//! - **Datalog guarantees** carry a rule program whose `violation/1`
//!   extension is reported, one diagnostic per tuple.
//! - **Contract guarantees** (`guarantee:queue` / `guarantee:api` /
//!   `guarantee:permission`) carry a JSON schema and govern target nodes
//!   via GOVERNS edges; schema failures become diagnostics.
//!
//! Compiled schemas are cached per guarantee ID and invalidated on update.

use dashmap::DashMap;
use grafema_core::diagnostics::{codes, Diagnostic, DiagnosticCollector, Severity};
use grafema_core::identity;
use grafema_core::model::{Edge, EdgeKind, Node, NodeKind};
use grafema_core::schema::NodeBuilder;
use grafema_core::store::{GraphStore, NodeFilter, StoreError};
use grafema_datalog::{DatalogEngine, DatalogError};
use std::sync::Arc;
use thiserror::Error;


/// Pseudo-file guarantee nodes are homed under; they are API-created, not
/// extracted from source.
const GUARANTEE_FILE: &str = ".grafema/guarantees";

const PHASE: &str = "VALIDATION";

#[derive(Debug, Error)]
pub enum GuaranteeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Datalog(#[from] DatalogError),
    #[error(transparent)]
    NodeSchema(#[from] grafema_core::schema::SchemaError),
    #[error("invalid schema: {0}")]
    Schema(String),
    #[error("guarantee not found: {0}")]
    NotFound(String),
    #[error("invalid guarantee: {0}")]
    Invalid(String),
}

/// What a guarantee checks.
#[derive(Debug, Clone)]
pub enum GuaranteeBody {
    Datalog { rule: String },
    Contract { schema: serde_json::Value },
}

#[derive(Debug, Clone)]
pub struct GuaranteeSpec {
    /// One of the guarantee node kinds.
    pub kind: NodeKind,
    pub name: String,
    pub severity: Severity,
    pub description: String,
    pub body: GuaranteeBody,
}

#[derive(Debug, Clone, Default)]
pub struct GuaranteePatch {
    pub severity: Option<Severity>,
    pub description: Option<String>,
    pub body: Option<GuaranteeBody>,
}

/// Filter for `find_guarantees`.
#[derive(Debug, Clone, Default)]
pub struct GuaranteeFilter {
    pub kind: Option<NodeKind>,
    pub name_contains: Option<String>,
}

pub struct GuaranteeRunner {
    schema_cache: DashMap<String, Arc<jsonschema::Validator>>,
}

impl Default for GuaranteeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl GuaranteeRunner {
    pub fn new() -> GuaranteeRunner {
        GuaranteeRunner {
            schema_cache: DashMap::new(),
        }
    }

    // ── CRUD ────────────────────────────────────────────────

    pub fn create_guarantee(
        &self,
        store: &dyn GraphStore,
        spec: GuaranteeSpec,
    ) -> Result<Node, GuaranteeError> {
        if !spec.kind.is_guarantee() {
            return Err(GuaranteeError::Invalid(format!(
                "{} is not a guarantee kind",
                spec.kind
            )));
        }
        let node = build_guarantee_node(&spec)?;
        store.add_node(node.clone())?;
        Ok(node)
    }

    pub fn get_guarantee(
        &self,
        store: &dyn GraphStore,
        id: &str,
    ) -> Result<Option<Node>, GuaranteeError> {
        Ok(store.get_node(id)?.filter(|n| n.kind.is_guarantee()))
    }

    pub fn find_guarantees(
        &self,
        store: &dyn GraphStore,
        filter: &GuaranteeFilter,
    ) -> Result<Vec<Node>, GuaranteeError> {
        let mut found = Vec::new();
        for node in store.query_nodes(&NodeFilter::new().node_type("guarantee:*"))? {
            if let Some(kind) = filter.kind {
                if node.kind != kind {
                    continue;
                }
            }
            if let Some(fragment) = &filter.name_contains {
                if !node.name.contains(fragment.as_str()) {
                    continue;
                }
            }
            found.push(node);
        }
        Ok(found)
    }

    /// Delete-then-insert so the record is rebuilt cleanly; GOVERNS edges
    /// are captured first and restored after.
    pub fn update_guarantee(
        &self,
        store: &dyn GraphStore,
        id: &str,
        patch: GuaranteePatch,
    ) -> Result<Node, GuaranteeError> {
        let existing = self
            .get_guarantee(store, id)?
            .ok_or_else(|| GuaranteeError::NotFound(id.to_string()))?;
        let governed = store.get_outgoing_edges(id, Some(&[EdgeKind::Governs]))?;

        let mut spec = spec_from_node(&existing)?;
        if let Some(severity) = patch.severity {
            spec.severity = severity;
        }
        if let Some(description) = patch.description {
            spec.description = description;
        }
        if let Some(body) = patch.body {
            spec.body = body;
        }

        store.delete_node(id)?;
        self.schema_cache.remove(id);
        tracing::debug!("guarantee '{}' rebuilt; compiled schema evicted", existing.name);

        let node = build_guarantee_node(&spec)?;
        store.add_node(node.clone())?;
        for edge in governed {
            store.add_edge(Edge::new(EdgeKind::Governs, node.id.clone(), edge.dst)?)?;
        }
        store.flush()?;
        Ok(node)
    }

    /// Removes the guarantee; its GOVERNS edges go with the node.
    pub fn delete_guarantee(
        &self,
        store: &dyn GraphStore,
        id: &str,
    ) -> Result<bool, GuaranteeError> {
        self.schema_cache.remove(id);
        Ok(store.delete_node(id)?)
    }

    /// Put a node under a contract guarantee's governance.
    pub fn add_governed(
        &self,
        store: &dyn GraphStore,
        guarantee_id: &str,
        target_id: &str,
    ) -> Result<(), GuaranteeError> {
        self.get_guarantee(store, guarantee_id)?
            .ok_or_else(|| GuaranteeError::NotFound(guarantee_id.to_string()))?;
        store.add_edge(Edge::new(EdgeKind::Governs, guarantee_id, target_id)?)?;
        Ok(())
    }

    // ── Checking ────────────────────────────────────────────

    pub fn check_guarantee(
        &self,
        store: &dyn GraphStore,
        id: &str,
        diagnostics: &DiagnosticCollector,
    ) -> Result<usize, GuaranteeError> {
        let guarantee = self
            .get_guarantee(store, id)?
            .ok_or_else(|| GuaranteeError::NotFound(id.to_string()))?;
        let engine = DatalogEngine::from_store(store)?;
        self.check_one(store, &engine, &guarantee, diagnostics)
    }

    /// Run every guarantee; the Datalog EDB snapshot is shared across them.
    pub fn check_all_guarantees(
        &self,
        store: &dyn GraphStore,
        diagnostics: &DiagnosticCollector,
    ) -> Result<usize, GuaranteeError> {
        let guarantees = self.find_guarantees(store, &GuaranteeFilter::default())?;
        if guarantees.is_empty() {
            return Ok(0);
        }
        let engine = DatalogEngine::from_store(store)?;
        let mut violations = 0;
        for guarantee in guarantees {
            violations += self.check_one(store, &engine, &guarantee, diagnostics)?;
        }
        Ok(violations)
    }

    /// Evaluate an ad-hoc rule as if it were a registered Datalog
    /// guarantee (backs the `check_invariant` API surface).
    pub fn check_invariant(
        &self,
        store: &dyn GraphStore,
        rule: &str,
        description: Option<&str>,
        diagnostics: &DiagnosticCollector,
    ) -> Result<usize, GuaranteeError> {
        let engine = DatalogEngine::from_store(store)?;
        let rows = engine.violations(rule)?;
        for row in &rows {
            diagnostics.add(
                Diagnostic::new(
                    codes::ERR_GUARANTEE_VIOLATION,
                    Severity::Error,
                    format!(
                        "invariant {} violated by {}",
                        description.unwrap_or("(ad-hoc)"),
                        row_display(row)
                    ),
                    PHASE,
                    "invariant",
                ),
            );
        }
        Ok(rows.len())
    }

    fn check_one(
        &self,
        store: &dyn GraphStore,
        engine: &DatalogEngine,
        guarantee: &Node,
        diagnostics: &DiagnosticCollector,
    ) -> Result<usize, GuaranteeError> {
        let spec = spec_from_node(guarantee)?;
        match &spec.body {
            GuaranteeBody::Datalog { rule } => {
                let rows = engine.violations(rule)?;
                for row in &rows {
                    let subject = row_display(row);
                    let mut diagnostic = Diagnostic::new(
                        codes::ERR_GUARANTEE_VIOLATION,
                        spec.severity,
                        format!("guarantee '{}' violated by {subject}", spec.name),
                        PHASE,
                        "guarantees",
                    )
                    .with_resolution_chain(vec![
                        format!("guarantee:{}", guarantee.id),
                        format!("tuple:{subject}"),
                    ]);
                    if let Some(id) = row.first().and_then(|v| v.as_str()) {
                        if let Some(node) = store.get_node(id)? {
                            diagnostic = diagnostic.with_file(node.file).with_line(node.line);
                        }
                    }
                    diagnostics.add(diagnostic);
                }
                Ok(rows.len())
            }
            GuaranteeBody::Contract { .. } => {
                let validator = self.compiled_schema(guarantee)?;
                let governed = store.get_outgoing_edges(&guarantee.id, Some(&[EdgeKind::Governs]))?;
                let mut violations = 0;
                for edge in governed {
                    let Some(target) = store.get_node(&edge.dst)? else {
                        continue;
                    };
                    let instance = serde_json::to_value(&target)
                        .map_err(|e| GuaranteeError::Schema(e.to_string()))?;
                    for error in validator.iter_errors(&instance) {
                        violations += 1;
                        diagnostics.add(
                            Diagnostic::new(
                                codes::ERR_GUARANTEE_VIOLATION,
                                spec.severity,
                                format!(
                                    "guarantee '{}': node {} fails schema: {error}",
                                    spec.name, target.id
                                ),
                                PHASE,
                                "guarantees",
                            )
                            .with_file(target.file.clone())
                            .with_line(target.line)
                            .with_resolution_chain(vec![
                                format!("guarantee:{}", guarantee.id),
                                format!("governs:{}", target.id),
                                format!("path:{}", error.instance_path),
                            ]),
                        );
                    }
                }
                Ok(violations)
            }
        }
    }

    fn compiled_schema(&self, guarantee: &Node) -> Result<Arc<jsonschema::Validator>, GuaranteeError> {
        if let Some(cached) = self.schema_cache.get(&guarantee.id) {
            return Ok(Arc::clone(cached.value()));
        }
        let schema = guarantee
            .metadata
            .get("schema")
            .ok_or_else(|| GuaranteeError::Invalid("contract guarantee without schema".into()))?;
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| GuaranteeError::Schema(e.to_string()))?;
        let validator = Arc::new(validator);
        self.schema_cache
            .insert(guarantee.id.clone(), Arc::clone(&validator));
        Ok(validator)
    }

    /// Cache entries currently held; exposed for cache-invalidation tests.
    pub fn cached_schemas(&self) -> usize {
        self.schema_cache.len()
    }
}

fn guarantee_id(kind: NodeKind, name: &str) -> String {
    identity::compute_compact(kind, name, GUARANTEE_FILE, None, None, 0)
}

fn build_guarantee_node(spec: &GuaranteeSpec) -> Result<Node, GuaranteeError> {
    let mut builder = NodeBuilder::new(spec.kind, spec.name.clone(), GUARANTEE_FILE)
        .id(guarantee_id(spec.kind, &spec.name))
        .meta("severity", spec.severity.as_str())
        .meta("description", spec.description.clone());
    builder = match &spec.body {
        GuaranteeBody::Datalog { rule } => builder
            .meta("guaranteeType", "datalog")
            .meta("rule", rule.clone()),
        GuaranteeBody::Contract { schema } => builder
            .meta("guaranteeType", "contract")
            .meta("schema", schema.clone()),
    };
    builder
        .build()
        .map_err(|e| GuaranteeError::Invalid(e.to_string()))
}

fn spec_from_node(node: &Node) -> Result<GuaranteeSpec, GuaranteeError> {
    let severity = match node.meta_str("severity") {
        Some("fatal") => Severity::Fatal,
        Some("warning") => Severity::Warning,
        Some("info") => Severity::Info,
        _ => Severity::Error,
    };
    let body = match node.meta_str("guaranteeType") {
        Some("datalog") => GuaranteeBody::Datalog {
            rule: node
                .meta_str("rule")
                .ok_or_else(|| GuaranteeError::Invalid("datalog guarantee without rule".into()))?
                .to_string(),
        },
        Some("contract") => GuaranteeBody::Contract {
            schema: node
                .metadata
                .get("schema")
                .cloned()
                .ok_or_else(|| GuaranteeError::Invalid("contract guarantee without schema".into()))?,
        },
        other => {
            return Err(GuaranteeError::Invalid(format!(
                "unknown guaranteeType {other:?}"
            )))
        }
    };
    Ok(GuaranteeSpec {
        kind: node.kind,
        name: node.name.clone(),
        severity,
        description: node.meta_str("description").unwrap_or("").to_string(),
        body,
    })
}

fn row_display(row: &[grafema_datalog::ast::Value]) -> String {
    row.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
