//! Graph store contract.
//!
//! The core depends on this abstract interface only; the in-memory store in
//! [`memory`] is the reference implementation and [`wire`] carries the same
//! operations over a framed request/response channel.

pub mod memory;
pub mod wire;

use crate::model::{Edge, EdgeKind, Node, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Store failure modes. Connection failures are retried by the orchestrator;
/// validation failures are logged and the record is skipped.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("schema conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Wire error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "STORAGE_UNAVAILABLE",
            StoreError::ValidationFailed(_) => "VALIDATION_FAILED",
            StoreError::Conflict(_) => "VALIDATION_FAILED",
            StoreError::NotFound(_) => "NOT_FOUND",
        }
    }
}

/// Filter for node queries. All present fields must match (AND semantics).
/// `node_type` supports a trailing wildcard for namespaced kinds:
/// `"http:*"` matches every `http:` kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_type(mut self, t: impl Into<String>) -> Self {
        self.node_type = Some(t.into());
        self
    }

    pub fn kind(self, k: NodeKind) -> Self {
        self.node_type(k.as_str())
    }

    pub fn file_contains(mut self, f: impl Into<String>) -> Self {
        self.file_contains = Some(f.into());
        self
    }

    pub fn name_contains(mut self, n: impl Into<String>) -> Self {
        self.name_contains = Some(n.into());
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        if let Some(t) = &self.node_type {
            let kind = node.kind.as_str();
            let matched = match t.strip_suffix('*') {
                Some(prefix) => kind.starts_with(prefix),
                None => kind == t,
            };
            if !matched {
                return false;
            }
        }
        if let Some(f) = &self.file_contains {
            if !node.file.contains(f.as_str()) {
                return false;
            }
        }
        if let Some(n) = &self.name_contains {
            if !node.name.contains(n.as_str()) {
                return false;
            }
        }
        true
    }
}

/// The store contract. Writes are idempotent upserts: nodes by `id`, edges
/// by `(src, dst, kind)`. Writes from one worker are observed in submission
/// order by that worker's subsequent reads after `flush`; cross-worker
/// ordering is only guaranteed across a phase barrier.
pub trait GraphStore: Send + Sync {
    // ── Writes ──────────────────────────────────────────────
    fn add_node(&self, node: Node) -> Result<(), StoreError>;
    fn add_nodes(&self, nodes: Vec<Node>) -> Result<usize, StoreError>;
    fn add_edge(&self, edge: Edge) -> Result<(), StoreError>;
    fn add_edges(&self, edges: Vec<Edge>, skip_validation: bool) -> Result<usize, StoreError>;
    fn delete_node(&self, id: &str) -> Result<bool, StoreError>;
    fn delete_edge(&self, src: &str, dst: &str, kind: EdgeKind) -> Result<bool, StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
    fn flush(&self) -> Result<(), StoreError>;

    // ── Reads ───────────────────────────────────────────────
    fn get_node(&self, id: &str) -> Result<Option<Node>, StoreError>;
    /// Finite, non-restartable stream of matching nodes.
    fn query_nodes(&self, filter: &NodeFilter)
        -> Result<Box<dyn Iterator<Item = Node> + Send>, StoreError>;
    fn get_outgoing_edges(
        &self,
        id: &str,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<Vec<Edge>, StoreError>;
    fn get_incoming_edges(
        &self,
        id: &str,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<Vec<Edge>, StoreError>;
    fn node_count(&self) -> Result<usize, StoreError>;
    fn edge_count(&self) -> Result<usize, StoreError>;
    fn count_nodes_by_type(
        &self,
        kinds: Option<&[NodeKind]>,
    ) -> Result<HashMap<String, usize>, StoreError>;
    fn count_edges_by_type(
        &self,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<HashMap<String, usize>, StoreError>;

    /// Optional full-scan reads. Validators skip work when these return
    /// `None`; the in-memory store supports both.
    fn all_nodes(&self) -> Result<Option<Vec<Node>>, StoreError> {
        Ok(None)
    }
    fn all_edges(&self) -> Result<Option<Vec<Edge>>, StoreError> {
        Ok(None)
    }
}
