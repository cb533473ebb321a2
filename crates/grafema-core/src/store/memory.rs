//! In-memory graph store on petgraph with a semantic-ID index.

use crate::model::{Edge, EdgeKind, Node, NodeKind};
use crate::schema;
use crate::store::{GraphStore, NodeFilter, StoreError};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::sync::RwLock;

struct Inner {
    graph: StableDiGraph<Node, Edge>,
    ids: HashMap<String, NodeIndex>,
    /// Insertion order of node IDs, for stable iteration.
    order: Vec<String>,
    /// Edges whose endpoints have not both arrived yet. Drained on flush;
    /// this is what makes cross-worker edge writes safe within a phase.
    pending: Vec<Edge>,
}

impl Inner {
    fn edge_exists(&self, src: NodeIndex, dst: NodeIndex, kind: EdgeKind) -> bool {
        self.graph
            .edges_connecting(src, dst)
            .any(|e| e.weight().kind == kind)
    }
}

/// The reference store. All interior locking; callers share it behind an
/// `Arc<dyn GraphStore>`.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    strict: bool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("store lock poisoned");
        f.debug_struct("MemoryStore")
            .field("node_count", &inner.graph.node_count())
            .field("edge_count", &inner.graph.edge_count())
            .field("pending_edges", &inner.pending.len())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: RwLock::new(Inner {
                graph: StableDiGraph::new(),
                ids: HashMap::new(),
                order: Vec::new(),
                pending: Vec::new(),
            }),
            strict: false,
        }
    }

    /// Strict mode runs schema validation on every node write.
    pub fn strict() -> Self {
        MemoryStore {
            strict: true,
            ..MemoryStore::new()
        }
    }

    /// Edges parked waiting for their endpoints. Exposed for invariant
    /// checks: after ENRICHMENT this must be empty.
    pub fn pending_edge_count(&self) -> usize {
        self.inner.read().expect("store lock poisoned").pending.len()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("store lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("store lock poisoned: {e}")))
    }

    fn upsert_node(&self, inner: &mut Inner, node: Node) -> Result<(), StoreError> {
        if self.strict {
            let errors = schema::validate_node(&node);
            if !errors.is_empty() {
                return Err(StoreError::ValidationFailed(
                    errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; "),
                ));
            }
        }
        match inner.ids.get(&node.id) {
            Some(&idx) => {
                // Rebrand-and-upsert: enrichment may rewrite fields but the
                // identity triple (id, type, file) is immutable.
                let existing = &inner.graph[idx];
                if existing.kind != node.kind {
                    return Err(StoreError::Conflict(format!(
                        "node '{}' kind changed from {} to {}",
                        node.id, existing.kind, node.kind
                    )));
                }
                if existing.file != node.file {
                    return Err(StoreError::Conflict(format!(
                        "node '{}' file changed from '{}' to '{}'",
                        node.id, existing.file, node.file
                    )));
                }
                inner.graph[idx] = node;
            }
            None => {
                let id = node.id.clone();
                let idx = inner.graph.add_node(node);
                inner.ids.insert(id.clone(), idx);
                inner.order.push(id);
            }
        }
        Ok(())
    }

    fn upsert_edge(&self, inner: &mut Inner, edge: Edge) {
        let src = inner.ids.get(&edge.src).copied();
        let dst = inner.ids.get(&edge.dst).copied();
        match (src, dst) {
            (Some(s), Some(d)) => {
                if !inner.edge_exists(s, d, edge.kind) {
                    inner.graph.add_edge(s, d, edge);
                }
            }
            _ => {
                if !inner.pending.iter().any(|p| p.key() == edge.key()) {
                    inner.pending.push(edge);
                }
            }
        }
    }

    fn edges_directed(
        &self,
        id: &str,
        dir: Direction,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<Vec<Edge>, StoreError> {
        let inner = self.read()?;
        let Some(&idx) = inner.ids.get(id) else {
            return Ok(Vec::new());
        };
        let mut edges: Vec<Edge> = inner
            .graph
            .edges_directed(idx, dir)
            .filter(|e| kinds.is_none_or(|ks| ks.contains(&e.weight().kind)))
            .map(|e| e.weight().clone())
            .collect();
        // petgraph enumerates adjacency most-recent-first; sort so edge
        // enumeration (and everything traversing it) is deterministic.
        edges.sort_by(|a, b| (a.kind, &a.src, &a.dst).cmp(&(b.kind, &b.src, &b.dst)));
        Ok(edges)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore for MemoryStore {
    fn add_node(&self, node: Node) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        self.upsert_node(&mut inner, node)
    }

    fn add_nodes(&self, nodes: Vec<Node>) -> Result<usize, StoreError> {
        let mut inner = self.write()?;
        let mut written = 0;
        for node in nodes {
            match self.upsert_node(&mut inner, node) {
                Ok(()) => written += 1,
                Err(StoreError::ValidationFailed(msg)) => {
                    tracing::warn!("dropping invalid node: {msg}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    fn add_edge(&self, edge: Edge) -> Result<(), StoreError> {
        if edge.src.is_empty() || edge.dst.is_empty() {
            return Err(StoreError::ValidationFailed(format!(
                "{} edge has empty endpoint",
                edge.kind
            )));
        }
        let mut inner = self.write()?;
        self.upsert_edge(&mut inner, edge);
        Ok(())
    }

    fn add_edges(&self, edges: Vec<Edge>, skip_validation: bool) -> Result<usize, StoreError> {
        let mut inner = self.write()?;
        let mut written = 0;
        for edge in edges {
            if !skip_validation && (edge.src.is_empty() || edge.dst.is_empty()) {
                tracing::warn!("dropping {} edge with empty endpoint", edge.kind);
                continue;
            }
            self.upsert_edge(&mut inner, edge);
            written += 1;
        }
        Ok(written)
    }

    fn delete_node(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        let Some(idx) = inner.ids.remove(id) else {
            return Ok(false);
        };
        inner.graph.remove_node(idx);
        inner.order.retain(|o| o != id);
        inner.pending.retain(|e| e.src != id && e.dst != id);
        Ok(true)
    }

    fn delete_edge(&self, src: &str, dst: &str, kind: EdgeKind) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        let s = inner.ids.get(src).copied();
        let d = inner.ids.get(dst).copied();
        let (Some(s), Some(d)) = (s, d) else {
            let before = inner.pending.len();
            inner
                .pending
                .retain(|e| !(e.src == src && e.dst == dst && e.kind == kind));
            return Ok(inner.pending.len() != before);
        };
        let found = inner
            .graph
            .edges_connecting(s, d)
            .find(|e| e.weight().kind == kind)
            .map(|e| e.id());
        match found {
            Some(edge_idx) => {
                inner.graph.remove_edge(edge_idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.graph = StableDiGraph::new();
        inner.ids.clear();
        inner.order.clear();
        inner.pending.clear();
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let pending = std::mem::take(&mut inner.pending);
        let before = pending.len();
        for edge in pending {
            self.upsert_edge(&mut inner, edge);
        }
        let still_parked = inner.pending.len();
        if still_parked > 0 {
            tracing::debug!(
                "flush: {} of {} parked edges still waiting for endpoints",
                still_parked,
                before
            );
        }
        Ok(())
    }

    fn get_node(&self, id: &str) -> Result<Option<Node>, StoreError> {
        let inner = self.read()?;
        Ok(inner.ids.get(id).map(|&idx| inner.graph[idx].clone()))
    }

    fn query_nodes(
        &self,
        filter: &NodeFilter,
    ) -> Result<Box<dyn Iterator<Item = Node> + Send>, StoreError> {
        let inner = self.read()?;
        let matched: Vec<Node> = inner
            .order
            .iter()
            .filter_map(|id| inner.ids.get(id))
            .map(|&idx| &inner.graph[idx])
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        Ok(Box::new(matched.into_iter()))
    }

    fn get_outgoing_edges(
        &self,
        id: &str,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<Vec<Edge>, StoreError> {
        self.edges_directed(id, Direction::Outgoing, kinds)
    }

    fn get_incoming_edges(
        &self,
        id: &str,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<Vec<Edge>, StoreError> {
        self.edges_directed(id, Direction::Incoming, kinds)
    }

    fn node_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.graph.node_count())
    }

    fn edge_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.graph.edge_count())
    }

    fn count_nodes_by_type(
        &self,
        kinds: Option<&[NodeKind]>,
    ) -> Result<HashMap<String, usize>, StoreError> {
        let inner = self.read()?;
        let mut counts = HashMap::new();
        for idx in inner.graph.node_indices() {
            let kind = inner.graph[idx].kind;
            if kinds.is_none_or(|ks| ks.contains(&kind)) {
                *counts.entry(kind.as_str().to_string()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn count_edges_by_type(
        &self,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<HashMap<String, usize>, StoreError> {
        let inner = self.read()?;
        let mut counts = HashMap::new();
        for idx in inner.graph.edge_indices() {
            let kind = inner.graph[idx].kind;
            if kinds.is_none_or(|ks| ks.contains(&kind)) {
                *counts.entry(kind.as_str().to_string()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn all_nodes(&self) -> Result<Option<Vec<Node>>, StoreError> {
        let inner = self.read()?;
        Ok(Some(
            inner
                .order
                .iter()
                .filter_map(|id| inner.ids.get(id))
                .map(|&idx| inner.graph[idx].clone())
                .collect(),
        ))
    }

    fn all_edges(&self) -> Result<Option<Vec<Edge>>, StoreError> {
        let inner = self.read()?;
        Ok(Some(
            inner
                .graph
                .edge_indices()
                .map(|idx| inner.graph[idx].clone())
                .collect(),
        ))
    }
}
