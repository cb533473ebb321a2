//! Typed collection buffers filled by extractors.
//!
//! Extractors never talk to the store directly: they append to these
//! buffers, and the worker drains them to the store in batches once the
//! whole file is processed.

use grafema_core::model::{Edge, Node};

#[derive(Debug, Default)]
pub struct NodeBuffers {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl NodeBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, node: Node) -> String {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Look up an already-buffered node by ID (used by extractors that
    /// decorate nodes emitted earlier in the same file).
    pub fn node_by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_by_id_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Take everything out, leaving the buffers reusable.
    pub fn drain(&mut self) -> (Vec<Node>, Vec<Edge>) {
        (std::mem::take(&mut self.nodes), std::mem::take(&mut self.edges))
    }
}
