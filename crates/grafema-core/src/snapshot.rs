//! Per-project `.grafema/` state: diagnostics log and graph snapshots.
//!
//! Snapshots are plain JSON arrays of nodes and edges, written for
//! regression testing and reloadable into any store implementation.

use crate::model::{Edge, Node};
use crate::store::GraphStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// State directory: .grafema/
pub const GRAFEMA_DIR: &str = ".grafema";

/// Diagnostics log file (one JSON object per line, appendable).
pub const DIAGNOSTICS_LOG: &str = "diagnostics.log";

/// Snapshot subdirectory.
pub const SNAPSHOT_DIR: &str = "snapshots";

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(GRAFEMA_DIR)
}

pub fn diagnostics_log_path(root: &Path) -> PathBuf {
    state_dir(root).join(DIAGNOSTICS_LOG)
}

pub fn snapshot_path(root: &Path, name: &str) -> PathBuf {
    state_dir(root).join(SNAPSHOT_DIR).join(format!("{name}.json"))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Serialize the full graph to `.grafema/snapshots/<name>.json`.
pub fn save_snapshot(store: &dyn GraphStore, root: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let nodes = store
        .all_nodes()?
        .ok_or_else(|| anyhow::anyhow!("store does not support full-graph reads"))?;
    let edges = store
        .all_edges()?
        .ok_or_else(|| anyhow::anyhow!("store does not support full-graph reads"))?;

    let path = snapshot_path(root, name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&Snapshot { nodes, edges })?;
    std::fs::write(&path, json)?;
    tracing::debug!("snapshot saved: {}", path.display());
    Ok(path)
}

/// Load a snapshot back into a store. Nodes land before edges so the edge
/// writes resolve immediately.
pub fn load_snapshot(store: &dyn GraphStore, root: &Path, name: &str) -> anyhow::Result<usize> {
    let path = snapshot_path(root, name);
    let json = std::fs::read_to_string(&path)?;
    let snapshot: Snapshot = serde_json::from_str(&json)?;
    let node_count = snapshot.nodes.len();
    store.add_nodes(snapshot.nodes)?;
    store.add_edges(snapshot.edges, false)?;
    store.flush()?;
    tracing::debug!("snapshot loaded from: {}", path.display());
    Ok(node_count)
}

/// Remove the whole state directory.
pub fn clear_state(root: &Path) -> std::io::Result<()> {
    let dir = state_dir(root);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeKind, NodeKind};
    use crate::schema::NodeBuilder;
    use crate::store::memory::MemoryStore;
    use crate::model::Edge as GraphEdge;

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store
            .add_node(
                NodeBuilder::new(NodeKind::Function, "foo", "a.js")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        store
            .add_node(
                NodeBuilder::new(NodeKind::Function, "bar", "a.js")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        store
            .add_edge(
                GraphEdge::new(EdgeKind::Calls, "a.js->FUNCTION->foo", "a.js->FUNCTION->bar")
                    .unwrap(),
            )
            .unwrap();

        save_snapshot(&store, dir.path(), "baseline").unwrap();

        let restored = MemoryStore::new();
        let loaded = load_snapshot(&restored, dir.path(), "baseline").unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(restored.node_count().unwrap(), 2);
        assert_eq!(restored.edge_count().unwrap(), 1);

        clear_state(dir.path()).unwrap();
        assert!(!state_dir(dir.path()).exists());
    }
}
