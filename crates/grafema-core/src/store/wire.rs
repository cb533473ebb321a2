//! Framed request/response protocol for the store boundary.
//!
//! The analyzer's workers talk to the store through this protocol so that
//! the backing store can live in-process, behind a channel, or behind a
//! local socket without the callers changing. Each request carries its own
//! reply channel; `QUERY_NODES` streams its results in chunks terminated by
//! `End`, every other request gets exactly one response.

use crate::model::{Edge, EdgeKind, Node, NodeKind};
use crate::store::{GraphStore, NodeFilter, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;

/// Streaming chunk size for `QUERY_NODES` responses.
const QUERY_CHUNK: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    AddNode(Node),
    AddNodes(Vec<Node>),
    AddEdge(Edge),
    AddEdges {
        edges: Vec<Edge>,
        skip_validation: bool,
    },
    DeleteNode {
        id: String,
    },
    DeleteEdge {
        src: String,
        dst: String,
        kind: EdgeKind,
    },
    GetNode {
        id: String,
    },
    QueryNodes {
        filter: NodeFilter,
    },
    CountNodes {
        kinds: Option<Vec<NodeKind>>,
    },
    CountEdges {
        kinds: Option<Vec<EdgeKind>>,
    },
    GetOut {
        id: String,
        kinds: Option<Vec<EdgeKind>>,
    },
    GetIn {
        id: String,
        kinds: Option<Vec<EdgeKind>>,
    },
    NodeCount,
    EdgeCount,
    Clear,
    Flush,
    Close,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Written(usize),
    Deleted(bool),
    Node(Option<Node>),
    /// One chunk of a streaming `QueryNodes` response.
    Nodes(Vec<Node>),
    Edges(Vec<Edge>),
    Count(usize),
    Counts(HashMap<String, usize>),
    /// Terminates a streaming response.
    End,
    Error {
        code: String,
        message: String,
    },
}

impl Response {
    fn from_error(err: &StoreError) -> Response {
        Response::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn error_from_wire(code: &str, message: String) -> StoreError {
    match code {
        "STORAGE_UNAVAILABLE" => StoreError::Unavailable(message),
        "VALIDATION_FAILED" => StoreError::ValidationFailed(message),
        "NOT_FOUND" => StoreError::NotFound(message),
        _ => StoreError::Unavailable(message),
    }
}

/// A request frame paired with its reply channel.
pub struct Frame {
    pub request: Request,
    pub reply: mpsc::Sender<Response>,
}

/// Pump frames into a backing store until `Close` or sender hangup.
/// Run this on a dedicated thread; see [`WireClient::connect`].
pub fn serve_store(store: Arc<dyn GraphStore>, rx: mpsc::Receiver<Frame>) {
    while let Ok(Frame { request, reply }) = rx.recv() {
        match request {
            Request::Close => {
                let _ = reply.send(Response::Ok);
                break;
            }
            Request::QueryNodes { filter } => match store.query_nodes(&filter) {
                Ok(iter) => {
                    let mut chunk = Vec::with_capacity(QUERY_CHUNK);
                    for node in iter {
                        chunk.push(node);
                        if chunk.len() == QUERY_CHUNK {
                            if reply.send(Response::Nodes(std::mem::take(&mut chunk))).is_err() {
                                break;
                            }
                        }
                    }
                    if !chunk.is_empty() {
                        let _ = reply.send(Response::Nodes(chunk));
                    }
                    let _ = reply.send(Response::End);
                }
                Err(e) => {
                    let _ = reply.send(Response::from_error(&e));
                }
            },
            other => {
                let response = handle_unary(&store, other);
                let _ = reply.send(response);
            }
        }
    }
    tracing::debug!("store server loop exited");
}

fn handle_unary(store: &Arc<dyn GraphStore>, request: Request) -> Response {
    let result: Result<Response, StoreError> = match request {
        Request::AddNode(node) => store.add_node(node).map(|_| Response::Ok),
        Request::AddNodes(nodes) => store.add_nodes(nodes).map(Response::Written),
        Request::AddEdge(edge) => store.add_edge(edge).map(|_| Response::Ok),
        Request::AddEdges {
            edges,
            skip_validation,
        } => store.add_edges(edges, skip_validation).map(Response::Written),
        Request::DeleteNode { id } => store.delete_node(&id).map(Response::Deleted),
        Request::DeleteEdge { src, dst, kind } => {
            store.delete_edge(&src, &dst, kind).map(Response::Deleted)
        }
        Request::GetNode { id } => store.get_node(&id).map(Response::Node),
        Request::CountNodes { kinds } => store
            .count_nodes_by_type(kinds.as_deref())
            .map(Response::Counts),
        Request::CountEdges { kinds } => store
            .count_edges_by_type(kinds.as_deref())
            .map(Response::Counts),
        Request::GetOut { id, kinds } => store
            .get_outgoing_edges(&id, kinds.as_deref())
            .map(Response::Edges),
        Request::GetIn { id, kinds } => store
            .get_incoming_edges(&id, kinds.as_deref())
            .map(Response::Edges),
        Request::NodeCount => store.node_count().map(Response::Count),
        Request::EdgeCount => store.edge_count().map(Response::Count),
        Request::Clear => store.clear().map(|_| Response::Ok),
        Request::Flush => store.flush().map(|_| Response::Ok),
        Request::QueryNodes { .. } | Request::Close => unreachable!("handled by caller"),
    };
    match result {
        Ok(r) => r,
        Err(e) => Response::from_error(&e),
    }
}

/// Client end of the protocol. Cloneable; each worker holds one.
#[derive(Clone)]
pub struct WireClient {
    tx: mpsc::Sender<Frame>,
}

impl WireClient {
    /// Spawn a server thread over `store` and return a connected client.
    pub fn connect(store: Arc<dyn GraphStore>) -> WireClient {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("grafema-store".to_string())
            .spawn(move || serve_store(store, rx))
            .expect("failed to spawn store server thread");
        WireClient { tx }
    }

    /// Wrap an existing frame channel (e.g. one serving a real socket pump).
    pub fn from_sender(tx: mpsc::Sender<Frame>) -> WireClient {
        WireClient { tx }
    }

    pub fn close(&self) {
        let _ = self.roundtrip(Request::Close);
    }

    fn roundtrip(&self, request: Request) -> Result<Response, StoreError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Frame {
                request,
                reply: reply_tx,
            })
            .map_err(|_| StoreError::Unavailable("store connection closed".to_string()))?;
        match reply_rx
            .recv()
            .map_err(|_| StoreError::Unavailable("store hung up".to_string()))?
        {
            Response::Error { code, message } => Err(error_from_wire(&code, message)),
            other => Ok(other),
        }
    }

    fn expect_ok(&self, request: Request) -> Result<(), StoreError> {
        match self.roundtrip(request)? {
            Response::Ok => Ok(()),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn expect_written(&self, request: Request) -> Result<usize, StoreError> {
        match self.roundtrip(request)? {
            Response::Written(n) => Ok(n),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }
}

impl GraphStore for WireClient {
    fn add_node(&self, node: Node) -> Result<(), StoreError> {
        self.expect_ok(Request::AddNode(node))
    }

    fn add_nodes(&self, nodes: Vec<Node>) -> Result<usize, StoreError> {
        self.expect_written(Request::AddNodes(nodes))
    }

    fn add_edge(&self, edge: Edge) -> Result<(), StoreError> {
        self.expect_ok(Request::AddEdge(edge))
    }

    fn add_edges(&self, edges: Vec<Edge>, skip_validation: bool) -> Result<usize, StoreError> {
        self.expect_written(Request::AddEdges {
            edges,
            skip_validation,
        })
    }

    fn delete_node(&self, id: &str) -> Result<bool, StoreError> {
        match self.roundtrip(Request::DeleteNode { id: id.to_string() })? {
            Response::Deleted(b) => Ok(b),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn delete_edge(&self, src: &str, dst: &str, kind: EdgeKind) -> Result<bool, StoreError> {
        match self.roundtrip(Request::DeleteEdge {
            src: src.to_string(),
            dst: dst.to_string(),
            kind,
        })? {
            Response::Deleted(b) => Ok(b),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.expect_ok(Request::Clear)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.expect_ok(Request::Flush)
    }

    fn get_node(&self, id: &str) -> Result<Option<Node>, StoreError> {
        match self.roundtrip(Request::GetNode { id: id.to_string() })? {
            Response::Node(n) => Ok(n),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn query_nodes(
        &self,
        filter: &NodeFilter,
    ) -> Result<Box<dyn Iterator<Item = Node> + Send>, StoreError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Frame {
                request: Request::QueryNodes {
                    filter: filter.clone(),
                },
                reply: reply_tx,
            })
            .map_err(|_| StoreError::Unavailable("store connection closed".to_string()))?;

        let mut nodes = Vec::new();
        loop {
            match reply_rx
                .recv()
                .map_err(|_| StoreError::Unavailable("store hung up mid-stream".to_string()))?
            {
                Response::Nodes(chunk) => nodes.extend(chunk),
                Response::End => break,
                Response::Error { code, message } => return Err(error_from_wire(&code, message)),
                other => {
                    return Err(StoreError::Unavailable(format!(
                        "unexpected response: {other:?}"
                    )))
                }
            }
        }
        Ok(Box::new(nodes.into_iter()))
    }

    fn get_outgoing_edges(
        &self,
        id: &str,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<Vec<Edge>, StoreError> {
        match self.roundtrip(Request::GetOut {
            id: id.to_string(),
            kinds: kinds.map(|k| k.to_vec()),
        })? {
            Response::Edges(edges) => Ok(edges),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn get_incoming_edges(
        &self,
        id: &str,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<Vec<Edge>, StoreError> {
        match self.roundtrip(Request::GetIn {
            id: id.to_string(),
            kinds: kinds.map(|k| k.to_vec()),
        })? {
            Response::Edges(edges) => Ok(edges),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn node_count(&self) -> Result<usize, StoreError> {
        match self.roundtrip(Request::NodeCount)? {
            Response::Count(n) => Ok(n),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn edge_count(&self) -> Result<usize, StoreError> {
        match self.roundtrip(Request::EdgeCount)? {
            Response::Count(n) => Ok(n),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn count_nodes_by_type(
        &self,
        kinds: Option<&[NodeKind]>,
    ) -> Result<HashMap<String, usize>, StoreError> {
        match self.roundtrip(Request::CountNodes {
            kinds: kinds.map(|k| k.to_vec()),
        })? {
            Response::Counts(c) => Ok(c),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn count_edges_by_type(
        &self,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<HashMap<String, usize>, StoreError> {
        match self.roundtrip(Request::CountEdges {
            kinds: kinds.map(|k| k.to_vec()),
        })? {
            Response::Counts(c) => Ok(c),
            other => Err(StoreError::Unavailable(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }
}
