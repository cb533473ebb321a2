//! Analysis worker pool.
//!
//! Dedicated OS threads fed by an mpsc task queue. Each worker owns its own
//! tree-sitter parser, scope tracker, and store handle; nothing mutable is
//! shared between workers except the store itself. Cancellation is
//! cooperative: workers check the exit flag between tasks, never mid-parse.

use crate::buffers::NodeBuffers;
use crate::discovery::SourceFile;
use crate::extract::{default_extractors, ModuleInfo};
use grafema_core::scope::ScopeTracker;
use grafema_core::store::GraphStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tree_sitter::Parser;

/// One unit of analysis work.
#[derive(Debug, Clone)]
pub struct Task {
    pub file: SourceFile,
    pub module_id: String,
}

#[derive(Debug)]
pub enum WorkerEvent {
    /// Worker finished initialization and is consuming tasks.
    Ready { worker: usize },
    Done {
        file: String,
        nodes: usize,
        edges: usize,
    },
    Failed {
        file: String,
        message: String,
    },
    Exited {
        worker: usize,
        error: Option<String>,
    },
}

pub struct WorkerPool {
    task_tx: Option<mpsc::Sender<Task>>,
    pub events: mpsc::Receiver<WorkerEvent>,
    handles: Vec<JoinHandle<()>>,
    exit: Arc<AtomicBool>,
    pub size: usize,
}

impl WorkerPool {
    /// Default pool size: logical CPUs, capped at 16.
    pub fn default_size() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .min(16)
    }

    pub fn spawn(size: usize, store: Arc<dyn GraphStore>) -> WorkerPool {
        let (task_tx, task_rx) = mpsc::channel::<Task>();
        let (event_tx, events) = mpsc::channel::<WorkerEvent>();
        let task_rx = Arc::new(Mutex::new(task_rx));
        let exit = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(size);
        for worker in 0..size {
            let task_rx = Arc::clone(&task_rx);
            let event_tx = event_tx.clone();
            let store = Arc::clone(&store);
            let exit = Arc::clone(&exit);
            let handle = std::thread::Builder::new()
                .name(format!("grafema-worker-{worker}"))
                .spawn(move || worker_loop(worker, task_rx, store, event_tx, exit))
                .expect("failed to spawn analysis worker");
            handles.push(handle);
        }

        WorkerPool {
            task_tx: Some(task_tx),
            events,
            handles,
            exit,
            size,
        }
    }

    pub fn submit(&self, task: Task) -> anyhow::Result<()> {
        self.task_tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("pool already sealed"))?
            .send(task)
            .map_err(|_| anyhow::anyhow!("all workers have exited"))
    }

    /// No more tasks will arrive; workers drain the queue and exit.
    pub fn seal(&mut self) {
        self.task_tx.take();
    }

    /// Ask workers to stop between tasks.
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
    }

    /// Wait for every worker thread to finish.
    pub fn join(mut self) {
        self.task_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    worker: usize,
    task_rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    store: Arc<dyn GraphStore>,
    events: mpsc::Sender<WorkerEvent>,
    exit: Arc<AtomicBool>,
) {
    tracing::debug!("analysis worker {worker} started");
    let mut parser = Parser::new();
    let extractors = default_extractors();
    let _ = events.send(WorkerEvent::Ready { worker });

    loop {
        if exit.load(Ordering::SeqCst) {
            break;
        }
        let task = {
            let rx = match task_rx.lock() {
                Ok(rx) => rx,
                Err(_) => break,
            };
            match rx.recv() {
                Ok(task) => task,
                Err(_) => break,
            }
        };

        let file = task.file.rel.clone();
        match process_task(&mut parser, &extractors, &store, task) {
            Ok((nodes, edges)) => {
                let _ = events.send(WorkerEvent::Done { file, nodes, edges });
            }
            Err(e) => {
                let _ = events.send(WorkerEvent::Failed {
                    file,
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::debug!("analysis worker {worker} shutting down");
    let _ = events.send(WorkerEvent::Exited {
        worker,
        error: None,
    });
}

fn process_task(
    parser: &mut Parser,
    extractors: &[Box<dyn crate::extract::Extractor>],
    store: &Arc<dyn GraphStore>,
    task: Task,
) -> anyhow::Result<(usize, usize)> {
    let source = std::fs::read_to_string(&task.file.abs)?;
    parser
        .set_language(&task.file.language.grammar())
        .map_err(|e| anyhow::anyhow!("failed to set language: {e}"))?;
    let tree = parser
        .parse(&source, None)
        .ok_or_else(|| anyhow::anyhow!("parser returned no tree for {}", task.file.rel))?;
    if tree.root_node().has_error() {
        // Partial trees are still extracted; a diagnostic-worthy fraction of
        // real-world files carries stray syntax errors.
        tracing::debug!("syntax errors in {}", task.file.rel);
    }

    let module = ModuleInfo {
        file: task.file.rel.clone(),
        module_id: task.module_id.clone(),
        language: task.file.language,
        service: task.file.service.clone(),
    };

    let mut buffers = NodeBuffers::new();
    for extractor in extractors {
        let mut tracker = ScopeTracker::new(task.file.rel.clone());
        extractor
            .extract(&tree, &source, &module, &mut buffers, &mut tracker)
            .map_err(|e| anyhow::anyhow!("{} extractor failed: {e}", extractor.name()))?;
    }

    let (nodes, edges) = buffers.drain();
    let node_count = nodes.len();
    let edge_count = edges.len();
    store.add_nodes(nodes)?;
    store.add_edges(edges, false)?;
    Ok((node_count, edge_count))
}
