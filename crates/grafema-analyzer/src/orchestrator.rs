//! The analysis orchestrator: a five-phase state machine with barriers.
//!
//! DISCOVERY enumerates services and source files; INDEXING writes MODULE
//! nodes with content hashes; ANALYSIS fans per-file extraction out to the
//! worker pool; ENRICHMENT runs the sequential cross-file passes;
//! VALIDATION runs guarantees. After every phase the orchestrator flushes
//! the store — later phases observe all earlier phases' writes.

use crate::discovery::{self, SourceFile};
use crate::enrich;
use crate::pool::{Task, WorkerEvent, WorkerPool};
use grafema_core::diagnostics::{codes, Diagnostic, DiagnosticCollector, Severity};
use grafema_core::identity;
use grafema_core::model::{Edge, EdgeKind, NodeKind};
use grafema_core::registry::ResourceRegistry;
use grafema_core::schema::NodeBuilder;
use grafema_core::store::GraphStore;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Indexing,
    Analysis,
    Enrichment,
    Validation,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Discovery => "DISCOVERY",
            Phase::Indexing => "INDEXING",
            Phase::Analysis => "ANALYSIS",
            Phase::Enrichment => "ENRICHMENT",
            Phase::Validation => "VALIDATION",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    pub root: PathBuf,
    /// Restrict analysis to one discovered service.
    pub service: Option<String>,
    /// Clear the graph and reanalyze everything.
    pub force: bool,
    /// Worker count; 0 means logical CPUs capped at 16.
    pub workers: usize,
    pub task_timeout: Duration,
    /// Worker initialization budget.
    pub init_timeout: Duration,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        AnalyzeConfig {
            root: PathBuf::from("."),
            service: None,
            force: false,
            workers: 0,
            task_timeout: Duration::from_secs(30),
            init_timeout: Duration::from_secs(30),
        }
    }
}

/// Validation-phase hook; the guarantees crate provides the real one.
pub trait GuaranteeChecker: Send + Sync {
    /// Run all guarantees, emit diagnostics, return the violation count.
    fn check_all(
        &self,
        store: &dyn GraphStore,
        diagnostics: &DiagnosticCollector,
    ) -> anyhow::Result<usize>;
}

/// Live progress, shared with the API layer.
#[derive(Debug, Clone, Default)]
pub struct AnalysisStatus {
    pub phase: Option<String>,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub phase_durations: Vec<(String, Duration)>,
    pub finished: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub services: usize,
    pub files: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub nodes: usize,
    pub edges: usize,
    pub violations: usize,
    pub fatal: bool,
    pub duration: Duration,
}

pub struct Orchestrator {
    store: Arc<dyn GraphStore>,
    diagnostics: Arc<DiagnosticCollector>,
    registry: ResourceRegistry,
    config: AnalyzeConfig,
    checker: Option<Arc<dyn GuaranteeChecker>>,
    status: Arc<RwLock<AnalysisStatus>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GraphStore>,
        diagnostics: Arc<DiagnosticCollector>,
        config: AnalyzeConfig,
    ) -> Self {
        Orchestrator {
            store,
            diagnostics,
            registry: ResourceRegistry::new(),
            config,
            checker: None,
            status: Arc::new(RwLock::new(AnalysisStatus::default())),
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn GuaranteeChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn status_handle(&self) -> Arc<RwLock<AnalysisStatus>> {
        Arc::clone(&self.status)
    }

    fn set_phase(&self, phase: Phase) {
        if let Ok(mut status) = self.status.write() {
            status.phase = Some(phase.as_str().to_string());
        }
        tracing::info!("phase {phase} started");
    }

    /// Phase barrier: flush writes, record duration. Returns `false` when a
    /// fatal diagnostic was recorded and the run must stop advancing.
    fn barrier(&self, phase: Phase, started: Instant) -> anyhow::Result<bool> {
        self.store.flush()?;
        let elapsed = started.elapsed();
        if let Ok(mut status) = self.status.write() {
            status
                .phase_durations
                .push((phase.as_str().to_string(), elapsed));
        }
        tracing::info!("phase {phase} complete in {elapsed:?}");
        if self.diagnostics.has_fatal() {
            tracing::error!("fatal diagnostic recorded during {phase}; aborting run");
            return Ok(false);
        }
        Ok(true)
    }

    /// Final bookkeeping, shared by completed and aborted runs.
    fn finish(&self, summary: &mut RunSummary, run_started: Instant) -> anyhow::Result<()> {
        summary.nodes = self.store.node_count()?;
        summary.edges = self.store.edge_count()?;
        summary.duration = run_started.elapsed();
        summary.fatal = self.diagnostics.has_fatal();
        self.registry.clear();
        if let Ok(mut status) = self.status.write() {
            status.finished = true;
            status.phase = None;
        }
        Ok(())
    }

    pub fn run(&self) -> anyhow::Result<RunSummary> {
        let run_started = Instant::now();
        let mut summary = RunSummary::default();

        if self.config.force {
            self.store.clear()?;
        }

        // ── DISCOVERY ───────────────────────────────────────
        self.set_phase(Phase::Discovery);
        let started = Instant::now();
        let services = discovery::discover_services(&self.config.root)?;
        let mut files = discovery::discover_files(&self.config.root, &services)?;
        if let Some(wanted) = &self.config.service {
            files.retain(|f| f.service.as_deref() == Some(wanted.as_str()));
        }
        for service in &services {
            let id = identity::compute_compact(
                NodeKind::Service,
                &service.name,
                if service.root.is_empty() { "." } else { &service.root },
                None,
                None,
                0,
            );
            let mut builder = NodeBuilder::new(
                NodeKind::Service,
                &service.name,
                if service.root.is_empty() { "." } else { &service.root },
            )
            .id(id)
            .meta("root", service.root.clone());
            if let Some(package_name) = &service.package_name {
                builder = builder.meta("packageName", package_name.clone());
            }
            self.store.add_node(builder.build()?)?;
        }
        summary.services = services.len();
        summary.files = files.len();
        if !self.barrier(Phase::Discovery, started)? {
            self.finish(&mut summary, run_started)?;
            return Ok(summary);
        }

        // ── INDEXING ────────────────────────────────────────
        self.set_phase(Phase::Indexing);
        let started = Instant::now();
        let mut tasks = Vec::with_capacity(files.len());
        for file in files {
            match self.index_file(&file, &services)? {
                Some(module_id) => tasks.push(Task { file, module_id }),
                None => tracing::debug!("unchanged, skipping: {}", file_label(&file)),
            }
        }
        if !self.barrier(Phase::Indexing, started)? {
            self.finish(&mut summary, run_started)?;
            return Ok(summary);
        }

        // ── ANALYSIS ────────────────────────────────────────
        self.set_phase(Phase::Analysis);
        let started = Instant::now();
        self.run_analysis(tasks, &mut summary)?;
        if !self.barrier(Phase::Analysis, started)? {
            self.finish(&mut summary, run_started)?;
            return Ok(summary);
        }

        // ── ENRICHMENT ──────────────────────────────────────
        self.set_phase(Phase::Enrichment);
        let started = Instant::now();
        self.registry.get_or_init("coverage:packages", || {
            let mut covered: HashSet<String> = HashSet::new();
            for package in ["express", "axios", "socket.io", "react", "pg", "mysql2"] {
                covered.insert(package.to_string());
            }
            covered
        });
        match enrich::run(self.store.as_ref(), &self.diagnostics, &self.registry) {
            Ok(stats) => {
                tracing::info!(
                    "enrichment: {} calls resolved, {} unknown targets, {} aliases",
                    stats.calls_resolved,
                    stats.unknown_targets,
                    stats.aliases_tagged
                );
            }
            Err(e) => {
                self.diagnostics.add(Diagnostic::new(
                    codes::ERR_UNKNOWN,
                    Severity::Error,
                    format!("enrichment failed: {e}"),
                    Phase::Enrichment.as_str(),
                    "enrich",
                ));
            }
        }
        if !self.barrier(Phase::Enrichment, started)? {
            self.finish(&mut summary, run_started)?;
            return Ok(summary);
        }

        // ── VALIDATION ──────────────────────────────────────
        self.set_phase(Phase::Validation);
        let started = Instant::now();
        if let Some(checker) = &self.checker {
            match checker.check_all(self.store.as_ref(), &self.diagnostics) {
                Ok(violations) => summary.violations = violations,
                Err(e) => {
                    self.diagnostics.add(Diagnostic::new(
                        codes::ERR_UNKNOWN,
                        Severity::Error,
                        format!("guarantee checking failed: {e}"),
                        Phase::Validation.as_str(),
                        "guarantees",
                    ));
                }
            }
        }
        self.barrier(Phase::Validation, started)?;

        self.finish(&mut summary, run_started)?;
        Ok(summary)
    }

    /// Ensure the MODULE node for a file, returning its ID when the file
    /// needs (re)analysis and `None` when the stored content hash matches.
    fn index_file(
        &self,
        file: &SourceFile,
        services: &[discovery::DiscoveredService],
    ) -> anyhow::Result<Option<String>> {
        let basename = file.rel.rsplit('/').next().unwrap_or(&file.rel);
        let module_id =
            identity::compute_compact(NodeKind::Module, basename, &file.rel, None, None, 0);

        let content = std::fs::read(&file.abs)?;
        let content_hash = format!("{:x}", md5::compute(&content))
            .chars()
            .take(12)
            .collect::<String>();

        if !self.config.force {
            if let Some(existing) = self.store.get_node(&module_id)? {
                if existing.meta_str("contentHash") == Some(content_hash.as_str()) {
                    return Ok(None);
                }
            }
        }

        let mut builder = NodeBuilder::new(NodeKind::Module, basename, file.rel.clone())
            .id(module_id.clone())
            .meta("contentHash", content_hash)
            .meta("language", file.language.as_str());
        if let Some(service) = &file.service {
            builder = builder.meta("service", service.clone());
        }
        self.store.add_node(builder.build()?)?;

        if let Some(service_name) = &file.service {
            if let Some(service) = services.iter().find(|s| &s.name == service_name) {
                let service_id = identity::compute_compact(
                    NodeKind::Service,
                    &service.name,
                    if service.root.is_empty() { "." } else { &service.root },
                    None,
                    None,
                    0,
                );
                self.store
                    .add_edge(Edge::new(EdgeKind::Contains, service_id, module_id.clone())?)?;
            }
        }
        Ok(Some(module_id))
    }

    fn run_analysis(&self, tasks: Vec<Task>, summary: &mut RunSummary) -> anyhow::Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let size = if self.config.workers == 0 {
            WorkerPool::default_size()
        } else {
            self.config.workers
        };
        let mut pool = WorkerPool::spawn(size.min(tasks.len().max(1)), Arc::clone(&self.store));

        // Worker init barrier.
        let mut ready = 0;
        let init_deadline = Instant::now() + self.config.init_timeout;
        while ready < pool.size {
            let remaining = init_deadline.saturating_duration_since(Instant::now());
            match pool.events.recv_timeout(remaining) {
                Ok(WorkerEvent::Ready { .. }) => ready += 1,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        if ready == 0 {
            pool.join();
            anyhow::bail!("no analysis worker came up within the init timeout");
        }

        let total = tasks.len();
        if let Ok(mut status) = self.status.write() {
            status.tasks_total = total;
            status.tasks_completed = 0;
            status.tasks_failed = 0;
        }

        for task in tasks {
            pool.submit(task)?;
        }
        pool.seal();

        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut alive = ready;
        let mut stalls = 0u32;
        while completed + failed < total && alive > 0 {
            match pool.events.recv_timeout(self.config.task_timeout) {
                Ok(WorkerEvent::Done { file, nodes, edges }) => {
                    stalls = 0;
                    completed += 1;
                    tracing::debug!("analyzed {file}: {nodes} nodes, {edges} edges");
                    if let Ok(mut status) = self.status.write() {
                        status.tasks_completed = completed;
                    }
                }
                Ok(WorkerEvent::Failed { file, message }) => {
                    stalls = 0;
                    failed += 1;
                    self.diagnostics.add(
                        Diagnostic::new(
                            codes::ERR_PARSE_FAILED,
                            Severity::Error,
                            message,
                            Phase::Analysis.as_str(),
                            "js-core",
                        )
                        .with_file(file),
                    );
                    if let Ok(mut status) = self.status.write() {
                        status.tasks_failed = failed;
                    }
                }
                Ok(WorkerEvent::Exited { worker, error }) => {
                    // A worker that missed the init window still reports its
                    // exit, so this can fire more often than `ready`.
                    alive = alive.saturating_sub(1);
                    if let Some(error) = error {
                        tracing::warn!("worker {worker} exited: {error}");
                    }
                }
                Ok(WorkerEvent::Ready { .. }) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    stalls += 1;
                    tracing::warn!(
                        "no task finished within {:?} ({} outstanding)",
                        self.config.task_timeout,
                        total - completed - failed
                    );
                    if stalls >= 3 {
                        self.diagnostics.add(Diagnostic::new(
                            codes::ERR_UNKNOWN,
                            Severity::Error,
                            "analysis stalled; abandoning remaining tasks",
                            Phase::Analysis.as_str(),
                            "pool",
                        ));
                        pool.request_exit();
                        break;
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        pool.join();
        summary.tasks_completed = completed;
        summary.tasks_failed = failed;
        // An empty pool with work still outstanding fails the run: the
        // fatal diagnostic stops the phase machine at the next barrier.
        if alive == 0 && completed + failed < total {
            self.diagnostics.add(Diagnostic::new(
                codes::ERR_UNKNOWN,
                Severity::Fatal,
                format!(
                    "worker pool drained with {} of {total} tasks outstanding",
                    total - completed - failed
                ),
                Phase::Analysis.as_str(),
                "pool",
            ));
        }
        tracing::info!("analysis: {completed} completed, {failed} failed, {total} total");
        Ok(())
    }
}

fn file_label(file: &SourceFile) -> String {
    file.rel.clone()
}
