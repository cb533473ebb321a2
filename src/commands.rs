//! CLI command implementations.
//!
//! Exit codes are part of the contract: 0 success, 1 guarantee/validation
//! errors, 2 fatal.

use grafema_analyzer::orchestrator::{AnalyzeConfig, Orchestrator, RunSummary};
use grafema_core::diagnostics::{DiagnosticCollector, ReportFormat, Reporter, Severity};
use grafema_core::snapshot;
use grafema_core::store::memory::MemoryStore;
use grafema_core::store::GraphStore;
use grafema_guarantees::GuaranteeRunner;
use grafema_server::{CheckerBridge, GrafemaServer, ServerConfig, ServerState};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXIT_OK: i32 = 0;
const EXIT_VIOLATIONS: i32 = 1;
const EXIT_FATAL: i32 = 2;

struct AnalysisRun {
    store: Arc<dyn GraphStore>,
    diagnostics: Arc<DiagnosticCollector>,
    runner: Arc<GuaranteeRunner>,
    summary: RunSummary,
}

async fn run_analysis(
    root: PathBuf,
    force: bool,
    service: Option<String>,
    workers: usize,
) -> anyhow::Result<AnalysisRun> {
    let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
    let diagnostics = Arc::new(DiagnosticCollector::new());
    let runner = Arc::new(GuaranteeRunner::new());

    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&diagnostics),
        AnalyzeConfig {
            root: root.clone(),
            service,
            force,
            workers,
            ..AnalyzeConfig::default()
        },
    )
    .with_checker(Arc::new(CheckerBridge(Arc::clone(&runner))));

    let summary = tokio::task::spawn_blocking(move || orchestrator.run()).await??;

    diagnostics.append_log(&snapshot::diagnostics_log_path(&root))?;

    Ok(AnalysisRun {
        store,
        diagnostics,
        runner,
        summary,
    })
}

fn exit_code_for(run: &AnalysisRun) -> i32 {
    if run.summary.fatal || run.diagnostics.has_fatal() {
        EXIT_FATAL
    } else if run.summary.violations > 0 || run.diagnostics.count_at_least(Severity::Error) > 0 {
        EXIT_VIOLATIONS
    } else {
        EXIT_OK
    }
}

pub async fn analyze(
    root: PathBuf,
    force: bool,
    service: Option<String>,
    workers: usize,
    format: &str,
    snapshot_name: Option<String>,
) -> anyhow::Result<i32> {
    let run = run_analysis(root.clone(), force, service, workers).await?;

    tracing::info!(
        "analyzed {} files: {} nodes, {} edges in {:?} ({} failed tasks)",
        run.summary.files,
        run.summary.nodes,
        run.summary.edges,
        run.summary.duration,
        run.summary.tasks_failed,
    );

    let reporter = Reporter {
        format: match format {
            "json" => ReportFormat::Json,
            "csv" => ReportFormat::Csv,
            _ => ReportFormat::Text,
        },
        ..Reporter::default()
    };
    let diagnostics = run.diagnostics.all();
    if !diagnostics.is_empty() {
        println!("{}", reporter.render(&diagnostics));
    }

    if let Some(name) = snapshot_name {
        let path = snapshot::save_snapshot(run.store.as_ref(), &root, &name)?;
        tracing::info!("snapshot written to {}", path.display());
    }

    Ok(exit_code_for(&run))
}

pub async fn serve(root: PathBuf, host: String, port: u16) -> anyhow::Result<()> {
    let run = run_analysis(root.clone(), false, None, 0).await?;
    tracing::info!(
        "graph ready: {} nodes, {} edges",
        run.summary.nodes,
        run.summary.edges
    );

    let state = Arc::new(ServerState {
        store: run.store,
        diagnostics: run.diagnostics,
        runner: run.runner,
        root,
        analysis: std::sync::RwLock::new(None),
    });
    let server = GrafemaServer::new(state, ServerConfig { host, port });
    server.start().await
}

pub async fn check(
    root: PathBuf,
    rule: Option<String>,
    verbose_report: bool,
) -> anyhow::Result<i32> {
    let run = run_analysis(root.clone(), false, None, 0).await?;

    let violations = match &rule {
        Some(rule) => {
            let collector = DiagnosticCollector::new();
            let count = run.runner.check_invariant(
                run.store.as_ref(),
                rule,
                Some("ad-hoc rule"),
                &collector,
            )?;
            for diagnostic in collector.all() {
                run.diagnostics.add(diagnostic);
            }
            count
        }
        // The validation phase already ran every stored guarantee.
        None => run.summary.violations,
    };

    let reporter = Reporter {
        strict: true,
        verbose: verbose_report,
        ..Reporter::default()
    };
    let report = reporter.render(&run.diagnostics.all());
    if !report.is_empty() {
        println!("{report}");
    }
    println!(
        "{} violation{}",
        violations,
        if violations == 1 { "" } else { "s" }
    );

    if run.summary.fatal {
        Ok(EXIT_FATAL)
    } else if violations > 0 {
        Ok(EXIT_VIOLATIONS)
    } else {
        Ok(EXIT_OK)
    }
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    clear_state(&root)?;
    tracing::info!("state cleared");
    Ok(())
}

fn clear_state(root: &Path) -> anyhow::Result<()> {
    snapshot::clear_state(root)?;
    Ok(())
}
