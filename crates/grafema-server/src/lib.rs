//! HTTP query API server and tool surface.

pub mod handlers;
pub mod router;
pub mod tools;

use grafema_analyzer::orchestrator::{AnalysisStatus, GuaranteeChecker};
use grafema_core::diagnostics::DiagnosticCollector;
use grafema_core::store::GraphStore;
use grafema_guarantees::GuaranteeRunner;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Bridges the guarantees runner into the orchestrator's validation phase.
pub struct CheckerBridge(pub Arc<GuaranteeRunner>);

impl GuaranteeChecker for CheckerBridge {
    fn check_all(
        &self,
        store: &dyn GraphStore,
        diagnostics: &DiagnosticCollector,
    ) -> anyhow::Result<usize> {
        Ok(self.0.check_all_guarantees(store, diagnostics)?)
    }
}

/// Shared state behind every handler.
pub struct ServerState {
    pub store: Arc<dyn GraphStore>,
    pub diagnostics: Arc<DiagnosticCollector>,
    pub runner: Arc<GuaranteeRunner>,
    /// Analysis root the `analyze` mutation re-runs against.
    pub root: PathBuf,
    /// Status handle of the most recent analysis run.
    pub analysis: RwLock<Option<Arc<RwLock<AnalysisStatus>>>>,
}

impl ServerState {
    pub fn new(store: Arc<dyn GraphStore>, root: PathBuf) -> ServerState {
        ServerState {
            store,
            diagnostics: Arc::new(DiagnosticCollector::new()),
            runner: Arc::new(GuaranteeRunner::new()),
            root,
            analysis: RwLock::new(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 7433,
        }
    }
}

pub struct GrafemaServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl GrafemaServer {
    pub fn new(state: Arc<ServerState>, config: ServerConfig) -> GrafemaServer {
        GrafemaServer { state, config }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    pub async fn start(self) -> anyhow::Result<()> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let app = router::create_router(self.state);
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!("grafema query API listening on http://{address}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
