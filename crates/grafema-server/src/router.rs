//! Axum router for the query API.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers;
use crate::ServerState;

pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Reads
        .route("/api/health", get(handlers::health))
        .route("/api/node/:id", get(handlers::get_node))
        .route("/api/nodes", get(handlers::list_nodes))
        .route("/api/bfs", get(handlers::bfs))
        .route("/api/dfs", get(handlers::dfs))
        .route("/api/reachability", get(handlers::reachability))
        .route("/api/calls", get(handlers::find_calls))
        .route("/api/function", get(handlers::function_details))
        .route("/api/guards", get(handlers::find_guards))
        .route("/api/alias", get(handlers::trace_alias))
        .route("/api/dataflow", get(handlers::trace_dataflow))
        .route("/api/stats", get(handlers::stats))
        .route("/api/status", get(handlers::analysis_status))
        .route("/api/file", get(handlers::file_overview))
        .route("/api/datalog", post(handlers::datalog))
        // Mutations
        .route("/api/analyze", post(handlers::analyze))
        .route("/api/invariant", post(handlers::check_invariant))
        // Guarantees
        .route(
            "/api/guarantees",
            get(handlers::list_guarantees).post(handlers::create_guarantee),
        )
        .route("/api/guarantees/:id", delete(handlers::delete_guarantee))
        .route("/api/guarantees/check", post(handlers::check_guarantees))
        // Tool surface
        .route("/api/tools", get(handlers::list_tools))
        .route("/api/tools/:name", post(handlers::call_tool))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grafema_core::store::memory::MemoryStore;
    use std::path::PathBuf;

    #[test]
    fn router_builds() {
        let state = Arc::new(ServerState::new(
            Arc::new(MemoryStore::new()),
            PathBuf::from("."),
        ));
        let _router = create_router(state);
    }
}
