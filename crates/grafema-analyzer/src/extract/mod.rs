//! Extractors: per-language and per-domain AST traversals.
//!
//! Each extractor consumes an already-parsed tree and appends nodes and
//! edges to the collection buffers. The core JS/TS extractor builds the
//! structural graph; the domain extractors (http, socketio, react, sql) are
//! pattern-directed and isolated in their own modules.

pub mod helpers;
pub mod http;
pub mod js;
pub mod react;
pub mod socketio;
pub mod sql;

use crate::buffers::NodeBuffers;
use crate::language::SourceLanguage;
use grafema_core::scope::ScopeTracker;
use tree_sitter::Tree;

/// Module-level context handed to every extractor.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// Path relative to the analysis root, with forward slashes.
    pub file: String,
    /// ID of the MODULE node for this file.
    pub module_id: String,
    pub language: SourceLanguage,
    pub service: Option<String>,
}

pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(
        &self,
        tree: &Tree,
        source: &str,
        module: &ModuleInfo,
        buffers: &mut NodeBuffers,
        tracker: &mut ScopeTracker,
    ) -> anyhow::Result<()>;
}

/// The extractor stack applied to every analyzed file, in order. The core
/// extractor runs first so domain extractors can assume MODULE-level
/// structure exists in the buffers.
pub fn default_extractors() -> Vec<Box<dyn Extractor>> {
    vec![
        Box::new(js::JsExtractor),
        Box::new(http::HttpExtractor),
        Box::new(socketio::SocketIoExtractor),
        Box::new(react::ReactExtractor),
        Box::new(sql::SqlExtractor),
    ]
}
