//! Grafema Core — semantic identity, graph data model, store contract, and diagnostics

pub mod diagnostics;
pub mod identity;
pub mod model;
pub mod registry;
pub mod schema;
pub mod scope;
pub mod snapshot;
pub mod store;

#[cfg(test)]
pub mod tests;

pub use diagnostics::{codes, Diagnostic, DiagnosticCollector, Reporter, ReportFormat, Severity};
pub use identity::{IdHints, ParsedId, ScopeContext};
pub use model::{Edge, EdgeKind, Node, NodeKind, ScopeKind};
pub use registry::ResourceRegistry;
pub use schema::{NodeBuilder, SchemaError};
pub use scope::{ScopeEntry, ScopeEntryKind, ScopeTracker};
pub use store::memory::MemoryStore;
pub use store::{GraphStore, NodeFilter, StoreError};
