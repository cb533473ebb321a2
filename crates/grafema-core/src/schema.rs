//! Per-kind field specifications and the node construction path.
//!
//! Every node kind declares which metadata fields are REQUIRED and which are
//! OPTIONAL. The builder fails eagerly when a required field is absent; the
//! store re-runs [`validate_node`] on its strict write path so records that
//! bypass the builder are still policed.

use crate::identity;
use crate::model::{EdgeKind, Node, NodeKind};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("{kind} node '{name}' is missing required field '{field}'")]
    MissingField {
        kind: NodeKind,
        name: String,
        field: &'static str,
    },
    #[error("{kind} edge endpoint is empty")]
    EmptyEndpoint { kind: EdgeKind },
    #[error("node has empty id")]
    EmptyId,
    #[error("node '{id}' has empty name")]
    EmptyName { id: String },
    #[error("node '{id}' has empty file")]
    EmptyFile { id: String },
}

/// Field spec for one node kind.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

const EMPTY: FieldSpec = FieldSpec {
    required: &[],
    optional: &[],
};

/// The REQUIRED/OPTIONAL metadata fields for a node kind.
pub fn field_spec(kind: NodeKind) -> FieldSpec {
    match kind {
        NodeKind::Module => FieldSpec {
            required: &[],
            optional: &["contentHash", "language", "service"],
        },
        NodeKind::Service => FieldSpec {
            required: &[],
            optional: &["root", "packageName"],
        },
        NodeKind::Scope => FieldSpec {
            required: &["scopeType"],
            optional: &["condition"],
        },
        NodeKind::Parameter => FieldSpec {
            required: &["index"],
            optional: &["defaultValue", "rest"],
        },
        NodeKind::Import => FieldSpec {
            required: &["source", "importType"],
            optional: &["imported", "local"],
        },
        NodeKind::Export => FieldSpec {
            required: &["exportType"],
            optional: &["source", "local"],
        },
        NodeKind::Function | NodeKind::Method => FieldSpec {
            required: &[],
            optional: &["async", "generator", "arrowFunction", "arity", "className", "static"],
        },
        NodeKind::Call => FieldSpec {
            required: &[],
            optional: &["object", "args", "computed", "indexVariable", "resolved"],
        },
        NodeKind::ConstructorCall => FieldSpec {
            required: &[],
            optional: &["isBuiltin", "args", "className"],
        },
        NodeKind::Variable | NodeKind::Constant => FieldSpec {
            required: &[],
            optional: &["declarationKind", "valueType"],
        },
        NodeKind::VariableDeclaration => FieldSpec {
            required: &["declarationKind"],
            optional: &[],
        },
        NodeKind::Literal => FieldSpec {
            required: &["value"],
            optional: &["literalType"],
        },
        NodeKind::Branch => FieldSpec {
            required: &[],
            optional: &["condition", "branchType"],
        },
        NodeKind::Loop => FieldSpec {
            required: &["loopType"],
            optional: &["condition"],
        },
        NodeKind::Case => FieldSpec {
            required: &[],
            optional: &["test", "isDefault"],
        },
        NodeKind::HttpRoute => FieldSpec {
            required: &["method", "path"],
            optional: &["framework", "handler"],
        },
        NodeKind::HttpRequest => FieldSpec {
            required: &["library"],
            optional: &["method", "url"],
        },
        NodeKind::SocketEmit | NodeKind::SocketOn | NodeKind::SocketEvent => FieldSpec {
            required: &["event"],
            optional: &["namespace", "room"],
        },
        NodeKind::SocketRoom => FieldSpec {
            required: &["room"],
            optional: &["namespace"],
        },
        NodeKind::DbQuery => FieldSpec {
            required: &[],
            optional: &["query", "dialect", "tables"],
        },
        NodeKind::ReactComponent => FieldSpec {
            required: &[],
            optional: &["props", "exported"],
        },
        NodeKind::ReactHook => FieldSpec {
            required: &["hook"],
            optional: &["deps"],
        },
        NodeKind::ReactState => FieldSpec {
            required: &["setter"],
            optional: &["initialValue"],
        },
        NodeKind::ReactEffect => FieldSpec {
            required: &[],
            optional: &["deps", "cleanup"],
        },
        NodeKind::Plugin => FieldSpec {
            required: &["phase"],
            optional: &["coveredPackages"],
        },
        NodeKind::GuaranteeQueue | NodeKind::GuaranteeApi | NodeKind::GuaranteePermission => {
            FieldSpec {
                required: &["guaranteeType"],
                optional: &["rule", "schema", "severity", "description"],
            }
        }
        NodeKind::Issue => FieldSpec {
            required: &["code", "severity"],
            optional: &["suggestion"],
        },
        NodeKind::UnknownCallTarget => FieldSpec {
            required: &[],
            optional: &["receiver", "reason"],
        },
        _ => EMPTY,
    }
}

/// Post-hoc structural check used by the store's strict write path.
pub fn validate_node(node: &Node) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    if node.id.is_empty() {
        errors.push(SchemaError::EmptyId);
    }
    if node.name.is_empty() {
        errors.push(SchemaError::EmptyName {
            id: node.id.clone(),
        });
    }
    // Singletons and externals have no file; everything else must.
    if node.file.is_empty() && !is_fileless(node) {
        errors.push(SchemaError::EmptyFile {
            id: node.id.clone(),
        });
    }
    for field in field_spec(node.kind).required {
        if !node.metadata.contains_key(*field) {
            errors.push(SchemaError::MissingField {
                kind: node.kind,
                name: node.name.clone(),
                field,
            });
        }
    }
    errors
}

fn is_fileless(node: &Node) -> bool {
    matches!(
        identity::parse(&node.id),
        Some(parsed) if parsed.format == identity::IdFormat::Special
    )
}

/// Staged construction of a [`Node`]. `build` validates required fields and
/// falls back to a minimal compact ID when none was supplied.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    kind: NodeKind,
    name: String,
    file: String,
    line: u32,
    column: u32,
    id: Option<String>,
    metadata: Map<String, Value>,
}

impl NodeBuilder {
    pub fn new(kind: NodeKind, name: impl Into<String>, file: impl Into<String>) -> Self {
        NodeBuilder {
            kind,
            name: name.into(),
            file: file.into(),
            line: 0,
            column: 0,
            id: None,
            metadata: Map::new(),
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Node, SchemaError> {
        for field in field_spec(self.kind).required {
            if !self.metadata.contains_key(*field) {
                return Err(SchemaError::MissingField {
                    kind: self.kind,
                    name: self.name,
                    field,
                });
            }
        }
        let id = self.id.unwrap_or_else(|| {
            identity::compute_compact(self.kind, &self.name, &self.file, None, None, 0)
        });
        if id.is_empty() {
            return Err(SchemaError::EmptyId);
        }
        if self.name.is_empty() {
            return Err(SchemaError::EmptyName { id });
        }
        Ok(Node {
            id,
            kind: self.kind,
            name: self.name,
            file: self.file,
            line: self.line,
            column: self.column,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Edge;

    #[test]
    fn builder_rejects_missing_required_field() {
        let err = NodeBuilder::new(NodeKind::HttpRoute, "GET /users", "src/routes.js")
            .meta("method", "GET")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingField {
                kind: NodeKind::HttpRoute,
                name: "GET /users".to_string(),
                field: "path",
            }
        );
    }

    #[test]
    fn builder_computes_fallback_id() {
        let node = NodeBuilder::new(NodeKind::Function, "foo", "a.js")
            .at(3, 0)
            .build()
            .unwrap();
        assert_eq!(node.id, "a.js->FUNCTION->foo");
        assert_eq!(node.line, 3);
    }

    #[test]
    fn validate_flags_fileless_non_singleton() {
        let node = NodeBuilder::new(NodeKind::Variable, "x", "a.js")
            .build()
            .unwrap();
        assert!(validate_node(&node).is_empty());

        let mut bad = node.clone();
        bad.file = String::new();
        bad.id = "->VARIABLE->x".to_string();
        assert!(!validate_node(&bad).is_empty());
    }

    #[test]
    fn validate_allows_special_singletons() {
        let node = Node {
            id: crate::identity::STDIO_ID.to_string(),
            kind: NodeKind::UnknownCallTarget,
            name: "__stdio__".to_string(),
            file: String::new(),
            line: 0,
            column: 0,
            metadata: Map::new(),
        };
        assert!(validate_node(&node).is_empty());
    }

    #[test]
    fn edge_rejects_empty_endpoints() {
        assert!(Edge::new(EdgeKind::Calls, "", "b").is_err());
        assert!(Edge::new(EdgeKind::Calls, "a", "").is_err());
        assert!(Edge::new(EdgeKind::Calls, "a", "b").is_ok());
    }
}
