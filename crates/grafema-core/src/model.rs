//! Core data structures for the code property graph.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Discriminates what kind of code entity a node represents. The set is
/// closed; namespaced kinds (`http:route`, `react:hook`, …) are first-class
/// variants, not stringly-typed extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    // ── Structural ──────────────────────────────────────────
    #[serde(rename = "MODULE")]
    Module,
    #[serde(rename = "SERVICE")]
    Service,
    #[serde(rename = "CLASS")]
    Class,
    #[serde(rename = "FUNCTION")]
    Function,
    #[serde(rename = "METHOD")]
    Method,
    #[serde(rename = "PARAMETER")]
    Parameter,
    #[serde(rename = "SCOPE")]
    Scope,

    // ── Values and declarations ─────────────────────────────
    #[serde(rename = "VARIABLE")]
    Variable,
    #[serde(rename = "CONSTANT")]
    Constant,
    #[serde(rename = "VARIABLE_DECLARATION")]
    VariableDeclaration,
    #[serde(rename = "IMPORT")]
    Import,
    #[serde(rename = "EXPORT")]
    Export,
    #[serde(rename = "LITERAL")]
    Literal,
    #[serde(rename = "OBJECT_LITERAL")]
    ObjectLiteral,
    #[serde(rename = "ARRAY_LITERAL")]
    ArrayLiteral,
    #[serde(rename = "EXPRESSION")]
    Expression,
    #[serde(rename = "PROPERTY_ACCESS")]
    PropertyAccess,
    #[serde(rename = "PROPERTY_ASSIGNMENT")]
    PropertyAssignment,
    #[serde(rename = "CONSTRUCTOR_CALL")]
    ConstructorCall,
    #[serde(rename = "CALL")]
    Call,

    // ── Control flow ────────────────────────────────────────
    #[serde(rename = "LOOP")]
    Loop,
    #[serde(rename = "BRANCH")]
    Branch,
    #[serde(rename = "CASE")]
    Case,
    #[serde(rename = "TRY_BLOCK")]
    TryBlock,
    #[serde(rename = "CATCH_BLOCK")]
    CatchBlock,
    #[serde(rename = "FINALLY_BLOCK")]
    FinallyBlock,
    #[serde(rename = "UPDATE_EXPRESSION")]
    UpdateExpression,
    #[serde(rename = "RETURN")]
    Return,
    #[serde(rename = "YIELD")]
    Yield,
    #[serde(rename = "THROW")]
    Throw,

    // ── Namespaced (domain-specific) ────────────────────────
    #[serde(rename = "http:route")]
    HttpRoute,
    #[serde(rename = "http:request")]
    HttpRequest,
    #[serde(rename = "socketio:emit")]
    SocketEmit,
    #[serde(rename = "socketio:on")]
    SocketOn,
    #[serde(rename = "socketio:room")]
    SocketRoom,
    #[serde(rename = "socketio:event")]
    SocketEvent,
    #[serde(rename = "db:query")]
    DbQuery,
    #[serde(rename = "react:component")]
    ReactComponent,
    #[serde(rename = "react:hook")]
    ReactHook,
    #[serde(rename = "react:state")]
    ReactState,
    #[serde(rename = "react:effect")]
    ReactEffect,
    #[serde(rename = "grafema:plugin")]
    Plugin,
    #[serde(rename = "guarantee:queue")]
    GuaranteeQueue,
    #[serde(rename = "guarantee:api")]
    GuaranteeApi,
    #[serde(rename = "guarantee:permission")]
    GuaranteePermission,
    #[serde(rename = "ISSUE")]
    Issue,
    #[serde(rename = "DECORATOR")]
    Decorator,
    #[serde(rename = "UNKNOWN_CALL_TARGET")]
    UnknownCallTarget,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Module => "MODULE",
            NodeKind::Service => "SERVICE",
            NodeKind::Class => "CLASS",
            NodeKind::Function => "FUNCTION",
            NodeKind::Method => "METHOD",
            NodeKind::Parameter => "PARAMETER",
            NodeKind::Scope => "SCOPE",
            NodeKind::Variable => "VARIABLE",
            NodeKind::Constant => "CONSTANT",
            NodeKind::VariableDeclaration => "VARIABLE_DECLARATION",
            NodeKind::Import => "IMPORT",
            NodeKind::Export => "EXPORT",
            NodeKind::Literal => "LITERAL",
            NodeKind::ObjectLiteral => "OBJECT_LITERAL",
            NodeKind::ArrayLiteral => "ARRAY_LITERAL",
            NodeKind::Expression => "EXPRESSION",
            NodeKind::PropertyAccess => "PROPERTY_ACCESS",
            NodeKind::PropertyAssignment => "PROPERTY_ASSIGNMENT",
            NodeKind::ConstructorCall => "CONSTRUCTOR_CALL",
            NodeKind::Call => "CALL",
            NodeKind::Loop => "LOOP",
            NodeKind::Branch => "BRANCH",
            NodeKind::Case => "CASE",
            NodeKind::TryBlock => "TRY_BLOCK",
            NodeKind::CatchBlock => "CATCH_BLOCK",
            NodeKind::FinallyBlock => "FINALLY_BLOCK",
            NodeKind::UpdateExpression => "UPDATE_EXPRESSION",
            NodeKind::Return => "RETURN",
            NodeKind::Yield => "YIELD",
            NodeKind::Throw => "THROW",
            NodeKind::HttpRoute => "http:route",
            NodeKind::HttpRequest => "http:request",
            NodeKind::SocketEmit => "socketio:emit",
            NodeKind::SocketOn => "socketio:on",
            NodeKind::SocketRoom => "socketio:room",
            NodeKind::SocketEvent => "socketio:event",
            NodeKind::DbQuery => "db:query",
            NodeKind::ReactComponent => "react:component",
            NodeKind::ReactHook => "react:hook",
            NodeKind::ReactState => "react:state",
            NodeKind::ReactEffect => "react:effect",
            NodeKind::Plugin => "grafema:plugin",
            NodeKind::GuaranteeQueue => "guarantee:queue",
            NodeKind::GuaranteeApi => "guarantee:api",
            NodeKind::GuaranteePermission => "guarantee:permission",
            NodeKind::Issue => "ISSUE",
            NodeKind::Decorator => "DECORATOR",
            NodeKind::UnknownCallTarget => "UNKNOWN_CALL_TARGET",
        }
    }

    /// All kinds, in declaration order. Used by schema listings and stats.
    pub fn all() -> &'static [NodeKind] {
        use NodeKind::*;
        &[
            Module, Service, Class, Function, Method, Parameter, Scope, Variable, Constant,
            VariableDeclaration, Import, Export, Literal, ObjectLiteral, ArrayLiteral, Expression,
            PropertyAccess, PropertyAssignment, ConstructorCall, Call, Loop, Branch, Case,
            TryBlock, CatchBlock, FinallyBlock, UpdateExpression, Return, Yield, Throw, HttpRoute,
            HttpRequest, SocketEmit, SocketOn, SocketRoom, SocketEvent, DbQuery, ReactComponent,
            ReactHook, ReactState, ReactEffect, Plugin, GuaranteeQueue, GuaranteeApi,
            GuaranteePermission, Issue, Decorator, UnknownCallTarget,
        ]
    }

    /// Guarantee contract kinds carry a JSON schema and govern other nodes.
    pub fn is_guarantee(&self) -> bool {
        matches!(
            self,
            NodeKind::GuaranteeQueue | NodeKind::GuaranteeApi | NodeKind::GuaranteePermission
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::all()
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or(())
    }
}

/// `SCOPE.scopeType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    If,
    Else,
    For,
    While,
    Try,
    Catch,
    Finally,
    MethodBody,
    FunctionBody,
    PropertyBody,
    StaticBlock,
    CallbackBody,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::If => "if",
            ScopeKind::Else => "else",
            ScopeKind::For => "for",
            ScopeKind::While => "while",
            ScopeKind::Try => "try",
            ScopeKind::Catch => "catch",
            ScopeKind::Finally => "finally",
            ScopeKind::MethodBody => "method_body",
            ScopeKind::FunctionBody => "function_body",
            ScopeKind::PropertyBody => "property_body",
            ScopeKind::StaticBlock => "static_block",
            ScopeKind::CallbackBody => "callback_body",
        }
    }

    /// Whether this scope is conditional, i.e. guards execution of its body.
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            ScopeKind::If | ScopeKind::Else | ScopeKind::Catch | ScopeKind::Finally
        )
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single node in the graph. All kinds share this base contract;
/// kind-specific fields live in `metadata` and are policed by the schema
/// module's field specs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Node {
    /// Read a string metadata field.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Read a boolean metadata field (absent means false).
    pub fn meta_bool(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Read an integer metadata field.
    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(|v| v.as_u64())
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Contains,
    HasScope,
    HasParameter,
    HasProperty,
    HasElement,
    HasCallback,
    Calls,
    Invokes,
    CalledBy,
    Imports,
    Exports,
    DependsOn,
    Extends,
    Implements,
    InstanceOf,
    AssignedFrom,
    FlowsInto,
    DerivesFrom,
    PassesArgument,
    ReadsFrom,
    Modifies,
    CatchesFrom,
    Governs,
    Affects,
    IteratesOver,
    Guards,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::HasScope => "HAS_SCOPE",
            EdgeKind::HasParameter => "HAS_PARAMETER",
            EdgeKind::HasProperty => "HAS_PROPERTY",
            EdgeKind::HasElement => "HAS_ELEMENT",
            EdgeKind::HasCallback => "HAS_CALLBACK",
            EdgeKind::Calls => "CALLS",
            EdgeKind::Invokes => "INVOKES",
            EdgeKind::CalledBy => "CALLED_BY",
            EdgeKind::Imports => "IMPORTS",
            EdgeKind::Exports => "EXPORTS",
            EdgeKind::DependsOn => "DEPENDS_ON",
            EdgeKind::Extends => "EXTENDS",
            EdgeKind::Implements => "IMPLEMENTS",
            EdgeKind::InstanceOf => "INSTANCE_OF",
            EdgeKind::AssignedFrom => "ASSIGNED_FROM",
            EdgeKind::FlowsInto => "FLOWS_INTO",
            EdgeKind::DerivesFrom => "DERIVES_FROM",
            EdgeKind::PassesArgument => "PASSES_ARGUMENT",
            EdgeKind::ReadsFrom => "READS_FROM",
            EdgeKind::Modifies => "MODIFIES",
            EdgeKind::CatchesFrom => "CATCHES_FROM",
            EdgeKind::Governs => "GOVERNS",
            EdgeKind::Affects => "AFFECTS",
            EdgeKind::IteratesOver => "ITERATES_OVER",
            EdgeKind::Guards => "GUARDS",
        }
    }

    pub fn all() -> &'static [EdgeKind] {
        use EdgeKind::*;
        &[
            Contains, HasScope, HasParameter, HasProperty, HasElement, HasCallback, Calls,
            Invokes, CalledBy, Imports, Exports, DependsOn, Extends, Implements, InstanceOf,
            AssignedFrom, FlowsInto, DerivesFrom, PassesArgument, ReadsFrom, Modifies,
            CatchesFrom, Governs, Affects, IteratesOver, Guards,
        ]
    }

    /// Edge kinds that carry data flow, used by the trace queries.
    pub fn is_data_flow(&self) -> bool {
        matches!(
            self,
            EdgeKind::AssignedFrom | EdgeKind::FlowsInto | EdgeKind::PassesArgument
        )
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeKind::all()
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or(())
    }
}

/// A directed edge. A given `(src, dst, kind)` triple is unique in the
/// store; writes are idempotent upserts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub src: String,
    pub dst: String,
    /// Positional index, e.g. argument position for PASSES_ARGUMENT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Edge {
    /// Construct an edge, rejecting empty endpoints. This is the single
    /// construction path; extractors and enrichers alike go through it.
    pub fn new(
        kind: EdgeKind,
        src: impl Into<String>,
        dst: impl Into<String>,
    ) -> Result<Edge, crate::schema::SchemaError> {
        let src = src.into();
        let dst = dst.into();
        if src.is_empty() || dst.is_empty() {
            return Err(crate::schema::SchemaError::EmptyEndpoint { kind });
        }
        Ok(Edge {
            kind,
            src,
            dst,
            index: None,
            metadata: Map::new(),
        })
    }

    pub fn with_index(mut self, index: u32) -> Edge {
        self.index = Some(index);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Edge {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Identity triple used for upsert deduplication.
    pub fn key(&self) -> (EdgeKind, &str, &str) {
        (self.kind, self.src.as_str(), self.dst.as_str())
    }
}
