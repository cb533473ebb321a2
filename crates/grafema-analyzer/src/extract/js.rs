//! Core JavaScript/TypeScript extractor.
//!
//! Builds the structural graph for one file: imports/exports, functions and
//! classes, call sites, variables with data-flow edges, and control-flow
//! scopes. Domain-specific patterns (routes, sockets, hooks, queries) live
//! in their own extractors and run after this one.

use super::helpers::*;
use super::{Extractor, ModuleInfo};
use crate::buffers::NodeBuffers;
use anyhow::Result;
use grafema_core::identity::{self, IdHints};
use grafema_core::model::{Edge, EdgeKind, NodeKind, ScopeKind};
use grafema_core::schema::NodeBuilder;
use grafema_core::scope::{ScopeEntryKind, ScopeTracker};
use serde_json::Value;
use std::collections::HashMap;
use tree_sitter::{Node as TsNode, Tree};

/// Platform constructor names flagged `isBuiltin` on CONSTRUCTOR_CALL.
const BUILTIN_TYPES: &[&str] = &[
    "Array", "Object", "Map", "Set", "WeakMap", "WeakSet", "Promise", "Date", "RegExp", "Error",
    "TypeError", "RangeError", "URL", "URLSearchParams", "Buffer", "Proxy", "Int8Array",
    "Uint8Array", "Float32Array", "Float64Array", "AbortController",
];

/// Member-call names that mutate their receiver in place.
const MUTATING_METHODS: &[&str] = &["push", "unshift", "splice", "pop", "shift", "fill", "sort"];

pub struct JsExtractor;

impl Extractor for JsExtractor {
    fn name(&self) -> &'static str {
        "js-core"
    }

    fn extract(
        &self,
        tree: &Tree,
        source: &str,
        module: &ModuleInfo,
        buffers: &mut NodeBuffers,
        tracker: &mut ScopeTracker,
    ) -> Result<()> {
        let mut walker = Walker {
            source,
            module,
            buffers,
            tracker,
            bindings: vec![HashMap::new()],
            frames: Vec::new(),
        };
        let module_id = module.module_id.clone();
        walker.visit_children(tree.root_node(), &module_id)?;
        Ok(())
    }
}

/// One open frame of the throwable collector. A `try` body pushes a
/// collecting frame; function boundaries push a barrier so throwables inside
/// nested functions never leak into an outer catch.
struct TryFrame {
    barrier: bool,
    throwables: Vec<String>,
}

struct Walker<'a> {
    source: &'a str,
    module: &'a ModuleInfo,
    buffers: &'a mut NodeBuffers,
    tracker: &'a mut ScopeTracker,
    /// Lexical name → node-ID bindings, one map per scope.
    bindings: Vec<HashMap<String, String>>,
    frames: Vec<TryFrame>,
}

impl<'a> Walker<'a> {
    // ── Plumbing ────────────────────────────────────────────

    fn bind(&mut self, name: &str, id: &str) {
        if let Some(scope) = self.bindings.last_mut() {
            scope.insert(name.to_string(), id.to_string());
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.bindings
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    fn new_id(&mut self, kind: NodeKind, name: &str, hints: Option<&IdHints>) -> String {
        let named_parent = self.tracker.nearest_named().map(|s| s.to_string());
        let hash = hints
            .filter(|h| !h.is_empty())
            .map(identity::content_hash);
        let counter = self
            .tracker
            .next_item_counter(&format!("{}:{}", kind.as_str(), name));
        identity::compute_compact(
            kind,
            name,
            &self.module.file,
            named_parent.as_deref(),
            hash.as_deref(),
            counter,
        )
    }

    fn add(&mut self, builder: NodeBuilder) -> Result<String> {
        let node = builder.build()?;
        Ok(self.buffers.push_node(node))
    }

    fn edge(&mut self, kind: EdgeKind, src: &str, dst: &str) -> Result<()> {
        self.buffers.push_edge(Edge::new(kind, src, dst)?);
        Ok(())
    }

    fn edge_indexed(&mut self, kind: EdgeKind, src: &str, dst: &str, index: u32) -> Result<()> {
        self.buffers.push_edge(Edge::new(kind, src, dst)?.with_index(index));
        Ok(())
    }

    fn contains(&mut self, parent: &str, child: &str) -> Result<()> {
        self.edge(EdgeKind::Contains, parent, child)
    }

    fn register_throwable(&mut self, id: &str) {
        for frame in self.frames.iter_mut().rev() {
            if frame.barrier {
                break;
            }
            frame.throwables.push(id.to_string());
        }
    }

    fn builder(&self, kind: NodeKind, name: &str, node: TsNode<'_>) -> NodeBuilder {
        NodeBuilder::new(kind, name, self.module.file.clone()).at(line(node), column(node))
    }

    // ── Traversal ───────────────────────────────────────────

    fn visit_children(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let mut cursor = node.walk();
        let children: Vec<TsNode<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, parent_id)?;
        }
        Ok(())
    }

    fn visit(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        match node.kind() {
            "import_statement" => self.handle_import(node, parent_id),
            "export_statement" => self.handle_export(node, parent_id),
            "function_declaration" | "generator_function_declaration" => {
                self.handle_function(node, parent_id, None).map(|_| ())
            }
            "class_declaration" => self.handle_class(node, parent_id),
            "method_definition" => self.handle_method(node, parent_id),
            "lexical_declaration" | "variable_declaration" => {
                self.handle_var_declaration(node, parent_id)
            }
            "call_expression" => self.handle_call(node, parent_id).map(|_| ()),
            "new_expression" => self.handle_new(node, parent_id).map(|_| ()),
            "arrow_function" | "function_expression" | "generator_function" => {
                self.handle_function(node, parent_id, None).map(|_| ())
            }
            "if_statement" => self.handle_if(node, parent_id),
            "for_statement" | "for_in_statement" | "while_statement" | "do_statement" => {
                self.handle_loop(node, parent_id)
            }
            "try_statement" => self.handle_try(node, parent_id),
            "switch_statement" => self.handle_switch(node, parent_id),
            "return_statement" => self.handle_return(node, parent_id),
            "throw_statement" => self.handle_throw(node, parent_id),
            "yield_expression" => {
                let id = self.new_id(NodeKind::Yield, "yield", None);
                let yield_id = self.add(self.builder(NodeKind::Yield, "yield", node).id(id))?;
                self.contains(parent_id, &yield_id)?;
                self.visit_children(node, parent_id)
            }
            "update_expression" => self.handle_update(node, parent_id),
            "assignment_expression" | "augmented_assignment_expression" => {
                self.handle_assignment(node, parent_id)
            }
            _ => self.visit_children(node, parent_id),
        }
    }

    // ── Imports / exports ───────────────────────────────────

    fn handle_import(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let Some(source_node) = node.child_by_field_name("source") else {
            return Ok(());
        };
        let import_source = unquote(text(source_node, self.source)).to_string();
        let external = !import_source.starts_with('.');

        if external {
            self.ensure_external_module(&import_source)?;
            self.edge(
                EdgeKind::DependsOn,
                &self.module.module_id.clone(),
                &identity::external_module_id(&import_source),
            )?;
        }

        let mut bindings: Vec<(String, String, String)> = Vec::new(); // (local, imported, type)
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "import_clause" {
                continue;
            }
            let mut clause_cursor = child.walk();
            for clause_child in child.named_children(&mut clause_cursor) {
                match clause_child.kind() {
                    "identifier" => {
                        let local = text(clause_child, self.source).to_string();
                        bindings.push((local, "default".to_string(), "default".to_string()));
                    }
                    "namespace_import" => {
                        let mut ns_cursor = clause_child.walk();
                        for ns_child in clause_child.named_children(&mut ns_cursor) {
                            if ns_child.kind() == "identifier" {
                                let local = text(ns_child, self.source).to_string();
                                bindings.push((local, "*".to_string(), "namespace".to_string()));
                            }
                        }
                    }
                    "named_imports" => {
                        let mut spec_cursor = clause_child.walk();
                        for spec in clause_child.named_children(&mut spec_cursor) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            let imported = spec
                                .child_by_field_name("name")
                                .map(|n| text(n, self.source).to_string())
                                .unwrap_or_default();
                            let local = spec
                                .child_by_field_name("alias")
                                .map(|n| text(n, self.source).to_string())
                                .unwrap_or_else(|| imported.clone());
                            bindings.push((local, imported, "named".to_string()));
                        }
                    }
                    _ => {}
                }
            }
        }

        // One IMPORT node per local binding; side-effect imports emit none.
        for (local, imported, import_type) in bindings {
            let id = self.new_id(NodeKind::Import, &local, None);
            let import_id = self.add(
                self.builder(NodeKind::Import, &local, node)
                    .id(id)
                    .meta("source", import_source.clone())
                    .meta("importType", import_type)
                    .meta("imported", imported)
                    .meta("local", local.clone()),
            )?;
            self.contains(parent_id, &import_id)?;
            if external {
                self.edge(
                    EdgeKind::Imports,
                    &import_id,
                    &identity::external_module_id(&import_source),
                )?;
            }
            self.bind(&local, &import_id);
        }
        Ok(())
    }

    fn ensure_external_module(&mut self, name: &str) -> Result<()> {
        let id = identity::external_module_id(name);
        if self.buffers.node_by_id(&id).is_none() {
            self.buffers.push_node(
                NodeBuilder::new(NodeKind::Module, name, "")
                    .id(id)
                    .build()?,
            );
        }
        Ok(())
    }

    fn handle_export(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let is_default = {
            let mut cursor = node.walk();
            node.children(&mut cursor).any(|c| c.kind() == "default")
        };
        let export_type = if is_default { "default" } else { "named" };

        if let Some(declaration) = node.child_by_field_name("declaration") {
            self.visit(declaration, parent_id)?;
            let exported_name = declared_name(declaration, self.source)
                .unwrap_or_else(|| "default".to_string());
            let id = self.new_id(NodeKind::Export, &exported_name, None);
            let export_id = self.add(
                self.builder(NodeKind::Export, &exported_name, node)
                    .id(id)
                    .meta("exportType", export_type)
                    .meta("local", exported_name.clone()),
            )?;
            self.edge(EdgeKind::Exports, &self.module.module_id.clone(), &export_id)?;
            if let Some(target) = self.lookup(&exported_name) {
                self.edge(EdgeKind::AssignedFrom, &export_id, &target)?;
            }
            return Ok(());
        }

        // `export default <expression>` — the expression sits in `value`.
        if let Some(value) = node.child_by_field_name("value") {
            let exported_name = if value.kind() == "identifier" {
                text(value, self.source).to_string()
            } else {
                "default".to_string()
            };
            let id = self.new_id(NodeKind::Export, &exported_name, None);
            let export_id = self.add(
                self.builder(NodeKind::Export, &exported_name, node)
                    .id(id)
                    .meta("exportType", "default")
                    .meta("local", exported_name.clone()),
            )?;
            self.edge(EdgeKind::Exports, &self.module.module_id.clone(), &export_id)?;
            match value.kind() {
                "identifier" => {
                    if let Some(target) = self.lookup(&exported_name) {
                        self.edge(EdgeKind::AssignedFrom, &export_id, &target)?;
                    }
                }
                _ => {
                    if let Some(source_id) = self.resolve_value(value, &export_id)? {
                        self.edge(EdgeKind::AssignedFrom, &export_id, &source_id)?;
                    }
                }
            }
            return Ok(());
        }

        // export { a, b as c } [from '...']
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "export_clause" {
                continue;
            }
            let mut spec_cursor = child.walk();
            for spec in child.named_children(&mut spec_cursor) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let local = spec
                    .child_by_field_name("name")
                    .map(|n| text(n, self.source).to_string())
                    .unwrap_or_default();
                let exported = spec
                    .child_by_field_name("alias")
                    .map(|n| text(n, self.source).to_string())
                    .unwrap_or_else(|| local.clone());
                if exported.is_empty() {
                    continue;
                }
                let id = self.new_id(NodeKind::Export, &exported, None);
                let export_id = self.add(
                    self.builder(NodeKind::Export, &exported, spec)
                        .id(id)
                        .meta("exportType", "named")
                        .meta("local", local.clone()),
                )?;
                self.edge(EdgeKind::Exports, &self.module.module_id.clone(), &export_id)?;
                if let Some(target) = self.lookup(&local) {
                    self.edge(EdgeKind::AssignedFrom, &export_id, &target)?;
                }
            }
        }
        Ok(())
    }

    // ── Functions, methods, classes ─────────────────────────

    fn handle_function(
        &mut self,
        node: TsNode<'_>,
        parent_id: &str,
        given_name: Option<&str>,
    ) -> Result<String> {
        let named = given_name.map(|n| n.to_string()).or_else(|| {
            node.child_by_field_name("name")
                .map(|n| text(n, self.source).to_string())
        });
        let is_anonymous = named.is_none();
        let name = match named {
            Some(name) => name,
            None => {
                // Anonymous siblings are told apart by the tracker's item
                // counter, carried in the name itself.
                let k = self.tracker.next_item_counter("FUNCTION:anonymous");
                format!("anonymous#{k}")
            }
        };

        let params = parameter_names(node, self.source);
        let is_async = has_keyword(node, "async");
        let is_generator = node.kind().contains("generator") || has_keyword(node, "*");
        let is_arrow = node.kind() == "arrow_function";

        let hints = IdHints {
            arity: Some(params.len() as u32),
            params: params.clone(),
            ..Default::default()
        };
        let id = self.new_id(NodeKind::Function, &name, Some(&hints));
        let fn_id = self.add(
            self.builder(NodeKind::Function, &name, node)
                .id(id)
                .meta("async", is_async)
                .meta("generator", is_generator)
                .meta("arrowFunction", is_arrow)
                .meta("arity", params.len() as u64),
        )?;
        self.contains(parent_id, &fn_id)?;
        if !is_anonymous {
            self.bind(&name, &fn_id);
        }

        self.tracker.enter(name.clone(), ScopeEntryKind::Function);
        self.bindings.push(HashMap::new());
        self.frames.push(TryFrame {
            barrier: true,
            throwables: Vec::new(),
        });

        for (index, param) in params.iter().enumerate() {
            let param_id = self.new_id(NodeKind::Parameter, param, None);
            let param_id = self.add(
                self.builder(NodeKind::Parameter, param, node)
                    .id(param_id)
                    .meta("index", index as u64),
            )?;
            self.edge_indexed(EdgeKind::HasParameter, &fn_id, &param_id, index as u32)?;
            self.bind(param, &param_id);
        }

        if let Some(body) = node.child_by_field_name("body") {
            if body.kind() == "statement_block" {
                self.visit_children(body, &fn_id)?;
            } else {
                // Concise arrow body: a bare expression.
                self.visit(body, &fn_id)?;
            }
        }

        self.frames.pop();
        self.bindings.pop();
        self.tracker.exit();
        Ok(fn_id)
    }

    fn handle_class(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let named = node
            .child_by_field_name("name")
            .map(|n| text(n, self.source).to_string());
        let is_anonymous = named.is_none();
        let name = match named {
            Some(name) => name,
            None => {
                let k = self.tracker.next_item_counter("CLASS:anonymous");
                format!("anonymous#{k}")
            }
        };

        let mut builder = self.builder(NodeKind::Class, &name, node);
        let id = self.new_id(NodeKind::Class, &name, None);
        builder = builder.id(id);

        // Heritage is recorded as metadata and resolved to EXTENDS /
        // IMPLEMENTS edges during enrichment, once all files are in.
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "class_heritage" {
                continue;
            }
            // JS grammar: class_heritage is `extends <expr>` directly.
            // TS grammar: it nests extends_clause / implements_clause.
            let mut clause_cursor = child.walk();
            let clauses: Vec<TsNode<'_>> = child.named_children(&mut clause_cursor).collect();
            if clauses.is_empty() || !clauses.iter().any(|c| c.kind().ends_with("_clause")) {
                let heritage = text(child, self.source);
                if let Some(base) = heritage.strip_prefix("extends ") {
                    builder = builder.meta(
                        "extends",
                        base.split_whitespace().next().unwrap_or(base).to_string(),
                    );
                }
                continue;
            }
            for clause in clauses {
                match clause.kind() {
                    "extends_clause" => {
                        if let Some(value) = clause.named_child(0) {
                            builder =
                                builder.meta("extends", text(value, self.source).to_string());
                        }
                    }
                    "implements_clause" => {
                        let mut impl_cursor = clause.walk();
                        let names: Vec<Value> = clause
                            .named_children(&mut impl_cursor)
                            .map(|n| Value::String(text(n, self.source).to_string()))
                            .collect();
                        builder = builder.meta("implements", Value::Array(names));
                    }
                    _ => {}
                }
            }
        }

        let class_id = self.add(builder)?;
        self.contains(parent_id, &class_id)?;
        if !is_anonymous {
            self.bind(&name, &class_id);
        }

        self.tracker.enter(name, ScopeEntryKind::Class);
        self.bindings.push(HashMap::new());
        if let Some(body) = node.child_by_field_name("body") {
            let mut body_cursor = body.walk();
            let members: Vec<TsNode<'_>> = body.named_children(&mut body_cursor).collect();
            for member in members {
                match member.kind() {
                    "method_definition" => self.handle_method_in(member, &class_id)?,
                    "class_static_block" => {
                        let scope_id = self.enter_scope_node(ScopeKind::StaticBlock, member, None)?;
                        self.edge(EdgeKind::HasScope, &class_id, &scope_id)?;
                        self.contains(&class_id, &scope_id)?;
                        self.visit_children(member, &scope_id)?;
                        self.exit_scope_node();
                    }
                    "public_field_definition" | "field_definition" => {
                        self.handle_class_field(member, &class_id)?;
                    }
                    _ => self.visit(member, &class_id)?,
                }
            }
        }
        self.bindings.pop();
        self.tracker.exit();
        Ok(())
    }

    /// A method reached outside a class body (object literal shorthand).
    fn handle_method(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        self.handle_function(node, parent_id, None).map(|_| ())
    }

    fn handle_method_in(&mut self, node: TsNode<'_>, class_id: &str) -> Result<()> {
        let name = match node
            .child_by_field_name("name")
            .map(|n| text(n, self.source).to_string())
        {
            Some(name) => name,
            None => {
                let k = self.tracker.next_item_counter("METHOD:anonymous");
                format!("anonymous#{k}")
            }
        };
        let class_name = self.tracker.enclosing_class().unwrap_or("").to_string();
        let params = parameter_names(node, self.source);
        let is_static = has_keyword(node, "static");

        let hints = IdHints {
            arity: Some(params.len() as u32),
            params: params.clone(),
            ..Default::default()
        };
        let id = self.new_id(NodeKind::Method, &name, Some(&hints));
        let method_id = self.add(
            self.builder(NodeKind::Method, &name, node)
                .id(id)
                .meta("className", class_name)
                .meta("async", has_keyword(node, "async"))
                .meta("static", is_static)
                .meta("arity", params.len() as u64),
        )?;
        self.contains(class_id, &method_id)?;

        self.tracker.enter(name, ScopeEntryKind::Method);
        self.bindings.push(HashMap::new());
        self.frames.push(TryFrame {
            barrier: true,
            throwables: Vec::new(),
        });

        for (index, param) in params.iter().enumerate() {
            let param_id = self.new_id(NodeKind::Parameter, param, None);
            let param_id = self.add(
                self.builder(NodeKind::Parameter, param, node)
                    .id(param_id)
                    .meta("index", index as u64),
            )?;
            self.edge_indexed(EdgeKind::HasParameter, &method_id, &param_id, index as u32)?;
            self.bind(param, &param_id);
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, &method_id)?;
        }

        self.frames.pop();
        self.bindings.pop();
        self.tracker.exit();
        Ok(())
    }

    fn handle_class_field(&mut self, node: TsNode<'_>, class_id: &str) -> Result<()> {
        let name = node
            .child_by_field_name("property")
            .or_else(|| node.child_by_field_name("name"))
            .map(|n| text(n, self.source).to_string())
            .unwrap_or_default();
        if name.is_empty() {
            return Ok(());
        }
        if let Some(value) = node.child_by_field_name("value") {
            if matches!(value.kind(), "arrow_function" | "function_expression") {
                // Class property holding a function is a method in practice.
                self.handle_function(value, class_id, Some(&name))?;
                return Ok(());
            }
        }
        let id = self.new_id(NodeKind::PropertyAssignment, &name, None);
        let prop_id = self.add(
            self.builder(NodeKind::PropertyAssignment, &name, node).id(id),
        )?;
        self.edge(EdgeKind::HasProperty, class_id, &prop_id)?;
        if let Some(value) = node.child_by_field_name("value") {
            if let Some(src) = self.resolve_value(value, &prop_id)? {
                self.edge(EdgeKind::AssignedFrom, &prop_id, &src)?;
            }
        }
        Ok(())
    }

    // ── Variables and data flow ─────────────────────────────

    fn handle_var_declaration(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let declaration_kind = node
            .child(0)
            .map(|c| text(c, self.source).to_string())
            .unwrap_or_else(|| "var".to_string());

        let mut cursor = node.walk();
        let declarators: Vec<TsNode<'_>> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "variable_declarator")
            .collect();

        for declarator in declarators {
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            let value = declarator.child_by_field_name("value");

            // Destructuring patterns bind each inner identifier.
            if matches!(name_node.kind(), "object_pattern" | "array_pattern") {
                self.handle_destructuring(name_node, value, parent_id, &declaration_kind)?;
                continue;
            }

            let name = text(name_node, self.source).to_string();

            // `const foo = () => {}` — the function is the declaration.
            if let Some(v) = value {
                if matches!(
                    v.kind(),
                    "arrow_function" | "function_expression" | "generator_function"
                ) {
                    let fn_id = self.handle_function(v, parent_id, Some(&name))?;
                    self.bind(&name, &fn_id);
                    continue;
                }
                if v.kind() == "class" {
                    self.handle_class(v, parent_id)?;
                    continue;
                }
            }

            let is_literal_const = declaration_kind == "const"
                && value.map(|v| is_literal_kind(v.kind())).unwrap_or(false);
            let kind = if is_literal_const {
                NodeKind::Constant
            } else {
                NodeKind::Variable
            };

            let rhs_type = value.map(|v| v.kind().to_string());
            let hints = IdHints {
                rhs_type: rhs_type.clone(),
                ..Default::default()
            };
            let id = self.new_id(kind, &name, Some(&hints));
            let var_id = self.add(
                self.builder(kind, &name, declarator)
                    .id(id)
                    .meta("declarationKind", declaration_kind.clone()),
            )?;
            self.contains(parent_id, &var_id)?;
            self.bind(&name, &var_id);

            if let Some(v) = value {
                if let Some(src) = self.resolve_value(v, parent_id)? {
                    self.edge(EdgeKind::AssignedFrom, &var_id, &src)?;
                }
            }
        }
        Ok(())
    }

    fn handle_destructuring(
        &mut self,
        pattern: TsNode<'_>,
        value: Option<TsNode<'_>>,
        parent_id: &str,
        declaration_kind: &str,
    ) -> Result<()> {
        let source_id = match value {
            Some(v) => self.resolve_value(v, parent_id)?,
            None => None,
        };
        let mut names = Vec::new();
        collect_pattern_identifiers(pattern, self.source, &mut names);
        for name in names {
            let id = self.new_id(NodeKind::Variable, &name, None);
            let var_id = self.add(
                self.builder(NodeKind::Variable, &name, pattern)
                    .id(id)
                    .meta("declarationKind", declaration_kind.to_string())
                    .meta("destructured", true),
            )?;
            self.contains(parent_id, &var_id)?;
            self.bind(&name, &var_id);
            if let Some(src) = &source_id {
                self.edge(EdgeKind::AssignedFrom, &var_id, src)?;
            }
        }
        Ok(())
    }

    /// Create (or resolve) the node representing a value expression and
    /// return its ID. This is the single seam data-flow edges hang off.
    fn resolve_value(&mut self, value: TsNode<'_>, parent_id: &str) -> Result<Option<String>> {
        match value.kind() {
            "identifier" => Ok(self.lookup(text(value, self.source))),
            "call_expression" => self.handle_call(value, parent_id),
            "new_expression" => self.handle_new(value, parent_id),
            "await_expression" | "parenthesized_expression" => match value.named_child(0) {
                Some(inner) => self.resolve_value(inner, parent_id),
                None => Ok(None),
            },
            "member_expression" => {
                let chain = callee_name(value, self.source);
                let object = value
                    .child_by_field_name("object")
                    .map(|o| callee_name(o, self.source))
                    .unwrap_or_default();
                let property = value
                    .child_by_field_name("property")
                    .map(|p| text(p, self.source).to_string())
                    .unwrap_or_default();
                let hints = IdHints {
                    object: Some(object.clone()),
                    ..Default::default()
                };
                let id = self.new_id(NodeKind::PropertyAccess, &chain, Some(&hints));
                let access_id = self.add(
                    self.builder(NodeKind::PropertyAccess, &chain, value)
                        .id(id)
                        .meta("object", object.clone())
                        .meta("property", property),
                )?;
                self.contains(parent_id, &access_id)?;
                if let Some(base) = self.lookup(object.split('.').next().unwrap_or(&object)) {
                    self.edge(EdgeKind::ReadsFrom, &access_id, &base)?;
                }
                Ok(Some(access_id))
            }
            kind if is_literal_kind(kind) => {
                let raw = text(value, self.source);
                let display = display_name(raw, 120);
                let id = self.new_id(NodeKind::Literal, &display, None);
                let literal_id = self.add(
                    self.builder(NodeKind::Literal, &display, value)
                        .id(id)
                        .meta("value", display.clone())
                        .meta("literalType", value.kind()),
                )?;
                self.contains(parent_id, &literal_id)?;
                Ok(Some(literal_id))
            }
            "object" => {
                let id = self.new_id(NodeKind::ObjectLiteral, "object", None);
                let object_id = self.add(
                    self.builder(NodeKind::ObjectLiteral, "object", value).id(id),
                )?;
                self.contains(parent_id, &object_id)?;
                let mut cursor = value.walk();
                let pairs: Vec<TsNode<'_>> = value.named_children(&mut cursor).collect();
                for pair in pairs {
                    if pair.kind() != "pair" {
                        continue;
                    }
                    let key = pair
                        .child_by_field_name("key")
                        .map(|k| unquote(text(k, self.source)).to_string())
                        .unwrap_or_default();
                    if key.is_empty() {
                        continue;
                    }
                    let prop_id = self.new_id(NodeKind::PropertyAssignment, &key, None);
                    let prop_id = self.add(
                        self.builder(NodeKind::PropertyAssignment, &key, pair).id(prop_id),
                    )?;
                    self.edge(EdgeKind::HasProperty, &object_id, &prop_id)?;
                    if let Some(v) = pair.child_by_field_name("value") {
                        if let Some(src) = self.resolve_value(v, &prop_id)? {
                            self.edge(EdgeKind::AssignedFrom, &prop_id, &src)?;
                        }
                    }
                }
                Ok(Some(object_id))
            }
            "array" => {
                let id = self.new_id(NodeKind::ArrayLiteral, "array", None);
                let array_id = self.add(
                    self.builder(NodeKind::ArrayLiteral, "array", value).id(id),
                )?;
                self.contains(parent_id, &array_id)?;
                let mut cursor = value.walk();
                let elements: Vec<TsNode<'_>> = value.named_children(&mut cursor).collect();
                for (index, element) in elements.into_iter().enumerate() {
                    if let Some(src) = self.resolve_value(element, &array_id)? {
                        self.edge_indexed(EdgeKind::HasElement, &array_id, &src, index as u32)?;
                    }
                }
                Ok(Some(array_id))
            }
            "binary_expression" | "ternary_expression" | "unary_expression"
            | "template_string" => {
                let display = display_name(text(value, self.source), 80);
                let id = self.new_id(NodeKind::Expression, &display, None);
                let expr_id = self.add(
                    self.builder(NodeKind::Expression, &display, value)
                        .id(id)
                        .meta("expressionType", value.kind()),
                )?;
                self.contains(parent_id, &expr_id)?;
                // Every identifier operand feeds the expression.
                let mut operands = Vec::new();
                collect_identifiers(value, self.source, &mut operands);
                for operand in operands {
                    if let Some(binding) = self.lookup(&operand) {
                        self.edge(EdgeKind::DerivesFrom, &expr_id, &binding)?;
                    }
                }
                // Calls nested in the expression still get extracted.
                let mut cursor = value.walk();
                let children: Vec<TsNode<'_>> = value
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() == "call_expression" || c.kind() == "new_expression")
                    .collect();
                for child in children {
                    if let Some(call_id) = self.resolve_value(child, &expr_id)? {
                        self.edge(EdgeKind::DerivesFrom, &expr_id, &call_id)?;
                    }
                }
                Ok(Some(expr_id))
            }
            "arrow_function" | "function_expression" => {
                self.handle_function(value, parent_id, None).map(Some)
            }
            _ => {
                self.visit_children(value, parent_id)?;
                Ok(None)
            }
        }
    }

    // ── Calls ───────────────────────────────────────────────

    fn handle_call(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<Option<String>> {
        let Some(callee) = node.child_by_field_name("function") else {
            return Ok(None);
        };
        let arguments = node.child_by_field_name("arguments");

        let computed = callee.kind() == "subscript_expression";
        let name = if computed {
            "<computed>".to_string()
        } else {
            callee_name(callee, self.source)
        };
        if name.is_empty() {
            return Ok(None);
        }

        let object = match callee.kind() {
            "member_expression" => callee
                .child_by_field_name("object")
                .map(|o| callee_name(o, self.source)),
            _ => None,
        };

        let arity = arguments.map(argument_count).unwrap_or(0);
        let first_literal = arguments.and_then(|a| first_string_argument(a, self.source));
        let hints = IdHints {
            arity: Some(arity),
            literal: first_literal.clone(),
            target_chain: Some(name.clone()),
            ..Default::default()
        };

        let id = self.new_id(NodeKind::Call, &name, Some(&hints));
        let mut builder = self
            .builder(NodeKind::Call, &name, node)
            .id(id)
            .meta("args", arity as u64)
            .meta("resolved", false);
        if let Some(object) = &object {
            builder = builder.meta("object", object.clone());
        }
        if computed {
            builder = builder.meta("computed", true);
            if let Some(index) = callee.child_by_field_name("index") {
                builder = builder.meta("indexVariable", text(index, self.source).to_string());
            }
        }
        let call_id = self.add(builder)?;
        self.contains(parent_id, &call_id)?;
        self.register_throwable(&call_id);

        if let Some(arguments) = arguments {
            self.handle_arguments(arguments, &call_id)?;
        }

        // In-place receiver mutation: arr.push(x) flows x into arr.
        if let (Some(object), Some(arguments)) = (&object, arguments) {
            let method = name.rsplit('.').next().unwrap_or("");
            if MUTATING_METHODS.contains(&method) {
                if let Some(receiver) = self.lookup(object.split('.').next().unwrap_or(object)) {
                    self.edge(EdgeKind::Modifies, &call_id, &receiver)?;
                    let mut cursor = arguments.walk();
                    let args: Vec<TsNode<'_>> = arguments.named_children(&mut cursor).collect();
                    for arg in args {
                        if arg.kind() == "identifier" {
                            if let Some(value) = self.lookup(text(arg, self.source)) {
                                self.edge(EdgeKind::FlowsInto, &value, &receiver)?;
                            }
                        }
                    }
                }
            }
        }

        Ok(Some(call_id))
    }

    fn handle_arguments(&mut self, arguments: TsNode<'_>, call_id: &str) -> Result<()> {
        let mut cursor = arguments.walk();
        let args: Vec<TsNode<'_>> = arguments
            .named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .collect();
        for (index, arg) in args.into_iter().enumerate() {
            match arg.kind() {
                "identifier" => {
                    if let Some(binding) = self.lookup(text(arg, self.source)) {
                        self.edge_indexed(
                            EdgeKind::PassesArgument,
                            call_id,
                            &binding,
                            index as u32,
                        )?;
                    }
                }
                "arrow_function" | "function_expression" => {
                    let fn_id = self.handle_function(arg, call_id, None)?;
                    self.edge(EdgeKind::HasCallback, call_id, &fn_id)?;
                    self.edge_indexed(EdgeKind::PassesArgument, call_id, &fn_id, index as u32)?;
                }
                _ => {
                    if let Some(value_id) = self.resolve_value(arg, call_id)? {
                        self.edge_indexed(
                            EdgeKind::PassesArgument,
                            call_id,
                            &value_id,
                            index as u32,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_new(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<Option<String>> {
        let Some(constructor) = node.child_by_field_name("constructor") else {
            return Ok(None);
        };
        let name = callee_name(constructor, self.source);
        let arguments = node.child_by_field_name("arguments");
        let arity = arguments.map(argument_count).unwrap_or(0);
        let is_builtin = BUILTIN_TYPES.contains(&name.as_str());

        let hints = IdHints {
            arity: Some(arity),
            target_chain: Some(name.clone()),
            ..Default::default()
        };
        let id = self.new_id(NodeKind::ConstructorCall, &name, Some(&hints));
        let ctor_id = self.add(
            self.builder(NodeKind::ConstructorCall, &name, node)
                .id(id)
                .meta("isBuiltin", is_builtin)
                .meta("className", name.clone())
                .meta("args", arity as u64),
        )?;
        self.contains(parent_id, &ctor_id)?;
        self.register_throwable(&ctor_id);

        if let Some(class_id) = self.lookup(&name) {
            self.edge(EdgeKind::InstanceOf, &ctor_id, &class_id)?;
        }
        if let Some(arguments) = arguments {
            self.handle_arguments(arguments, &ctor_id)?;
        }
        Ok(Some(ctor_id))
    }

    // ── Control flow ────────────────────────────────────────

    fn handle_if(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let condition = node
            .child_by_field_name("condition")
            .map(|c| truncate(text(c, self.source), 120))
            .unwrap_or_default();

        let branch_id = self.new_id(NodeKind::Branch, "if", None);
        let branch_id = self.add(
            self.builder(NodeKind::Branch, "if", node)
                .id(branch_id)
                .meta("branchType", "if")
                .meta("condition", condition.clone()),
        )?;
        self.contains(parent_id, &branch_id)?;

        if let Some(consequence) = node.child_by_field_name("consequence") {
            let scope_id =
                self.enter_scope_node(ScopeKind::If, consequence, Some(condition.clone()))?;
            self.edge(EdgeKind::HasScope, &branch_id, &scope_id)?;
            self.edge(EdgeKind::Guards, &branch_id, &scope_id)?;
            self.contains(&branch_id, &scope_id)?;
            self.visit_children(consequence, &scope_id)?;
            self.exit_scope_node();
        }

        if let Some(alternative) = node.child_by_field_name("alternative") {
            // else_clause wraps either a block or a chained if_statement.
            let inner = alternative.named_child(0);
            match inner {
                Some(chained) if chained.kind() == "if_statement" => {
                    self.handle_if(chained, parent_id)?;
                }
                Some(block) => {
                    let scope_id = self.enter_scope_node(ScopeKind::Else, block, None)?;
                    self.edge(EdgeKind::HasScope, &branch_id, &scope_id)?;
                    self.edge(EdgeKind::Guards, &branch_id, &scope_id)?;
                    self.contains(&branch_id, &scope_id)?;
                    self.visit_children(block, &scope_id)?;
                    self.exit_scope_node();
                }
                None => {}
            }
        }
        Ok(())
    }

    fn handle_loop(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let loop_type = match node.kind() {
            "for_statement" => "for",
            "for_in_statement" => {
                if has_keyword(node, "of") {
                    "for_of"
                } else {
                    "for_in"
                }
            }
            "while_statement" => "while",
            _ => "do_while",
        };
        let scope_kind = if node.kind().starts_with("for") {
            ScopeKind::For
        } else {
            ScopeKind::While
        };
        let condition = node
            .child_by_field_name("condition")
            .map(|c| truncate(text(c, self.source), 120));

        let mut builder = self
            .builder(NodeKind::Loop, loop_type, node)
            .meta("loopType", loop_type);
        if let Some(condition) = &condition {
            builder = builder.meta("condition", condition.clone());
        }
        let id = self.new_id(NodeKind::Loop, loop_type, None);
        let loop_id = self.add(builder.id(id))?;
        self.contains(parent_id, &loop_id)?;

        let Some(body) = node.child_by_field_name("body") else {
            return Ok(());
        };
        let scope_id = self.enter_scope_node(scope_kind, body, condition)?;
        self.edge(EdgeKind::HasScope, &loop_id, &scope_id)?;
        self.contains(&loop_id, &scope_id)?;

        // for (const item of items) — bind the loop variable, link iteration.
        if node.kind() == "for_in_statement" {
            if let Some(left) = node.child_by_field_name("left") {
                let mut names = Vec::new();
                collect_pattern_identifiers(left, self.source, &mut names);
                for name in names {
                    let var_id = self.new_id(NodeKind::Variable, &name, None);
                    let var_id = self.add(
                        self.builder(NodeKind::Variable, &name, left)
                            .id(var_id)
                            .meta("declarationKind", "loop"),
                    )?;
                    self.contains(&scope_id, &var_id)?;
                    self.bind(&name, &var_id);
                    if let Some(right) = node.child_by_field_name("right") {
                        if right.kind() == "identifier" {
                            if let Some(iterated) = self.lookup(text(right, self.source)) {
                                self.edge(EdgeKind::IteratesOver, &loop_id, &iterated)?;
                                self.edge(EdgeKind::AssignedFrom, &var_id, &iterated)?;
                            }
                        }
                    }
                }
            }
        } else {
            if let Some(initializer) = node.child_by_field_name("initializer") {
                self.visit(initializer, &scope_id)?;
            }
            if let Some(increment) = node.child_by_field_name("increment") {
                self.visit(increment, &scope_id)?;
            }
        }

        self.visit_children(body, &scope_id)?;
        self.exit_scope_node();
        Ok(())
    }

    fn handle_try(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let try_id = self.new_id(NodeKind::TryBlock, "try", None);
        let try_id = self.add(self.builder(NodeKind::TryBlock, "try", node).id(try_id))?;
        self.contains(parent_id, &try_id)?;

        let throwables = if let Some(body) = node.child_by_field_name("body") {
            self.frames.push(TryFrame {
                barrier: false,
                throwables: Vec::new(),
            });
            let scope_id = self.enter_scope_node(ScopeKind::Try, body, None)?;
            self.edge(EdgeKind::HasScope, &try_id, &scope_id)?;
            self.contains(&try_id, &scope_id)?;
            self.visit_children(body, &scope_id)?;
            self.exit_scope_node();
            self.frames.pop().map(|f| f.throwables).unwrap_or_default()
        } else {
            Vec::new()
        };

        if let Some(handler) = node.child_by_field_name("handler") {
            let parameter = handler
                .child_by_field_name("parameter")
                .map(|p| text(p, self.source).to_string());
            let mut builder = self.builder(NodeKind::CatchBlock, "catch", handler);
            if let Some(parameter) = &parameter {
                builder = builder.meta("parameter", parameter.clone());
            }
            let catch_id = self.new_id(NodeKind::CatchBlock, "catch", None);
            let catch_id = self.add(builder.id(catch_id))?;
            self.contains(&try_id, &catch_id)?;

            // Every throwable in the try body can land here.
            for throwable in &throwables {
                self.edge(EdgeKind::CatchesFrom, &catch_id, throwable)?;
            }

            if let Some(body) = handler.child_by_field_name("body") {
                let scope_id = self.enter_scope_node(ScopeKind::Catch, body, None)?;
                self.edge(EdgeKind::HasScope, &catch_id, &scope_id)?;
                self.contains(&catch_id, &scope_id)?;
                if let Some(parameter) = &parameter {
                    let param_id = self.new_id(NodeKind::Parameter, parameter, None);
                    let param_id = self.add(
                        self.builder(NodeKind::Parameter, parameter, handler)
                            .id(param_id)
                            .meta("index", 0u64),
                    )?;
                    self.contains(&scope_id, &param_id)?;
                    self.bind(parameter, &param_id);
                }
                self.visit_children(body, &scope_id)?;
                self.exit_scope_node();
            }
        }

        if let Some(finalizer) = node.child_by_field_name("finalizer") {
            let finally_id = self.new_id(NodeKind::FinallyBlock, "finally", None);
            let finally_id = self.add(
                self.builder(NodeKind::FinallyBlock, "finally", finalizer).id(finally_id),
            )?;
            self.contains(&try_id, &finally_id)?;
            if let Some(body) = finalizer.child_by_field_name("body") {
                let scope_id = self.enter_scope_node(ScopeKind::Finally, body, None)?;
                self.edge(EdgeKind::HasScope, &finally_id, &scope_id)?;
                self.contains(&finally_id, &scope_id)?;
                self.visit_children(body, &scope_id)?;
                self.exit_scope_node();
            }
        }
        Ok(())
    }

    fn handle_switch(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let value = node
            .child_by_field_name("value")
            .map(|v| truncate(text(v, self.source), 120))
            .unwrap_or_default();
        let branch_id = self.new_id(NodeKind::Branch, "switch", None);
        let branch_id = self.add(
            self.builder(NodeKind::Branch, "switch", node)
                .id(branch_id)
                .meta("branchType", "switch")
                .meta("condition", value),
        )?;
        self.contains(parent_id, &branch_id)?;

        let Some(body) = node.child_by_field_name("body") else {
            return Ok(());
        };
        let mut cursor = body.walk();
        let cases: Vec<TsNode<'_>> = body.named_children(&mut cursor).collect();
        for case in cases {
            let is_default = case.kind() == "switch_default";
            let test = case
                .child_by_field_name("value")
                .map(|v| display_name(text(v, self.source), 80));
            let case_name = test.clone().unwrap_or_else(|| "default".to_string());
            let mut builder = self
                .builder(NodeKind::Case, &case_name, case)
                .meta("isDefault", is_default);
            if let Some(test) = &test {
                builder = builder.meta("test", test.clone());
            }
            let case_id = self.new_id(NodeKind::Case, &case_name, None);
            let case_id = self.add(builder.id(case_id))?;
            self.contains(&branch_id, &case_id)?;
            self.visit_children(case, &case_id)?;
        }
        Ok(())
    }

    fn handle_return(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let id = self.new_id(NodeKind::Return, "return", None);
        let return_id = self.add(self.builder(NodeKind::Return, "return", node).id(id))?;
        self.contains(parent_id, &return_id)?;
        if let Some(argument) = node.named_child(0) {
            if let Some(value_id) = self.resolve_value(argument, &return_id)? {
                self.edge(EdgeKind::ReadsFrom, &return_id, &value_id)?;
            }
        }
        Ok(())
    }

    fn handle_throw(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let id = self.new_id(NodeKind::Throw, "throw", None);
        let throw_id = self.add(self.builder(NodeKind::Throw, "throw", node).id(id))?;
        self.contains(parent_id, &throw_id)?;
        self.register_throwable(&throw_id);
        if let Some(argument) = node.named_child(0) {
            if let Some(value_id) = self.resolve_value(argument, &throw_id)? {
                self.edge(EdgeKind::ReadsFrom, &throw_id, &value_id)?;
            }
        }
        Ok(())
    }

    fn handle_update(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let Some(argument) = node.child_by_field_name("argument") else {
            return Ok(());
        };
        let target = text(argument, self.source).to_string();
        let id = self.new_id(NodeKind::UpdateExpression, &target, None);
        let update_id = self.add(
            self.builder(NodeKind::UpdateExpression, &target, node).id(id),
        )?;
        self.contains(parent_id, &update_id)?;
        if argument.kind() == "identifier" {
            if let Some(binding) = self.lookup(&target) {
                self.edge(EdgeKind::Modifies, &update_id, &binding)?;
            }
        }
        Ok(())
    }

    fn handle_assignment(&mut self, node: TsNode<'_>, parent_id: &str) -> Result<()> {
        let Some(left) = node.child_by_field_name("left") else {
            return Ok(());
        };
        let Some(right) = node.child_by_field_name("right") else {
            return Ok(());
        };

        match left.kind() {
            "identifier" => {
                let name = text(left, self.source).to_string();
                if let Some(target) = self.lookup(&name) {
                    if let Some(src) = self.resolve_value(right, parent_id)? {
                        // Reassignment extends the multigraph; `a = b; b = a`
                        // legitimately produces a cycle.
                        self.edge(EdgeKind::AssignedFrom, &target, &src)?;
                    }
                } else {
                    // Implicit global or out-of-scope write; still extract
                    // whatever the RHS contains.
                    self.resolve_value(right, parent_id)?;
                }
            }
            "member_expression" => {
                let chain = callee_name(left, self.source);
                let id = self.new_id(NodeKind::PropertyAssignment, &chain, None);
                let assign_id = self.add(
                    self.builder(NodeKind::PropertyAssignment, &chain, node).id(id),
                )?;
                self.contains(parent_id, &assign_id)?;
                if let Some(object) = left.child_by_field_name("object") {
                    if object.kind() == "identifier" {
                        if let Some(receiver) = self.lookup(text(object, self.source)) {
                            self.edge(EdgeKind::Modifies, &assign_id, &receiver)?;
                        }
                    }
                }
                if let Some(src) = self.resolve_value(right, parent_id)? {
                    self.edge(EdgeKind::AssignedFrom, &assign_id, &src)?;
                }
            }
            _ => {
                self.resolve_value(right, parent_id)?;
            }
        }
        Ok(())
    }

    // ── Scope node helpers ──────────────────────────────────

    fn enter_scope_node(
        &mut self,
        kind: ScopeKind,
        node: TsNode<'_>,
        condition: Option<String>,
    ) -> Result<String> {
        let (scope_name, _) = self.tracker.enter_counted(kind);
        self.bindings.push(HashMap::new());
        let mut builder = self
            .builder(NodeKind::Scope, &scope_name, node)
            .meta("scopeType", kind.as_str());
        if let Some(condition) = condition {
            builder = builder.meta("condition", condition);
        }
        // Scope IDs keep the v1 path shape: scopes are positional by nature
        // and their IDs are never aliased across refactors.
        let mut ctx = self.tracker.context();
        ctx.scope_path.pop();
        let scope_path_id = identity::compute(NodeKind::Scope, &scope_name, &ctx, 0);
        self.add(builder.id(scope_path_id))
    }

    fn exit_scope_node(&mut self) {
        self.bindings.pop();
        self.tracker.exit();
    }
}

// ── Free helpers ────────────────────────────────────────────

fn is_literal_kind(kind: &str) -> bool {
    matches!(
        kind,
        "string" | "number" | "true" | "false" | "null" | "undefined" | "regex"
    )
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Display name for nodes named after free source text (literals,
/// expressions, case tests). Characters that are structural in semantic IDs
/// are replaced so `parse(id)` stays total.
fn display_name(s: &str, max: usize) -> String {
    let cleaned: String = s
        .chars()
        .take(max)
        .map(|c| match c {
            '[' => '(',
            ']' => ')',
            '#' => '_',
            '\n' => ' ',
            _ => c,
        })
        .collect();
    cleaned.replace("->", "~>")
}

fn has_keyword(node: TsNode<'_>, keyword: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == keyword)
}

/// Ordered parameter names of a function-like node. Destructured patterns
/// surface as `<pattern>`; the arity still counts them.
fn parameter_names(node: TsNode<'_>, source: &str) -> Vec<String> {
    let Some(params) = node
        .child_by_field_name("parameters")
        .or_else(|| node.child_by_field_name("parameter"))
    else {
        return Vec::new();
    };
    if params.kind() == "identifier" {
        // Single-parameter arrow without parens.
        return vec![text(params, source).to_string()];
    }
    let mut names = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        let name = match param.kind() {
            "identifier" => text(param, source).to_string(),
            "required_parameter" | "optional_parameter" => param
                .child_by_field_name("pattern")
                .map(|p| {
                    if p.kind() == "identifier" {
                        text(p, source).to_string()
                    } else {
                        "<pattern>".to_string()
                    }
                })
                .unwrap_or_else(|| "<pattern>".to_string()),
            "assignment_pattern" => param
                .child_by_field_name("left")
                .map(|l| text(l, source).to_string())
                .unwrap_or_else(|| "<pattern>".to_string()),
            "rest_pattern" => {
                let inner = param
                    .named_child(0)
                    .map(|i| text(i, source).to_string())
                    .unwrap_or_default();
                format!("...{inner}")
            }
            "object_pattern" | "array_pattern" => "<pattern>".to_string(),
            _ => continue,
        };
        names.push(name);
    }
    names
}

/// All identifiers bound by a destructuring pattern (or a plain declarator
/// left-hand side).
fn collect_pattern_identifiers(node: TsNode<'_>, source: &str, out: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            out.push(text(node, source).to_string());
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                match child.kind() {
                    "pair_pattern" => {
                        if let Some(value) = child.child_by_field_name("value") {
                            collect_pattern_identifiers(value, source, out);
                        }
                    }
                    _ => collect_pattern_identifiers(child, source, out),
                }
            }
        }
    }
}

/// All plain identifier leaves in an expression subtree.
fn collect_identifiers(node: TsNode<'_>, source: &str, out: &mut Vec<String>) {
    if node.kind() == "identifier" {
        out.push(text(node, source).to_string());
        return;
    }
    // Member expressions contribute only their base object.
    if node.kind() == "member_expression" {
        if let Some(object) = node.child_by_field_name("object") {
            collect_identifiers(object, source, out);
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_identifiers(child, source, out);
    }
}

/// The declared name of a function/class/variable declaration node.
fn declared_name(node: TsNode<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" | "class_declaration" => node
            .child_by_field_name("name")
            .map(|n| text(n, source).to_string()),
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            node.named_children(&mut cursor)
                .find(|c| c.kind() == "variable_declarator")
                .and_then(|d| d.child_by_field_name("name"))
                .map(|n| text(n, source).to_string())
        }
        _ => None,
    }
}
