//! React pattern extractor: components, hooks, state, effects.

use super::helpers::*;
use super::{Extractor, ModuleInfo};
use crate::buffers::NodeBuffers;
use anyhow::Result;
use grafema_core::identity::{self, IdHints};
use grafema_core::model::{Edge, EdgeKind, NodeKind};
use grafema_core::schema::NodeBuilder;
use grafema_core::scope::ScopeTracker;
use tree_sitter::{Node as TsNode, Tree};

const KNOWN_HOOKS: &[&str] = &[
    "useState",
    "useEffect",
    "useMemo",
    "useCallback",
    "useRef",
    "useContext",
    "useReducer",
    "useLayoutEffect",
    "useImperativeHandle",
];

pub struct ReactExtractor;

impl Extractor for ReactExtractor {
    fn name(&self) -> &'static str {
        "react"
    }

    fn extract(
        &self,
        tree: &Tree,
        source: &str,
        module: &ModuleInfo,
        buffers: &mut NodeBuffers,
        tracker: &mut ScopeTracker,
    ) -> Result<()> {
        let root = tree.root_node();

        let mut functions = Vec::new();
        let mut hook_calls = Vec::new();
        walk_tree(root, &mut |node| match node.kind() {
            "function_declaration" | "arrow_function" | "function_expression" => {
                functions.push(node)
            }
            "call_expression" => hook_calls.push(node),
            _ => {}
        });

        for function in functions {
            extract_component(function, source, module, buffers, tracker)?;
        }
        for call in hook_calls {
            extract_hook(call, source, module, buffers, tracker)?;
        }
        Ok(())
    }
}

/// Whether a subtree renders JSX.
fn contains_jsx(node: TsNode<'_>) -> bool {
    let mut found = false;
    walk_tree(node, &mut |n| {
        if matches!(
            n.kind(),
            "jsx_element" | "jsx_self_closing_element" | "jsx_fragment"
        ) {
            found = true;
        }
    });
    found
}

/// The name a function-like node is known by: its own name, or the
/// variable it is assigned to.
fn function_name(node: TsNode<'_>, source: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(text(name, source).to_string());
    }
    let parent = node.parent()?;
    if parent.kind() == "variable_declarator" {
        return parent
            .child_by_field_name("name")
            .filter(|n| n.kind() == "identifier")
            .map(|n| text(n, source).to_string());
    }
    None
}

fn extract_component(
    function: TsNode<'_>,
    source: &str,
    module: &ModuleInfo,
    buffers: &mut NodeBuffers,
    tracker: &mut ScopeTracker,
) -> Result<()> {
    let Some(name) = function_name(function, source) else {
        return Ok(());
    };
    // Components are uppercase-named functions that render JSX.
    if !name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        return Ok(());
    }
    if !contains_jsx(function) {
        return Ok(());
    }

    let props = parameter_count(function);
    let counter = tracker.next_item_counter(&format!("react:component:{name}"));
    let id = identity::compute_compact(
        NodeKind::ReactComponent,
        &name,
        &module.file,
        None,
        None,
        counter,
    );
    let component_id = buffers.push_node(
        NodeBuilder::new(NodeKind::ReactComponent, &name, module.file.clone())
            .at(line(function), column(function))
            .id(id)
            .meta("props", props as u64)
            .build()?,
    );
    buffers.push_edge(Edge::new(EdgeKind::Contains, &module.module_id, &component_id)?);
    Ok(())
}

fn parameter_count(node: TsNode<'_>) -> usize {
    node.child_by_field_name("parameters")
        .map(|p| {
            let mut cursor = p.walk();
            p.named_children(&mut cursor).count()
        })
        .unwrap_or(0)
}

fn extract_hook(
    call: TsNode<'_>,
    source: &str,
    module: &ModuleInfo,
    buffers: &mut NodeBuffers,
    tracker: &mut ScopeTracker,
) -> Result<()> {
    let Some(callee) = call.child_by_field_name("function") else {
        return Ok(());
    };
    if callee.kind() != "identifier" {
        return Ok(());
    }
    let hook = text(callee, source).to_string();
    if !KNOWN_HOOKS.contains(&hook.as_str()) {
        return Ok(());
    }

    let hints = IdHints {
        target_chain: Some(hook.clone()),
        ..Default::default()
    };
    let counter = tracker.next_item_counter(&format!("react:hook:{hook}"));
    let id = identity::compute_compact(
        NodeKind::ReactHook,
        &hook,
        &module.file,
        None,
        Some(&identity::content_hash(&hints)),
        counter,
    );
    let hook_id = buffers.push_node(
        NodeBuilder::new(NodeKind::ReactHook, &hook, module.file.clone())
            .at(line(call), column(call))
            .id(id)
            .meta("hook", hook.clone())
            .build()?,
    );
    buffers.push_edge(Edge::new(EdgeKind::Contains, &module.module_id, &hook_id)?);

    match hook.as_str() {
        "useState" => extract_state(call, source, module, buffers, tracker, &hook_id)?,
        "useEffect" | "useLayoutEffect" => {
            extract_effect(call, source, module, buffers, tracker, &hook_id)?
        }
        _ => {}
    }
    Ok(())
}

/// `const [value, setValue] = useState(initial)` → react:state.
fn extract_state(
    call: TsNode<'_>,
    source: &str,
    module: &ModuleInfo,
    buffers: &mut NodeBuffers,
    tracker: &mut ScopeTracker,
    hook_id: &str,
) -> Result<()> {
    let Some(declarator) = call.parent().filter(|p| p.kind() == "variable_declarator") else {
        return Ok(());
    };
    let Some(pattern) = declarator.child_by_field_name("name") else {
        return Ok(());
    };
    if pattern.kind() != "array_pattern" {
        return Ok(());
    }
    let mut cursor = pattern.walk();
    let parts: Vec<String> = pattern
        .named_children(&mut cursor)
        .map(|n| text(n, source).to_string())
        .collect();
    let (Some(value), Some(setter)) = (parts.first(), parts.get(1)) else {
        return Ok(());
    };

    let initial = call
        .child_by_field_name("arguments")
        .and_then(|a| a.named_child(0))
        .map(|n| text(n, source).chars().take(80).collect::<String>());

    let counter = tracker.next_item_counter(&format!("react:state:{value}"));
    let id = identity::compute_compact(
        NodeKind::ReactState,
        value,
        &module.file,
        None,
        None,
        counter,
    );
    let mut builder = NodeBuilder::new(NodeKind::ReactState, value, module.file.clone())
        .at(line(call), column(call))
        .id(id)
        .meta("setter", setter.clone());
    if let Some(initial) = initial {
        builder = builder.meta("initialValue", initial);
    }
    let state_id = buffers.push_node(builder.build()?);
    buffers.push_edge(Edge::new(EdgeKind::Contains, &module.module_id, &state_id)?);
    buffers.push_edge(Edge::new(EdgeKind::AssignedFrom, &state_id, hook_id)?);
    Ok(())
}

/// `useEffect(() => {...}, [deps])` → react:effect with dependency names.
fn extract_effect(
    call: TsNode<'_>,
    source: &str,
    module: &ModuleInfo,
    buffers: &mut NodeBuffers,
    tracker: &mut ScopeTracker,
    hook_id: &str,
) -> Result<()> {
    let deps: Vec<serde_json::Value> = call
        .child_by_field_name("arguments")
        .and_then(|a| a.named_child(1))
        .filter(|d| d.kind() == "array")
        .map(|d| {
            let mut cursor = d.walk();
            d.named_children(&mut cursor)
                .map(|n| serde_json::Value::String(text(n, source).to_string()))
                .collect()
        })
        .unwrap_or_default();

    let counter = tracker.next_item_counter("react:effect:effect");
    let id = identity::compute_compact(
        NodeKind::ReactEffect,
        "effect",
        &module.file,
        None,
        None,
        counter,
    );
    let effect_id = buffers.push_node(
        NodeBuilder::new(NodeKind::ReactEffect, "effect", module.file.clone())
            .at(line(call), column(call))
            .id(id)
            .meta("deps", serde_json::Value::Array(deps))
            .build()?,
    );
    buffers.push_edge(Edge::new(EdgeKind::Contains, &module.module_id, &effect_id)?);
    buffers.push_edge(Edge::new(EdgeKind::DerivesFrom, &effect_id, hook_id)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::SourceLanguage;
    use tree_sitter::Parser;

    #[test]
    fn extracts_components_hooks_state_effects() {
        let source = r#"
import { useState, useEffect } from 'react';

export function UserList({ users }) {
  const [selected, setSelected] = useState(null);
  useEffect(() => {
    console.log(selected);
  }, [selected]);
  return <ul>{users.map(u => <li key={u.id}>{u.name}</li>)}</ul>;
}

function helperNotAComponent() {
  return 42;
}
"#;
        let mut parser = Parser::new();
        parser.set_language(&SourceLanguage::Tsx.grammar()).unwrap();
        let tree = parser.parse(source, None).unwrap();
        let module = ModuleInfo {
            file: "src/UserList.tsx".to_string(),
            module_id: "src/UserList.tsx->MODULE->UserList.tsx".to_string(),
            language: SourceLanguage::Tsx,
            service: None,
        };
        let mut buffers = NodeBuffers::new();
        let mut tracker = ScopeTracker::new("src/UserList.tsx");
        ReactExtractor
            .extract(&tree, source, &module, &mut buffers, &mut tracker)
            .unwrap();

        let kinds: Vec<NodeKind> = buffers.nodes().iter().map(|n| n.kind).collect();
        assert!(kinds.contains(&NodeKind::ReactComponent));
        assert_eq!(
            kinds.iter().filter(|k| **k == NodeKind::ReactHook).count(),
            2
        );

        let state = buffers
            .nodes()
            .iter()
            .find(|n| n.kind == NodeKind::ReactState)
            .unwrap();
        assert_eq!(state.name, "selected");
        assert_eq!(state.meta_str("setter"), Some("setSelected"));

        let effect = buffers
            .nodes()
            .iter()
            .find(|n| n.kind == NodeKind::ReactEffect)
            .unwrap();
        assert_eq!(effect.metadata["deps"][0], "selected");
    }
}
