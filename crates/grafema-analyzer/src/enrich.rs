//! Cross-file enrichment passes.
//!
//! Runs after ANALYSIS with the full graph visible: call-target resolution,
//! class heritage, module dependency linking, alias tagging, and coverage
//! tagging. Everything here is read-heavy and write-light; candidate
//! resolution fans out on rayon, writes happen sequentially.

use grafema_core::diagnostics::{codes, Diagnostic, DiagnosticCollector, Severity};
use grafema_core::identity;
use grafema_core::model::{Edge, EdgeKind, Node, NodeKind};
use grafema_core::registry::ResourceRegistry;
use grafema_core::schema::NodeBuilder;
use grafema_core::store::{GraphStore, NodeFilter};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

const PLUGIN: &str = "enrich";
const PHASE: &str = "ENRICHMENT";

#[derive(Debug, Default, Clone)]
pub struct EnrichmentStats {
    pub calls_resolved: usize,
    pub unknown_targets: usize,
    pub modules_linked: usize,
    pub aliases_tagged: usize,
}

/// Symbol index built once per enrichment run.
struct Index {
    /// name → callable nodes (FUNCTION and METHOD).
    callables_by_name: HashMap<String, Vec<Node>>,
    /// (file, name) → callable node id.
    callables_by_file: HashMap<(String, String), String>,
    /// name → class nodes.
    classes_by_name: HashMap<String, Vec<Node>>,
    /// (file, local name) → IMPORT node.
    imports: HashMap<(String, String), Node>,
    /// file → MODULE node id.
    modules: HashMap<String, String>,
}

impl Index {
    fn build(store: &dyn GraphStore) -> anyhow::Result<Index> {
        let mut index = Index {
            callables_by_name: HashMap::new(),
            callables_by_file: HashMap::new(),
            classes_by_name: HashMap::new(),
            imports: HashMap::new(),
            modules: HashMap::new(),
        };
        for kind in [NodeKind::Function, NodeKind::Method] {
            for node in store.query_nodes(&NodeFilter::new().kind(kind))? {
                index
                    .callables_by_file
                    .entry((node.file.clone(), node.name.clone()))
                    .or_insert_with(|| node.id.clone());
                index
                    .callables_by_name
                    .entry(node.name.clone())
                    .or_default()
                    .push(node);
            }
        }
        for node in store.query_nodes(&NodeFilter::new().kind(NodeKind::Class))? {
            index
                .classes_by_name
                .entry(node.name.clone())
                .or_default()
                .push(node);
        }
        for node in store.query_nodes(&NodeFilter::new().kind(NodeKind::Import))? {
            index
                .imports
                .insert((node.file.clone(), node.name.clone()), node);
        }
        for node in store.query_nodes(&NodeFilter::new().kind(NodeKind::Module))? {
            if !node.file.is_empty() {
                index.modules.insert(node.file.clone(), node.id.clone());
            }
        }
        Ok(index)
    }
}

pub fn run(
    store: &dyn GraphStore,
    diagnostics: &DiagnosticCollector,
    registry: &ResourceRegistry,
) -> anyhow::Result<EnrichmentStats> {
    let index = Index::build(store)?;
    let mut stats = EnrichmentStats::default();

    resolve_calls(store, diagnostics, &index, &mut stats)?;
    resolve_heritage(store, diagnostics, &index)?;
    link_modules(store, diagnostics, &index, &mut stats)?;
    tag_aliases(store, &mut stats)?;
    tag_coverage(store, registry)?;

    Ok(stats)
}

/// Where a call resolution landed.
enum Resolution {
    Target(String, Vec<String>),
    Unknown(String, Vec<String>),
}

fn resolve_calls(
    store: &dyn GraphStore,
    diagnostics: &DiagnosticCollector,
    index: &Index,
    stats: &mut EnrichmentStats,
) -> anyhow::Result<()> {
    let calls: Vec<Node> = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Call))?
        .filter(|c| !c.meta_bool("resolved"))
        .collect();

    let resolutions: Vec<(Node, Resolution)> = calls
        .into_par_iter()
        .map(|call| {
            let resolution = resolve_one_call(store, index, &call);
            (call, resolution)
        })
        .collect();

    for (mut call, resolution) in resolutions {
        let caller = enclosing_callable(store, index, &call)?;
        match resolution {
            Resolution::Target(target_id, chain) => {
                stats.calls_resolved += 1;
                store.add_edge(Edge::new(EdgeKind::Invokes, call.id.clone(), target_id.clone())?)?;
                if let Some(caller) = &caller {
                    store.add_edge(Edge::new(EdgeKind::Calls, caller.clone(), target_id.clone())?)?;
                    store.add_edge(Edge::new(EdgeKind::CalledBy, target_id.clone(), caller.clone())?)?;
                }
                call.metadata.insert("resolved".to_string(), true.into());
                call.metadata
                    .insert("resolvedTarget".to_string(), target_id.into());
                call.metadata.insert(
                    "resolutionChain".to_string(),
                    serde_json::Value::Array(
                        chain.into_iter().map(serde_json::Value::String).collect(),
                    ),
                );
                store.add_node(call)?;
            }
            Resolution::Unknown(receiver, chain) => {
                stats.unknown_targets += 1;
                let unknown_id = ensure_unknown_target(store, &call, &receiver)?;
                store.add_edge(Edge::new(EdgeKind::Invokes, call.id.clone(), unknown_id.clone())?)?;
                if let Some(caller) = &caller {
                    store.add_edge(Edge::new(EdgeKind::Calls, caller.clone(), unknown_id)?)?;
                }
                diagnostics.add(
                    Diagnostic::new(
                        codes::ERR_UNRESOLVED_REFERENCE,
                        Severity::Warning,
                        format!("cannot resolve call target '{}'", call.name),
                        PHASE,
                        PLUGIN,
                    )
                    .with_file(call.file.clone())
                    .with_line(call.line)
                    .with_resolution_chain(chain),
                );
            }
        }
    }
    Ok(())
}

fn resolve_one_call(store: &dyn GraphStore, index: &Index, call: &Node) -> Resolution {
    let mut chain = vec![format!("call:{}", call.id)];
    let name = call.name.as_str();

    // Member calls resolve on the method part; the receiver either aliases
    // to something known or stays opaque.
    let (method, receiver) = match name.rsplit_once('.') {
        Some((receiver, method)) => (method, Some(receiver.to_string())),
        None => (name, None),
    };

    if name == "<computed>" {
        chain.push("computed call".to_string());
        return Resolution::Unknown(receiver.unwrap_or_default(), chain);
    }

    // 1. Same file.
    if let Some(id) = index
        .callables_by_file
        .get(&(call.file.clone(), method.to_string()))
    {
        chain.push(format!("same-file:{id}"));
        return Resolution::Target(id.clone(), chain);
    }

    // 2. Imported binding (direct calls only).
    if receiver.is_none() {
        if let Some(import) = index.imports.get(&(call.file.clone(), method.to_string())) {
            chain.push(format!("import:{}", import.id));
            if let Some(source) = import.meta_str("source") {
                // Relative import: land on the exported callable in the
                // resolved module, when it is unambiguous.
                if source.starts_with('.') {
                    if let Some(target_file) =
                        resolve_relative(&call.file, source, &index.modules)
                    {
                        let imported = import.meta_str("imported").unwrap_or(method);
                        let lookup = if imported == "default" || imported == "*" {
                            method
                        } else {
                            imported
                        };
                        if let Some(id) = index
                            .callables_by_file
                            .get(&(target_file.clone(), lookup.to_string()))
                        {
                            chain.push(format!("module:{target_file}"));
                            return Resolution::Target(id.clone(), chain);
                        }
                    }
                } else {
                    // External package: the call lands on the external
                    // module singleton, the edge of the analyzed world.
                    chain.push(format!("external:{source}"));
                    return Resolution::Target(identity::external_module_id(source), chain);
                }
            }
        }

        // 2b. Local alias of a function (`const log = doLog`).
        if let Some(via_alias) = resolve_via_alias(store, call, method, &mut chain) {
            return via_alias;
        }
    }

    // 3. Unique global match.
    if let Some(candidates) = index.callables_by_name.get(method) {
        let filtered: Vec<&Node> = match call.meta_str("object") {
            // For `this.method()` prefer methods; otherwise any callable.
            Some("this") => candidates
                .iter()
                .filter(|c| c.kind == NodeKind::Method)
                .collect(),
            _ => candidates.iter().collect(),
        };
        if filtered.len() == 1 {
            chain.push(format!("global-unique:{}", filtered[0].id));
            return Resolution::Target(filtered[0].id.clone(), chain);
        }
        chain.push(format!("ambiguous:{} candidates", filtered.len()));
    } else {
        chain.push("no candidate".to_string());
    }

    Resolution::Unknown(receiver.unwrap_or_default(), chain)
}

/// Chase a variable the call name binds to, through ASSIGNED_FROM, to a
/// callable.
fn resolve_via_alias(
    store: &dyn GraphStore,
    call: &Node,
    name: &str,
    chain: &mut Vec<String>,
) -> Option<Resolution> {
    let variables: Vec<Node> = store
        .query_nodes(
            &NodeFilter::new()
                .kind(NodeKind::Variable)
                .file_contains(&call.file)
                .name_contains(name),
        )
        .ok()?
        .filter(|v| v.name == name && v.file == call.file)
        .collect();
    let variable = variables.first()?;

    let mut current = variable.id.clone();
    let mut visited = HashSet::new();
    while visited.insert(current.clone()) {
        let edges = store
            .get_outgoing_edges(&current, Some(&[EdgeKind::AssignedFrom]))
            .ok()?;
        let Some(edge) = edges.first() else { break };
        chain.push(format!("alias:{} -> {}", current, edge.dst));
        let target = store.get_node(&edge.dst).ok()??;
        match target.kind {
            NodeKind::Function | NodeKind::Method => {
                return Some(Resolution::Target(target.id, chain.clone()));
            }
            NodeKind::Variable | NodeKind::Parameter => {
                current = target.id;
            }
            _ => break,
        }
    }
    None
}

/// Walk CONTAINS parents to the nearest FUNCTION/METHOD, falling back to
/// the MODULE node.
fn enclosing_callable(
    store: &dyn GraphStore,
    index: &Index,
    node: &Node,
) -> anyhow::Result<Option<String>> {
    let mut current = node.id.clone();
    for _ in 0..64 {
        let incoming = store.get_incoming_edges(&current, Some(&[EdgeKind::Contains]))?;
        let Some(parent_edge) = incoming.first() else {
            break;
        };
        let Some(parent) = store.get_node(&parent_edge.src)? else {
            break;
        };
        match parent.kind {
            NodeKind::Function | NodeKind::Method | NodeKind::Module => {
                return Ok(Some(parent.id));
            }
            _ => current = parent.id,
        }
    }
    Ok(index.modules.get(&node.file).cloned())
}

fn ensure_unknown_target(
    store: &dyn GraphStore,
    call: &Node,
    receiver: &str,
) -> anyhow::Result<String> {
    let id = identity::compute_compact(
        NodeKind::UnknownCallTarget,
        &call.name,
        &call.file,
        None,
        None,
        0,
    );
    if store.get_node(&id)?.is_none() {
        let mut builder = NodeBuilder::new(NodeKind::UnknownCallTarget, &call.name, call.file.clone())
            .id(id.clone())
            .meta("reason", "unresolvable receiver");
        if !receiver.is_empty() {
            builder = builder.meta("receiver", receiver);
        }
        store.add_node(builder.build()?)?;
    }
    Ok(id)
}

fn resolve_heritage(
    store: &dyn GraphStore,
    diagnostics: &DiagnosticCollector,
    index: &Index,
) -> anyhow::Result<()> {
    let classes: Vec<Node> = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Class))?
        .collect();
    for class in classes {
        if let Some(base) = class.meta_str("extends") {
            match index.classes_by_name.get(base) {
                Some(candidates) if candidates.len() == 1 => {
                    store.add_edge(Edge::new(
                        EdgeKind::Extends,
                        class.id.clone(),
                        candidates[0].id.clone(),
                    )?)?;
                }
                _ => {
                    diagnostics.add(
                        Diagnostic::new(
                            codes::ERR_UNRESOLVED_REFERENCE,
                            Severity::Warning,
                            format!("base class '{base}' of '{}' not found", class.name),
                            PHASE,
                            PLUGIN,
                        )
                        .with_file(class.file.clone())
                        .with_line(class.line),
                    );
                }
            }
        }
        if let Some(serde_json::Value::Array(interfaces)) = class.metadata.get("implements") {
            for interface in interfaces {
                let Some(name) = interface.as_str() else { continue };
                if let Some(candidates) = index.classes_by_name.get(name) {
                    if candidates.len() == 1 {
                        store.add_edge(Edge::new(
                            EdgeKind::Implements,
                            class.id.clone(),
                            candidates[0].id.clone(),
                        )?)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Resolve relative IMPORT sources to modules: DEPENDS_ON + IMPORTS edges.
fn link_modules(
    store: &dyn GraphStore,
    diagnostics: &DiagnosticCollector,
    index: &Index,
    stats: &mut EnrichmentStats,
) -> anyhow::Result<()> {
    let imports: Vec<Node> = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Import))?
        .collect();
    for import in imports {
        let Some(source) = import.meta_str("source") else {
            continue;
        };
        if !source.starts_with('.') {
            continue;
        }
        match resolve_relative(&import.file, source, &index.modules) {
            Some(target_file) => {
                let target_module = index.modules[&target_file].clone();
                if let Some(from_module) = index.modules.get(&import.file) {
                    store.add_edge(Edge::new(
                        EdgeKind::DependsOn,
                        from_module.clone(),
                        target_module.clone(),
                    )?)?;
                }
                store.add_edge(Edge::new(EdgeKind::Imports, import.id.clone(), target_module)?)?;
                stats.modules_linked += 1;
            }
            None => {
                diagnostics.add(
                    Diagnostic::new(
                        codes::ERR_UNRESOLVED_REFERENCE,
                        Severity::Warning,
                        format!("import '{source}' does not resolve to an analyzed module"),
                        PHASE,
                        PLUGIN,
                    )
                    .with_file(import.file.clone())
                    .with_line(import.line),
                );
            }
        }
    }
    Ok(())
}

/// Normalize `./x` / `../y` against the importing file and try the usual
/// extension/index candidates.
fn resolve_relative(
    from_file: &str,
    source: &str,
    modules: &HashMap<String, String>,
) -> Option<String> {
    let dir = match from_file.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    let mut segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in source.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let base = segments.join("/");

    let candidates = [
        base.clone(),
        format!("{base}.js"),
        format!("{base}.ts"),
        format!("{base}.tsx"),
        format!("{base}.jsx"),
        format!("{base}/index.js"),
        format!("{base}/index.ts"),
    ];
    candidates
        .into_iter()
        .find(|candidate| modules.contains_key(candidate))
}

/// Tag variables whose ASSIGNED_FROM chain terminates at a non-variable.
fn tag_aliases(store: &dyn GraphStore, stats: &mut EnrichmentStats) -> anyhow::Result<()> {
    let variables: Vec<Node> = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Variable))?
        .collect();
    for variable in variables {
        let mut current = variable.id.clone();
        let mut visited = HashSet::new();
        let mut terminal: Option<Node> = None;
        while visited.insert(current.clone()) {
            let edges = store.get_outgoing_edges(&current, Some(&[EdgeKind::AssignedFrom]))?;
            let Some(edge) = edges.first() else { break };
            let Some(target) = store.get_node(&edge.dst)? else {
                break;
            };
            if matches!(target.kind, NodeKind::Variable | NodeKind::Parameter) {
                current = target.id;
            } else {
                terminal = Some(target);
                break;
            }
        }
        if let Some(terminal) = terminal {
            if terminal.id != variable.id {
                let mut updated = variable.clone();
                updated
                    .metadata
                    .insert("aliasOf".to_string(), terminal.id.into());
                store.add_node(updated)?;
                stats.aliases_tagged += 1;
            }
        }
    }
    Ok(())
}

/// Mark imports of packages a plugin covers.
fn tag_coverage(store: &dyn GraphStore, registry: &ResourceRegistry) -> anyhow::Result<()> {
    let Some(covered) = registry.get::<HashSet<String>>("coverage:packages") else {
        return Ok(());
    };
    let imports: Vec<Node> = store
        .query_nodes(&NodeFilter::new().kind(NodeKind::Import))?
        .collect();
    for import in imports {
        let Some(source) = import.meta_str("source") else {
            continue;
        };
        if source.starts_with('.') {
            continue;
        }
        let package = source.split('/').next().unwrap_or(source);
        let is_covered = covered.contains(package);
        let mut updated = import.clone();
        updated
            .metadata
            .insert("covered".to_string(), is_covered.into());
        store.add_node(updated)?;
    }
    Ok(())
}
