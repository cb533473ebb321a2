//! Semantic identity for graph entities.
//!
//! Two ID shapes coexist. The v1 path form embeds the full scope path:
//!
//! ```text
//! src/app.js->UserService->create->CALL->db.insert#1
//! ```
//!
//! The v2 compact form embeds only the nearest *named* ancestor (class or
//! function), an optional 16-bit content hash, and a collision counter:
//!
//! ```text
//! src/app.js->CALL->db.insert[in:create,h:9f2c]#1
//! ```
//!
//! Anonymous scopes (if, try, for, …) are invisible in v2 IDs: wrapping an
//! entity in a new `if` block does not rename it. Every extractor emits v2
//! IDs; v1 is parsed for compatibility with older snapshots but no longer
//! produced outside of explicit [`compute`] calls.
//!
//! IDs are functions of content and position only. Nothing here reads the
//! clock or any per-run state.

use crate::model::NodeKind;

/// Scope snapshot handed over by the scope tracker when an ID is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeContext {
    pub file: String,
    pub scope_path: Vec<String>,
}

impl ScopeContext {
    pub fn new(file: impl Into<String>) -> Self {
        ScopeContext {
            file: file.into(),
            scope_path: Vec::new(),
        }
    }
}

/// Hints folded into the 16-bit content hash that discriminates colliding
/// names. Fields are canonicalized in the fixed order `a|l|p|r|t|o`; absent
/// fields are skipped entirely rather than left as empty slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdHints {
    /// `a` — call/function arity.
    pub arity: Option<u32>,
    /// `l` — first literal argument, verbatim.
    pub literal: Option<String>,
    /// `p` — parameter or property names.
    pub params: Vec<String>,
    /// `r` — RHS expression type (tree-sitter node kind).
    pub rhs_type: Option<String>,
    /// `t` — member/target chain, e.g. `res.status.json`.
    pub target_chain: Option<String>,
    /// `o` — receiver object name.
    pub object: Option<String>,
}

impl IdHints {
    /// Canonical tuple string fed to FNV-1a.
    pub fn canonical(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(a) = self.arity {
            parts.push(format!("a:{a}"));
        }
        if let Some(l) = &self.literal {
            parts.push(format!("l:{l}"));
        }
        if !self.params.is_empty() {
            parts.push(format!("p:{}", self.params.join(",")));
        }
        if let Some(r) = &self.rhs_type {
            parts.push(format!("r:{r}"));
        }
        if let Some(t) = &self.target_chain {
            parts.push(format!("t:{t}"));
        }
        if let Some(o) = &self.object {
            parts.push(format!("o:{o}"));
        }
        parts.join("|")
    }

    pub fn is_empty(&self) -> bool {
        self.arity.is_none()
            && self.literal.is_none()
            && self.params.is_empty()
            && self.rhs_type.is_none()
            && self.target_chain.is_none()
            && self.object.is_none()
    }
}

/// Which shape an ID was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFormat {
    /// Full scope path embedded.
    V1,
    /// Compact: nearest named parent + hash + counter.
    V2,
    /// `net:stdio->__stdio__`, `net:request->*`, `EXTERNAL_MODULE-><name>`.
    Special,
}

/// Decomposed semantic ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedId {
    pub format: IdFormat,
    pub file: String,
    pub scope_path: Vec<String>,
    /// Node type string as embedded in the ID (`FUNCTION`, `http:route`, …).
    pub kind: String,
    pub name: String,
    pub named_parent: Option<String>,
    pub hash: Option<String>,
    pub counter: u32,
}

impl ParsedId {
    /// The embedded type, when it names a known kind.
    pub fn node_kind(&self) -> Option<NodeKind> {
        self.kind.parse().ok()
    }
}

/// Singleton ID for process stdio sinks.
pub const STDIO_ID: &str = "net:stdio->__stdio__";
/// Singleton ID for outbound network requests with unresolvable targets.
pub const NET_REQUEST_ID: &str = "net:request->*";
/// Prefix for modules outside the analyzed tree.
pub const EXTERNAL_MODULE_PREFIX: &str = "EXTERNAL_MODULE->";

const ARROW: &str = "->";

/// Build the ID of an external module node.
pub fn external_module_id(name: &str) -> String {
    format!("{EXTERNAL_MODULE_PREFIX}{name}")
}

/// Compute a v1 path-form ID. The full scope path is embedded, so this shape
/// is only used where structural context is cheap and stability under
/// refactoring does not matter.
pub fn compute(kind: NodeKind, name: &str, ctx: &ScopeContext, counter: u32) -> String {
    let mut id = String::with_capacity(ctx.file.len() + name.len() + 32);
    id.push_str(&ctx.file);
    for scope in &ctx.scope_path {
        id.push_str(ARROW);
        id.push_str(scope);
    }
    id.push_str(ARROW);
    id.push_str(kind.as_str());
    id.push_str(ARROW);
    id.push_str(name);
    if counter > 0 {
        id.push('#');
        id.push_str(&counter.to_string());
    }
    id
}

/// Compute a v2 compact ID. Brackets are emitted only when a named parent or
/// a content hash is present; the collision counter is always the bare `#k`
/// suffix and only appears for `counter > 0`.
pub fn compute_compact(
    kind: NodeKind,
    name: &str,
    file: &str,
    named_parent: Option<&str>,
    hash: Option<&str>,
    counter: u32,
) -> String {
    let mut id = String::with_capacity(file.len() + name.len() + 32);
    id.push_str(file);
    id.push_str(ARROW);
    id.push_str(kind.as_str());
    id.push_str(ARROW);
    id.push_str(name);
    if named_parent.is_some() || hash.is_some() {
        id.push('[');
        let mut first = true;
        if let Some(p) = named_parent {
            id.push_str("in:");
            id.push_str(p);
            first = false;
        }
        if let Some(h) = hash {
            if !first {
                id.push(',');
            }
            id.push_str("h:");
            id.push_str(h);
        }
        id.push(']');
    }
    if counter > 0 {
        id.push('#');
        id.push_str(&counter.to_string());
    }
    id
}

/// Parse an ID of either shape, or one of the special forms. Returns `None`
/// for anything malformed; parsing never panics.
pub fn parse(id: &str) -> Option<ParsedId> {
    if id == STDIO_ID {
        return Some(ParsedId {
            format: IdFormat::Special,
            file: String::new(),
            scope_path: Vec::new(),
            kind: "net:stdio".to_string(),
            name: "__stdio__".to_string(),
            named_parent: None,
            hash: None,
            counter: 0,
        });
    }
    if id == NET_REQUEST_ID {
        return Some(ParsedId {
            format: IdFormat::Special,
            file: String::new(),
            scope_path: Vec::new(),
            kind: "net:request".to_string(),
            name: "*".to_string(),
            named_parent: None,
            hash: None,
            counter: 0,
        });
    }
    if let Some(name) = id.strip_prefix(EXTERNAL_MODULE_PREFIX) {
        if name.is_empty() || name.contains(ARROW) {
            return None;
        }
        return Some(ParsedId {
            format: IdFormat::Special,
            file: String::new(),
            scope_path: Vec::new(),
            kind: "EXTERNAL_MODULE".to_string(),
            name: name.to_string(),
            named_parent: None,
            hash: None,
            counter: 0,
        });
    }

    let segments: Vec<&str> = id.split(ARROW).collect();
    if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    if segments.len() == 3 {
        // Compact shape: file->TYPE->name[in:p,h:hhhh]#k
        let (name, named_parent, hash, counter) = parse_tail(segments[2])?;
        Some(ParsedId {
            format: IdFormat::V2,
            file: segments[0].to_string(),
            scope_path: Vec::new(),
            kind: segments[1].to_string(),
            name,
            named_parent,
            hash,
            counter,
        })
    } else {
        // Path shape: file->scope1->…->TYPE->name#k
        let last = segments[segments.len() - 1];
        let (name, counter) = strip_counter(last)?;
        if name.is_empty() || name.contains('[') {
            return None;
        }
        Some(ParsedId {
            format: IdFormat::V1,
            file: segments[0].to_string(),
            scope_path: segments[1..segments.len() - 2]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            kind: segments[segments.len() - 2].to_string(),
            name: name.to_string(),
            named_parent: None,
            hash: None,
            counter,
        })
    }
}

/// Split a trailing `#k` counter off a segment. `("foo#2")` → `("foo", 2)`.
/// A `#` not followed by digits is part of the name.
fn strip_counter(segment: &str) -> Option<(&str, u32)> {
    if let Some(pos) = segment.rfind('#') {
        let digits = &segment[pos + 1..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            let counter: u32 = digits.parse().ok()?;
            return Some((&segment[..pos], counter));
        }
    }
    Some((segment, 0))
}

/// Parse the final v2 segment: `name`, `name#k`, `name[in:p]`,
/// `name[in:p,h:hhhh]#k`, `name[h:hhhh]`.
fn parse_tail(tail: &str) -> Option<(String, Option<String>, Option<String>, u32)> {
    let (body, counter) = strip_counter(tail)?;

    let Some(open) = body.find('[') else {
        if body.is_empty() || body.contains(']') {
            return None;
        }
        return Some((body.to_string(), None, None, counter));
    };

    if !body.ends_with(']') {
        return None;
    }
    let name = &body[..open];
    let inner = &body[open + 1..body.len() - 1];
    if name.is_empty() || inner.is_empty() {
        return None;
    }

    let mut named_parent = None;
    let mut hash = None;
    for token in inner.split(',') {
        if let Some(p) = token.strip_prefix("in:") {
            if p.is_empty() || named_parent.is_some() || hash.is_some() {
                return None;
            }
            named_parent = Some(p.to_string());
        } else if let Some(h) = token.strip_prefix("h:") {
            if h.len() != 4 || !h.bytes().all(|b| b.is_ascii_hexdigit()) || hash.is_some() {
                return None;
            }
            hash = Some(h.to_string());
        } else {
            return None;
        }
    }
    Some((name.to_string(), named_parent, hash, counter))
}

/// FNV-1a over the canonical hint tuple, truncated to 16 bits and rendered
/// as 4 hex digits. The constants are part of the ID contract, which is why
/// this is implemented here rather than delegated to a hasher crate.
pub fn content_hash(hints: &IdHints) -> String {
    format!("{:04x}", fnv1a_32(hints.canonical().as_bytes()) & 0xffff)
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Discriminate same-named items within one scope by source position.
/// `locations` are the `(line, column)` pairs of every sibling with the same
/// name; the result is the 0-based rank of `target` after a stable sort, or
/// 0 when the item is unique.
pub fn compute_discriminator(locations: &[(u32, u32)], target: (u32, u32)) -> u32 {
    if locations.len() <= 1 {
        return 0;
    }
    let mut sorted: Vec<(u32, u32)> = locations.to_vec();
    sorted.sort();
    sorted.iter().position(|loc| *loc == target).unwrap_or(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_round_trip_all_fields() {
        let id = compute_compact(
            NodeKind::Call,
            "db.insert",
            "src/app.js",
            Some("create"),
            Some("9f2c"),
            1,
        );
        assert_eq!(id, "src/app.js->CALL->db.insert[in:create,h:9f2c]#1");

        let parsed = parse(&id).unwrap();
        assert_eq!(parsed.format, IdFormat::V2);
        assert_eq!(parsed.file, "src/app.js");
        assert_eq!(parsed.kind, "CALL");
        assert_eq!(parsed.node_kind(), Some(NodeKind::Call));
        assert_eq!(parsed.name, "db.insert");
        assert_eq!(parsed.named_parent.as_deref(), Some("create"));
        assert_eq!(parsed.hash.as_deref(), Some("9f2c"));
        assert_eq!(parsed.counter, 1);
    }

    #[test]
    fn compact_minimal_has_no_brackets() {
        let id = compute_compact(NodeKind::Function, "foo", "a.js", None, None, 0);
        assert_eq!(id, "a.js->FUNCTION->foo");
        let parsed = parse(&id).unwrap();
        assert_eq!(parsed.named_parent, None);
        assert_eq!(parsed.hash, None);
        assert_eq!(parsed.counter, 0);
    }

    #[test]
    fn compact_counter_without_brackets() {
        let id = compute_compact(NodeKind::Call, "foo", "a.js", None, None, 2);
        assert_eq!(id, "a.js->CALL->foo#2");
        let parsed = parse(&id).unwrap();
        assert_eq!(parsed.name, "foo");
        assert_eq!(parsed.counter, 2);
    }

    #[test]
    fn v1_round_trip() {
        let ctx = ScopeContext {
            file: "src/app.js".to_string(),
            scope_path: vec!["UserService".to_string(), "create".to_string(), "if#0".to_string()],
        };
        let id = compute(NodeKind::Variable, "result", &ctx, 0);
        assert_eq!(id, "src/app.js->UserService->create->if#0->VARIABLE->result");

        let parsed = parse(&id).unwrap();
        assert_eq!(parsed.format, IdFormat::V1);
        assert_eq!(parsed.scope_path, ctx.scope_path);
        assert_eq!(parsed.kind, "VARIABLE");
        assert_eq!(parsed.name, "result");
    }

    #[test]
    fn v1_counter_suffix() {
        let ctx = ScopeContext {
            file: "a.js".to_string(),
            scope_path: vec!["main".to_string()],
        };
        let id = compute(NodeKind::Call, "log", &ctx, 3);
        assert_eq!(id, "a.js->main->CALL->log#3");
        let parsed = parse(&id).unwrap();
        assert_eq!(parsed.name, "log");
        assert_eq!(parsed.counter, 3);
    }

    #[test]
    fn special_forms() {
        let stdio = parse(STDIO_ID).unwrap();
        assert_eq!(stdio.format, IdFormat::Special);
        assert_eq!(stdio.kind, "net:stdio");

        let net = parse(NET_REQUEST_ID).unwrap();
        assert_eq!(net.name, "*");

        let ext = parse("EXTERNAL_MODULE->express").unwrap();
        assert_eq!(ext.kind, "EXTERNAL_MODULE");
        assert_eq!(ext.name, "express");
    }

    #[test]
    fn malformed_ids_return_none() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("nonsense"), None);
        assert_eq!(parse("a.js->FUNCTION"), None);
        assert_eq!(parse("a.js->->foo"), None);
        assert_eq!(parse("EXTERNAL_MODULE->"), None);
        // Unterminated or bad bracket payloads.
        assert_eq!(parse("a.js->CALL->foo[in:x"), None);
        assert_eq!(parse("a.js->CALL->foo[bogus:x]"), None);
        assert_eq!(parse("a.js->CALL->foo[h:xyz]"), None);
        assert_eq!(parse("a.js->CALL->foo[h:12345]"), None);
    }

    #[test]
    fn namespaced_kind_in_id() {
        let id = compute_compact(NodeKind::HttpRoute, "GET /users", "src/routes.js", None, None, 0);
        let parsed = parse(&id).unwrap();
        assert_eq!(parsed.kind, "http:route");
        assert_eq!(parsed.node_kind(), Some(NodeKind::HttpRoute));
    }

    #[test]
    fn content_hash_is_stable_and_order_fixed() {
        let hints = IdHints {
            arity: Some(2),
            literal: Some("/users".to_string()),
            params: vec!["req".to_string(), "res".to_string()],
            ..Default::default()
        };
        let h1 = content_hash(&hints);
        let h2 = content_hash(&hints);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 4);
        assert_eq!(hints.canonical(), "a:2|l:/users|p:req,res");

        // Different hints, different bucket (with overwhelming likelihood).
        let other = IdHints {
            arity: Some(3),
            ..hints.clone()
        };
        assert_ne!(content_hash(&other), h1);
    }

    #[test]
    fn discriminator_orders_by_position() {
        let locs = [(10, 4), (3, 0), (10, 1)];
        assert_eq!(compute_discriminator(&locs, (3, 0)), 0);
        assert_eq!(compute_discriminator(&locs, (10, 1)), 1);
        assert_eq!(compute_discriminator(&locs, (10, 4)), 2);
        assert_eq!(compute_discriminator(&[(1, 1)], (1, 1)), 0);
    }
}
