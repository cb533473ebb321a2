//! Shared tree-sitter helpers for extractors.

use tree_sitter::Node;

/// Node text as UTF-8, empty on invalid ranges.
pub fn text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-based line of a node's start.
pub fn line(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// 0-based column of a node's start.
pub fn column(node: Node<'_>) -> u32 {
    node.start_position().column as u32
}

/// Strip matching quotes from a string literal's text.
pub fn unquote(raw: &str) -> &str {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// The callee of a call expression, flattened: `foo`, `obj.method`,
/// `a.b.c`. Computed member access renders as `<computed>`.
pub fn callee_name(callee: Node<'_>, source: &str) -> String {
    match callee.kind() {
        "identifier" => text(callee, source).to_string(),
        "member_expression" => {
            let object = callee
                .child_by_field_name("object")
                .map(|o| callee_name(o, source))
                .unwrap_or_default();
            let property = callee
                .child_by_field_name("property")
                .map(|p| text(p, source).to_string())
                .unwrap_or_default();
            if object.is_empty() {
                property
            } else {
                format!("{object}.{property}")
            }
        }
        "subscript_expression" => "<computed>".to_string(),
        "call_expression" => callee
            .child_by_field_name("function")
            .map(|f| callee_name(f, source))
            .unwrap_or_default(),
        "this" => "this".to_string(),
        _ => text(callee, source).to_string(),
    }
}

/// First string-literal argument of a call's `arguments` node, unquoted.
pub fn first_string_argument(arguments: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = arguments.walk();
    for child in arguments.named_children(&mut cursor) {
        match child.kind() {
            "string" => return Some(unquote(text(child, source)).to_string()),
            "template_string" if child.named_child_count() == 0 => {
                return Some(unquote(text(child, source)).to_string())
            }
            "comment" => continue,
            _ => return None,
        }
    }
    None
}

/// Count of named arguments in a call's `arguments` node.
pub fn argument_count(arguments: Node<'_>) -> u32 {
    let mut cursor = arguments.walk();
    arguments
        .named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .count() as u32
}

/// Walk the whole tree depth-first, invoking `visit` on every node.
pub fn walk_tree<'t>(root: Node<'t>, visit: &mut impl FnMut(Node<'t>)) {
    let mut cursor = root.walk();
    let mut done = false;
    while !done {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                done = true;
                break;
            }
        }
    }
}

