//! HTTP pattern extractor: express-style routes and outbound requests.

use super::helpers::*;
use super::{Extractor, ModuleInfo};
use crate::buffers::NodeBuffers;
use anyhow::Result;
use grafema_core::identity::{self, IdHints};
use grafema_core::model::{Edge, EdgeKind, NodeKind};
use grafema_core::schema::NodeBuilder;
use grafema_core::scope::ScopeTracker;
use tree_sitter::{Node as TsNode, Tree};

const ROUTE_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "options", "head", "all"];
const ROUTER_OBJECTS: &[&str] = &["app", "router", "server", "api"];
const AXIOS_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "head", "request"];

pub struct HttpExtractor;

impl Extractor for HttpExtractor {
    fn name(&self) -> &'static str {
        "http"
    }

    fn extract(
        &self,
        tree: &Tree,
        source: &str,
        module: &ModuleInfo,
        buffers: &mut NodeBuffers,
        tracker: &mut ScopeTracker,
    ) -> Result<()> {
        let mut calls = Vec::new();
        walk_tree(tree.root_node(), &mut |node| {
            if node.kind() == "call_expression" {
                calls.push(node);
            }
        });
        for call in calls {
            extract_route(call, source, module, buffers, tracker)?;
            extract_request(call, source, module, buffers, tracker)?;
        }
        Ok(())
    }
}

fn extract_route(
    call: TsNode<'_>,
    source: &str,
    module: &ModuleInfo,
    buffers: &mut NodeBuffers,
    tracker: &mut ScopeTracker,
) -> Result<()> {
    let Some(callee) = call.child_by_field_name("function") else {
        return Ok(());
    };
    if callee.kind() != "member_expression" {
        return Ok(());
    }
    let object = callee
        .child_by_field_name("object")
        .map(|o| callee_name(o, source))
        .unwrap_or_default();
    let method = callee
        .child_by_field_name("property")
        .map(|p| text(p, source).to_string())
        .unwrap_or_default();

    if !ROUTE_METHODS.contains(&method.as_str()) {
        return Ok(());
    }
    // Receiver must look like an express app/router; `app.api.get` style
    // chains qualify on their base object.
    let base = object.split('.').next().unwrap_or(&object);
    if !ROUTER_OBJECTS.contains(&base) {
        return Ok(());
    }

    let Some(arguments) = call.child_by_field_name("arguments") else {
        return Ok(());
    };
    let Some(path) = first_string_argument(arguments, source) else {
        return Ok(());
    };
    if !path.starts_with('/') {
        return Ok(());
    }

    let method_upper = method.to_uppercase();
    let name = format!("{method_upper} {path}");
    let hints = IdHints {
        literal: Some(path.clone()),
        object: Some(object.clone()),
        ..Default::default()
    };
    let counter = tracker.next_item_counter(&format!("http:route:{name}"));
    let id = identity::compute_compact(
        NodeKind::HttpRoute,
        &name,
        &module.file,
        None,
        Some(&identity::content_hash(&hints)),
        counter,
    );

    // Last argument names the handler when it is a plain identifier.
    let mut cursor = arguments.walk();
    let handler = arguments
        .named_children(&mut cursor)
        .last()
        .filter(|last| last.kind() == "identifier")
        .map(|last| text(last, source).to_string());

    let mut builder = NodeBuilder::new(NodeKind::HttpRoute, &name, module.file.clone())
        .at(line(call), column(call))
        .id(id)
        .meta("method", method_upper)
        .meta("path", path)
        .meta("framework", "express");
    if let Some(handler) = handler {
        builder = builder.meta("handler", handler);
    }
    let route_id = buffers.push_node(builder.build()?);
    buffers.push_edge(Edge::new(EdgeKind::Contains, &module.module_id, &route_id)?);
    Ok(())
}

fn extract_request(
    call: TsNode<'_>,
    source: &str,
    module: &ModuleInfo,
    buffers: &mut NodeBuffers,
    tracker: &mut ScopeTracker,
) -> Result<()> {
    let Some(callee) = call.child_by_field_name("function") else {
        return Ok(());
    };
    let arguments = call.child_by_field_name("arguments");
    let url = arguments.and_then(|a| first_string_argument(a, source));

    let (library, method) = match callee.kind() {
        "identifier" if text(callee, source) == "fetch" => ("fetch", "GET".to_string()),
        "member_expression" => {
            let object = callee
                .child_by_field_name("object")
                .map(|o| callee_name(o, source))
                .unwrap_or_default();
            let property = callee
                .child_by_field_name("property")
                .map(|p| text(p, source).to_string())
                .unwrap_or_default();
            if object == "axios" && AXIOS_METHODS.contains(&property.as_str()) {
                ("axios", property.to_uppercase())
            } else {
                return Ok(());
            }
        }
        _ => return Ok(()),
    };

    let name = match &url {
        Some(url) => format!("{method} {url}"),
        None => format!("{method} *"),
    };
    let hints = IdHints {
        literal: url.clone(),
        target_chain: Some(library.to_string()),
        ..Default::default()
    };
    let counter = tracker.next_item_counter(&format!("http:request:{name}"));
    let id = identity::compute_compact(
        NodeKind::HttpRequest,
        &name,
        &module.file,
        None,
        Some(&identity::content_hash(&hints)),
        counter,
    );

    let mut builder = NodeBuilder::new(NodeKind::HttpRequest, &name, module.file.clone())
        .at(line(call), column(call))
        .id(id)
        .meta("library", library)
        .meta("method", method);
    if let Some(url) = url {
        builder = builder.meta("url", url);
    }
    let request_id = buffers.push_node(builder.build()?);
    buffers.push_edge(Edge::new(EdgeKind::Contains, &module.module_id, &request_id)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::SourceLanguage;
    use tree_sitter::Parser;

    fn extract(source: &str) -> NodeBuffers {
        let mut parser = Parser::new();
        parser
            .set_language(&SourceLanguage::JavaScript.grammar())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        let module = ModuleInfo {
            file: "src/routes.js".to_string(),
            module_id: "src/routes.js->MODULE->routes.js".to_string(),
            language: SourceLanguage::JavaScript,
            service: None,
        };
        let mut buffers = NodeBuffers::new();
        let mut tracker = ScopeTracker::new("src/routes.js");
        HttpExtractor
            .extract(&tree, source, &module, &mut buffers, &mut tracker)
            .unwrap();
        buffers
    }

    #[test]
    fn extracts_express_routes() {
        let buffers = extract(
            r#"
app.get('/users', listUsers);
app.post('/users', (req, res) => res.send('ok'));
router.delete('/users/:id', removeUser);
notARouter.get('/nope', x);
"#,
        );
        let routes: Vec<_> = buffers
            .nodes()
            .iter()
            .filter(|n| n.kind == NodeKind::HttpRoute)
            .collect();
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].name, "GET /users");
        assert_eq!(routes[0].meta_str("method"), Some("GET"));
        assert_eq!(routes[0].meta_str("handler"), Some("listUsers"));
        assert_eq!(routes[2].meta_str("path"), Some("/users/:id"));
    }

    #[test]
    fn extracts_fetch_and_axios() {
        let buffers = extract(
            r#"
fetch('https://api.example.com/items');
axios.post('/api/items', payload);
axios.unknownVerb('/x');
"#,
        );
        let requests: Vec<_> = buffers
            .nodes()
            .iter()
            .filter(|n| n.kind == NodeKind::HttpRequest)
            .collect();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].meta_str("library"), Some("fetch"));
        assert_eq!(requests[1].meta_str("library"), Some("axios"));
        assert_eq!(requests[1].meta_str("method"), Some("POST"));
    }
}
