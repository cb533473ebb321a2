//! socket.io pattern extractor: emits, listeners, rooms, and the shared
//! event nodes that connect them.

use super::helpers::*;
use super::{Extractor, ModuleInfo};
use crate::buffers::NodeBuffers;
use anyhow::Result;
use grafema_core::identity::{self, IdHints};
use grafema_core::model::{Edge, EdgeKind, NodeKind};
use grafema_core::schema::NodeBuilder;
use grafema_core::scope::ScopeTracker;
use tree_sitter::{Node as TsNode, Tree};

const SOCKET_OBJECTS: &[&str] = &["io", "socket", "ws", "namespace", "nsp"];

pub struct SocketIoExtractor;

impl Extractor for SocketIoExtractor {
    fn name(&self) -> &'static str {
        "socketio"
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
            extract_socket_call(call, source, module, buffers, tracker)?;
        }
        Ok(())
    }
}

fn is_socket_receiver(object: &str) -> bool {
    let base = object.split('.').next().unwrap_or(object);
    SOCKET_OBJECTS.contains(&base)
        // `io.to('room')` / `socket.broadcast` chains keep their base.
        || base.ends_with("Socket")
}

fn extract_socket_call(
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
    let property = callee
        .child_by_field_name("property")
        .map(|p| text(p, source).to_string())
        .unwrap_or_default();

    if !is_socket_receiver(&object) {
        return Ok(());
    }

    let Some(arguments) = call.child_by_field_name("arguments") else {
        return Ok(());
    };
    let Some(first_arg) = first_string_argument(arguments, source) else {
        return Ok(());
    };

    let kind = match property.as_str() {
        "emit" => NodeKind::SocketEmit,
        "on" | "once" => NodeKind::SocketOn,
        "to" | "in" | "join" | "leave" => NodeKind::SocketRoom,
        _ => return Ok(()),
    };

    let hints = IdHints {
        literal: Some(first_arg.clone()),
        object: Some(object.clone()),
        ..Default::default()
    };
    let counter = tracker.next_item_counter(&format!("{}:{first_arg}", kind.as_str()));
    let id = identity::compute_compact(
        kind,
        &first_arg,
        &module.file,
        None,
        Some(&identity::content_hash(&hints)),
        counter,
    );

    let builder = match kind {
        NodeKind::SocketRoom => NodeBuilder::new(kind, &first_arg, module.file.clone())
            .at(line(call), column(call))
            .id(id)
            .meta("room", first_arg.clone()),
        _ => NodeBuilder::new(kind, &first_arg, module.file.clone())
            .at(line(call), column(call))
            .id(id)
            .meta("event", first_arg.clone()),
    };
    let node_id = buffers.push_node(builder.build()?);
    buffers.push_edge(Edge::new(EdgeKind::Contains, &module.module_id, &node_id)?);

    // emit/on share a per-file event node so the pair is connected even
    // before cross-file enrichment.
    if matches!(kind, NodeKind::SocketEmit | NodeKind::SocketOn) {
        let event_id = identity::compute_compact(
            NodeKind::SocketEvent,
            &first_arg,
            &module.file,
            None,
            None,
            0,
        );
        if buffers.node_by_id(&event_id).is_none() {
            buffers.push_node(
                NodeBuilder::new(NodeKind::SocketEvent, &first_arg, module.file.clone())
                    .at(line(call), column(call))
                    .id(event_id.clone())
                    .meta("event", first_arg.clone())
                    .build()?,
            );
            buffers.push_edge(Edge::new(EdgeKind::Contains, &module.module_id, &event_id)?);
        }
        let edge_kind = if kind == NodeKind::SocketEmit {
            EdgeKind::Affects
        } else {
            EdgeKind::ReadsFrom
        };
        buffers.push_edge(Edge::new(edge_kind, &node_id, &event_id)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::SourceLanguage;
    use tree_sitter::Parser;

    #[test]
    fn extracts_emit_on_and_rooms() {
        let source = r#"
io.on('connection', (socket) => {
  socket.on('chat:message', handleMessage);
  socket.join('lobby');
  io.to('lobby').emit('chat:message', payload);
});
"#;
        let mut parser = Parser::new();
        parser
            .set_language(&SourceLanguage::JavaScript.grammar())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        let module = ModuleInfo {
            file: "src/socket.js".to_string(),
            module_id: "src/socket.js->MODULE->socket.js".to_string(),
            language: SourceLanguage::JavaScript,
            service: None,
        };
        let mut buffers = NodeBuffers::new();
        let mut tracker = ScopeTracker::new("src/socket.js");
        SocketIoExtractor
            .extract(&tree, source, &module, &mut buffers, &mut tracker)
            .unwrap();

        let count = |kind: NodeKind| {
            buffers
                .nodes()
                .iter()
                .filter(|n| n.kind == kind)
                .count()
        };
        assert_eq!(count(NodeKind::SocketOn), 2);
        assert_eq!(count(NodeKind::SocketEmit), 1);
        assert_eq!(count(NodeKind::SocketRoom), 2); // join + to
        // 'connection' and 'chat:message' events (emit + on share one).
        assert_eq!(count(NodeKind::SocketEvent), 2);

        let affects = buffers
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::Affects)
            .count();
        assert_eq!(affects, 1);
    }
}
