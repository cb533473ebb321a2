//! SQL pattern extractor: `.query(...)` / `.execute(...)` call sites.

use super::helpers::*;
use super::{Extractor, ModuleInfo};
use crate::buffers::NodeBuffers;
use anyhow::Result;
use grafema_core::identity::{self, IdHints};
use grafema_core::model::{Edge, EdgeKind, NodeKind};
use grafema_core::schema::NodeBuilder;
use grafema_core::scope::ScopeTracker;
use regex::Regex;
use std::sync::OnceLock;
use tree_sitter::Tree;

const QUERY_METHODS: &[&str] = &["query", "execute", "run", "all", "get"];
const SQL_KEYWORDS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP"];

fn table_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:FROM|INTO|UPDATE|JOIN|TABLE)\s+([A-Za-z_][A-Za-z0-9_.]*)")
            .expect("table regex is valid")
    })
}

pub struct SqlExtractor;

impl Extractor for SqlExtractor {
    fn name(&self) -> &'static str {
        "sql"
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
            let Some(callee) = call.child_by_field_name("function") else {
                continue;
            };
            if callee.kind() != "member_expression" {
                continue;
            }
            let method = callee
                .child_by_field_name("property")
                .map(|p| text(p, source).to_string())
                .unwrap_or_default();
            if !QUERY_METHODS.contains(&method.as_str()) {
                continue;
            }
            let Some(arguments) = call.child_by_field_name("arguments") else {
                continue;
            };
            let Some(sql) = first_string_argument(arguments, source) else {
                continue;
            };
            let upper = sql.to_uppercase();
            let Some(verb) = SQL_KEYWORDS
                .iter()
                .find(|k| upper.trim_start().starts_with(*k))
            else {
                continue;
            };

            let tables: Vec<serde_json::Value> = table_regex()
                .captures_iter(&sql)
                .map(|c| serde_json::Value::String(c[1].to_string()))
                .collect();

            let display: String = sql.chars().take(120).collect();
            let name = format!("{verb} {}", tables.first().and_then(|t| t.as_str()).unwrap_or("?"));
            let hints = IdHints {
                literal: Some(display.clone()),
                ..Default::default()
            };
            let counter = tracker.next_item_counter(&format!("db:query:{name}"));
            let id = identity::compute_compact(
                NodeKind::DbQuery,
                &name,
                &module.file,
                None,
                Some(&identity::content_hash(&hints)),
                counter,
            );
            let query_id = buffers.push_node(
                NodeBuilder::new(NodeKind::DbQuery, &name, module.file.clone())
                    .at(line(call), column(call))
                    .id(id)
                    .meta("query", display)
                    .meta("tables", serde_json::Value::Array(tables))
                    .build()?,
            );
            buffers.push_edge(Edge::new(EdgeKind::Contains, &module.module_id, &query_id)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::SourceLanguage;
    use tree_sitter::Parser;

    #[test]
    fn extracts_queries_with_tables() {
        let source = r#"
const users = await db.query('SELECT id, name FROM users WHERE active = 1');
await pool.execute('INSERT INTO audit_log (event) VALUES (?)', [event]);
cache.get('not-sql');
"#;
        let mut parser = Parser::new();
        parser
            .set_language(&SourceLanguage::JavaScript.grammar())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        let module = ModuleInfo {
            file: "src/db.js".to_string(),
            module_id: "src/db.js->MODULE->db.js".to_string(),
            language: SourceLanguage::JavaScript,
            service: None,
        };
        let mut buffers = NodeBuffers::new();
        let mut tracker = ScopeTracker::new("src/db.js");
        SqlExtractor
            .extract(&tree, source, &module, &mut buffers, &mut tracker)
            .unwrap();

        let queries: Vec<_> = buffers
            .nodes()
            .iter()
            .filter(|n| n.kind == NodeKind::DbQuery)
            .collect();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].name, "SELECT users");
        assert_eq!(queries[0].metadata["tables"][0], "users");
        assert_eq!(queries[1].name, "INSERT audit_log");
    }
}
