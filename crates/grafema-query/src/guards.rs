//! Guard-chain resolution: which conditions must hold for a node to run.

use grafema_core::model::{EdgeKind, Node, NodeKind};
use grafema_core::store::GraphStore;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Constraint {
    pub variable: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Guard {
    pub scope: Node,
    pub scope_type: String,
    pub condition: Option<String>,
    pub constraints: Vec<Constraint>,
}

fn comparison_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z_$][\w$.]*)\s*(===|!==|==|!=|>=|<=|>|<)\s*([^\s&|)]+)")
            .expect("comparison regex is valid")
    })
}

/// Parse a condition's conjuncts into simple constraints. Handles
/// comparisons, negation, and bare truthiness; anything fancier is left as
/// the raw condition text.
pub fn parse_constraints(condition: &str) -> Vec<Constraint> {
    let trimmed = condition.trim().trim_start_matches('(').trim_end_matches(')');
    let mut constraints = Vec::new();
    for conjunct in trimmed.split("&&") {
        let conjunct = conjunct.trim();
        if conjunct.is_empty() {
            continue;
        }
        if let Some(captures) = comparison_regex().captures(conjunct) {
            constraints.push(Constraint {
                variable: captures[1].to_string(),
                operator: captures[2].to_string(),
                value: captures[3].trim_end_matches(')').to_string(),
            });
        } else if let Some(negated) = conjunct.strip_prefix('!') {
            constraints.push(Constraint {
                variable: negated.trim().to_string(),
                operator: "falsy".to_string(),
                value: String::new(),
            });
        } else if conjunct
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$')
        {
            constraints.push(Constraint {
                variable: conjunct.to_string(),
                operator: "truthy".to_string(),
                value: String::new(),
            });
        }
    }
    constraints
}

/// Walk the parent SCOPE chain of a node, innermost first, returning each
/// conditional scope with its condition text and parsed constraints.
pub fn find_guards(store: &dyn GraphStore, node_id: &str) -> anyhow::Result<Vec<Guard>> {
    let mut guards = Vec::new();
    let mut current = node_id.to_string();

    // Containment chains are shallow; the bound only protects against a
    // corrupted graph.
    for _ in 0..128 {
        let incoming = store.get_incoming_edges(&current, Some(&[EdgeKind::Contains]))?;
        let Some(parent_edge) = incoming.first() else {
            break;
        };
        let Some(parent) = store.get_node(&parent_edge.src)? else {
            break;
        };
        if parent.kind == NodeKind::Scope {
            let scope_type = parent.meta_str("scopeType").unwrap_or("").to_string();
            let condition = parent.meta_str("condition").map(String::from);
            if matches!(scope_type.as_str(), "if" | "else" | "while" | "for" | "catch") {
                guards.push(Guard {
                    scope_type,
                    constraints: condition
                        .as_deref()
                        .map(parse_constraints)
                        .unwrap_or_default(),
                    condition,
                    scope: parent.clone(),
                });
            }
        }
        current = parent.id;
    }
    Ok(guards)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comparisons_and_truthiness() {
        let constraints = parse_constraints("(user.isAdmin && count > 3 && !muted)");
        assert_eq!(
            constraints,
            vec![
                Constraint {
                    variable: "user.isAdmin".to_string(),
                    operator: "truthy".to_string(),
                    value: String::new(),
                },
                Constraint {
                    variable: "count".to_string(),
                    operator: ">".to_string(),
                    value: "3".to_string(),
                },
                Constraint {
                    variable: "muted".to_string(),
                    operator: "falsy".to_string(),
                    value: String::new(),
                },
            ]
        );
    }

    #[test]
    fn parses_strict_equality() {
        let constraints = parse_constraints("status === 'active'");
        assert_eq!(constraints[0].operator, "===");
        assert_eq!(constraints[0].value, "'active'");
    }
}
