//! Scope tracking during extraction.
//!
//! One tracker per file, owned by the worker doing the extraction. The
//! tracker maintains the stack of enclosing scopes (classes, functions, and
//! counted anonymous blocks) plus two counter families: block counters for
//! anonymous scopes (`if#0`, `try#1`, …) and item counters for same-name
//! repeats within a scope (three `foo()` calls in one body get counters
//! 0, 1, 2).

use crate::identity::ScopeContext;
use crate::model::ScopeKind;
use std::collections::HashMap;

/// What kind of entry sits on the scope stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEntryKind {
    Class,
    Function,
    Method,
    /// A counted anonymous block.
    Anonymous(ScopeKind),
}

impl ScopeEntryKind {
    /// Named scopes are visible in v2 compact IDs; anonymous ones are not.
    pub fn is_named(&self) -> bool {
        !matches!(self, ScopeEntryKind::Anonymous(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    pub name: String,
    pub kind: ScopeEntryKind,
}

/// Scope stack + counters for the file currently under extraction.
/// Deliberately not `Sync` — workers each own one.
#[derive(Debug)]
pub struct ScopeTracker {
    file: String,
    stack: Vec<ScopeEntry>,
    block_counters: HashMap<String, u32>,
    item_counters: HashMap<String, u32>,
}

impl ScopeTracker {
    pub fn new(file: impl Into<String>) -> Self {
        ScopeTracker {
            file: file.into(),
            stack: Vec::new(),
            block_counters: HashMap::new(),
            item_counters: HashMap::new(),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Enter a named scope (class, function, method).
    pub fn enter(&mut self, name: impl Into<String>, kind: ScopeEntryKind) {
        self.stack.push(ScopeEntry {
            name: name.into(),
            kind,
        });
    }

    /// Enter a counted anonymous block. The entry is named `<kind>#<k>`
    /// where `k` counts siblings of the same kind under the same parent
    /// path. Returns the generated name and counter.
    pub fn enter_counted(&mut self, kind: ScopeKind) -> (String, u32) {
        let key = format!("{}:{}", self.path_string(), kind.as_str());
        let counter = self.block_counters.entry(key).or_insert(0);
        let k = *counter;
        *counter += 1;
        let name = format!("{}#{}", kind.as_str(), k);
        self.stack.push(ScopeEntry {
            name: name.clone(),
            kind: ScopeEntryKind::Anonymous(kind),
        });
        (name, k)
    }

    pub fn exit(&mut self) -> Option<ScopeEntry> {
        self.stack.pop()
    }

    /// Next counter for a same-name repeat in the current scope, keyed by
    /// `scopePath + ":" + itemType`. First call for a key returns 0.
    pub fn next_item_counter(&mut self, item_type: &str) -> u32 {
        let key = format!("{}:{}", self.path_string(), item_type);
        let counter = self.item_counters.entry(key).or_insert(0);
        let k = *counter;
        *counter += 1;
        k
    }

    /// Snapshot of the current context for identity computation.
    pub fn context(&self) -> ScopeContext {
        ScopeContext {
            file: self.file.clone(),
            scope_path: self.stack.iter().map(|e| e.name.clone()).collect(),
        }
    }

    /// Innermost named ancestor (class, function, or method), if any.
    /// Feeds the `in:` field of v2 compact IDs.
    pub fn nearest_named(&self) -> Option<&str> {
        self.stack
            .iter()
            .rev()
            .find(|e| e.kind.is_named())
            .map(|e| e.name.as_str())
    }

    /// Innermost enclosing class name, used for method receiver context.
    pub fn enclosing_class(&self) -> Option<&str> {
        self.stack
            .iter()
            .rev()
            .find(|e| e.kind == ScopeEntryKind::Class)
            .map(|e| e.name.as_str())
    }

    fn path_string(&self) -> String {
        self.stack
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join("->")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_blocks_are_per_parent_per_kind() {
        let mut tracker = ScopeTracker::new("a.js");
        tracker.enter("main", ScopeEntryKind::Function);

        let (name0, k0) = tracker.enter_counted(ScopeKind::If);
        assert_eq!((name0.as_str(), k0), ("if#0", 0));
        tracker.exit();

        let (name1, k1) = tracker.enter_counted(ScopeKind::If);
        assert_eq!((name1.as_str(), k1), ("if#1", 1));

        // A different kind under the same parent starts at 0.
        let (try_name, _) = tracker.enter_counted(ScopeKind::Try);
        assert_eq!(try_name, "try#0");
        tracker.exit();
        tracker.exit();

        // Sibling `if` under a different function restarts at 0.
        tracker.exit();
        tracker.enter("other", ScopeEntryKind::Function);
        let (name2, _) = tracker.enter_counted(ScopeKind::If);
        assert_eq!(name2, "if#0");
    }

    #[test]
    fn item_counters_are_scoped() {
        let mut tracker = ScopeTracker::new("a.js");
        tracker.enter("main", ScopeEntryKind::Function);
        assert_eq!(tracker.next_item_counter("CALL:log"), 0);
        assert_eq!(tracker.next_item_counter("CALL:log"), 1);
        assert_eq!(tracker.next_item_counter("CALL:warn"), 0);

        tracker.enter_counted(ScopeKind::If);
        assert_eq!(tracker.next_item_counter("CALL:log"), 0);
    }

    #[test]
    fn nearest_named_skips_anonymous_blocks() {
        let mut tracker = ScopeTracker::new("a.js");
        tracker.enter("UserService", ScopeEntryKind::Class);
        tracker.enter("create", ScopeEntryKind::Method);
        tracker.enter_counted(ScopeKind::If);
        tracker.enter_counted(ScopeKind::Try);

        assert_eq!(tracker.nearest_named(), Some("create"));
        assert_eq!(tracker.enclosing_class(), Some("UserService"));

        let ctx = tracker.context();
        assert_eq!(ctx.scope_path, vec!["UserService", "create", "if#0", "try#0"]);
    }

    #[test]
    fn empty_tracker_context() {
        let tracker = ScopeTracker::new("a.js");
        assert_eq!(tracker.nearest_named(), None);
        assert!(tracker.context().scope_path.is_empty());
    }
}
