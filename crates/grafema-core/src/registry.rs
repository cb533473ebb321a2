//! Per-run resource registry.
//!
//! Replaces ambient singletons: every per-run resource (covered-package
//! sets, cache handles) lives in a lifetime-scoped map created at run start
//! and cleared at run end. Resources are built lazily by their factory,
//! before the phases that depend on them, and are immutable afterwards.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct ResourceRegistry {
    entries: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .entries
            .lock()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        f.debug_struct("ResourceRegistry").field("keys", &keys).finish()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the resource under `key`, building it with `factory` on first
    /// access. Panics if the key exists with a different type — that is a
    /// programming error, not a runtime condition.
    pub fn get_or_init<T, F>(&self, key: &str, factory: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(factory()));
        entry
            .clone()
            .downcast::<T>()
            .unwrap_or_else(|_| panic!("resource '{key}' registered with a different type"))
    }

    /// Fetch without initializing.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.get(key).and_then(|e| e.clone().downcast::<T>().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .expect("registry lock poisoned")
            .contains_key(key)
    }

    /// Drop every resource. Called at run end.
    pub fn clear(&self) {
        self.entries.lock().expect("registry lock poisoned").clear();
    }
}
