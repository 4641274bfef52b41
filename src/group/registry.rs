//! Registry - process-wide lookup of groups by name

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::group::Group;
use super::loader::Loader;

/// Named groups known to this node
///
/// Shared by the peer server and the API server; construct one per process
/// and pass it around in an `Arc`.
#[derive(Default)]
pub struct Registry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a group with a main cache of `cache_bytes`
    pub fn new_group(&self, name: impl Into<String>, cache_bytes: i64, loader: Loader) -> Arc<Group> {
        self.register(Group::new(name, cache_bytes, loader))
    }

    /// Register a fully configured group. A group already registered under
    /// the same name is replaced.
    pub fn register(&self, group: Group) -> Arc<Group> {
        let group = Arc::new(group);
        let name = group.name().to_string();
        let previous = self.groups.write().insert(name.clone(), Arc::clone(&group));
        if previous.is_some() {
            warn!(group = %name, "group re-registered, replacing previous instance");
        } else {
            info!(group = %name, "group registered");
        }
        group
    }

    /// Look up a group by name
    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Registered group names, sorted
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered groups, sorted by name
    pub fn groups(&self) -> Vec<Arc<Group>> {
        let mut groups: Vec<Arc<Group>> = self.groups.read().values().cloned().collect();
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        groups
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("groups", &self.group_names())
            .finish()
    }
}
