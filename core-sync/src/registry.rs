//! # Source Registry
//!
//! Catalogue of the sync providers available to the orchestrator, keyed by
//! source name. Built at startup and shared by reference; readers never block
//! each other and a writer excludes everyone else.

use crate::provider::{SourceConfig, SyncProvider};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct SourceRegistry {
    providers: RwLock<HashMap<String, Arc<dyn SyncProvider>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its configured name, returning the one it replaced.
    pub fn register(&self, provider: Arc<dyn SyncProvider>) -> Option<Arc<dyn SyncProvider>> {
        let name = provider.config().name;
        info!(source = %name, "Registered sync provider");
        self.providers.write().insert(name, provider)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn SyncProvider>> {
        self.providers.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SyncProvider>> {
        self.providers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Configs of every provider, sorted by name.
    pub fn list(&self) -> Vec<SourceConfig> {
        let mut configs: Vec<SourceConfig> =
            self.providers.read().values().map(|p| p.config()).collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.providers.read().len()
    }
}
