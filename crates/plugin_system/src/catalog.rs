//! Compiled-in plugin catalog.
//!
//! Plugins are linked into the binary; discovery only decides which of them
//! to instantiate. A manifest or package names a catalog key, and the
//! catalog maps that key to the plugin's factory.

use game_server::PluginFactory;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Default, Clone)]
pub struct PluginCatalog {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a factory under `key`, replacing any earlier one.
    pub fn register(&mut self, key: impl Into<String>, factory: PluginFactory) -> &mut Self {
        let key = key.into();
        if self.factories.insert(key.clone(), factory).is_some() {
            warn!("⚠️ Plugin catalog entry {} was replaced", key);
        }
        self
    }

    pub fn with(mut self, key: impl Into<String>, factory: PluginFactory) -> Self {
        self.register(key, factory);
        self
    }

    pub fn get(&self, key: &str) -> Option<PluginFactory> {
        self.factories.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}
