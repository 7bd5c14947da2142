//! Plugin registry
//!
//! Plugins are registered once at process start. Each registration builds the
//! plugin with a fresh, private `PluginStorage`. Playground jobs select
//! registered plugins by name; selection preserves registration order and
//! silently drops unknown names.

use std::sync::Arc;

use tracing::debug;

use super::builtin;
use super::storage::PluginStorage;
use super::{CrawlPlugin, InputPlugin};

/// An input plugin plus the storage it was constructed with
#[derive(Clone)]
pub struct RegisteredInputPlugin {
    pub plugin: Arc<dyn InputPlugin>,
    pub storage: Arc<PluginStorage>,
}

/// A crawl plugin plus the storage it was constructed with
#[derive(Clone)]
pub struct RegisteredCrawlPlugin {
    pub plugin: Arc<dyn CrawlPlugin>,
    pub storage: Arc<PluginStorage>,
}

/// Ordered registry of all known plugins
#[derive(Default)]
pub struct PluginRegistry {
    input: Vec<RegisteredInputPlugin>,
    crawl: Vec<RegisteredCrawlPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_input(|storage| Arc::new(builtin::ReversePlugin::new(storage)));
        registry.register_input(|storage| Arc::new(builtin::UppercasePlugin::new(storage)));
        registry.register_crawl(|storage| Arc::new(builtin::PageStatsPlugin::new(storage)));
        registry.register_crawl(|storage| Arc::new(builtin::LinkAuditPlugin::new(storage)));
        registry
    }

    /// Register an input plugin, handing it a private storage.
    pub fn register_input<F>(&mut self, build: F)
    where
        F: FnOnce(Arc<PluginStorage>) -> Arc<dyn InputPlugin>,
    {
        let storage = Arc::new(PluginStorage::new());
        let plugin = build(Arc::clone(&storage));
        self.input.push(RegisteredInputPlugin { plugin, storage });
    }

    /// Register a crawl plugin, handing it a private storage.
    pub fn register_crawl<F>(&mut self, build: F)
    where
        F: FnOnce(Arc<PluginStorage>) -> Arc<dyn CrawlPlugin>,
    {
        let storage = Arc::new(PluginStorage::new());
        let plugin = build(Arc::clone(&storage));
        self.crawl.push(RegisteredCrawlPlugin { plugin, storage });
    }

    /// All registered input plugins, in registration order.
    pub fn input_plugins(&self) -> &[RegisteredInputPlugin] {
        &self.input
    }

    /// All registered crawl plugins, in registration order.
    pub fn crawl_plugins(&self) -> &[RegisteredCrawlPlugin] {
        &self.crawl
    }

    /// Enabled input plugins selected by an optional name filter.
    ///
    /// `None` selects every enabled plugin. Names not present in the registry
    /// are ignored.
    pub fn select_input(&self, names: Option<&[String]>) -> Vec<RegisteredInputPlugin> {
        if let Some(names) = names {
            for name in names {
                if !self.input.iter().any(|r| r.plugin.name() == name) {
                    debug!("plugin filter names unknown plugin '{}'", name);
                }
            }
        }
        self.input
            .iter()
            .filter(|r| r.plugin.enabled())
            .filter(|r| match names {
                None => true,
                Some(names) => names.iter().any(|n| n == r.plugin.name()),
            })
            .cloned()
            .collect()
    }

    /// Names of every registered input plugin.
    pub fn input_names(&self) -> Vec<String> {
        self.input
            .iter()
            .map(|r| r.plugin.name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_in_order() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.input_names(), vec!["reverse", "uppercase"]);
        assert_eq!(registry.crawl_plugins().len(), 2);
    }

    #[test]
    fn select_without_filter_returns_all_enabled() {
        let registry = PluginRegistry::with_builtins();
        let selected = registry.select_input(None);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn select_preserves_registration_order() {
        let registry = PluginRegistry::with_builtins();
        let names = vec!["uppercase".to_string(), "reverse".to_string()];
        let selected = registry.select_input(Some(&names));
        let got: Vec<&str> = selected.iter().map(|r| r.plugin.name()).collect();
        assert_eq!(got, vec!["reverse", "uppercase"]);
    }

    #[test]
    fn select_ignores_unknown_names() {
        let registry = PluginRegistry::with_builtins();
        let names = vec!["reverse".to_string(), "nonexistent".to_string()];
        let selected = registry.select_input(Some(&names));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].plugin.name(), "reverse");
    }

    #[test]
    fn plugins_get_distinct_storages() {
        let registry = PluginRegistry::with_builtins();
        let plugins = registry.input_plugins();
        plugins[0].storage.set("k", serde_json::json!(1));
        assert!(plugins[1].storage.get("k").is_none());
    }
}
