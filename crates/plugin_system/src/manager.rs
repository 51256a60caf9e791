//! Plugin bootstrap.
//!
//! Folder plugins load first, then package plugins. The two sources differ
//! in strictness: a folder plugin that fails to instantiate or register
//! aborts startup, while a broken package is logged and skipped.

use crate::catalog::PluginCatalog;
use crate::config::PluginsConfig;
use crate::error::PluginSystemError;
use crate::folder::{discover_folder_plugins, read_manifest, FolderPlugin};
use crate::package::{dependency_names, probe_package, PackageCandidate};
use game_server::{Plugin, ServerBuilder};
use polaris_event_system::{current_timestamp, PluginLoadedEvent};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where a loaded plugin was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    Folder(PathBuf),
    Package(String),
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSource::Folder(path) => write!(f, "folder {}", path.display()),
            PluginSource::Package(name) => write!(f, "package {}", name),
        }
    }
}

/// One entry of the loaded-plugin listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPlugin {
    pub name: String,
    pub version: String,
    pub source: PluginSource,
    /// False for packages listed under their package name and version
    /// because no plugin could be instantiated from them
    pub instantiated: bool,
}

impl fmt::Display for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// Discovers plugins and registers them on a [`ServerBuilder`].
#[derive(Debug)]
pub struct PluginManager {
    catalog: PluginCatalog,
    config: PluginsConfig,
}

impl PluginManager {
    pub fn new(catalog: PluginCatalog, config: PluginsConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PluginsConfig {
        &self.config
    }

    /// Runs folder discovery, then package discovery.
    ///
    /// Every registered plugin is handed to the builder, which keeps it for
    /// the server's lifetime.
    ///
    /// # Returns
    ///
    /// The loaded-plugin listing, or the first fatal folder-plugin error.
    pub async fn load_plugins(&self, builder: &mut ServerBuilder) -> Result<Vec<LoadedPlugin>, PluginSystemError> {
        info!("🔌 Loading plugins");

        let mut loaded = self.load_plugins_folder(builder).await?;
        loaded.extend(self.load_plugin_packages(builder).await);

        if loaded.is_empty() {
            info!("📭 No plugins loaded");
        } else {
            info!("🎉 {} plugin(s) loaded", loaded.len());
        }

        Ok(loaded)
    }

    async fn load_plugins_folder(&self, builder: &mut ServerBuilder) -> Result<Vec<LoadedPlugin>, PluginSystemError> {
        let found = discover_folder_plugins(&self.config.directory, &self.config.suffix)?;
        let mut loaded = Vec::new();

        for candidate in found {
            if let Some(plugin) = self.load_folder_plugin(builder, &candidate).await? {
                loaded.push(plugin);
            }
        }

        Ok(loaded)
    }

    async fn load_folder_plugin(
        &self,
        builder: &mut ServerBuilder,
        candidate: &FolderPlugin,
    ) -> Result<Option<LoadedPlugin>, PluginSystemError> {
        debug!("Loading {}", candidate.path.display());

        let manifest = read_manifest(&candidate.manifest)?;
        let factory = match manifest.entry.as_deref() {
            Some(entry) => self.catalog.get(entry),
            None => None,
        };
        let Some(factory) = factory else {
            warn!(
                "⚠️ The plugin {} does not name a known plugin entry (this is allowed but discouraged)",
                candidate.file_name()
            );
            return Ok(None);
        };

        let plugin = factory()
            .map_err(|e| PluginSystemError::InstantiationFailed(candidate.file_name(), e))?;
        let loaded = register(builder, plugin, PluginSource::Folder(candidate.path.clone()))
            .await
            .map_err(|(name, e)| PluginSystemError::RegistrationFailed(name, e))?;

        Ok(Some(loaded))
    }

    async fn load_plugin_packages(&self, builder: &mut ServerBuilder) -> Vec<LoadedPlugin> {
        let manifest = &self.config.package_manifest;
        let dependencies = match dependency_names(manifest) {
            Ok(dependencies) => dependencies,
            Err(e) => {
                debug!("Skipping plugin packages: {}", e);
                return Vec::new();
            }
        };

        let mut loaded = Vec::new();
        for name in dependencies {
            match probe_package(&self.config.package_directory, &name) {
                Ok(Some(candidate)) => loaded.push(self.load_package(builder, candidate).await),
                Ok(None) => {}
                Err(e) => debug!("Caught error while probing package {}: {}", name, e),
            }
        }

        loaded
    }

    /// Instantiates a package plugin, falling back to the package's own name
    /// and version when that fails.
    async fn load_package(&self, builder: &mut ServerBuilder, candidate: PackageCandidate) -> LoadedPlugin {
        debug!("Loading package {} v{}", candidate.name, candidate.version);
        let source = PluginSource::Package(candidate.name.clone());

        let outcome = match self.catalog.get(&candidate.entry) {
            Some(factory) => match factory() {
                Ok(plugin) => register(builder, plugin, source.clone())
                    .await
                    .map_err(|(name, e)| format!("plugin {} failed to register: {}", name, e)),
                Err(e) => Err(format!("instantiation failed: {}", e)),
            },
            None => Err(format!("no catalog entry named {}", candidate.entry)),
        };

        match outcome {
            Ok(loaded) => loaded,
            Err(reason) => {
                debug!("Package {} has no usable plugin: {}", candidate.name, reason);
                let loaded = LoadedPlugin {
                    name: candidate.name,
                    version: candidate.version,
                    source,
                    instantiated: false,
                };
                announce(builder, &loaded).await;
                loaded
            }
        }
    }
}

/// Registers `plugin` on the builder and hands it over.
///
/// A failed registration leaves the builder as it was before the call.
async fn register(
    builder: &mut ServerBuilder,
    mut plugin: Box<dyn Plugin>,
    source: PluginSource,
) -> Result<LoadedPlugin, (String, polaris_event_system::PluginError)> {
    let name = plugin.name().to_string();
    let checkpoint = builder.checkpoint();
    if let Err(e) = plugin.register(builder).await {
        builder.rollback(checkpoint).await;
        return Err((name, e));
    }

    let loaded = LoadedPlugin {
        name,
        version: plugin.version().to_string(),
        source,
        instantiated: true,
    };
    builder.add_plugin(plugin);
    announce(builder, &loaded).await;

    Ok(loaded)
}

async fn announce(builder: &ServerBuilder, loaded: &LoadedPlugin) {
    info!("✅ Loaded plugin: {} ({})", loaded, loaded.source);

    let event = PluginLoadedEvent {
        name: loaded.name.clone(),
        version: loaded.version.clone(),
        source: loaded.source.to_string(),
        timestamp: current_timestamp(),
    };
    if let Err(e) = builder.events().emit_core("plugin_loaded", &event).await {
        warn!("Failed to emit plugin_loaded for {}: {}", loaded.name, e);
    }
}
