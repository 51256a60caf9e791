use crate::*;
use async_trait::async_trait;
use game_server::{ExactCodeJoin, PacketContext, PassthroughTransformer, ServerConfig};
use polaris_protocol::{FramingError, MessageReader, MessageWriter, PacketLayer, PacketPayload};
use polaris_event_system::PluginLoadedEvent;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct Greeter;

#[async_trait]
impl Plugin for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    fn version(&self) -> PluginVersion {
        PluginVersion::new(1, 2, 3)
    }

    async fn register(&mut self, server: &mut ServerBuilder) -> Result<(), PluginError> {
        server.set_lobby_join_hook(ExactCodeJoin);
        Ok(())
    }
}

struct Broken;

#[async_trait]
impl Plugin for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn version(&self) -> PluginVersion {
        PluginVersion::new(0, 1, 0)
    }

    async fn register(&mut self, _server: &mut ServerBuilder) -> Result<(), PluginError> {
        Err(PluginError::RegistrationFailed("opcode taken".to_string()))
    }
}

#[derive(Debug, Clone)]
struct Ping;

impl PacketPayload for Ping {
    fn deserialize(_reader: &mut MessageReader) -> Result<Self, FramingError> {
        Ok(Ping)
    }

    fn serialize(&self, _writer: &mut MessageWriter) {}
}

/// Registers a packet, a transformer and an event handler, then trips over
/// the built-in RPC carrier.
struct HalfRegistered;

#[async_trait]
impl Plugin for HalfRegistered {
    fn name(&self) -> &str {
        "half"
    }

    fn version(&self) -> PluginVersion {
        PluginVersion::new(0, 4, 0)
    }

    async fn register(&mut self, server: &mut ServerBuilder) -> Result<(), PluginError> {
        server
            .packets_mut()
            .layer_mut(PacketLayer::Root)
            .register_packet(0x40, Ping::deserialize, |_: &PacketContext, _: &Ping| {})?;
        server.set_inbound_transformer(PassthroughTransformer);
        server
            .events()
            .on_core("plugin_loaded", |_: PluginLoadedEvent| Ok(()))
            .await?;
        server
            .packets_mut()
            .layer_mut(PacketLayer::GameData)
            .register_packet(0x02, Ping::deserialize, |_: &PacketContext, _: &Ping| {})?;
        Ok(())
    }
}

fn half() -> Result<Box<dyn Plugin>, PluginError> {
    Ok(Box::new(HalfRegistered))
}

fn greeter() -> Result<Box<dyn Plugin>, PluginError> {
    Ok(Box::new(Greeter))
}

fn broken() -> Result<Box<dyn Plugin>, PluginError> {
    Ok(Box::new(Broken))
}

fn unconstructible() -> Result<Box<dyn Plugin>, PluginError> {
    Err(PluginError::InitializationFailed("missing settings".to_string()))
}

fn catalog() -> PluginCatalog {
    PluginCatalog::new()
        .with("greeter", greeter)
        .with("broken", broken)
        .with("unconstructible", unconstructible)
        .with("half", half)
}

fn config(root: &Path) -> PluginsConfig {
    PluginsConfig {
        directory: root.join("plugins"),
        package_manifest: root.join("Cargo.toml"),
        package_directory: root.join("packages"),
        ..Default::default()
    }
}

fn builder() -> ServerBuilder {
    ServerBuilder::new(ServerConfig::default())
}

fn write_folder_plugin(root: &Path, folder: &str, entry: &str) {
    let path = root.join("plugins").join(folder);
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("index.toml"), format!("entry = \"{entry}\"")).unwrap();
}

#[tokio::test]
async fn test_folder_plugins_are_registered() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_folder_plugin(root, "greeter.npplugin", "greeter");

    let manager = PluginManager::new(catalog(), config(root));
    let mut builder = builder();
    let loaded = manager.load_plugins(&mut builder).await.unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].to_string(), "greeter v1.2.3");
    assert_eq!(
        loaded[0].source,
        PluginSource::Folder(root.join("plugins").join("greeter.npplugin"))
    );
    assert!(loaded[0].instantiated);
    assert_eq!(builder.plugin_names(), vec!["greeter"]);
    assert_eq!(builder.build().plugin_count(), 1);
}

#[tokio::test]
async fn test_folder_without_index_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("plugins").join("foo.npplugin")).unwrap();

    let manager = PluginManager::new(catalog(), config(root));
    let mut builder = builder();
    let loaded = manager.load_plugins(&mut builder).await.unwrap();

    assert!(loaded.is_empty());
    assert!(builder.plugin_names().is_empty());
}

#[tokio::test]
async fn test_unknown_entry_is_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_folder_plugin(root, "mystery.npplugin", "mystery");
    fs::write(root.join("plugins").join("bare.npplugin.json"), "{}").unwrap();
    write_folder_plugin(root, "zz.npplugin", "greeter");

    let manager = PluginManager::new(catalog(), config(root));
    let mut builder = builder();
    let loaded = manager.load_plugins(&mut builder).await.unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "greeter");
}

#[tokio::test]
async fn test_folder_plugin_failures_are_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_folder_plugin(root, "broken.npplugin", "broken");

    let manager = PluginManager::new(catalog(), config(root));
    let result = manager.load_plugins(&mut builder()).await;
    assert!(matches!(result, Err(PluginSystemError::RegistrationFailed(name, _)) if name == "broken"));

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_folder_plugin(root, "unconstructible.npplugin", "unconstructible");

    let manager = PluginManager::new(catalog(), config(root));
    let result = manager.load_plugins(&mut builder()).await;
    assert!(matches!(result, Err(PluginSystemError::InstantiationFailed(_, _))));
}

fn write_package(root: &Path, name: &str, metadata: &str) {
    let path = root.join("packages").join(name);
    fs::create_dir_all(&path).unwrap();
    fs::write(
        path.join("Cargo.toml"),
        format!("[package]\nname = \"{name}\"\nversion = \"0.4.0\"\n{metadata}"),
    )
    .unwrap();
}

#[tokio::test]
async fn test_package_plugins_are_lenient() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(
        root.join("Cargo.toml"),
        "[package]\nname = \"host\"\n\n[dependencies]\ngreeter = \"0.4\"\nbroken = \"0.4\"\nserde = \"1\"\nmissing = \"1\"\n",
    )
    .unwrap();
    write_package(root, "greeter", "\n[package.metadata]\nnp-plugin = true\n");
    write_package(root, "broken", "\n[package.metadata]\nnp-plugin = 1\n");
    write_package(root, "serde", "");

    let manager = PluginManager::new(catalog(), config(root));
    let mut builder = builder();
    let loaded = manager.load_plugins(&mut builder).await.unwrap();

    assert_eq!(loaded.len(), 2);
    let broken = loaded.iter().find(|plugin| plugin.name == "broken").unwrap();
    assert_eq!(broken.to_string(), "broken v0.4.0");
    assert!(!broken.instantiated);
    assert_eq!(broken.source, PluginSource::Package("broken".to_string()));

    let greeter = loaded.iter().find(|plugin| plugin.name == "greeter").unwrap();
    assert_eq!(greeter.version, "1.2.3");
    assert!(greeter.instantiated);
    assert_eq!(builder.plugin_names(), vec!["greeter"]);
}

#[tokio::test]
async fn test_failed_package_registration_is_rolled_back() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(
        root.join("Cargo.toml"),
        "[package]\nname = \"host\"\n\n[dependencies]\nhalf = \"0.4\"\n",
    )
    .unwrap();
    write_package(root, "half", "\n[package.metadata]\nnp-plugin = true\n");

    let manager = PluginManager::new(catalog(), config(root));
    let mut builder = builder();
    let loaded = manager.load_plugins(&mut builder).await.unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].to_string(), "half v0.4.0");
    assert!(!loaded[0].instantiated);
    assert!(builder.plugin_names().is_empty());
    assert_eq!(builder.packets().total_registered(), 0);
    assert!(!builder.has_inbound_transformer());
    assert_eq!(builder.events().handler_count("core:plugin_loaded"), 0);

    let server = builder.build();
    assert_eq!(server.registries().total_registered(), 0);
}

#[tokio::test]
async fn test_plugin_loaded_events() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_folder_plugin(root, "greeter.npplugin", "greeter");

    let mut builder = builder();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = seen.clone();
    builder
        .events()
        .on_core("plugin_loaded", move |event: PluginLoadedEvent| {
            captured.lock().unwrap().push((event.name, event.version));
            Ok(())
        })
        .await
        .expect("subscribe");

    PluginManager::new(catalog(), config(root))
        .load_plugins(&mut builder)
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("greeter".to_string(), "1.2.3".to_string())]
    );
}

#[test]
fn test_catalog() {
    let catalog = catalog();
    assert_eq!(catalog.len(), 3);
    assert!(catalog.contains("greeter"));
    assert!(catalog.get("nobody").is_none());
    assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["broken", "greeter", "unconstructible"]);
}
