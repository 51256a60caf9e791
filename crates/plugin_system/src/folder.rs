//! Plugin folder discovery.
//!
//! An entry of the plugins folder is a plugin when
//!
//! * it is a folder whose name ends with the suffix and that holds an
//!   `index.toml` or `index.json` manifest, or
//! * it is a `.toml` / `.json` file whose name, extension stripped, ends
//!   with the suffix.
//!
//! Suffix and extension checks ignore case. Everything else is skipped with
//! a diagnostic.

use crate::error::PluginSystemError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const MANIFEST_EXTENSIONS: [&str; 2] = ["toml", "json"];
const INDEX_FILES: [&str; 2] = ["index.toml", "index.json"];

/// An eligible entry of the plugins folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPlugin {
    /// The folder or file found in the plugins folder
    pub path: PathBuf,
    /// The manifest to read: the index file of a folder, or the file itself
    pub manifest: PathBuf,
}

impl FolderPlugin {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Contents of a plugin manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PluginManifest {
    /// Catalog key of the plugin this manifest exports
    pub entry: Option<String>,
}

/// Lists the eligible entries of `directory` in file-name order.
///
/// A missing plugins folder, or a file in its place, yields no plugins.
pub fn discover_folder_plugins(directory: &Path, suffix: &str) -> Result<Vec<FolderPlugin>, PluginSystemError> {
    if !directory.exists() {
        debug!("Skipping non-existent plugin folder {}", directory.display());
        return Ok(Vec::new());
    }

    if !directory.is_dir() {
        debug!("Skipping {} as it should be a folder instead of a file", directory.display());
        return Ok(Vec::new());
    }

    let mut paths = std::fs::read_dir(directory)
        .map_err(|e| PluginSystemError::io(directory, e))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PluginSystemError::io(directory, e))?;
    paths.sort();

    let suffix = suffix.to_lowercase();
    let mut plugins = Vec::new();

    for path in paths {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if path.is_dir() {
            if !name.ends_with(&suffix) {
                debug!("Skipping folder {} as it does not end with {}", path.display(), suffix);
                continue;
            }

            match INDEX_FILES.iter().map(|index| path.join(index)).find(|index| index.is_file()) {
                Some(manifest) => plugins.push(FolderPlugin { path, manifest }),
                None => debug!(
                    "Skipping folder {} as it has no {} or {}",
                    path.display(),
                    INDEX_FILES[0],
                    INDEX_FILES[1]
                ),
            }
            continue;
        }

        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if !MANIFEST_EXTENSIONS.contains(&extension.as_str()) || !stem.ends_with(&suffix) {
            debug!(
                "Skipping file {} as it does not end with {}.toml or {}.json",
                path.display(),
                suffix,
                suffix
            );
            continue;
        }

        plugins.push(FolderPlugin {
            manifest: path.clone(),
            path,
        });
    }

    Ok(plugins)
}

/// Reads a TOML or JSON manifest, chosen by the file extension.
pub fn read_manifest(path: &Path) -> Result<PluginManifest, PluginSystemError> {
    let contents = std::fs::read_to_string(path).map_err(|e| PluginSystemError::io(path, e))?;
    let is_json = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&contents).map_err(|e| PluginSystemError::manifest(path, e))
    } else {
        toml::from_str(&contents).map_err(|e| PluginSystemError::manifest(path, e))
    }
}
