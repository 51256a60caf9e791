//! Plugin package discovery.
//!
//! The host manifest's `[dependencies]` are the candidate packages. A
//! package is a plugin when its own `Cargo.toml` carries a truthy
//! `package.metadata.np-plugin`; `package.metadata.entry` names its catalog
//! key and defaults to the package name.

use crate::error::PluginSystemError;
use std::path::Path;
use toml::{Table, Value};

/// A dependency flagged as a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCandidate {
    pub name: String,
    pub version: String,
    pub entry: String,
}

fn read_table(path: &Path) -> Result<Table, PluginSystemError> {
    let contents = std::fs::read_to_string(path).map_err(|e| PluginSystemError::io(path, e))?;
    contents
        .parse::<Table>()
        .map_err(|e| PluginSystemError::manifest(path, e))
}

/// Names of the dependencies declared by the host manifest.
pub fn dependency_names(manifest: &Path) -> Result<Vec<String>, PluginSystemError> {
    let table = read_table(manifest)?;
    Ok(table
        .get("dependencies")
        .and_then(Value::as_table)
        .map(|dependencies| dependencies.keys().cloned().collect())
        .unwrap_or_default())
}

/// Reads the metadata of dependency `name`.
///
/// Returns `Ok(None)` for packages that are not plugins.
pub fn probe_package(package_directory: &Path, name: &str) -> Result<Option<PackageCandidate>, PluginSystemError> {
    let manifest = package_directory.join(name).join("Cargo.toml");
    if !manifest.is_file() {
        return Err(PluginSystemError::PackageNotFound(name.to_string()));
    }

    let table = read_table(&manifest)?;
    let package = table.get("package").and_then(Value::as_table);
    let metadata = package
        .and_then(|package| package.get("metadata"))
        .and_then(Value::as_table);

    if !metadata
        .and_then(|metadata| metadata.get("np-plugin"))
        .is_some_and(is_truthy)
    {
        return Ok(None);
    }

    let version = package
        .and_then(|package| package.get("version"))
        .and_then(Value::as_str)
        .unwrap_or("0.0.0");
    let entry = metadata
        .and_then(|metadata| metadata.get("entry"))
        .and_then(Value::as_str)
        .unwrap_or(name);

    Ok(Some(PackageCandidate {
        name: name.to_string(),
        version: version.to_string(),
        entry: entry.to_string(),
    }))
}

/// Loose truthiness of a metadata flag.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Boolean(flag) => *flag,
        Value::Integer(number) => *number != 0,
        Value::Float(number) => *number != 0.0 && !number.is_nan(),
        Value::String(text) => !text.is_empty() && text != "false" && text != "0",
        Value::Datetime(_) | Value::Array(_) | Value::Table(_) => true,
    }
}
