// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! package.json manifests and package scopes

use crate::config::LoaderOptions;
use crate::error::{LoaderError, Result};
use crate::host::{normalize_path, SourceProvider};
use crate::module_system::ModuleKind;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value as Json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Manifest file name
pub const MANIFEST: &str = "package.json";

/// The package.json fields the loader reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    /// Package name
    pub name: Option<String>,
    /// Legacy entry point
    pub main: Option<String>,
    /// `"module"` or `"commonjs"`
    #[serde(rename = "type")]
    pub type_field: Option<String>,
    /// Conditional exports map
    #[serde(default)]
    pub exports: Option<Json>,
    /// Loader options for modules inside this package
    #[serde(default)]
    pub esm: Option<Json>,
}

/// A directory holding a package.json
#[derive(Debug, Clone)]
pub struct PackageScope {
    /// Directory containing the manifest
    pub root: PathBuf,
    /// Path of the manifest itself
    pub manifest: PathBuf,
    /// Parsed manifest
    pub package: PackageJson,
    /// Parsed `esm` field
    pub options: Option<LoaderOptions>,
}

impl PackageScope {
    /// Kind declared for `.js` files in this package
    pub fn declared_kind(&self) -> ModuleKind {
        ModuleKind::from_package_type(self.package.type_field.as_deref())
    }

    /// Resolve a subpath (`.` or `./x`) through the `exports` field
    ///
    /// Returns `Ok(None)` when the package has no `exports` field.
    pub fn resolve_export(&self, subpath: &str, conditions: &[&str]) -> Result<Option<PathBuf>> {
        let Some(exports) = &self.package.exports else {
            return Ok(None);
        };
        let Some(target) = resolve_exports_target(exports, subpath, conditions) else {
            return Err(LoaderError::PackagePathNotExported {
                subpath: subpath.to_string(),
                manifest: self.manifest.clone(),
            });
        };

        let path = normalize_path(&self.root.join(&target));
        if !target.starts_with("./") || !path.starts_with(&self.root) {
            return Err(LoaderError::InvalidPackageConfig {
                manifest: self.manifest.clone(),
                reason: format!("invalid \"exports\" target \"{}\" for {}", target, subpath),
            });
        }
        Ok(Some(path))
    }
}

/// Cached manifest lookups keyed by directory
pub struct PackageCache {
    source: Arc<dyn SourceProvider>,
    scopes: DashMap<PathBuf, Option<Arc<PackageScope>>>,
}

impl PackageCache {
    /// Create an empty cache reading through `source`
    pub fn new(source: Arc<dyn SourceProvider>) -> Self {
        Self {
            source,
            scopes: DashMap::new(),
        }
    }

    /// The package whose manifest sits directly in `dir`
    pub fn read(&self, dir: &Path) -> Result<Option<Arc<PackageScope>>> {
        if let Some(cached) = self.scopes.get(dir) {
            return Ok(cached.value().clone());
        }

        let manifest = dir.join(MANIFEST);
        let scope = if self.source.is_file(&manifest) {
            Some(Arc::new(self.parse(dir, manifest)?))
        } else {
            None
        };

        self.scopes.insert(dir.to_path_buf(), scope.clone());
        Ok(scope)
    }

    /// The nearest package enclosing `path`
    pub fn nearest(&self, path: &Path) -> Result<Option<Arc<PackageScope>>> {
        let mut current = path.parent();
        while let Some(dir) = current {
            // Packages installed under node_modules never see outer manifests
            if let Some(scope) = self.read(dir)? {
                return Ok(Some(scope));
            }
            if dir.file_name().and_then(|n| n.to_str()) == Some("node_modules") {
                return Ok(None);
            }
            current = dir.parent();
        }
        Ok(None)
    }

    fn parse(&self, dir: &Path, manifest: PathBuf) -> Result<PackageScope> {
        let content = self
            .source
            .read_source(&manifest)
            .map_err(|e| LoaderError::io(&manifest, e))?;
        let invalid = |reason: String| LoaderError::InvalidPackageConfig {
            manifest: manifest.clone(),
            reason,
        };

        let package: PackageJson =
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        let options = package
            .esm
            .as_ref()
            .map(LoaderOptions::from_manifest_field)
            .transpose()
            .map_err(|e| invalid(format!("\"esm\": {}", e)))?;

        tracing::trace!(manifest = %manifest.display(), "read package manifest");
        Ok(PackageScope {
            root: dir.to_path_buf(),
            manifest,
            package,
            options,
        })
    }
}

/// Walk an `exports` value for `subpath` under the given conditions
fn resolve_exports_target(exports: &Json, subpath: &str, conditions: &[&str]) -> Option<String> {
    let is_subpath_map = exports
        .as_object()
        .map(|map| map.keys().any(|k| k.starts_with('.')))
        .unwrap_or(false);

    if !is_subpath_map {
        // Sugar: the whole value is the "." entry
        return if subpath == "." {
            resolve_target(exports, conditions, None)
        } else {
            None
        };
    }

    let map = exports.as_object()?;
    if let Some(target) = map.get(subpath) {
        return resolve_target(target, conditions, None);
    }

    // Single-wildcard subpath patterns; the longest prefix wins
    let mut best: Option<(&str, &Json, String)> = None;
    for (key, target) in map {
        let Some((prefix, suffix)) = key.split_once('*') else {
            continue;
        };
        if subpath.len() >= prefix.len() + suffix.len()
            && subpath.starts_with(prefix)
            && subpath.ends_with(suffix)
        {
            let matched = &subpath[prefix.len()..subpath.len() - suffix.len()];
            if best.as_ref().map_or(true, |(p, _, _)| prefix.len() > p.len()) {
                best = Some((prefix, target, matched.to_string()));
            }
        }
    }
    let (_, target, matched) = best?;
    resolve_target(target, conditions, Some(&matched))
}

fn resolve_target(target: &Json, conditions: &[&str], pattern: Option<&str>) -> Option<String> {
    match target {
        Json::String(s) => {
            Some(match pattern {
                Some(p) => s.replace('*', p),
                None => s.clone(),
            })
        }
        Json::Array(items) => items
            .iter()
            .find_map(|item| resolve_target(item, conditions, pattern)),
        Json::Object(map) => map.iter().find_map(|(condition, value)| {
            if condition == "default" || conditions.contains(&condition.as_str()) {
                resolve_target(value, conditions, pattern)
            } else {
                None
            }
        }),
        _ => None,
    }
}
