// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module identities and load contexts

use crate::config::Mode;
use std::fmt;
use std::path::{Path, PathBuf};

/// Module kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// CommonJS module (require/module.exports)
    CommonJs,
    /// ECMAScript module (import/export)
    Esm,
    /// JSON file
    Json,
    /// Extensionless or unknown extension; loads as CommonJS when allowed
    Unknown,
}

impl ModuleKind {
    /// Kind implied by an explicit marker extension
    ///
    /// Returns `None` for `.js`, whose kind depends on the package, and
    /// `Some(Unknown)` for anything unrecognized.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mjs") => Some(ModuleKind::Esm),
            Some("cjs") => Some(ModuleKind::CommonJs),
            Some("json") => Some(ModuleKind::Json),
            Some("js") => None,
            _ => Some(ModuleKind::Unknown),
        }
    }

    /// Kind declared by a package.json "type" field
    pub fn from_package_type(type_field: Option<&str>) -> Self {
        match type_field {
            Some("module") => ModuleKind::Esm,
            _ => ModuleKind::CommonJs,
        }
    }

    /// Whether modules of this kind execute with CommonJS semantics
    pub fn is_commonjs_like(&self) -> bool {
        matches!(self, ModuleKind::CommonJs | ModuleKind::Unknown)
    }

    /// Short label used in logs and CLI output
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::CommonJs => "cjs",
            ModuleKind::Esm => "esm",
            ModuleKind::Json => "json",
            ModuleKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved identity of a module; the cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleIdentity {
    path: PathBuf,
    query: Option<String>,
    fragment: Option<String>,
    kind: ModuleKind,
}

impl ModuleIdentity {
    /// Create an identity for a normalized absolute path
    pub fn new(path: impl Into<PathBuf>, kind: ModuleKind) -> Self {
        Self {
            path: path.into(),
            query: None,
            fragment: None,
            kind,
        }
    }

    /// Attach query and fragment parts
    pub fn with_suffix(mut self, query: Option<String>, fragment: Option<String>) -> Self {
        self.query = query;
        self.fragment = fragment;
        self
    }

    /// The resolved file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The query part, without `?`
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The fragment part, without `#`
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// The module kind
    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// The directory containing the module
    pub fn dirname(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }

    /// Whether the file carries the strict ESM `.mjs` marker
    pub fn is_mjs(&self) -> bool {
        self.path.extension().and_then(|e| e.to_str()) == Some("mjs")
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

/// How a load request was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOrigin {
    /// Synchronous `require()`
    Require,
    /// Static `import` declaration, linked before evaluation
    StaticImport,
    /// Dynamic `import()` expression
    DynamicImport,
}

impl LoadOrigin {
    /// Whether the request uses import semantics
    pub fn is_import(&self) -> bool {
        !matches!(self, LoadOrigin::Require)
    }
}

/// Transient context of one resolution request
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// The importing module; `None` for entry points
    pub importer: Option<ModuleIdentity>,
    /// Mode override; `None` defers to package and loader options
    pub mode: Option<Mode>,
    /// How the request was issued
    pub origin: LoadOrigin,
}

impl LoadContext {
    /// Context for a `require()` call
    pub fn require(importer: Option<ModuleIdentity>) -> Self {
        Self {
            importer,
            mode: None,
            origin: LoadOrigin::Require,
        }
    }

    /// Context for a static `import` declaration
    pub fn static_import(importer: Option<ModuleIdentity>) -> Self {
        Self {
            importer,
            mode: None,
            origin: LoadOrigin::StaticImport,
        }
    }

    /// Context for a dynamic `import()` expression
    pub fn dynamic_import(importer: Option<ModuleIdentity>) -> Self {
        Self {
            importer,
            mode: None,
            origin: LoadOrigin::DynamicImport,
        }
    }

    /// Force a resolution mode for this request
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Kind of the importing module, if any
    pub fn importer_kind(&self) -> Option<ModuleKind> {
        self.importer.as_ref().map(|i| i.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(ModuleKind::from_path(Path::new("foo.mjs")), Some(ModuleKind::Esm));
        assert_eq!(ModuleKind::from_path(Path::new("foo.cjs")), Some(ModuleKind::CommonJs));
        assert_eq!(ModuleKind::from_path(Path::new("foo.json")), Some(ModuleKind::Json));
        assert_eq!(ModuleKind::from_path(Path::new("foo.js")), None);
        assert_eq!(ModuleKind::from_path(Path::new("no-ext")), Some(ModuleKind::Unknown));
        assert_eq!(
            ModuleKind::from_path(Path::new("a.js.unknown")),
            Some(ModuleKind::Unknown)
        );
    }

    #[test]
    fn test_kind_from_package() {
        assert_eq!(ModuleKind::from_package_type(Some("module")), ModuleKind::Esm);
        assert_eq!(ModuleKind::from_package_type(Some("commonjs")), ModuleKind::CommonJs);
        assert_eq!(ModuleKind::from_package_type(None), ModuleKind::CommonJs);
    }

    #[test]
    fn test_identity_display_and_eq() {
        let a = ModuleIdentity::new("/app/a.mjs", ModuleKind::Esm)
            .with_suffix(Some("v=1".into()), Some("top".into()));
        assert_eq!(a.to_string(), "/app/a.mjs?v=1#top");
        assert!(a.is_mjs());
        let b = ModuleIdentity::new("/app/a.mjs", ModuleKind::Esm);
        assert_ne!(a, b);
        assert_eq!(b.dirname(), Path::new("/app"));
    }
}
