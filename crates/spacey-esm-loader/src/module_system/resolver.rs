// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module path resolution and kind determination

use crate::config::{LoaderOptions, Mode, OptionOverrides};
use crate::error::{LoaderError, Result};
use crate::host::{normalize_path, SourceProvider};
use crate::module_system::compiler;
use crate::module_system::package::{PackageCache, PackageScope};
use crate::module_system::{LoadContext, ModuleIdentity, ModuleKind};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Probe order for ES module importers
const ESM_EXTENSIONS: &[&str] = &[".mjs", ".js", ".cjs", ".json"];

/// Probe order for CommonJS importers and entry points
const CJS_EXTENSIONS: &[&str] = &[".js", ".json", ".cjs", ".mjs"];

/// Conditions matched against `exports` for import requests
const IMPORT_CONDITIONS: &[&str] = &["import", "node", "default"];

/// Conditions matched against `exports` for `require` requests
const REQUIRE_CONDITIONS: &[&str] = &["require", "node", "default"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    dir: PathBuf,
    specifier: String,
    import: bool,
    importer_kind: Option<ModuleKind>,
    importer_mjs: bool,
    mode: Option<Mode>,
}

/// Maps `(specifier, context)` to a [`ModuleIdentity`]
pub struct Resolver {
    source: Arc<dyn SourceProvider>,
    packages: Arc<PackageCache>,
    options: LoaderOptions,
    overrides: OptionOverrides,
    base_dir: PathBuf,
    memo: DashMap<MemoKey, ModuleIdentity>,
}

impl Resolver {
    /// Create a resolver; entry points resolve against `base_dir`
    pub fn new(
        source: Arc<dyn SourceProvider>,
        packages: Arc<PackageCache>,
        options: LoaderOptions,
        base_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            source,
            packages,
            options,
            overrides: OptionOverrides::default(),
            base_dir: normalize_path(base_dir.as_ref()),
            memo: DashMap::new(),
        }
    }

    /// Force `overrides` over the loader options and every package's options
    pub fn with_overrides(mut self, overrides: OptionOverrides) -> Self {
        overrides.apply(&mut self.options);
        self.overrides = overrides;
        self
    }

    /// Directory entry points resolve against
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a module specifier
    pub fn resolve(&self, specifier: &str, ctx: &LoadContext) -> Result<ModuleIdentity> {
        let (request, query, fragment) = if ctx.origin.is_import() {
            split_suffix(specifier)
        } else {
            (specifier, None, None)
        };

        let key = MemoKey {
            dir: self.importer_dir(ctx).to_path_buf(),
            specifier: specifier.to_string(),
            import: ctx.origin.is_import(),
            importer_kind: ctx.importer_kind(),
            importer_mjs: ctx.importer.as_ref().is_some_and(|i| i.is_mjs()),
            mode: ctx.mode,
        };
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit.value().clone());
        }

        let path = self.locate(request, specifier, ctx)?;
        let kind = self.determine_kind(&path, ctx)?;
        let identity = ModuleIdentity::new(path, kind).with_suffix(query, fragment);

        tracing::debug!(
            specifier = %specifier,
            resolved = %identity,
            kind = %kind,
            "resolved module"
        );
        self.memo.insert(key, identity.clone());
        Ok(identity)
    }

    /// Number of memoized resolutions
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    fn importer_dir<'a>(&'a self, ctx: &'a LoadContext) -> &'a Path {
        ctx.importer
            .as_ref()
            .map(|i| i.dirname())
            .unwrap_or(self.base_dir.as_path())
    }

    fn extensions(&self, ctx: &LoadContext) -> Vec<String> {
        if let Some(extensions) = &self.options.extensions {
            return extensions.clone();
        }
        let defaults = match ctx.importer_kind() {
            Some(ModuleKind::Esm) => ESM_EXTENSIONS,
            _ => CJS_EXTENSIONS,
        };
        defaults.iter().map(|e| e.to_string()).collect()
    }

    fn not_found(&self, specifier: &str, ctx: &LoadContext) -> LoaderError {
        LoaderError::module_not_found(
            specifier,
            ctx.importer.as_ref().map(|i| i.path().to_path_buf()),
        )
    }

    /// Find the file a request points at
    fn locate(&self, request: &str, specifier: &str, ctx: &LoadContext) -> Result<PathBuf> {
        let extensions = self.extensions(ctx);

        let found = if is_path_specifier(request) {
            let target = normalize_path(&self.importer_dir(ctx).join(request));
            self.resolve_file(&target, &extensions)?
        } else {
            self.resolve_node_modules(request, ctx, &extensions)?
        };

        found
            .map(|path| self.source.canonicalize(&path))
            .ok_or_else(|| self.not_found(specifier, ctx))
    }

    /// Probe a file path, then `path + ext`, then a directory
    fn resolve_file(&self, path: &Path, extensions: &[String]) -> Result<Option<PathBuf>> {
        if self.source.is_file(path) {
            return Ok(Some(path.to_path_buf()));
        }

        if let Some(name) = path.file_name() {
            for ext in extensions {
                let mut filename = name.to_os_string();
                filename.push(ext);
                let candidate = path.with_file_name(filename);
                if self.source.is_file(&candidate) {
                    return Ok(Some(candidate));
                }
            }
        }

        if self.source.is_dir(path) {
            return self.resolve_directory(path, extensions);
        }

        Ok(None)
    }

    /// Resolve a directory through its manifest `main`, then `index`
    fn resolve_directory(&self, dir: &Path, extensions: &[String]) -> Result<Option<PathBuf>> {
        if let Some(scope) = self.packages.read(dir)? {
            if let Some(main) = &scope.package.main {
                let main_path = normalize_path(&dir.join(main));
                if main_path != dir {
                    if let Some(found) = self.resolve_file(&main_path, extensions)? {
                        return Ok(Some(found));
                    }
                }
            }
        }

        for ext in extensions {
            let index = dir.join(format!("index{}", ext));
            if self.source.is_file(&index) {
                return Ok(Some(index));
            }
        }

        Ok(None)
    }

    /// Resolve a bare specifier from the nearest `node_modules`
    fn resolve_node_modules(
        &self,
        specifier: &str,
        ctx: &LoadContext,
        extensions: &[String],
    ) -> Result<Option<PathBuf>> {
        let (package_name, subpath) = parse_package_specifier(specifier);

        let mut current = Some(self.importer_dir(ctx));
        while let Some(dir) = current {
            current = dir.parent();
            if dir.file_name().and_then(|n| n.to_str()) == Some("node_modules") {
                continue;
            }

            let package_dir = dir.join("node_modules").join(package_name);
            if !self.source.is_dir(&package_dir) {
                continue;
            }

            tracing::trace!(package = %package_dir.display(), "found package");
            if let Some(scope) = self.packages.read(&package_dir)? {
                if scope.package.exports.is_some() {
                    return self.resolve_package_exports(&scope, subpath, ctx);
                }
            }

            return match subpath {
                Some(sub) => self.resolve_file(&package_dir.join(sub), extensions),
                None => self.resolve_directory(&package_dir, extensions),
            };
        }

        Ok(None)
    }

    fn resolve_package_exports(
        &self,
        scope: &PackageScope,
        subpath: Option<&str>,
        ctx: &LoadContext,
    ) -> Result<Option<PathBuf>> {
        let subpath = match subpath {
            Some(sub) => format!("./{}", sub),
            None => ".".to_string(),
        };
        let conditions = if ctx.origin.is_import() {
            IMPORT_CONDITIONS
        } else {
            REQUIRE_CONDITIONS
        };

        let target = scope.resolve_export(&subpath, conditions)?;
        Ok(target
            .map(|path| normalize_path(&path))
            .filter(|path| self.source.is_file(path)))
    }

    /// Decide the module kind of a located file
    fn determine_kind(&self, path: &Path, ctx: &LoadContext) -> Result<ModuleKind> {
        match ModuleKind::from_path(path) {
            Some(ModuleKind::Unknown) => self.check_unknown(path, ctx),
            Some(kind) => Ok(kind),
            None => self.js_kind(path, ctx),
        }
    }

    /// Unknown extensions are CommonJS for `require`, and for imports only
    /// from CommonJS modules whose options enable `cjs.paths`
    fn check_unknown(&self, path: &Path, ctx: &LoadContext) -> Result<ModuleKind> {
        if !ctx.origin.is_import() {
            return Ok(ModuleKind::Unknown);
        }

        let allowed = match &ctx.importer {
            Some(importer) if importer.kind().is_commonjs_like() => {
                self.options_for(importer.path())?.cjs.paths
            }
            Some(_) => false,
            None => self.options.cjs.paths,
        };
        if allowed {
            return Ok(ModuleKind::Unknown);
        }

        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Err(LoaderError::UnknownFileExtension {
            extension,
            path: path.to_path_buf(),
        })
    }

    /// `.js` files follow the nearest manifest, possibly corrected by a
    /// content sniff in auto mode
    fn js_kind(&self, path: &Path, ctx: &LoadContext) -> Result<ModuleKind> {
        let scope = self.packages.nearest(path)?;
        let declared = scope
            .as_ref()
            .map(|s| s.declared_kind())
            .unwrap_or(ModuleKind::CommonJs);

        let mode = ctx.mode.or(self.overrides.mode).unwrap_or_else(|| {
            scope
                .as_ref()
                .and_then(|s| s.options.as_ref())
                .unwrap_or(&self.options)
                .mode
        });
        if mode == Mode::Strict {
            return Ok(declared);
        }

        let source = self
            .source
            .read_source(path)
            .map_err(|e| LoaderError::io(path, e))?;
        let sniff = compiler::sniff(&source);

        match declared {
            ModuleKind::CommonJs if sniff.module_syntax => {
                if ctx.importer.as_ref().is_some_and(|i| i.is_mjs()) {
                    return Err(LoaderError::InvalidEsmFileExtension {
                        path: path.to_path_buf(),
                    });
                }
                tracing::debug!(path = %path.display(), "module syntax found, loading as esm");
                Ok(ModuleKind::Esm)
            }
            ModuleKind::Esm if sniff.commonjs_markers && !sniff.module_syntax => {
                tracing::debug!(path = %path.display(), "commonjs markers found, loading as cjs");
                Ok(ModuleKind::CommonJs)
            }
            kind => Ok(kind),
        }
    }

    /// Options governing modules at `path`
    pub fn options_for(&self, path: &Path) -> Result<LoaderOptions> {
        let mut options = self
            .packages
            .nearest(path)?
            .and_then(|scope| scope.options.clone())
            .unwrap_or_else(|| self.options.clone());
        self.overrides.apply(&mut options);
        Ok(options)
    }
}

/// Relative or absolute path specifiers
fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier == "."
        || specifier == ".."
        || (cfg!(windows) && specifier.chars().nth(1) == Some(':'))
}

/// Split `path?query#fragment`
fn split_suffix(specifier: &str) -> (&str, Option<String>, Option<String>) {
    let (rest, fragment) = match specifier.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment.to_string())),
        None => (specifier, None),
    };
    match rest.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string()), fragment),
        None => (rest, None, fragment),
    }
}

/// Parse a package specifier into name and optional subpath
fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    if specifier.starts_with('@') {
        // Scoped package: @scope/name or @scope/name/subpath
        if let Some(slash_pos) = specifier[1..].find('/') {
            let after_scope = &specifier[slash_pos + 2..];
            if let Some(subpath_pos) = after_scope.find('/') {
                let name_end = slash_pos + 2 + subpath_pos;
                return (&specifier[..name_end], Some(&specifier[name_end + 1..]));
            }
        }
        (specifier, None)
    } else if let Some(slash_pos) = specifier.find('/') {
        (&specifier[..slash_pos], Some(&specifier[slash_pos + 1..]))
    } else {
        (specifier, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryFs;
    use crate::ErrorCode;

    fn resolver(files: &[(&str, &str)], options: LoaderOptions) -> Resolver {
        let fs: Arc<dyn SourceProvider> = Arc::new(MemoryFs::with_files(files.iter().copied()));
        let packages = Arc::new(PackageCache::new(Arc::clone(&fs)));
        Resolver::new(fs, packages, options, "/app")
    }

    fn esm_importer(path: &str) -> Option<ModuleIdentity> {
        Some(ModuleIdentity::new(path, ModuleKind::Esm))
    }

    fn cjs_importer(path: &str) -> Option<ModuleIdentity> {
        Some(ModuleIdentity::new(path, ModuleKind::CommonJs))
    }

    #[test]
    fn test_parse_package_specifier() {
        assert_eq!(parse_package_specifier("lodash"), ("lodash", None));
        assert_eq!(parse_package_specifier("lodash/get"), ("lodash", Some("get")));
        assert_eq!(parse_package_specifier("@types/node"), ("@types/node", None));
        assert_eq!(
            parse_package_specifier("@babel/core/lib/index"),
            ("@babel/core", Some("lib/index"))
        );
    }

    #[test]
    fn test_split_suffix() {
        assert_eq!(split_suffix("./a.mjs"), ("./a.mjs", None, None));
        assert_eq!(
            split_suffix("./a.mjs?v=1#frag"),
            ("./a.mjs", Some("v=1".to_string()), Some("frag".to_string()))
        );
    }

    #[test]
    fn test_extension_precedence_follows_importer() {
        let r = resolver(
            &[("/app/a.mjs", ""), ("/app/a.js", ""), ("/app/main.js", "")],
            LoaderOptions::default(),
        );
        let esm = r
            .resolve("./a", &LoadContext::static_import(esm_importer("/app/main.mjs")))
            .unwrap();
        assert_eq!(esm.path(), Path::new("/app/a.mjs"));
        let cjs = r
            .resolve("./a", &LoadContext::require(cjs_importer("/app/main.js")))
            .unwrap();
        assert_eq!(cjs.path(), Path::new("/app/a.js"));
        assert_eq!(cjs.kind(), ModuleKind::CommonJs);
    }

    #[test]
    fn test_configured_extensions() {
        let options = LoaderOptions {
            extensions: Some(vec![".cjs".to_string()]),
            ..LoaderOptions::default()
        };
        let r = resolver(&[("/app/a.js", ""), ("/app/a.cjs", "")], options);
        let id = r.resolve("./a", &LoadContext::require(None)).unwrap();
        assert_eq!(id.path(), Path::new("/app/a.cjs"));
    }

    #[test]
    fn test_directory_main_and_index() {
        let r = resolver(
            &[
                ("/app/lib/package.json", r#"{"main": "./entry"}"#),
                ("/app/lib/entry.js", ""),
                ("/app/util/index.js", ""),
            ],
            LoaderOptions::default(),
        );
        let ctx = LoadContext::require(None);
        assert_eq!(
            r.resolve("./lib", &ctx).unwrap().path(),
            Path::new("/app/lib/entry.js")
        );
        assert_eq!(
            r.resolve("./util", &ctx).unwrap().path(),
            Path::new("/app/util/index.js")
        );
    }

    #[test]
    fn test_bare_specifier_with_exports() {
        let r = resolver(
            &[
                (
                    "/app/node_modules/pkg/package.json",
                    r#"{"exports": {".": {"import": "./index.mjs", "require": "./index.cjs"}}}"#,
                ),
                ("/app/node_modules/pkg/index.mjs", ""),
                ("/app/node_modules/pkg/index.cjs", ""),
                ("/app/node_modules/pkg/internal.js", ""),
            ],
            LoaderOptions::default(),
        );

        let imported = r
            .resolve("pkg", &LoadContext::static_import(esm_importer("/app/src/a.mjs")))
            .unwrap();
        assert_eq!(imported.path(), Path::new("/app/node_modules/pkg/index.mjs"));
        assert_eq!(imported.kind(), ModuleKind::Esm);

        let required = r
            .resolve("pkg", &LoadContext::require(cjs_importer("/app/src/a.js")))
            .unwrap();
        assert_eq!(required.path(), Path::new("/app/node_modules/pkg/index.cjs"));

        let err = r
            .resolve("pkg/internal.js", &LoadContext::require(cjs_importer("/app/a.js")))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::PackagePathNotExported));
    }

    #[test]
    fn test_bare_specifier_with_main() {
        let r = resolver(
            &[
                ("/app/node_modules/@scope/lib/package.json", r#"{"main": "main.js"}"#),
                ("/app/node_modules/@scope/lib/main.js", ""),
                ("/app/node_modules/@scope/lib/sub/thing.js", ""),
            ],
            LoaderOptions::default(),
        );
        let ctx = LoadContext::require(cjs_importer("/app/deep/dir/a.js"));
        assert_eq!(
            r.resolve("@scope/lib", &ctx).unwrap().path(),
            Path::new("/app/node_modules/@scope/lib/main.js")
        );
        assert_eq!(
            r.resolve("@scope/lib/sub/thing", &ctx).unwrap().path(),
            Path::new("/app/node_modules/@scope/lib/sub/thing.js")
        );
    }

    #[test]
    fn test_not_found() {
        let r = resolver(&[], LoaderOptions::default());
        let err = r
            .resolve("./missing", &LoadContext::require(cjs_importer("/app/a.js")))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ModuleNotFound));
        assert_eq!(
            err.to_string(),
            "Cannot find module './missing' imported from /app/a.js"
        );
    }

    #[test]
    fn test_kind_from_manifest_type() {
        let r = resolver(
            &[
                ("/app/package.json", r#"{"type": "module"}"#),
                ("/app/a.js", ""),
                ("/app/b.cjs", ""),
            ],
            LoaderOptions::default(),
        );
        let ctx = LoadContext::static_import(None);
        assert_eq!(r.resolve("./a.js", &ctx).unwrap().kind(), ModuleKind::Esm);
        assert_eq!(r.resolve("./b.cjs", &ctx).unwrap().kind(), ModuleKind::CommonJs);
    }

    #[test]
    fn test_unknown_extension_rules() {
        let r = resolver(
            &[
                ("/app/plain", "module.exports = 1"),
                ("/app/cjs/package.json", r#"{"esm": {"cjs": {"paths": true}}}"#),
                ("/app/cjs/main.js", ""),
                ("/app/cjs/plain", "module.exports = 1"),
            ],
            LoaderOptions::default(),
        );

        let required = r.resolve("./plain", &LoadContext::require(None)).unwrap();
        assert_eq!(required.kind(), ModuleKind::Unknown);

        let err = r
            .resolve("./plain", &LoadContext::dynamic_import(cjs_importer("/app/main.js")))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnknownFileExtension));

        let allowed = r
            .resolve(
                "./plain",
                &LoadContext::dynamic_import(cjs_importer("/app/cjs/main.js")),
            )
            .unwrap();
        assert_eq!(allowed.kind(), ModuleKind::Unknown);

        let err = r
            .resolve(
                "./plain",
                &LoadContext::dynamic_import(esm_importer("/app/cjs/main.mjs")),
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnknownFileExtension));
    }

    #[test]
    fn test_auto_mode_sniffing() {
        let r = resolver(
            &[
                ("/app/esm.js", "export default 1"),
                ("/app/mod/package.json", r#"{"type": "module"}"#),
                ("/app/mod/legacy.js", "module.exports = 1"),
            ],
            LoaderOptions::with_mode(Mode::Auto),
        );
        let ctx = LoadContext::static_import(None);
        assert_eq!(r.resolve("./esm.js", &ctx).unwrap().kind(), ModuleKind::Esm);
        assert_eq!(
            r.resolve("./mod/legacy.js", &ctx).unwrap().kind(),
            ModuleKind::CommonJs
        );

        let err = r
            .resolve(
                "./esm.js",
                &LoadContext::dynamic_import(esm_importer("/app/main.mjs")),
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidEsmFileExtension));
        assert!(err.to_string().starts_with("Cannot load module"));
    }

    #[test]
    fn test_overrides_beat_package_options() {
        let files = [
            ("/app/package.json", r#"{"esm": {"mode": "auto"}}"#),
            ("/app/lib.js", "export const x = 1"),
        ];
        let ctx = LoadContext::static_import(None);

        let r = resolver(&files, LoaderOptions::default());
        assert_eq!(r.resolve("./lib.js", &ctx).unwrap().kind(), ModuleKind::Esm);

        let overrides = OptionOverrides {
            mode: Some(Mode::Strict),
            cjs_paths: Some(true),
            ..OptionOverrides::default()
        };
        let r = resolver(&files, LoaderOptions::default()).with_overrides(overrides);
        assert_eq!(r.resolve("./lib.js", &ctx).unwrap().kind(), ModuleKind::CommonJs);
        let options = r.options_for(Path::new("/app/lib.js")).unwrap();
        assert_eq!(options.mode, Mode::Strict);
        assert!(options.cjs.paths);
    }

    #[test]
    fn test_strict_mode_keeps_declared_kind() {
        let r = resolver(&[("/app/esm.js", "export default 1")], LoaderOptions::default());
        let id = r
            .resolve("./esm.js", &LoadContext::static_import(None))
            .unwrap();
        assert_eq!(id.kind(), ModuleKind::CommonJs);
    }

    #[test]
    fn test_memoized() {
        let r = resolver(&[("/app/a.js", "")], LoaderOptions::default());
        let ctx = LoadContext::require(None);
        r.resolve("./a", &ctx).unwrap();
        r.resolve("./a", &ctx).unwrap();
        assert_eq!(r.memoized(), 1);
    }
}
