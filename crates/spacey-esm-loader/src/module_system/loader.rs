// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module loader - links and evaluates the module graph

use crate::config::{LoaderOptions, OptionOverrides};
use crate::error::{LoaderError, Result};
use crate::host::{NativeFs, Realm, ScriptHost, ScriptedHost, SourceProvider};
use crate::module_system::cache::ModuleCache;
use crate::module_system::compiler::{Compiler, ExecutableUnit, ImportName};
use crate::module_system::interop;
use crate::module_system::namespace::{BindingSource, Namespace};
use crate::module_system::package::PackageCache;
use crate::module_system::record::{ModuleRecord, ModuleState};
use crate::module_system::resolver::Resolver;
use crate::module_system::scope::ModuleScope;
use crate::module_system::{LoadContext, ModuleIdentity, ModuleKind};
use crate::value::{Object, Value};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::ReentrantMutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of a dynamic `import()`
pub type DeferredImport = BoxFuture<'static, Result<Namespace>>;

struct LoaderInner {
    options: LoaderOptions,
    source: Arc<dyn SourceProvider>,
    host: Arc<dyn ScriptHost>,
    realm: Realm,
    resolver: Resolver,
    cache: ModuleCache,
    compiler: Compiler,
    /// Serializes link/evaluate work; re-entered by nested `require`
    load_lock: ReentrantMutex<()>,
}

/// Module loader
///
/// A cheap handle; clones share the same cache, realm and host.
#[derive(Clone)]
pub struct ModuleLoader {
    inner: Arc<LoaderInner>,
}

/// Builder for [`ModuleLoader`]
pub struct ModuleLoaderBuilder {
    options: LoaderOptions,
    overrides: OptionOverrides,
    base_dir: Option<PathBuf>,
    source: Option<Arc<dyn SourceProvider>>,
    host: Option<Arc<dyn ScriptHost>>,
    default_global: Option<Object>,
}

impl ModuleLoaderBuilder {
    /// Loader options
    pub fn options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Fields forced over every package's `esm` options
    pub fn overrides(mut self, overrides: OptionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Directory entry points resolve against (defaults to the current
    /// directory)
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Source provider (defaults to [`NativeFs`])
    pub fn source(mut self, source: Arc<dyn SourceProvider>) -> Self {
        self.source = Some(source);
        self
    }

    /// Script host (defaults to an empty [`ScriptedHost`])
    pub fn host(mut self, host: Arc<dyn ScriptHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Global object the loader's realm is prepared from
    pub fn default_global(mut self, global: Object) -> Self {
        self.default_global = Some(global);
        self
    }

    /// Build the loader
    pub fn build(mut self) -> ModuleLoader {
        self.overrides.apply(&mut self.options);
        let source = self.source.unwrap_or_else(|| Arc::new(NativeFs::new()));
        let host = self.host.unwrap_or_else(|| Arc::new(ScriptedHost::new()));
        let base_dir = self
            .base_dir
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));

        let realm = host.create_realm();
        if let Some(global) = &self.default_global {
            realm.prepare(global);
        }

        let packages = Arc::new(PackageCache::new(Arc::clone(&source)));
        let resolver = Resolver::new(
            Arc::clone(&source),
            packages,
            self.options.clone(),
            base_dir,
        )
        .with_overrides(self.overrides);

        tracing::debug!(
            mode = ?self.options.mode,
            base_dir = %resolver.base_dir().display(),
            "module loader created"
        );

        ModuleLoader {
            inner: Arc::new(LoaderInner {
                options: self.options,
                source,
                host,
                realm,
                resolver,
                cache: ModuleCache::new(),
                compiler: Compiler::new(),
                load_lock: ReentrantMutex::new(()),
            }),
        }
    }
}

impl ModuleLoader {
    /// Start building a loader
    pub fn builder() -> ModuleLoaderBuilder {
        ModuleLoaderBuilder {
            options: LoaderOptions::default(),
            overrides: OptionOverrides::default(),
            base_dir: None,
            source: None,
            host: None,
            default_global: None,
        }
    }

    /// Create a loader over the given host capabilities
    pub fn new(
        source: Arc<dyn SourceProvider>,
        host: Arc<dyn ScriptHost>,
        options: LoaderOptions,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::builder()
            .source(source)
            .host(host)
            .options(options)
            .base_dir(base_dir)
            .build()
    }

    /// Loader-level options
    pub fn options(&self) -> &LoaderOptions {
        &self.inner.options
    }

    /// The realm module bodies run against
    pub fn realm(&self) -> &Realm {
        &self.inner.realm
    }

    /// The record cache
    pub fn cache(&self) -> &ModuleCache {
        &self.inner.cache
    }

    /// The cached record for `identity`
    pub fn record(&self, identity: &ModuleIdentity) -> Option<Arc<ModuleRecord>> {
        self.inner.cache.get(identity)
    }

    /// Resolve a specifier without loading it
    pub fn resolve(&self, specifier: &str, ctx: &LoadContext) -> Result<ModuleIdentity> {
        self.inner.resolver.resolve(specifier, ctx)
    }

    /// Options governing the module at `path`
    pub fn options_for(&self, path: &Path) -> Result<LoaderOptions> {
        self.inner.resolver.options_for(path)
    }

    /// `require(specifier)` issued by `importer`
    pub fn require(&self, specifier: &str, importer: Option<&ModuleIdentity>) -> Result<Value> {
        let _guard = self.inner.load_lock.lock();
        let ctx = LoadContext::require(importer.cloned());
        let record = self.load_record(specifier, &ctx)?;
        self.require_record(&record)
    }

    /// A static `import` of `specifier` by `importer`, linked and evaluated
    pub fn import_static(
        &self,
        specifier: &str,
        importer: Option<&ModuleIdentity>,
    ) -> Result<Namespace> {
        let _guard = self.inner.load_lock.lock();
        let ctx = LoadContext::static_import(importer.cloned());
        let record = self.load_record(specifier, &ctx)?;
        self.import_record(&record)
    }

    /// Dynamic `import(specifier)` issued by `importer`
    ///
    /// The returned future yields to the scheduler once before loading, so
    /// the import never completes synchronously.
    pub fn import(&self, specifier: &str, importer: Option<ModuleIdentity>) -> DeferredImport {
        let loader = self.clone();
        let specifier = specifier.to_string();
        async move {
            tokio::task::yield_now().await;
            let _guard = loader.inner.load_lock.lock();
            let ctx = LoadContext::dynamic_import(importer);
            let record = loader.load_record(&specifier, &ctx)?;
            loader.import_record(&record)
        }
        .boxed()
    }

    /// Load a program entry point
    ///
    /// ES modules evaluate to their namespace, everything else to its
    /// `module.exports`.
    pub fn run_main(&self, specifier: &str) -> Result<Value> {
        let _guard = self.inner.load_lock.lock();
        let record = self.load_record(specifier, &LoadContext::require(None))?;
        if record.kind() == ModuleKind::Esm {
            self.import_record(&record).map(Value::Namespace)
        } else {
            self.require_record(&record)
        }
    }

    /// Resolve and link `specifier` without evaluating anything
    pub fn link(&self, specifier: &str, ctx: &LoadContext) -> Result<Arc<ModuleRecord>> {
        let _guard = self.inner.load_lock.lock();
        let record = self.load_record(specifier, ctx)?;
        self.link_graph(&record)?;
        Ok(record)
    }

    fn load_record(&self, specifier: &str, ctx: &LoadContext) -> Result<Arc<ModuleRecord>> {
        let identity = self.inner.resolver.resolve(specifier, ctx)?;
        let (record, created) = self.inner.cache.get_or_create(&identity);
        if created {
            tracing::trace!(module = %identity, "created module record");
        }
        Ok(record)
    }

    fn require_record(&self, record: &Arc<ModuleRecord>) -> Result<Value> {
        if let Some(err) = record.failure() {
            return Err(err);
        }

        match record.state() {
            ModuleState::Evaluating if !is_esm(record) => {
                // Circular require: hand out what is exported so far
                tracing::debug!(module = %record.identity(), "circular require");
                return Ok(record.module_exports());
            }
            ModuleState::Evaluating | ModuleState::Evaluated => {}
            _ => {
                self.link_graph(record)?;
                self.evaluate(record)?;
            }
        }

        if is_esm(record) {
            interop::as_cjs_exports(record)
        } else {
            Ok(record.module_exports())
        }
    }

    fn import_record(&self, record: &Arc<ModuleRecord>) -> Result<Namespace> {
        if let Some(err) = record.failure() {
            return Err(err);
        }
        self.link_graph(record)?;
        self.evaluate(record)?;
        self.namespace_of(record)
    }

    fn namespace_of(&self, record: &Arc<ModuleRecord>) -> Result<Namespace> {
        if is_esm(record) {
            return record.namespace().ok_or_else(|| {
                LoaderError::interop(format!("Module {} has not been linked", record.identity()))
            });
        }
        Ok(self.commonjs_namespace(record))
    }

    /// Namespace of a CommonJS or JSON record, cached once it has evaluated
    fn commonjs_namespace(&self, record: &Arc<ModuleRecord>) -> Namespace {
        if let Some(ns) = record.namespace() {
            return ns;
        }
        let ns = interop::as_esm_namespace(record.identity(), &record.module_exports());
        if record.state() == ModuleState::Evaluated {
            record.init_namespace(ns)
        } else {
            ns
        }
    }

    /// Compile the record, declaring ES module locals
    fn compile(&self, record: &Arc<ModuleRecord>) -> Result<Arc<ExecutableUnit>> {
        if let Some(unit) = record.unit() {
            return Ok(unit);
        }

        let identity = record.identity();
        let source = self
            .inner
            .source
            .read_source(identity.path())
            .map_err(|e| LoaderError::io(identity.path(), e))?;
        let unit = self
            .inner
            .compiler
            .compile(&source, identity, identity.kind())?;

        if let Some(syntax) = unit.module_syntax() {
            for export in &syntax.local_exports {
                if syntax.import_for_local(&export.local).is_none() {
                    record.environment().declare(&export.local);
                }
            }
        }
        Ok(record.set_unit(unit))
    }

    /// Link `root` and everything it statically imports
    fn link_graph(&self, root: &Arc<ModuleRecord>) -> Result<()> {
        let mut visiting = HashSet::new();
        let mut order = Vec::new();
        let result = self.link_module(root, &mut visiting, &mut order);

        // Records in `order` have complete subgraphs even when a sibling
        // branch failed, so they can still finish linking.
        for record in &order {
            if record.failure().is_none() {
                if let Err(err) = self.instantiate(record) {
                    record.fail(err);
                }
            }
        }

        result?;
        match root.failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn link_module(
        &self,
        record: &Arc<ModuleRecord>,
        visiting: &mut HashSet<ModuleIdentity>,
        order: &mut Vec<Arc<ModuleRecord>>,
    ) -> Result<()> {
        if let Some(err) = record.failure() {
            return Err(err);
        }
        if !visiting.insert(record.identity().clone()) {
            // Cycle: the record is already being linked further up
            return Ok(());
        }
        if record.state() != ModuleState::Unlinked {
            return Ok(());
        }

        record.advance(ModuleState::Linking);
        tracing::trace!(module = %record.identity(), "linking");
        match self.link_requests(record, visiting, order) {
            Ok(()) => {
                order.push(Arc::clone(record));
                Ok(())
            }
            Err(err) => Err(record.fail(err)),
        }
    }

    fn link_requests(
        &self,
        record: &Arc<ModuleRecord>,
        visiting: &mut HashSet<ModuleIdentity>,
        order: &mut Vec<Arc<ModuleRecord>>,
    ) -> Result<()> {
        let unit = self.compile(record)?;
        let Some(syntax) = unit.module_syntax() else {
            return Ok(());
        };

        for specifier in &syntax.requests {
            let ctx = LoadContext::static_import(Some(record.identity().clone()));
            let dep = self.load_record(specifier, &ctx)?;
            record.push_request(specifier, Arc::clone(&dep));
            self.link_module(&dep, visiting, order)?;
        }
        Ok(())
    }

    /// Build import bindings and the namespace, then mark the record linked
    fn instantiate(&self, record: &Arc<ModuleRecord>) -> Result<()> {
        for (_, dep) in record.requests() {
            if let Some(err) = dep.failure() {
                return Err(err);
            }
        }

        let unit = record.unit();
        if let Some(syntax) = unit.as_deref().and_then(|u| u.module_syntax()) {
            let mut imports = HashMap::new();
            for entry in &syntax.imports {
                let dep = self.requested(record, &entry.specifier)?;
                let binding = match &entry.imported {
                    ImportName::Namespace => BindingSource::Namespace(dep),
                    ImportName::Name(name) => {
                        self.resolve_export(&dep, name, &mut Vec::new())?
                            .ok_or_else(|| LoaderError::MissingExport {
                                specifier: entry.specifier.clone(),
                                name: name.clone(),
                            })?
                    }
                };
                imports.insert(entry.local.clone(), binding);
            }
            record.set_imports(imports);

            let mut bindings = Vec::new();
            for name in self.export_names(record, &mut HashSet::new()) {
                match self.resolve_export(record, &name, &mut Vec::new())? {
                    Some(binding) => bindings.push((name, binding)),
                    None => {
                        if let Some(indirect) =
                            syntax.indirect_exports.iter().find(|e| e.exported == name)
                        {
                            let missing = match &indirect.imported {
                                ImportName::Name(imported) => imported.clone(),
                                ImportName::Namespace => name.clone(),
                            };
                            return Err(LoaderError::MissingExport {
                                specifier: indirect.specifier.clone(),
                                name: missing,
                            });
                        }
                        tracing::debug!(
                            module = %record.identity(),
                            export = %name,
                            "ambiguous star export left out of namespace"
                        );
                    }
                }
            }
            record.init_namespace(Namespace::new(record.identity().clone(), bindings));
        }

        record.advance(ModuleState::Linked);
        tracing::trace!(module = %record.identity(), "linked");
        Ok(())
    }

    fn requested(&self, record: &ModuleRecord, specifier: &str) -> Result<Arc<ModuleRecord>> {
        record.requested(specifier).ok_or_else(|| {
            LoaderError::module_not_found(specifier, Some(record.identity().path().to_path_buf()))
        })
    }

    /// Export names of an ES module, following star exports of ES modules
    fn export_names(
        &self,
        record: &Arc<ModuleRecord>,
        visited: &mut HashSet<ModuleIdentity>,
    ) -> Vec<String> {
        if !visited.insert(record.identity().clone()) {
            return Vec::new();
        }
        let unit = record.unit();
        let Some(syntax) = unit.as_deref().and_then(|u| u.module_syntax()) else {
            return Vec::new();
        };

        let mut names: Vec<String> = syntax
            .explicit_export_names()
            .map(str::to_string)
            .collect();
        for specifier in &syntax.star_exports {
            let Some(dep) = record.requested(specifier) else {
                continue;
            };
            if !is_esm(&dep) {
                continue;
            }
            for name in self.export_names(&dep, visited) {
                if name != "default" && !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Find the binding behind export `name` of `record`
    ///
    /// `Ok(None)` means the name is not exported, is circular or is
    /// ambiguous between star exports.
    fn resolve_export(
        &self,
        record: &Arc<ModuleRecord>,
        name: &str,
        resolve_set: &mut Vec<(ModuleIdentity, String)>,
    ) -> Result<Option<BindingSource>> {
        let unit = record.unit();
        let Some(syntax) = unit.as_deref().and_then(|u| u.module_syntax()) else {
            return Ok(Some(BindingSource::Export {
                module: Arc::clone(record),
                name: name.to_string(),
            }));
        };

        if resolve_set
            .iter()
            .any(|(id, n)| id == record.identity() && n == name)
        {
            return Ok(None);
        }
        resolve_set.push((record.identity().clone(), name.to_string()));

        if let Some(export) = syntax.local_exports.iter().find(|e| e.exported == name) {
            let Some(import) = syntax.import_for_local(&export.local) else {
                return Ok(Some(BindingSource::Local {
                    env: record.environment().clone(),
                    name: export.local.clone(),
                }));
            };
            let dep = self.requested(record, &import.specifier)?;
            return match &import.imported {
                ImportName::Namespace => Ok(Some(BindingSource::Namespace(dep))),
                ImportName::Name(imported) => self.resolve_export(&dep, imported, resolve_set),
            };
        }

        if let Some(export) = syntax.indirect_exports.iter().find(|e| e.exported == name) {
            let dep = self.requested(record, &export.specifier)?;
            return match &export.imported {
                ImportName::Namespace => Ok(Some(BindingSource::Namespace(dep))),
                ImportName::Name(imported) => self.resolve_export(&dep, imported, resolve_set),
            };
        }

        if name == "default" {
            return Ok(None);
        }

        let mut found: Option<BindingSource> = None;
        for specifier in &syntax.star_exports {
            let dep = self.requested(record, specifier)?;
            if !is_esm(&dep) {
                continue;
            }
            if let Some(binding) = self.resolve_export(&dep, name, resolve_set)? {
                match &found {
                    None => found = Some(binding),
                    Some(existing) if !existing.same_binding(&binding) => return Ok(None),
                    Some(_) => {}
                }
            }
        }
        Ok(found)
    }

    /// Evaluate a linked record and its dependencies, dependencies first
    fn evaluate(&self, record: &Arc<ModuleRecord>) -> Result<()> {
        if let Some(err) = record.failure() {
            return Err(err);
        }
        match record.state() {
            ModuleState::Evaluating | ModuleState::Evaluated => return Ok(()),
            ModuleState::Linked => {}
            state => {
                return Err(LoaderError::interop(format!(
                    "Module {} cannot be evaluated while {}",
                    record.identity(),
                    state
                )));
            }
        }

        record.advance(ModuleState::Evaluating);
        tracing::debug!(module = %record.identity(), "evaluating");
        match self.evaluate_body(record) {
            Ok(()) => {
                record.advance(ModuleState::Evaluated);
                record.mark_loaded();
                tracing::trace!(module = %record.identity(), "evaluated");
                Ok(())
            }
            Err(err) => {
                tracing::debug!(module = %record.identity(), error = %err, "evaluation failed");
                Err(record.fail(err))
            }
        }
    }

    fn evaluate_body(&self, record: &Arc<ModuleRecord>) -> Result<()> {
        let unit = record.unit().ok_or_else(|| {
            LoaderError::interop(format!("Module {} was never compiled", record.identity()))
        })?;

        for (_, dep) in record.requests() {
            self.evaluate(&dep)?;
            if !is_esm(&dep) {
                self.commonjs_namespace(&dep);
            }
        }

        match unit.as_ref() {
            ExecutableUnit::Json(json) => {
                record.set_module_exports(json.value.clone());
                Ok(())
            }
            _ => {
                let scope = ModuleScope::new(self, record);
                self.inner.host.execute(&unit, &scope)
            }
        }
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("options", &self.inner.options)
            .field("modules", &self.inner.cache.len())
            .finish()
    }
}

fn is_esm(record: &ModuleRecord) -> bool {
    match record.unit() {
        Some(unit) => matches!(unit.as_ref(), ExecutableUnit::Esm(_)),
        None => record.kind() == ModuleKind::Esm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryFs;

    fn loader(files: &[(&str, &str)], host: ScriptedHost) -> ModuleLoader {
        ModuleLoader::new(
            Arc::new(MemoryFs::with_files(files.iter().copied())),
            Arc::new(host),
            LoaderOptions::default(),
            "/app",
        )
    }

    #[test]
    fn test_require_commonjs() {
        let host = ScriptedHost::new().with("/app/a.js", |scope| {
            scope.set_module_exports("hello");
            Ok(())
        });
        let loader = loader(&[("/app/a.js", "module.exports = 'hello'")], host);
        assert_eq!(loader.require("./a", None).unwrap(), Value::from("hello"));
        assert_eq!(loader.cache().len(), 1);
    }

    #[test]
    fn test_require_json() {
        let loader = loader(&[("/app/data.json", r#"{"a": 1}"#)], ScriptedHost::new());
        let value = loader.require("./data.json", None).unwrap();
        assert_eq!(value.as_object().unwrap().get("a"), Some(Value::from(1)));
    }

    #[test]
    fn test_import_links_before_evaluating() {
        let host = ScriptedHost::new()
            .with("/app/dep.mjs", |scope| scope.set("value", 7))
            .with("/app/main.mjs", |scope| {
                assert_eq!(scope.get("value")?, Value::from(7));
                scope.set_default(scope.get("value")?)
            });
        let loader = loader(
            &[
                ("/app/dep.mjs", "export let value = 7"),
                (
                    "/app/main.mjs",
                    "import { value } from './dep.mjs'\nexport default value",
                ),
            ],
            host,
        );

        let ns = loader.import_static("./main.mjs", None).unwrap();
        assert_eq!(ns.keys(), vec!["default"]);
        assert_eq!(ns.get("default"), Some(Value::from(7)));

        let dep = loader
            .record(&ModuleIdentity::new("/app/dep.mjs", ModuleKind::Esm))
            .unwrap();
        assert_eq!(dep.state(), ModuleState::Evaluated);
    }

    #[test]
    fn test_failure_is_sticky() {
        let host = ScriptedHost::new().with("/app/boom.js", |scope| {
            Err(LoaderError::thrown(scope.filename(), "boom"))
        });
        let loader = loader(&[("/app/boom.js", "throw 'boom'")], host);
        let first = loader.require("./boom.js", None).unwrap_err();
        let second = loader.require("./boom.js", None).unwrap_err();
        assert_eq!(first.to_string(), "boom");
        assert_eq!(second.to_string(), "boom");
    }
}
