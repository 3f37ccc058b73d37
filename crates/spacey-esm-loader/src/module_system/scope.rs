// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! What a running module body can see

use crate::error::{LoaderError, Result};
use crate::module_system::compiler::DEFAULT_LOCAL;
use crate::module_system::loader::{DeferredImport, ModuleLoader};
use crate::module_system::namespace::Namespace;
use crate::module_system::record::ModuleRecord;
use crate::module_system::{ModuleIdentity, ModuleKind};
use crate::value::{Object, Value};
use std::path::Path;
use std::sync::Arc;

/// The view of the loader handed to [`ScriptHost::execute`](crate::host::ScriptHost::execute)
///
/// CommonJS bodies use [`require`](Self::require), [`exports`](Self::exports)
/// and [`set_module_exports`](Self::set_module_exports). ES module bodies
/// assign their bindings with [`set`](Self::set) and read imports with
/// [`get`](Self::get). Both may call [`import`](Self::import).
pub struct ModuleScope<'a> {
    loader: &'a ModuleLoader,
    record: &'a Arc<ModuleRecord>,
}

impl<'a> ModuleScope<'a> {
    pub(crate) fn new(loader: &'a ModuleLoader, record: &'a Arc<ModuleRecord>) -> Self {
        Self { loader, record }
    }

    /// Identity of the running module
    pub fn identity(&self) -> &ModuleIdentity {
        self.record.identity()
    }

    /// Kind the module was resolved as
    pub fn kind(&self) -> ModuleKind {
        self.record.kind()
    }

    /// `__filename`
    pub fn filename(&self) -> &Path {
        self.record.identity().path()
    }

    /// `__dirname`
    pub fn dirname(&self) -> &Path {
        self.record.identity().dirname()
    }

    /// `import.meta.url`
    pub fn meta_url(&self) -> String {
        format!("file://{}", self.record.identity())
    }

    /// The realm's global object
    pub fn global(&self) -> &Object {
        self.loader.realm().global()
    }

    /// Source text reported to introspection
    pub fn source(&self) -> Option<String> {
        let debug = self.loader.options().debug;
        self.record
            .unit()
            .map(|unit| unit.info().introspect(debug).to_string())
    }

    /// `require(specifier)`
    pub fn require(&self, specifier: &str) -> Result<Value> {
        self.loader.require(specifier, Some(self.record.identity()))
    }

    /// `import(specifier)`
    pub fn import(&self, specifier: &str) -> DeferredImport {
        self.loader
            .import(specifier, Some(self.record.identity().clone()))
    }

    /// The CommonJS `module` object
    pub fn module(&self) -> &Object {
        self.record.module_object()
    }

    /// Current `module.exports`
    pub fn exports(&self) -> Value {
        self.record.module_exports()
    }

    /// `module.exports = value`
    pub fn set_module_exports(&self, value: impl Into<Value>) {
        self.record.set_module_exports(value.into());
    }

    /// Initialize or update a local binding
    pub fn set(&self, local: &str, value: impl Into<Value>) -> Result<()> {
        if self.record.import_binding(local).is_some() {
            return Err(LoaderError::interop("Assignment to constant variable."));
        }
        self.record.environment().set(local, value.into());
        Ok(())
    }

    /// Initialize the anonymous `export default` binding
    pub fn set_default(&self, value: impl Into<Value>) -> Result<()> {
        self.set(DEFAULT_LOCAL, value)
    }

    /// Read a local or imported binding
    pub fn get(&self, local: &str) -> Result<Value> {
        let uninitialized =
            || LoaderError::Reference(format!("Cannot access '{}' before initialization", local));

        if let Some(binding) = self.record.import_binding(local) {
            return binding.read().ok_or_else(uninitialized);
        }
        match self.record.environment().get(local) {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(uninitialized()),
            None => Err(LoaderError::Reference(format!("{} is not defined", local))),
        }
    }

    /// Read a namespace import (`import * as local`)
    pub fn namespace(&self, local: &str) -> Result<Namespace> {
        match self.get(local)? {
            Value::Namespace(ns) => Ok(ns),
            other => Err(LoaderError::interop(format!(
                "{} is not a module namespace ({})",
                local, other
            ))),
        }
    }
}
