// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module records and their lifecycle

use crate::error::LoaderError;
use crate::module_system::compiler::ExecutableUnit;
use crate::module_system::namespace::{BindingSource, Namespace};
use crate::module_system::{ModuleIdentity, ModuleKind};
use crate::value::{Object, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a module record
///
/// States only move forward, except for the jump to the terminal
/// [`Failed`](ModuleState::Failed) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleState {
    /// Created, not compiled
    Unlinked,
    /// Compiled, dependencies being linked
    Linking,
    /// Dependencies linked, bindings and namespace built
    Linked,
    /// Body running
    Evaluating,
    /// Body finished
    Evaluated,
    /// Terminal failure
    Failed,
}

impl ModuleState {
    /// Short label used in logs and CLI output
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Unlinked => "unlinked",
            ModuleState::Linking => "linking",
            ModuleState::Linked => "linked",
            ModuleState::Evaluating => "evaluating",
            ModuleState::Evaluated => "evaluated",
            ModuleState::Failed => "failed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local bindings of an ES module
///
/// A declared binding holds `None` until the module body initializes it.
#[derive(Clone, Default)]
pub struct Environment {
    bindings: Arc<RwLock<HashMap<String, Option<Value>>>>,
}

impl Environment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an uninitialized binding
    pub fn declare(&self, name: impl Into<String>) {
        self.bindings.write().entry(name.into()).or_insert(None);
    }

    /// Initialize or update a binding
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.bindings.write().insert(name.into(), Some(value));
    }

    /// `None` if undeclared, `Some(None)` if declared but uninitialized
    pub fn get(&self, name: &str) -> Option<Option<Value>> {
        self.bindings.read().get(name).cloned()
    }

    /// Whether both handles share storage
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.bindings, &other.bindings)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.bindings.read();
        let mut names: Vec<&String> = bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment").field("bindings", &names).finish()
    }
}

struct RecordInner {
    state: ModuleState,
    unit: Option<Arc<ExecutableUnit>>,
    /// Resolved static requests, in source order
    requests: Vec<(String, Arc<ModuleRecord>)>,
    /// Import bindings by local name
    imports: HashMap<String, BindingSource>,
    namespace: Option<Namespace>,
    cjs_exports: Option<Value>,
    failure: Option<LoaderError>,
}

/// One loaded module
///
/// Records are shared through `Arc`; every access goes through a short-lived
/// lock that is never held while a module body runs.
pub struct ModuleRecord {
    identity: ModuleIdentity,
    environment: Environment,
    module: Object,
    inner: RwLock<RecordInner>,
}

impl ModuleRecord {
    /// Create an unlinked record
    pub fn new(identity: ModuleIdentity) -> Self {
        let module = Object::new();
        module.set("exports", Value::Object(Object::new()));
        module.set("id", identity.path().display().to_string());
        module.set("loaded", false);

        Self {
            identity,
            environment: Environment::new(),
            module,
            inner: RwLock::new(RecordInner {
                state: ModuleState::Unlinked,
                unit: None,
                requests: Vec::new(),
                imports: HashMap::new(),
                namespace: None,
                cjs_exports: None,
                failure: None,
            }),
        }
    }

    /// The module identity
    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    /// The resolved kind
    pub fn kind(&self) -> ModuleKind {
        self.identity.kind()
    }

    /// Current state
    pub fn state(&self) -> ModuleState {
        self.inner.read().state
    }

    /// Move to `next`; moves that are not forward are ignored
    pub(crate) fn advance(&self, next: ModuleState) -> bool {
        let mut inner = self.inner.write();
        if inner.state == ModuleState::Failed || next <= inner.state {
            return false;
        }
        inner.state = next;
        true
    }

    /// Record a terminal failure; the first failure wins
    pub(crate) fn fail(&self, error: LoaderError) -> LoaderError {
        let mut inner = self.inner.write();
        if let Some(existing) = &inner.failure {
            return existing.clone();
        }
        inner.state = ModuleState::Failed;
        inner.failure = Some(error.clone());
        error
    }

    /// The stored failure, if the record failed
    pub fn failure(&self) -> Option<LoaderError> {
        self.inner.read().failure.clone()
    }

    /// The compiled unit, once linking has started
    pub fn unit(&self) -> Option<Arc<ExecutableUnit>> {
        self.inner.read().unit.clone()
    }

    pub(crate) fn set_unit(&self, unit: ExecutableUnit) -> Arc<ExecutableUnit> {
        let unit = Arc::new(unit);
        self.inner.write().unit = Some(Arc::clone(&unit));
        unit
    }

    /// ES module local bindings
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The CommonJS `module` object
    pub fn module_object(&self) -> &Object {
        &self.module
    }

    /// Current `module.exports`
    pub fn module_exports(&self) -> Value {
        self.module.get("exports").unwrap_or_default()
    }

    /// Replace `module.exports`
    pub fn set_module_exports(&self, exports: Value) {
        self.module.set("exports", exports);
    }

    pub(crate) fn mark_loaded(&self) {
        self.module.set("loaded", true);
    }

    pub(crate) fn push_request(&self, specifier: &str, record: Arc<ModuleRecord>) {
        self.inner
            .write()
            .requests
            .push((specifier.to_string(), record));
    }

    /// The record a static request resolved to
    pub fn requested(&self, specifier: &str) -> Option<Arc<ModuleRecord>> {
        self.inner
            .read()
            .requests
            .iter()
            .find(|(s, _)| s == specifier)
            .map(|(_, r)| Arc::clone(r))
    }

    /// Resolved static requests in source order
    pub fn requests(&self) -> Vec<(String, Arc<ModuleRecord>)> {
        self.inner.read().requests.clone()
    }

    /// Identities of the static dependencies
    pub fn dependencies(&self) -> Vec<ModuleIdentity> {
        self.inner
            .read()
            .requests
            .iter()
            .map(|(_, r)| r.identity().clone())
            .collect()
    }

    pub(crate) fn set_imports(&self, imports: HashMap<String, BindingSource>) {
        self.inner.write().imports = imports;
    }

    /// The import binding for `local`, if it is one
    pub fn import_binding(&self, local: &str) -> Option<BindingSource> {
        self.inner.read().imports.get(local).cloned()
    }

    /// The namespace, once built
    pub fn namespace(&self) -> Option<Namespace> {
        self.inner.read().namespace.clone()
    }

    /// Store the namespace unless one exists; returns the stored one
    pub(crate) fn init_namespace(&self, namespace: Namespace) -> Namespace {
        let mut inner = self.inner.write();
        inner.namespace.get_or_insert(namespace).clone()
    }

    pub(crate) fn cjs_exports(&self) -> Option<Value> {
        self.inner.read().cjs_exports.clone()
    }

    pub(crate) fn set_cjs_exports(&self, exports: Value) {
        self.inner.write().cjs_exports = Some(exports);
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ModuleRecord")
            .field("identity", &self.identity)
            .field("state", &inner.state)
            .field(
                "requests",
                &inner.requests.iter().map(|(s, _)| s).collect::<Vec<_>>(),
            )
            .finish()
    }
}
