// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module namespace objects and export bindings

use crate::module_system::record::{Environment, ModuleRecord};
use crate::module_system::ModuleIdentity;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Where an export or import binding reads its value from
#[derive(Clone)]
pub enum BindingSource {
    /// Live local binding of an ES module
    Local {
        /// Environment of the exporting module
        env: Environment,
        /// Local binding name
        name: String,
    },
    /// Fixed value
    Snapshot(Value),
    /// The namespace of a module
    Namespace(Arc<ModuleRecord>),
    /// A named export of a CommonJS or JSON module, read from its
    /// namespace snapshot once that exists
    Export {
        /// The exporting module
        module: Arc<ModuleRecord>,
        /// Export name
        name: String,
    },
}

impl BindingSource {
    /// Current value; `None` while uninitialized
    pub fn read(&self) -> Option<Value> {
        match self {
            BindingSource::Local { env, name } => env.get(name).flatten(),
            BindingSource::Snapshot(value) => Some(value.clone()),
            BindingSource::Namespace(module) => module.namespace().map(Value::Namespace),
            BindingSource::Export { module, name } => module
                .namespace()
                .map(|ns| ns.get(name).unwrap_or_default()),
        }
    }

    /// Whether both resolve to the same binding
    pub fn same_binding(&self, other: &BindingSource) -> bool {
        match (self, other) {
            (
                BindingSource::Local { env: a, name: x },
                BindingSource::Local { env: b, name: y },
            ) => a.ptr_eq(b) && x == y,
            (BindingSource::Snapshot(a), BindingSource::Snapshot(b)) => a == b,
            (BindingSource::Namespace(a), BindingSource::Namespace(b)) => Arc::ptr_eq(a, b),
            (
                BindingSource::Export { module: a, name: x },
                BindingSource::Export { module: b, name: y },
            ) => Arc::ptr_eq(a, b) && x == y,
            _ => false,
        }
    }
}

impl fmt::Debug for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingSource::Local { name, .. } => write!(f, "Local({})", name),
            BindingSource::Snapshot(value) => write!(f, "Snapshot({:?})", value),
            BindingSource::Namespace(module) => write!(f, "Namespace({})", module.identity()),
            BindingSource::Export { module, name } => {
                write!(f, "Export({}, {})", module.identity(), name)
            }
        }
    }
}

struct NamespaceInner {
    module: ModuleIdentity,
    bindings: BTreeMap<String, BindingSource>,
}

/// A module namespace object
///
/// The key set is fixed at creation and sorted. Values are read through
/// each key's [`BindingSource`], so exports of ES modules stay live while
/// snapshot bindings never change.
#[derive(Clone)]
pub struct Namespace(Arc<NamespaceInner>);

impl Namespace {
    /// Create a namespace over a fixed set of bindings
    pub fn new(
        module: ModuleIdentity,
        bindings: impl IntoIterator<Item = (String, BindingSource)>,
    ) -> Self {
        Self(Arc::new(NamespaceInner {
            module,
            bindings: bindings.into_iter().collect(),
        }))
    }

    /// Create a namespace of fixed values
    pub fn snapshot(module: ModuleIdentity, entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::new(
            module,
            entries
                .into_iter()
                .map(|(k, v)| (k, BindingSource::Snapshot(v))),
        )
    }

    /// Module the namespace belongs to
    pub fn module(&self) -> &ModuleIdentity {
        &self.0.module
    }

    /// Export names in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.0.bindings.keys().cloned().collect()
    }

    /// Whether `key` is an export name
    pub fn has(&self, key: &str) -> bool {
        self.0.bindings.contains_key(key)
    }

    /// Read an export; uninitialized bindings read as `undefined`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .bindings
            .get(key)
            .map(|binding| binding.read().unwrap_or_default())
    }

    /// Whether the binding for `key` has been initialized
    pub fn is_initialized(&self, key: &str) -> bool {
        self.0
            .bindings
            .get(key)
            .is_some_and(|binding| binding.read().is_some())
    }

    /// The binding behind `key`
    pub fn binding(&self, key: &str) -> Option<&BindingSource> {
        self.0.bindings.get(key)
    }

    /// Current values of all exports, in key order
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .bindings
            .iter()
            .map(|(k, b)| (k.clone(), b.read().unwrap_or_default()))
            .collect()
    }

    /// Number of exports
    pub fn len(&self) -> usize {
        self.0.bindings.len()
    }

    /// Whether there are no exports
    pub fn is_empty(&self) -> bool {
        self.0.bindings.is_empty()
    }

    /// Whether both handles are the same namespace object
    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("module", &self.0.module.to_string())
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_system::ModuleKind;

    fn identity() -> ModuleIdentity {
        ModuleIdentity::new("/app/a.mjs", ModuleKind::Esm)
    }

    #[test]
    fn test_live_local_binding() {
        let env = Environment::new();
        env.declare("count");
        let ns = Namespace::new(
            identity(),
            [(
                "count".to_string(),
                BindingSource::Local {
                    env: env.clone(),
                    name: "count".to_string(),
                },
            )],
        );

        assert!(!ns.is_initialized("count"));
        assert_eq!(ns.get("count"), Some(Value::Undefined));
        env.set("count", Value::from(1));
        assert_eq!(ns.get("count"), Some(Value::from(1)));
        env.set("count", Value::from(2));
        assert_eq!(ns.get("count"), Some(Value::from(2)));
        assert_eq!(ns.get("missing"), None);
    }

    #[test]
    fn test_sorted_keys() {
        let ns = Namespace::snapshot(
            identity(),
            [
                ("zeta".to_string(), Value::from(1)),
                ("alpha".to_string(), Value::from(2)),
            ],
        );
        assert_eq!(ns.keys(), vec!["alpha", "zeta"]);
        assert!(ns.ptr_eq(&ns.clone()));
        assert!(!ns.ptr_eq(&Namespace::snapshot(identity(), [])));
    }
}
