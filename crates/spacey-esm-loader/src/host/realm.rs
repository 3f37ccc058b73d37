// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Realms: the global object module bodies run against

use crate::value::{Object, Value};
use std::sync::atomic::{AtomicBool, Ordering};

/// Names that alias the global object but are deprecated
const DEPRECATED_GLOBAL_ALIASES: &[&str] = &["GLOBAL", "root"];

static ALIAS_DEPRECATION_WARNED: AtomicBool = AtomicBool::new(false);

/// Log the DEP0016 warning once per process; returns whether it was logged
fn warn_deprecated_alias(name: &str) -> bool {
    if ALIAS_DEPRECATION_WARNED.swap(true, Ordering::Relaxed) {
        return false;
    }
    tracing::warn!(
        alias = %name,
        "'{}' is deprecated, use 'global' (DEP0016)",
        name
    );
    true
}

/// An evaluation context with its own global object
#[derive(Debug, Clone, Default)]
pub struct Realm {
    global: Object,
}

impl Realm {
    /// Create a realm with an empty global object
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing global object
    pub fn with_global(global: Object) -> Self {
        Self { global }
    }

    /// The global object
    pub fn global(&self) -> &Object {
        &self.global
    }

    /// Make a sandbox realm usable as a module context
    ///
    /// Globals missing from this realm are copied from `default_global`,
    /// `global` points back at this realm's own global object, and the
    /// deprecated `GLOBAL`/`root` aliases are installed. Globals the sandbox
    /// already defines are left alone.
    pub fn prepare(&self, default_global: &Object) {
        if self.global.ptr_eq(default_global) {
            return;
        }

        for name in default_global.own_keys() {
            if name == "global" {
                self.global.set("global", Value::Object(self.global.clone()));
            } else if DEPRECATED_GLOBAL_ALIASES.contains(&name.as_str()) {
                warn_deprecated_alias(&name);
                self.global
                    .define_hidden(name, Value::Object(self.global.clone()));
            } else if !self.global.has(&name) {
                if let Some(value) = default_global.get(&name) {
                    self.global.set(name, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_copies_missing_globals() {
        let default_global = Object::new();
        default_global.set("global", Value::Object(default_global.clone()));
        default_global.set("process", "host-process");
        default_global.set("console", "host-console");
        default_global.define_hidden("root", Value::Object(default_global.clone()));

        let sandbox = Realm::new();
        sandbox.global().set("console", "sandbox-console");
        sandbox.prepare(&default_global);

        let global = sandbox.global();
        assert_eq!(global.get("process"), Some(Value::from("host-process")));
        assert_eq!(global.get("console"), Some(Value::from("sandbox-console")));
        assert_eq!(global.get("global"), Some(Value::Object(global.clone())));
        assert_eq!(global.get("root"), Some(Value::Object(global.clone())));
        assert!(!global.keys().contains(&"root".to_string()));
    }

    #[test]
    fn test_alias_warning_logged_once() {
        let default_global = Object::new();
        default_global.define_hidden("GLOBAL", Value::Object(default_global.clone()));
        Realm::new().prepare(&default_global);
        Realm::new().prepare(&default_global);
        assert!(!warn_deprecated_alias("GLOBAL"));
    }

    #[test]
    fn test_prepare_default_is_noop() {
        let realm = Realm::new();
        realm.global().set("x", 1);
        realm.prepare(&realm.global().clone());
        assert_eq!(realm.global().own_keys(), vec!["x"]);
    }
}
