// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bridging CommonJS exports and ES module namespaces

use crate::error::{LoaderError, Result};
use crate::module_system::compiler::ExecutableUnit;
use crate::module_system::namespace::Namespace;
use crate::module_system::record::{ModuleRecord, ModuleState};
use crate::module_system::ModuleIdentity;
use crate::value::{Object, Value};

/// Namespace seen by `import` for a CommonJS or JSON module
///
/// Keys are the own enumerable keys of `exports` at the time of the call,
/// plus `default`, which is always the exports value itself. Both the key
/// set and the values are snapshots.
pub fn as_esm_namespace(module: &ModuleIdentity, exports: &Value) -> Namespace {
    let mut entries: Vec<(String, Value)> = match exports {
        Value::Object(obj) => obj
            .entries()
            .into_iter()
            .filter(|(key, _)| key != "default")
            .collect(),
        _ => Vec::new(),
    };
    entries.push(("default".to_string(), exports.clone()));
    Namespace::snapshot(module.clone(), entries)
}

/// Exports object seen by `require` for an ES module
///
/// Each export contributes its current value; the default export only
/// appears as `exports.default`. The object is cached on the record once
/// the module has finished evaluating, so later requires share it.
pub fn as_cjs_exports(record: &ModuleRecord) -> Result<Value> {
    if let Some(cached) = record.cjs_exports() {
        return Ok(cached);
    }

    let is_esm = matches!(record.unit().as_deref(), Some(ExecutableUnit::Esm(_)));
    if !is_esm {
        return Err(LoaderError::interop(format!(
            "Cannot create a CommonJS view of non-ES module {}",
            record.identity()
        )));
    }
    let Some(namespace) = record.namespace() else {
        return Err(LoaderError::interop(format!(
            "Module {} has not been linked",
            record.identity()
        )));
    };

    let exports = Value::Object(Object::from_entries(namespace.entries()));
    if record.state() == ModuleState::Evaluated {
        record.set_cjs_exports(exports.clone());
    }
    Ok(exports)
}
