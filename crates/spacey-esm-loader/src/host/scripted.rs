// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! A script host whose module bodies are native closures
//!
//! Useful for embedders that provide synthetic modules, and for exercising
//! the loader without a script engine. Modules without a registered body
//! run as empty bodies.

use super::ScriptHost;
use crate::error::Result;
use crate::host::normalize_path;
use crate::module_system::{ExecutableUnit, ModuleScope};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A native module body
pub type ModuleBody = Arc<dyn Fn(&ModuleScope<'_>) -> Result<()> + Send + Sync>;

/// Host that runs registered closures in place of compiled source
#[derive(Default)]
pub struct ScriptedHost {
    bodies: DashMap<PathBuf, ModuleBody>,
}

impl ScriptedHost {
    /// Create a host with no registered bodies
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the body run for the module at `path`
    pub fn register<F>(&self, path: impl AsRef<Path>, body: F)
    where
        F: Fn(&ModuleScope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.bodies
            .insert(normalize_path(path.as_ref()), Arc::new(body));
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<F>(self, path: impl AsRef<Path>, body: F) -> Self
    where
        F: Fn(&ModuleScope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(path, body);
        self
    }

    fn body(&self, path: &Path) -> Option<ModuleBody> {
        self.bodies.get(path).map(|entry| Arc::clone(entry.value()))
    }
}

impl ScriptHost for ScriptedHost {
    fn execute(&self, unit: &ExecutableUnit, scope: &ModuleScope<'_>) -> Result<()> {
        // The map guard must not be held while the body runs: bodies
        // re-enter the loader through `require`.
        match self.body(unit.path()) {
            Some(body) => body(scope),
            None => {
                tracing::trace!(path = %unit.path().display(), "no body registered");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for ScriptedHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedHost")
            .field("bodies", &self.bodies.len())
            .finish()
    }
}
