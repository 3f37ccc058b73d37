// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host capability layer
//!
//! The loader never reaches into a script engine directly. Everything it
//! needs from the embedding host goes through two traits:
//!
//! - [`SourceProvider`]: synchronous source reads and file probing
//! - [`ScriptHost`]: running a compiled unit and constructing realms
//!
//! Both are injected when a [`ModuleLoader`](crate::ModuleLoader) is built.

mod fs;
mod realm;
mod scripted;

pub use fs::{normalize_path, MemoryFs, NativeFs};
pub use realm::Realm;
pub use scripted::{ModuleBody, ScriptedHost};

use crate::error::Result;
use crate::module_system::{ExecutableUnit, ModuleScope};
use std::io;
use std::path::{Path, PathBuf};

/// File access used by the resolver and compiler
pub trait SourceProvider: Send + Sync {
    /// Read the source text of a file
    fn read_source(&self, path: &Path) -> io::Result<String>;

    /// Check if the path is an existing file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if the path is an existing directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Produce the canonical form of a path that is known to exist
    fn canonicalize(&self, path: &Path) -> PathBuf {
        normalize_path(path)
    }
}

/// Script execution provided by the embedding host
pub trait ScriptHost: Send + Sync {
    /// Run a compiled module body
    ///
    /// CommonJS bodies populate `module.exports` through the scope; ESM
    /// bodies assign their local bindings. Errors returned here mark the
    /// module as failed.
    fn execute(&self, unit: &ExecutableUnit, scope: &ModuleScope<'_>) -> Result<()>;

    /// Construct the realm module bodies run against
    fn create_realm(&self) -> Realm {
        Realm::new()
    }
}
