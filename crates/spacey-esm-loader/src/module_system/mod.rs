// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module system implementation
//!
//! Loads CommonJS modules and ECMAScript Modules (ESM) side by side.
//!
//! ## Resolution
//! - Relative, absolute and bare (`node_modules`) specifiers
//! - `package.json` `main`, `exports` conditions and `type`
//! - `.mjs` / `.cjs` / `.json` markers, auto-mode syntax sniffing
//!
//! ## Linking and evaluation
//! - Static import/export analysis before any code runs
//! - Live bindings between ES modules, snapshots of CommonJS exports
//! - Circular imports and circular `require()`
//! - Dynamic `import()` as a future
//!
//! ## Interop
//! - `import` of CommonJS: `module.exports` becomes `default`
//! - `require` of ESM: an exports object with `default` as a property

mod cache;
pub mod compiler;
mod identity;
mod interop;
mod loader;
mod namespace;
mod package;
mod record;
mod resolver;
mod scope;

pub use cache::ModuleCache;
pub use compiler::{Compiler, ExecutableUnit, SourceInfo};
pub use identity::{LoadContext, LoadOrigin, ModuleIdentity, ModuleKind};
pub use interop::{as_cjs_exports, as_esm_namespace};
pub use loader::{DeferredImport, ModuleLoader, ModuleLoaderBuilder};
pub use namespace::{BindingSource, Namespace};
pub use package::{PackageCache, PackageJson, PackageScope, MANIFEST};
pub use record::{Environment, ModuleRecord, ModuleState};
pub use resolver::Resolver;
pub use scope::ModuleScope;
