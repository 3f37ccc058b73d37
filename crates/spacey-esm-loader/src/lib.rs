// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-esm-loader
//!
//! ECMAScript module semantics for CommonJS-based script hosts.
//!
//! The loader decides, for any specifier and importing module, which file to
//! load, whether it runs as CommonJS or as an ES module, and how the two
//! module systems see each other's exports. It handles:
//!
//! - Resolution of relative, absolute and `node_modules` specifiers,
//!   including `package.json` `exports`, `main` and `type`
//! - Static import/export analysis and two-phase link/evaluate
//! - Live bindings, circular imports and circular `require()`
//! - Dynamic `import()` as a future
//! - CommonJS <-> ESM interop
//!
//! The script engine is not part of this crate. Source reads go through a
//! [`SourceProvider`](host::SourceProvider), and compiled units run on a
//! [`ScriptHost`](host::ScriptHost).
//!
//! ## Quick Start
//!
//! ```rust
//! use spacey_esm_loader::host::{MemoryFs, ScriptedHost};
//! use spacey_esm_loader::{LoaderOptions, ModuleLoader, Value};
//! use std::sync::Arc;
//!
//! let fs = MemoryFs::with_files([
//!     ("/app/greeting.mjs", "export default 'hello'"),
//!     ("/app/main.js", "module.exports = require('./greeting.mjs').default"),
//! ]);
//! let host = ScriptedHost::new()
//!     .with("/app/greeting.mjs", |scope| scope.set_default("hello"))
//!     .with("/app/main.js", |scope| {
//!         let greeting = scope.require("./greeting.mjs")?;
//!         let default = greeting.as_object().and_then(|o| o.get("default"));
//!         scope.set_module_exports(default.unwrap_or_default());
//!         Ok(())
//!     });
//!
//! let loader = ModuleLoader::new(
//!     Arc::new(fs),
//!     Arc::new(host),
//!     LoaderOptions::default(),
//!     "/app",
//! );
//! assert_eq!(loader.require("./main.js", None).unwrap(), Value::from("hello"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod host;
pub mod module_system;
pub mod value;

// Re-exports
pub use config::{CjsOptions, LoaderOptions, Mode, OptionOverrides, OPTIONS_ENV};
pub use error::{ErrorCode, LoaderError, Result};
pub use module_system::{
    DeferredImport, LoadContext, LoadOrigin, ModuleIdentity, ModuleKind, ModuleLoader,
    ModuleLoaderBuilder, ModuleRecord, ModuleScope, ModuleState, Namespace,
};
pub use value::{Object, Value};
