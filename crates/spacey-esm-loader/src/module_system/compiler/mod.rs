// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module compilation
//!
//! Turns source text into an [`ExecutableUnit`] the host can run:
//!
//! - CommonJS and unknown kinds get the classic function wrapper
//! - ES modules get a static import/export analysis before anything runs
//! - JSON is parsed into a [`Value`]

pub mod lexer;
pub mod syntax;

pub use syntax::{
    CommonJsSyntax, ImportEntry, ImportName, IndirectExport, LocalExport, ModuleSyntax, Sniff,
    DEFAULT_LOCAL,
};

use crate::error::{LoaderError, Result};
use crate::module_system::{ModuleIdentity, ModuleKind};
use crate::value::Value;
use lexer::{LexError, Lexer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use syntax::SyntaxIssue;

/// Opening of the CommonJS function wrapper
pub const CJS_WRAPPER_HEAD: &str =
    "(function (exports, require, module, __filename, __dirname) {\n";

/// Closing of the CommonJS function wrapper
pub const CJS_WRAPPER_TAIL: &str = "\n})";

/// Source text preserved for introspection
#[derive(Debug, Clone)]
pub struct SourceInfo {
    path: PathBuf,
    source: Arc<str>,
    wrapped: Option<Arc<str>>,
    line_offset: usize,
}

impl SourceInfo {
    fn plain(path: &Path, source: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            source: Arc::from(source),
            wrapped: None,
            line_offset: 0,
        }
    }

    fn wrapped(path: &Path, source: &str) -> Self {
        let wrapped = format!("{}{}{}", CJS_WRAPPER_HEAD, source, CJS_WRAPPER_TAIL);
        Self {
            path: path.to_path_buf(),
            source: Arc::from(source),
            wrapped: Some(Arc::from(wrapped)),
            line_offset: CJS_WRAPPER_HEAD.matches('\n').count(),
        }
    }

    /// File the source came from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The source as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The synthesized wrapper, for CommonJS units
    pub fn wrapper(&self) -> Option<&str> {
        self.wrapped.as_deref()
    }

    /// Lines the wrapper adds before the declared source
    pub fn line_offset(&self) -> usize {
        self.line_offset
    }

    /// Source reported to introspection (`toString`, stack frames)
    ///
    /// The declared source is reported unless `debug` is set, in which case
    /// the code that actually runs is shown.
    pub fn introspect(&self, debug: bool) -> &str {
        match (&self.wrapped, debug) {
            (Some(wrapped), true) => wrapped,
            _ => &self.source,
        }
    }
}

/// A compiled CommonJS body
#[derive(Debug, Clone)]
pub struct ScriptUnit {
    /// Preserved source
    pub info: SourceInfo,
    /// Static `require()`/`import()` literals
    pub syntax: CommonJsSyntax,
}

/// A compiled ES module
#[derive(Debug, Clone)]
pub struct ModuleUnit {
    /// Preserved source
    pub info: SourceInfo,
    /// Static imports and exports
    pub syntax: ModuleSyntax,
}

/// A parsed JSON document
#[derive(Debug, Clone)]
pub struct JsonUnit {
    /// Preserved source
    pub info: SourceInfo,
    /// The parsed document
    pub value: Value,
}

/// A compiled module, ready to hand to the host
#[derive(Debug, Clone)]
pub enum ExecutableUnit {
    /// CommonJS (also used for unknown extensions)
    CommonJs(ScriptUnit),
    /// ES module
    Esm(ModuleUnit),
    /// JSON module
    Json(JsonUnit),
}

impl ExecutableUnit {
    /// Source metadata
    pub fn info(&self) -> &SourceInfo {
        match self {
            ExecutableUnit::CommonJs(unit) => &unit.info,
            ExecutableUnit::Esm(unit) => &unit.info,
            ExecutableUnit::Json(unit) => &unit.info,
        }
    }

    /// The compiled file
    pub fn path(&self) -> &Path {
        self.info().path()
    }

    /// Static module structure, for ES modules
    pub fn module_syntax(&self) -> Option<&ModuleSyntax> {
        match self {
            ExecutableUnit::Esm(unit) => Some(&unit.syntax),
            _ => None,
        }
    }

    /// Kind the unit executes as
    pub fn kind(&self) -> ModuleKind {
        match self {
            ExecutableUnit::CommonJs(_) => ModuleKind::CommonJs,
            ExecutableUnit::Esm(_) => ModuleKind::Esm,
            ExecutableUnit::Json(_) => ModuleKind::Json,
        }
    }
}

/// Source to [`ExecutableUnit`] compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler;

impl Compiler {
    /// Create a compiler
    pub fn new() -> Self {
        Self
    }

    /// Compile `source` for `identity` under `kind`
    pub fn compile(
        &self,
        source: &str,
        identity: &ModuleIdentity,
        kind: ModuleKind,
    ) -> Result<ExecutableUnit> {
        let path = identity.path();
        tracing::trace!(path = %path.display(), kind = %kind, "compiling");

        match kind {
            ModuleKind::Esm => {
                let tokens = Lexer::new(source)
                    .tokenize()
                    .map_err(|e| lex_error(path, e))?;
                let syntax =
                    syntax::analyze_module(&tokens).map_err(|e| syntax_error(path, e))?;
                Ok(ExecutableUnit::Esm(ModuleUnit {
                    info: SourceInfo::plain(path, source),
                    syntax,
                }))
            }
            ModuleKind::CommonJs | ModuleKind::Unknown => {
                let tokens = Lexer::new(source)
                    .tokenize()
                    .map_err(|e| lex_error(path, e))?;
                let syntax =
                    syntax::analyze_script(&tokens).map_err(|e| syntax_error(path, e))?;
                Ok(ExecutableUnit::CommonJs(ScriptUnit {
                    info: SourceInfo::wrapped(path, source),
                    syntax,
                }))
            }
            ModuleKind::Json => {
                let json: serde_json::Value =
                    serde_json::from_str(source).map_err(|e| LoaderError::Syntax {
                        message: if e.is_eof() {
                            "Unexpected end of JSON input".to_string()
                        } else {
                            "Unexpected token in JSON".to_string()
                        },
                        path: path.to_path_buf(),
                        line: e.line(),
                        column: e.column(),
                    })?;
                Ok(ExecutableUnit::Json(JsonUnit {
                    info: SourceInfo::plain(path, source),
                    value: Value::from_json(&json),
                }))
            }
        }
    }
}

/// Sniff `source` for module syntax and CommonJS markers
///
/// Sources that do not even tokenize report nothing.
pub fn sniff(source: &str) -> Sniff {
    match Lexer::new(source).tokenize() {
        Ok(tokens) => syntax::sniff(&tokens),
        Err(_) => Sniff::default(),
    }
}

fn lex_error(path: &Path, e: LexError) -> LoaderError {
    LoaderError::Syntax {
        message: e.message,
        path: path.to_path_buf(),
        line: e.line,
        column: e.column,
    }
}

fn syntax_error(path: &Path, e: SyntaxIssue) -> LoaderError {
    LoaderError::Syntax {
        message: e.message,
        path: path.to_path_buf(),
        line: e.line,
        column: e.column,
    }
}
