// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader

use crate::value::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Stable error codes that calling code can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The specifier could not be mapped to a file
    ModuleNotFound,
    /// An `import` reached a file whose kind cannot be determined
    UnknownFileExtension,
    /// A `.js` file needing ESM reinterpretation was imported from `.mjs`
    InvalidEsmFileExtension,
    /// A package subpath is not listed in its `exports` field
    PackagePathNotExported,
    /// A `package.json` could not be parsed
    InvalidPackageConfig,
}

impl ErrorCode {
    /// The code string, e.g. `ERR_MODULE_NOT_FOUND`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ModuleNotFound => "ERR_MODULE_NOT_FOUND",
            ErrorCode::UnknownFileExtension => "ERR_UNKNOWN_FILE_EXTENSION",
            ErrorCode::InvalidEsmFileExtension => "ERR_INVALID_ESM_FILE_EXTENSION",
            ErrorCode::PackagePathNotExported => "ERR_PACKAGE_PATH_NOT_EXPORTED",
            ErrorCode::InvalidPackageConfig => "ERR_INVALID_PACKAGE_CONFIG",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while resolving, compiling or evaluating modules
///
/// Errors are cheap to clone so that a failed module can hand the very same
/// failure to every dependent that observes it.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    /// Module not found
    #[error("Cannot find module '{specifier}'{}", imported_from(.importer))]
    ModuleNotFound {
        /// The requested specifier
        specifier: String,
        /// The importing module, if any
        importer: Option<PathBuf>,
    },

    /// Import of a file without a recognized module extension
    #[error("Unknown file extension \"{extension}\" for {}", .path.display())]
    UnknownFileExtension {
        /// The extension, including the dot, or empty when there is none
        extension: String,
        /// The resolved file
        path: PathBuf,
    },

    /// A `.js` file that needs ESM reinterpretation imported from a `.mjs` file
    #[error("Cannot load module from .mjs: {}", .path.display())]
    InvalidEsmFileExtension {
        /// The resolved file
        path: PathBuf,
    },

    /// Subpath not exported by a package
    #[error("Package subpath '{subpath}' is not defined by \"exports\" in {}", .manifest.display())]
    PackagePathNotExported {
        /// The requested subpath, e.g. `./internal`
        subpath: String,
        /// The package manifest
        manifest: PathBuf,
    },

    /// Malformed package manifest
    #[error("Invalid package config {}: {reason}", .manifest.display())]
    InvalidPackageConfig {
        /// The package manifest
        manifest: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Compile-phase failure
    #[error("{message} ({}:{line}:{column})", .path.display())]
    Syntax {
        /// Message starting with the offending token
        message: String,
        /// File being compiled
        path: PathBuf,
        /// 1-based line
        line: usize,
        /// 1-based column
        column: usize,
    },

    /// A named import that the target module does not export
    #[error("The requested module '{specifier}' does not provide an export named '{name}'")]
    MissingExport {
        /// The specifier as written by the importer
        specifier: String,
        /// The missing export name
        name: String,
    },

    /// Value thrown by a module body
    #[error("{message}")]
    Evaluation {
        /// Module whose body threw
        module: PathBuf,
        /// Rendered message
        message: String,
        /// The thrown value
        thrown: Value,
    },

    /// The interop bridge cannot reconcile two export shapes
    #[error("TypeError: {0}")]
    Interop(String),

    /// Unknown binding
    #[error("ReferenceError: {0}")]
    Reference(String),

    /// Host I/O failure
    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        /// The file being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: Arc<std::io::Error>,
    },
}

fn imported_from(importer: &Option<PathBuf>) -> String {
    importer
        .as_ref()
        .map(|p| format!(" imported from {}", p.display()))
        .unwrap_or_default()
}

impl LoaderError {
    /// Create a module not found error
    pub fn module_not_found(specifier: impl Into<String>, importer: Option<PathBuf>) -> Self {
        Self::ModuleNotFound {
            specifier: specifier.into(),
            importer,
        }
    }

    /// Create an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Wrap a value thrown by the body of `module`
    pub fn thrown(module: impl Into<PathBuf>, thrown: impl Into<Value>) -> Self {
        let thrown = thrown.into();
        Self::Evaluation {
            module: module.into(),
            message: thrown.to_string(),
            thrown,
        }
    }

    /// Create an interop TypeError
    pub fn interop(msg: impl Into<String>) -> Self {
        Self::Interop(msg.into())
    }

    /// The stable code, for errors that carry one
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::ModuleNotFound { .. } => Some(ErrorCode::ModuleNotFound),
            Self::UnknownFileExtension { .. } => Some(ErrorCode::UnknownFileExtension),
            Self::InvalidEsmFileExtension { .. } => Some(ErrorCode::InvalidEsmFileExtension),
            Self::PackagePathNotExported { .. } => Some(ErrorCode::PackagePathNotExported),
            Self::InvalidPackageConfig { .. } => Some(ErrorCode::InvalidPackageConfig),
            _ => None,
        }
    }

    /// The script-visible error constructor name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Syntax { .. } | Self::MissingExport { .. } => "SyntaxError",
            Self::Interop(_) => "TypeError",
            Self::Reference(_) => "ReferenceError",
            _ => "Error",
        }
    }

    /// Whether the error belongs to the resolution family
    pub fn is_resolution(&self) -> bool {
        self.code().is_some()
    }

    /// Whether the error is a compile-phase SyntaxError
    pub fn is_syntax(&self) -> bool {
        self.name() == "SyntaxError"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err = LoaderError::module_not_found("./missing", Some(PathBuf::from("/app/a.js")));
        assert_eq!(err.code(), Some(ErrorCode::ModuleNotFound));
        assert_eq!(err.code().unwrap().as_str(), "ERR_MODULE_NOT_FOUND");
        assert_eq!(
            err.to_string(),
            "Cannot find module './missing' imported from /app/a.js"
        );
    }

    #[test]
    fn test_syntax_message_starts_with_token() {
        let err = LoaderError::Syntax {
            message: "Unexpected token export".into(),
            path: PathBuf::from("/app/a.js"),
            line: 1,
            column: 1,
        };
        assert!(err.to_string().starts_with("Unexpected token export"));
        assert_eq!(err.name(), "SyntaxError");
        assert!(err.code().is_none());
    }

    #[test]
    fn test_unknown_extension_message() {
        let err = LoaderError::UnknownFileExtension {
            extension: String::new(),
            path: PathBuf::from("/app/no-ext"),
        };
        assert_eq!(err.to_string(), "Unknown file extension \"\" for /app/no-ext");
    }

    #[test]
    fn test_thrown_renders_value() {
        let err = LoaderError::thrown("/app/a.js", "boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.name(), "Error");
    }
}
