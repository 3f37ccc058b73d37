// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Source providers backed by the OS file system or by memory

use super::SourceProvider;
use dashmap::DashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path, resolving `.` and `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Reads sources from the OS file system
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFs;

impl NativeFs {
    /// Create a provider over the OS file system
    pub fn new() -> Self {
        Self
    }
}

impl SourceProvider for NativeFs {
    fn read_source(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| normalize_path(path))
    }
}

/// In-memory source tree
///
/// Directories exist implicitly as ancestors of stored files.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: DashMap<PathBuf, String>,
}

impl MemoryFs {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree pre-populated with `(path, source)` pairs
    pub fn with_files<P, S>(files: impl IntoIterator<Item = (P, S)>) -> Self
    where
        P: AsRef<Path>,
        S: Into<String>,
    {
        let fs = Self::new();
        for (path, source) in files {
            fs.insert(path, source);
        }
        fs
    }

    /// Add or replace a file
    pub fn insert(&self, path: impl AsRef<Path>, source: impl Into<String>) {
        self.files
            .insert(normalize_path(path.as_ref()), source.into());
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files are stored
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SourceProvider for MemoryFs {
    fn read_source(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(&normalize_path(path))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize_path(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let dir = normalize_path(path);
        self.files
            .iter()
            .any(|entry| entry.key() != &dir && entry.key().starts_with(&dir))
    }
}
