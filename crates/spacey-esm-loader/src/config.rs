// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader options
//!
//! Options come from the `esm` field of a `package.json`, from the
//! `ESM_OPTIONS` environment variable, or are built in code. Every package
//! may carry its own `esm` field; those options govern the modules inside
//! that package. [`OptionOverrides`] sit above all of them and win over
//! every package's field.

use serde::{Deserialize, Serialize};

/// Name of the environment variable holding loader options
pub const OPTIONS_ENV: &str = "ESM_OPTIONS";

/// How strictly module kinds are enforced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The declared kind is final; mismatched syntax is a SyntaxError
    #[default]
    Strict,
    /// Ambiguous `.js` files are re-probed by their syntax
    Auto,
}

/// CommonJS compatibility switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CjsOptions {
    /// Allow dynamic `import()` from CommonJS modules to reach extensionless
    /// and unknown-extension files
    pub paths: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CjsField {
    Flag(bool),
    Options(CjsOptions),
}

fn deserialize_cjs<'de, D>(deserializer: D) -> std::result::Result<CjsOptions, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match CjsField::deserialize(deserializer)? {
        CjsField::Flag(enabled) => CjsOptions { paths: enabled },
        CjsField::Options(options) => options,
    })
}

/// Options consumed by the resolver and executor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Kind mismatch leniency
    pub mode: Mode,
    /// CommonJS compatibility switches (`true` enables all of them)
    #[serde(deserialize_with = "deserialize_cjs")]
    pub cjs: CjsOptions,
    /// Report synthesized wrappers instead of declared sources
    pub debug: bool,
    /// Extension probe order; the default depends on the importer's kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OptionsField {
    Mode(Mode),
    Options(LoaderOptions),
}

impl LoaderOptions {
    /// Options with the given mode and defaults otherwise
    pub fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parse an options document: a JSON object, or a bare mode word such as
    /// `auto` or `"strict"`
    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        let text = text.trim();
        match text {
            "auto" => return Ok(Self::with_mode(Mode::Auto)),
            "strict" => return Ok(Self::with_mode(Mode::Strict)),
            _ => {}
        }
        let field: OptionsField = serde_json::from_str(text)?;
        Ok(Self::from_field(field))
    }

    /// Interpret the `esm` field of a manifest
    pub fn from_manifest_field(
        value: &serde_json::Value,
    ) -> std::result::Result<Self, serde_json::Error> {
        let field = OptionsField::deserialize(value)?;
        Ok(Self::from_field(field))
    }

    fn from_field(field: OptionsField) -> Self {
        match field {
            OptionsField::Mode(mode) => Self::with_mode(mode),
            OptionsField::Options(options) => options,
        }
    }

    /// Read options from `ESM_OPTIONS`, if set
    pub fn from_env() -> Option<std::result::Result<Self, serde_json::Error>> {
        let raw = std::env::var(OPTIONS_ENV).ok()?;
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self::parse(&raw))
    }
}

/// Option fields forced on every module, regardless of package options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionOverrides {
    /// Forced mode
    pub mode: Option<Mode>,
    /// Forced `cjs.paths`
    pub cjs_paths: Option<bool>,
    /// Forced `debug`
    pub debug: Option<bool>,
    /// Forced extension probe order
    pub extensions: Option<Vec<String>>,
}

impl OptionOverrides {
    /// Parse an options document, keeping only the fields it names
    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        let options = LoaderOptions::parse(text)?;
        let fields = match serde_json::from_str::<serde_json::Value>(text.trim()) {
            Ok(serde_json::Value::Object(map)) => map,
            // A bare mode word names only the mode
            _ => {
                return Ok(Self {
                    mode: Some(options.mode),
                    ..Self::default()
                });
            }
        };

        Ok(Self {
            mode: fields.contains_key("mode").then_some(options.mode),
            cjs_paths: fields.contains_key("cjs").then_some(options.cjs.paths),
            debug: fields.contains_key("debug").then_some(options.debug),
            extensions: options.extensions.filter(|_| fields.contains_key("extensions")),
        })
    }

    /// Read overrides from `ESM_OPTIONS`, if set
    pub fn from_env() -> Option<std::result::Result<Self, serde_json::Error>> {
        let raw = std::env::var(OPTIONS_ENV).ok()?;
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self::parse(&raw))
    }

    /// Layer `other` on top of these overrides
    pub fn merge(mut self, other: OptionOverrides) -> Self {
        self.mode = other.mode.or(self.mode);
        self.cjs_paths = other.cjs_paths.or(self.cjs_paths);
        self.debug = other.debug.or(self.debug);
        self.extensions = other.extensions.or(self.extensions);
        self
    }

    /// Whether no field is forced
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Force the named fields onto `options`
    pub fn apply(&self, options: &mut LoaderOptions) {
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if let Some(paths) = self.cjs_paths {
            options.cjs.paths = paths;
        }
        if let Some(debug) = self.debug {
            options.debug = debug;
        }
        if let Some(extensions) = &self.extensions {
            options.extensions = Some(extensions.clone());
        }
    }
}
