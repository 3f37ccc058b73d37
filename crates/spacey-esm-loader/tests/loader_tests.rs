// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module loader integration tests
//!
//! Module graphs live in a [`MemoryFs`] and their bodies are closures
//! registered on a [`ScriptedHost`].

use futures::FutureExt;
use spacey_esm_loader::host::{MemoryFs, NativeFs, ScriptedHost};
use spacey_esm_loader::module_system::ModuleCache;
use spacey_esm_loader::{
    CjsOptions, ErrorCode, LoadContext, LoaderError, LoaderOptions, Mode, ModuleIdentity,
    ModuleKind, ModuleLoader, ModuleScope, ModuleState, Object, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn loader(files: &[(&str, &str)], host: ScriptedHost) -> ModuleLoader {
    loader_with(files, host, LoaderOptions::default())
}

fn loader_with(files: &[(&str, &str)], host: ScriptedHost, options: LoaderOptions) -> ModuleLoader {
    ModuleLoader::new(
        Arc::new(MemoryFs::with_files(files.iter().copied())),
        Arc::new(host),
        options,
        "/app",
    )
}

fn esm(path: &str) -> ModuleIdentity {
    ModuleIdentity::new(path, ModuleKind::Esm)
}

fn cjs(path: &str) -> ModuleIdentity {
    ModuleIdentity::new(path, ModuleKind::CommonJs)
}

fn exports_of(scope: &ModuleScope<'_>) -> Object {
    scope.exports().as_object().cloned().unwrap()
}

fn cjs_paths() -> LoaderOptions {
    LoaderOptions {
        cjs: CjsOptions { paths: true },
        ..Default::default()
    }
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cache_get_or_create_is_idempotent() {
    let cache = ModuleCache::new();
    let id = cjs("/app/a.js");

    let (first, created) = cache.get_or_create(&id);
    assert!(created);
    let (second, created) = cache.get_or_create(&id);
    assert!(!created);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_module_body_runs_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let host = ScriptedHost::new().with("/app/a.js", move |scope| {
        counter.fetch_add(1, Ordering::SeqCst);
        scope.set_module_exports("a");
        Ok(())
    });
    let loader = loader(&[("/app/a.js", "module.exports = 'a'")], host);

    for specifier in ["./a", "./a.js", "/app/a.js"] {
        assert_eq!(loader.require(specifier, None).unwrap(), Value::from("a"));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(loader.cache().len(), 1);
}

// ============================================================================
// Linking and evaluation
// ============================================================================

#[test]
fn test_circular_imports_link() {
    let loader = loader(
        &[
            ("/app/a.mjs", "import { b } from './b.mjs'\nexport let a = 'A'"),
            ("/app/b.mjs", "import { a } from './a.mjs'\nexport let b = 'B'"),
        ],
        ScriptedHost::new(),
    );

    let root = loader
        .link("./a.mjs", &LoadContext::static_import(None))
        .unwrap();
    assert_eq!(root.dependencies(), vec![esm("/app/b.mjs")]);
    for path in ["/app/a.mjs", "/app/b.mjs"] {
        let record = loader.record(&esm(path)).unwrap();
        assert_eq!(record.state(), ModuleState::Linked);
    }
}

#[test]
fn test_circular_imports_evaluate_dependencies_first() {
    let host = ScriptedHost::new()
        .with("/app/a.mjs", |scope| {
            scope.set("a", "A")?;
            assert_eq!(scope.get("b")?, Value::from("B"));
            Ok(())
        })
        .with("/app/b.mjs", |scope| {
            let err = scope.get("a").unwrap_err();
            assert_eq!(
                err.to_string(),
                "ReferenceError: Cannot access 'a' before initialization"
            );
            scope.set("b", "B")
        });
    let loader = loader(
        &[
            ("/app/a.mjs", "import { b } from './b.mjs'\nexport let a = 'A'"),
            ("/app/b.mjs", "import { a } from './a.mjs'\nexport let b = 'B'"),
        ],
        host,
    );

    let ns = loader.import_static("./a.mjs", None).unwrap();
    assert_eq!(ns.get("a"), Some(Value::from("A")));

    let b = loader.record(&esm("/app/b.mjs")).unwrap();
    assert_eq!(b.state(), ModuleState::Evaluated);
    // b's import of `a` now sees the initialized binding
    assert_eq!(b.import_binding("a").unwrap().read(), Some(Value::from("A")));
}

#[test]
fn test_circular_require_returns_partial_exports() {
    let host = ScriptedHost::new()
        .with("/app/a.js", |scope| {
            exports_of(scope).set("early", true);
            let b = scope.require("./b")?;
            exports_of(scope).set("fromB", b.as_object().unwrap().get("seen").unwrap());
            exports_of(scope).set("done", true);
            Ok(())
        })
        .with("/app/b.js", |scope| {
            let a = scope.require("./a")?;
            let partial = a.as_object().unwrap();
            assert!(!partial.has("done"));
            exports_of(scope).set("seen", partial.get("early").unwrap_or_default());
            Ok(())
        });
    let loader = loader(
        &[
            ("/app/a.js", "exports.early = true; require('./b')"),
            ("/app/b.js", "require('./a')"),
        ],
        host,
    );

    let a = loader.require("./a", None).unwrap();
    let a = a.as_object().unwrap();
    assert_eq!(a.get("fromB"), Some(Value::from(true)));
    assert_eq!(a.get("done"), Some(Value::from(true)));
}

#[test]
fn test_esm_bindings_are_live() {
    let host = ScriptedHost::new().with("/app/counter.mjs", |scope| scope.set("count", 0));
    let loader = loader(
        &[
            ("/app/counter.mjs", "export let count = 0"),
            (
                "/app/main.mjs",
                "import { count } from './counter.mjs'\nexport { count }",
            ),
        ],
        host,
    );

    let ns = loader.import_static("./main.mjs", None).unwrap();
    assert_eq!(ns.get("count"), Some(Value::from(0)));

    let counter = loader.record(&esm("/app/counter.mjs")).unwrap();
    counter.environment().set("count", Value::from(1));
    assert_eq!(ns.get("count"), Some(Value::from(1)));
}

#[test]
fn test_evaluation_failure_reaches_dependents() {
    let host = ScriptedHost::new().with("/app/boom.mjs", |scope| {
        Err(LoaderError::thrown(scope.filename(), "boom"))
    });
    let loader = loader(
        &[
            ("/app/boom.mjs", "throw new Error('boom')"),
            ("/app/main.mjs", "import './boom.mjs'\nexport const after = 1"),
        ],
        host,
    );

    let err = loader.import_static("./main.mjs", None).unwrap_err();
    assert_eq!(err.to_string(), "boom");

    for path in ["/app/boom.mjs", "/app/main.mjs"] {
        let record = loader.record(&esm(path)).unwrap();
        assert_eq!(record.state(), ModuleState::Failed);
        assert_eq!(record.failure().unwrap().to_string(), "boom");
    }

    // Later loads observe the stored failure instead of re-running
    let again = loader.require("./main.mjs", None).unwrap_err();
    assert_eq!(again.to_string(), "boom");
}

#[test]
fn test_missing_export_fails_before_evaluation() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let host = ScriptedHost::new().with("/app/dep.mjs", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let loader = loader(
        &[
            ("/app/dep.mjs", "export const yes = 1"),
            ("/app/main.mjs", "import { nope } from './dep.mjs'"),
        ],
        host,
    );

    let err = loader.import_static("./main.mjs", None).unwrap_err();
    assert!(matches!(&err, LoaderError::MissingExport { name, .. } if name == "nope"));
    assert_eq!(
        err.to_string(),
        "The requested module './dep.mjs' does not provide an export named 'nope'"
    );
    assert_eq!(
        loader.record(&esm("/app/dep.mjs")).unwrap().state(),
        ModuleState::Linked
    );
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_ambiguous_star_exports_are_left_out() {
    let host = ScriptedHost::new()
        .with("/app/a.mjs", |scope| {
            scope.set("x", 1)?;
            scope.set("onlyA", "a")
        })
        .with("/app/b.mjs", |scope| scope.set("x", 2))
        .with("/app/both.mjs", |scope| scope.set("own", 3));
    let loader = loader(
        &[
            ("/app/a.mjs", "export const x = 1\nexport const onlyA = 'a'"),
            ("/app/b.mjs", "export const x = 2"),
            (
                "/app/both.mjs",
                "export * from './a.mjs'\nexport * from './b.mjs'\nexport const own = 3",
            ),
            ("/app/main.mjs", "import { x } from './both.mjs'"),
        ],
        host,
    );

    let ns = loader.import_static("./both.mjs", None).unwrap();
    assert_eq!(ns.keys(), vec!["onlyA", "own"]);
    assert_eq!(ns.get("onlyA"), Some(Value::from("a")));

    let err = loader.import_static("./main.mjs", None).unwrap_err();
    assert!(matches!(err, LoaderError::MissingExport { .. }));
}

// ============================================================================
// Interop
// ============================================================================

#[test]
fn test_require_of_esm_exposes_default_as_property() {
    let host = ScriptedHost::new()
        .with("/app/lib.mjs", |scope| {
            scope.set("name", "lib")?;
            scope.set_default("hello")
        })
        .with("/app/main.js", |scope| {
            let lib = scope.require("./lib.mjs")?;
            scope.set_module_exports(lib);
            Ok(())
        });
    let loader = loader(
        &[
            ("/app/lib.mjs", "export const name = 'lib'\nexport default 'hello'"),
            ("/app/main.js", "module.exports = require('./lib.mjs')"),
        ],
        host,
    );

    let exports = loader.require("./main.js", None).unwrap();
    let obj = exports.as_object().unwrap();
    assert_eq!(obj.keys(), vec!["default", "name"]);
    assert_eq!(obj.get("default"), Some(Value::from("hello")));
    assert_eq!(obj.get("name"), Some(Value::from("lib")));

    // The CommonJS view is shared once the module has evaluated
    let again = loader.require("./lib.mjs", None).unwrap();
    assert!(again.as_object().unwrap().ptr_eq(obj));
}

#[test]
fn test_import_of_commonjs_is_a_snapshot() {
    let host = ScriptedHost::new()
        .with("/app/counter.cjs", |scope| {
            exports_of(scope).set("count", 1);
            Ok(())
        })
        .with("/app/main.mjs", |scope| scope.set_default(scope.get("count")?));
    let loader = loader(
        &[
            ("/app/counter.cjs", "exports.count = 1"),
            (
                "/app/main.mjs",
                "import counter, { count } from './counter.cjs'\nexport default count",
            ),
        ],
        host,
    );

    let main = loader.import_static("./main.mjs", None).unwrap();
    assert_eq!(main.get("default"), Some(Value::from(1)));

    let counter = loader.record(&cjs("/app/counter.cjs")).unwrap();
    counter
        .module_exports()
        .as_object()
        .unwrap()
        .set("count", 2);

    let ns = loader.import_static("./counter.cjs", None).unwrap();
    assert_eq!(ns.keys(), vec!["count", "default"]);
    assert_eq!(ns.get("count"), Some(Value::from(1)));
    let default = ns.get("default").unwrap();
    assert_eq!(default.as_object().unwrap().get("count"), Some(Value::from(2)));

    let main_record = loader.record(&esm("/app/main.mjs")).unwrap();
    assert_eq!(
        main_record.import_binding("count").unwrap().read(),
        Some(Value::from(1))
    );
}

#[test]
fn test_import_of_json() {
    let loader = loader(
        &[
            ("/app/list.json", "[1, 2]"),
            ("/app/config.json", r#"{"port": 8080}"#),
        ],
        ScriptedHost::new(),
    );

    let list = loader.import_static("./list.json", None).unwrap();
    assert_eq!(list.keys(), vec!["0", "1", "default"]);
    let default = list.get("default").unwrap();
    assert_eq!(default.as_object().unwrap().get("length"), Some(Value::from(2)));

    let config = loader.import_static("./config.json", None).unwrap();
    assert_eq!(config.get("port"), Some(Value::from(8080)));
}

// ============================================================================
// Extensions and modes
// ============================================================================

fn tool_host() -> ScriptedHost {
    ScriptedHost::new().with("/app/bin/tool", |scope| {
        scope.set_module_exports("tool");
        Ok(())
    })
}

const TOOL_FILES: &[(&str, &str)] = &[
    ("/app/bin/tool", "module.exports = 'tool'"),
    ("/app/data.unknown", "module.exports = 'data'"),
];

#[test]
fn test_require_of_unknown_extensions() {
    let loader = loader(TOOL_FILES, tool_host());
    assert_eq!(loader.require("./bin/tool", None).unwrap(), Value::from("tool"));
    assert!(loader.require("./data.unknown", None).is_ok());
}

#[test]
fn test_import_of_unknown_extension_from_esm_is_rejected() {
    for options in [LoaderOptions::default(), cjs_paths()] {
        let loader = loader_with(TOOL_FILES, tool_host(), options);
        let err = loader
            .import_static("./bin/tool", Some(&esm("/app/main.mjs")))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnknownFileExtension));

        let err = loader
            .import_static("./data.unknown", Some(&esm("/app/main.mjs")))
            .unwrap_err();
        assert!(matches!(
            err,
            LoaderError::UnknownFileExtension { ref extension, .. } if extension == ".unknown"
        ));
    }
}

#[tokio::test]
async fn test_dynamic_import_of_unknown_extension_from_commonjs() {
    let allowed = loader_with(TOOL_FILES, tool_host(), cjs_paths());
    let ns = allowed
        .import("./bin/tool", Some(cjs("/app/main.js")))
        .await
        .unwrap();
    assert_eq!(ns.get("default"), Some(Value::from("tool")));

    let denied = loader(TOOL_FILES, tool_host());
    let err = denied
        .import("./bin/tool", Some(cjs("/app/main.js")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::UnknownFileExtension));
}

#[test]
fn test_cjs_paths_from_package_options() {
    let files = [
        ("/app/package.json", r#"{"esm": {"cjs": {"paths": true}}}"#),
        ("/app/bin/tool", "module.exports = 'tool'"),
    ];
    let loader = loader(&files, tool_host());
    let ns = loader
        .import_static("./bin/tool", Some(&cjs("/app/main.js")))
        .unwrap();
    assert_eq!(ns.get("default"), Some(Value::from("tool")));
}

const MIXED_FILES: &[(&str, &str)] = &[
    ("/app/main.mjs", "import './lib.js'"),
    ("/app/lib.js", "export const x = 1"),
];

#[test]
fn test_strict_mode_rejects_module_syntax_in_commonjs() {
    let loader = loader(MIXED_FILES, ScriptedHost::new());
    let err = loader.import_static("./main.mjs", None).unwrap_err();
    assert!(err.is_syntax());
    assert!(err.to_string().starts_with("Unexpected token export"));

    let lib = loader.record(&cjs("/app/lib.js")).unwrap();
    assert_eq!(lib.state(), ModuleState::Failed);
}

#[test]
fn test_auto_mode_reinterprets_js() {
    let host = ScriptedHost::new().with("/app/lib.js", |scope| scope.set("x", 1));
    let loader = loader_with(MIXED_FILES, host, LoaderOptions::with_mode(Mode::Auto));

    // Reinterpretation is refused for .mjs importers
    let err = loader.import_static("./main.mjs", None).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidEsmFileExtension));
    assert!(err.to_string().starts_with("Cannot load module"));

    let ns = loader.import_static("./lib.js", None).unwrap();
    assert_eq!(ns.get("x"), Some(Value::from(1)));
    assert_eq!(
        loader.record(&esm("/app/lib.js")).unwrap().kind(),
        ModuleKind::Esm
    );
}

// ============================================================================
// Dynamic import
// ============================================================================

#[tokio::test]
async fn test_dynamic_import_is_deferred() {
    let host = ScriptedHost::new().with("/app/lazy.mjs", |scope| scope.set("ready", true));
    let loader = loader(&[("/app/lazy.mjs", "export const ready = true")], host);

    let mut pending = loader.import("./lazy.mjs", None);
    assert!((&mut pending).now_or_never().is_none());
    assert!(loader.cache().is_empty());

    let ns = pending.await.unwrap();
    assert_eq!(ns.get("ready"), Some(Value::from(true)));
}

#[tokio::test]
async fn test_dynamic_import_rejects_with_code() {
    let loader = loader(&[], ScriptedHost::new());
    let err = loader.import("./missing.mjs", None).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::ModuleNotFound));
}

// ============================================================================
// Packages
// ============================================================================

#[test]
fn test_package_exports_conditions() {
    let loader = loader(
        &[
            (
                "/app/node_modules/pkg/package.json",
                r#"{
                    "name": "pkg",
                    "exports": {
                        ".": { "import": "./esm/index.mjs", "require": "./cjs/index.js" },
                        "./feature": "./lib/feature.js"
                    }
                }"#,
            ),
            ("/app/node_modules/pkg/esm/index.mjs", "export default 1"),
            ("/app/node_modules/pkg/cjs/index.js", "module.exports = 1"),
            ("/app/node_modules/pkg/lib/feature.js", "module.exports = 2"),
            (
                "/app/node_modules/typed/package.json",
                r#"{"type": "module", "main": "index.js"}"#,
            ),
            ("/app/node_modules/typed/index.js", "export default 3"),
        ],
        ScriptedHost::new(),
    );
    let from_esm = LoadContext::static_import(Some(esm("/app/src/main.mjs")));
    let from_cjs = LoadContext::require(Some(cjs("/app/src/main.js")));

    assert_eq!(
        loader.resolve("pkg", &from_cjs).unwrap(),
        cjs("/app/node_modules/pkg/cjs/index.js")
    );
    assert_eq!(
        loader.resolve("pkg", &from_esm).unwrap(),
        esm("/app/node_modules/pkg/esm/index.mjs")
    );
    assert_eq!(
        loader.resolve("pkg/feature", &from_cjs).unwrap(),
        cjs("/app/node_modules/pkg/lib/feature.js")
    );
    assert_eq!(
        loader.resolve("pkg/internal", &from_cjs).unwrap_err().code(),
        Some(ErrorCode::PackagePathNotExported)
    );
    assert_eq!(
        loader.resolve("typed", &from_cjs).unwrap(),
        esm("/app/node_modules/typed/index.js")
    );
}

// ============================================================================
// Host capabilities
// ============================================================================

#[test]
fn test_realm_prepared_from_default_global() {
    let default_global = Object::new();
    default_global.set("process", "host-process");
    default_global.set("global", Value::Object(default_global.clone()));

    let host = ScriptedHost::new().with("/app/main.js", |scope| {
        scope.set_module_exports(scope.global().get("process").unwrap_or_default());
        Ok(())
    });
    let loader = ModuleLoader::builder()
        .source(Arc::new(MemoryFs::with_files([("/app/main.js", "")])))
        .host(Arc::new(host))
        .base_dir("/app")
        .default_global(default_global.clone())
        .build();

    assert_eq!(
        loader.require("./main.js", None).unwrap(),
        Value::from("host-process")
    );
    let global = loader.realm().global();
    assert!(!global.ptr_eq(&default_global));
    assert!(global.get("global").unwrap().as_object().unwrap().ptr_eq(global));
}

#[test]
fn test_debug_introspection_shows_wrapper() {
    let files = [("/app/main.js", "module.exports = 1")];
    let host = || {
        ScriptedHost::new().with("/app/main.js", |scope| {
            scope.set_module_exports(scope.source().unwrap_or_default());
            Ok(())
        })
    };

    let plain = loader(&files, host()).require("./main.js", None).unwrap();
    assert_eq!(plain, Value::from("module.exports = 1"));

    let options = LoaderOptions {
        debug: true,
        ..Default::default()
    };
    let debug = loader_with(&files, host(), options)
        .require("./main.js", None)
        .unwrap();
    let text = debug.as_str().unwrap();
    assert!(text.starts_with("(function (exports, require, module, __filename, __dirname) {"));
    assert!(text.contains("module.exports = 1"));
}

#[test]
fn test_native_fs_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), r#"{"type": "module"}"#).unwrap();
    std::fs::write(dir.path().join("config.json"), r#"{"port": 8080}"#).unwrap();
    std::fs::write(
        dir.path().join("main.js"),
        "import config from './config.json'\nexport default config",
    )
    .unwrap();

    let loader = ModuleLoader::new(
        Arc::new(NativeFs::new()),
        Arc::new(ScriptedHost::new()),
        LoaderOptions::default(),
        dir.path(),
    );

    let config = loader.require("./config.json", None).unwrap();
    assert_eq!(config.as_object().unwrap().get("port"), Some(Value::from(8080)));

    match loader.run_main("./main.js").unwrap() {
        Value::Namespace(ns) => assert_eq!(ns.keys(), vec!["default"]),
        other => panic!("expected a namespace, got {}", other),
    }
}
