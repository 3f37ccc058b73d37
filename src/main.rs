// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! spacey-esm CLI - inspect how modules resolve, link and evaluate
//!
//! ## Commands
//!
//! - `resolve`: print the identity a specifier resolves to
//! - `graph`: print the static import graph of an entry point
//! - `check`: compile and link an entry point, reporting the first error
//! - `run`: link and evaluate an entry point with empty module bodies

mod report;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use spacey_esm_loader::host::{NativeFs, ScriptedHost, SourceProvider};
use spacey_esm_loader::module_system::MANIFEST;
use spacey_esm_loader::{
    LoadContext, LoaderError, LoaderOptions, Mode, ModuleIdentity, ModuleKind, ModuleLoader,
    OptionOverrides,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "spacey-esm",
    about = "Inspect ES module resolution, linking and evaluation",
    version,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base directory entry points resolve against
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Kind mismatch leniency
    #[arg(long, global = true, value_enum)]
    mode: Option<ModeArg>,

    /// Allow import() of extensionless files from CommonJS modules
    #[arg(long, global = true)]
    cjs_paths: bool,

    /// Report wrapped sources instead of declared ones
    #[arg(long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a specifier
    Resolve {
        /// The specifier to resolve
        specifier: String,

        /// Importing file; entry point resolution when absent
        #[arg(long)]
        from: Option<PathBuf>,

        /// Resolve with import semantics instead of require
        #[arg(long)]
        import: bool,
    },
    /// Print the static import graph of an entry point
    Graph {
        /// Entry point
        entry: String,
    },
    /// Compile and link an entry point
    Check {
        /// Entry point
        entry: String,
    },
    /// Link and evaluate an entry point with empty module bodies
    Run {
        /// Entry point
        entry: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Strict,
    Auto,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => Mode::Strict,
            ModeArg::Auto => Mode::Auto,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("spacey_esm=debug,spacey_esm_loader=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("spacey_esm=warn,spacey_esm_loader=warn")
            .init();
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let base_dir = match &cli.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };
    let source: Arc<dyn SourceProvider> = Arc::new(NativeFs::new());
    let (options, overrides) = load_options(&cli, source.as_ref(), &base_dir)?;
    tracing::debug!(?options, ?overrides, "effective options");

    let loader = ModuleLoader::builder()
        .source(source)
        .host(Arc::new(ScriptedHost::new()))
        .options(options)
        .overrides(overrides)
        .base_dir(&base_dir)
        .build();

    let outcome = match &cli.command {
        Command::Resolve {
            specifier,
            from,
            import,
        } => resolve(&loader, specifier, from.as_deref(), *import, &base_dir),
        Command::Graph { entry } => loader
            .link(entry, &LoadContext::require(None))
            .map(|record| report::print_graph(&record)),
        Command::Check { entry } => loader.link(entry, &LoadContext::require(None)).map(|record| {
            println!(
                "{} {} ({} modules)",
                "ok".green().bold(),
                record.identity(),
                loader.cache().len()
            );
        }),
        Command::Run { entry } => loader
            .run_main(entry)
            .map(|value| report::print_value(&value)),
    };

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            report::print_error(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn resolve(
    loader: &ModuleLoader,
    specifier: &str,
    from: Option<&Path>,
    import: bool,
    base_dir: &Path,
) -> Result<(), LoaderError> {
    let importer = match from {
        Some(path) => {
            let path = spacey_esm_loader::host::normalize_path(&base_dir.join(path));
            let kind_ctx = LoadContext::require(None);
            let kind = loader
                .resolve(&path.display().to_string(), &kind_ctx)
                .map(|id| id.kind())
                .unwrap_or(ModuleKind::CommonJs);
            Some(ModuleIdentity::new(path, kind))
        }
        None => None,
    };

    let ctx = if import {
        LoadContext::static_import(importer)
    } else {
        LoadContext::require(importer)
    };
    let identity = loader.resolve(specifier, &ctx)?;
    report::print_identity(&identity);
    Ok(())
}

/// Options precedence: flags > `ESM_OPTIONS` > package manifests > defaults
///
/// Returns the root manifest's options, used for modules outside any
/// package, and the overrides forced over every package.
fn load_options(
    cli: &Cli,
    source: &dyn SourceProvider,
    base_dir: &Path,
) -> anyhow::Result<(LoaderOptions, OptionOverrides)> {
    let mut options = LoaderOptions::default();

    let manifest = base_dir.join(MANIFEST);
    if source.is_file(&manifest) {
        let text = source
            .read_source(&manifest)
            .with_context(|| format!("cannot read {}", manifest.display()))?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("invalid {}", manifest.display()))?;
        if let Some(field) = json.get("esm") {
            options = LoaderOptions::from_manifest_field(field)
                .with_context(|| format!("invalid \"esm\" field in {}", manifest.display()))?;
        }
    }

    let env = match OptionOverrides::from_env() {
        Some(parsed) => parsed.context("invalid ESM_OPTIONS")?,
        None => OptionOverrides::default(),
    };
    let flags = OptionOverrides {
        mode: cli.mode.map(Mode::from),
        cjs_paths: cli.cjs_paths.then_some(true),
        debug: cli.debug.then_some(true),
        extensions: None,
    };
    Ok((options, env.merge(flags)))
}
