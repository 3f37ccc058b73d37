// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Terminal output for the CLI

use owo_colors::OwoColorize;
use spacey_esm_loader::{LoaderError, ModuleIdentity, ModuleKind, ModuleRecord, Value};
use std::collections::HashSet;
use std::sync::Arc;

pub fn print_identity(identity: &ModuleIdentity) {
    println!("{} {}", kind_label(identity.kind()), identity);
}

pub fn print_graph(root: &Arc<ModuleRecord>) {
    let mut seen = HashSet::new();
    print_node(root, "", None, &mut seen);
}

fn print_node(
    record: &Arc<ModuleRecord>,
    indent: &str,
    specifier: Option<&str>,
    seen: &mut HashSet<ModuleIdentity>,
) {
    let label = match specifier {
        Some(spec) => format!("{} {}", spec.cyan(), record.identity().dimmed()),
        None => record.identity().to_string(),
    };
    let first_visit = seen.insert(record.identity().clone());
    println!(
        "{}{} {} [{}]{}",
        indent,
        kind_label(record.kind()),
        label,
        record.state(),
        if first_visit { "" } else { " (cycle)" }
    );
    if !first_visit {
        return;
    }

    let child_indent = format!("{}  ", indent);
    for (spec, dep) in record.requests() {
        print_node(&dep, &child_indent, Some(&spec), seen);
    }
}

pub fn print_value(value: &Value) {
    match value {
        Value::Namespace(ns) => {
            println!("{} {}", "namespace".bold(), ns.module());
            for (key, value) in ns.entries() {
                println!("  {} = {}", key.cyan(), value);
            }
        }
        Value::Object(obj) => {
            println!("{}", "exports".bold());
            for (key, value) in obj.entries() {
                println!("  {} = {}", key.cyan(), value);
            }
        }
        other => println!("{}", other),
    }
}

pub fn print_error(error: &LoaderError) {
    match error.code() {
        Some(code) => eprintln!(
            "{} [{}]: {}",
            error.name().red().bold(),
            code.yellow(),
            error
        ),
        None => eprintln!("{}: {}", error.name().red().bold(), error),
    }
}

fn kind_label(kind: ModuleKind) -> String {
    match kind {
        ModuleKind::Esm => kind.as_str().green().to_string(),
        ModuleKind::CommonJs => kind.as_str().blue().to_string(),
        ModuleKind::Json => kind.as_str().magenta().to_string(),
        ModuleKind::Unknown => kind.as_str().yellow().to_string(),
    }
}
