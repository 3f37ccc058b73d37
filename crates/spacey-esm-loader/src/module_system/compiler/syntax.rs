// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Static import/export analysis over the token stream

use super::lexer::{Token, TokenKind};
use std::collections::HashSet;

/// Local name used for anonymous `export default` expressions
pub const DEFAULT_LOCAL: &str = "*default*";

/// What an import or indirect export takes from its target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportName {
    /// A single export (`default` included)
    Name(String),
    /// The whole namespace
    Namespace,
}

/// `import ... from 'specifier'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Requested specifier
    pub specifier: String,
    /// What is imported
    pub imported: ImportName,
    /// Local binding name
    pub local: String,
}

/// `export { local as exported }` and declaration exports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalExport {
    /// Exported name
    pub exported: String,
    /// Local binding name
    pub local: String,
}

/// `export { a as b } from 'x'` and `export * as ns from 'x'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectExport {
    /// Exported name
    pub exported: String,
    /// Requested specifier
    pub specifier: String,
    /// What is re-exported
    pub imported: ImportName,
}

/// Static shape of an ES module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSyntax {
    /// Static requests in source order, without duplicates
    pub requests: Vec<String>,
    /// Import bindings
    pub imports: Vec<ImportEntry>,
    /// Exports of local bindings
    pub local_exports: Vec<LocalExport>,
    /// Re-exports of single names or namespaces
    pub indirect_exports: Vec<IndirectExport>,
    /// `export * from` specifiers
    pub star_exports: Vec<String>,
    /// String-literal `import()` calls
    pub dynamic_imports: Vec<String>,
}

impl ModuleSyntax {
    /// Names exported without following star exports
    pub fn explicit_export_names(&self) -> impl Iterator<Item = &str> {
        self.local_exports
            .iter()
            .map(|e| e.exported.as_str())
            .chain(self.indirect_exports.iter().map(|e| e.exported.as_str()))
    }

    /// The import entry binding `local`, if any
    pub fn import_for_local(&self, local: &str) -> Option<&ImportEntry> {
        self.imports.iter().find(|i| i.local == local)
    }

    fn request(&mut self, specifier: &str) {
        if !self.requests.iter().any(|r| r == specifier) {
            self.requests.push(specifier.to_string());
        }
    }
}

/// What a CommonJS body mentions statically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonJsSyntax {
    /// String-literal `require()` calls
    pub requires: Vec<String>,
    /// String-literal `import()` calls
    pub dynamic_imports: Vec<String>,
}

/// Hints used by auto mode to re-probe ambiguous files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sniff {
    /// Top-level import or export declarations were found
    pub module_syntax: bool,
    /// `require()`, `module.exports` or `exports.*` were found
    pub commonjs_markers: bool,
}

/// A positioned syntax problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// Message starting with the offending token
    pub message: String,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Goal {
    Module,
    Script,
}

/// Analyze tokens as an ES module
pub fn analyze_module(tokens: &[Token]) -> Result<ModuleSyntax, SyntaxIssue> {
    let mut walker = Walker::new(tokens, Goal::Module);
    walker.run()?;
    walker.check_duplicates()?;
    Ok(walker.module)
}

/// Analyze tokens as a CommonJS script
pub fn analyze_script(tokens: &[Token]) -> Result<CommonJsSyntax, SyntaxIssue> {
    let mut walker = Walker::new(tokens, Goal::Script);
    walker.run()?;
    Ok(CommonJsSyntax {
        requires: walker.requires,
        dynamic_imports: walker.module.dynamic_imports,
    })
}

/// Look for module syntax and CommonJS markers without failing
pub fn sniff(tokens: &[Token]) -> Sniff {
    let mut walker = Walker::new(tokens, Goal::Module);
    walker.lenient = true;
    // Lenient walks record problems instead of returning them
    let _ = walker.run();
    Sniff {
        module_syntax: walker.saw_module_syntax,
        commonjs_markers: walker.saw_commonjs_markers,
    }
}

struct Walker<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    goal: Goal,
    lenient: bool,
    module: ModuleSyntax,
    requires: Vec<String>,
    /// Token positions of exports, for duplicate diagnostics
    export_sites: Vec<(String, usize)>,
    saw_module_syntax: bool,
    saw_commonjs_markers: bool,
}

impl<'t> Walker<'t> {
    fn new(tokens: &'t [Token], goal: Goal) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            goal,
            lenient: false,
            module: ModuleSyntax::default(),
            requires: Vec::new(),
            export_sites: Vec::new(),
            saw_module_syntax: false,
            saw_commonjs_markers: false,
        }
    }

    fn tok(&self, pos: usize) -> Option<&'t Token> {
        self.tokens.get(pos)
    }

    fn issue_at(&self, pos: usize, message: String) -> SyntaxIssue {
        match self.tok(pos).or_else(|| self.tokens.last()) {
            Some(tok) => SyntaxIssue {
                message,
                line: tok.line,
                column: tok.column,
            },
            None => SyntaxIssue {
                message,
                line: 1,
                column: 1,
            },
        }
    }

    fn unexpected(&self, pos: usize) -> SyntaxIssue {
        match self.tok(pos) {
            Some(tok) => self.issue_at(pos, format!("Unexpected token {}", tok.describe())),
            None => self.issue_at(pos, "Unexpected end of input".to_string()),
        }
    }

    fn prev_is(&self, pos: usize, ch: char) -> bool {
        pos > 0 && self.tokens[pos - 1].is_punct(ch)
    }

    /// Whether the token at `pos` follows a `...` spread
    fn is_spread(&self, pos: usize) -> bool {
        pos >= 3 && (1..=3).all(|back| self.tokens[pos - back].is_punct('.'))
    }

    fn next_is(&self, pos: usize, ch: char) -> bool {
        self.tok(pos + 1).is_some_and(|t| t.is_punct(ch))
    }

    fn at_statement_start(&self, pos: usize) -> bool {
        if pos == 0 || self.tokens[pos].newline_before {
            return true;
        }
        let prev = &self.tokens[pos - 1];
        prev.is_punct(';') || prev.is_punct('}') || prev.is_punct('{')
    }

    /// `import`/`export` used as a property name, member or method
    fn is_property_use(&self, pos: usize) -> bool {
        self.prev_is(pos, '.')
            || self.prev_is(pos, '#')
            || (self.depth > 0 && (self.next_is(pos, ':') || self.next_is(pos, '(')))
    }

    fn run(&mut self) -> Result<(), SyntaxIssue> {
        while let Some(tok) = self.tok(self.pos) {
            match &tok.kind {
                TokenKind::Punct('{' | '(' | '[') => self.depth += 1,
                TokenKind::Punct('}' | ')' | ']') => self.depth = self.depth.saturating_sub(1),
                TokenKind::Ident(name) => match name.as_str() {
                    "import" if !self.is_property_use(self.pos) => {
                        if let Some(next) = self.import_keyword()? {
                            self.pos = next;
                            continue;
                        }
                    }
                    "export" if !self.is_property_use(self.pos) => {
                        let next = self.export_keyword()?;
                        self.pos = next;
                        continue;
                    }
                    "require" if !self.prev_is(self.pos, '.') => self.require_call(),
                    "module" if !self.prev_is(self.pos, '.') => {
                        if self.next_is(self.pos, '.')
                            && self.tok(self.pos + 2).is_some_and(|t| t.is_ident("exports"))
                        {
                            self.saw_commonjs_markers = true;
                        }
                    }
                    "exports" if !self.prev_is(self.pos, '.') => {
                        if self.next_is(self.pos, '.') || self.next_is(self.pos, '[') {
                            self.saw_commonjs_markers = true;
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
            self.pos += 1;
        }
        Ok(())
    }

    fn string_at(&self, pos: usize) -> Option<&'t str> {
        match self.tok(pos).map(|t| &t.kind) {
            Some(TokenKind::Str(s)) => Some(s),
            _ => None,
        }
    }

    fn require_call(&mut self) {
        if !self.next_is(self.pos, '(') {
            return;
        }
        self.saw_commonjs_markers = true;
        if let Some(spec) = self.string_at(self.pos + 2) {
            if self.tok(self.pos + 3).is_some_and(|t| t.is_punct(')')) {
                self.requires.push(spec.to_string());
            }
        }
    }

    /// Handle an `import` token; returns the resume position for declarations
    fn import_keyword(&mut self) -> Result<Option<usize>, SyntaxIssue> {
        let pos = self.pos;
        if self.next_is(pos, '(') {
            if let Some(spec) = self.string_at(pos + 2) {
                let closes = self
                    .tok(pos + 3)
                    .is_some_and(|t| t.is_punct(')') || t.is_punct(','));
                if closes {
                    self.module.dynamic_imports.push(spec.to_string());
                }
            }
            return Ok(None);
        }
        if self.next_is(pos, '.') {
            // import.meta
            return Ok(None);
        }

        if self.depth == 0 && self.at_statement_start(pos) {
            self.saw_module_syntax = true;
        }
        if self.goal == Goal::Script || self.depth > 0 || !self.at_statement_start(pos) {
            return self.fail(pos, "Unexpected token import".to_string()).map(|_| None);
        }

        match self.import_declaration(pos + 1) {
            Ok(next) => Ok(Some(next)),
            Err(issue) => self.fail_with(issue).map(|_| Some(pos + 1)),
        }
    }

    fn export_keyword(&mut self) -> Result<usize, SyntaxIssue> {
        let pos = self.pos;
        if self.depth == 0 && self.at_statement_start(pos) {
            self.saw_module_syntax = true;
        }
        if self.goal == Goal::Script || self.depth > 0 || !self.at_statement_start(pos) {
            self.fail(pos, "Unexpected token export".to_string())?;
            return Ok(pos + 1);
        }
        match self.export_declaration(pos + 1) {
            Ok(next) => Ok(next),
            Err(issue) => self.fail_with(issue).map(|_| pos + 1),
        }
    }

    fn fail(&self, pos: usize, message: String) -> Result<(), SyntaxIssue> {
        self.fail_with(self.issue_at(pos, message))
    }

    fn fail_with(&self, issue: SyntaxIssue) -> Result<(), SyntaxIssue> {
        if self.lenient {
            Ok(())
        } else {
            Err(issue)
        }
    }

    fn expect_ident(&self, pos: usize, name: &str) -> Result<usize, SyntaxIssue> {
        if self.tok(pos).is_some_and(|t| t.is_ident(name)) {
            Ok(pos + 1)
        } else {
            Err(self.unexpected(pos))
        }
    }

    fn binding_ident(&self, pos: usize) -> Result<String, SyntaxIssue> {
        self.tok(pos)
            .and_then(|t| t.ident())
            .map(str::to_string)
            .ok_or_else(|| self.unexpected(pos))
    }

    /// Identifier or string module export name
    fn export_name(&self, pos: usize) -> Result<String, SyntaxIssue> {
        match self.tok(pos).map(|t| &t.kind) {
            Some(TokenKind::Ident(s)) | Some(TokenKind::Str(s)) => Ok(s.clone()),
            _ => Err(self.unexpected(pos)),
        }
    }

    fn specifier(&self, pos: usize) -> Result<String, SyntaxIssue> {
        self.string_at(pos)
            .map(str::to_string)
            .ok_or_else(|| self.unexpected(pos))
    }

    /// Skip `with { ... }` / `assert { ... }` attributes and a trailing `;`
    fn finish_clause(&self, mut pos: usize) -> usize {
        let has_attributes = self
            .tok(pos)
            .is_some_and(|t| (t.is_ident("with") || t.is_ident("assert")) && !t.newline_before)
            && self.next_is(pos, '{');
        if has_attributes {
            pos += 1;
            while let Some(tok) = self.tok(pos) {
                pos += 1;
                if tok.is_punct('}') {
                    break;
                }
            }
        }
        if self.tok(pos).is_some_and(|t| t.is_punct(';')) {
            pos += 1;
        }
        pos
    }

    fn import_declaration(&mut self, mut pos: usize) -> Result<usize, SyntaxIssue> {
        if let Some(spec) = self.string_at(pos) {
            self.module.request(spec);
            return Ok(self.finish_clause(pos + 1));
        }

        let mut bindings = Vec::new();
        if let Some(local) = self.tok(pos).and_then(|t| t.ident()) {
            if local != "from" || self.string_at(pos + 1).is_none() {
                bindings.push((ImportName::Name("default".to_string()), local.to_string()));
                pos += 1;
                if self.tok(pos).is_some_and(|t| t.is_punct(',')) {
                    pos += 1;
                } else {
                    return self.import_from(pos, bindings);
                }
            }
        }

        match self.tok(pos) {
            Some(t) if t.is_punct('*') => {
                pos = self.expect_ident(pos + 1, "as")?;
                bindings.push((ImportName::Namespace, self.binding_ident(pos)?));
                pos += 1;
            }
            Some(t) if t.is_punct('{') => {
                pos += 1;
                loop {
                    if self.tok(pos).is_some_and(|t| t.is_punct('}')) {
                        pos += 1;
                        break;
                    }
                    let imported = self.export_name(pos)?;
                    let mut local = imported.clone();
                    pos += 1;
                    if self.tok(pos).is_some_and(|t| t.is_ident("as")) {
                        local = self.binding_ident(pos + 1)?;
                        pos += 2;
                    } else if matches!(self.tok(pos - 1).map(|t| &t.kind), Some(TokenKind::Str(_))) {
                        return Err(self.unexpected(pos));
                    }
                    bindings.push((ImportName::Name(imported), local));
                    match self.tok(pos) {
                        Some(t) if t.is_punct(',') => pos += 1,
                        Some(t) if t.is_punct('}') => {}
                        _ => return Err(self.unexpected(pos)),
                    }
                }
            }
            _ => return Err(self.unexpected(pos)),
        }

        self.import_from(pos, bindings)
    }

    fn import_from(
        &mut self,
        pos: usize,
        bindings: Vec<(ImportName, String)>,
    ) -> Result<usize, SyntaxIssue> {
        let pos = self.expect_ident(pos, "from")?;
        let specifier = self.specifier(pos)?;
        self.module.request(&specifier);
        for (imported, local) in bindings {
            self.module.imports.push(ImportEntry {
                specifier: specifier.clone(),
                imported,
                local,
            });
        }
        Ok(self.finish_clause(pos + 1))
    }

    fn add_local_export(&mut self, exported: String, local: String, site: usize) {
        self.export_sites.push((exported.clone(), site));
        self.module.local_exports.push(LocalExport { exported, local });
    }

    fn add_indirect_export(&mut self, export: IndirectExport, site: usize) {
        self.export_sites.push((export.exported.clone(), site));
        self.module.indirect_exports.push(export);
    }

    /// Parse what follows `export`; returns where the main walk resumes
    fn export_declaration(&mut self, pos: usize) -> Result<usize, SyntaxIssue> {
        let site = pos - 1;
        let Some(tok) = self.tok(pos) else {
            return Err(self.unexpected(pos));
        };

        match &tok.kind {
            TokenKind::Ident(word) => match word.as_str() {
                "default" => {
                    let local = self.default_local(pos + 1);
                    self.add_local_export("default".to_string(), local, site);
                    Ok(pos + 1)
                }
                "var" | "let" | "const" => {
                    for name in self.declarator_names(pos + 1)? {
                        self.add_local_export(name.clone(), name, site);
                    }
                    Ok(pos + 1)
                }
                "function" | "class" | "async" => {
                    let mut p = pos;
                    if word == "async" {
                        p = self.expect_ident(p + 1, "function")?;
                    } else {
                        p += 1;
                    }
                    if self.tok(p).is_some_and(|t| t.is_punct('*')) {
                        p += 1;
                    }
                    let name = self.binding_ident(p)?;
                    self.add_local_export(name.clone(), name, site);
                    Ok(pos + 1)
                }
                _ => Err(self.unexpected(pos)),
            },
            TokenKind::Punct('*') => {
                let mut p = pos + 1;
                let alias = if self.tok(p).is_some_and(|t| t.is_ident("as")) {
                    let alias = self.export_name(p + 1)?;
                    p += 2;
                    Some(alias)
                } else {
                    None
                };
                p = self.expect_ident(p, "from")?;
                let specifier = self.specifier(p)?;
                self.module.request(&specifier);
                match alias {
                    Some(exported) => self.add_indirect_export(
                        IndirectExport {
                            exported,
                            specifier,
                            imported: ImportName::Namespace,
                        },
                        site,
                    ),
                    None => self.module.star_exports.push(specifier),
                }
                Ok(self.finish_clause(p + 1))
            }
            TokenKind::Punct('{') => self.export_list(pos + 1, site),
            _ => Err(self.unexpected(pos)),
        }
    }

    fn export_list(&mut self, mut pos: usize, site: usize) -> Result<usize, SyntaxIssue> {
        let mut pairs = Vec::new();
        loop {
            if self.tok(pos).is_some_and(|t| t.is_punct('}')) {
                pos += 1;
                break;
            }
            let local = self.export_name(pos)?;
            pos += 1;
            let exported = if self.tok(pos).is_some_and(|t| t.is_ident("as")) {
                pos += 2;
                self.export_name(pos - 1)?
            } else {
                local.clone()
            };
            pairs.push((local, exported));
            match self.tok(pos) {
                Some(t) if t.is_punct(',') => pos += 1,
                Some(t) if t.is_punct('}') => {}
                _ => return Err(self.unexpected(pos)),
            }
        }

        if self.tok(pos).is_some_and(|t| t.is_ident("from")) {
            let specifier = self.specifier(pos + 1)?;
            self.module.request(&specifier);
            for (imported, exported) in pairs {
                self.add_indirect_export(
                    IndirectExport {
                        exported,
                        specifier: specifier.clone(),
                        imported: ImportName::Name(imported),
                    },
                    site,
                );
            }
            return Ok(self.finish_clause(pos + 2));
        }

        for (local, exported) in pairs {
            self.add_local_export(exported, local, site);
        }
        Ok(self.finish_clause(pos))
    }

    /// Local binding of `export default ...` starting at `pos`
    fn default_local(&self, pos: usize) -> String {
        let mut p = pos;
        if self.tok(p).is_some_and(|t| t.is_ident("async"))
            && self.tok(p + 1).is_some_and(|t| t.is_ident("function"))
        {
            p += 1;
        }
        let named = match self.tok(p).and_then(|t| t.ident()) {
            Some("function") => {
                p += 1;
                if self.tok(p).is_some_and(|t| t.is_punct('*')) {
                    p += 1;
                }
                self.tok(p).and_then(|t| t.ident())
            }
            Some("class") => self
                .tok(p + 1)
                .and_then(|t| t.ident())
                .filter(|name| *name != "extends"),
            _ => None,
        };
        named.unwrap_or(DEFAULT_LOCAL).to_string()
    }

    /// Binding names of `var`/`let`/`const` declarators starting at `pos`
    fn declarator_names(&self, mut pos: usize) -> Result<Vec<String>, SyntaxIssue> {
        let mut names = Vec::new();
        loop {
            match self.tok(pos) {
                Some(t) if t.is_punct('{') || t.is_punct('[') => {
                    pos = self.pattern_names(pos, &mut names)?;
                }
                Some(_) => {
                    names.push(self.binding_ident(pos)?);
                    pos += 1;
                }
                None => return Err(self.unexpected(pos)),
            }
            pos = self.skip_initializer(pos);
            if self.tok(pos).is_some_and(|t| t.is_punct(',')) {
                pos += 1;
            } else {
                return Ok(names);
            }
        }
    }

    /// Collect names bound by a destructuring pattern; returns the position
    /// after its closing bracket
    fn pattern_names(&self, mut pos: usize, names: &mut Vec<String>) -> Result<usize, SyntaxIssue> {
        let mut depth = 0usize;
        let mut in_default = false;
        while let Some(tok) = self.tok(pos) {
            match &tok.kind {
                TokenKind::Punct('{' | '[' | '(') => depth += 1,
                TokenKind::Punct('}' | ']' | ')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(pos + 1);
                    }
                }
                TokenKind::Punct(',') => in_default = false,
                TokenKind::Punct('=') => in_default = true,
                TokenKind::Ident(name) if !in_default => {
                    let is_key = self.next_is(pos, ':');
                    let is_member = self.prev_is(pos, '.') && !self.is_spread(pos);
                    if !is_key && !is_member {
                        names.push(name.clone());
                    }
                }
                _ => {}
            }
            pos += 1;
        }
        Err(self.unexpected(pos))
    }

    /// Skip `= expression` up to the next declarator or the end of statement
    fn skip_initializer(&self, mut pos: usize) -> usize {
        if !self.tok(pos).is_some_and(|t| t.is_punct('=')) {
            return pos;
        }
        pos += 1;
        let mut depth = 0usize;
        while let Some(tok) = self.tok(pos) {
            match &tok.kind {
                TokenKind::Punct('{' | '(' | '[') => depth += 1,
                TokenKind::Punct('}' | ')' | ']') => {
                    if depth == 0 {
                        return pos;
                    }
                    depth -= 1;
                }
                TokenKind::Punct(',' | ';') if depth == 0 => return pos,
                _ if depth == 0 && tok.newline_before && self.ends_expression(pos - 1) => {
                    if !is_continuation(tok) {
                        return pos;
                    }
                }
                _ => {}
            }
            pos += 1;
        }
        pos
    }

    fn ends_expression(&self, pos: usize) -> bool {
        match &self.tokens[pos].kind {
            TokenKind::Punct(c) => matches!(c, ')' | ']' | '}'),
            _ => true,
        }
    }

    fn check_duplicates(&self) -> Result<(), SyntaxIssue> {
        let mut seen = HashSet::new();
        for (name, site) in &self.export_sites {
            if !seen.insert(name.as_str()) {
                return Err(self.issue_at(*site, format!("Duplicate export of '{}'", name)));
            }
        }
        Ok(())
    }
}

/// Tokens that continue an expression across a line break
fn is_continuation(tok: &Token) -> bool {
    match &tok.kind {
        TokenKind::Punct(c) => matches!(
            c,
            '.' | '?' | ':' | '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '&' | '|' | '^'
                | ',' | '(' | '['
        ),
        TokenKind::Template => true,
        TokenKind::Ident(word) => matches!(word.as_str(), "instanceof" | "in"),
        _ => false,
    }
}
