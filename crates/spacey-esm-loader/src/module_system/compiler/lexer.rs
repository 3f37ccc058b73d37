// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! A module-level lexer
//!
//! Only enough of the language is recognized to find import and export
//! declarations reliably: identifiers, punctuators, string, template and
//! regular expression literals. Comments and whitespace are skipped, and
//! line breaks are recorded so statement boundaries can be approximated.

/// Kind of a lexed token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword
    Ident(String),
    /// String literal with escapes decoded
    Str(String),
    /// Numeric literal
    Number,
    /// One chunk of a template literal
    Template,
    /// Regular expression literal
    Regex,
    /// Any other single character
    Punct(char),
}

/// A token with its position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// Whether a line break precedes the token
    pub newline_before: bool,
}

impl Token {
    /// Check for an identifier with the given name
    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(s) if s == name)
    }

    /// Check for the given punctuator
    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct(ch)
    }

    /// The identifier name, if this is one
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }

    /// Source-like rendering used in diagnostics
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Ident(s) => s.clone(),
            TokenKind::Str(s) => format!("'{}'", s),
            TokenKind::Number => "number".to_string(),
            TokenKind::Template => "template string".to_string(),
            TokenKind::Regex => "regular expression".to_string(),
            TokenKind::Punct(c) => c.to_string(),
        }
    }
}

/// Lexing failure
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    /// Message, e.g. `Invalid or unexpected token`
    pub message: String,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

/// Keywords after which a `/` starts a regular expression
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Keywords whose parenthesized head may be followed by a regex statement
const CONTROL_HEAD_KEYWORDS: &[&str] = &["if", "while", "for", "with"];

/// Tokenizes module source text
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    column: usize,
    saw_newline: bool,
    brace_depth: usize,
    /// Brace depths at which an open template substitution resumes
    template_stack: Vec<usize>,
    /// One entry per open `(`: whether it opens a control statement head
    paren_stack: Vec<bool>,
    /// Whether the last `)` closed a control statement head
    closed_control_head: bool,
    last_significant: Option<TokenKind>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `source`
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Self {
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            saw_newline: false,
            brace_depth: 0,
            template_stack: Vec::new(),
            paren_stack: Vec::new(),
            closed_control_head: false,
            last_significant: None,
        };
        if source.starts_with("#!") {
            lexer.skip_line();
        }
        lexer
    }

    /// Tokenize the whole input
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, ch) = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
            self.saw_newline = true;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, ch)| ch)
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> LexError {
        LexError {
            message: message.into(),
            line,
            column,
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') => match self.peek_next() {
                    Some('/') => self.skip_line(),
                    Some('*') => {
                        let (line, column) = (self.line, self.column);
                        self.advance();
                        self.advance();
                        let mut prev = ' ';
                        loop {
                            match self.advance() {
                                Some('/') if prev == '*' => break,
                                Some(ch) => prev = ch,
                                None => {
                                    return Err(self.error("Unterminated comment", line, column));
                                }
                            }
                        }
                    }
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_whitespace_and_comments()?;
        let (line, column) = (self.line, self.column);
        let newline_before = std::mem::take(&mut self.saw_newline);

        let Some(ch) = self.advance() else {
            return Ok(None);
        };

        let kind = match ch {
            '"' | '\'' => self.scan_string(ch, line, column)?,
            '`' => self.scan_template(line, column)?,
            '(' => {
                let control = matches!(
                    &self.last_significant,
                    Some(TokenKind::Ident(name)) if CONTROL_HEAD_KEYWORDS.contains(&name.as_str())
                );
                self.paren_stack.push(control);
                TokenKind::Punct('(')
            }
            ')' => {
                self.closed_control_head = self.paren_stack.pop().unwrap_or(false);
                TokenKind::Punct(')')
            }
            '{' => {
                self.brace_depth += 1;
                TokenKind::Punct('{')
            }
            '}' => {
                if self.template_stack.last() == Some(&self.brace_depth) {
                    self.template_stack.pop();
                    self.brace_depth -= 1;
                    self.scan_template(line, column)?
                } else {
                    self.brace_depth = self.brace_depth.saturating_sub(1);
                    TokenKind::Punct('}')
                }
            }
            '/' if self.regex_allowed() => self.scan_regex(line, column)?,
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.scan_number(),
            '0'..='9' => self.scan_number(),
            _ if is_id_start(ch) => self.scan_identifier(ch),
            '\\' => {
                return Err(self.error("Invalid or unexpected token", line, column));
            }
            _ => TokenKind::Punct(ch),
        };

        self.last_significant = Some(kind.clone());
        Ok(Some(Token {
            kind,
            line,
            column,
            newline_before,
        }))
    }

    fn regex_allowed(&self) -> bool {
        match &self.last_significant {
            None => true,
            Some(TokenKind::Punct(')')) => self.closed_control_head,
            Some(TokenKind::Punct(c)) => !matches!(c, ']' | '}'),
            Some(TokenKind::Ident(name)) => REGEX_PRECEDING_KEYWORDS.contains(&name.as_str()),
            Some(_) => false,
        }
    }

    fn scan_string(&mut self, quote: char, line: usize, column: usize) -> Result<TokenKind, LexError> {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    // Line continuation
                    Some('\n') => {}
                    Some(c) => value.push(c),
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => value.push(c),
            }
        }
        Err(self.error("Invalid or unexpected token", line, column))
    }

    /// Scan a template chunk up to the closing backtick or the next `${`
    fn scan_template(&mut self, line: usize, column: usize) -> Result<TokenKind, LexError> {
        loop {
            match self.advance() {
                Some('`') => return Ok(TokenKind::Template),
                Some('\\') => {
                    self.advance();
                }
                Some('$') if self.peek() == Some('{') => {
                    self.advance();
                    self.brace_depth += 1;
                    self.template_stack.push(self.brace_depth);
                    return Ok(TokenKind::Template);
                }
                Some(_) => {}
                None => return Err(self.error("Unterminated template literal", line, column)),
            }
        }
    }

    fn scan_regex(&mut self, line: usize, column: usize) -> Result<TokenKind, LexError> {
        let mut in_class = false;
        loop {
            match self.advance() {
                Some('\\') => {
                    self.advance();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some('\n') | None => {
                    return Err(self.error(
                        "Invalid regular expression: missing /",
                        line,
                        column,
                    ));
                }
                Some(_) => {}
            }
        }
        while self.peek().is_some_and(is_id_continue) {
            self.advance();
        }
        Ok(TokenKind::Regex)
    }

    fn scan_number(&mut self) -> TokenKind {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            self.advance();
        }
        TokenKind::Number
    }

    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let mut name = String::from(first);
        while let Some(ch) = self.peek() {
            if !is_id_continue(ch) {
                break;
            }
            name.push(ch);
            self.advance();
        }
        TokenKind::Ident(name)
    }
}

fn is_id_start(ch: char) -> bool {
    ch == '_' || ch == '$' || unicode_xid::UnicodeXID::is_xid_start(ch)
}

fn is_id_continue(ch: char) -> bool {
    ch == '_' || ch == '$' || unicode_xid::UnicodeXID::is_xid_continue(ch)
}
