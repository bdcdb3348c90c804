// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `.rgs` loader, the reverse of [`crate::export`].
//!
//! ```text
//! script := root*
//! root   := ROOT-ALIAS block
//! block  := '{' item* '}'
//! item   := 'val' name '=' value
//!         | 'Delete' name block?
//!         | ('NoRemove' | 'ForceRemove')* name ('=' value)? block?
//! value  := ('s' | 'd' | 'b') QUOTED
//! name   := WORD | QUOTED
//! ```
//!
//! Quoted text doubles `'` to escape it. `%NAME%` is replaced from a
//! [`Substitutions`] table and `%%` is a literal `%`, in words and quoted
//! text alike. `Delete` subtrees are parsed and skipped; removal flags are
//! accepted and ignored. Any syntax error aborts the load.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regscript_store::{RegistryStore, RootKey, Value};
use tracing::{debug, info, instrument};

use crate::ScriptError;

/// `%NAME%` replacement table. Names match ignoring ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitutions {
    table: BTreeMap<String, String>,
}

impl Substitutions {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace `name`.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.table.insert(name.to_ascii_uppercase(), value.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Replacement for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.table.get(&name.to_ascii_uppercase()).map(String::as_str)
    }

    /// Expand `%NAME%` and `%%` in `text`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Syntax`] for an unknown name or an unclosed `%`.
    pub fn expand(&self, text: &str, line: usize) -> Result<String, ScriptError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(at) = rest.find('%') {
            out.push_str(&rest[..at]);
            let after = &rest[at + 1..];
            let end = after.find('%').ok_or_else(|| syntax(line, "unclosed '%'"))?;
            let name = &after[..end];
            if name.is_empty() {
                out.push('%');
            } else {
                let value = self
                    .get(name)
                    .ok_or_else(|| syntax(line, format!("unknown substitution %{name}%")))?;
                out.push_str(value);
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Counters for one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Keys created or opened, roots excluded.
    pub keys: usize,
    /// Values written.
    pub values: usize,
    /// `Delete` blocks skipped.
    pub deletes_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Open,
    Close,
    Equals,
}

fn syntax(line: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Syntax {
        line,
        message: message.into(),
    }
}

fn tokenize(text: &str, subs: &Substitutions) -> Result<Vec<(usize, Token)>, ScriptError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '{' => tokens.push((line, Token::Open)),
            '}' => tokens.push((line, Token::Close)),
            '=' => tokens.push((line, Token::Equals)),
            '\'' => {
                let start = line;
                let mut raw = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            raw.push('\'');
                        }
                        Some('\'') => break,
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            raw.push(c);
                        }
                        None => return Err(syntax(start, "unterminated quoted string")),
                    }
                }
                tokens.push((start, Token::Quoted(subs.expand(&raw, start)?)));
            }
            c => {
                let mut raw = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '{' | '}' | '=' | '\'') {
                        break;
                    }
                    raw.push(next);
                    chars.next();
                }
                tokens.push((line, Token::Word(subs.expand(&raw, line)?)));
            }
        }
    }
    Ok(tokens)
}

struct Loader<'s, S: RegistryStore> {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    store: &'s mut S,
    stats: LoadStats,
}

impl<S: RegistryStore> Loader<'_, S> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |(line, _)| *line)
    }

    fn advance(&mut self) -> Result<Token, ScriptError> {
        let line = self.line();
        let token = self
            .tokens
            .get(self.pos)
            .map(|(_, token)| token.clone())
            .ok_or_else(|| syntax(line, "unexpected end of script"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, want: &Token, what: &str) -> Result<(), ScriptError> {
        let line = self.line();
        if &self.advance()? == want {
            Ok(())
        } else {
            Err(syntax(line, format!("expected {what}")))
        }
    }

    fn name(&mut self) -> Result<String, ScriptError> {
        let line = self.line();
        match self.advance()? {
            Token::Word(name) | Token::Quoted(name) => Ok(name),
            _ => Err(syntax(line, "expected a name")),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn value(&mut self) -> Result<Value, ScriptError> {
        let line = self.line();
        let kind = match self.advance()? {
            Token::Word(kind) => kind,
            _ => return Err(syntax(line, "expected a value kind")),
        };
        let text = match self.advance()? {
            Token::Quoted(text) => text,
            _ => return Err(syntax(line, "expected a quoted value")),
        };
        match kind.to_ascii_lowercase().as_str() {
            "s" => Ok(Value::string(&text)),
            "d" => parse_number(&text)
                .map(Value::int32)
                .ok_or_else(|| syntax(line, format!("bad number {text:?}"))),
            "b" => parse_binary(&text)
                .map(Value::binary)
                .ok_or_else(|| syntax(line, format!("bad binary {text:?}"))),
            other => Err(syntax(line, format!("unknown value kind {other:?}"))),
        }
    }

    fn script(&mut self) -> Result<(), ScriptError> {
        while self.peek().is_some() {
            while self.is_keyword("NoRemove") || self.is_keyword("ForceRemove") {
                self.pos += 1;
            }
            let line = self.line();
            let alias = self.name()?;
            let root = RootKey::from_alias(&alias)
                .ok_or_else(|| syntax(line, format!("unknown root {alias:?}")))?;
            let key = self.store.root(root);
            self.block(Some(&key))?;
        }
        Ok(())
    }

    /// Parse `{ item* }`, applying items to `target` unless it is `None`.
    fn block(&mut self, target: Option<&S::Key>) -> Result<(), ScriptError> {
        self.expect(&Token::Open, "'{'")?;
        while self.peek() != Some(&Token::Close) {
            self.item(target)?;
        }
        self.pos += 1;
        Ok(())
    }

    fn item(&mut self, target: Option<&S::Key>) -> Result<(), ScriptError> {
        if self.is_keyword("val") {
            self.pos += 1;
            let name = self.name()?;
            self.expect(&Token::Equals, "'='")?;
            let value = self.value()?;
            if let Some(key) = target {
                self.store.set_value(key, Some(&name), value)?;
                self.stats.values += 1;
            }
            return Ok(());
        }
        if self.is_keyword("Delete") {
            self.pos += 1;
            let name = self.name()?;
            debug!(key = %name, "skipping Delete block");
            self.stats.deletes_skipped += 1;
            if self.peek() == Some(&Token::Open) {
                self.block(None)?;
            }
            return Ok(());
        }
        while self.is_keyword("NoRemove") || self.is_keyword("ForceRemove") {
            self.pos += 1;
        }
        let name = self.name()?;
        let key = match target {
            Some(parent) => {
                self.stats.keys += 1;
                Some(self.store.create_key(parent, &name)?)
            }
            None => None,
        };
        if self.peek() == Some(&Token::Equals) {
            self.pos += 1;
            let value = self.value()?;
            if let Some(key) = &key {
                self.store.set_value(key, None, value)?;
                self.stats.values += 1;
            }
        }
        if self.peek() == Some(&Token::Open) {
            self.block(key.as_ref())?;
        }
        Ok(())
    }
}

fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn parse_binary(text: &str) -> Option<Vec<u8>> {
    hex::decode(text.trim()).ok()
}

/// Apply an `.rgs` script to `store`.
///
/// # Errors
///
/// [`ScriptError::Syntax`] on the first parse error, [`ScriptError::Store`]
/// if the store rejects a key or value. Items before the error stay applied.
#[instrument(skip_all)]
pub fn load_rgs<S: RegistryStore>(
    text: &str,
    store: &mut S,
    subs: &Substitutions,
) -> Result<LoadStats, ScriptError> {
    let tokens = tokenize(text, subs)?;
    let mut loader = Loader {
        tokens,
        pos: 0,
        store,
        stats: LoadStats::default(),
    };
    loader.script()?;
    info!(keys = loader.stats.keys, values = loader.stats.values, "script loaded");
    Ok(loader.stats)
}

/// Read and apply an `.rgs` file.
///
/// # Errors
///
/// [`ScriptError::StreamOpen`] if the file cannot be read, otherwise as
/// [`load_rgs`].
pub fn load_rgs_file<S: RegistryStore>(
    path: &Path,
    store: &mut S,
    subs: &Substitutions,
) -> Result<LoadStats, ScriptError> {
    let bytes = fs::read(path).map_err(|source| ScriptError::StreamOpen {
        path: path.to_path_buf(),
        source,
    })?;
    load_rgs(&String::from_utf8_lossy(&bytes), store, subs)
}
