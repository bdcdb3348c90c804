// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `.reg` importer: logical lines in, store mutations out.
//!
//! The importer is a two-state machine. With no key open, only a header
//! line does anything; once a header has opened (created) a key, each
//! assignment line sets one value on it. A bad line is counted, logged at
//! `debug`, and skipped. A bad header also closes the current key so the
//! assignments under it are ignored.
//!
//! Logical lines are physical lines joined by a trailing backslash: the
//! backslash is dropped and the next physical line is appended in place.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use regscript_store::RegistryStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::grammar::{parse_line, LineError, Statement};
use crate::reader::{CodeUnit, Encoding, LineReader};
use crate::ScriptError;

/// Import settings, loadable from a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Fail a multi-file import when two sources claim the same identifier.
    pub deny_conflicts: bool,
}

/// Counters for one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    /// Logical lines seen (blank and comment lines included).
    pub lines: usize,
    /// Headers that opened a key.
    pub keys_opened: usize,
    /// Values written.
    pub values_set: usize,
    /// Malformed lines and store failures.
    pub skipped: usize,
    /// Lines with no key open (banner, orphaned assignments).
    pub ignored: usize,
}

/// A parsed line together with its 1-based starting line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// First physical line of the logical line.
    pub line: usize,
    /// What the line parsed to.
    pub statement: Result<Statement, LineError>,
}

/// Applies logical lines to a store.
#[derive(Debug)]
pub struct Importer<'a, S: RegistryStore> {
    store: &'a mut S,
    current: Option<S::Key>,
    stats: ImportStats,
}

impl<'a, S: RegistryStore> Importer<'a, S> {
    /// Start with no key open.
    pub fn new(store: &'a mut S) -> Self {
        Self {
            store,
            current: None,
            stats: ImportStats::default(),
        }
    }

    /// `true` while a header has opened a key.
    pub fn has_open_key(&self) -> bool {
        self.current.is_some()
    }

    /// Counters so far.
    pub fn stats(&self) -> ImportStats {
        self.stats
    }

    /// Apply one logical line.
    pub fn apply(&mut self, line_no: usize, line: &str, encoding: Encoding) {
        self.stats.lines += 1;
        let Some(parsed) = parse_line(line, encoding) else {
            return;
        };
        match parsed {
            Ok(Statement::Header(path)) => match self.store.create_path(&path) {
                Ok(key) => {
                    self.current = Some(key);
                    self.stats.keys_opened += 1;
                }
                Err(err) => {
                    warn!(line = line_no, %path, %err, "cannot open key");
                    self.current = None;
                    self.stats.skipped += 1;
                }
            },
            Ok(Statement::Assignment { name, value }) => {
                let Some(key) = &self.current else {
                    self.stats.ignored += 1;
                    return;
                };
                match self.store.set_value(key, name.as_deref(), value) {
                    Ok(()) => self.stats.values_set += 1,
                    Err(err) => {
                        warn!(line = line_no, ?name, %err, "cannot set value");
                        self.stats.skipped += 1;
                    }
                }
            }
            Err(err) if err.closes_key() => {
                debug!(line = line_no, %err, "skipping header");
                self.current = None;
                self.stats.skipped += 1;
            }
            Err(_) if self.current.is_none() => self.stats.ignored += 1,
            Err(err) => {
                debug!(line = line_no, %err, "skipping line");
                self.stats.skipped += 1;
            }
        }
    }

    /// Close any open key and return the counters.
    pub fn finish(self) -> ImportStats {
        self.stats
    }
}

/// Import a `.reg` byte stream into `store`.
///
/// # Errors
///
/// [`ScriptError::UnsupportedEncoding`] for a UTF-32 marker. Bad lines are
/// skipped, not reported.
#[instrument(skip_all)]
pub fn import_reg<R: Read, S: RegistryStore>(
    source: R,
    store: &mut S,
) -> Result<ImportStats, ScriptError> {
    let mut importer = Importer::new(store);
    let encoding = for_each_line(source, |line_no, line, encoding| {
        importer.apply(line_no, line, encoding);
    })?;
    let stats = importer.finish();
    info!(
        %encoding,
        keys = stats.keys_opened,
        values = stats.values_set,
        skipped = stats.skipped,
        "import complete"
    );
    Ok(stats)
}

/// Import a `.reg` file into `store`.
///
/// # Errors
///
/// [`ScriptError::StreamOpen`] if the file cannot be opened, otherwise as
/// [`import_reg`].
pub fn import_reg_file<S: RegistryStore>(
    path: &Path,
    store: &mut S,
) -> Result<ImportStats, ScriptError> {
    let file = File::open(path).map_err(|source| ScriptError::StreamOpen {
        path: path.to_path_buf(),
        source,
    })?;
    import_reg(file, store)
}

/// Parse a `.reg` stream without a store.
///
/// Follows the importer's key state: assignments and unparseable lines with
/// no key open are dropped, everything else is returned in order.
///
/// # Errors
///
/// As [`import_reg`].
pub fn parse_statements<R: Read>(source: R) -> Result<Vec<ParsedLine>, ScriptError> {
    let mut open = false;
    let mut out = Vec::new();
    for_each_line(source, |line, text, encoding| {
        let Some(statement) = parse_line(text, encoding) else {
            return;
        };
        match &statement {
            Ok(Statement::Header(_)) => open = true,
            Err(err) if err.closes_key() => open = false,
            _ if !open => return,
            _ => {}
        }
        out.push(ParsedLine { line, statement });
    })?;
    Ok(out)
}

/// Feed every logical line of `source` to `f`; returns the detected encoding.
pub(crate) fn for_each_line<R: Read>(
    source: R,
    mut f: impl FnMut(usize, &str, Encoding),
) -> Result<Encoding, ScriptError> {
    let mut reader = LineReader::new(source);
    let encoding = reader.read_bom()?;
    if encoding.is_wide() {
        scan_units::<u16, R>(&mut reader, encoding, &mut f);
    } else {
        scan_units::<u8, R>(&mut reader, encoding, &mut f);
    }
    Ok(encoding)
}

fn scan_units<U: CodeUnit, R: Read>(
    reader: &mut LineReader<R>,
    encoding: Encoding,
    f: &mut impl FnMut(usize, &str, Encoding),
) {
    let eol = reader.eol();
    let mut buffer: Vec<U> = Vec::new();
    let mut physical = 0;
    loop {
        let first = physical + 1;
        let mut prior = 0;
        loop {
            let len = reader.read_line(&mut buffer, eol, prior);
            if len == prior {
                // end of input; a pending continuation ends here
                break;
            }
            physical += 1;
            let trimmed = trim_end(&buffer);
            buffer.truncate(trimmed);
            // only the newly read part may carry a continuation
            if trimmed > prior && is_unit(buffer[trimmed - 1], b'\\') {
                while buffer.last().is_some_and(|&unit| is_unit(unit, b'\\')) {
                    buffer.pop();
                }
                prior = buffer.len();
                continue;
            }
            break;
        }
        if physical < first {
            return;
        }
        f(first, &U::decode_text(&buffer, encoding), encoding);
    }
}

fn is_unit<U: CodeUnit>(unit: U, byte: u8) -> bool {
    unit.byte() == Some(byte)
}

fn trim_end<U: CodeUnit>(units: &[U]) -> usize {
    units
        .iter()
        .rposition(|&unit| !matches!(unit.byte(), Some(b' ' | b'\t' | b'\r' | b'\n')))
        .map_or(0, |at| at + 1)
}
