// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `.reg` line grammar.
//!
//! Each logical line is one of:
//!
//! ```text
//! [HKCR\CLSID\{..}]          header: open (create) a key
//! @="Sample Component"       default value
//! "ThreadingModel"="Both"    quoted string
//! "Flags"=dword:0000001f     Int32
//! "Data"=hex(2):41,00,42,00  typed bytes; hex: alone is Binary
//! ; comment
//! ```
//!
//! Parsing never touches a store; [`crate::import`] applies the resulting
//! [`Statement`]s.

use regscript_store::{KeyPath, Value, ValueType};
use thiserror::Error;

use crate::reader::Encoding;

/// One parsed logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `[path]`: assignments that follow apply to this key.
    Header(KeyPath),
    /// `name=value`; `name = None` is the default value (`@`).
    Assignment {
        /// Value name, unquoted and unescaped.
        name: Option<String>,
        /// Decoded payload.
        value: Value,
    },
}

/// Why a line was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// `[..]` with an unknown root, empty component or missing `]`.
    #[error("bad key header {0:?}")]
    BadHeader(String),
    /// `[-path]`.
    #[error("key deletion is not supported")]
    KeyDeletion,
    /// No unquoted `=` on the line.
    #[error("not an assignment")]
    NoAssignment,
    /// `name=-`.
    #[error("value deletion is not supported")]
    ValueDeletion,
    /// Right-hand side is not a quoted string, `dword:` or `hex..:`.
    #[error("unsupported value {0:?}")]
    UnsupportedValue(String),
    /// `dword:` without 1 to 8 hex digits.
    #[error("bad dword {0:?}")]
    BadDword(String),
    /// A `hex` list item is not a byte.
    #[error("bad hex byte {0:?}")]
    BadHex(String),
    /// `hex(N):` with a code that maps to no supported type.
    #[error("unknown value type code {0:?}")]
    UnknownTypeCode(String),
}

impl LineError {
    /// `true` when the failed line was a header, so no key stays open.
    pub const fn closes_key(&self) -> bool {
        matches!(self, Self::BadHeader(_) | Self::KeyDeletion)
    }
}

/// Parse one logical line. Blank lines and `;` comments yield `None`.
///
/// `encoding` is the source encoding; it decides whether `hex` string
/// payloads are widened (see [`widen`]).
pub fn parse_line(line: &str, encoding: Encoding) -> Option<Result<Statement, LineError>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') {
        return None;
    }
    if line.starts_with('[') {
        return Some(parse_header(line).map(Statement::Header));
    }
    Some(parse_assignment(line, encoding))
}

/// Parse `[path]`.
///
/// # Errors
///
/// [`LineError::KeyDeletion`] for `[-path]`, [`LineError::BadHeader`] otherwise.
pub fn parse_header(line: &str) -> Result<KeyPath, LineError> {
    let inner = line
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| LineError::BadHeader(line.to_owned()))?
        .trim();
    if inner.starts_with('-') {
        return Err(LineError::KeyDeletion);
    }
    KeyPath::parse(inner).map_err(|_| LineError::BadHeader(inner.to_owned()))
}

/// Parse `name=value`.
///
/// # Errors
///
/// Any [`LineError`] other than the header variants.
pub fn parse_assignment(line: &str, encoding: Encoding) -> Result<Statement, LineError> {
    let (lhs, rhs) = split_assignment(line).ok_or(LineError::NoAssignment)?;
    let lhs = lhs.trim();
    let name = if lhs == "@" {
        None
    } else if let Some(quoted) = unquote(lhs) {
        // `""` also names the default value
        Some(unescape(quoted)).filter(|name| !name.is_empty())
    } else if lhs.is_empty() {
        return Err(LineError::NoAssignment);
    } else {
        Some(lhs.to_owned())
    };
    let value = parse_value(rhs.trim(), encoding)?;
    Ok(Statement::Assignment { name, value })
}

/// Decode a trimmed right-hand side.
///
/// # Errors
///
/// See [`LineError`]; a single bad `hex` item discards the whole value.
pub fn parse_value(rhs: &str, encoding: Encoding) -> Result<Value, LineError> {
    if rhs == "-" {
        return Err(LineError::ValueDeletion);
    }
    if rhs.starts_with('"') {
        let text = unquote(rhs).ok_or_else(|| LineError::UnsupportedValue(rhs.to_owned()))?;
        return Ok(Value::string(&unescape(text)));
    }
    if let Some(digits) = strip_prefix_ci(rhs, "dword:") {
        return parse_dword(digits.trim()).map(Value::int32);
    }
    if let Some(rest) = strip_prefix_ci(rhs, "hex") {
        let (kind, list) = parse_hex_kind(rest)?;
        let mut bytes = parse_hex_bytes(list)?;
        if !encoding.is_wide() && kind.is_string() {
            bytes = widen(bytes);
        }
        return Ok(Value::new(kind, bytes));
    }
    Err(LineError::UnsupportedValue(rhs.to_owned()))
}

/// Split on the first `=` outside double quotes.
///
/// Inside quotes a backslash escapes the following character, so `\"` does
/// not end the quoted run.
pub fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let mut quoted = false;
    let mut escaped = false;
    for (at, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '=' if !quoted => return Some((&line[..at], &line[at + 1..])),
            _ => {}
        }
    }
    None
}

/// Remove one level of backslash escaping.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Comma-separated hex bytes. An empty list is an empty payload.
///
/// # Errors
///
/// [`LineError::BadHex`] for an empty item (trailing comma) or an item
/// that is not one or two hex digits.
pub fn parse_hex_bytes(list: &str) -> Result<Vec<u8>, LineError> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|item| {
            let item = item.trim();
            if item.is_empty() || item.len() > 2 || !item.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(LineError::BadHex(item.to_owned()));
            }
            u8::from_str_radix(item, 16).map_err(|_| LineError::BadHex(item.to_owned()))
        })
        .collect()
}

/// Promote narrow string bytes to UTF-16LE by inserting a zero after each.
///
/// Bytes that already read as UTF-16LE code units below `0x100` (even
/// length, every high byte zero) are returned unchanged. A narrow payload of
/// one character plus its terminator, such as `41,00`, reads the same way and
/// is kept as the single unit `A` with no terminating NUL unit.
pub fn widen(bytes: Vec<u8>) -> Vec<u8> {
    let already_wide = !bytes.is_empty()
        && bytes.len() % 2 == 0
        && bytes.iter().skip(1).step_by(2).all(|&b| b == 0);
    if already_wide {
        return bytes;
    }
    bytes.into_iter().flat_map(|b| [b, 0]).collect()
}

/// ASCII case-insensitive `strip_prefix`.
pub fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

fn unquote(text: &str) -> Option<&str> {
    if text.len() >= 2 {
        text.strip_prefix('"')?.strip_suffix('"')
    } else {
        None
    }
}

fn parse_dword(digits: &str) -> Result<u32, LineError> {
    let ok = (1..=8).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_hexdigit());
    if !ok {
        return Err(LineError::BadDword(digits.to_owned()));
    }
    u32::from_str_radix(digits, 16).map_err(|_| LineError::BadDword(digits.to_owned()))
}

/// `:` or `(N):` after the `hex` prefix.
fn parse_hex_kind(rest: &str) -> Result<(ValueType, &str), LineError> {
    if let Some(list) = rest.strip_prefix(':') {
        return Ok((ValueType::Binary, list));
    }
    let bad = || LineError::UnsupportedValue(format!("hex{rest}"));
    let inner = rest.strip_prefix('(').ok_or_else(bad)?;
    let (code, tail) = inner.split_once(')').ok_or_else(bad)?;
    let list = tail.strip_prefix(':').ok_or_else(bad)?;
    let code = code.trim();
    let kind = (!code.is_empty() && code.len() <= 8)
        .then(|| u32::from_str_radix(code, 16).ok())
        .flatten()
        .and_then(ValueType::from_code)
        .ok_or_else(|| LineError::UnknownTypeCode(code.to_owned()))?;
    Ok((kind, list))
}
