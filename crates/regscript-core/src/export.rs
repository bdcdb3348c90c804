// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `.rgs` exporter: a depth-first walk that writes a brace-delimited script.
//!
//! ```text
//! HKCR
//! {
//!     NoRemove CLSID
//!     {
//!         ForceRemove '{00000000-0000-0000-0000-000000000001}' = s 'Sample Component'
//!         {
//!             InprocServer32 = s '%ROOT%\bin\x.dll'
//!             {
//!                 val 'ThreadingModel' = s 'Both'
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! Output is narrow text with CRLF line endings. Quotes and `%` inside
//! emitted text are doubled so the script reloads unchanged through
//! [`crate::rgs`]. String values under the configured relocation root are
//! rewritten to start with [`PLACEHOLDER`].

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use regscript_store::{RegistryStore, RootKey, StoreError, Value, ValueType};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::ScriptError;

/// Token that stands for the relocation root in exported paths.
pub const PLACEHOLDER: &str = "%ROOT%";

/// Bookkeeping value name marking an exported subtree; never emitted.
pub const EXPORT_MARKER: &str = "RegscriptExported";

/// Deepest indentation level written.
pub const MAX_DEPTH: usize = 16;

/// Widest accepted tab width.
pub const MAX_TAB_WIDTH: usize = 8;

/// Export settings, loadable from a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Spaces per indentation level; `0` indents with one tab per level.
    pub tab_width: usize,
    /// Directory whose paths are rewritten to [`PLACEHOLDER`].
    pub relocation_root: Option<String>,
    /// Display name of the top-level key; defaults to the root's short alias.
    pub root_name: Option<String>,
}

/// How a key line is decorated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoration {
    /// Bare name, used for the top-level root.
    Root,
    /// `'name'`.
    Plain,
    /// `ForceRemove 'name'`.
    ForceRemove,
    /// `NoRemove 'name'`.
    NoRemove,
}

impl Decoration {
    /// Render `name` under this decoration.
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::Root => name.to_owned(),
            Self::Plain => format!("'{}'", escape(name)),
            Self::ForceRemove => format!("ForceRemove '{}'", escape(name)),
            Self::NoRemove => format!("NoRemove '{}'", escape(name)),
        }
    }
}

/// Outcome of an identifier lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The name maps to a known identifier.
    Resolved,
    /// The lookup ran and found nothing.
    Failed,
    /// No lookup is available.
    Unknown,
}

/// Decides decorations for children of the namespace root.
pub trait IdentifierResolver {
    /// `true` for names matching `{*}`, including `{}`.
    fn is_wildcard_identifier(&self, name: &str) -> bool {
        name.len() >= 2 && name.starts_with('{') && name.ends_with('}')
    }

    /// Look `name` up as an alias of a known identifier.
    fn resolve(&self, name: &str) -> Resolution;
}

/// Resolver with no lookup; only `{..}` names are recognized.
#[derive(Debug, Clone, Copy, Default)]
pub struct WildcardOnly;

impl IdentifierResolver for WildcardOnly {
    fn resolve(&self, _name: &str) -> Resolution {
        Resolution::Unknown
    }
}

/// Resolves a prog id through `HKCR\<name>\CLSID` in a store.
#[derive(Debug)]
pub struct StoreResolver<'a, S> {
    store: &'a S,
}

impl<'a, S: RegistryStore> StoreResolver<'a, S> {
    /// Resolve against `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<S: RegistryStore> IdentifierResolver for StoreResolver<'_, S> {
    fn resolve(&self, name: &str) -> Resolution {
        let hkcr = self.store.root(RootKey::ClassesRoot);
        let clsid = self
            .store
            .open_key(&hkcr, name)
            .and_then(|key| self.store.open_key(&key, "CLSID"))
            .and_then(|key| self.store.get_value(&key, None))
            .and_then(|value| value.text());
        match clsid {
            Some(text) if !text.is_empty() => Resolution::Resolved,
            _ => Resolution::Failed,
        }
    }
}

/// Decoration of a child key named `name`.
///
/// `{..}` names are always `ForceRemove`. Below the namespace root a
/// resolved alias is `ForceRemove` and a failed one `NoRemove`; anything
/// else is plain.
pub fn decoration_for(
    resolver: &impl IdentifierResolver,
    name: &str,
    parent_is_namespace_root: bool,
) -> Decoration {
    if resolver.is_wildcard_identifier(name) {
        return Decoration::ForceRemove;
    }
    if !parent_is_namespace_root {
        return Decoration::Plain;
    }
    match resolver.resolve(name) {
        Resolution::Resolved => Decoration::ForceRemove,
        Resolution::Failed => Decoration::NoRemove,
        Resolution::Unknown => Decoration::Plain,
    }
}

/// Double `'` and `%` so text survives a reload.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => out.push_str("''"),
            '%' => out.push_str("%%"),
            _ => out.push(c),
        }
    }
    out
}

/// Rewrite `text` when it is a path strictly inside `root`.
///
/// Matching ignores ASCII case and trailing separators on `root`. The
/// result keeps the separator: `C:\App\bin\x.dll` under `C:\App` is
/// `%ROOT%\bin\x.dll`.
pub fn relocate(text: &str, root: &str) -> Option<String> {
    let root = root.trim_end_matches(['\\', '/']);
    if root.is_empty() {
        return None;
    }
    let head = text.get(..root.len())?;
    if !head.eq_ignore_ascii_case(root) {
        return None;
    }
    let rest = &text[root.len()..];
    let mut chars = rest.chars();
    match chars.next() {
        Some('\\' | '/') if chars.next().is_some() => Some(format!("{PLACEHOLDER}{rest}")),
        _ => None,
    }
}

/// Render a value as `s '..'`, `d '..'` or `b '..'`.
pub fn format_value(value: &Value, relocation_root: Option<&str>) -> String {
    match value.kind() {
        ValueType::String | ValueType::ExpandableString => {
            let text = value.text().unwrap_or_default();
            match relocation_root.and_then(|root| relocate(&text, root)) {
                Some(relocated) => {
                    let rest = &relocated[PLACEHOLDER.len()..];
                    format!("s '{PLACEHOLDER}{}'", escape(rest))
                }
                None => format!("s '{}'", escape(&text)),
            }
        }
        ValueType::Int32 => match value.as_u32() {
            Some(n) => format!("d '{n}'"),
            None => format_binary(value.data()),
        },
        ValueType::MultiString | ValueType::Int64 | ValueType::Binary => {
            format_binary(value.data())
        }
    }
}

fn format_binary(data: &[u8]) -> String {
    format!("b '{}'", hex::encode_upper(data))
}

/// Indenting line writer with CRLF endings.
#[derive(Debug)]
pub struct ScriptWriter<W> {
    out: W,
    tab_width: usize,
}

impl<W: Write> ScriptWriter<W> {
    /// Wrap `out`; `tab_width` is clamped to [`MAX_TAB_WIDTH`].
    pub fn new(out: W, tab_width: usize) -> Self {
        Self {
            out,
            tab_width: tab_width.min(MAX_TAB_WIDTH),
        }
    }

    /// Write `text` at `depth` (clamped to [`MAX_DEPTH`]).
    ///
    /// # Errors
    ///
    /// Any write error.
    pub fn line(&mut self, depth: usize, text: &str) -> io::Result<()> {
        let depth = depth.min(MAX_DEPTH);
        if self.tab_width == 0 {
            for _ in 0..depth {
                self.out.write_all(b"\t")?;
            }
        } else {
            let pad = depth * self.tab_width;
            write!(self.out, "{:pad$}", "")?;
        }
        self.out.write_all(text.as_bytes())?;
        self.out.write_all(b"\r\n")
    }

    /// Flush and return the sink.
    ///
    /// # Errors
    ///
    /// Any flush error.
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Counters for one export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    /// Keys written, the root included.
    pub keys: usize,
    /// Values written, inline defaults included.
    pub values: usize,
    /// Keys whose contents could not be read.
    pub omitted: usize,
}

/// Walks a store and writes it as a script.
#[derive(Debug)]
pub struct Exporter<'a, S, R> {
    store: &'a S,
    resolver: &'a R,
    options: &'a ExportOptions,
    stats: ExportStats,
}

impl<'a, S: RegistryStore, R: IdentifierResolver> Exporter<'a, S, R> {
    /// Export from `store`, decorating through `resolver`.
    pub fn new(store: &'a S, resolver: &'a R, options: &'a ExportOptions) -> Self {
        Self {
            store,
            resolver,
            options,
            stats: ExportStats::default(),
        }
    }

    /// Write the whole tree under `root`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Write`] on an output failure.
    #[instrument(skip(self, out))]
    pub fn export_root<W: Write>(
        mut self,
        root: RootKey,
        out: W,
    ) -> Result<ExportStats, ScriptError> {
        let mut writer = ScriptWriter::new(out, self.options.tab_width);
        let key = self.store.root(root);
        let name = self.options.root_name.as_deref().unwrap_or(root.short_name());
        let namespace_root = root == RootKey::ClassesRoot;
        self.write_key(&mut writer, &key, name, 0, Decoration::Root, namespace_root)?;
        writer.finish()?;
        info!(keys = self.stats.keys, values = self.stats.values, "export complete");
        Ok(self.stats)
    }

    /// Write `key` and its subtree at `depth`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Write`] on an output failure.
    pub fn write_key<W: Write>(
        &mut self,
        writer: &mut ScriptWriter<W>,
        key: &S::Key,
        name: &str,
        depth: usize,
        decoration: Decoration,
        is_namespace_root: bool,
    ) -> Result<(), ScriptError> {
        let relocation_root = self.options.relocation_root.as_deref();
        let mut head = decoration.apply(name);
        if let Some(default) = self.store.get_value(key, None) {
            head.push_str(" = ");
            head.push_str(&format_value(&default, relocation_root));
            self.stats.values += 1;
        }
        writer.line(depth, &head)?;
        writer.line(depth, "{")?;
        self.stats.keys += 1;

        match self.store.subkeys(key) {
            Ok(children) => {
                for (child_name, child) in children {
                    let decoration = decoration_for(self.resolver, &child_name, is_namespace_root);
                    self.write_key(writer, &child, &child_name, depth + 1, decoration, false)?;
                }
            }
            Err(err) => self.omit(name, &err),
        }
        match self.store.values(key) {
            Ok(values) => {
                for (value_name, value) in values {
                    let Some(value_name) = value_name else {
                        continue;
                    };
                    if value_name.eq_ignore_ascii_case(EXPORT_MARKER) {
                        continue;
                    }
                    let line = format!(
                        "val '{}' = {}",
                        escape(&value_name),
                        format_value(&value, relocation_root)
                    );
                    writer.line(depth + 1, &line)?;
                    self.stats.values += 1;
                }
            }
            Err(err) => self.omit(name, &err),
        }
        writer.line(depth, "}")?;
        Ok(())
    }

    fn omit(&mut self, name: &str, err: &StoreError) {
        warn!(key = name, %err, "omitting unreadable key contents");
        self.stats.omitted += 1;
    }
}

/// Export `root` of `store` to a new file at `path`.
///
/// # Errors
///
/// [`ScriptError::StreamOpen`] if the file cannot be created, otherwise as
/// [`Exporter::export_root`].
pub fn export_file<S: RegistryStore, R: IdentifierResolver>(
    store: &S,
    resolver: &R,
    options: &ExportOptions,
    root: RootKey,
    path: &Path,
) -> Result<ExportStats, ScriptError> {
    let file = File::create(path).map_err(|source| ScriptError::StreamOpen {
        path: path.to_path_buf(),
        source,
    })?;
    Exporter::new(store, resolver, options).export_root(root, BufWriter::new(file))
}

/// Set the export marker on `key`; returns the previous state.
///
/// # Errors
///
/// The store's `set_value` failure.
pub fn mark_exported<S: RegistryStore>(
    store: &mut S,
    key: &S::Key,
    state: u32,
) -> Result<Option<u32>, StoreError> {
    let previous = store
        .get_value(key, Some(EXPORT_MARKER))
        .and_then(|value| value.as_u32());
    store.set_value(key, Some(EXPORT_MARKER), Value::int32(state))?;
    Ok(previous)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use regscript_store::{KeyPath, MemoryStore};

    fn export(store: &MemoryStore, root: RootKey, options: &ExportOptions) -> String {
        let resolver = StoreResolver::new(store);
        let mut out = Vec::new();
        Exporter::new(store, &resolver, options).export_root(root, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn path(text: &str) -> KeyPath {
        KeyPath::parse(text).unwrap()
    }

    // ── 1. value formatting ─────────────────────────────────────────────

    #[test]
    fn relocates_paths_inside_the_root() {
        let value = Value::string(r"C:\App\bin\x.dll");
        assert_eq!(format_value(&value, Some(r"C:\App")), r"s '%ROOT%\bin\x.dll'");
        assert_eq!(format_value(&value, Some(r"c:\app\")), r"s '%ROOT%\bin\x.dll'");
        assert_eq!(format_value(&value, None), r"s 'C:\App\bin\x.dll'");
    }

    #[test]
    fn relocation_needs_a_separator_and_a_remainder() {
        assert_eq!(relocate(r"C:\Apple\x.dll", r"C:\App"), None);
        assert_eq!(relocate(r"C:\App", r"C:\App"), None);
        assert_eq!(relocate(r"C:\App\", r"C:\App"), None);
        assert_eq!(relocate("C:/App/x", "C:/App").as_deref(), Some("%ROOT%/x"));
        assert_eq!(relocate("anything", ""), None);
    }

    #[test]
    fn quotes_and_percent_are_doubled() {
        let value = Value::string("it's 100%");
        assert_eq!(format_value(&value, None), "s 'it''s 100%%'");
        let inside = Value::string(r"C:\App\50%");
        assert_eq!(format_value(&inside, Some(r"C:\App")), r"s '%ROOT%\50%%'");
    }

    #[test]
    fn numbers_and_bytes() {
        assert_eq!(format_value(&Value::int32(4_000_000_000), None), "d '4000000000'");
        assert_eq!(format_value(&Value::binary(vec![0xDE, 0x0A]), None), "b 'DE0A'");
        assert_eq!(format_value(&Value::int64(1), None), "b '0100000000000000'");
        assert_eq!(format_value(&Value::new(ValueType::Int32, vec![1]), None), "b '01'");
        assert_eq!(format_value(&Value::binary(Vec::new()), None), "b ''");
    }

    // ── 2. decoration ───────────────────────────────────────────────────

    #[test]
    fn decoration_rules() {
        let mut store = MemoryStore::new();
        let clsid = store.create_path(&path(r"HKCR\Demo.App\CLSID")).unwrap();
        store.set_value(&clsid, None, Value::string("{1}")).unwrap();
        let resolver = StoreResolver::new(&store);

        assert_eq!(decoration_for(&resolver, "{1}", false), Decoration::ForceRemove);
        assert_eq!(decoration_for(&resolver, "Demo.App", true), Decoration::ForceRemove);
        assert_eq!(decoration_for(&resolver, "CLSID", true), Decoration::NoRemove);
        assert_eq!(decoration_for(&resolver, "Demo.App", false), Decoration::Plain);
        assert_eq!(decoration_for(&WildcardOnly, "CLSID", true), Decoration::Plain);
        assert_eq!(decoration_for(&WildcardOnly, "{}", true), Decoration::ForceRemove);
        assert_eq!(decoration_for(&WildcardOnly, "{", true), Decoration::Plain);
        assert_eq!(decoration_for(&WildcardOnly, "}", false), Decoration::Plain);
    }

    #[test]
    fn decorations_render() {
        assert_eq!(Decoration::Root.apply("HKCR"), "HKCR");
        assert_eq!(Decoration::Plain.apply("a'b"), "'a''b'");
        assert_eq!(Decoration::ForceRemove.apply("x"), "ForceRemove 'x'");
        assert_eq!(Decoration::NoRemove.apply("x"), "NoRemove 'x'");
    }

    // ── 3. layout ───────────────────────────────────────────────────────

    #[test]
    fn writes_nested_blocks_with_crlf() {
        let mut store = MemoryStore::new();
        let key = store.create_path(&path(r"HKLM\Software\Demo")).unwrap();
        store.set_value(&key, None, Value::string("Demo")).unwrap();
        store.set_value(&key, Some("Count"), Value::int32(2)).unwrap();

        let text = export(&store, RootKey::LocalMachine, &ExportOptions::default());
        let expected = concat!(
            "HKLM\r\n{\r\n",
            "\t'Software'\r\n\t{\r\n",
            "\t\t'Demo' = s 'Demo'\r\n\t\t{\r\n",
            "\t\t\tval 'Count' = d '2'\r\n",
            "\t\t}\r\n\t}\r\n}\r\n",
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn spaces_replace_tabs_and_are_clamped() {
        let mut store = MemoryStore::new();
        store.create_path(&path(r"HKLM\A")).unwrap();
        let options = ExportOptions {
            tab_width: 4,
            ..ExportOptions::default()
        };
        let text = export(&store, RootKey::LocalMachine, &options);
        assert!(text.contains("\r\n    'A'\r\n    {\r\n"));

        let mut out = Vec::new();
        let mut writer = ScriptWriter::new(&mut out, 99);
        writer.line(1, "x").unwrap();
        writer.line(40, "y").unwrap();
        writer.finish().unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = format!("{}x\r\n{}y\r\n", " ".repeat(8), " ".repeat(8 * MAX_DEPTH));
        assert_eq!(text, expected);
    }

    #[test]
    fn marker_and_default_are_not_listed_as_values() {
        let mut store = MemoryStore::new();
        let key = store.create_path(&path(r"HKCR\CLSID\{1}")).unwrap();
        store.set_value(&key, None, Value::string("Sample")).unwrap();
        assert_eq!(mark_exported(&mut store, &key, 1).unwrap(), None);
        assert_eq!(mark_exported(&mut store, &key, 0).unwrap(), Some(1));

        let text = export(&store, RootKey::ClassesRoot, &ExportOptions::default());
        assert!(!text.contains(EXPORT_MARKER));
        assert!(text.contains("\tNoRemove 'CLSID'\r\n"));
        assert!(text.contains("\t\tForceRemove '{1}' = s 'Sample'\r\n"));
        assert!(!text.contains("val"));
    }

    #[test]
    fn root_name_override() {
        let store = MemoryStore::new();
        let options = ExportOptions {
            root_name: Some("HKEY_CLASSES_ROOT".to_owned()),
            ..ExportOptions::default()
        };
        let text = export(&store, RootKey::ClassesRoot, &options);
        assert_eq!(text, "HKEY_CLASSES_ROOT\r\n{\r\n}\r\n");
    }
}
