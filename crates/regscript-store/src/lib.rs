// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Hierarchical key/value store contract for regscript.
//!
//! This crate defines the data model shared by the script importer and
//! exporter ([`Value`], [`ValueType`], [`KeyPath`], [`RootKey`]) and the
//! [`RegistryStore`] port they drive. It contains NO script parsing; that
//! lives in `regscript-core`.
//!
//! # Design
//!
//! - **Handles, not references.** A store hands out opaque key handles
//!   ([`RegistryStore::Key`]); the importer holds at most one open handle.
//! - **Names compare case-insensitively.** Child keys and value names are
//!   matched ignoring ASCII case; the first spelling seen is kept.
//! - **Payloads are bytes.** String types carry UTF-16LE code units, integer
//!   types little-endian bytes, everything else raw bytes.
//!
//! [`MemoryStore`] is the in-memory backend used by tests and by the CLI
//! (persisted through `regscript-store-fs`).
#![forbid(unsafe_code)]

mod memory;
mod value;

pub use memory::{KeyId, KeySnapshot, MemoryStore, NamedValue, Snapshot};
pub use value::{encode_utf16z, Value, ValueType};

use std::fmt;

use thiserror::Error;

/// Errors reported by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A key handle does not refer to a live key.
    #[error("[STORE_KEY_NOT_FOUND] {0}")]
    KeyNotFound(String),
    /// A key or value name cannot be stored (empty, or contains a separator).
    #[error("[STORE_INVALID_NAME] {0:?}")]
    InvalidName(String),
    /// A snapshot could not be restored.
    #[error("[STORE_SNAPSHOT] {0}")]
    Snapshot(String),
    /// I/O error from a persistent backend.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One of the fixed top-level namespace roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RootKey {
    /// `HKEY_CLASSES_ROOT`, alias `HKCR`.
    ClassesRoot,
    /// `HKEY_LOCAL_MACHINE`, alias `HKLM`.
    LocalMachine,
}

impl RootKey {
    /// Every root, in handle order.
    pub const ALL: [RootKey; 2] = [RootKey::ClassesRoot, RootKey::LocalMachine];

    /// Resolve a root alias (long or short spelling, any case).
    pub fn from_alias(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|root| {
            name.eq_ignore_ascii_case(root.short_name())
                || name.eq_ignore_ascii_case(root.long_name())
        })
    }

    /// Short alias, e.g. `HKCR`.
    pub const fn short_name(self) -> &'static str {
        match self {
            RootKey::ClassesRoot => "HKCR",
            RootKey::LocalMachine => "HKLM",
        }
    }

    /// Long alias, e.g. `HKEY_CLASSES_ROOT`.
    pub const fn long_name(self) -> &'static str {
        match self {
            RootKey::ClassesRoot => "HKEY_CLASSES_ROOT",
            RootKey::LocalMachine => "HKEY_LOCAL_MACHINE",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            RootKey::ClassesRoot => 0,
            RootKey::LocalMachine => 1,
        }
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A backslash-separated key path whose first component is a root alias.
///
/// `HKCR\CLSID\{..}` parses to root [`RootKey::ClassesRoot`] and components
/// `["CLSID", "{..}"]`. One trailing separator is ignored, so `HKLM\A\`
/// names `HKLM\A`. A path with an unknown root alias or any other empty
/// component does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    /// Resolved root.
    pub root: RootKey,
    /// Components below the root, outermost first.
    pub components: Vec<String>,
}

impl KeyPath {
    /// Parse a textual path.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidName`] if the root alias is unknown or any
    /// component other than a single trailing one is empty.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        let trimmed = text.strip_suffix('\\').unwrap_or(text);
        let mut parts = trimmed.split('\\');
        let alias = parts.next().unwrap_or_default();
        let root = RootKey::from_alias(alias)
            .ok_or_else(|| StoreError::InvalidName(alias.to_owned()))?;
        let mut components = Vec::new();
        for part in parts {
            if part.is_empty() {
                return Err(StoreError::InvalidName(text.to_owned()));
            }
            components.push(part.to_owned());
        }
        Ok(Self { root, components })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.root.short_name())?;
        for component in &self.components {
            write!(f, "\\{component}")?;
        }
        Ok(())
    }
}

/// Storage port for a hierarchical key/value tree.
///
/// The importer uses [`create_key`](RegistryStore::create_key) and
/// [`set_value`](RegistryStore::set_value); the exporter uses the read side.
/// Implementations are single-writer: callers hold `&mut self` for the
/// whole of one import.
///
/// # Absence Semantics
///
/// [`open_key`](RegistryStore::open_key) and
/// [`get_value`](RegistryStore::get_value) return `None` for missing entries;
/// absence is not an error. Errors are reserved for operations that were
/// expected to succeed (stale handle, unstorable name).
pub trait RegistryStore {
    /// Opaque key handle.
    type Key: Clone + fmt::Debug;

    /// Handle of a top-level root. Roots always exist.
    fn root(&self, root: RootKey) -> Self::Key;

    /// Open an existing child of `parent`.
    fn open_key(&self, parent: &Self::Key, name: &str) -> Option<Self::Key>;

    /// Open the child of `parent` named `name`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Backend-specific; [`MemoryStore`] rejects empty names and names
    /// containing `\`.
    fn create_key(&mut self, parent: &Self::Key, name: &str) -> Result<Self::Key, StoreError>;

    /// Children of `key` as `(name, handle)` pairs, in enumeration order.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] for a stale handle.
    fn subkeys(&self, key: &Self::Key) -> Result<Vec<(String, Self::Key)>, StoreError>;

    /// Values of `key`; the default value (if any) comes first with name `None`.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] for a stale handle.
    fn values(&self, key: &Self::Key) -> Result<Vec<(Option<String>, Value)>, StoreError>;

    /// Read one value; `name = None` addresses the default value.
    fn get_value(&self, key: &Self::Key, name: Option<&str>) -> Option<Value>;

    /// Write one value, replacing any value of the same name.
    ///
    /// # Errors
    ///
    /// Backend-specific; see [`create_key`](RegistryStore::create_key).
    fn set_value(
        &mut self,
        key: &Self::Key,
        name: Option<&str>,
        value: Value,
    ) -> Result<(), StoreError>;

    /// Open every component of `path`, without creating anything.
    fn open_path(&self, path: &KeyPath) -> Option<Self::Key> {
        let mut key = self.root(path.root);
        for component in &path.components {
            key = self.open_key(&key, component)?;
        }
        Some(key)
    }

    /// Create (or open) every component of `path`.
    ///
    /// # Errors
    ///
    /// The first [`create_key`](RegistryStore::create_key) failure.
    fn create_path(&mut self, path: &KeyPath) -> Result<Self::Key, StoreError> {
        let mut key = self.root(path.root);
        for component in &path.components {
            key = self.create_key(&key, component)?;
        }
        Ok(key)
    }
}
