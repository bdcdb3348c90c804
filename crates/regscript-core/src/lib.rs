// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Registration script import and export.
//!
//! - [`reader`]: chunked line framing with encoding detection.
//! - [`grammar`]: the `.reg` line grammar ([`Statement`], [`LineError`]).
//! - [`import`]: applies `.reg` scripts to a store.
//! - [`conflicts`]: identifiers claimed by more than one source.
//! - [`export`]: writes a store as an `.rgs` script.
//! - [`rgs`]: loads an `.rgs` script back into a store.
//!
//! All of it runs against the
//! [`RegistryStore`](regscript_store::RegistryStore) port, so a
//! [`MemoryStore`](regscript_store::MemoryStore) is enough to exercise
//! everything.
//!
//! ```
//! use regscript_core::{import_reg, Exporter, ExportOptions, StoreResolver};
//! use regscript_store::{MemoryStore, RootKey};
//!
//! let script = b"[HKCR\\Demo.App]\n@=\"Demo\"\n";
//! let mut store = MemoryStore::new();
//! let stats = import_reg(&script[..], &mut store)?;
//! assert_eq!(stats.values_set, 1);
//!
//! let resolver = StoreResolver::new(&store);
//! let mut out = Vec::new();
//! let options = ExportOptions::default();
//! Exporter::new(&store, &resolver, &options).export_root(RootKey::ClassesRoot, &mut out)?;
//! assert!(String::from_utf8_lossy(&out).contains("NoRemove 'Demo.App' = s 'Demo'"));
//! # Ok::<(), regscript_core::ScriptError>(())
//! ```
#![forbid(unsafe_code)]

pub mod conflicts;
mod error;
pub mod export;
pub mod grammar;
pub mod import;
pub mod reader;
pub mod rgs;

pub use conflicts::{ConflictEntry, ConflictMap, ConflictScope, IdentifierKind};
pub use error::ScriptError;
pub use export::{
    export_file, mark_exported, Decoration, ExportOptions, ExportStats, Exporter,
    IdentifierResolver, Resolution, StoreResolver, WildcardOnly, EXPORT_MARKER, PLACEHOLDER,
};
pub use grammar::{LineError, Statement};
pub use import::{
    import_reg, import_reg_file, parse_statements, ImportOptions, ImportStats, Importer, ParsedLine,
};
pub use reader::{Encoding, LineReader};
pub use rgs::{load_rgs, load_rgs_file, LoadStats, Substitutions};
