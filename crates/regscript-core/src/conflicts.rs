// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier conflict tracking across import sources.
//!
//! A [`ConflictMap`] records, per identifier, every source that claimed it.
//! An identifier claimed two or more times is a conflict. Identifiers keep
//! the order of their first claim and contributors keep claim order;
//! repeated claims by the same source are kept, so counts survive.

use indexmap::IndexMap;
use regscript_store::{RegistryStore, RootKey, StoreError};
use tracing::debug;

/// Order-preserving identifier to contributors multimap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictMap {
    entries: IndexMap<String, Vec<String>>,
}

/// One conflicting identifier and the sources that claimed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictEntry<'a> {
    /// The contested identifier.
    pub identifier: &'a str,
    /// Claiming sources, in claim order.
    pub contributors: &'a [String],
}

impl ConflictEntry<'_> {
    /// Contributors joined with `:`.
    pub fn joined(&self) -> String {
        self.contributors.join(":")
    }
}

impl ConflictMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `contributor` claims `identifier`. Keys match exactly.
    pub fn add(&mut self, identifier: &str, contributor: &str) {
        if let Some(list) = self.entries.get_mut(identifier) {
            list.push(contributor.to_owned());
        } else {
            self.entries.insert(identifier.to_owned(), vec![contributor.to_owned()]);
        }
    }

    /// Call `f` for every identifier with two or more contributors.
    ///
    /// Returns the number of conflicts.
    pub fn for_each_conflict(&self, mut f: impl FnMut(&str, &[String])) -> usize {
        let mut count = 0;
        for entry in self.conflicts() {
            f(entry.identifier, entry.contributors);
            count += 1;
        }
        count
    }

    /// Iterator over the conflicting entries.
    pub fn conflicts(&self) -> impl Iterator<Item = ConflictEntry<'_>> + '_ {
        self.entries
            .iter()
            .filter(|(_, list)| list.len() >= 2)
            .map(|(identifier, list)| ConflictEntry {
                identifier,
                contributors: list,
            })
    }

    /// Number of conflicting identifiers.
    pub fn conflict_count(&self) -> usize {
        self.conflicts().count()
    }

    /// Contributors recorded for `identifier`.
    pub fn contributors(&self, identifier: &str) -> Option<&[String]> {
        self.entries.get(identifier).map(Vec::as_slice)
    }

    /// Number of distinct identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The identifier namespaces tracked by a [`ConflictScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    /// `HKCR\CLSID\{..}`.
    ClassId,
    /// `HKCR\<name>` with a `CLSID` subkey.
    ProgId,
    /// `HKCR\TypeLib\{..}`.
    TypeLibId,
}

impl IdentifierKind {
    /// Every kind, in report order.
    pub const ALL: [IdentifierKind; 3] = [Self::ClassId, Self::ProgId, Self::TypeLibId];

    /// Human label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::ClassId => "class id",
            Self::ProgId => "prog id",
            Self::TypeLibId => "type library",
        }
    }
}

/// Three independent [`ConflictMap`]s, one per [`IdentifierKind`].
#[derive(Debug, Clone, Default)]
pub struct ConflictScope {
    class_ids: ConflictMap,
    prog_ids: ConflictMap,
    type_lib_ids: ConflictMap,
}

impl ConflictScope {
    /// Empty maps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map for one namespace.
    pub fn map(&self, kind: IdentifierKind) -> &ConflictMap {
        match kind {
            IdentifierKind::ClassId => &self.class_ids,
            IdentifierKind::ProgId => &self.prog_ids,
            IdentifierKind::TypeLibId => &self.type_lib_ids,
        }
    }

    /// Mutable map for one namespace.
    pub fn map_mut(&mut self, kind: IdentifierKind) -> &mut ConflictMap {
        match kind {
            IdentifierKind::ClassId => &mut self.class_ids,
            IdentifierKind::ProgId => &mut self.prog_ids,
            IdentifierKind::TypeLibId => &mut self.type_lib_ids,
        }
    }

    /// Record every class id, prog id and type library present under
    /// `HKCR` in `store` as claimed by `source`.
    ///
    /// # Errors
    ///
    /// A store enumeration failure.
    pub fn collect<S: RegistryStore>(&mut self, store: &S, source: &str) -> Result<(), StoreError> {
        let hkcr = store.root(RootKey::ClassesRoot);
        for (name, key) in store.subkeys(&hkcr)? {
            if name.eq_ignore_ascii_case("CLSID") {
                for (clsid, _) in store.subkeys(&key)? {
                    self.class_ids.add(&clsid, source);
                }
            } else if name.eq_ignore_ascii_case("TypeLib") {
                for (libid, _) in store.subkeys(&key)? {
                    self.type_lib_ids.add(&libid, source);
                }
            } else if store.open_key(&key, "CLSID").is_some() {
                self.prog_ids.add(&name, source);
            }
        }
        debug!(
            source,
            class_ids = self.class_ids.len(),
            prog_ids = self.prog_ids.len(),
            type_libs = self.type_lib_ids.len(),
            "collected identifiers"
        );
        Ok(())
    }

    /// Call `f` for every conflict in every namespace; returns the total.
    pub fn for_each_conflict(&self, mut f: impl FnMut(IdentifierKind, &str, &[String])) -> usize {
        IdentifierKind::ALL
            .into_iter()
            .map(|kind| {
                self.map(kind)
                    .for_each_conflict(|identifier, contributors| f(kind, identifier, contributors))
            })
            .sum()
    }

    /// Total conflicts across namespaces.
    pub fn conflict_count(&self) -> usize {
        IdentifierKind::ALL
            .into_iter()
            .map(|kind| self.map(kind).conflict_count())
            .sum()
    }
}
