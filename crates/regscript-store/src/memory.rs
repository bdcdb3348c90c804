// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory key tree.
//!
//! [`MemoryStore`] keeps every key in an arena indexed by [`KeyId`]. Keys are
//! never removed, so a handle stays valid for the life of the store. The
//! whole tree converts to and from a serde [`Snapshot`] for persistence.

use serde::{Deserialize, Serialize};

use crate::{KeyPath, RegistryStore, RootKey, StoreError, Value};

/// Handle of a key inside one [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(usize);

#[derive(Debug, Clone)]
struct Node {
    name: String,
    children: Vec<KeyId>,
    default: Option<Value>,
    values: Vec<(String, Value)>,
}

impl Node {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            children: Vec::new(),
            default: None,
            values: Vec::new(),
        }
    }
}

/// In-memory [`RegistryStore`].
///
/// Children and named values keep insertion order; lookups ignore ASCII
/// case and keep the first spelling.
///
/// # Invariants
///
/// - Both roots exist from construction.
/// - Child names are unique per parent (case-insensitive), non-empty, and
///   contain no `\`.
/// - Named values are unique per key (case-insensitive); the default value
///   is held separately.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    nodes: Vec<Node>,
}

impl MemoryStore {
    /// Create a store holding only the empty roots.
    pub fn new() -> Self {
        Self {
            nodes: RootKey::ALL.iter().map(|root| Node::new(root.short_name())).collect(),
        }
    }

    /// Total number of keys, roots included.
    pub fn key_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of values, default values included.
    pub fn value_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| node.values.len() + usize::from(node.default.is_some()))
            .sum()
    }

    /// Returns `true` if no key below the roots exists and the roots hold no values.
    pub fn is_empty(&self) -> bool {
        self.key_count() == RootKey::ALL.len() && self.value_count() == 0
    }

    /// Name of the key behind `key`.
    pub fn name(&self, key: KeyId) -> Option<&str> {
        self.nodes.get(key.0).map(|node| node.name.as_str())
    }

    fn node(&self, key: KeyId) -> Result<&Node, StoreError> {
        self.nodes
            .get(key.0)
            .ok_or_else(|| StoreError::KeyNotFound(format!("{key:?}")))
    }

    fn node_mut(&mut self, key: KeyId) -> Result<&mut Node, StoreError> {
        self.nodes
            .get_mut(key.0)
            .ok_or_else(|| StoreError::KeyNotFound(format!("{key:?}")))
    }

    /// Capture the whole tree as a flat list of keys, parents first.
    pub fn snapshot(&self) -> Snapshot {
        let mut keys = Vec::new();
        let mut pending: Vec<(KeyId, String)> = RootKey::ALL
            .iter()
            .rev()
            .map(|root| (self.root(*root), root.short_name().to_owned()))
            .collect();
        while let Some((key, path)) = pending.pop() {
            let node = &self.nodes[key.0];
            pending.extend(
                node.children
                    .iter()
                    .rev()
                    .map(|child| (*child, format!("{path}\\{}", self.nodes[child.0].name))),
            );
            keys.push(KeySnapshot {
                path,
                default: node.default.clone(),
                values: node
                    .values
                    .iter()
                    .map(|(name, value)| NamedValue {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            });
        }
        Snapshot { keys }
    }

    /// Rebuild a store from a snapshot.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidName`] if a path does not parse, and any error a
    /// key or value would raise when created through the port.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for entry in &snapshot.keys {
            let key = store.create_path(&KeyPath::parse(&entry.path)?)?;
            if let Some(default) = &entry.default {
                store.set_value(&key, None, default.clone())?;
            }
            for named in &entry.values {
                store.set_value(&key, Some(&named.name), named.value.clone())?;
            }
        }
        Ok(store)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains('\\') {
        return Err(StoreError::InvalidName(name.to_owned()));
    }
    Ok(())
}

impl RegistryStore for MemoryStore {
    type Key = KeyId;

    fn root(&self, root: RootKey) -> KeyId {
        KeyId(root.index())
    }

    fn open_key(&self, parent: &KeyId, name: &str) -> Option<KeyId> {
        let node = self.nodes.get(parent.0)?;
        node.children
            .iter()
            .copied()
            .find(|child| self.nodes[child.0].name.eq_ignore_ascii_case(name))
    }

    fn create_key(&mut self, parent: &KeyId, name: &str) -> Result<KeyId, StoreError> {
        validate_name(name)?;
        self.node(*parent)?;
        if let Some(existing) = self.open_key(parent, name) {
            return Ok(existing);
        }
        let id = KeyId(self.nodes.len());
        self.nodes.push(Node::new(name));
        self.node_mut(*parent)?.children.push(id);
        Ok(id)
    }

    fn subkeys(&self, key: &KeyId) -> Result<Vec<(String, KeyId)>, StoreError> {
        let node = self.node(*key)?;
        Ok(node
            .children
            .iter()
            .map(|child| (self.nodes[child.0].name.clone(), *child))
            .collect())
    }

    fn values(&self, key: &KeyId) -> Result<Vec<(Option<String>, Value)>, StoreError> {
        let node = self.node(*key)?;
        let default = node.default.iter().map(|value| (None, value.clone()));
        let named = node
            .values
            .iter()
            .map(|(name, value)| (Some(name.clone()), value.clone()));
        Ok(default.chain(named).collect())
    }

    fn get_value(&self, key: &KeyId, name: Option<&str>) -> Option<Value> {
        let node = self.nodes.get(key.0)?;
        match name {
            None => node.default.clone(),
            Some(name) => node
                .values
                .iter()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone()),
        }
    }

    fn set_value(
        &mut self,
        key: &KeyId,
        name: Option<&str>,
        value: Value,
    ) -> Result<(), StoreError> {
        let node = self.node_mut(*key)?;
        let Some(name) = name else {
            node.default = Some(value);
            return Ok(());
        };
        if name.is_empty() {
            return Err(StoreError::InvalidName(String::new()));
        }
        if let Some(slot) = node
            .values
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            node.values.push((name.to_owned(), value));
        }
        Ok(())
    }
}

/// Serializable image of a [`MemoryStore`].
///
/// Keys are listed flat in pre-order, so nesting depth never shows up in the
/// serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Every key, roots included, each parent before its children.
    pub keys: Vec<KeySnapshot>,
}

/// Serializable image of one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySnapshot {
    /// Full path, root alias first, e.g. `HKCR\CLSID`.
    pub path: String,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Named values, in insertion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<NamedValue>,
}

/// A value together with its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedValue {
    /// Value name.
    pub name: String,
    /// Typed payload.
    #[serde(flatten)]
    pub value: Value,
}
