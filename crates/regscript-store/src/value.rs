// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed values.

use serde::{Deserialize, Serialize};

/// Value type tag.
///
/// The numeric [`code`](ValueType::code) is the `hex(N):` type code used by
/// the text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// NUL-terminated UTF-16LE string.
    String,
    /// String containing unexpanded environment references.
    ExpandableString,
    /// Sequence of NUL-terminated strings, closed by an empty string.
    MultiString,
    /// 32-bit little-endian integer.
    Int32,
    /// 64-bit little-endian integer.
    Int64,
    /// Raw bytes.
    Binary,
}

impl ValueType {
    /// Map a `hex(N)` type code to a supported type.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::String),
            2 => Some(Self::ExpandableString),
            3 => Some(Self::Binary),
            4 => Some(Self::Int32),
            7 => Some(Self::MultiString),
            0xB => Some(Self::Int64),
            _ => None,
        }
    }

    /// The `hex(N)` type code of this type.
    pub const fn code(self) -> u32 {
        match self {
            Self::String => 1,
            Self::ExpandableString => 2,
            Self::Binary => 3,
            Self::Int32 => 4,
            Self::MultiString => 7,
            Self::Int64 => 0xB,
        }
    }

    /// `true` for the types whose payload is UTF-16 code units.
    pub const fn is_string(self) -> bool {
        matches!(self, Self::String | Self::ExpandableString | Self::MultiString)
    }
}

/// A typed payload. The value's name lives with its key, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    kind: ValueType,
    #[serde(with = "hex::serde")]
    data: Vec<u8>,
}

impl Value {
    /// Wrap an already-encoded payload.
    pub fn new(kind: ValueType, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// A [`ValueType::String`] holding `text` plus a NUL terminator.
    pub fn string(text: &str) -> Self {
        Self::new(ValueType::String, encode_utf16z(text))
    }

    /// A [`ValueType::ExpandableString`] holding `text` plus a NUL terminator.
    pub fn expandable_string(text: &str) -> Self {
        Self::new(ValueType::ExpandableString, encode_utf16z(text))
    }

    /// A [`ValueType::Int32`].
    pub fn int32(value: u32) -> Self {
        Self::new(ValueType::Int32, value.to_le_bytes().to_vec())
    }

    /// A [`ValueType::Int64`].
    pub fn int64(value: u64) -> Self {
        Self::new(ValueType::Int64, value.to_le_bytes().to_vec())
    }

    /// A [`ValueType::Binary`].
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ValueType::Binary, data.into())
    }

    /// Type tag.
    pub fn kind(&self) -> ValueType {
        self.kind
    }

    /// Raw payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the value and return its payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Decode a string payload up to its first NUL unit.
    ///
    /// Returns `None` for non-string types. An odd trailing byte is ignored
    /// and unpaired surrogates are replaced.
    pub fn text(&self) -> Option<String> {
        if !self.kind.is_string() {
            return None;
        }
        let units: Vec<u16> = self
            .data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        Some(String::from_utf16_lossy(&units))
    }

    /// The integer of an [`ValueType::Int32`] with a 4-byte payload.
    pub fn as_u32(&self) -> Option<u32> {
        match (self.kind, <[u8; 4]>::try_from(self.data.as_slice())) {
            (ValueType::Int32, Ok(bytes)) => Some(u32::from_le_bytes(bytes)),
            _ => None,
        }
    }

    /// The integer of an [`ValueType::Int64`] with an 8-byte payload.
    pub fn as_u64(&self) -> Option<u64> {
        match (self.kind, <[u8; 8]>::try_from(self.data.as_slice())) {
            (ValueType::Int64, Ok(bytes)) => Some(u64::from_le_bytes(bytes)),
            _ => None,
        }
    }
}

/// Encode `text` as UTF-16LE bytes followed by a NUL unit.
pub fn encode_utf16z(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}
