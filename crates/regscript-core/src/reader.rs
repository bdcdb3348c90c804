// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Chunked line framing over a byte stream.
//!
//! [`LineReader`] pulls its source through a fixed [`CHUNK_SIZE`] buffer and
//! splits it into physical lines of 8-bit or 16-bit code units. Line
//! boundaries are found through a per-byte class table: each boundary test
//! owns one bit ([`CharClass::alloc`]) and a unit matches a [`ClassMask`]
//! when `(class[unit] & bits) ^ expected != 0`. Units above `0xFF` have no
//! class bits.
//!
//! The encoding comes from the leading marker ([`LineReader::read_bom`]):
//!
//! | marker | encoding | unit |
//! |---|---|---|
//! | `FF FE` | [`Encoding::Utf16Le`] | `u16` |
//! | `FE FF` | [`Encoding::Utf16Be`] | `u16` |
//! | `EF BB BF` | [`Encoding::Utf8`] | `u8` |
//! | none | [`Encoding::Ansi`] | `u8` |
//!
//! A stream error while refilling is end of input: it is logged and the
//! reader reports no further units.

use std::fmt;
use std::io::{self, Read};

use tracing::warn;

use crate::ScriptError;

/// Bytes pulled from the source per refill.
pub const CHUNK_SIZE: usize = 256;

/// Source text encoding, chosen by the leading marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// No marker: 8-bit units, each byte one code point (Latin-1).
    Ansi,
    /// `EF BB BF`: 8-bit units decoded as UTF-8.
    Utf8,
    /// `FF FE`: 16-bit little-endian units.
    Utf16Le,
    /// `FE FF`: 16-bit big-endian units.
    Utf16Be,
}

impl Encoding {
    /// Width of one code unit in bytes.
    pub const fn unit_width(self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    /// `true` for the 16-bit encodings.
    pub const fn is_wide(self) -> bool {
        matches!(self, Self::Utf16Le | Self::Utf16Be)
    }

    /// Length of the marker that selects this encoding.
    pub const fn marker_len(self) -> usize {
        match self {
            Self::Ansi => 0,
            Self::Utf8 => 3,
            Self::Utf16Le | Self::Utf16Be => 2,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ansi => "ansi",
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
        })
    }
}

/// A boundary test against a [`CharClass`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassMask {
    bits: u8,
    expected: u8,
}

impl ClassMask {
    /// Matches units whose class intersects `bits`.
    pub const fn any_of(bits: u8) -> Self {
        Self { bits, expected: 0 }
    }

    /// Matches exactly the units `self` does not.
    pub const fn inverted(self) -> Self {
        Self {
            bits: self.bits,
            expected: self.expected ^ self.bits,
        }
    }

    /// Class bits tested.
    pub const fn bits(self) -> u8 {
        self.bits
    }
}

/// 256-entry class table keyed by byte value; up to eight classes.
#[derive(Clone)]
pub struct CharClass {
    table: [u8; 256],
    next: u8,
}

impl CharClass {
    /// An empty table.
    pub const fn new() -> Self {
        Self {
            table: [0; 256],
            next: 1,
        }
    }

    /// Tag every byte in `chars` with a fresh class bit.
    ///
    /// Returns `None` once all eight bits are taken.
    pub fn alloc(&mut self, chars: &[u8]) -> Option<ClassMask> {
        let bit = self.next;
        if bit == 0 {
            return None;
        }
        self.next = bit.wrapping_shl(1);
        for &c in chars {
            self.table[usize::from(c)] |= bit;
        }
        Some(ClassMask::any_of(bit))
    }

    /// Class bits of a byte.
    pub fn classify(&self, byte: u8) -> u8 {
        self.table[usize::from(byte)]
    }

    /// Apply `mask` to a unit given as its byte value (`None` above `0xFF`).
    pub fn test(&self, byte: Option<u8>, mask: ClassMask) -> bool {
        let class = byte.map_or(0, |b| self.classify(b));
        (class & mask.bits) ^ mask.expected != 0
    }
}

impl Default for CharClass {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharClass")
            .field("allocated", &self.next.trailing_zeros())
            .finish_non_exhaustive()
    }
}

/// An 8-bit or 16-bit code unit.
pub trait CodeUnit: Copy + Default + Eq + fmt::Debug {
    /// Width in bytes.
    const WIDTH: usize;

    /// Decode one unit from exactly [`WIDTH`](CodeUnit::WIDTH) bytes.
    fn from_bytes(bytes: &[u8], big_endian: bool) -> Self;

    /// The unit's value when it fits in a byte.
    fn byte(self) -> Option<u8>;

    /// Decode a run of units into text.
    fn decode_text(units: &[Self], encoding: Encoding) -> String;
}

impl CodeUnit for u8 {
    const WIDTH: usize = 1;

    fn from_bytes(bytes: &[u8], _big_endian: bool) -> Self {
        bytes[0]
    }

    fn byte(self) -> Option<u8> {
        Some(self)
    }

    fn decode_text(units: &[Self], encoding: Encoding) -> String {
        match encoding {
            Encoding::Utf8 => String::from_utf8_lossy(units).into_owned(),
            _ => units.iter().copied().map(char::from).collect(),
        }
    }
}

impl CodeUnit for u16 {
    const WIDTH: usize = 2;

    fn from_bytes(bytes: &[u8], big_endian: bool) -> Self {
        let pair = [bytes[0], bytes[1]];
        if big_endian {
            u16::from_be_bytes(pair)
        } else {
            u16::from_le_bytes(pair)
        }
    }

    fn byte(self) -> Option<u8> {
        u8::try_from(self).ok()
    }

    fn decode_text(units: &[Self], _encoding: Encoding) -> String {
        String::from_utf16_lossy(units)
    }
}

/// Splits a byte stream into physical lines.
///
/// Owns its chunk buffer; one reader serves one stream.
pub struct LineReader<R> {
    source: R,
    chunk: [u8; CHUNK_SIZE],
    index: usize,
    ahead: usize,
    exhausted: bool,
    encoding: Option<Encoding>,
    classes: CharClass,
    eol: ClassMask,
}

impl<R: Read> LineReader<R> {
    /// Wrap `source`. The newline class is allocated up front.
    pub fn new(source: R) -> Self {
        let mut classes = CharClass::new();
        let eol = classes.alloc(b"\n").unwrap_or(ClassMask::any_of(0));
        Self {
            source,
            chunk: [0; CHUNK_SIZE],
            index: 0,
            ahead: 0,
            exhausted: false,
            encoding: None,
            classes,
            eol,
        }
    }

    /// The newline boundary test.
    pub fn eol(&self) -> ClassMask {
        self.eol
    }

    /// Allocate another boundary class; see [`CharClass::alloc`].
    pub fn alloc_class(&mut self, chars: &[u8]) -> Option<ClassMask> {
        self.classes.alloc(chars)
    }

    /// Encoding detected by [`read_bom`](Self::read_bom), [`Encoding::Ansi`] before.
    pub fn encoding(&self) -> Encoding {
        self.encoding.unwrap_or(Encoding::Ansi)
    }

    /// Detect the encoding marker and consume it. Only the first call reads.
    ///
    /// # Errors
    ///
    /// [`ScriptError::UnsupportedEncoding`] for a UTF-32 marker.
    pub fn read_bom(&mut self) -> Result<Encoding, ScriptError> {
        if let Some(encoding) = self.encoding {
            return Ok(encoding);
        }
        while self.ahead < 4 && self.refill() {}
        let head = &self.chunk[self.index..self.index + self.ahead];
        let encoding = match head {
            [0xFF, 0xFE, 0x00, 0x00, ..] => {
                return Err(ScriptError::UnsupportedEncoding("utf-32le"));
            }
            [0x00, 0x00, 0xFE, 0xFF, ..] => {
                return Err(ScriptError::UnsupportedEncoding("utf-32be"));
            }
            [0xFF, 0xFE, ..] => Encoding::Utf16Le,
            [0xFE, 0xFF, ..] => Encoding::Utf16Be,
            [0xEF, 0xBB, 0xBF, ..] => Encoding::Utf8,
            _ => Encoding::Ansi,
        };
        let skip = encoding.marker_len();
        self.index += skip;
        self.ahead -= skip;
        self.encoding = Some(encoding);
        Ok(encoding)
    }

    /// Append units to `buffer` up to and including the first unit matching
    /// `mask`.
    ///
    /// `buffer` is first truncated to `prior_len`, so a caller can continue a
    /// logical line in place. Returns the buffer's new length; `0` only at
    /// end of input with `prior_len == 0`. A trailing partial unit is
    /// dropped.
    pub fn read_line<U: CodeUnit>(
        &mut self,
        buffer: &mut Vec<U>,
        mask: ClassMask,
        prior_len: usize,
    ) -> usize {
        buffer.truncate(prior_len);
        let big_endian = self.encoding == Some(Encoding::Utf16Be);
        loop {
            while self.ahead >= U::WIDTH {
                let bytes = &self.chunk[self.index..self.index + U::WIDTH];
                let unit = U::from_bytes(bytes, big_endian);
                self.index += U::WIDTH;
                self.ahead -= U::WIDTH;
                buffer.push(unit);
                if self.classes.test(unit.byte(), mask) {
                    return buffer.len();
                }
            }
            if !self.refill() {
                return buffer.len();
            }
        }
    }

    /// Move the unconsumed tail to the front and read more behind it.
    fn refill(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        self.chunk.copy_within(self.index..self.index + self.ahead, 0);
        self.index = 0;
        loop {
            match self.source.read(&mut self.chunk[self.ahead..]) {
                Ok(0) => {
                    self.exhausted = true;
                    return false;
                }
                Ok(n) => {
                    self.ahead += n;
                    return true;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(?err, "stream read failed; treating as end of input");
                    self.exhausted = true;
                    return false;
                }
            }
        }
    }
}

impl<R> fmt::Debug for LineReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineReader")
            .field("index", &self.index)
            .field("ahead", &self.ahead)
            .field("exhausted", &self.exhausted)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Hands out at most `step` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("boom"))
        }
    }

    fn lines_u8(data: &[u8]) -> Vec<Vec<u8>> {
        let mut reader = LineReader::new(data);
        reader.read_bom().unwrap();
        let eol = reader.eol();
        let mut out = Vec::new();
        let mut buf = Vec::new();
        while reader.read_line::<u8>(&mut buf, eol, 0) > 0 {
            out.push(buf.clone());
        }
        out
    }

    #[test]
    fn detects_markers_and_consumes_them() {
        let cases: [(&[u8], Encoding); 4] = [
            (b"\xFF\xFEa\0", Encoding::Utf16Le),
            (b"\xFE\xFF\0a", Encoding::Utf16Be),
            (b"\xEF\xBB\xBFa", Encoding::Utf8),
            (b"a", Encoding::Ansi),
        ];
        for (data, expected) in cases {
            let mut reader = LineReader::new(data);
            assert_eq!(reader.read_bom().unwrap(), expected);
            assert_eq!(reader.ahead, data.len() - expected.marker_len());
        }
    }

    #[test]
    fn rejects_utf32_markers() {
        let mut reader = LineReader::new(&b"\xFF\xFE\0\0a\0\0\0"[..]);
        assert!(matches!(reader.read_bom(), Err(ScriptError::UnsupportedEncoding(_))));
        let mut reader = LineReader::new(&b"\0\0\xFE\xFF"[..]);
        assert!(matches!(reader.read_bom(), Err(ScriptError::UnsupportedEncoding(_))));
    }

    #[test]
    fn empty_stream_is_ansi_with_no_lines() {
        let mut reader = LineReader::new(&b""[..]);
        assert_eq!(reader.read_bom().unwrap(), Encoding::Ansi);
        let mut buf: Vec<u8> = Vec::new();
        assert_eq!(reader.read_line(&mut buf, reader.eol(), 0), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn lines_include_their_terminator() {
        let lines = lines_u8(b"one\ntwo\r\nthree");
        assert_eq!(lines, vec![b"one\n".to_vec(), b"two\r\n".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn lines_span_chunk_boundaries() {
        let long = "x".repeat(CHUNK_SIZE * 3 + 17);
        let text = format!("{long}\nshort\n");
        let lines = lines_u8(text.as_bytes());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), long.len() + 1);
        assert_eq!(lines[1], b"short\n".to_vec());
    }

    #[test]
    fn wide_units_survive_odd_short_reads() {
        let mut data = vec![0xFF, 0xFE];
        for unit in "ab\ncd\n".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        let mut reader = LineReader::new(Trickle { data: &data, step: 3 });
        assert_eq!(reader.read_bom().unwrap(), Encoding::Utf16Le);
        let eol = reader.eol();
        let mut buf: Vec<u16> = Vec::new();
        assert_eq!(reader.read_line(&mut buf, eol, 0), 3);
        assert_eq!(String::from_utf16_lossy(&buf), "ab\n");
        assert_eq!(reader.read_line(&mut buf, eol, 0), 3);
        assert_eq!(String::from_utf16_lossy(&buf), "cd\n");
        assert_eq!(reader.read_line(&mut buf, eol, 0), 0);
    }

    #[test]
    fn big_endian_units_decode() {
        let mut data = vec![0xFE, 0xFF];
        for unit in "hi\n".encode_utf16() {
            data.extend_from_slice(&unit.to_be_bytes());
        }
        let mut reader = LineReader::new(&data[..]);
        reader.read_bom().unwrap();
        let mut buf: Vec<u16> = Vec::new();
        reader.read_line(&mut buf, reader.eol(), 0);
        assert_eq!(u16::decode_text(&buf, Encoding::Utf16Be), "hi\n");
    }

    #[test]
    fn wide_unit_above_byte_range_never_matches() {
        // U+010A has low byte 0x0A but is not a newline.
        let mut data = vec![0xFF, 0xFE];
        for unit in "\u{10A}z\n".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        let mut reader = LineReader::new(&data[..]);
        reader.read_bom().unwrap();
        let mut buf: Vec<u16> = Vec::new();
        assert_eq!(reader.read_line(&mut buf, reader.eol(), 0), 3);
    }

    #[test]
    fn prior_len_appends_in_place() {
        let mut reader = LineReader::new(&b"abc\\\ndef\n"[..]);
        reader.read_bom().unwrap();
        let eol = reader.eol();
        let mut buf: Vec<u8> = Vec::new();
        assert_eq!(reader.read_line(&mut buf, eol, 0), 5);
        // keep "abc", drop the backslash and newline
        assert_eq!(reader.read_line(&mut buf, eol, 3), 7);
        assert_eq!(buf, b"abcdef\n".to_vec());
    }

    #[test]
    fn prior_len_at_end_of_input_returns_prior() {
        let mut reader = LineReader::new(&b"abc"[..]);
        reader.read_bom().unwrap();
        let eol = reader.eol();
        let mut buf: Vec<u8> = Vec::new();
        assert_eq!(reader.read_line(&mut buf, eol, 0), 3);
        assert_eq!(reader.read_line(&mut buf, eol, 3), 3);
        assert_eq!(reader.read_line(&mut buf, eol, 0), 0);
    }

    #[test]
    fn stream_error_reads_as_end_of_input() {
        let mut reader = LineReader::new(Broken);
        assert_eq!(reader.read_bom().unwrap(), Encoding::Ansi);
        let mut buf: Vec<u8> = Vec::new();
        assert_eq!(reader.read_line(&mut buf, reader.eol(), 0), 0);
    }

    #[test]
    fn classes_allocate_distinct_bits_until_full() {
        let mut classes = CharClass::new();
        let newline = classes.alloc(b"\n").unwrap();
        let slash = classes.alloc(b"\\").unwrap();
        assert_ne!(newline.bits(), slash.bits());
        assert!(classes.test(Some(b'\n'), newline));
        assert!(!classes.test(Some(b'\n'), slash));
        assert!(classes.test(Some(b'\\'), slash));
        assert!(!classes.test(None, newline));
        // inverted masks match everything outside the class
        assert!(classes.test(Some(b'a'), newline.inverted()));
        assert!(!classes.test(Some(b'\n'), newline.inverted()));
        for _ in 0..6 {
            assert!(classes.alloc(b" ").is_some());
        }
        assert!(classes.alloc(b" ").is_none());
    }

    #[test]
    fn custom_class_frames_on_any_member() {
        let mut reader = LineReader::new(&b"a,b;c"[..]);
        reader.read_bom().unwrap();
        let sep = reader.alloc_class(b",;").unwrap();
        let mut buf: Vec<u8> = Vec::new();
        reader.read_line(&mut buf, sep, 0);
        assert_eq!(buf, b"a,".to_vec());
        reader.read_line(&mut buf, sep, 0);
        assert_eq!(buf, b"b;".to_vec());
        reader.read_line(&mut buf, sep, 0);
        assert_eq!(buf, b"c".to_vec());
    }
}
