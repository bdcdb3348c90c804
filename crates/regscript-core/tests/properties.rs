// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property tests for line framing and value decoding.
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use regscript_core::import_reg;
use regscript_store::{KeyPath, MemoryStore, RegistryStore, Value};

fn import(bytes: &[u8]) -> MemoryStore {
    let mut store = MemoryStore::new();
    import_reg(bytes, &mut store).unwrap();
    store
}

fn value(store: &MemoryStore, name: &str) -> Option<Value> {
    let key = store.open_path(&KeyPath::parse(r"HKLM\P").unwrap())?;
    store.get_value(&key, Some(name))
}

fn utf16le(text: &str) -> Vec<u8> {
    let mut out = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

fn hex_list(bytes: &[u8]) -> Vec<String> {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        let mut store = MemoryStore::new();
        let _ = import_reg(&bytes[..], &mut store);
    }

    #[test]
    fn arbitrary_lines_after_a_header_never_panic(body in "[ -~\t\r\n]{0,512}") {
        let text = format!("[HKLM\\P]\n{body}");
        let mut store = MemoryStore::new();
        prop_assert!(import_reg(text.as_bytes(), &mut store).is_ok());
    }

    #[test]
    fn continuation_matches_single_line(
        bytes in prop::collection::vec(any::<u8>(), 1..64),
        cuts in prop::collection::vec(any::<bool>(), 64),
    ) {
        let items = hex_list(&bytes);
        let single = format!("[HKLM\\P]\n\"v\"=hex:{}\n", items.join(","));
        let mut split = String::from("[HKLM\\P]\n\"v\"=hex:");
        for (at, item) in items.iter().enumerate() {
            if at > 0 {
                split.push(',');
                if cuts[at] {
                    split.push_str("\\\r\n  ");
                }
            }
            split.push_str(item);
        }
        split.push('\n');

        let one = value(&import(single.as_bytes()), "v");
        let many = value(&import(split.as_bytes()), "v");
        prop_assert_eq!(one.clone(), many);
        let one = one.unwrap();
        prop_assert_eq!(one.data(), &bytes[..]);
    }

    #[test]
    fn non_string_values_ignore_source_encoding(
        bytes in prop::collection::vec(any::<u8>(), 0..32),
        dword in any::<u32>(),
    ) {
        let text = format!(
            "[HKLM\\P]\r\n\"b\"=hex:{}\r\n\"d\"=dword:{dword:08x}\r\n\"q\"=hex(b):{}\r\n",
            hex_list(&bytes).join(","),
            hex_list(&dword.to_le_bytes()).join(","),
        );
        let narrow = import(text.as_bytes());
        let wide = import(&utf16le(&text));
        for name in ["b", "d", "q"] {
            prop_assert_eq!(value(&narrow, name), value(&wide, name));
        }
        prop_assert_eq!(value(&narrow, "d"), Some(Value::int32(dword)));
    }

    #[test]
    fn string_values_differ_only_by_widening(bytes in prop::collection::vec(0x20u8..0x7f, 1..32)) {
        let text = format!("[HKLM\\P]\r\n\"s\"=hex(2):{}\r\n", hex_list(&bytes).join(","));
        let narrow = value(&import(text.as_bytes()), "s").unwrap();
        let wide = value(&import(&utf16le(&text)), "s").unwrap();
        prop_assert_eq!(wide.data(), &bytes[..]);
        let widened: Vec<u8> = bytes.iter().flat_map(|&b| [b, 0]).collect();
        prop_assert_eq!(narrow.data(), &widened[..]);
    }

    #[test]
    fn quoted_strings_agree_across_encodings(text in "[a-zA-Z0-9 .,:;!?()_-]{0,40}") {
        let script = format!("[HKLM\\P]\r\n\"s\"=\"{text}\"\r\n");
        let narrow = value(&import(script.as_bytes()), "s");
        let wide = value(&import(&utf16le(&script)), "s");
        prop_assert_eq!(narrow.clone(), wide);
        prop_assert_eq!(narrow, Some(Value::string(&text)));
    }
}
