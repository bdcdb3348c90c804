// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end import, export and conflict scenarios.
#![allow(clippy::unwrap_used)]

use regscript_core::{
    export_file, import_reg, import_reg_file, ConflictMap, ConflictScope, ExportOptions, Exporter,
    IdentifierKind, StoreResolver, WildcardOnly,
};
use regscript_store::{KeyPath, MemoryStore, RegistryStore, RootKey, Value, ValueType};

const SAMPLE: &str = "Windows Registry Editor Version 5.00\r\n\
\r\n\
[HKCR\\CLSID\\{00000000-0000-0000-0000-000000000001}]\r\n\
@=\"Sample Component\"\r\n\
\"ThreadingModel\"=\"Both\"\r\n";

fn open(store: &MemoryStore, path: &str) -> regscript_store::KeyId {
    store.open_path(&KeyPath::parse(path).unwrap()).unwrap()
}

fn export_text(store: &MemoryStore, root: RootKey, options: &ExportOptions) -> String {
    let resolver = StoreResolver::new(store);
    let mut out = Vec::new();
    Exporter::new(store, &resolver, options).export_root(root, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn sample_clsid_block_imports() {
    let mut store = MemoryStore::new();
    let stats = import_reg(SAMPLE.as_bytes(), &mut store).unwrap();
    assert_eq!(stats.keys_opened, 1);
    assert_eq!(stats.values_set, 2);
    assert_eq!(stats.skipped, 0);

    let key = open(&store, r"HKCR\CLSID\{00000000-0000-0000-0000-000000000001}");
    let default = store.get_value(&key, None).unwrap();
    assert_eq!(default.kind(), ValueType::String);
    assert_eq!(default.text().as_deref(), Some("Sample Component"));
    let model = store.get_value(&key, Some("ThreadingModel")).unwrap();
    assert_eq!(model, Value::string("Both"));
}

#[test]
fn narrow_expandable_string_widening() {
    let mut store = MemoryStore::new();
    let text = "[HKLM\\Demo]\n\"Data\"=hex(2):41,00,42,00\n\"Narrow\"=hex(2):41,42\n";
    import_reg(text.as_bytes(), &mut store).unwrap();
    let key = open(&store, r"HKLM\Demo");

    let data = store.get_value(&key, Some("Data")).unwrap();
    let narrow = store.get_value(&key, Some("Narrow")).unwrap();
    assert_eq!(data.kind(), ValueType::ExpandableString);
    assert_eq!(data.data(), &[0x41, 0x00, 0x42, 0x00]);
    assert_eq!(narrow, data);
}

#[test]
fn export_relocates_paths_under_the_root() {
    let mut store = MemoryStore::new();
    let key = store.create_path(&KeyPath::parse(r"HKLM\Software\Demo").unwrap()).unwrap();
    store.set_value(&key, None, Value::string(r"C:\Program Files\Demo\bin\x.dll")).unwrap();

    let options = ExportOptions {
        relocation_root: Some(r"C:\Program Files\Demo".to_owned()),
        ..ExportOptions::default()
    };
    let text = export_text(&store, RootKey::LocalMachine, &options);
    assert!(text.contains(r"'Demo' = s '%ROOT%\bin\x.dll'"), "{text}");
}

#[test]
fn conflict_between_two_sources() {
    let mut map = ConflictMap::new();
    map.add("X", "a");
    assert_eq!(map.for_each_conflict(|_, _| {}), 0);
    map.add("X", "b");
    let mut seen = Vec::new();
    assert_eq!(map.for_each_conflict(|id, list| seen.push(format!("{id}={}", list.join(",")))), 1);
    assert_eq!(seen, vec!["X=a,b".to_owned()]);
}

#[test]
fn conflicts_across_imported_files() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.reg");
    let second = dir.path().join("second.reg");
    let one = "REGEDIT4\n[HKCR\\CLSID\\{A}]\n@=\"one\"\n[HKCR\\TypeLib\\{T}]\n";
    let two = "REGEDIT4\n[HKCR\\CLSID\\{A}]\n@=\"two\"\n[HKCR\\CLSID\\{B}]\n";
    std::fs::write(&first, one).unwrap();
    std::fs::write(&second, two).unwrap();

    let mut scope = ConflictScope::new();
    for path in [&first, &second] {
        let mut store = MemoryStore::new();
        import_reg_file(path, &mut store).unwrap();
        let name = path.file_name().unwrap().to_string_lossy();
        scope.collect(&store, &name).unwrap();
    }
    let mut seen = Vec::new();
    let total = scope.for_each_conflict(|kind, id, list| {
        seen.push((kind, id.to_owned(), list.join(":")));
    });
    assert_eq!(total, 1);
    assert_eq!(
        seen,
        vec![(IdentifierKind::ClassId, "{A}".to_owned(), "first.reg:second.reg".to_owned())]
    );
}

#[test]
fn export_file_writes_crlf_script() {
    let mut store = MemoryStore::new();
    import_reg(SAMPLE.as_bytes(), &mut store).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.rgs");
    let options = ExportOptions::default();
    let stats = export_file(&store, &WildcardOnly, &options, RootKey::ClassesRoot, &path).unwrap();
    assert_eq!(stats.keys, 3);
    assert_eq!(stats.values, 2);

    let text = std::fs::read_to_string(&path).unwrap();
    let expected = "HKCR\r\n{\r\n\t'CLSID'\r\n\t{\r\n\
\t\tForceRemove '{00000000-0000-0000-0000-000000000001}' = s 'Sample Component'\r\n\t\t{\r\n\
\t\t\tval 'ThreadingModel' = s 'Both'\r\n\t\t}\r\n\t}\r\n}\r\n";
    assert_eq!(text, expected);
}

#[test]
fn export_into_missing_directory_is_stream_open() {
    let store = MemoryStore::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.rgs");
    let options = ExportOptions::default();
    let result = export_file(&store, &WildcardOnly, &options, RootKey::ClassesRoot, &path);
    let err = result.unwrap_err();
    assert!(matches!(err, regscript_core::ScriptError::StreamOpen { .. }));
}

#[test]
fn options_load_from_json() {
    let json = r#"{ "tab_width": 2, "relocation_root": "C:\\App" }"#;
    let options: ExportOptions = serde_json::from_str(json).unwrap();
    assert_eq!(options.tab_width, 2);
    assert_eq!(options.relocation_root.as_deref(), Some(r"C:\App"));
    assert_eq!(options.root_name, None);
    let defaults: ExportOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(defaults, ExportOptions::default());
}
