use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use hueforge_config::ActionKind;
use hueforge_config::Binding;
use hueforge_config::Block;
use hueforge_config::Code;
use hueforge_config::Diagnostic;
use hueforge_config::Error;
use hueforge_config::LoadError;
use hueforge_config::RoomConfig;
use hueforge_config::Warning;
use tempfile::NamedTempFile;
use tempfile::TempDir;

fn write_room(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

fn rooms_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../rooms")
}

#[test]
fn test_load_room_with_label() {
    let dir = TempDir::new().unwrap();
    let path = write_room(
        &dir,
        "room.toml",
        r#"
        label = "Arbeitszimmer"

        [[block]]
        type = "state"
        name = "Arbeitszimmer state"

        [[block]]
        type = "external"
        name = "Arbeitszimmer"
        group = "Arbeitszimmer"
        bindings.34 = { type = "off" }
        "#,
    );

    let (room, diagnostics) = RoomConfig::from_file(&path).unwrap();
    assert!(diagnostics.0.is_empty());
    assert_eq!(room.label, "Arbeitszimmer");
    assert_eq!(room.blocks.len(), 2);
    let Block::External(ext) = &room.blocks[1] else {
        panic!("expected external block");
    };
    let Binding::Action(off) = &ext.bindings[&Code::from("34")] else {
        panic!("expected action");
    };
    assert_eq!(off.kind, ActionKind::Off);
}

#[test]
fn test_label_defaults_to_file_stem() {
    let dir = TempDir::new().unwrap();
    let path = write_room(
        &dir,
        "hwr.toml",
        r#"
        [[block]]
        type = "state"
        name = "HWR state"
        "#,
    );

    let (room, _) = RoomConfig::from_file(&path).unwrap();
    assert_eq!(room.label, "hwr");
}

#[test]
fn test_empty_room_warns() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "label = \"Leer\"").unwrap();

    let (room, diagnostics) = RoomConfig::from_file(file.path()).unwrap();
    assert!(room.blocks.is_empty());
    assert_eq!(diagnostics.0.len(), 1);
    assert!(matches!(
        &diagnostics.0[0],
        Diagnostic::Warning(Warning::EmptyRoom { .. })
    ));
}

#[test]
fn test_duplicate_block_names_are_errors() {
    let dir = TempDir::new().unwrap();
    let path = write_room(
        &dir,
        "dup.toml",
        r#"
        [[block]]
        type = "state"
        name = "Flur state"

        [[block]]
        type = "state"
        name = "Flur state"
        uses = 2
        "#,
    );

    let diagnostics = RoomConfig::from_file(&path).unwrap_err();
    assert_eq!(diagnostics.0.len(), 1);
    let Diagnostic::Error(Error::Duplicate(dup)) = &diagnostics.0[0] else {
        panic!("expected duplicate error, got {:?}", diagnostics.0[0]);
    };
    assert_eq!(dup.field_path, "block.Flur state");
    assert_eq!(dup.definitions.len(), 2);
}

#[test]
fn test_bad_duration_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_room(
        &dir,
        "bad.toml",
        r#"
        [[block]]
        type = "motion"
        name = "HWR Sensor"
        timeout = "3 minutes"
        dimtime = "00:00:20"
        bindings.on = { type = "scene", value = "Bright" }
        "#,
    );

    let diagnostics = RoomConfig::from_file(&path).unwrap_err();
    let Diagnostic::Error(Error::Load(LoadError::Parse { error, .. })) = &diagnostics.0[0] else {
        panic!("expected parse error, got {:?}", diagnostics.0[0]);
    };
    assert!(error.contains("3 minutes"), "unexpected error: {error}");
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let diagnostics = RoomConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(
        &diagnostics.0[0],
        Diagnostic::Error(Error::Load(LoadError::Io { .. }))
    ));
}

#[test]
fn test_sample_rooms_load() {
    let mut labels = Vec::new();
    for entry in std::fs::read_dir(rooms_dir()).unwrap() {
        let path = entry.unwrap().path();
        let (room, diagnostics) = match RoomConfig::from_file(&path) {
            Ok(loaded) => loaded,
            Err(diagnostics) => panic!("{}: {}", path.display(), diagnostics),
        };
        assert!(diagnostics.0.is_empty(), "{}: {}", path.display(), diagnostics);
        labels.push(room.label);
    }
    labels.sort();
    assert_eq!(
        labels,
        [
            "Arbeitszimmer",
            "Flure",
            "Gäste-WC",
            "HWR",
            "Julia",
            "Katarina",
            "Küche",
            "Schlafzimmer",
            "Wohnzimmer",
        ]
    );
}
