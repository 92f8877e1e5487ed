//! End-to-end configuration loading from a scratch directory.

use std::fs;

use plg_sdk::config::{validate_config, ConfigError, ConfigPaths, ConfigStore, ConfigValue};

fn write_config(dir: &std::path::Path, text: &str) {
    fs::write(dir.join("plg-sdk-config.toml"), text).unwrap();
}

#[test]
fn test_defaults_without_user_file() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ConfigPaths::in_dir(dir.path());

    let store = ConfigStore::init(&paths).unwrap();
    assert!(paths.work_dir.is_dir());
    assert!(!store.get_bool("plg-sdk.debug", true));
    assert_eq!(store.get_str("project.version"), Some("0.1.0"));

    // name and author default to unset.
    let report = validate_config(&store);
    assert_eq!(report.errors().len(), 2);
}

#[test]
fn test_user_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        r#"
[plg-sdk]
debug = "True"
python = "/opt/python/bin/python3"

[project]
name = "demo"
author = "team"
version = "2.0-beta1"
future_option = "ignored"

[modules]
allowed = ["plg-build", "plg-lint"]

[unknown]
key = 1
"#,
    );

    let store = ConfigStore::init(&ConfigPaths::in_dir(dir.path())).unwrap();
    assert!(store.get_bool("plg-sdk.debug", false));
    assert_eq!(
        store.get("plg-sdk.python").and_then(ConfigValue::as_path),
        Some(std::path::Path::new("/opt/python/bin/python3"))
    );
    assert_eq!(store.get("project.future_option"), None);
    assert_eq!(store.get("project.namespace"), Some(&ConfigValue::Derived));

    let report = validate_config(&store);
    assert!(report.is_ok(), "{:?}", report.errors());
    assert_eq!(report.warnings().len(), 1);
    assert!(report.warnings()[0].contains("2.0b1"));
}

#[test]
fn test_wrongly_typed_user_value_stops_loading() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), "[modules]\nallowed = \"plg-build\"\n");

    let err = ConfigStore::init(&ConfigPaths::in_dir(dir.path())).unwrap_err();
    assert!(matches!(err, ConfigError::TypeCast { ref key, .. } if key == "modules.allowed"));
}

#[test]
fn test_unparseable_user_file_stops_loading() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), "[project\n");

    let err = ConfigStore::init(&ConfigPaths::in_dir(dir.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_schema_override() {
    let dir = tempfile::tempdir().unwrap();
    let schema_path = dir.path().join("schema.json");
    fs::write(
        &schema_path,
        r#"{
            "allowed_modules": ["only-one"],
            "config": {
                "modules": {"allowed": {"type": "array_of_string", "default": ["all"]}}
            }
        }"#,
    )
    .unwrap();
    write_config(dir.path(), "[modules]\nallowed = [\"only-one\", \"other\"]\n");

    let mut paths = ConfigPaths::in_dir(dir.path());
    paths.schema = Some(schema_path);
    let store = ConfigStore::init(&paths).unwrap();

    assert_eq!(store.modules(), ["only-one"]);
    let report = validate_config(&store);
    let module_errors: Vec<_> = report
        .errors()
        .iter()
        .filter(|e| e.starts_with("MODULES.allowed"))
        .collect();
    assert_eq!(module_errors.len(), 1);
    assert!(module_errors[0].contains("\"other\""));
}

#[test]
fn test_missing_schema_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = ConfigPaths::in_dir(dir.path());
    paths.schema = Some(dir.path().join("missing.json"));

    let err = ConfigStore::init(&paths).unwrap_err();
    assert!(matches!(err, ConfigError::SchemaLoad { .. }));
}
