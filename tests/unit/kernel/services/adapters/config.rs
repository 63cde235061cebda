use super::*;
use tempfile::tempdir;

#[test]
fn test_load_settings_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{ "leading_context_line_count": 0, "include_hidden": true }"#,
    )
    .unwrap();

    let config = load_settings_from(&path).unwrap();
    assert_eq!(config.leading_context_line_count, 0);
    assert!(config.include_hidden);
    assert_eq!(config.trailing_context_line_count, 1);
}

#[test]
fn test_load_settings_reports_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = load_settings_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_load_settings_missing_file() {
    let dir = tempdir().unwrap();
    let err = load_settings_from(&dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_ensure_settings_file_writes_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(".zfind").join("settings.json");

    ensure_settings_file_at(&path).unwrap();
    assert!(path.is_file());
    assert_eq!(load_settings_from(&path).unwrap(), FindConfig::default());
}

#[test]
fn test_ensure_settings_file_keeps_existing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let custom = r#"{ "include_hidden": true }"#;
    std::fs::write(&path, custom).unwrap();

    ensure_settings_file_at(&path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), custom);
}
