use sl_server::config::{ConfigError, ServerConfig};

fn write_temp_config(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_from_full_file() {
    let path = write_temp_config(
        "sl_config_test_full.toml",
        r#"
bind = "127.0.0.1:9000"
workers = 3
log_level = "debug"
access_log = "/tmp/custom_access.log"
error_log = "/tmp/custom_error.log"
"#,
    );

    let cfg = ServerConfig::load_from(&path).unwrap();
    assert_eq!(cfg.bind, "127.0.0.1:9000");
    assert_eq!(cfg.workers, 3);
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.access_log, std::path::PathBuf::from("/tmp/custom_access.log"));
    assert_eq!(cfg.error_log, std::path::PathBuf::from("/tmp/custom_error.log"));
}

#[test]
fn test_load_from_partial_file_fills_defaults() {
    let path = write_temp_config("sl_config_test_partial.toml", "log_level = \"warn\"\n");

    let cfg = ServerConfig::load_from(&path).unwrap();
    assert_eq!(cfg.log_level, "warn");
    assert_eq!(cfg.bind, "0.0.0.0:8000");
    assert!(cfg.workers >= 2);
}

#[test]
fn test_load_from_missing_file_is_io_error() {
    let err = ServerConfig::load_from("/nonexistent/sl_config.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_load_from_invalid_toml_is_parse_error() {
    let path = write_temp_config("sl_config_test_bad.toml", "bind = [not toml");
    let err = ServerConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_load_from_invalid_values_is_validation_error() {
    let path = write_temp_config("sl_config_test_zero.toml", "workers = 0\n");
    let err = ServerConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}
