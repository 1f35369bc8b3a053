use std::path::PathBuf;
use std::time::Duration;

use cbrowse_config::{ConfigError, TypeCacheConfig};

#[test]
fn empty_config_uses_defaults() {
    let config = TypeCacheConfig::load_from_str("").unwrap();
    assert_eq!(config, TypeCacheConfig::default());
    assert!(config.enable_indexing);
    assert_eq!(config.reconcile_delay(), Duration::from_millis(300));
    assert!(config.source_extensions.iter().any(|ext| ext == "c++"));
    assert!(config.source_extensions.iter().any(|ext| ext == "inl"));
    assert!(config.effective_compute_threads() >= 1);
    assert!(config.effective_background_threads() >= 1);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn full_config_round_trips_every_section() {
    let text = r#"
enable_indexing = false
reconcile_delay_ms = 50
compute_threads = 3
background_threads = 1
source_extensions = [".CPP", "h", "h"]

[parser]
include_paths = ["include", "/usr/include"]
macros = { EXPORT = "", BASE = "RealBase" }

[logging]
level = "debug"
json = true
stderr = false
file = "/tmp/cbrowse.log"
"#;
    let config = TypeCacheConfig::load_from_str(text).unwrap();
    assert!(!config.enable_indexing);
    assert_eq!(config.reconcile_delay(), Duration::from_millis(50));
    assert_eq!(config.effective_compute_threads(), 3);
    assert_eq!(config.effective_background_threads(), 1);
    assert_eq!(config.source_extensions, vec!["cpp".to_string(), "h".to_string()]);
    assert_eq!(
        config.parser.include_paths,
        vec![PathBuf::from("include"), PathBuf::from("/usr/include")]
    );
    assert_eq!(config.parser.macros.get("EXPORT").map(String::as_str), Some(""));
    assert!(config.logging.json);
    assert!(!config.logging.stderr);
    assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/cbrowse.log")));
}

#[test]
fn zero_thread_counts_are_clamped() {
    let config = TypeCacheConfig::load_from_str("compute_threads = 0").unwrap();
    assert_eq!(config.effective_compute_threads(), 1);
}

#[test]
fn unknown_keys_are_rejected() {
    let err = TypeCacheConfig::load_from_str("[logging]\ncolour = true").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err}");
}

#[test]
fn missing_file_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = TypeCacheConfig::load_from_path(&path).unwrap_err();
    match err {
        ConfigError::Io { path: reported, .. } => {
            assert_eq!(reported, path.display().to_string())
        }
        other => panic!("unexpected error {other:?}"),
    }
}
