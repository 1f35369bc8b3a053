use cbrowse_config::{discover_config_path, load_for_workspace, TypeCacheConfig};

#[test]
fn workspace_without_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let (config, path) = load_for_workspace(dir.path()).unwrap();
    assert!(path.is_none());
    assert_eq!(config, TypeCacheConfig::default());
}

#[test]
fn visible_config_wins_over_hidden_one() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".cbrowse.toml"), "reconcile_delay_ms = 10").unwrap();
    assert_eq!(
        discover_config_path(dir.path()),
        Some(dir.path().join(".cbrowse.toml"))
    );

    std::fs::write(dir.path().join("cbrowse.toml"), "reconcile_delay_ms = 20").unwrap();
    let (config, path) = load_for_workspace(dir.path()).unwrap();
    assert_eq!(path, Some(dir.path().join("cbrowse.toml")));
    assert_eq!(config.reconcile_delay_ms, 20);
}
