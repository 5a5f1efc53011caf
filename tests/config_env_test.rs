use inwatch::Settings;
use std::env;
use tempfile::TempDir;

// Environment is process-wide, so every override is checked in one test.
#[test]
fn test_env_override_with_nested_keys() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &config_path,
        r#"
[listener]
stop_grace_ms = 100
buffer_size = 8192
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("INWATCH_LISTENER__STOP_GRACE_MS", "750");
        env::set_var("INWATCH_NOTIFY__SHOW_HIDDEN", "true");
        env::set_var("INWATCH_REGISTRY_PATH", "/var/lib/inwatch/watches.json");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("INWATCH_LISTENER__STOP_GRACE_MS");
        env::remove_var("INWATCH_NOTIFY__SHOW_HIDDEN");
        env::remove_var("INWATCH_REGISTRY_PATH");
    }

    // env beats the file
    assert_eq!(settings.listener.stop_grace_ms, 750);
    // file beats the defaults
    assert_eq!(settings.listener.buffer_size, 8192);
    assert!(settings.notify.show_hidden);
    assert_eq!(
        settings.registry_path,
        std::path::PathBuf::from("/var/lib/inwatch/watches.json")
    );
    assert_eq!(settings.listener.channel_capacity, 256);
}
