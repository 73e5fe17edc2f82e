use std::fs;
use std::time::Duration;

use vmprov::config::{EngineConfig, RawEngineConfig, load_and_validate, load_or_default};
use vmprov::errors::VmprovError;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Vmprov.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn empty_file_uses_defaults() {
    let (dir, path) = write_config("");
    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.pool.min_size, 1);
    assert_eq!(cfg.pool.max_size, 3);
    assert_eq!(cfg.scripts.extension, "lua");
    assert_eq!(cfg.scripts.root, dir.path().join("scripts"));

    let options = cfg.session_options();
    assert_eq!(options.poll_interval, Duration::from_millis(100));
    assert_eq!(options.stop_grace, Duration::from_secs(5));
    assert_eq!(options.timeout, None);
}

#[test]
fn all_sections_are_read() {
    let (_dir, path) = write_config(
        r#"
[pool]
min_size = 2
max_size = 5

[scripts]
root = "/opt/vmprov/scripts"
extension = "luau"

[session]
poll_interval_ms = 25
stop_grace_ms = 750
timeout_secs = 1800
"#,
    );
    let cfg = load_and_validate(&path).unwrap();

    assert_eq!((cfg.pool.min_size, cfg.pool.max_size), (2, 5));
    assert_eq!(cfg.scripts.root, std::path::PathBuf::from("/opt/vmprov/scripts"));
    assert_eq!(cfg.scripts.extension, "luau");

    let options = cfg.session_options();
    assert_eq!(options.poll_interval, Duration::from_millis(25));
    assert_eq!(options.stop_grace, Duration::from_millis(750));
    assert_eq!(options.timeout, Some(Duration::from_secs(1800)));
}

#[test]
fn invalid_values_are_rejected() {
    let cases = [
        ("[pool]\nmax_size = 0\nmin_size = 0", "max_size"),
        ("[pool]\nmin_size = 4\nmax_size = 2", "min_size"),
        ("[scripts]\nextension = \"\"", "extension"),
        ("[scripts]\nextension = \".lua\"", "without the dot"),
        ("[session]\npoll_interval_ms = 0", "poll_interval_ms"),
        ("[session]\ntimeout_secs = 0", "timeout_secs"),
    ];

    for (toml, needle) in cases {
        let (_dir, path) = write_config(toml);
        match load_and_validate(&path) {
            Err(VmprovError::ConfigError(msg)) => {
                assert!(msg.contains(needle), "{toml:?}: {msg}")
            }
            other => panic!("{toml:?}: expected config error, got {other:?}"),
        }
    }
}

#[test]
fn unknown_keys_and_bad_toml_are_parse_errors() {
    for toml in ["[pool]\nsize = 3", "[pool\nmin_size = 1"] {
        let (_dir, path) = write_config(toml);
        assert!(matches!(
            load_and_validate(&path),
            Err(VmprovError::TomlError(_))
        ));
    }
}

#[test]
fn missing_file_falls_back_to_defaults_only_for_load_or_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    assert!(matches!(load_and_validate(&path), Err(VmprovError::IoError(_))));

    let cfg = load_or_default(&path).unwrap();
    assert_eq!(cfg.pool, EngineConfig::default().pool);
    assert_eq!(cfg.scripts.root, dir.path().join("scripts"));
}

#[test]
fn try_from_raw_validates() {
    let mut raw = RawEngineConfig::default();
    assert!(EngineConfig::try_from(raw.clone()).is_ok());

    raw.pool.max_size = 0;
    raw.pool.min_size = 0;
    assert!(EngineConfig::try_from(raw).is_err());
}
