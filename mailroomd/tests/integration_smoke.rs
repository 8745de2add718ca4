//! Smoke integration tests for mailroomd.
//!
//! These tests run the actual mailroomd binary's `print-config` command and
//! verify the effective configuration (TOML parsing, defaults, env
//! overrides). No container engine is needed; `serve` paths that require a
//! live engine are covered by unit tests.

use std::path::PathBuf;
use std::process::Command;

/// Build the mailroomd binary (debug mode) and return its path.
fn mailroomd_binary() -> PathBuf {
    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..");
    let output = Command::new("cargo")
        .args(["build", "--bin", "mailroomd", "--workspace"])
        .current_dir(&workspace_root)
        .output()
        .expect("cargo build");
    assert!(
        output.status.success(),
        "cargo build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    workspace_root.join("target/debug/mailroomd")
}

fn print_config(config_path: &std::path::Path, envs: &[(&str, &str)]) -> serde_json::Value {
    let binary = mailroomd_binary();
    let mut command = Command::new(&binary);
    command.args(["print-config", "--config", config_path.to_str().unwrap()]);
    command.env_remove("MAILROOMD_BIND");
    command.env_remove("MAILROOM_DATA_DIR");
    command.env_remove("MAILROOM_RUNTIME");
    for (key, value) in envs {
        command.env(key, value);
    }
    let output = command.output().expect("run mailroomd print-config");
    assert!(
        output.status.success(),
        "print-config failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("parse config JSON")
}

#[test]
fn print_config_with_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = print_config(&dir.path().join("does-not-exist.toml"), &[]);

    assert_eq!(config["server"]["bind"], "127.0.0.1:7410");
    assert_eq!(config["storage"]["data_dir"], "data");
    assert_eq!(config["watcher"]["poll_interval_ms"], 1000);
    assert_eq!(config["watcher"]["main_group_folder"], "main");
    assert!(config["runtime"]["engine_override"].is_null());
}

#[test]
fn print_config_reads_toml_values() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("mailroom.toml");
    std::fs::write(
        &config_path,
        r#"
[server]
bind = "127.0.0.1:9999"

[watcher]
poll_interval_ms = 250

[runtime]
engine_override = "docker"
"#,
    )
    .unwrap();

    let config = print_config(&config_path, &[]);

    assert_eq!(config["server"]["bind"], "127.0.0.1:9999");
    assert_eq!(config["watcher"]["poll_interval_ms"], 250);
    assert_eq!(config["runtime"]["engine_override"], "docker");
    // Missing sections fall back to defaults.
    assert_eq!(config["storage"]["data_dir"], "data");
}

#[test]
fn print_config_applies_env_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let config = print_config(
        &dir.path().join("does-not-exist.toml"),
        &[
            ("MAILROOMD_BIND", "127.0.0.1:7777"),
            ("MAILROOM_RUNTIME", "container"),
        ],
    );

    assert_eq!(config["server"]["bind"], "127.0.0.1:7777");
    assert_eq!(config["runtime"]["engine_override"], "container");
}
