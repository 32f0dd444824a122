//! CLI exit-code behavior that doesn't need a browser: config and request
//! validation fail before any engine acquisition.

use std::process::Command;
use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rasterpool"))
}

#[test]
fn render_missing_artifact_exits_with_render_failure() {
    let out = bin()
        .args(["render", "/no/such/artifact.html", "--output", "/tmp/unused.png"])
        .output()
        .expect("run rasterpool");
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("artifact"),
        "stderr should explain the missing artifact, got: {stderr}"
    );
}

#[test]
fn render_with_unreadable_config_exits_with_config_failure() {
    let out = bin()
        .args([
            "render",
            "https://example.com",
            "--config",
            "/no/such/config.toml",
        ])
        .output()
        .expect("run rasterpool");
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn render_with_invalid_config_values_exits_with_config_failure() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = dir.path().join("config.toml");
    std::fs::write(&cfg, "max_concurrent = 0\n").expect("write config");

    let out = bin()
        .args([
            "render",
            "https://example.com",
            "--config",
            cfg.to_str().unwrap(),
        ])
        .output()
        .expect("run rasterpool");
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("max_concurrent"), "got: {stderr}");
}

#[test]
fn render_rejects_quality_for_png_before_touching_the_browser() {
    let out = bin()
        .args([
            "render",
            "https://example.com",
            "--image-type",
            "png",
            "--quality",
            "80",
        ])
        .output()
        .expect("run rasterpool");
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("jpeg"), "got: {stderr}");
}

#[test]
fn help_lists_both_subcommands() {
    let out = bin().arg("--help").output().expect("run rasterpool");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("render"));
    assert!(stdout.contains("probe"));
}
