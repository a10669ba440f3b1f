//! Integration tests for the planetmap binary.
//!
//! Each test runs the binary with a config file in a temporary directory,
//! so nothing touches the user's home directory.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn planetmap(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_planetmap"))
        .args(args)
        .env("HOME", home)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run planetmap")
}

/// A config without WMS server that logs into the temp directory.
fn offline_config(dir: &TempDir) -> String {
    let path = dir.path().join("config.ini");
    let logs = dir.path().join("logs");
    fs::write(
        &path,
        format!("[logging]\ndirectory = {}\nfile = test.log\n", logs.display()),
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_init_config_writes_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/config.ini");
    let path_str = path.to_string_lossy().into_owned();

    let output = planetmap(dir.path(), &["init-config", "--config", &path_str]);
    assert!(output.status.success());
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("[wms]"));

    fs::write(&path, "; edited\n").unwrap();
    let output = planetmap(dir.path(), &["init-config", "--config", &path_str]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("already exists"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "; edited\n");

    let output = planetmap(dir.path(), &["init-config", "--config", &path_str, "--force"]);
    assert!(output.status.success());
    assert!(fs::read_to_string(&path).unwrap().contains("[wms]"));
}

#[test]
fn test_sources_without_servers() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(&dir);

    let output = planetmap(dir.path(), &["sources", "--config", &config]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No map sources configured"));
    assert!(dir.path().join("logs/test.log").exists());
}

#[test]
fn test_render_without_sources_fails() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(&dir);
    let output_path = dir.path().join("out.png");

    let output = planetmap(
        dir.path(),
        &[
            "render",
            "--bbox",
            "-10,-5,10,5",
            "--output",
            &output_path.to_string_lossy(),
            "--config",
            &config,
        ],
    );

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no default map source"));
    assert!(!output_path.exists());
}

#[test]
fn test_render_rejects_bad_bbox() {
    let dir = TempDir::new().unwrap();

    let output = planetmap(
        dir.path(),
        &["render", "--bbox", "1,2,3", "--output", "out.png"],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("MINX,MINY,MAXX,MAXY"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.ini");
    fs::write(&path, "[tiles]\ntile_pixels = 4\n").unwrap();

    let output = planetmap(dir.path(), &["sources", "--config", &path.to_string_lossy()]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("tiles.tile_pixels"));
}
