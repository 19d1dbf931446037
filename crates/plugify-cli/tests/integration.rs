//! Integration tests for plugify-gen

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn fixture_config_path() -> PathBuf {
    fixtures().join("plugify-gen.toml")
}

fn demo_plugin() -> PathBuf {
    fixtures().join("DemoPlugin")
}

/// Command with the fixture config and a throwaway config dir for the run log
fn gen_cmd(home: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("plugify-gen");
    cmd.env("PLUGIFY_GEN_CONFIG", fixture_config_path());
    cmd.env("XDG_CONFIG_HOME", home.path());
    cmd.env_remove("PLUGIFY_LOG");
    cmd
}

fn home() -> TempDir {
    match TempDir::new() {
        Ok(dir) => dir,
        Err(e) => panic!("failed to create temp dir: {}", e),
    }
}

#[test]
fn test_version() {
    let home = home();
    gen_cmd(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("plugify-gen"));
}

#[test]
fn test_help() {
    let home = home();
    gen_cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plugify-gen scans annotated C# methods"));
}

#[test]
fn test_invalid_command() {
    let home = home();
    gen_cmd(&home).arg("invalid").assert().failure();
}

#[test]
fn test_generate_requires_source() {
    let home = home();
    gen_cmd(&home).arg("generate").assert().failure();
}

#[test]
fn test_generate_writes_artifacts() -> Result<(), Box<dyn std::error::Error>> {
    let home = home();
    let out = TempDir::new()?;
    gen_cmd(&home)
        .arg("generate")
        .arg(demo_plugin())
        .arg("--out")
        .arg(out.path())
        .assert()
        .success();

    let manifest = fs::read_to_string(out.path().join("DemoPlugin.pplugin"))?;
    let document: serde_json::Value = serde_json::from_str(&manifest)?;
    assert_eq!(document["name"], "DemoPlugin");
    assert_eq!(document["version"], "1.2.0");
    assert_eq!(document["author"], "Fixture Author");
    assert_eq!(document["description"], "Fixture plugin for plugify-gen");
    assert_eq!(document["entry"], "DemoPlugin.dll");
    assert_eq!(document["language"], "dotnet");

    let combine = &document["methods"][0];
    assert_eq!(combine["name"], "Combine");
    assert_eq!(combine["funcName"], "DemoPlugin.Api.Combine");
    assert_eq!(combine["paramTypes"][1]["type"], "float");
    assert_eq!(combine["paramTypes"][1]["ref"], "ref");
    assert_eq!(combine["paramTypes"][2]["type"], "string[]");
    assert!(combine["paramTypes"][0].get("ref").is_none());
    assert_eq!(combine["retType"]["type"], "int64");

    let set_mode = &document["methods"][1];
    assert_eq!(set_mode["paramTypes"][0]["type"], "int32");
    assert_eq!(set_mode["paramTypes"][0]["enum"]["name"], "Mode");
    assert_eq!(set_mode["paramTypes"][1]["type"], "function");
    assert_eq!(set_mode["paramTypes"][1]["prototype"]["name"], "OnTick");

    for file in [
        "PlugifyManifest.g.cs",
        "PluginExports.g.cs",
        "DemoPlugin.Api.Imports.g.cs",
    ] {
        assert!(out.path().join(file).exists(), "missing {}", file);
    }
    let imports = fs::read_to_string(out.path().join("DemoPlugin.Api.Imports.g.cs"))?;
    assert!(imports.contains("NativeMethods.CreateVariant(value)"));
    assert!(imports.contains("fixed (int* __x = &x)"));
    Ok(())
}

#[test]
fn test_generate_twice_leaves_files_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let home = home();
    let out = TempDir::new()?;
    let run = || {
        gen_cmd(&home)
            .arg("generate")
            .arg(demo_plugin())
            .arg("--out")
            .arg(out.path())
            .assert()
            .success()
    };
    run();
    let first = fs::read(out.path().join("PluginExports.g.cs"))?;
    run().stderr(predicate::str::contains("0 file(s) written"));
    assert_eq!(first, fs::read(out.path().join("PluginExports.g.cs"))?);
    Ok(())
}

#[test]
fn test_dry_run_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let home = home();
    let out = TempDir::new()?;
    gen_cmd(&home)
        .args(["generate", "--dry-run", "--out"])
        .arg(out.path())
        .arg(demo_plugin())
        .assert()
        .success()
        .stdout(predicate::str::contains("DemoPlugin.pplugin"));
    assert!(fs::read_dir(out.path())?.next().is_none());
    Ok(())
}

#[test]
fn test_missing_module_fails() -> Result<(), Box<dyn std::error::Error>> {
    let home = home();
    let out = TempDir::new()?;
    gen_cmd(&home)
        .arg("generate")
        .arg(out.path().join("does-not-exist"))
        .arg("--out")
        .arg(out.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 1 module(s) failed"));
    Ok(())
}

#[test]
fn test_duplicate_exports_fail_with_nothing_written() -> Result<(), Box<dyn std::error::Error>> {
    let home = home();
    let src = TempDir::new()?;
    let out = TempDir::new()?;
    fs::write(
        src.path().join("Dup.cs"),
        r#"
namespace Dup;

public static class A
{
    [NativeExport("Run")]
    public static void Run() { }

    [NativeExport("Run")]
    public static void RunAgain() { }
}
"#,
    )?;
    gen_cmd(&home)
        .arg("generate")
        .arg(src.path())
        .arg("--out")
        .arg(out.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("export `Run` is declared by both"));
    assert!(fs::read_dir(out.path())?.next().is_none());
    Ok(())
}

#[test]
fn test_name_with_several_sources_is_rejected() {
    let home = home();
    gen_cmd(&home)
        .args(["generate", "--name", "x"])
        .arg(demo_plugin())
        .arg(demo_plugin())
        .assert()
        .failure();
}

#[test]
fn test_invalid_pointer_width() {
    let home = home();
    gen_cmd(&home)
        .args(["generate", "--pointer-width", "16"])
        .arg(demo_plugin())
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected 32 or 64"));
}

#[test]
fn test_inspect_prints_plans() {
    let home = home();
    gen_cmd(&home)
        .arg("inspect")
        .arg(demo_plugin())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"module\": \"DemoPlugin\""))
        .stdout(predicate::str::contains("\"strategy\": \"pinned-pointer\""))
        .stdout(predicate::str::contains("\"strategy\": \"variant-handle\""));
}

#[test]
fn test_config_show() {
    let home = home();
    gen_cmd(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration:"))
        .stdout(predicate::str::contains("Fixture Author"));
}

#[test]
fn test_config_get() {
    let home = home();
    gen_cmd(&home)
        .args(["config", "get", "pointer-width"])
        .assert()
        .success()
        .stdout(predicate::str::contains("64"));
}

#[test]
fn test_config_set_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let home = home();
    let dir = TempDir::new()?;
    let path = dir.path().join("plugify-gen.toml");
    gen_cmd(&home)
        .env("PLUGIFY_GEN_CONFIG", &path)
        .args(["config", "set", "import-marker", "__native_"])
        .assert()
        .success();
    assert!(fs::read_to_string(&path)?.contains("import-marker = \"__native_\""));

    gen_cmd(&home)
        .env("PLUGIFY_GEN_CONFIG", &path)
        .args(["config", "set", "pointer-width", "48"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_config_path() {
    let home = home();
    gen_cmd(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plugify-gen.toml"));
}
