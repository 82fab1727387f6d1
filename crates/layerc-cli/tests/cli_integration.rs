//! CLI subprocess integration tests.
//!
//! These tests invoke the `layerc` binary as a subprocess and verify exit
//! codes, stdout content, and JSON output shape. Builds use the in-memory
//! executor so no root or btrfs is needed.

use std::path::{Path, PathBuf};
use std::process::Command;

fn layerc_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_layerc"));
    cmd.env("LAYERC_SKIP_PREREQS", "1");
    cmd.env_remove("LAYERC_LOG");
    cmd
}

const BASE: &str = r#"declaration_version = 1

[layer]
target = "//images:base"

[[items]]
kind = "copy_file"
source = "motd"
dest = "/etc/app/"
mode = "0600"

[[items]]
kind = "make_dirs"
into_dir = "/"
path_to_make = "etc/app"
user = "12"
group = "34"
"#;

fn write_base(dir: &Path) -> PathBuf {
    std::fs::write(dir.join("motd"), b"hello\n").unwrap();
    let path = dir.join("layer.toml");
    std::fs::write(&path, BASE).unwrap();
    path
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn cli_version_exits_zero() {
    let output = layerc_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("layerc"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_commands() {
    let output = layerc_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["plan", "build", "render"] {
        assert!(stdout.contains(cmd), "help should list '{cmd}'");
    }
}

#[test]
fn cli_unknown_subcommand_fails() {
    let output = layerc_bin().arg("frobnicate").output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn cli_plan_text_lists_steps_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let decl = write_base(dir.path());
    let output = layerc_bin().args(["plan"]).arg(&decl).output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("//images:base"));
    assert!(stdout.contains("3 steps"));
    let root = stdout.find("create empty root").unwrap();
    let dirs = stdout.find("make dirs").unwrap();
    assert!(root < dirs);
}

#[test]
fn cli_plan_json_orders_dirs_before_file() {
    let dir = tempfile::tempdir().unwrap();
    let decl = write_base(dir.path());
    let output = layerc_bin()
        .args(["--json", "plan"])
        .arg(&decl)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["target"], "//images:base");
    let kinds: Vec<&str> = json["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["filesystem_root", "make_dirs", "copy_file"]);
    assert_eq!(json["steps"][0]["ordinal"], 1);
}

#[test]
fn cli_plan_conflict_exits_with_plan_error() {
    let dir = tempfile::tempdir().unwrap();
    let decl = dir.path().join("layer.toml");
    std::fs::write(
        &decl,
        r#"declaration_version = 1
[layer]
target = "//t:t"
[[items]]
kind = "make_dirs"
from_target = "//t:a"
into_dir = "/"
path_to_make = "etc"
[[items]]
kind = "make_dirs"
from_target = "//t:b"
into_dir = "/"
path_to_make = "etc"
"#,
    )
    .unwrap();
    let output = layerc_bin().arg("plan").arg(&decl).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("conflict:"), "stderr: {stderr}");
    assert!(stderr.contains("/etc"));
}

#[test]
fn cli_plan_missing_requirement_exits_with_plan_error() {
    let dir = tempfile::tempdir().unwrap();
    let decl = dir.path().join("layer.toml");
    std::fs::write(
        &decl,
        r#"declaration_version = 1
[layer]
target = "//t:t"
[[items]]
kind = "make_dirs"
into_dir = "/no_dir"
path_to_make = "x"
"#,
    )
    .unwrap();
    let output = layerc_bin().arg("plan").arg(&decl).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing requirement:"), "stderr: {stderr}");
}

#[test]
fn cli_plan_invalid_declaration_exits_with_declaration_error() {
    let dir = tempfile::tempdir().unwrap();
    let decl = dir.path().join("layer.toml");
    std::fs::write(&decl, "declaration_version = 2\n[layer]\ntarget = \"//t:t\"\n").unwrap();
    let output = layerc_bin().arg("plan").arg(&decl).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("declaration error:"), "stderr: {stderr}");
}

#[test]
fn cli_plan_missing_declaration_exits_with_declaration_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = layerc_bin()
        .arg("plan")
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_plan_with_parent_needs_subvolumes_dir() {
    let dir = tempfile::tempdir().unwrap();
    let decl = write_base(dir.path());
    let output = layerc_bin()
        .arg("plan")
        .arg(&decl)
        .arg("--parent-layer-json")
        .arg(dir.path().join("parent.json"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--subvolumes-dir"), "stderr: {stderr}");
}

#[test]
fn cli_build_virtual_json_reports_tree() {
    let dir = tempfile::tempdir().unwrap();
    let decl = write_base(dir.path());
    let subvols = dir.path().join("subvols");
    let output = layerc_bin()
        .args(["--json", "build"])
        .arg(&decl)
        .arg("--subvolumes-dir")
        .arg(&subvols)
        .args(["--subvolume-rel-path", "images/base"])
        .args(["--executor", "virtual", "--show-tree"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json = stdout_json(&output);
    assert_eq!(json["target"], "//images:base");
    assert_eq!(json["steps"], 3);
    assert_eq!(
        json["tree"],
        serde_json::json!(["(Dir)", {"etc": ["(Dir o12:34)", {"app": ["(Dir o12:34)", {
            "motd": ["(File m600 d6)"],
        }]}]}])
    );
    assert_eq!(json["descriptor"]["subvolume_rel_path"], "images/base");

    let descriptor_path = PathBuf::from(json["descriptor_path"].as_str().unwrap());
    assert!(descriptor_path.exists());
}

#[test]
fn cli_build_unknown_executor_fails() {
    let dir = tempfile::tempdir().unwrap();
    let decl = write_base(dir.path());
    let output = layerc_bin()
        .arg("build")
        .arg(&decl)
        .arg("--subvolumes-dir")
        .arg(dir.path().join("subvols"))
        .args(["--subvolume-rel-path", "x", "--executor", "docker"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_render_host_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::write(root.join("sub/data"), b"abc").unwrap();

    let output = layerc_bin()
        .args(["--json", "render"])
        .arg(&root)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    let sub = &json[1]["sub"];
    assert!(sub.is_array());
    let data = sub[1]["data"][0].as_str().unwrap();
    assert!(data.contains("d3"), "label: {data}");

    let output = layerc_bin().arg("render").arg(&root).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("/ (Dir"));
    assert!(stdout.contains("\n/sub (Dir"));
    assert!(stdout.contains("\n/sub/data (File"));
}

#[test]
fn cli_render_missing_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = layerc_bin()
        .arg("render")
        .arg(dir.path().join("missing"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}
