use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn write(dir: &Path, name: &str, json: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, json).unwrap();
    path
}

#[allow(deprecated)]
fn blocksync() -> Command {
    Command::cargo_bin("blocksync").unwrap()
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_rank_between_bounds() {
    blocksync()
        .args(["rank", "--after", "a0", "--before", "a1"])
        .assert()
        .success()
        .stdout("a0V\n");
}

#[test]
fn test_rank_count_is_ordered() {
    blocksync()
        .args(["rank", "--count", "3"])
        .assert()
        .success()
        .stdout("G\nV\nl\n");
}

#[test]
fn test_diff_inserts_between_existing_siblings() {
    let dir = tempdir().unwrap();
    let flat = write(
        dir.path(),
        "flat.json",
        r#"[
            {"id": "a", "type": "paragraph", "rank": "a0"},
            {"id": "b", "type": "paragraph", "rank": "a1"}
        ]"#,
    );
    let tree = write(
        dir.path(),
        "tree.json",
        r#"[
            {"id": "a", "type": "paragraph"},
            {"id": "c", "type": "paragraph"},
            {"id": "b", "type": "paragraph"}
        ]"#,
    );

    let diff = stdout_json(blocksync().arg("diff").arg(&flat).arg(&tree));
    let created = diff["toCreate"].as_array().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["id"], "c");
    let rank = created[0]["rank"].as_str().unwrap();
    assert!("a0" < rank && rank < "a1", "{rank}");
    assert_eq!(diff["toUpdate"].as_array().unwrap().len(), 0);
    assert_eq!(diff["toDelete"].as_array().unwrap().len(), 0);
}

#[test]
fn test_flatten_then_build() {
    let dir = tempdir().unwrap();
    let tree = write(
        dir.path(),
        "tree.json",
        r#"[{"id": "list", "type": "bulletListItem", "children": [{"id": "item", "type": "paragraph"}]}]"#,
    );

    let flat = stdout_json(blocksync().arg("flatten").arg(&tree));
    let records = flat.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["parentId"], "list");

    let flat_path = write(dir.path(), "flat.json", &flat.to_string());
    let rebuilt = stdout_json(blocksync().arg("build").arg(&flat_path));
    assert_eq!(rebuilt[0]["id"], "list");
    assert_eq!(rebuilt[0]["children"][0]["id"], "item");
}

#[test]
fn test_replay_syncs_each_tree() {
    let dir = tempdir().unwrap();
    let seed = write(dir.path(), "seed.json", "[]");
    let first = write(
        dir.path(),
        "first.json",
        r#"[{"id": "a", "type": "paragraph"}, {"id": "b", "type": "paragraph"}]"#,
    );
    let second = write(dir.path(), "second.json", r#"[{"id": "b", "type": "paragraph"}]"#);

    let out = stdout_json(blocksync().arg("replay").arg(&seed).arg(&first).arg(&second));
    assert_eq!(out["passes"][0]["created"], 2);
    assert_eq!(out["passes"][1]["deleted"], 1);
    assert_eq!(out["status"]["phase"], "closed");
    let blocks = out["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["id"], "b");
}

#[test]
fn test_missing_file_fails() {
    blocksync()
        .args(["build", "/nonexistent/flat.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading /nonexistent/flat.json"));
}

#[test]
fn test_bad_config_fails() {
    let dir = tempdir().unwrap();
    let config = write(dir.path(), "blocksync.toml", r#"delete_policy = "sometimes""#);
    blocksync()
        .arg("--config")
        .arg(&config)
        .args(["rank"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}
