// SPDX-License-Identifier: Apache-2.0

use assert_cmd::Command;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::tempdir;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/feed.xml")
}

fn epgcast() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_epgcast"));
    cmd.env_remove("EPGCAST_LOG_LEVEL");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let output = epgcast()
        .args(["publish", "--no-such-flag"])
        .output()
        .expect("run epgcast");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("usage_error"), "{stderr}");
}

#[test]
fn publish_then_status_report_the_same_checksum() {
    let tmp = tempdir().expect("tmp");
    let root = tmp.path().join("data");

    let publish = epgcast()
        .arg("--json")
        .arg("publish")
        .arg("--feed")
        .arg(fixture())
        .arg("--root")
        .arg(&root)
        .output()
        .expect("run publish");
    assert!(publish.status.success(), "{}", String::from_utf8_lossy(&publish.stderr));
    let body = stdout_json(&publish);
    assert_eq!(body["code"], 0);
    assert_eq!(body["message"], "ok");
    let checksum = body["data"]["checksum"].as_str().expect("checksum").to_string();
    assert_eq!(checksum.len(), 8);
    assert_eq!(
        body["data"]["index_file"],
        format!("EPG_DATA/epg_index_{checksum}.json")
    );
    assert_eq!(body["data"]["artifacts_written"], 4);
    assert!(root.join(format!("epg_index_{checksum}.json")).is_file());

    let again = epgcast()
        .arg("--json")
        .arg("publish")
        .arg("--feed")
        .arg(fixture())
        .arg("--root")
        .arg(&root)
        .output()
        .expect("run publish again");
    let body = stdout_json(&again);
    assert_eq!(body["message"], "no change");
    assert_eq!(body["data"]["checksum"], checksum.as_str());
    assert_eq!(body["data"]["artifacts_reused"], 4);

    let status = epgcast()
        .arg("--json")
        .arg("status")
        .arg("--root")
        .arg(&root)
        .output()
        .expect("run status");
    assert!(status.status.success());
    let body = stdout_json(&status);
    assert_eq!(body["data"]["checksum"], checksum.as_str());
    assert_eq!(
        body["data"]["dates"],
        serde_json::json!(["2024-03-06", "2024-03-07"])
    );
    assert_eq!(body["data"]["artifacts"], 4);
}

#[test]
fn status_on_empty_root_fails() {
    let tmp = tempdir().expect("tmp");
    let output = epgcast()
        .arg("status")
        .arg("--root")
        .arg(tmp.path())
        .output()
        .expect("run status");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nothing published"), "{stderr}");
}

#[test]
fn inspect_counts_partitions_per_date() {
    let output = epgcast()
        .arg("--json")
        .arg("inspect")
        .arg("--feed")
        .arg(fixture())
        .output()
        .expect("run inspect");
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["data"]["partitions"], 4);
    assert_eq!(body["data"]["programmes"], 5);
    assert_eq!(body["data"]["dates"]["2024-03-06"]["channels"], 3);
    assert_eq!(body["data"]["dates"]["2024-03-06"]["programmes"], 4);
    assert_eq!(body["data"]["dates"]["2024-03-07"]["programmes"], 1);

    let skipped = epgcast()
        .args(["--json", "inspect", "--orphans", "skip", "--feed"])
        .arg(fixture())
        .output()
        .expect("run inspect skip");
    let body = stdout_json(&skipped);
    assert_eq!(body["data"]["partitions"], 3);
    assert_eq!(body["data"]["skipped_orphans"], 1);
}

#[test]
fn malformed_feed_exits_with_validation_code_and_writes_nothing() {
    let tmp = tempdir().expect("tmp");
    let feed = tmp.path().join("broken.xml");
    std::fs::write(
        &feed,
        r#"<tv><programme start="20240306200000 -0300" channel="a.br"><title>x</title></tv>"#,
    )
    .expect("write feed");
    let root = tmp.path().join("data");

    let output = epgcast()
        .arg("--json")
        .arg("publish")
        .arg("--feed")
        .arg(&feed)
        .arg("--root")
        .arg(&root)
        .output()
        .expect("run publish");
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    let envelope = stderr
        .lines()
        .find(|line| line.starts_with('{'))
        .expect("error envelope on stderr");
    let err: Value = serde_json::from_str(envelope).expect("json envelope");
    assert_eq!(err["code"], 1);
    assert_eq!(err["data"]["error"]["code"], "parse_error");
    assert!(!root.join("EPG_DATA").exists());
}
