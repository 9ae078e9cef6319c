use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const BLOB: &str = r#"{
  "schemaVersion": 2,
  "nodes": [
    {"id": "c1", "type": "character", "name": "Ayla", "x": 0, "y": 0},
    {"id": "l1", "type": "location", "name": "Highkeep", "x": 400, "y": 0}
  ],
  "connections": [
    {"id": "e1", "fromNodeId": "c1", "toNodeId": "l1", "type": "alliance", "label": "sworn to"}
  ]
}"#;

#[test]
fn renders_svg_from_blob_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let input_path = tmp.path().join("court.json");
    fs::write(&input_path, BLOB)?;
    let output_path = tmp.path().join("court.svg");

    let mut cmd = Command::cargo_bin("loreboard")?;
    cmd.arg("render")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Generated diagram"));

    let svg_contents = fs::read_to_string(&output_path)?;
    assert!(svg_contents.contains("<svg"), "output should contain an <svg> element");
    assert!(svg_contents.contains("sworn to"), "connection label should be drawn");
    assert!(svg_contents.contains("Highkeep"));

    Ok(())
}

#[test]
fn overview_reads_from_stdin_and_writes_stdout() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("loreboard")?;
    cmd.args(["render", "--input", "-", "--output", "-", "--overview"])
        .write_stdin(BLOB);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("class=\"overview-node\""));

    Ok(())
}

#[test]
fn missing_input_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let missing = tmp.path().join("nope.json");

    let mut cmd = Command::cargo_bin("loreboard")?;
    cmd.arg("render").arg("--input").arg(&missing);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));

    Ok(())
}

#[test]
fn non_object_blob_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("loreboard")?;
    cmd.args(["render", "-i", "-", "-o", "-"]).write_stdin("[1, 2]");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must be a JSON object"));

    Ok(())
}
