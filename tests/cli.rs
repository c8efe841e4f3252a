use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn converts_dsl_to_json_document() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let input_path = tmp.path().join("pipeline.mmd");
    fs::write(
        &input_path,
        "flowchart LR\n    Ingest[Ingest] -->|raw| Clean{Clean}\n    Clean --> Store[(Store)]\n",
    )?;
    let output_path = tmp.path().join("pipeline.json");

    let mut cmd = Command::cargo_bin("flowcanvas")?;
    cmd.arg("convert")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path);

    cmd.assert().success();

    let json = fs::read_to_string(&output_path)?;
    assert!(json.contains("\"version\": 1"));
    assert!(json.contains("Ingest"));
    assert!(json.contains("data-store"));

    Ok(())
}

#[test]
fn json_round_trips_back_to_dsl() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let dsl_path = tmp.path().join("graph.mmd");
    fs::write(&dsl_path, "flowchart TD\n    A[One] --> B[Two]\n")?;
    let json_path = tmp.path().join("graph.json");

    Command::cargo_bin("flowcanvas")?
        .arg("--input")
        .arg(&dsl_path)
        .arg("--output")
        .arg(&json_path)
        .assert()
        .success();

    Command::cargo_bin("flowcanvas")?
        .arg("--input")
        .arg(&json_path)
        .arg("--to")
        .arg("dsl")
        .assert()
        .success()
        .stdout(predicate::str::contains("flowchart TD"))
        .stdout(predicate::str::contains("A[One] --> B[Two]"));

    Ok(())
}

#[test]
fn impact_reports_upstream_and_downstream_counts() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let input_path = tmp.path().join("chain.mmd");
    fs::write(&input_path, "flowchart LR\nA --> B\nB --> C\nC --> D\n")?;

    let mut cmd = Command::cargo_bin("flowcanvas")?;
    cmd.arg("impact")
        .arg("--input")
        .arg(&input_path)
        .arg("--target")
        .arg("B");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("upstream (1):"))
        .stdout(predicate::str::contains("downstream (2):"));

    Ok(())
}

#[test]
fn inspect_summarizes_the_document() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let input_path = tmp.path().join("summary.mmd");
    fs::write(&input_path, "flowchart LR\nA --> B\nLoner[On Its Own]\n")?;

    let mut cmd = Command::cargo_bin("flowcanvas")?;
    cmd.arg("inspect").arg("--input").arg(&input_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("shapes: 3"))
        .stdout(predicate::str::contains("connections: 1"))
        .stdout(predicate::str::contains("direction: LR"));

    Ok(())
}

#[test]
fn missing_impact_target_fails_with_a_message() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let input_path = tmp.path().join("tiny.mmd");
    fs::write(&input_path, "flowchart LR\nA --> B\n")?;

    let mut cmd = Command::cargo_bin("flowcanvas")?;
    cmd.arg("impact")
        .arg("--input")
        .arg(&input_path)
        .arg("--target")
        .arg("Nonexistent");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no shape matches"));

    Ok(())
}
