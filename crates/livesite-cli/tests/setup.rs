#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{livesite_cmd, setup, write_config};
use predicates::prelude::*;

#[test]
fn setup_writes_config_document_and_state() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let config = temp.path().join("conf").join("livesite.toml");

    livesite_cmd(temp.path())
        .arg("--setup")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));

    let conf_dir = temp.path().join("conf");
    assert!(config.exists());
    assert!(std::fs::read_to_string(&config)?.contains("[website]"));
    let page = std::fs::read_to_string(conf_dir.join("site/index.html"))?;
    assert!(page.contains("id=\"last-update\""));
    assert!(conf_dir.join("memories.json").exists());
    assert!(conf_dir.join("messages").is_dir());
    Ok(())
}

#[test]
fn setup_is_idempotent() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let config = write_config(temp.path(), "http://127.0.0.1:9", None);
    setup(temp.path(), &config);
    let page = std::fs::read_to_string(temp.path().join("site/index.html"))?;

    let output = livesite_cmd(temp.path())
        .args(["--setup", "--format", "json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(report["config_created"], false);
    assert_eq!(report["document_created"], false);
    assert_eq!(report["state_created"], false);
    assert_eq!(
        std::fs::read_to_string(temp.path().join("site/index.html"))?,
        page
    );
    Ok(())
}

#[test]
fn config_is_found_in_working_directory() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write_config(temp.path(), "http://127.0.0.1:9", None);

    livesite_cmd(temp.path()).arg("--setup").assert().success();

    assert!(temp.path().join("site/index.html").exists());
    Ok(())
}

#[test]
fn mode_flags_conflict() {
    let temp = tempfile::tempdir().unwrap();
    livesite_cmd(temp.path())
        .args(["--now", "--analyze"])
        .assert()
        .failure();
}
