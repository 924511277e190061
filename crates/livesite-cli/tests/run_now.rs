#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{livesite_cmd, setup, write_config};
use predicates::prelude::*;

#[test]
fn unreachable_generator_leaves_site_untouched() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let config = write_config(temp.path(), "http://127.0.0.1:9", Some("sk-test"));
    setup(temp.path(), &config);
    std::fs::write(temp.path().join("messages/hello.txt"), "Say hi")?;
    let page = std::fs::read(temp.path().join("site/index.html"))?;
    let state = std::fs::read(temp.path().join("memories.json"))?;

    livesite_cmd(temp.path())
        .args(["--now", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle failed"));

    assert_eq!(std::fs::read(temp.path().join("site/index.html"))?, page);
    assert_eq!(std::fs::read(temp.path().join("memories.json"))?, state);
    // The message stays unread for the next attempt
    assert!(temp.path().join("messages/hello.txt").exists());
    let backups = temp.path().join("site/backups");
    assert!(!backups.exists() || std::fs::read_dir(&backups)?.next().is_none());
    Ok(())
}

#[test]
fn missing_api_key_is_reported() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let config = write_config(temp.path(), "http://127.0.0.1:9", None);
    setup(temp.path(), &config);

    livesite_cmd(temp.path())
        .args(["--now", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("generator"));
    Ok(())
}
