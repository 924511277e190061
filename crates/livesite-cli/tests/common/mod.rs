#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(15);

/// Create a `livesite` command isolated from the caller's environment.
#[allow(dead_code)]
pub fn livesite_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("livesite"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.current_dir(dir);
    cmd.env_remove("LIVESITE_CONFIG");
    cmd.env_remove("ANTHROPIC_API_KEY");
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Write a config whose generator points at `base_url`, with news disabled.
/// Returns the config path.
#[allow(dead_code)]
pub fn write_config(dir: &Path, base_url: &str, api_key: Option<&str>) -> PathBuf {
    let key = api_key.map_or_else(String::new, |k| format!("api_key = \"{k}\"\n"));
    let content = format!(
        r#"[website]
path = "site/index.html"
backup_dir = "site/backups"

[entity]
name = "Test Entity"
mission = "Exploring test fixtures"
state_file = "memories.json"

[generator]
base_url = "{base_url}"
timeout_secs = 5
{key}
[communication]
message_dir = "messages"

[news]
enabled = false
"#
    );
    let path = dir.join("livesite.toml");
    std::fs::write(&path, content).expect("write config");
    path
}

/// Run `--setup` against `config` and assert success.
#[allow(dead_code)]
pub fn setup(dir: &Path, config: &Path) {
    livesite_cmd(dir)
        .arg("--setup")
        .arg("--config")
        .arg(config)
        .assert()
        .success();
}
