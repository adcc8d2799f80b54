//! Shared test infrastructure for integration tests.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Scratch project directory with an ad template and a config file.
pub struct Project {
    dir: TempDir,
}

/// Captured result of one `hitshell` run.
#[derive(Debug)]
pub struct RunResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for RunResult {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl Project {
    /// Project whose config only overrides what `overrides` names.
    pub fn new(overrides: serde_json::Value) -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        std::fs::create_dir_all(dir.path().join("templates"))?;
        std::fs::write(dir.path().join("templates/ad.html"), "<html>study</html>")?;
        std::fs::write(
            dir.path().join("hitshell.json"),
            serde_json::to_vec_pretty(&overrides)?,
        )?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("hitshell.json")
    }

    pub fn config(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::from_slice(&std::fs::read(self.config_path())?)?)
    }

    /// Run the console offline with each line passed through `--execute`.
    pub fn run_offline(&self, lines: &[&str]) -> RunResult {
        let mut command = Command::new(env!("CARGO_BIN_EXE_hitshell"));
        command
            .arg("--offline")
            .arg("--project")
            .arg(self.root())
            .arg("--config")
            .arg(self.config_path())
            .env("HITSHELL_LOG", "warn")
            .env_remove("AWS_ACCESS_KEY_ID")
            .env_remove("AWS_SECRET_ACCESS_KEY");
        for line in lines {
            command.arg("--execute").arg(line);
        }
        command.output().expect("run hitshell").into()
    }
}
