#![allow(deprecated)]

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A scratch working directory with its own state dir and no config file
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.path().join("state").join("shop").join("dev")
    }

    #[allow(dead_code)]
    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.path().join("stratus.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    #[allow(dead_code)]
    pub fn write_state(&self, content: &str) {
        let dir = self.state_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("state.json"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_exports(&self, slug: &str, content: &str) {
        let dir = self.state_dir().join("exports");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.env", slug)), content).unwrap();
    }

    /// `stratus` isolated from the caller's environment and config
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("stratus").unwrap();
        cmd.current_dir(self.path())
            .env_remove("STRATUS_CONFIG_PATH")
            .env_remove("STRATUS_ENVIRONMENT")
            .env_remove("STRATUS_REGION")
            .env_remove("AWS_REGION")
            .env_remove("RUST_LOG")
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env("NO_COLOR", "1")
            .env("STRATUS_PROJECT", "shop")
            .env("STRATUS_STATE_DIR", self.path().join("state"));
        cmd
    }
}
