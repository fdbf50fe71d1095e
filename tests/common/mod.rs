use anyhow::Result;
use std::path::Path;
use tempfile::TempDir;

/// Scratch directory used as XDG_CONFIG_HOME for one test
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}
