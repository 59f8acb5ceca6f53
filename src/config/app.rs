use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application-level paths, built once at startup and handed to whoever needs them.
///
/// Layout under `base_dir`:
/// - `projects/`
/// - `projects/images/`
/// - `projects/excel/`
/// - `projects/logs/screenshots/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    base_dir: PathBuf,
}

impl AppConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Use the process working directory as the base.
    pub fn from_current_dir() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
        Ok(Self::new(cwd))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.base_dir.join("projects")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.projects_dir().join("images")
    }

    pub fn excel_dir(&self) -> PathBuf {
        self.projects_dir().join("excel")
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.projects_dir().join("logs").join("screenshots")
    }

    /// Resolve a possibly relative path against the base directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Create every working directory (idempotent).
    pub fn create_directories(&self) -> Result<()> {
        for dir in [
            self.projects_dir(),
            self.images_dir(),
            self.excel_dir(),
            self.screenshot_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        debug!(target: "macroflow::config", base = %self.base_dir.display(), "Working directories ready");
        Ok(())
    }
}
