//! `[build]` section configuration.
//!
//! ```toml
//! [build]
//! output = "dist"     # Where compiled assets are written
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Build output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub output: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("dist"),
        }
    }
}

impl BuildConfig {
    pub fn normalize(&mut self, root: &Path) {
        self.output = crate::utils::path::normalize_path(&root.join(&self.output));
    }
}
