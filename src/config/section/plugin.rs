//! `[plugin]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [plugin]
//! prefix = "app"              # URL/output prefix for compiled templates
//! directory = "templates"     # Template sources, relative to the config file
//! input_glob = "**/*"         # Which files under `directory` are templates
//! chunks = ["app"]            # Scripts injected into every template
//!
//! [plugin.path_mapper]
//! input_loader = "raw"
//! input_suffix = ".html"
//! output_suffix = ".html"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::mapper::{DefaultPathMapper, PathMapperConfig};

/// Lazy HTML plugin settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    /// Path segment every template is served and emitted under.
    /// Leading and trailing separators are ignored.
    pub prefix: String,

    #[serde(default = "defaults::directory")]
    pub directory: PathBuf,

    #[serde(default = "defaults::input_glob")]
    pub input_glob: String,

    #[serde(default = "defaults::chunks")]
    pub chunks: Vec<String>,

    #[serde(default)]
    pub path_mapper: PathMapperConfig,
}

mod defaults {
    use std::path::PathBuf;

    pub fn directory() -> PathBuf {
        PathBuf::from("templates")
    }

    pub fn input_glob() -> String {
        "**/*".to_string()
    }

    pub fn chunks() -> Vec<String> {
        vec!["app".to_string()]
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            directory: defaults::directory(),
            input_glob: defaults::input_glob(),
            chunks: defaults::chunks(),
            path_mapper: PathMapperConfig::default(),
        }
    }
}

impl PluginConfig {
    pub const FIELD_DIRECTORY: FieldPath = FieldPath::new("plugin.directory");
    pub const FIELD_INPUT_GLOB: FieldPath = FieldPath::new("plugin.input_glob");
    pub const FIELD_CHUNKS: FieldPath = FieldPath::new("plugin.chunks");
    pub const FIELD_PATH_MAPPER: FieldPath = FieldPath::new("plugin.path_mapper");

    /// Prefix with surrounding `/` and `\` removed.
    pub fn trimmed_prefix(&self) -> &str {
        self.prefix.trim_matches(['/', '\\'])
    }

    pub fn normalize(&mut self, root: &Path) {
        self.directory = crate::utils::path::normalize_path(&root.join(&self.directory));
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if !self.directory.is_dir() {
            diag.error_with_hint(
                Self::FIELD_DIRECTORY,
                format!("`{}` is not a directory", self.directory.display()),
                "create it or point `directory` at your templates",
            );
        }

        if let Err(e) = glob::Pattern::new(&self.input_glob) {
            diag.error(
                Self::FIELD_INPUT_GLOB,
                format!("invalid glob `{}`: {}", self.input_glob, e.msg),
            );
        }

        if self.chunks.iter().any(|chunk| chunk.trim().is_empty()) {
            diag.error(Self::FIELD_CHUNKS, "chunk names must not be empty");
        }

        if let Err(e) = DefaultPathMapper::from_config(&self.path_mapper) {
            diag.error_with_hint(
                Self::FIELD_PATH_MAPPER,
                e.to_string(),
                "use a suffix such as \".html\"",
            );
        }
    }
}
