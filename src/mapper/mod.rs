//! Template name ↔ path translation.
//!
//! A [`PathMapper`] converts between template *names* (the logical key used
//! by the templates manager) and the relative paths of template sources and
//! compiled outputs:
//!
//! ```text
//! templates/blog/post.html  --input_to_name-->   blog/post
//! blog/post                 --name_to_output-->  blog/post.html
//! ```
//!
//! Mappers are pure. For every path a mapper accepts,
//! `name_to_input(input_to_name(p)) == p` (and likewise for outputs).

mod default;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub use default::DefaultPathMapper;

/// Bidirectional translation between template names and relative paths.
///
/// Paths are relative and `/`-separated.
pub trait PathMapper: Send + Sync + fmt::Debug {
    /// Template name for a source path, or `None` if the path is not a template.
    fn input_to_name(&self, input: &str) -> Option<String>;

    /// Source path (relative to the template directory) for a name.
    fn name_to_input(&self, name: &str) -> String;

    /// Template name for a compiled output path, or `None` if it is not one.
    fn output_to_name(&self, output: &str) -> Option<String>;

    /// Output path (relative to the prefix) for a name.
    fn name_to_output(&self, name: &str) -> String;

    /// Loader handed to the child compiler with each entry.
    fn input_loader(&self) -> Option<&str> {
        None
    }
}

/// Settings the default mapper is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathMapperConfig {
    /// Loader identifier passed through to entry descriptors.
    pub input_loader: Option<String>,
    /// Suffix stripped from source paths.
    pub input_suffix: String,
    /// Suffix appended to output paths.
    pub output_suffix: String,
}

impl Default for PathMapperConfig {
    fn default() -> Self {
        Self {
            input_loader: None,
            input_suffix: DefaultPathMapper::DEFAULT_SUFFIX.to_string(),
            output_suffix: DefaultPathMapper::DEFAULT_SUFFIX.to_string(),
        }
    }
}

/// Either a ready mapper or the configuration for the default one.
///
/// The two are interchangeable wherever a mapper is accepted; [`resolve`]
/// discriminates between them at runtime.
///
/// [`resolve`]: PathMapperOption::resolve
#[derive(Debug, Clone)]
pub enum PathMapperOption {
    #[allow(dead_code)] // Only built in code; config files always give `Config`
    Custom(Arc<dyn PathMapper>),
    Config(PathMapperConfig),
}

impl Default for PathMapperOption {
    fn default() -> Self {
        Self::Config(PathMapperConfig::default())
    }
}

impl From<PathMapperConfig> for PathMapperOption {
    fn from(config: PathMapperConfig) -> Self {
        Self::Config(config)
    }
}

impl PathMapperOption {
    /// Wrap a user-supplied mapper.
    #[cfg(test)]
    pub fn custom(mapper: impl PathMapper + 'static) -> Self {
        Self::Custom(Arc::new(mapper))
    }

    /// Produce the mapper, building the default one from config if needed.
    pub fn resolve(&self) -> Result<Arc<dyn PathMapper>, ConfigError> {
        match self {
            Self::Custom(mapper) => Ok(Arc::clone(mapper)),
            Self::Config(config) => {
                DefaultPathMapper::from_config(config).map(|m| Arc::new(m) as Arc<dyn PathMapper>)
            }
        }
    }
}
