//! Suffix-based path mapper.

use super::{PathMapper, PathMapperConfig};
use crate::config::ConfigError;

/// Maps `name` ↔ `name{suffix}`, with independent input and output suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPathMapper {
    input_loader: Option<String>,
    input_suffix: String,
    output_suffix: String,
}

impl DefaultPathMapper {
    pub const DEFAULT_SUFFIX: &'static str = ".html";

    pub fn new(
        input_loader: Option<String>,
        input_suffix: impl Into<String>,
        output_suffix: impl Into<String>,
    ) -> Self {
        Self {
            input_loader,
            input_suffix: input_suffix.into(),
            output_suffix: output_suffix.into(),
        }
    }

    /// Build from config. Empty suffixes cannot tell templates apart from
    /// other files and are rejected.
    pub fn from_config(config: &PathMapperConfig) -> Result<Self, ConfigError> {
        if config.input_suffix.is_empty() {
            return Err(ConfigError::Validation(
                "plugin.path_mapper.input_suffix must not be empty".into(),
            ));
        }
        if config.output_suffix.is_empty() {
            return Err(ConfigError::Validation(
                "plugin.path_mapper.output_suffix must not be empty".into(),
            ));
        }
        Ok(Self::new(
            config.input_loader.clone(),
            &config.input_suffix,
            &config.output_suffix,
        ))
    }
}

impl Default for DefaultPathMapper {
    fn default() -> Self {
        Self::new(None, Self::DEFAULT_SUFFIX, Self::DEFAULT_SUFFIX)
    }
}

impl PathMapper for DefaultPathMapper {
    fn input_to_name(&self, input: &str) -> Option<String> {
        input.strip_suffix(&self.input_suffix).map(str::to_string)
    }

    fn name_to_input(&self, name: &str) -> String {
        format!("{name}{}", self.input_suffix)
    }

    fn output_to_name(&self, output: &str) -> Option<String> {
        output.strip_suffix(&self.output_suffix).map(str::to_string)
    }

    fn name_to_output(&self, name: &str) -> String {
        format!("{name}{}", self.output_suffix)
    }

    fn input_loader(&self) -> Option<&str> {
        self.input_loader.as_deref()
    }
}
