//! Plugin options.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::LazyHtmlConfig;
use crate::mapper::PathMapperOption;

/// Options of a [`LazyHtmlPlugin`](super::LazyHtmlPlugin).
#[derive(Debug, Clone)]
pub struct LazyHtmlOptions {
    /// URL and output path segment; surrounding `/` and `\` are ignored.
    pub prefix: String,
    /// Template sources, relative to the compiler context unless absolute.
    pub directory: PathBuf,
    pub input_glob: String,
    pub path_mapper: PathMapperOption,
    pub chunks: Vec<String>,
    /// How long a dev server request waits for its template.
    pub wait_timeout: Duration,
    /// Dev server requests allowed to wait at once.
    pub max_pending: usize,
}

impl LazyHtmlOptions {
    pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_PENDING: usize = 64;

    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            directory: PathBuf::from("templates"),
            input_glob: "**/*".to_string(),
            path_mapper: PathMapperOption::default(),
            chunks: vec!["app".to_string()],
            wait_timeout: Self::DEFAULT_WAIT_TIMEOUT,
            max_pending: Self::DEFAULT_MAX_PENDING,
        }
    }

    pub fn from_config(config: &LazyHtmlConfig) -> Self {
        Self {
            directory: config.plugin.directory.clone(),
            input_glob: config.plugin.input_glob.clone(),
            path_mapper: PathMapperOption::Config(config.plugin.path_mapper.clone()),
            chunks: config.plugin.chunks.clone(),
            wait_timeout: config.serve.wait_timeout(),
            max_pending: config.serve.max_pending,
            ..Self::new(config.plugin.prefix.clone())
        }
    }

    /// Prefix with surrounding separators removed.
    pub fn trimmed_prefix(&self) -> &str {
        self.prefix.trim_matches(['/', '\\'])
    }
}

#[cfg(test)]
impl LazyHtmlOptions {
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn path_mapper(mut self, mapper: impl Into<PathMapperOption>) -> Self {
        self.path_mapper = mapper.into();
        self
    }

    pub fn chunks(mut self, chunks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let options = LazyHtmlOptions::new("/app/");
        assert_eq!(options.trimmed_prefix(), "app");
        assert_eq!(options.input_glob, "**/*");
        assert_eq!(options.chunks, vec!["app".to_string()]);
        assert_eq!(options.wait_timeout, Duration::from_secs(60));
        assert!(matches!(options.path_mapper, PathMapperOption::Config(_)));
    }

    #[test]
    fn test_prefix_trims_backslashes() {
        assert_eq!(LazyHtmlOptions::new("\\app\\").trimmed_prefix(), "app");
        assert_eq!(LazyHtmlOptions::new("/").trimmed_prefix(), "");
    }

    #[test]
    fn test_from_config() {
        let config = crate::config::test_parse_config(
            r#"
chunks = ["main", "vendor"]

[serve]
wait_timeout = 5
"#,
        );
        let options = LazyHtmlOptions::from_config(&config);
        assert_eq!(options.trimmed_prefix(), "app");
        assert_eq!(options.chunks, vec!["main".to_string(), "vendor".to_string()]);
        assert_eq!(options.wait_timeout, Duration::from_secs(5));
        assert_eq!(options.max_pending, LazyHtmlOptions::DEFAULT_MAX_PENDING);
    }
}
