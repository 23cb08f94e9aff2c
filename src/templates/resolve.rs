//! Eager template discovery for one-shot and watch-only builds.

use std::path::Path;

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use jwalk::WalkDir;

use crate::mapper::PathMapper;
use crate::utils::path::to_slash;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Relative, `/`-separated paths of files under `directory` matching `glob`.
///
/// Hidden files are skipped. A missing directory yields no files.
pub fn glob_files(directory: &Path, glob: &str) -> Result<Vec<String>> {
    let pattern =
        Pattern::new(glob).with_context(|| format!("invalid input glob `{glob}`"))?;

    if !directory.is_dir() {
        crate::debug!("templates"; "directory {} does not exist", directory.display());
        return Ok(Vec::new());
    }

    let mut files: Vec<String> = WalkDir::new(directory)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let path = e.path();
            let relative = path.strip_prefix(directory).ok()?;
            Some(to_slash(relative))
        })
        .filter(|relative| pattern.matches_with(relative, MATCH_OPTIONS))
        .collect();

    files.sort_unstable();
    Ok(files)
}

/// Names of every template under `directory`, in path order.
///
/// Paths the mapper rejects are discarded.
pub fn resolve_names(directory: &Path, glob: &str, mapper: &dyn PathMapper) -> Result<Vec<String>> {
    let names: Vec<String> = glob_files(directory, glob)?
        .iter()
        .filter_map(|file| mapper.input_to_name(file))
        .collect();

    crate::debug!("templates"; "resolved {} template(s) in {}", names.len(), directory.display());
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::DefaultPathMapper;
    use std::fs;
    use tempfile::TempDir;

    fn make_tree(files: &[&str]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for file in files {
            let path = temp.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "<html></html>").unwrap();
        }
        temp
    }

    #[test]
    fn test_glob_all_files() {
        let temp = make_tree(&["home.html", "blog/post.html", "style.css"]);
        let files = glob_files(temp.path(), "**/*").unwrap();
        assert_eq!(files, vec!["blog/post.html", "home.html", "style.css"]);
    }

    #[test]
    fn test_glob_restricts_depth() {
        let temp = make_tree(&["home.html", "blog/post.html"]);
        let files = glob_files(temp.path(), "*.html").unwrap();
        assert_eq!(files, vec!["home.html"]);
    }

    #[test]
    fn test_resolve_filters_through_mapper() {
        let temp = make_tree(&["home.html", "about.html", "partials/nav.twig", "logo.svg"]);
        let names = resolve_names(temp.path(), "**/*", &DefaultPathMapper::default()).unwrap();
        assert_eq!(names, vec!["about".to_string(), "home".to_string()]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let names = resolve_names(
            &temp.path().join("missing"),
            "**/*",
            &DefaultPathMapper::default(),
        )
        .unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_invalid_glob() {
        let temp = TempDir::new().unwrap();
        assert!(glob_files(temp.path(), "[").is_err());
    }
}
