//! URL to filesystem path resolution for the static fallback.

use std::path::{Path, PathBuf};

use crate::middleware::request_path;

/// Resolve a request URL to a file under `serve_root`.
///
/// Directories resolve to their `index.html`. Anything that escapes the
/// root (`..`, symlinks) resolves to nothing.
pub fn resolve_path(url: &str, serve_root: &Path) -> Option<PathBuf> {
    let path = request_path(url);
    let clean = path.trim_matches('/');

    if clean.split(['/', '\\']).any(|segment| segment == "..") {
        return None;
    }

    let canonical = serve_root.join(clean).canonicalize().ok()?;
    let root_canonical = serve_root.canonicalize().ok()?;
    if !canonical.starts_with(&root_canonical) {
        return None;
    }

    if canonical.is_file() {
        return Some(canonical);
    }

    let index = canonical.join("index.html");
    (canonical.is_dir() && index.is_file()).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("dist/docs")).unwrap();
        fs::write(temp.path().join("dist/app.js"), "js").unwrap();
        fs::write(temp.path().join("dist/docs/index.html"), "docs").unwrap();
        fs::write(temp.path().join("dist/my page.html"), "page").unwrap();
        fs::write(temp.path().join("secret.txt"), "secret").unwrap();
        temp
    }

    #[test]
    fn test_resolve_file() {
        let temp = site();
        let root = temp.path().join("dist");
        assert!(resolve_path("/app.js?v=1", &root).unwrap().ends_with("app.js"));
        assert!(resolve_path("/my%20page.html", &root).is_some());
        assert!(resolve_path("/missing.js", &root).is_none());
    }

    #[test]
    fn test_resolve_directory_index() {
        let temp = site();
        let root = temp.path().join("dist");
        assert!(
            resolve_path("/docs/", &root)
                .unwrap()
                .ends_with("docs/index.html")
        );
        // No index.html at the root
        assert!(resolve_path("/", &root).is_none());
    }

    #[test]
    fn test_rejects_traversal() {
        let temp = site();
        let root = temp.path().join("dist");
        assert!(resolve_path("/../secret.txt", &root).is_none());
        assert!(resolve_path("/%2e%2e/secret.txt", &root).is_none());
        assert!(resolve_path("/docs/../../secret.txt", &root).is_none());
    }
}
