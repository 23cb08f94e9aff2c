//! Default child compiler for HTML templates.
//!
//! Reads each entry's source and links its chunks:
//!
//! ```text
//! <head>...</head>  →  <head>...<script src="/app.js" defer></script></head>
//! ```
//!
//! Loaders select how a source is treated:
//!
//! | Loader          | Behavior                         |
//! |-----------------|----------------------------------|
//! | none / `html`   | inject chunk scripts             |
//! | `raw`           | emit the source unchanged        |

use std::fs;

use anyhow::Result;
use rayon::prelude::*;

use super::{Asset, ChildCompilation, ChildCompiler, CompileDiagnostic, EntryDescriptor};
use crate::utils::html::{escape_attr, inject_into_head};

#[derive(Debug, Clone, Default)]
pub struct HtmlChildCompiler;

impl HtmlChildCompiler {
    pub fn new() -> Self {
        Self
    }

    fn compile_entry(entry: &EntryDescriptor) -> Result<Asset, CompileDiagnostic> {
        let source = fs::read_to_string(&entry.input).map_err(|e| {
            CompileDiagnostic::for_entry(
                &entry.name,
                format!("failed to read {}: {e}", entry.input.display()),
            )
        })?;

        let content = match entry.loader.as_deref() {
            None | Some("html") => inject_into_head(&source, &chunk_tags(&entry.chunks)),
            Some("raw") => source,
            Some(other) => {
                return Err(CompileDiagnostic::for_entry(
                    &entry.name,
                    format!("unknown loader `{other}`"),
                ));
            }
        };

        Ok(Asset::new(entry.output.clone(), content))
    }
}

impl ChildCompiler for HtmlChildCompiler {
    fn compile(&self, entries: &[EntryDescriptor]) -> Result<ChildCompilation> {
        let results: Vec<_> = entries.par_iter().map(Self::compile_entry).collect();

        let mut compilation = ChildCompilation::default();
        for result in results {
            match result {
                Ok(asset) => compilation.assets.push(asset),
                Err(diagnostic) => compilation.errors.push(diagnostic),
            }
        }

        crate::debug!(
            "build";
            "child compile: {} asset(s), {} error(s)",
            compilation.assets.len(),
            compilation.errors.len()
        );
        Ok(compilation)
    }
}

fn chunk_tags(chunks: &[String]) -> String {
    chunks
        .iter()
        .map(|chunk| format!(r#"<script src="/{}.js" defer></script>"#, escape_attr(chunk)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn entry(dir: &Path, name: &str, loader: Option<&str>) -> EntryDescriptor {
        EntryDescriptor {
            name: name.to_string(),
            input: dir.join(format!("{name}.html")),
            output: format!("app/{name}.html"),
            chunks: vec!["app".to_string(), "vendor".to_string()],
            loader: loader.map(str::to_string),
        }
    }

    #[test]
    fn test_injects_chunks_into_head() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("home.html"),
            "<html><head><title>Home</title></head><body></body></html>",
        )
        .unwrap();

        let compilation = HtmlChildCompiler::new()
            .compile(&[entry(temp.path(), "home", None)])
            .unwrap();

        assert!(compilation.errors.is_empty());
        assert_eq!(compilation.assets.len(), 1);
        let asset = &compilation.assets[0];
        assert_eq!(asset.path, "app/home.html");
        assert_eq!(
            String::from_utf8(asset.content.clone()).unwrap(),
            "<html><head><title>Home</title>\
             <script src=\"/app.js\" defer></script>\
             <script src=\"/vendor.js\" defer></script>\
             </head><body></body></html>"
        );
    }

    #[test]
    fn test_raw_loader_passes_through() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("raw.html"), "<p>as is</p>").unwrap();

        let compilation = HtmlChildCompiler::new()
            .compile(&[entry(temp.path(), "raw", Some("raw"))])
            .unwrap();

        assert_eq!(compilation.assets[0].content, b"<p>as is</p>");
    }

    #[test]
    fn test_missing_input_is_a_diagnostic() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("home.html"), "<p>home</p>").unwrap();

        let compilation = HtmlChildCompiler::new()
            .compile(&[
                entry(temp.path(), "home", None),
                entry(temp.path(), "missing", None),
            ])
            .unwrap();

        assert_eq!(compilation.assets.len(), 1);
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].entry.as_deref(), Some("missing"));
    }

    #[test]
    fn test_unknown_loader() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("home.html"), "<p>home</p>").unwrap();

        let compilation = HtmlChildCompiler::new()
            .compile(&[entry(temp.path(), "home", Some("pug"))])
            .unwrap();

        assert!(compilation.assets.is_empty());
        assert!(compilation.errors[0].message.contains("pug"));
    }
}
