//! Build lifecycle driver.
//!
//! A [`Compiler`] runs plugins through a fixed sequence of hooks:
//!
//! ```text
//! run / watch_run ─→ make ─→ write assets ─→ asset_emitted ─→ after_compile
//! ```
//!
//! Entry compilation itself is delegated to a [`ChildCompiler`], which
//! turns entry descriptors into assets. [`HtmlChildCompiler`] is the
//! default.
//!
//! # Module Structure
//!
//! - `html` - Default child compiler (template + chunk script tags)
//! - `watch` - Invalidation handle and the async rebuild loop

mod html;
mod watch;

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::middleware::Mount;

pub use html::HtmlChildCompiler;
pub use watch::{WatchActor, Watching};

// ============================================================================
// Data types
// ============================================================================

/// A compiled file, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// `/`-separated path under the output directory.
    pub path: String,
    pub content: Vec<u8>,
}

impl Asset {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A non-fatal build problem, reported after the build finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileDiagnostic {
    /// Entry the problem belongs to, if any.
    pub entry: Option<String>,
    pub message: String,
}

impl CompileDiagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            entry: None,
            message: message.into(),
        }
    }

    pub fn for_entry(entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entry: Some(entry.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entry {
            Some(entry) => write!(f, "{entry}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// One entry point handed to the child compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    /// Template name.
    pub name: String,
    /// Absolute path of the source file.
    pub input: PathBuf,
    /// `/`-separated output path, relative to the output directory.
    pub output: String,
    /// Scripts the page loads.
    pub chunks: Vec<String>,
    /// Loader identifier passed through from the path mapper.
    pub loader: Option<String>,
}

/// Result of a child compile.
#[derive(Debug, Default)]
pub struct ChildCompilation {
    pub assets: Vec<Asset>,
    pub errors: Vec<CompileDiagnostic>,
}

/// Nested compile over a set of entries.
///
/// Returning `Err` fails the whole build; per-entry problems belong in
/// [`ChildCompilation::errors`].
pub trait ChildCompiler: Send + Sync {
    fn compile(&self, entries: &[EntryDescriptor]) -> Result<ChildCompilation>;
}

/// Mutable state of one build.
#[derive(Debug, Default)]
pub struct Compilation {
    pub assets: Vec<Asset>,
    pub errors: Vec<CompileDiagnostic>,
    /// Directories whose changes trigger a rebuild in watch mode.
    pub context_dependencies: BTreeSet<PathBuf>,
}

/// Summary of a finished build.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Paths of written assets, in emission order.
    pub assets: Vec<String>,
    pub errors: Vec<CompileDiagnostic>,
    pub context_dependencies: BTreeSet<PathBuf>,
    pub duration: Duration,
}

impl Stats {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// One-line description for logs and the watch status.
    pub fn summary(&self) -> String {
        let files = if self.assets.len() == 1 { "file" } else { "files" };
        format!(
            "built {} {} in {}ms",
            self.assets.len(),
            files,
            self.duration.as_millis()
        )
    }

    /// Diagnostics, one per line.
    pub fn error_report(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Plugins
// ============================================================================

/// Lifecycle hooks. Every hook defaults to doing nothing.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Dev server only: add middlewares to the front of the chain.
    fn setup_dev_server(
        &self,
        _compiler: &Compiler,
        _watching: &Watching,
        _mounts: &mut Vec<Mount>,
    ) -> Result<()> {
        Ok(())
    }

    /// Before a one-shot build.
    fn run(&self, _compiler: &Compiler) -> Result<()> {
        Ok(())
    }

    /// Before each build in watch mode.
    fn watch_run(&self, _compiler: &Compiler) -> Result<()> {
        Ok(())
    }

    /// Add assets and diagnostics to the compilation.
    fn make(&self, _compiler: &Compiler, _compilation: &mut Compilation) -> Result<()> {
        Ok(())
    }

    /// After an asset was written to disk.
    fn asset_emitted(&self, _file: &str, _content: &[u8]) {}

    fn after_compile(&self, _compilation: &mut Compilation) {}
}

// ============================================================================
// Compiler
// ============================================================================

pub struct Compiler {
    /// Project root; relative plugin paths resolve against it.
    context: PathBuf,
    output: PathBuf,
    plugins: Vec<Arc<dyn Plugin>>,
    child: Arc<dyn ChildCompiler>,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("context", &self.context)
            .field("output", &self.output)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Compiler {
    pub fn new(
        context: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        child: Arc<dyn ChildCompiler>,
    ) -> Self {
        Self {
            context: context.into(),
            output: output.into(),
            plugins: Vec::new(),
            child,
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn child(&self) -> &dyn ChildCompiler {
        self.child.as_ref()
    }

    /// Let plugins mount their middlewares. The returned chain is in
    /// dispatch order.
    pub fn setup_dev_server(&self, watching: &Watching) -> Result<Vec<Mount>> {
        let mut mounts = Vec::new();
        for plugin in &self.plugins {
            plugin
                .setup_dev_server(self, watching, &mut mounts)
                .with_context(|| format!("{}: dev server setup failed", plugin.name()))?;
        }
        Ok(mounts)
    }

    /// One-shot build.
    pub fn run(&self) -> Result<Stats> {
        for plugin in &self.plugins {
            plugin
                .run(self)
                .with_context(|| format!("{}: run hook failed", plugin.name()))?;
        }
        self.compile()
    }

    /// One build of a watch session.
    pub fn watch_cycle(&self) -> Result<Stats> {
        for plugin in &self.plugins {
            plugin
                .watch_run(self)
                .with_context(|| format!("{}: watch_run hook failed", plugin.name()))?;
        }
        self.compile()
    }

    fn compile(&self) -> Result<Stats> {
        let started = Instant::now();
        let mut compilation = Compilation::default();

        for plugin in &self.plugins {
            plugin
                .make(self, &mut compilation)
                .with_context(|| format!("{}: make failed", plugin.name()))?;
        }

        let (written, rejected) = self.write_assets(&compilation.assets)?;
        for asset in &written {
            for plugin in &self.plugins {
                plugin.asset_emitted(&asset.path, &asset.content);
            }
        }
        let written: Vec<String> = written.into_iter().map(|a| a.path.clone()).collect();
        compilation.errors.extend(rejected);

        for plugin in &self.plugins {
            plugin.after_compile(&mut compilation);
        }

        let stats = Stats {
            assets: written,
            errors: compilation.errors,
            context_dependencies: compilation.context_dependencies,
            duration: started.elapsed(),
        };
        crate::debug!("build"; "{}", stats.summary());
        Ok(stats)
    }

    /// Write every asset under the output directory, in parallel.
    ///
    /// Returns the written assets, and a diagnostic for each path escaping
    /// the output directory instead of writing it.
    fn write_assets<'a>(
        &self,
        assets: &'a [Asset],
    ) -> Result<(Vec<&'a Asset>, Vec<CompileDiagnostic>)> {
        fs::create_dir_all(&self.output)
            .with_context(|| format!("failed to create {}", self.output.display()))?;

        let (safe, unsafe_paths): (Vec<&Asset>, Vec<&Asset>) =
            assets.iter().partition(|asset| is_contained(&asset.path));

        safe.par_iter()
            .map(|asset| {
                let target = self.output.join(&asset.path);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&target, &asset.content)
                    .with_context(|| format!("failed to write {}", target.display()))
            })
            .collect::<Result<Vec<()>>>()?;

        let rejected: Vec<_> = unsafe_paths
            .iter()
            .map(|asset| {
                CompileDiagnostic::new(format!(
                    "refusing to write `{}` outside the output directory",
                    asset.path
                ))
            })
            .collect();
        Ok((safe, rejected))
    }
}

/// Relative, non-empty, and free of `..`.
fn is_contained(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Emits fixed assets and records every hook call.
    #[derive(Default)]
    struct Recorder {
        assets: Vec<Asset>,
        calls: Mutex<Vec<String>>,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn run(&self, _compiler: &Compiler) -> Result<()> {
            self.calls.lock().push("run".into());
            Ok(())
        }

        fn watch_run(&self, _compiler: &Compiler) -> Result<()> {
            self.calls.lock().push("watch_run".into());
            Ok(())
        }

        fn make(&self, _compiler: &Compiler, compilation: &mut Compilation) -> Result<()> {
            self.calls.lock().push("make".into());
            compilation.assets.extend(self.assets.iter().cloned());
            Ok(())
        }

        fn asset_emitted(&self, file: &str, _content: &[u8]) {
            self.calls.lock().push(format!("emitted {file}"));
        }

        fn after_compile(&self, compilation: &mut Compilation) {
            self.calls.lock().push("after_compile".into());
            compilation.context_dependencies.insert(PathBuf::from("/templates"));
        }
    }

    struct NoChild;

    impl ChildCompiler for NoChild {
        fn compile(&self, _entries: &[EntryDescriptor]) -> Result<ChildCompilation> {
            Ok(ChildCompilation::default())
        }
    }

    fn compiler(temp: &TempDir, plugin: Arc<Recorder>) -> Compiler {
        Compiler::new(temp.path(), temp.path().join("dist"), Arc::new(NoChild))
            .with_plugin(plugin)
    }

    #[test]
    fn test_run_hook_order() {
        let temp = TempDir::new().unwrap();
        let plugin = Arc::new(Recorder {
            assets: vec![Asset::new("app/home.html", "<p>home</p>")],
            ..Recorder::default()
        });

        let stats = compiler(&temp, Arc::clone(&plugin)).run().unwrap();

        assert_eq!(
            *plugin.calls.lock(),
            vec!["run", "make", "emitted app/home.html", "after_compile"]
        );
        assert_eq!(stats.assets, vec!["app/home.html".to_string()]);
        assert!(stats.context_dependencies.contains(Path::new("/templates")));
        assert_eq!(
            fs::read_to_string(temp.path().join("dist/app/home.html")).unwrap(),
            "<p>home</p>"
        );
    }

    #[test]
    fn test_watch_cycle_uses_watch_run() {
        let temp = TempDir::new().unwrap();
        let plugin = Arc::new(Recorder::default());

        let stats = compiler(&temp, Arc::clone(&plugin)).watch_cycle().unwrap();

        assert_eq!(plugin.calls.lock()[0], "watch_run");
        assert!(stats.assets.is_empty());
        assert!(!stats.has_errors());
    }

    #[test]
    fn test_escaping_asset_is_rejected() {
        let temp = TempDir::new().unwrap();
        let plugin = Arc::new(Recorder {
            assets: vec![
                Asset::new("../evil.html", "x"),
                Asset::new("ok.html", "y"),
            ],
            ..Recorder::default()
        });

        let stats = compiler(&temp, Arc::clone(&plugin)).run().unwrap();

        assert_eq!(stats.assets, vec!["ok.html".to_string()]);
        assert_eq!(stats.errors.len(), 1);
        assert!(!temp.path().join("evil.html").exists());
        assert!(!plugin.calls.lock().iter().any(|c| c.contains("evil")));
    }

    #[test]
    fn test_written_assets_are_emitted_once_in_order() {
        let temp = TempDir::new().unwrap();
        let plugin = Arc::new(Recorder {
            assets: vec![
                Asset::new("b.html", "b"),
                Asset::new("../evil.html", "x"),
                Asset::new("a/index.html", "a"),
            ],
            ..Recorder::default()
        });

        let stats = compiler(&temp, Arc::clone(&plugin)).run().unwrap();

        assert_eq!(
            *plugin.calls.lock(),
            vec![
                "run",
                "make",
                "emitted b.html",
                "emitted a/index.html",
                "after_compile"
            ]
        );
        assert_eq!(stats.assets, vec!["b.html".to_string(), "a/index.html".to_string()]);
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained("app/home.html"));
        assert!(is_contained("./home.html"));
        assert!(!is_contained(""));
        assert!(!is_contained("../home.html"));
        assert!(!is_contained("app/../../home.html"));
        assert!(!is_contained("/etc/passwd"));
    }

    #[test]
    fn test_stats_report() {
        let stats = Stats {
            assets: vec!["a.html".into()],
            errors: vec![
                CompileDiagnostic::for_entry("home", "missing file"),
                CompileDiagnostic::new("other"),
            ],
            ..Stats::default()
        };
        assert!(stats.summary().starts_with("built 1 file in"));
        assert_eq!(stats.error_report(), "home: missing file\nother");
    }
}
