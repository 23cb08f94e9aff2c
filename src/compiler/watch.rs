//! Watch mode: the invalidation handle and the rebuild loop.
//!
//! ```text
//! Watching::invalidate() ──┐
//! notify (context deps) ───┼─→ debounce ─→ Compiler::watch_cycle() ─→ status
//! Ctrl+C ──────────────────┘ (stop)
//! ```
//!
//! Builds run on the blocking pool; the loop itself only waits. A signal
//! that arrives while a build is running stays queued and starts the next
//! build once the current one finishes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use super::{Compiler, Stats};
use crate::logger::{status_error, status_success};

/// Quiet period before a rebuild starts.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Handle for requesting a rebuild. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Watching {
    tx: mpsc::UnboundedSender<()>,
}

impl Watching {
    /// Handle plus the receiving end for [`WatchActor`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a rebuild. A no-op once the watch loop has stopped.
    pub fn invalidate(&self) {
        if self.tx.send(()).is_err() {
            crate::debug!("watch"; "invalidate after watch loop stopped");
        }
    }
}

/// What woke the loop up.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Trigger {
    Invalidated,
    Changed(PathBuf),
    Shutdown,
}

/// Rebuild loop for `build --watch` and `serve`.
pub struct WatchActor {
    compiler: Arc<Compiler>,
    invalidations: mpsc::UnboundedReceiver<()>,
    shutdown: crossbeam::channel::Receiver<()>,
    debounce: Duration,
}

impl WatchActor {
    pub fn new(
        compiler: Arc<Compiler>,
        invalidations: mpsc::UnboundedReceiver<()>,
        shutdown: crossbeam::channel::Receiver<()>,
    ) -> Self {
        Self {
            compiler,
            invalidations,
            shutdown,
            debounce: DEBOUNCE,
        }
    }

    #[cfg(test)]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Build once, then rebuild on every trigger until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel::<PathBuf>();
        let output = self.compiler.output().to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if is_content_change(&event.kind) => {
                    // Our own writes never trigger a rebuild
                    for path in event.paths.into_iter().filter(|p| !p.starts_with(&output)) {
                        let _ = fs_tx.send(path);
                    }
                }
                Ok(_) => {}
                Err(e) => crate::log!("watch"; "notify error: {}", e),
            }
        })
        .context("failed to create file watcher")?;
        let mut watched = FxHashSet::default();

        // crossbeam → tokio bridge
        let (stop_tx, mut stop_rx) = mpsc::unbounded_channel::<()>();
        let shutdown = self.shutdown.clone();
        std::thread::spawn(move || {
            if shutdown.recv().is_ok() {
                let _ = stop_tx.send(());
            }
        });

        loop {
            if let Some(stats) = self.build().await? {
                self.watch_dependencies(&mut watcher, &mut watched, &stats);
            }

            let trigger = tokio::select! {
                _ = stop_rx.recv() => Trigger::Shutdown,
                Some(()) = self.invalidations.recv() => Trigger::Invalidated,
                Some(path) = fs_rx.recv() => Trigger::Changed(path),
            };
            if trigger == Trigger::Shutdown || crate::core::is_shutdown() {
                break;
            }
            if let Trigger::Changed(path) = &trigger {
                crate::debug!("watch"; "changed: {}", path.display());
            }

            // Coalesce everything that arrives within the window
            tokio::time::sleep(self.debounce).await;
            while self.invalidations.try_recv().is_ok() {}
            while fs_rx.try_recv().is_ok() {}

            if crate::core::is_shutdown() {
                break;
            }
        }

        crate::debug!("watch"; "watch loop stopped");
        Ok(())
    }

    /// Run one build and report it. Build failures are shown, not returned.
    async fn build(&self) -> Result<Option<Stats>> {
        let compiler = Arc::clone(&self.compiler);
        let result = tokio::task::spawn_blocking(move || compiler.watch_cycle())
            .await
            .context("build task panicked")?;

        match result {
            Ok(stats) if stats.has_errors() => {
                status_error(
                    &format!("{} with {} error(s)", stats.summary(), stats.errors.len()),
                    &stats.error_report(),
                );
                Ok(Some(stats))
            }
            Ok(stats) => {
                status_success(&stats.summary());
                Ok(Some(stats))
            }
            Err(e) => {
                status_error("build failed", &format!("{e:#}"));
                Ok(None)
            }
        }
    }

    /// Start watching context dependencies we are not watching yet.
    fn watch_dependencies(
        &self,
        watcher: &mut RecommendedWatcher,
        watched: &mut FxHashSet<PathBuf>,
        stats: &Stats,
    ) {
        for dir in &stats.context_dependencies {
            if watched.contains(dir) || !is_watchable(dir, self.compiler.output()) {
                continue;
            }
            match watcher.watch(dir, RecursiveMode::Recursive) {
                Ok(()) => {
                    crate::debug!("watch"; "watching {}", dir.display());
                    watched.insert(dir.clone());
                }
                Err(e) => crate::log!("watch"; "cannot watch {}: {}", dir.display(), e),
            }
        }
    }
}

/// Create/modify/remove; metadata-only changes are noise.
fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(modify) => !matches!(modify, notify::event::ModifyKind::Metadata(_)),
        _ => false,
    }
}

/// Existing directories that are not inside the output.
fn is_watchable(dir: &Path, output: &Path) -> bool {
    dir.is_dir() && !dir.starts_with(output)
}
