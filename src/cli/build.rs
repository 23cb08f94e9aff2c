//! `build` command.
//!
//! - One-shot: compile every template once, report, exit non-zero on errors
//! - `--watch`: compile every template, then rebuild on template changes

use std::sync::Arc;

use anyhow::{Result, bail};

use crate::{
    cli::common::create_compiler,
    cli::serve::lifecycle::run_watcher,
    compiler::{Stats, WatchActor, Watching},
    config::LazyHtmlConfig,
    log,
};

/// Run the build command.
pub fn build(config: &LazyHtmlConfig, watch: bool) -> Result<()> {
    let compiler = create_compiler(config)?;

    if watch {
        return watch_templates(compiler);
    }

    let stats = compiler.run()?;
    report(&stats)
}

/// Print the build result. Compile errors fail the command.
fn report(stats: &Stats) -> Result<()> {
    if stats.has_errors() {
        log!("error"; "{}", stats.error_report());
        bail!("{} with {} error(s)", stats.summary(), stats.errors.len());
    }
    log!("build"; "{}", stats.summary());
    Ok(())
}

/// Build once, then rebuild on changes until Ctrl+C.
fn watch_templates(compiler: crate::compiler::Compiler) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = crossbeam::channel::unbounded();
    crate::core::register_watcher(shutdown_tx);

    // No dev server: file changes are the only rebuild trigger
    let (_watching, invalidations) = Watching::channel();
    log!("watch"; "watching {}", compiler.context().display());

    run_watcher(WatchActor::new(Arc::new(compiler), invalidations, shutdown_rx))
}
