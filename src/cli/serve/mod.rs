//! Development server with lazy template compilation.
//!
//! ```text
//! request ─→ Router (plugin mounts) ─→ static file from output ─→ 404
//!                 │
//!                 └─ entry requests move to their own thread and wait
//!                    there for the watch loop
//! ```

pub mod lifecycle;
mod path;

use crate::{
    cli::common::create_compiler,
    compiler::{WatchActor, Watching},
    config::LazyHtmlConfig,
    debug, log,
    middleware::{Router, response},
};
use anyhow::{Context, Result};
use crossbeam::channel;
use std::path::Path;
use std::sync::Arc;
use tiny_http::{Request, Server};

/// Run the dev server until Ctrl+C.
pub fn serve(config: &LazyHtmlConfig) -> Result<()> {
    let compiler = Arc::new(create_compiler(config)?);
    let (watching, invalidations) = Watching::channel();
    let router = Arc::new(Router::new(compiler.setup_dev_server(&watching)?));
    for mount in router.mounts() {
        debug!("serve"; "{} → {}", mount.path(), mount.middleware().name());
    }

    let (server, addr) = lifecycle::bind_with_retry(config.serve.interface, config.serve.port)?;
    let server = Arc::new(server);
    crate::core::register_server(Arc::clone(&server));

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    crate::core::register_watcher(shutdown_tx);

    log!("serve"; "http://{}/{}", addr, config.plugin.trimmed_prefix());

    let watcher = lifecycle::spawn_watcher(WatchActor::new(
        Arc::clone(&compiler),
        invalidations,
        shutdown_rx,
    ));
    run_request_loop(&server, &router, compiler.output(), config.serve.workers)?;
    lifecycle::wait_for_shutdown(watcher);
    Ok(())
}

fn run_request_loop(server: &Server, router: &Arc<Router>, output: &Path, workers: usize) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("serve-{i}"))
        .build()
        .context("failed to create request thread pool")?;

    for request in server.incoming_requests() {
        let router = Arc::clone(router);
        let output = output.to_path_buf();
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &router, &output) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

/// Handle a single HTTP request
fn handle_request(request: Request, router: &Router, output: &Path) -> Result<()> {
    // Early exit if shutdown requested
    if crate::core::is_shutdown() {
        return response::respond_unavailable(request);
    }

    debug!("serve"; "{} {}", request.method(), request.url());
    let Some(request) = router.dispatch(request)? else {
        return Ok(());
    };

    match path::resolve_path(request.url(), output) {
        Some(file) => response::respond_file(request, &file),
        None => response::respond_not_found(request),
    }
}
