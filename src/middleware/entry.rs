//! Lazy template entry point.
//!
//! A request for `/{prefix}/home.html` marks `home` as used, waits for the
//! next build to produce it and answers with the compiled page:
//!
//! ```text
//! GET /app/home.html
//!   → own thread (at most serve.max_pending, else 503)
//!   → subscribe("home")        first subscriber invalidates the build
//!   → wait (serve.wait_timeout), 102 Processing every second
//!   → unsubscribe()
//!   → 200 + client script tag
//! ```
//!
//! Waiting happens off the request pool, so pages that are still compiling
//! never hold up static files or the client script. A failed interim write
//! means the browser went away; the subscription is released right then
//! instead of at the timeout.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tiny_http::{HTTPVersion, Header, Method, Request};

use super::response::{
    Reply, html_reply, internal_error_reply, respond_unavailable, timeout_reply,
    unavailable_reply,
};
use super::{Handled, Middleware};
use crate::mapper::PathMapper;
use crate::templates::{TemplateError, WaitOutcome, WatchingTemplatesManager, content_version};
use crate::utils::html::{escape_attr, inject_before_body_end};

/// Interim response that probes whether the browser is still there.
const HEARTBEAT: &[u8] = b"HTTP/1.1 102 Processing\r\n\r\n";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Result of waiting for one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Compiled page with the client script injected.
    Ready(String),
    TimedOut,
    /// Shutdown started while waiting.
    Unavailable,
    /// The browser closed the connection.
    Aborted,
    Failed(TemplateError),
}

/// Serves templates on demand from the watching manager.
#[derive(Debug)]
pub struct EntryMiddleware {
    pages: Arc<Pages>,
    mapper: Arc<dyn PathMapper>,
    /// Template sources, absolute.
    directory: PathBuf,
    /// Page requests currently waiting.
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

/// The waiting half, shared with page threads.
#[derive(Debug)]
struct Pages {
    templates: Arc<WatchingTemplatesManager>,
    /// Absolute URL of the client script.
    client_src: String,
    timeout: Duration,
}

impl EntryMiddleware {
    pub fn new(
        templates: Arc<WatchingTemplatesManager>,
        mapper: Arc<dyn PathMapper>,
        directory: PathBuf,
        client_src: String,
        timeout: Duration,
        max_pending: usize,
    ) -> Self {
        Self {
            pages: Arc::new(Pages {
                templates,
                client_src,
                timeout,
            }),
            mapper,
            directory,
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending,
        }
    }

    /// Template name for a path below the mount.
    ///
    /// Directory paths (`""`, `blog/`) resolve to their `index` template.
    /// Names without a source file are not ours, so other handlers (the
    /// static file server) get a chance at them.
    pub fn resolve_name(&self, path: &str) -> Option<String> {
        let name = if path.is_empty() || path.ends_with('/') {
            format!("{path}index")
        } else {
            self.mapper.output_to_name(path)?
        };

        if !is_safe_name(&name) {
            crate::debug!("entry"; "rejecting unsafe name {:?}", name);
            return None;
        }

        self.directory
            .join(self.mapper.name_to_input(&name))
            .is_file()
            .then_some(name)
    }
}

impl Pages {
    /// Subscribe to `name`, wait for its content, and release the
    /// subscription again whatever the outcome.
    ///
    /// `connection_lost` is polled while waiting.
    fn serve(&self, name: &str, mut connection_lost: impl FnMut() -> bool) -> EntryOutcome {
        let mut subscription = self.templates.subscribe(name);
        let outcome = subscription
            .template()
            .waiter()
            .wait(self.timeout, || crate::core::is_shutdown() || connection_lost());

        if let Err(e) = subscription.unsubscribe() {
            return EntryOutcome::Failed(e);
        }

        match outcome {
            WaitOutcome::Ready(content) => EntryOutcome::Ready(self.with_client(name, &content)),
            WaitOutcome::TimedOut => EntryOutcome::TimedOut,
            WaitOutcome::Cancelled if crate::core::is_shutdown() => EntryOutcome::Unavailable,
            WaitOutcome::Cancelled => EntryOutcome::Aborted,
        }
    }

    fn respond(&self, request: Request, name: &str) -> Result<()> {
        let mut connection = Connection::new(request);
        let reply = match self.serve(name, || connection.is_lost()) {
            EntryOutcome::Ready(body) => html_reply(body)?,
            EntryOutcome::TimedOut => {
                crate::log!("entry"; "timed out waiting for {}", name);
                timeout_reply(name)?
            }
            EntryOutcome::Unavailable => unavailable_reply()?,
            EntryOutcome::Aborted => {
                crate::debug!("entry"; "{}: connection closed while waiting", name);
                return Ok(());
            }
            EntryOutcome::Failed(e) => {
                crate::log!("error"; "{}: {}", name, e);
                internal_error_reply(&e.to_string())?
            }
        };
        connection.send(reply)
    }

    fn with_client(&self, name: &str, content: &str) -> String {
        let tag = format!(
            r#"<script src="{}" data-name="{}" data-version="{}" defer></script>"#,
            escape_attr(&self.client_src),
            escape_attr(name),
            content_version(content),
        );
        inject_before_body_end(content, &tag)
    }
}

/// Response side of a page request.
///
/// HTTP/1.1 clients get a [`HEARTBEAT`] every [`HEARTBEAT_INTERVAL`] while
/// the page waits; HTTP/1.0 has no interim responses, so those clients are
/// only ever answered.
struct Connection {
    writer: Box<dyn Write + Send>,
    version: HTTPVersion,
    headers: Vec<Header>,
    head: bool,
    last_beat: Instant,
    lost: bool,
}

impl Connection {
    fn new(request: Request) -> Self {
        let version = request.http_version().clone();
        let headers = request.headers().to_vec();
        let head = request.method() == &Method::Head;
        Self {
            writer: request.into_writer(),
            version,
            headers,
            head,
            last_beat: Instant::now(),
            lost: false,
        }
    }

    /// Send a heartbeat when one is due. True once a write has failed.
    fn is_lost(&mut self) -> bool {
        if self.lost || self.version < (1, 1) || self.last_beat.elapsed() < HEARTBEAT_INTERVAL {
            return self.lost;
        }

        self.last_beat = Instant::now();
        if let Err(e) = self.writer.write_all(HEARTBEAT).and_then(|()| self.writer.flush()) {
            crate::debug!("entry"; "heartbeat failed: {}", e);
            self.lost = true;
        }
        self.lost
    }

    fn send(mut self, reply: Reply) -> Result<()> {
        reply
            .raw_print(&mut self.writer, self.version, &self.headers, self.head, None)
            .and_then(|()| self.writer.flush())
            .context("failed to send page")
    }
}

/// One of the `max_pending` places for a waiting page request.
struct PendingSlot(Arc<AtomicUsize>);

impl PendingSlot {
    fn acquire(pending: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()?;
        Some(Self(Arc::clone(pending)))
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Middleware for EntryMiddleware {
    fn name(&self) -> &'static str {
        "entry"
    }

    fn handle(&self, request: Request, path: &str) -> Result<Handled> {
        if !matches!(request.method(), Method::Get | Method::Head) {
            return Ok(Handled::Next(request));
        }
        let Some(name) = self.resolve_name(path) else {
            return Ok(Handled::Next(request));
        };

        let Some(slot) = PendingSlot::acquire(&self.pending, self.max_pending) else {
            crate::log!("entry"; "{} page(s) already waiting, rejecting {}", self.max_pending, name);
            respond_unavailable(request)?;
            return Ok(Handled::Done);
        };

        crate::debug!("entry"; "request for {}", name);
        let pages = Arc::clone(&self.pages);
        thread::Builder::new()
            .name("entry".into())
            .spawn(move || {
                let _slot = slot;
                if let Err(e) = pages.respond(request, &name) {
                    crate::log!("entry"; "{}: {}", name, e);
                }
            })
            .context("failed to start page thread")?;
        Ok(Handled::Done)
    }
}

/// Relative, `/`-separated, without empty, `.` or `..` segments.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('\\')
        && name
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".."))
}
