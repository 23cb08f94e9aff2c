//! Dev server request handlers.
//!
//! A [`Mount`] binds a [`Middleware`] to a path prefix. The [`Router`]
//! offers each request to the mounts in order; a middleware either answers
//! it or hands it back with [`Handled::Next`].
//!
//! ```text
//! /app/lazy-html-plugin/client.js  → ClientScript
//! /app/lazy-html-plugin/events     → EventsMiddleware (WebSocket)
//! /app/...                         → EntryMiddleware (lazy templates)
//! ```
//!
//! # Module Structure
//!
//! - `client` - Embedded browser client
//! - `entry` - Subscribe, wait for content, respond
//! - `events` - WebSocket push of template updates
//! - `response` - Response helpers shared with the static file server

mod client;
mod entry;
mod events;
pub mod response;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use percent_encoding::percent_decode_str;
use tiny_http::Request;

pub use client::ClientScript;
pub use entry::EntryMiddleware;
pub use events::EventsMiddleware;

/// Outcome of offering a request to a middleware.
pub enum Handled {
    /// A response was sent.
    Done,
    /// Not ours; try the next mount.
    Next(Request),
}

impl fmt::Debug for Handled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("Done"),
            Self::Next(request) => write!(f, "Next({})", request.url()),
        }
    }
}

pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// `path` is the decoded request path below the mount point, without
    /// a leading `/` or query string.
    fn handle(&self, request: Request, path: &str) -> Result<Handled>;
}

/// A middleware bound to a path prefix.
#[derive(Clone)]
pub struct Mount {
    /// Always starts with `/`, never ends with one (except the root).
    path: String,
    middleware: Arc<dyn Middleware>,
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("path", &self.path)
            .field("middleware", &self.middleware.name())
            .finish()
    }
}

impl Mount {
    pub fn new(path: &str, middleware: Arc<dyn Middleware>) -> Self {
        Self {
            path: format!("/{}", path.trim_matches('/')),
            middleware,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn middleware(&self) -> &Arc<dyn Middleware> {
        &self.middleware
    }

    /// Remainder of `request_path` below this mount, if it matches.
    ///
    /// `/app` matches `/app` and `/app/...`, but not `/application`.
    pub fn strip<'a>(&self, request_path: &'a str) -> Option<&'a str> {
        if self.path == "/" {
            return Some(request_path.trim_start_matches('/'));
        }
        let rest = request_path.strip_prefix(&self.path)?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }
}

/// Ordered middleware chain.
#[derive(Debug, Clone, Default)]
pub struct Router {
    mounts: Vec<Mount>,
}

impl Router {
    pub fn new(mounts: Vec<Mount>) -> Self {
        Self { mounts }
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Offer `request` to each matching mount in order.
    ///
    /// Returns the request back if no middleware answered it.
    pub fn dispatch(&self, request: Request) -> Result<Option<Request>> {
        let path = request_path(request.url()).into_owned();
        let mut request = request;

        for mount in &self.mounts {
            let Some(rest) = mount.strip(&path) else {
                continue;
            };
            match mount.middleware.handle(request, rest)? {
                Handled::Done => return Ok(None),
                Handled::Next(unhandled) => request = unhandled,
            }
        }

        Ok(Some(request))
    }
}

/// Decoded path of a request URL, without query string or fragment.
pub fn request_path(url: &str) -> Cow<'_, str> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    percent_decode_str(path).decode_utf8_lossy()
}
