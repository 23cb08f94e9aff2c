//! A single lazily-produced template.
//!
//! Holds the latest emitted content and a set of one-shot waiters.
//! Waiters registered before (or while) content is emitted receive it
//! exactly once; later callers read the stored content directly.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};

/// How often a blocked waiter re-checks its cancellation condition.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Short fingerprint of template content.
///
/// Pages carry the version they were served with, so a browser can tell
/// an update apart from the content it already shows.
pub fn content_version(content: &str) -> String {
    let mut hasher = FxHasher::default();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Named unit of compiled output.
#[derive(Debug)]
pub struct Template {
    name: String,
    state: Mutex<TemplateState>,
}

#[derive(Debug, Default)]
struct TemplateState {
    content: Option<Arc<str>>,
    waiters: FxHashMap<u64, Sender<Arc<str>>>,
    next_waiter: u64,
}

/// Result of waiting for content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready(Arc<str>),
    TimedOut,
    Cancelled,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(TemplateState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest emitted content, if any.
    #[cfg(test)]
    pub fn content(&self) -> Option<Arc<str>> {
        self.state.lock().content.clone()
    }

    #[cfg(test)]
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Store new content and resolve every pending waiter with it.
    pub fn emit(&self, content: impl Into<Arc<str>>) {
        let content = content.into();
        let mut state = self.state.lock();
        state.content = Some(Arc::clone(&content));
        let waiters = std::mem::take(&mut state.waiters);
        drop(state);

        crate::debug!("template"; "{}: emitted to {} waiter(s)", self.name, waiters.len());
        for (_, tx) in waiters {
            // Bounded(1) and resolved once: never blocks.
            let _ = tx.send(Arc::clone(&content));
        }
    }

    /// Register a waiter for the next emission.
    ///
    /// If content already exists, the returned waiter is resolved with it
    /// immediately. Dropping the waiter unregisters it.
    pub fn waiter(self: &Arc<Self>) -> ContentWaiter {
        let (tx, rx) = channel::bounded(1);
        let mut state = self.state.lock();

        if let Some(content) = &state.content {
            let _ = tx.send(Arc::clone(content));
            return ContentWaiter {
                template: Arc::clone(self),
                id: None,
                rx,
            };
        }

        let id = state.next_waiter;
        state.next_waiter += 1;
        state.waiters.insert(id, tx);

        ContentWaiter {
            template: Arc::clone(self),
            id: Some(id),
            rx,
        }
    }

    fn forget_waiter(&self, id: u64) {
        self.state.lock().waiters.remove(&id);
    }
}

/// Pending interest in a template's content.
///
/// Resolved at most once. Unregisters itself from the template on drop.
#[derive(Debug)]
pub struct ContentWaiter {
    template: Arc<Template>,
    id: Option<u64>,
    rx: Receiver<Arc<str>>,
}

impl ContentWaiter {
    /// Content if it has already arrived.
    pub fn try_content(&self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }

    /// Block until resolved, timed out, or cancelled.
    ///
    /// `cancelled` is polled every [`POLL_INTERVAL`] while nothing arrives.
    pub fn wait(self, timeout: Duration, mut cancelled: impl FnMut() -> bool) -> WaitOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            if cancelled() {
                return WaitOutcome::Cancelled;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return match self.try_content() {
                    Some(content) => WaitOutcome::Ready(content),
                    None => WaitOutcome::TimedOut,
                };
            }

            match self.rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(content) => return WaitOutcome::Ready(content),
                Err(RecvTimeoutError::Timeout) => continue,
                // Sender dropped without sending: the waiter was discarded.
                Err(RecvTimeoutError::Disconnected) => return WaitOutcome::Cancelled,
            }
        }
    }
}

impl Drop for ContentWaiter {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.template.forget_waiter(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_emit_resolves_pending_waiters_once() {
        let template = Arc::new(Template::new("home"));
        let first = template.waiter();
        let second = template.waiter();
        assert_eq!(template.waiter_count(), 2);

        template.emit("<html>1</html>");
        assert_eq!(template.waiter_count(), 0);

        assert_eq!(first.try_content().as_deref(), Some("<html>1</html>"));
        assert_eq!(second.try_content().as_deref(), Some("<html>1</html>"));

        // Resolved waiters are not re-notified
        template.emit("<html>2</html>");
        assert_eq!(first.try_content(), None);
        assert_eq!(template.content().as_deref(), Some("<html>2</html>"));
    }

    #[test]
    fn test_content_version() {
        assert_eq!(content_version("<p>a</p>"), content_version("<p>a</p>"));
        assert_ne!(content_version("<p>a</p>"), content_version("<p>b</p>"));
        assert_eq!(content_version("").len(), 16);
    }

    #[test]
    fn test_late_waiter_sees_latest_content() {
        let template = Arc::new(Template::new("home"));
        template.emit("old");
        template.emit("new");

        let waiter = template.waiter();
        assert_eq!(template.waiter_count(), 0);
        assert_eq!(waiter.try_content().as_deref(), Some("new"));
    }

    #[test]
    fn test_dropped_waiter_is_unregistered() {
        let template = Arc::new(Template::new("home"));
        let waiter = template.waiter();
        assert_eq!(template.waiter_count(), 1);

        drop(waiter);
        assert_eq!(template.waiter_count(), 0);
    }

    #[test]
    fn test_wait_times_out_and_cleans_up() {
        let template = Arc::new(Template::new("home"));
        let outcome = template.waiter().wait(Duration::from_millis(20), || false);

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(template.waiter_count(), 0);
    }

    #[test]
    fn test_wait_cancelled() {
        let template = Arc::new(Template::new("home"));
        let outcome = template.waiter().wait(Duration::from_secs(5), || true);

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert_eq!(template.waiter_count(), 0);
    }

    #[test]
    fn test_wait_polls_until_cancelled() {
        let template = Arc::new(Template::new("home"));
        let mut polls = 0;
        let outcome = template.waiter().wait(Duration::from_secs(5), || {
            polls += 1;
            polls == 3
        });

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert_eq!(polls, 3);
        assert_eq!(template.waiter_count(), 0);
    }

    #[test]
    fn test_wait_across_threads() {
        let template = Arc::new(Template::new("home"));
        let waiter = template.waiter();

        let emitter = {
            let template = Arc::clone(&template);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                template.emit("<p>ready</p>");
            })
        };

        let outcome = waiter.wait(Duration::from_secs(5), || false);
        emitter.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Ready(Arc::from("<p>ready</p>")));
    }
}
