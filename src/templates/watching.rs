//! Demand-driven templates manager for the dev server.
//!
//! A name is "used" while at least one subscription to it is alive.
//! The first subscription to a name creates its [`Template`] and calls
//! `invalidate` so the next build compiles it; the last unsubscribe drops
//! the record, so a later request starts from a fresh template.
//!
//! ```text
//! subscribe("home")  0 → 1   create Template, invalidate()
//! subscribe("home")  1 → 2   share Template
//! unsubscribe()      2 → 1
//! unsubscribe()      1 → 0   remove record
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;

use super::error::TemplateError;
use super::template::{Template, content_version};

/// Capacity of the template event channel.
const EVENT_CAPACITY: usize = 64;

/// Emitted whenever a used template receives new content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEvent {
    pub name: String,
    /// [`content_version`] of the new content.
    pub version: String,
}

struct Subscribed {
    template: Arc<Template>,
    subscribers: usize,
}

/// Reference-counted used set.
pub struct WatchingTemplatesManager {
    used: DashMap<String, Subscribed>,
    /// Called on each 0 → tracked transition, after the record is visible.
    invalidate: Box<dyn Fn() + Send + Sync>,
    events: broadcast::Sender<TemplateEvent>,
}

impl std::fmt::Debug for WatchingTemplatesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchingTemplatesManager")
            .field("used", &self.used())
            .finish_non_exhaustive()
    }
}

impl WatchingTemplatesManager {
    pub fn new(invalidate: impl Fn() + Send + Sync + 'static) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            used: DashMap::new(),
            invalidate: Box::new(invalidate),
            events,
        }
    }

    /// Snapshot of the names currently subscribed to, sorted.
    pub fn used(&self) -> Vec<String> {
        let mut names: Vec<_> = self.used.iter().map(|r| r.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Current subscriber count for a name (0 when unused).
    #[cfg(test)]
    pub fn subscribers(&self, name: &str) -> usize {
        self.used.get(name).map_or(0, |r| r.subscribers)
    }

    /// Deliver compiled content to a used template.
    ///
    /// Content for names that are no longer used is dropped: it belongs to
    /// a build that started before the last subscriber left.
    pub fn emit(&self, name: &str, content: impl Into<Arc<str>>) {
        let Some(template) = self.used.get(name).map(|r| Arc::clone(&r.template)) else {
            crate::debug!("templates"; "dropping stale output for {}", name);
            return;
        };

        let content = content.into();
        let version = content_version(&content);
        template.emit(content);
        // No receivers is fine: no browser is connected.
        let _ = self.events.send(TemplateEvent {
            name: name.to_string(),
            version,
        });
    }

    /// Mark `name` as used for as long as the returned subscription lives.
    pub fn subscribe(self: &Arc<Self>, name: &str) -> Subscription {
        // The shard lock is released before invalidating
        let (template, first) = match self.used.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().subscribers += 1;
                (Arc::clone(&entry.get().template), false)
            }
            Entry::Vacant(entry) => {
                let template = Arc::new(Template::new(name));
                entry.insert(Subscribed {
                    template: Arc::clone(&template),
                    subscribers: 1,
                });
                (template, true)
            }
        };

        if first {
            crate::debug!("templates"; "{} is now used, invalidating", name);
            (self.invalidate)();
        }

        Subscription {
            manager: Arc::clone(self),
            template,
            active: true,
        }
    }

    /// Receive an event for every accepted emission.
    pub fn events(&self) -> broadcast::Receiver<TemplateEvent> {
        self.events.subscribe()
    }

    fn release(&self, template: &Arc<Template>) {
        let name = template.name();
        match self.used.entry(name.to_string()) {
            Entry::Occupied(mut entry) if Arc::ptr_eq(&entry.get().template, template) => {
                let remaining = {
                    let record = entry.get_mut();
                    record.subscribers -= 1;
                    record.subscribers
                };
                if remaining == 0 {
                    entry.remove();
                    crate::debug!("templates"; "{} is no longer used", name);
                }
            }
            // Unreachable while subscriptions release at most once
            _ => crate::log!("templates"; "release of untracked template {}", name),
        }
    }
}

/// Live interest in one template.
///
/// Releases its reference on [`unsubscribe`](Self::unsubscribe) or drop.
#[derive(Debug)]
pub struct Subscription {
    manager: Arc<WatchingTemplatesManager>,
    template: Arc<Template>,
    active: bool,
}

impl Subscription {
    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn name(&self) -> &str {
        self.template.name()
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Release this subscription. Fails if it was already released.
    pub fn unsubscribe(&mut self) -> Result<(), TemplateError> {
        if !self.active {
            return Err(TemplateError::InactiveSubscription {
                name: self.name().to_string(),
            });
        }
        self.active = false;
        self.manager.release(&self.template);
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.active {
            let _ = self.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use std::thread;
    use std::time::Duration;

    use crate::templates::WaitOutcome;

    fn counting_manager() -> (Arc<WatchingTemplatesManager>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let manager = WatchingTemplatesManager::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (Arc::new(manager), count)
    }

    #[test]
    fn test_first_subscribe_invalidates_once() {
        let (manager, invalidations) = counting_manager();

        let first = manager.subscribe("home");
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);
        assert_eq!(manager.used(), vec!["home".to_string()]);

        let second = manager.subscribe("home");
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);
        assert_eq!(manager.subscribers("home"), 2);
        assert!(Arc::ptr_eq(first.template(), second.template()));

        let _about = manager.subscribe("about");
        assert_eq!(invalidations.load(Ordering::SeqCst), 2);
        assert_eq!(manager.used(), vec!["about".to_string(), "home".to_string()]);
    }

    #[test]
    fn test_invalidate_may_read_the_manager() {
        let manager_slot: Arc<OnceLock<Weak<WatchingTemplatesManager>>> = Arc::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let manager = {
            let manager_slot = Arc::clone(&manager_slot);
            let seen = Arc::clone(&seen);
            Arc::new(WatchingTemplatesManager::new(move || {
                if let Some(manager) = manager_slot.get().and_then(Weak::upgrade) {
                    seen.lock().push(format!("{manager:?}"));
                    seen.lock().extend(manager.used());
                }
            }))
        };
        manager_slot.set(Arc::downgrade(&manager)).unwrap();

        let _subscription = manager.subscribe("home");
        let seen = seen.lock();
        assert!(seen[0].contains("home"));
        assert_eq!(seen[1], "home");
    }

    #[test]
    fn test_unsubscribe_removes_at_zero() {
        let (manager, _) = counting_manager();
        let mut first = manager.subscribe("home");
        let mut second = manager.subscribe("home");

        first.unsubscribe().unwrap();
        assert_eq!(manager.used(), vec!["home".to_string()]);
        assert_eq!(manager.subscribers("home"), 1);

        second.unsubscribe().unwrap();
        assert!(manager.used().is_empty());
        assert_eq!(manager.subscribers("home"), 0);
    }

    #[test]
    fn test_double_unsubscribe_fails() {
        let (manager, _) = counting_manager();
        let mut subscription = manager.subscribe("home");
        let _other = manager.subscribe("home");

        assert!(subscription.unsubscribe().is_ok());
        assert!(!subscription.is_active());
        assert_eq!(
            subscription.unsubscribe(),
            Err(TemplateError::InactiveSubscription {
                name: "home".into()
            })
        );
        // The failed call must not have decremented the other subscriber
        assert_eq!(manager.subscribers("home"), 1);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let (manager, _) = counting_manager();
        {
            let _subscription = manager.subscribe("home");
            assert_eq!(manager.subscribers("home"), 1);
        }
        assert!(manager.used().is_empty());
    }

    #[test]
    fn test_resubscribe_after_release_gets_fresh_template() {
        let (manager, invalidations) = counting_manager();

        let mut subscription = manager.subscribe("home");
        manager.emit("home", "<html>v1</html>");
        assert_eq!(
            subscription.template().content().as_deref(),
            Some("<html>v1</html>")
        );
        subscription.unsubscribe().unwrap();

        let fresh = manager.subscribe("home");
        assert_eq!(fresh.template().content(), None);
        assert_eq!(invalidations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_active_template_content_reused_without_invalidation() {
        let (manager, invalidations) = counting_manager();

        let _holder = manager.subscribe("home");
        manager.emit("home", "<html>v1</html>");

        let again = manager.subscribe("home");
        assert_eq!(again.template().content().as_deref(), Some("<html>v1</html>"));
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_unused_is_dropped() {
        let (manager, _) = counting_manager();
        let mut events = manager.events();

        manager.emit("ghost", "<html></html>");
        assert!(manager.used().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_emit_broadcasts_event() {
        let (manager, _) = counting_manager();
        let mut events = manager.events();
        let _subscription = manager.subscribe("home");

        manager.emit("home", "<html></html>");
        assert_eq!(
            events.try_recv().unwrap(),
            TemplateEvent {
                name: "home".into(),
                version: content_version("<html></html>"),
            }
        );
    }

    #[test]
    fn test_stale_subscription_does_not_touch_new_record() {
        let (manager, _) = counting_manager();
        let mut old = manager.subscribe("home");
        old.unsubscribe().unwrap();

        let _new = manager.subscribe("home");
        assert!(old.unsubscribe().is_err());
        assert_eq!(manager.subscribers("home"), 1);
    }

    #[test]
    fn test_concurrent_waiters_share_one_emission() {
        let (manager, invalidations) = counting_manager();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    let mut subscription = manager.subscribe("home");
                    let outcome = subscription
                        .template()
                        .waiter()
                        .wait(Duration::from_secs(5), || false);
                    subscription.unsubscribe().unwrap();
                    outcome
                })
            })
            .collect();

        // Wait until both requests are subscribed before compiling
        while manager.subscribers("home") < 2 {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);
        assert_eq!(manager.used(), vec!["home".to_string()]);
        manager.emit("home", "<html>shared</html>");

        for handle in handles {
            assert_eq!(
                handle.join().unwrap(),
                WaitOutcome::Ready(Arc::from("<html>shared</html>"))
            );
        }
        assert!(manager.used().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Subscribe(u8),
        Unsubscribe(usize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4).prop_map(Op::Subscribe),
            any::<usize>().prop_map(Op::Unsubscribe),
        ]
    }

    proptest! {
        #[test]
        fn used_matches_positive_counts(ops in prop::collection::vec(arb_op(), 0..64)) {
            let (manager, invalidations) = counting_manager();
            let mut live: Vec<Subscription> = Vec::new();
            let mut expected: BTreeMap<String, usize> = BTreeMap::new();
            let mut expected_invalidations = 0;

            for op in ops {
                match op {
                    Op::Subscribe(n) => {
                        let name = format!("page-{n}");
                        let count = expected.entry(name.clone()).or_insert(0);
                        if *count == 0 {
                            expected_invalidations += 1;
                        }
                        *count += 1;
                        live.push(manager.subscribe(&name));
                    }
                    Op::Unsubscribe(i) if !live.is_empty() => {
                        let mut subscription = live.remove(i % live.len());
                        let name = subscription.name().to_string();
                        prop_assert!(subscription.unsubscribe().is_ok());
                        prop_assert!(subscription.unsubscribe().is_err());
                        let count = expected.get_mut(&name).unwrap();
                        *count -= 1;
                        if *count == 0 {
                            expected.remove(&name);
                        }
                    }
                    Op::Unsubscribe(_) => {}
                }

                let expected_used: Vec<String> = expected.keys().cloned().collect();
                prop_assert_eq!(manager.used(), expected_used);
                for (name, count) in &expected {
                    prop_assert_eq!(manager.subscribers(name), *count);
                }
                prop_assert_eq!(invalidations.load(Ordering::SeqCst), expected_invalidations);
            }
        }
    }
}
