//! Template tracking.
//!
//! # Module Structure
//!
//! - `template` - A single template: latest content + pending waiters
//! - `watching` - Reference-counted used set for the dev server
//! - `constant` - Fixed used set for one-shot builds
//! - `resolve` - Template discovery by glob
//!
//! The two managers are tagged variants of [`TemplatesManager`]. Only the
//! watching one hands out subscriptions, so the dev server holds it directly.

mod constant;
mod error;
mod resolve;
mod template;
mod watching;

use std::sync::Arc;

pub use constant::ConstantTemplatesManager;
pub use error::TemplateError;
pub use resolve::resolve_names;
pub use template::{WaitOutcome, content_version};
pub use watching::{TemplateEvent, WatchingTemplatesManager};

/// The active used set of a build session.
#[derive(Debug)]
pub enum TemplatesManager {
    /// Everything is compiled (one-shot build, or watch without dev server).
    Constant(ConstantTemplatesManager),
    /// Only what the browser asked for (dev server).
    Watching(Arc<WatchingTemplatesManager>),
}

impl TemplatesManager {
    pub fn constant(names: impl IntoIterator<Item = String>) -> Self {
        Self::Constant(ConstantTemplatesManager::new(names))
    }

    /// Snapshot of names the next build must produce.
    pub fn used(&self) -> Vec<String> {
        match self {
            Self::Constant(manager) => manager.used(),
            Self::Watching(manager) => manager.used(),
        }
    }

    /// Deliver compiled content for `name`.
    pub fn emit(&self, name: &str, content: impl Into<Arc<str>>) {
        match self {
            Self::Constant(manager) => manager.emit(name, content),
            Self::Watching(manager) => manager.emit(name, content),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    #[cfg(test)]
    pub fn as_watching(&self) -> Option<&Arc<WatchingTemplatesManager>> {
        match self {
            Self::Watching(manager) => Some(manager),
            Self::Constant(_) => None,
        }
    }
}
