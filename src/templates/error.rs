//! Template manager errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// `unsubscribe` called on a subscription that was already released.
    /// Indicates a reference-counting bug in the caller.
    #[error("subscription to template `{name}` is not active")]
    InactiveSubscription { name: String },
}
