//! Embedded static resources.
//!
//! # Module Structure
//!
//! - `template` - Template types for typed variable injection
//! - `client` - Browser client served by the dev server (client.js)
//!
//! # Usage
//!
//! ```ignore
//! use embed::client::{CLIENT_JS, ClientVars};
//!
//! let js = CLIENT_JS.render(&ClientVars { events_path: "/app/lazy-html-plugin/events" });
//! ```

mod template;

pub use template::{Template, TemplateVars};

pub mod client {
    use super::{Template, TemplateVars};

    /// Variables for client.js template.
    pub struct ClientVars<'a> {
        /// Absolute URL path of the events WebSocket.
        pub events_path: &'a str,
    }

    impl TemplateVars for ClientVars<'_> {
        fn apply(&self, content: &str) -> String {
            // JSON string literal: quotes and escapes for JS
            let literal = serde_json::to_string(self.events_path)
                .unwrap_or_else(|_| String::from("\"\""));
            content.replace("__EVENTS_PATH__", &literal)
        }
    }

    /// Reloads the page when its template is recompiled.
    pub const CLIENT_JS: Template<ClientVars<'static>> =
        Template::new(include_str!("client.js"));
}
