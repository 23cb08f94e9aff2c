//! Serves the embedded browser client.

use anyhow::Result;
use tiny_http::{Method, Request};

use super::response::respond_js;
use super::{Handled, Middleware};
use crate::embed::Template;
use crate::embed::client::{CLIENT_JS, ClientVars};

/// `client.js`, rendered once with the events endpoint baked in.
#[derive(Debug, Clone)]
pub struct ClientScript {
    script: String,
}

impl ClientScript {
    /// `events_path` is the absolute URL path of the events WebSocket.
    pub fn new(events_path: &str) -> Self {
        let template: Template<ClientVars<'_>> = CLIENT_JS;
        Self {
            script: template.render(&ClientVars { events_path }),
        }
    }

    #[cfg(test)]
    pub fn script(&self) -> &str {
        &self.script
    }
}

impl Middleware for ClientScript {
    fn name(&self) -> &'static str {
        "client"
    }

    fn handle(&self, request: Request, path: &str) -> Result<Handled> {
        if !path.is_empty() || !matches!(request.method(), Method::Get | Method::Head) {
            return Ok(Handled::Next(request));
        }
        respond_js(request, self.script.clone())?;
        Ok(Handled::Done)
    }
}
