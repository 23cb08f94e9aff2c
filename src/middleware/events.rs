//! Template update push channel.
//!
//! Browsers connect with a WebSocket; every emission accepted by the
//! watching manager is forwarded to all of them:
//!
//! ```text
//! WatchingTemplatesManager::emit ─→ TemplateEvent ─→ broadcaster thread
//!                                                       │
//!                                     {"type":"update",...} to every socket
//! ```
//!
//! The client compares the update against the page it shows and decides
//! whether to reload; the server never reads from the sockets.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use tiny_http::{Method, ReadWrite, Request, Response, StatusCode};
use tokio::sync::broadcast::error::RecvError;
use tungstenite::WebSocket;
use tungstenite::handshake::derive_accept_key;
use tungstenite::protocol::{Message, Role};

use super::response::{header_value, make_header, respond_bad_request};
use super::{Handled, Middleware};
use crate::mapper::PathMapper;
use crate::templates::{TemplateEvent, WatchingTemplatesManager};
use crate::utils::path::join_prefix;

type Socket = WebSocket<Box<dyn ReadWrite + Send>>;

/// Message sent to browser clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventMessage {
    /// Connection established
    Connected {
        /// Server version
        version: &'static str,
    },

    /// A template received new content
    Update {
        name: String,
        /// URL path the template is served at (e.g. "/app/home.html")
        path: String,
        /// Content version, matches the page's `data-version`
        version: String,
    },
}

impl EventMessage {
    pub fn connected() -> Self {
        Self::Connected {
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"connected"}"#.to_string())
    }
}

/// Open sockets plus the URL layout used to describe updates.
struct Broadcaster {
    clients: Mutex<Vec<Socket>>,
    prefix: String,
    mapper: Arc<dyn PathMapper>,
}

impl Broadcaster {
    fn update(&self, event: TemplateEvent) -> EventMessage {
        let output = self.mapper.name_to_output(&event.name);
        EventMessage::Update {
            path: format!("/{}", join_prefix(&self.prefix, &output)),
            name: event.name,
            version: event.version,
        }
    }

    fn broadcast(&self, message: &EventMessage) {
        let mut clients = self.clients.lock();
        if clients.is_empty() {
            return;
        }

        let json = message.to_json();
        clients.retain_mut(|ws| match ws.send(Message::Text(json.clone().into())) {
            Ok(()) => true,
            Err(e) => {
                crate::debug!("events"; "client disconnected: {}", e);
                false
            }
        });
        crate::debug!("events"; "update sent to {} client(s)", clients.len());
    }

    /// Forward manager events until the manager goes away.
    fn run(&self, mut events: tokio::sync::broadcast::Receiver<TemplateEvent>) {
        loop {
            match events.blocking_recv() {
                Ok(event) => self.broadcast(&self.update(event)),
                Err(RecvError::Lagged(skipped)) => {
                    crate::debug!("events"; "skipped {} update(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// WebSocket endpoint announcing template updates.
pub struct EventsMiddleware {
    broadcaster: Arc<Broadcaster>,
}

impl std::fmt::Debug for EventsMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsMiddleware")
            .field("prefix", &self.broadcaster.prefix)
            .field("clients", &self.broadcaster.clients.lock().len())
            .finish()
    }
}

impl EventsMiddleware {
    /// Start forwarding `templates` events to connected clients.
    ///
    /// `prefix` is the trimmed URL prefix templates are served under.
    pub fn new(
        templates: &Arc<WatchingTemplatesManager>,
        prefix: impl Into<String>,
        mapper: Arc<dyn PathMapper>,
    ) -> Self {
        let broadcaster = Arc::new(Broadcaster {
            clients: Mutex::new(Vec::new()),
            prefix: prefix.into(),
            mapper,
        });

        let events = templates.events();
        let worker = Arc::clone(&broadcaster);
        std::thread::spawn(move || worker.run(events));

        Self { broadcaster }
    }

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.broadcaster.clients.lock().len()
    }
}

impl Middleware for EventsMiddleware {
    fn name(&self) -> &'static str {
        "events"
    }

    fn handle(&self, request: Request, path: &str) -> Result<Handled> {
        if !path.is_empty() || request.method() != &Method::Get {
            return Ok(Handled::Next(request));
        }

        let is_upgrade = header_value(&request, "Upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));
        let key = header_value(&request, "Sec-WebSocket-Key")
            .filter(|_| is_upgrade)
            .map(|key| key.trim().to_string());
        let Some(key) = key else {
            respond_bad_request(request, "expected a WebSocket upgrade")?;
            return Ok(Handled::Done);
        };

        let accept = derive_accept_key(key.as_bytes());
        let response = Response::empty(StatusCode(101))
            .with_header(make_header("Upgrade", "websocket")?)
            .with_header(make_header("Connection", "Upgrade")?)
            .with_header(make_header("Sec-WebSocket-Accept", &accept)?);

        let stream = request.upgrade("websocket", response);
        let mut ws = WebSocket::from_raw_socket(stream, Role::Server, None);

        // Held across the greeting so no update can overtake it
        let mut clients = self.broadcaster.clients.lock();
        match ws.send(Message::Text(EventMessage::connected().to_json().into())) {
            Ok(()) => {
                clients.push(ws);
                crate::debug!("events"; "client connected (total: {})", clients.len());
            }
            Err(e) => crate::log!("events"; "failed to send connected message: {}", e),
        }
        Ok(Handled::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::DefaultPathMapper;
    use std::thread;
    use std::time::Duration;
    use tiny_http::Server;

    #[test]
    fn test_message_json() {
        let json = EventMessage::Update {
            name: "blog/post".into(),
            path: "/app/blog/post.html".into(),
            version: "00000000000000ff".into(),
        }
        .to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["name"], "blog/post");
        assert_eq!(value["path"], "/app/blog/post.html");
        assert_eq!(value["version"], "00000000000000ff");

        let json = EventMessage::connected().to_json();
        assert!(json.starts_with(r#"{"type":"connected","version":"#));
    }

    #[test]
    fn test_update_path() {
        let broadcaster = |prefix: &str| Broadcaster {
            clients: Mutex::new(Vec::new()),
            prefix: prefix.to_string(),
            mapper: Arc::new(DefaultPathMapper::default()),
        };
        let event = TemplateEvent {
            name: "home".into(),
            version: "v".into(),
        };

        let EventMessage::Update { path, .. } = broadcaster("app").update(event.clone()) else {
            panic!("expected update");
        };
        assert_eq!(path, "/app/home.html");

        let EventMessage::Update { path, .. } = broadcaster("").update(event) else {
            panic!("expected update");
        };
        assert_eq!(path, "/home.html");
    }

    #[test]
    fn test_websocket_receives_updates() {
        let templates = Arc::new(WatchingTemplatesManager::new(|| {}));
        let events = Arc::new(EventsMiddleware::new(
            &templates,
            "app",
            Arc::new(DefaultPathMapper::default()),
        ));

        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = {
            let events = Arc::clone(&events);
            thread::spawn(move || {
                let request = server.recv().unwrap();
                events.handle(request, "").unwrap();
                server
            })
        };

        let (mut ws, _) = tungstenite::connect(format!("ws://{addr}/app/events")).unwrap();
        let _server = handle.join().unwrap();

        let greeting = ws.read().unwrap().into_text().unwrap();
        assert!(greeting.contains(r#""type":"connected""#));
        assert_eq!(events.client_count(), 1);

        let _subscription = templates.subscribe("home");
        templates.emit("home", "<p>home</p>");

        let update: serde_json::Value =
            serde_json::from_str(&ws.read().unwrap().into_text().unwrap()).unwrap();
        assert_eq!(update["type"], "update");
        assert_eq!(update["path"], "/app/home.html");
        assert_eq!(
            update["version"],
            crate::templates::content_version("<p>home</p>")
        );
    }

    #[test]
    fn test_plain_request_is_rejected() {
        let templates = Arc::new(WatchingTemplatesManager::new(|| {}));
        let events = Arc::new(EventsMiddleware::new(
            &templates,
            "app",
            Arc::new(DefaultPathMapper::default()),
        ));

        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let request = server.recv().unwrap();
            events.handle(request, "").unwrap();
        });

        use std::io::{Read, Write};
        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
            .write_all(b"GET /app/events HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        handle.join().unwrap();

        assert!(response.starts_with("HTTP/1.1 400"));
    }
}
