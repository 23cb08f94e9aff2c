//! HTTP response helpers.

use std::io::Cursor;
use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::utils::mime::types::{HTML, JAVASCRIPT, PLAIN};

/// A fully buffered response.
pub type Reply = Response<Cursor<Vec<u8>>>;

/// Respond with a static file.
pub fn respond_file(request: Request, path: &Path) -> Result<()> {
    let content_type = crate::utils::mime::from_path(path);

    if is_head_request(&request) {
        return send_head(request, 200, content_type);
    }

    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    send(request, reply(200, content_type, body)?)
}

/// Respond with JavaScript from memory.
pub fn respond_js(request: Request, body: String) -> Result<()> {
    if is_head_request(&request) {
        return send_head(request, 200, JAVASCRIPT);
    }
    send(request, reply(200, JAVASCRIPT, body.into_bytes())?)
}

pub fn respond_not_found(request: Request) -> Result<()> {
    send(request, text_reply(404, "404 Not Found")?)
}

/// 400: e.g. a plain request to the events endpoint.
pub fn respond_bad_request(request: Request, message: &str) -> Result<()> {
    send(request, text_reply(400, &format!("400 Bad Request: {message}"))?)
}

/// 503: the server is shutting down or too busy.
pub fn respond_unavailable(request: Request) -> Result<()> {
    send(request, unavailable_reply()?)
}

/// An HTML page.
pub fn html_reply(body: String) -> Result<Reply> {
    reply(200, HTML, body.into_bytes())
}

/// 500: the request could not be completed.
pub fn internal_error_reply(message: &str) -> Result<Reply> {
    text_reply(500, &format!("500 Internal Server Error: {message}"))
}

pub fn unavailable_reply() -> Result<Reply> {
    text_reply(503, "503 Service Unavailable")
}

/// 504: the template was not compiled in time.
pub fn timeout_reply(name: &str) -> Result<Reply> {
    text_reply(
        504,
        &format!("504 Gateway Timeout: `{name}` was not compiled in time"),
    )
}

pub fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

/// Value of a request header, matched case-insensitively.
pub fn header_value<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn text_reply(status: u16, message: &str) -> Result<Reply> {
    reply(status, PLAIN, message.as_bytes().to_vec())
}

fn reply(status: u16, content_type: &'static str, body: Vec<u8>) -> Result<Reply> {
    Ok(Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type)?)
        .with_header(make_header("Cache-Control", "no-store")?))
}

fn send(request: Request, reply: Reply) -> Result<()> {
    request.respond(reply)?;
    Ok(())
}

fn send_head(request: Request, status: u16, content_type: &'static str) -> Result<()> {
    let response = Response::empty(StatusCode(status))
        .with_header(make_header("Content-Type", content_type)?)
        .with_header(make_header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

pub fn make_header(key: &str, value: &str) -> Result<Header> {
    Header::from_bytes(key, value).map_err(|()| anyhow!("invalid header `{key}: {value}`"))
}
