//! Minimal HTTP/1.x helpers
//!
//! Just enough HTTP for the node: parsing a request that fits in one buffer
//! for the status/config server, and building the GET request and reading
//! the status line for the upload client. Everything works on borrowed
//! slices so the firmware can use stack buffers.

use core::fmt::Write;

use alloc::string::String;
use heapless::String as HString;

use crate::error::HttpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A parsed request borrowing from the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'r> {
    pub method: Method,
    /// Path without the query string
    pub path: &'r str,
    /// Raw query string without the leading `?`, empty if absent
    pub query: &'r str,
    /// Body bytes received so far, as text
    pub body: &'r str,
}

/// Index just past the `\r\n\r\n` that ends the header block.
pub fn header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Value of the `Content-Length` header, 0 if absent.
pub fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Length of the request at the start of `raw`, once its header block and
/// declared body have both arrived.
///
/// `capacity` is the size of the receive buffer. A request whose header
/// block or declared length cannot fit in it is [`HttpError::TooLarge`], so
/// the caller can answer right away instead of waiting for bytes that will
/// never fit.
pub fn complete_length(raw: &[u8], capacity: usize) -> Result<Option<usize>, HttpError> {
    let too_large = HttpError::TooLarge { capacity };

    let Some(end) = header_end(raw) else {
        return if raw.len() >= capacity {
            Err(too_large)
        } else {
            Ok(None)
        };
    };
    let head = core::str::from_utf8(&raw[..end]).map_err(|_| HttpError::Malformed)?;
    let total = end
        .checked_add(content_length(head))
        .filter(|total| *total <= capacity)
        .ok_or(too_large)?;

    Ok((raw.len() >= total).then_some(total))
}

/// Parse a request whose header block is complete.
pub fn parse_request(raw: &[u8]) -> Result<Request<'_>, HttpError> {
    let end = header_end(raw).ok_or(HttpError::Incomplete)?;
    let head = core::str::from_utf8(&raw[..end]).map_err(|_| HttpError::Malformed)?;
    let body = core::str::from_utf8(&raw[end..]).map_err(|_| HttpError::Malformed)?;

    let request_line = head.lines().next().ok_or(HttpError::Malformed)?;
    let mut parts = request_line.split_ascii_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::Malformed);
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed);
    }

    let method = match method {
        "GET" => Method::Get,
        "POST" => Method::Post,
        _ => return Err(HttpError::UnsupportedMethod),
    };
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    Ok(Request {
        method,
        path,
        query,
        body,
    })
}

/// Look up `key` in an `application/x-www-form-urlencoded` string.
///
/// Values are returned raw; the node's parameters never need decoding and
/// anything encoded fails validation as non-numeric anyway.
pub fn form_value<'f>(form: &'f str, key: &str) -> Option<&'f str> {
    form.split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value)
}

/// A complete response ready to be written to the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/plain", body)
    }

    /// Status line and headers, including the blank line.
    pub fn head(&self) -> HString<160> {
        let mut head = HString::new();
        let _ = write!(
            head,
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        );
        head
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        302 => "Found",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Build the GET request that delivers one reading.
pub fn reading_request(host: &str, path: &str, temperature: f32, humidity: f32) -> HString<256> {
    let mut request = HString::new();
    let _ = write!(
        request,
        "GET {}?temperature={:.2}&humidity={:.2} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, temperature, humidity, host
    );
    request
}

/// Extract the status code from the first line of a response.
pub fn parse_status_line(raw: &[u8]) -> Option<u16> {
    let line_end = raw.windows(2).position(|w| w == b"\r\n")?;
    let line = core::str::from_utf8(&raw[..line_end]).ok()?;
    let mut parts = line.split_ascii_whitespace();
    if !parts.next()?.starts_with("HTTP/1.") {
        return None;
    }
    parts.next()?.parse().ok()
}
