//! Data types for captured HTTP exchanges and the records emitted for them.

use axum::body::HttpBody;
use axum::extract::{OriginalUri, Request};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderName, Method, StatusCode, Version};
use std::fmt;

use crate::error::CaptureError;

/// Identifier attached to every emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    pub id: u32,
    pub name: &'static str,
}

impl EventId {
    /// Emitted once per inbound request.
    pub const REQUEST_INFO: EventId = EventId {
        id: 10000,
        name: "RequestInfo",
    };
    /// Emitted once per outbound response.
    pub const RESPONSE_INFO: EventId = EventId {
        id: 10001,
        name: "ResponseInfo",
    };
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// Request line information shared by request and response records.
///
/// # Examples
///
/// ```rust
/// use axum::body::Body;
/// use axum::http::Request;
/// use http_body_logger::types::ExchangeInfo;
///
/// let request = Request::post("https://api.example.com/users?page=2")
///     .body(Body::empty())
///     .unwrap();
/// let info = ExchangeInfo::from_request(&request, "http");
///
/// assert_eq!(info.scheme, "https");
/// assert_eq!(info.host, "api.example.com");
/// assert_eq!(info.path, "/users");
/// assert_eq!(info.query, "?page=2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeInfo {
    /// HTTP protocol version
    pub protocol: Version,
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// `http`/`https`, from the URI when absolute, otherwise the configured default
    pub scheme: String,
    /// Authority from the URI, falling back to the `Host` header
    pub host: String,
    /// Prefix stripped by an enclosing nested router, empty when not nested
    pub path_base: String,
    /// Request path as seen by this layer
    pub path: String,
    /// Query string including the leading `?`, or empty
    pub query: String,
}

impl ExchangeInfo {
    pub fn from_request(request: &Request, default_scheme: &str) -> Self {
        let uri = request.uri();
        let path = uri.path().to_owned();

        let host = uri
            .authority()
            .map(|authority| authority.as_str().to_owned())
            .or_else(|| header_str(request.headers(), HOST).map(str::to_owned))
            .unwrap_or_default();

        let path_base = request
            .extensions()
            .get::<OriginalUri>()
            .and_then(|original| original.path().strip_suffix(path.as_str()).map(str::to_owned))
            .unwrap_or_default();

        Self {
            protocol: request.version(),
            method: request.method().clone(),
            scheme: uri.scheme_str().unwrap_or(default_scheme).to_owned(),
            host,
            path_base,
            path,
            query: uri.query().map(|q| format!("?{q}")).unwrap_or_default(),
        }
    }

    /// `HTTP/1.1`, `HTTP/2.0`, ...
    pub fn protocol_name(&self) -> String {
        format!("{:?}", self.protocol)
    }
}

/// What ended up in the `Content` section of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// The decoded body
    Text(String),
    /// Body was empty, or its content type is not on the allow-list
    Unsupported { content_type: Option<String> },
    /// Streaming exchange (gRPC over HTTP/2, server-sent events); the body was never touched
    Streaming { content_type: Option<String> },
    /// Body could not be read; it was still forwarded as-is
    Unreadable { error: String },
    /// Body exceeded the capture limit; it was still forwarded in full
    TooLarge { limit: usize },
}

impl Captured {
    /// Turn the outcome of a capture into log content.
    pub(crate) fn from_capture(
        result: Result<String, CaptureError>,
        content_type: Option<String>,
    ) -> Self {
        match result {
            Ok(text) if text.is_empty() => Captured::Unsupported { content_type },
            Ok(text) => Captured::Text(text),
            Err(CaptureError::LimitExceeded { limit }) => Captured::TooLarge { limit },
            Err(e) => Captured::Unreadable {
                error: e.to_string(),
            },
        }
    }
}

impl fmt::Display for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Captured::Text(text) => f.write_str(text),
            Captured::Unsupported { content_type } => write!(
                f,
                "Content is empty or Content-Type ({}) is not supported for logging.",
                content_type.as_deref().unwrap_or_default()
            ),
            Captured::Streaming { content_type } => write!(
                f,
                "Content of streaming exchange ({}) is not captured.",
                content_type.as_deref().unwrap_or_default()
            ),
            Captured::Unreadable { error } => write!(f, "Content could not be read: {error}"),
            Captured::TooLarge { limit } => write!(
                f,
                "Content exceeds the capture limit of {limit} bytes and was not logged."
            ),
        }
    }
}

/// One log record: a request (no status) or a response.
///
/// [`Display`](fmt::Display) renders the human-readable message, e.g.
///
/// ```text
/// Request Information HTTP/1.1 POST http://localhost/echo?x=1 - application/json 7
/// Headers:
/// content-type: application/json
///
/// Content:
/// {"a":1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub exchange: ExchangeInfo,
    /// Response status; `None` for request records
    pub status: Option<StatusCode>,
    /// Content type of the logged message (request or response)
    pub content_type: Option<String>,
    /// Content length of the logged message, when known
    pub content_length: Option<u64>,
    /// Formatted header block, see [`format_headers`](crate::headers::format_headers)
    pub headers: String,
    pub content: Captured,
}

impl LogRecord {
    pub fn is_response(&self) -> bool {
        self.status.is_some()
    }

    pub fn event_id(&self) -> EventId {
        if self.is_response() {
            EventId::RESPONSE_INFO
        } else {
            EventId::REQUEST_INFO
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exchange = &self.exchange;
        let content_type = self.content_type.as_deref().unwrap_or_default();
        let content_length = self
            .content_length
            .map(|length| length.to_string())
            .unwrap_or_default();

        write!(
            f,
            "{} Information {} {} {}://{}{}{}{} - ",
            if self.is_response() { "Response" } else { "Request" },
            exchange.protocol_name(),
            exchange.method,
            exchange.scheme,
            exchange.host,
            exchange.path_base,
            exchange.path,
            exchange.query,
        )?;
        match self.status {
            Some(status) => write!(f, "{} {content_length} {content_type}", status.as_u16())?,
            None => write!(f, "{content_type} {content_length}")?,
        }
        write!(
            f,
            "\nHeaders:\n{}\nContent:\n{}",
            self.headers, self.content
        )
    }
}

/// A header value as `&str`, `None` when missing or not visible ASCII.
pub fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// `Content-Length` header, falling back to an exact size hint from the body.
pub(crate) fn content_length<B: HttpBody>(headers: &HeaderMap, body: &B) -> Option<u64> {
    header_str(headers, CONTENT_LENGTH)
        .and_then(|value| value.trim().parse().ok())
        .or_else(|| body.size_hint().exact())
}

pub(crate) fn content_type(headers: &HeaderMap) -> Option<String> {
    header_str(headers, CONTENT_TYPE).map(str::to_owned)
}
