//! Content-type decisions: which bodies are decoded, which exchanges are streams.

use http::{HeaderMap, Version};

/// Non-`text/*` media types whose bodies are decoded for logging.
const LOGGABLE_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/x-www-form-urlencoded",
];

/// The `type/subtype` essence of a `Content-Type` value, lowercased, parameters dropped.
///
/// Returns `None` when the value is not a well-formed media type.
///
/// ```rust
/// use http_body_logger::content_type::essence;
///
/// assert_eq!(essence("Application/JSON; charset=utf-8").as_deref(), Some("application/json"));
/// assert_eq!(essence("garbage"), None);
/// ```
pub fn essence(content_type: &str) -> Option<String> {
    let media_type = content_type.split(';').next()?.trim();
    let (ty, subtype) = media_type.split_once('/')?;
    let (ty, subtype) = (ty.trim(), subtype.trim());
    if ty.is_empty() || subtype.is_empty() {
        return None;
    }
    Some(format!(
        "{}/{}",
        ty.to_ascii_lowercase(),
        subtype.to_ascii_lowercase()
    ))
}

/// Whether a body with this content type should be decoded and logged.
///
/// Matches `text/*`, `application/json`, `application/xml` and
/// `application/x-www-form-urlencoded` on the media type itself, so parameters such as
/// `charset=text/plain` on an unrelated type never match.
pub fn is_loggable(content_type: Option<&str>) -> bool {
    content_type.and_then(essence).is_some_and(|essence| {
        essence.starts_with("text/") || LOGGABLE_TYPES.contains(&essence.as_str())
    })
}

/// `application/grpc` and its `+proto`/`+json` flavours. gRPC-Web is not a stream.
pub fn is_grpc(content_type: Option<&str>) -> bool {
    content_type
        .and_then(essence)
        .is_some_and(|essence| essence == "application/grpc" || essence.starts_with("application/grpc+"))
}

pub fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type
        .and_then(essence)
        .is_some_and(|essence| essence == "text/event-stream")
}

/// gRPC carried over HTTP/2: the body is a long-lived stream of messages, not one payload.
pub fn is_grpc_request(version: Version, headers: &HeaderMap) -> bool {
    version == Version::HTTP_2 && is_grpc(crate::types::header_str(headers, http::header::CONTENT_TYPE))
}
