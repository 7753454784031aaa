//! Header block rendering.

use http::HeaderMap;

/// Render `name -> values` pairs as one `Name: v1, v2` line per header.
///
/// Values are joined with `", "`, every line ends with `\n`, and a header without values
/// renders as `Name: `.
///
/// ```rust
/// use http_body_logger::headers::format_header_lines;
///
/// let block = format_header_lines([("Accept", vec!["a", "b"]), ("X-Empty", vec![])]);
/// assert_eq!(block, "Accept: a, b\nX-Empty: \n");
/// ```
pub fn format_header_lines<I, N, V, S>(headers: I) -> String
where
    I: IntoIterator<Item = (N, V)>,
    N: AsRef<str>,
    V: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut block = String::new();
    for (name, values) in headers {
        block.push_str(name.as_ref());
        block.push_str(": ");
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                block.push_str(", ");
            }
            block.push_str(value.as_ref());
        }
        block.push('\n');
    }
    block
}

/// Render a [`HeaderMap`], one line per distinct header name.
///
/// All values of a repeated header end up on the same line. Values that are not valid UTF-8
/// are rendered lossily.
pub fn format_headers(headers: &HeaderMap) -> String {
    format_header_lines(headers.keys().map(|name| {
        let values = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()));
        (name.as_str(), values)
    }))
}
