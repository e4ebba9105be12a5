use crate::http::request::Method;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// Smallest buffer that can hold a viable request line:
/// method(3) + space(1) + URI(1).
pub const MIN_REQUEST_BYTES: usize = 5;

#[derive(Debug)]
pub enum ParseError {
    InvalidRequest,
    InvalidHeader,
    InvalidContentLength,
}

/// Outcome of sniffing the first bytes of a buffered request.
#[derive(Debug, PartialEq, Eq)]
pub enum Sniff {
    /// One of the supported method literals matched.
    Method(Method),
    /// Enough bytes buffered, no literal matched.
    Unknown,
    /// Fewer bytes than the minimum viable request line.
    NeedMore,
}

/// Compares the buffered prefix against the supported method literals
/// (trailing space included, as on the wire).
pub fn sniff_method(buf: &[u8]) -> Sniff {
    for (literal, method) in [
        (&b"GET "[..], Method::Get),
        (&b"HEAD "[..], Method::Head),
        (&b"POST "[..], Method::Post),
        (&b"PUT "[..], Method::Put),
    ] {
        if buf.len() >= literal.len() {
            if buf.starts_with(literal) {
                return Sniff::Method(method);
            }
        } else if literal.starts_with(buf) {
            // Could still become this method once more bytes arrive.
            return Sniff::NeedMore;
        }
    }
    if buf.len() < MIN_REQUEST_BYTES {
        Sniff::NeedMore
    } else {
        Sniff::Unknown
    }
}

/// Finds the header terminator, scanning no earlier than `from` so
/// repeated calls on a growing buffer never rescan consumed ground.
/// Returns the offset of the `\r\n\r\n` sequence.
pub fn find_header_end(buf: &[u8], from: usize) -> Option<usize> {
    // Back up 3 bytes in case the terminator straddles the last append.
    let start = from.saturating_sub(3);
    buf[start..]
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| start + pos)
}

/// Parsed request line and headers, body not included.
#[derive(Debug)]
pub struct Head {
    pub method: Method,
    pub target: String,
    pub version: String,
    pub headers: HashMap<String, String>,
}

/// Parses the request head (`head` excludes the `\r\n\r\n` terminator).
pub fn parse_head(head: &[u8]) -> Result<Head, ParseError> {
    let text = std::str::from_utf8(head).map_err(|_| ParseError::InvalidRequest)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();
    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    // The version suffix is optional (HTTP/0.9-style simple requests).
    let version = parts.next().unwrap_or("HTTP/1.0");

    let method = Method::from_token(method_str).ok_or(ParseError::InvalidRequest)?;

    let headers = parse_header_lines(lines)?;

    Ok(Head {
        method,
        target: target.to_string(),
        version: version.to_string(),
        headers,
    })
}

/// Parses `Name: value` lines into a map. Shared by the server request
/// parser and the client response parser.
pub fn parse_header_lines<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, String>, ParseError> {
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(headers)
}

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Hardened Content-Length parse: must be present, numeric, and fit in
/// usize. `Ok(None)` means the header is absent (411 territory for the
/// server), `Err` means it is present but malformed.
pub fn content_length(headers: &HashMap<String, String>) -> Result<Option<usize>, ParseError> {
    match header_value(headers, "Content-Length") {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or(ParseError::InvalidContentLength),
    }
}

/// Keep-alive decision table.
///
/// HTTP/1.1 requests are persistent unless `Connection: close`;
/// HTTP/1.0 requests are persistent only with `Connection: Keep-Alive`.
/// The opt-out/opt-in asymmetry is deliberate and load-bearing.
pub fn is_persistent(version: &str, connection: Option<&str>) -> bool {
    if version == "HTTP/1.1" {
        !matches!(connection, Some(v) if v.eq_ignore_ascii_case("close"))
    } else {
        matches!(connection, Some(v) if v.eq_ignore_ascii_case("keep-alive"))
    }
}

/// True when the request asked for a `100 Continue` interim response.
pub fn wants_continue(headers: &HashMap<String, String>) -> bool {
    matches!(header_value(headers, "Expect"), Some(v) if v.trim().starts_with("100"))
}

/// Splits a request target into decoded path and raw query string.
///
/// The target is split at the first `?`; an absolute-URI form
/// (`http://host/path`) is normalized by discarding scheme and
/// authority; the path is percent-decoded.
pub fn split_target(target: &str) -> (String, Option<String>) {
    let (raw_path, query) = match target.split_once('?') {
        Some((p, q)) => (p, Some(q.to_string())),
        None => (target, None),
    };
    let raw_path = match raw_path.strip_prefix("http://") {
        Some(rest) => match rest.find('/') {
            Some(slash) => &rest[slash..],
            None => "/",
        },
        None => raw_path,
    };
    let path = percent_decode_str(raw_path)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw_path.to_string());
    (path, query)
}

/// Parses a response status line (`HTTP/1.x 200 OK`), returning the
/// version and numeric status code.
pub fn parse_status_line(line: &str) -> Result<(String, u16), ParseError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;
    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }
    let code = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or(ParseError::InvalidRequest)?;
    Ok((version.to_string(), code))
}
