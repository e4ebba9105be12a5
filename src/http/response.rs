use std::collections::HashMap;
use std::path::PathBuf;

/// Version token used on every emitted status line.
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Value of the `Server` header on every response.
pub const SERVER_NAME: &str = "filament/0.1";

/// HTTP status codes emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Continue,
    Ok,
    Created,
    NoContent,
    BadRequest,
    NotFound,
    LengthRequired,
    InternalServerError,
    NotImplemented,
    ServiceUnavailable,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::LengthRequired => 411,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::LengthRequired => "Length Required",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// Response payload: either buffered bytes or a file streamed after the
/// header flush.
#[derive(Debug)]
pub enum Body {
    Bytes(Vec<u8>),
    File { path: PathBuf, len: u64 },
}

impl Body {
    pub fn len(&self) -> u64 {
        match self {
            Body::Bytes(b) => b.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A response ready for serialization.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: String,
    /// Extra headers beyond the standard set.
    pub headers: HashMap<String, String>,
    pub body: Body,
}

/// Fluent response construction.
pub struct ResponseBuilder {
    status: StatusCode,
    content_type: String,
    headers: HashMap<String, String>,
    body: Body,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            headers: HashMap::new(),
            body: Body::Bytes(Vec::new()),
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes(body.into());
        self
    }

    pub fn file(mut self, path: PathBuf, len: u64) -> Self {
        self.body = Body::File { path, len };
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            content_type: self.content_type,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::Ok).body(body).build()
    }

    pub fn not_found() -> Self {
        ResponseBuilder::new(StatusCode::NotFound)
            .body(b"404 Not Found".to_vec())
            .build()
    }

    pub fn internal_error() -> Self {
        ResponseBuilder::new(StatusCode::InternalServerError)
            .body(b"500 Internal Server Error".to_vec())
            .build()
    }

    /// Bare status response used for protocol errors (411, 501, 400).
    pub fn status_only(status: StatusCode) -> Self {
        let text = format!("{} {}", status.as_u16(), status.reason_phrase());
        ResponseBuilder::new(status).body(text.into_bytes()).build()
    }

    /// Serializes the response head: status line, the standard
    /// `Server`/`Content-Type`/`Connection`/`Content-Length` headers,
    /// any extra headers, then the empty line. The payload stays in a
    /// separate buffer for the vectored write.
    pub fn serialize_head(&self, persistent: bool) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(
            format!(
                "{} {} {}\r\nServer: {}\r\nContent-Type: {}\r\nConnection: {}\r\nContent-Length: {}\r\n",
                HTTP_VERSION,
                self.status.as_u16(),
                self.status.reason_phrase(),
                SERVER_NAME,
                self.content_type,
                if persistent { "Keep-Alive" } else { "close" },
                self.body.len(),
            )
            .as_bytes(),
        );
        for (k, v) in &self.headers {
            buf.extend_from_slice(k.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(v.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// The interim response written before a body governed by
    /// `Expect: 100-continue` is awaited.
    pub fn interim_continue() -> Vec<u8> {
        format!(
            "{} {} {}\r\n\r\n",
            HTTP_VERSION,
            StatusCode::Continue.as_u16(),
            StatusCode::Continue.reason_phrase()
        )
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_carries_standard_headers() {
        let resp = Response::ok("hello");
        let head = String::from_utf8(resp.serialize_head(true)).unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Server: filament/0.1\r\n"));
        assert!(head.contains("Content-Type: text/plain\r\n"));
        assert!(head.contains("Connection: Keep-Alive\r\n"));
        assert!(head.contains("Content-Length: 5\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn close_advertised_when_not_persistent() {
        let resp = Response::status_only(StatusCode::NotImplemented);
        let head = String::from_utf8(resp.serialize_head(false)).unwrap();
        assert!(head.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
        assert!(head.contains("Connection: close\r\n"));
    }
}
