use bytes::Bytes;
use std::collections::HashMap;

use crate::http::parser;

/// HTTP request methods understood by the engine.
///
/// The protocol engine recognizes exactly these four; any other verb is
/// answered with 501 Not Implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
}

impl Method {
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }

    /// GET and HEAD requests carry no body by construction.
    pub fn has_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

/// A parsed request handed to user request logic.
///
/// Path and query are carved out of the request target at dispatch time;
/// the path arrives already percent-decoded.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Request {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        parser::header_value(&self.headers, name)
    }

    pub fn content_len(&self) -> usize {
        self.body.len()
    }

    /// Whether the connection should stay open after the response.
    pub fn keep_alive(&self) -> bool {
        parser::is_persistent(&self.version, self.header("Connection"))
    }
}
