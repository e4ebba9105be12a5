use filament::http::parser::{
    self, MIN_REQUEST_BYTES, ParseError, Sniff, content_length, find_header_end, header_value,
    is_persistent, parse_head, parse_status_line, sniff_method, split_target, wants_continue,
};
use filament::http::request::Method;

#[test]
fn test_sniff_supported_methods() {
    assert_eq!(sniff_method(b"GET / HTTP/1.1"), Sniff::Method(Method::Get));
    assert_eq!(sniff_method(b"HEAD / HTTP/1.1"), Sniff::Method(Method::Head));
    assert_eq!(sniff_method(b"POST /api HTTP/1.1"), Sniff::Method(Method::Post));
    assert_eq!(sniff_method(b"PUT /api HTTP/1.1"), Sniff::Method(Method::Put));
}

#[test]
fn test_sniff_waits_below_minimum_bytes() {
    assert!(MIN_REQUEST_BYTES > b"GE".len());
    assert_eq!(sniff_method(b""), Sniff::NeedMore);
    assert_eq!(sniff_method(b"GE"), Sniff::NeedMore);
    assert_eq!(sniff_method(b"HEA"), Sniff::NeedMore);
}

#[test]
fn test_sniff_rejects_unknown_verb_after_minimum() {
    assert_eq!(sniff_method(b"DELETE / HTTP/1.1"), Sniff::Unknown);
    assert_eq!(sniff_method(b"BREW /"), Sniff::Unknown);
}

#[test]
fn test_find_header_end_resumes_at_offset() {
    let partial = b"GET / HTTP/1.1\r\nHost: a\r\n";
    assert_eq!(find_header_end(partial, 0), None);

    let full = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n";
    // Resuming from the previous high-water mark still finds a
    // terminator straddling the append boundary.
    assert_eq!(find_header_end(full, partial.len()), Some(full.len() - 4));
    assert_eq!(find_header_end(full, 0), Some(full.len() - 4));
}

#[test]
fn test_parse_head_simple_get() {
    let head = parse_head(b"GET /path HTTP/1.1\r\nHost: example.com\r\nAccept: */*").unwrap();
    assert_eq!(head.method, Method::Get);
    assert_eq!(head.target, "/path");
    assert_eq!(head.version, "HTTP/1.1");
    assert_eq!(header_value(&head.headers, "Host"), Some("example.com"));
    assert_eq!(header_value(&head.headers, "accept"), Some("*/*"));
}

#[test]
fn test_parse_head_version_defaults_to_1_0() {
    let head = parse_head(b"GET /").unwrap();
    assert_eq!(head.version, "HTTP/1.0");
}

#[test]
fn test_content_length_lookup_is_case_insensitive() {
    let head = parse_head(b"POST / HTTP/1.1\r\ncontent-LENGTH: 42").unwrap();
    assert_eq!(content_length(&head.headers).unwrap(), Some(42));
}

#[test]
fn test_content_length_absent() {
    let head = parse_head(b"POST / HTTP/1.1\r\nHost: x").unwrap();
    assert_eq!(content_length(&head.headers).unwrap(), None);
}

#[test]
fn test_content_length_hardening() {
    let head = parse_head(b"POST / HTTP/1.1\r\nContent-Length: banana").unwrap();
    assert!(matches!(
        content_length(&head.headers),
        Err(ParseError::InvalidContentLength)
    ));

    let head = parse_head(b"POST / HTTP/1.1\r\nContent-Length: -5").unwrap();
    assert!(content_length(&head.headers).is_err());

    let head = parse_head(b"POST / HTTP/1.1\r\nContent-Length: 99999999999999999999999").unwrap();
    assert!(content_length(&head.headers).is_err());
}

#[test]
fn test_persistence_decision_table() {
    // HTTP/1.1: opt-out.
    assert!(is_persistent("HTTP/1.1", None));
    assert!(!is_persistent("HTTP/1.1", Some("close")));
    assert!(!is_persistent("HTTP/1.1", Some("CLOSE")));
    assert!(is_persistent("HTTP/1.1", Some("keep-alive")));
    // HTTP/1.0: opt-in.
    assert!(!is_persistent("HTTP/1.0", None));
    assert!(is_persistent("HTTP/1.0", Some("Keep-Alive")));
    assert!(is_persistent("HTTP/1.0", Some("keep-alive")));
    assert!(!is_persistent("HTTP/1.0", Some("close")));
}

#[test]
fn test_expect_100_continue_detection() {
    let head = parse_head(b"POST / HTTP/1.1\r\nExpect: 100-continue").unwrap();
    assert!(wants_continue(&head.headers));

    let head = parse_head(b"POST / HTTP/1.1\r\nHost: x").unwrap();
    assert!(!wants_continue(&head.headers));
}

#[test]
fn test_split_target_query() {
    let (path, query) = split_target("/search?q=rust&x=1");
    assert_eq!(path, "/search");
    assert_eq!(query.as_deref(), Some("q=rust&x=1"));

    let (path, query) = split_target("/plain");
    assert_eq!(path, "/plain");
    assert_eq!(query, None);
}

#[test]
fn test_split_target_absolute_uri() {
    let (path, _) = split_target("http://example.com/over/there?name=ferret");
    assert_eq!(path, "/over/there");

    let (path, _) = split_target("http://example.com");
    assert_eq!(path, "/");
}

#[test]
fn test_split_target_percent_decoding() {
    let (path, query) = split_target("/a%20b/c%2Fd?q=%41");
    assert_eq!(path, "/a b/c/d");
    // The query string is left raw.
    assert_eq!(query.as_deref(), Some("q=%41"));
}

#[test]
fn test_parse_status_line() {
    let (version, code) = parse_status_line("HTTP/1.1 200 OK").unwrap();
    assert_eq!(version, "HTTP/1.1");
    assert_eq!(code, 200);

    let (_, code) = parse_status_line("HTTP/1.0 404 Not Found").unwrap();
    assert_eq!(code, 404);

    assert!(parse_status_line("garbage").is_err());
    assert!(parse_status_line("HTTP/1.1 abc OK").is_err());
}

#[test]
fn test_parse_head_rejects_malformed_header() {
    assert!(matches!(
        parser::parse_head(b"GET / HTTP/1.1\r\nno-colon-here"),
        Err(ParseError::InvalidHeader)
    ));
}
