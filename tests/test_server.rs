//! End-to-end tests driving the server over loopback with raw sockets.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use filament::config::ServerConfig;
use filament::http::request::Request;
use filament::http::response::Response;
use filament::server::{Handler, HttpServer};

struct TestHandler;

#[async_trait]
impl Handler for TestHandler {
    async fn handle(&self, request: &Request) -> Response {
        match request.path.as_str() {
            "/hello" => Response::ok("hello"),
            "/echo" => Response::ok(request.body.to_vec()),
            "/len" => Response::ok(request.content_len().to_string()),
            "/query" => Response::ok(request.query.clone().unwrap_or_default()),
            "/panic" => panic!("handler exploded"),
            _ => Response::not_found(),
        }
    }
}

async fn start_server() -> std::net::SocketAddr {
    let cfg = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    };
    let server = HttpServer::bind(&cfg, Arc::new(TestHandler)).unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

/// Reads one response: head up to CRLFCRLF plus Content-Length body.
async fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let mut tmp = [0u8; 1024];
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "connection closed before response head");
        buf.extend_from_slice(&tmp[..n]);
    };
    let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
    let content_length: usize = head
        .lines()
        .find_map(|l| {
            let (k, v) = l.split_once(':')?;
            k.eq_ignore_ascii_case("content-length")
                .then(|| v.trim().parse().unwrap())
        })
        .expect("response missing Content-Length");

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let mut tmp = [0u8; 1024];
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "connection closed mid-body");
        body.extend_from_slice(&tmp[..n]);
    }
    body.truncate(content_length);
    (head, body)
}

#[tokio::test]
async fn test_get_hello() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.1\r\n\r\n")
        .await
        .unwrap();

    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains("Content-Length: 5"));
    assert!(head.contains("Server: filament/0.1"));
    assert_eq!(body, b"hello");
}

#[tokio::test]
async fn test_post_echo() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc")
        .await
        .unwrap();

    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, b"abc");
}

#[tokio::test]
async fn test_post_without_content_length_is_411() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"POST /x HTTP/1.1\r\n\r\n").await.unwrap();

    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 411 Length Required"));
    assert!(head.contains("Connection: close"));
}

#[tokio::test]
async fn test_unknown_method_is_501() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"BREW /pot HTTP/1.1\r\n\r\n").await.unwrap();

    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 501 Not Implemented"));
}

#[tokio::test]
async fn test_malformed_content_length_is_400() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: banana\r\n\r\n")
        .await
        .unwrap();

    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn test_persistent_connection_serves_multiple_requests() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Second request must see none of the first request's state.
    stream
        .write_all(b"GET /hello HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert!(head.contains("Connection: Keep-Alive"));
    assert_eq!(body, b"hello");

    stream
        .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\nxyz")
        .await
        .unwrap();
    let (_, body) = read_response(&mut stream).await;
    assert_eq!(body, b"xyz");

    stream
        .write_all(b"GET /query?a=1&b=2 HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let (_, body) = read_response(&mut stream).await;
    assert_eq!(body, b"a=1&b=2");
}

#[tokio::test]
async fn test_connection_close_honored() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let (head, body) = read_response(&mut stream).await;
    assert!(head.contains("Connection: close"));
    assert_eq!(body, b"hello");

    // Server closes after the response.
    let mut tmp = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut tmp))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_http_1_0_not_persistent_by_default() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.0\r\n\r\n")
        .await
        .unwrap();

    let (head, _) = read_response(&mut stream).await;
    assert!(head.contains("Connection: close"));
}

#[tokio::test]
async fn test_get_content_len_is_zero() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET /len HTTP/1.1\r\n\r\n").await.unwrap();

    let (_, body) = read_response(&mut stream).await;
    assert_eq!(body, b"0");
}

#[tokio::test]
async fn test_expect_100_continue() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 2\r\nExpect: 100-continue\r\n\r\n")
        .await
        .unwrap();

    // The interim response arrives before the body is sent.
    let mut interim = vec![0u8; b"HTTP/1.1 100 Continue\r\n\r\n".len()];
    stream.read_exact(&mut interim).await.unwrap();
    assert_eq!(interim, b"HTTP/1.1 100 Continue\r\n\r\n");

    stream.write_all(b"ok").await.unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_handler_panic_deregisters_connection() {
    let cfg = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    };
    let server = HttpServer::bind(&cfg, Arc::new(TestHandler)).unwrap();
    let addr = server.local_addr().unwrap();
    let shared = server.shared();
    tokio::spawn(server.run());

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /panic HTTP/1.1\r\n\r\n")
        .await
        .unwrap();

    // The connection task unwinds and the socket closes.
    let mut tmp = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut tmp))
        .await
        .expect("connection not closed after handler panic")
        .unwrap();
    assert_eq!(n, 0);

    // Deregistration still ran; the registry must not retain the
    // closed connection.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(shared.registry.is_empty().await);

    // The worker keeps serving other connections.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, b"hello");
}

#[tokio::test]
async fn test_request_split_across_writes() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"GE").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write_all(b"T /hel").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write_all(b"lo HTTP/1.1\r\n\r\n").await.unwrap();

    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, b"hello");
}
