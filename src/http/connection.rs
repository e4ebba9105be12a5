use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::http::parser::{self, Sniff};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::server::Shared;
use crate::worker::ConnId;
use crate::worker::registry::Owner;

/// Outcome of one request/response exchange.
#[derive(Debug, PartialEq, Eq)]
pub enum Served {
    /// Connection is persistent; return it to the idle pool.
    KeepAlive,
    /// Connection is done; close it.
    Close,
}

#[derive(Debug)]
pub enum ConnError {
    /// Peer closed or reset the connection; never propagated further.
    PeerClosed,
    /// The timeout sweeper evicted this connection mid-wait.
    Evicted,
    Io(std::io::Error),
}

impl std::fmt::Display for ConnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnError::PeerClosed => write!(f, "peer closed connection"),
            ConnError::Evicted => write!(f, "evicted by timeout sweeper"),
            ConnError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for ConnError {}

/// One inbound connection and its per-request scratch state.
///
/// The raw request bytes accumulate in `buf`; all parse results are
/// carved out by offset so buffer growth between reads never invalidates
/// them. `reset` clears per-request state without touching bytes already
/// buffered for a pipelined next request.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnId,
    evict: Arc<Notify>,
    shared: Arc<Shared>,
    buf: BytesMut,
    /// High-water mark of the header-terminator scan.
    scanned: usize,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        id: ConnId,
        evict: Arc<Notify>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            stream,
            peer,
            id,
            evict,
            shared,
            buf: BytesMut::with_capacity(4096),
            scanned: 0,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Bytes already buffered beyond the last consumed request.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Waits for read-readiness without consuming anything. Used by the
    /// idle phase, before a fiber slot is attached.
    pub async fn readable(&self) -> std::io::Result<()> {
        self.stream.readable().await
    }

    /// Reads more bytes, suspending with timeout-chain membership armed.
    /// Returns `PeerClosed` on EOF and `Evicted` when the sweeper fires.
    async fn read_more(&mut self) -> Result<usize, ConnError> {
        self.shared.chain.arm(self.id, self.evict.clone()).await;
        let evict = self.evict.clone();
        let res = tokio::select! {
            r = self.stream.read_buf(&mut self.buf) => r.map_err(ConnError::Io),
            _ = evict.notified() => Err(ConnError::Evicted),
        };
        self.shared.chain.disarm(self.id).await;
        let n = res?;
        if n == 0 {
            return Err(ConnError::PeerClosed);
        }
        Ok(n)
    }

    async fn write_response(&mut self, writer: &mut ResponseWriter) -> Result<(), ConnError> {
        while !writer.done() {
            self.shared.chain.arm(self.id, self.evict.clone()).await;
            let evict = self.evict.clone();
            let res = tokio::select! {
                r = writer.write_step(&mut self.stream) => r.map_err(ConnError::Io),
                _ = evict.notified() => Err(ConnError::Evicted),
            };
            self.shared.chain.disarm(self.id).await;
            res?;
        }
        Ok(())
    }

    /// Answers a protocol violation and ends the exchange.
    async fn respond_error(&mut self, status: StatusCode) -> Result<Served, ConnError> {
        let mut writer = ResponseWriter::new(Response::status_only(status), false);
        self.write_response(&mut writer).await?;
        Ok(Served::Close)
    }

    /// Serves exactly one request/response exchange. The caller owns the
    /// idle/fiber-slot dance around this.
    pub async fn serve_one(&mut self) -> Result<Served, ConnError> {
        // AWAIT_MIN_BYTES / READ_METHOD_LINE
        let method = loop {
            match parser::sniff_method(&self.buf) {
                Sniff::Method(m) => break m,
                Sniff::NeedMore => {
                    self.read_more().await?;
                }
                Sniff::Unknown => {
                    tracing::debug!(peer = %self.peer, "Unrecognized method");
                    return self.respond_error(StatusCode::NotImplemented).await;
                }
            }
        };

        // AWAIT_HEADER_END
        let head_end = loop {
            if let Some(pos) = parser::find_header_end(&self.buf, self.scanned) {
                break pos;
            }
            self.scanned = self.buf.len();
            self.read_more().await?;
        };

        let head = match parser::parse_head(&self.buf[..head_end]) {
            Ok(head) => head,
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = ?e, "Malformed request head");
                return self.respond_error(StatusCode::BadRequest).await;
            }
        };
        let persistent = parser::is_persistent(
            &head.version,
            parser::header_value(&head.headers, "Connection"),
        );

        let body_start = head_end + 4;
        let content_len = if method.has_body() {
            // The interim response goes out before the body is awaited.
            if parser::wants_continue(&head.headers) {
                let interim = Response::interim_continue();
                if let Err(e) = self.stream.write_all(&interim).await {
                    return Err(ConnError::Io(e));
                }
            }
            // PARSE_CONTENT_LENGTH
            match parser::content_length(&head.headers) {
                Ok(Some(len)) => len,
                Ok(None) => {
                    return self.respond_error(StatusCode::LengthRequired).await;
                }
                // Hardened: present but non-numeric/overflowing.
                Err(_) => {
                    return self.respond_error(StatusCode::BadRequest).await;
                }
            }
        } else {
            // GET/HEAD: body absent by construction.
            0
        };

        // AWAIT_BODY
        while self.buf.len() < body_start + content_len {
            self.read_more().await?;
        }
        let body = Bytes::copy_from_slice(&self.buf[body_start..body_start + content_len]);

        // Consume this request; pipelined bytes for the next request
        // stay buffered, and scan state restarts for them.
        self.buf.advance(body_start + content_len);
        self.scanned = 0;

        // DISPATCH
        let (path, query) = parser::split_target(&head.target);
        let request = Request {
            method,
            path,
            query,
            version: head.version,
            headers: head.headers,
            body,
        };

        // User code runs with this fiber as the current execution
        // context, but the registry must not treat the connection as a
        // fiber/idle target while a nested suspension runs inside the
        // handler.
        self.shared
            .registry
            .set_owner(self.id, Owner::Dispatch)
            .await;
        let response = self.shared.handler.handle(&request).await;
        self.shared.registry.set_owner(self.id, Owner::Fiber).await;

        // RESPOND
        let mut writer = ResponseWriter::new(response, persistent);
        self.write_response(&mut writer).await?;

        if persistent {
            Ok(Served::KeepAlive)
        } else {
            Ok(Served::Close)
        }
    }
}
