use anyhow::{Context, bail};
use bytes::{Buf, Bytes, BytesMut};
use flate2::write::GzDecoder;
use std::collections::HashMap;
use std::io::Write;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;

use crate::client::pool::ClientKey;
use crate::http::parser;

/// Outbound socket, plain or TLS-wrapped.
pub enum ClientStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ClientStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ClientStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ClientStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ClientStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A parsed client-side response.
#[derive(Debug)]
pub struct ClientResponse {
    pub status: u16,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl ClientResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        parser::header_value(&self.headers, name)
    }
}

/// One outbound connection and its request/response scratch state.
///
/// Request bytes are built up with the typed appenders, flushed with
/// `send_request`, and the response parsed out of `response`. The
/// response buffer is reset when a pooled connection is reused, so no
/// stale offsets survive into the next exchange.
pub struct ClientConnection {
    stream: ClientStream,
    key: ClientKey,
    pool_persistent: bool,
    reused: bool,
    request: Vec<u8>,
    response: BytesMut,
    scanned: usize,
    status: u16,
    content_length: Option<u64>,
    head: Option<(String, HashMap<String, String>)>,
    reusable: bool,
}

impl ClientConnection {
    pub(crate) fn new(
        stream: ClientStream,
        key: ClientKey,
        pool_persistent: bool,
        reused: bool,
    ) -> Self {
        Self {
            stream,
            key,
            pool_persistent,
            reused,
            request: Vec::with_capacity(512),
            response: BytesMut::with_capacity(4096),
            scanned: 0,
            status: 0,
            content_length: None,
            head: None,
            reusable: false,
        }
    }

    pub fn key(&self) -> &ClientKey {
        &self.key
    }

    /// True when this connection came out of the persistent pool rather
    /// than a fresh connect.
    pub fn was_reused(&self) -> bool {
        self.reused
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Eligible for return to the persistent pool: clean exchange,
    /// delimited body, keep-alive advertised by the server.
    pub fn reusable(&self) -> bool {
        self.reusable
    }

    pub(crate) fn into_stream(self) -> (ClientStream, ClientKey) {
        (self.stream, self.key)
    }

    // ---- request construction ----

    fn request_line(&mut self, method: &str, path: &str) {
        self.request.extend_from_slice(method.as_bytes());
        self.request.push(b' ');
        self.request
            .extend_from_slice(if path.is_empty() { "/" } else { path }.as_bytes());
        self.request.extend_from_slice(b" HTTP/1.1\r\n");
    }

    fn header(&mut self, name: &str, value: &str) {
        self.request.extend_from_slice(name.as_bytes());
        self.request.extend_from_slice(b": ");
        self.request.extend_from_slice(value.as_bytes());
        self.request.extend_from_slice(b"\r\n");
    }

    fn common_headers(&mut self, extra: &[(&str, &str)]) {
        let host = self.key.hostname.clone();
        self.header("Host", &host);
        self.header(
            "Connection",
            if self.pool_persistent { "Keep-Alive" } else { "close" },
        );
        for (name, value) in extra {
            self.header(name, value);
        }
    }

    /// Builds a GET request into the request buffer.
    pub fn build_get(&mut self, path: &str, extra: &[(&str, &str)]) {
        self.request.clear();
        self.request_line("GET", path);
        self.common_headers(extra);
        self.request.extend_from_slice(b"\r\n");
    }

    /// Builds a POST request with a buffered body.
    pub fn build_post(&mut self, path: &str, content_type: &str, body: &[u8], extra: &[(&str, &str)]) {
        self.begin_post(path, content_type, body.len() as u64, extra);
        self.request.extend_from_slice(body);
    }

    /// Builds POST headers only; the body is streamed afterwards with
    /// `send_body`, so large bodies never need one buffered copy.
    pub fn begin_post(&mut self, path: &str, content_type: &str, content_length: u64, extra: &[(&str, &str)]) {
        self.request.clear();
        self.request_line("POST", path);
        self.common_headers(extra);
        self.header("Content-Type", content_type);
        self.header("Content-Length", &content_length.to_string());
        self.request.extend_from_slice(b"\r\n");
    }

    // ---- i/o ----

    /// Flushes the request buffer, resuming across partial writes.
    pub async fn send_request(&mut self) -> anyhow::Result<()> {
        let request = std::mem::take(&mut self.request);
        self.stream
            .write_all(&request)
            .await
            .context("failed to send request")?;
        Ok(())
    }

    /// Streams one body chunk after `begin_post`.
    pub async fn send_body(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        self.stream
            .write_all(chunk)
            .await
            .context("failed to send request body")?;
        Ok(())
    }

    async fn fill(&mut self) -> anyhow::Result<usize> {
        Ok(self.stream.read_buf(&mut self.response).await?)
    }

    /// Reads and parses the response head; returns the body start
    /// offset. Fails on premature close or a malformed status line, in
    /// which case the connection must not be pooled again.
    async fn read_head(&mut self) -> anyhow::Result<usize> {
        self.response.clear();
        self.scanned = 0;
        self.status = 0;
        self.content_length = None;
        self.head = None;
        self.reusable = false;

        let head_end = loop {
            if let Some(pos) = parser::find_header_end(&self.response, self.scanned) {
                break pos;
            }
            self.scanned = self.response.len();
            if self.fill().await? == 0 {
                bail!("connection closed before complete response head");
            }
        };

        let text = std::str::from_utf8(&self.response[..head_end])
            .context("invalid UTF-8 in response head")?;
        let mut lines = text.split("\r\n");
        let status_line = lines.next().context("empty response head")?;
        let (version, status) = match parser::parse_status_line(status_line) {
            Ok(parsed) => parsed,
            Err(_) => bail!("malformed status line: {}", status_line),
        };
        let headers =
            parser::parse_header_lines(lines).map_err(|e| anyhow::anyhow!("bad header: {:?}", e))?;

        self.status = status;
        self.content_length = match parser::header_value(&headers, "Content-Length") {
            Some(v) => Some(
                v.trim()
                    .parse::<u64>()
                    .context("malformed Content-Length in response")?,
            ),
            None => None,
        };
        // Reuse requires a delimited body and keep-alive from both ends.
        self.reusable = self.pool_persistent
            && self.content_length.is_some()
            && parser::is_persistent(&version, parser::header_value(&headers, "Connection"));

        self.head = Some((version, headers));
        Ok(head_end + 4)
    }

    /// Reads the full response: status, headers, body delimited by
    /// `Content-Length` or by connection close when absent.
    pub async fn read_response(&mut self) -> anyhow::Result<ClientResponse> {
        let body_start = self.read_head().await?;

        match self.content_length {
            Some(len) => {
                let total = body_start + usize::try_from(len).context("response body too large")?;
                while self.response.len() < total {
                    if self.fill().await? == 0 {
                        self.reusable = false;
                        bail!("connection closed mid-response");
                    }
                }
            }
            None => {
                // EOF-delimited body; by definition not reusable.
                while self.fill().await? > 0 {}
                self.content_length = Some((self.response.len() - body_start) as u64);
            }
        }

        let (version, headers) = self
            .head
            .take()
            .context("response head missing")?;
        self.response.advance(body_start);
        let len = self.content_length.unwrap_or(0) as usize;
        let body = self.response.split_to(len).freeze();

        Ok(ClientResponse {
            status: self.status,
            version,
            headers,
            body,
        })
    }

    /// Streams the response body into `target` instead of buffering it,
    /// optionally gzip-decompressing. Returns bytes written.
    pub async fn read_response_to_file(
        &mut self,
        target: &mut tokio::fs::File,
        decompress: bool,
    ) -> anyhow::Result<u64> {
        let body_start = self.read_head().await?;
        self.head = None;
        self.response.advance(body_start);

        let mut remaining = self.content_length;
        let mut written: u64 = 0;
        let mut decoder = decompress.then(|| GzDecoder::new(Vec::new()));

        loop {
            // A delimited body already fully consumed (including the
            // zero-length case) must not wait on a socket the server
            // keeps open for the next exchange.
            if remaining == Some(0) {
                break;
            }
            if !self.response.is_empty() {
                let take = match remaining {
                    Some(n) => self.response.len().min(usize::try_from(n).unwrap_or(usize::MAX)),
                    None => self.response.len(),
                };
                let chunk = self.response.split_to(take);
                match &mut decoder {
                    Some(dec) => {
                        dec.write_all(&chunk)
                            .context("gzip decompression failed")?;
                        let out = dec.get_mut();
                        target.write_all(out).await?;
                        written += out.len() as u64;
                        out.clear();
                    }
                    None => {
                        target.write_all(&chunk).await?;
                        written += chunk.len() as u64;
                    }
                }
                if let Some(n) = &mut remaining {
                    *n -= take as u64;
                    if *n == 0 {
                        break;
                    }
                }
            }
            if self.fill().await? == 0 {
                match remaining {
                    // Delimited body truncated by the peer.
                    Some(n) if n > 0 => {
                        self.reusable = false;
                        bail!("connection closed mid-response");
                    }
                    _ => break,
                }
            }
        }

        if let Some(dec) = decoder {
            let rest = dec.finish().context("gzip stream truncated")?;
            target.write_all(&rest).await?;
            written += rest.len() as u64;
        }
        target.flush().await?;

        if self.content_length.is_none() {
            self.reusable = false;
        }
        Ok(written)
    }
}
