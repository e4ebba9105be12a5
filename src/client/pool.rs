use anyhow::Context;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use url::Url;

use crate::client::connection::{ClientConnection, ClientResponse, ClientStream};
use crate::client::tls;
use crate::config::ClientConfig;
use crate::worker::ConnId;
use crate::worker::timeout::TimeoutChain;

/// Destination identity for connection reuse. Two connections are
/// interchangeable iff their keys are equal and neither is mid-request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub addr: IpAddr,
    pub port: u16,
    pub hostname: String,
}

impl ClientKey {
    pub fn new(addr: IpAddr, port: u16, hostname: &str) -> Self {
        Self {
            addr,
            port,
            hostname: hostname.to_string(),
        }
    }
}

struct IdleConn {
    id: ConnId,
    stream: ClientStream,
}

/// Keyed cache of outbound HTTP connections.
///
/// Persistent connections sit in a separately timed chain from the
/// server's idle connections; they are evicted or reused by request
/// rather than by periodic sweep.
pub struct ClientPool {
    cfg: ClientConfig,
    tls: Option<TlsConnector>,
    idle: Mutex<HashMap<ClientKey, VecDeque<IdleConn>>>,
    chain: TimeoutChain,
    next_id: AtomicU64,
    opened: AtomicUsize,
}

impl ClientPool {
    pub fn new(cfg: ClientConfig) -> anyhow::Result<Self> {
        let tls = tls::build_connector(&cfg)?;
        Ok(Self {
            cfg,
            tls,
            idle: Mutex::new(HashMap::new()),
            chain: TimeoutChain::new(),
            next_id: AtomicU64::new(0),
            opened: AtomicUsize::new(0),
        })
    }

    /// Total sockets ever opened by this pool. A reuse hit does not
    /// increment it.
    pub fn connections_opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.values().map(VecDeque::len).sum()
    }

    /// Acquires a connection for the destination: a fresh pooled match
    /// when persistence is enabled, otherwise a new non-blocking connect
    /// with an inline TLS handshake when configured.
    pub async fn acquire(
        &self,
        addr: IpAddr,
        port: u16,
        hostname: &str,
    ) -> anyhow::Result<ClientConnection> {
        let key = ClientKey::new(addr, port, hostname);

        if self.cfg.persistent {
            let mut idle = self.idle.lock().await;
            while let Some(entry) = idle.get_mut(&key).and_then(VecDeque::pop_front) {
                if self
                    .chain
                    .take_if_fresh(entry.id, self.cfg.idle_timeout())
                    .await
                {
                    tracing::debug!(host = %key.hostname, port, "Reusing pooled connection");
                    return Ok(ClientConnection::new(entry.stream, key, true, true));
                }
                // Stale; dropping the entry closes the socket.
                tracing::debug!(host = %key.hostname, port, "Dropping stale pooled connection");
            }
        }

        let tcp = TcpStream::connect(SocketAddr::new(addr, port))
            .await
            .with_context(|| format!("failed to connect to {}:{}", addr, port))?;
        tcp.set_nodelay(true)?;
        self.opened.fetch_add(1, Ordering::Relaxed);

        let stream = match &self.tls {
            Some(connector) => {
                let name = ServerName::try_from(hostname.to_string())
                    .with_context(|| format!("invalid TLS hostname: {}", hostname))?;
                let tls_stream = connector
                    .connect(name, tcp)
                    .await
                    .context("TLS handshake failed")?;
                ClientStream::Tls(Box::new(tls_stream))
            }
            None => ClientStream::Plain(tcp),
        };

        Ok(ClientConnection::new(
            stream,
            key,
            self.cfg.persistent,
            false,
        ))
    }

    /// Hands a connection back. Only a reusable connection (clean,
    /// delimited exchange with keep-alive advertised) re-enters the
    /// pool; everything else is closed by drop. Ephemeral pools close
    /// unconditionally.
    pub async fn release(&self, conn: ClientConnection) {
        if !self.cfg.persistent || !conn.reusable() {
            return;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (stream, key) = conn.into_stream();
        self.chain.arm(id, Arc::new(Notify::new())).await;
        self.idle
            .lock()
            .await
            .entry(key)
            .or_default()
            .push_back(IdleConn { id, stream });
    }

    // ---- convenience entry points ----

    /// One-call GET: acquire, send, parse, release.
    pub async fn get(
        &self,
        addr: IpAddr,
        port: u16,
        hostname: &str,
        path: &str,
        extra_headers: &[(&str, &str)],
    ) -> anyhow::Result<ClientResponse> {
        let mut conn = self.acquire(addr, port, hostname).await?;
        conn.build_get(path, extra_headers);
        conn.send_request().await?;
        let response = conn.read_response().await?;
        self.release(conn).await;
        Ok(response)
    }

    /// One-call POST with a buffered body.
    pub async fn post(
        &self,
        addr: IpAddr,
        port: u16,
        hostname: &str,
        path: &str,
        content_type: &str,
        body: &[u8],
        extra_headers: &[(&str, &str)],
    ) -> anyhow::Result<ClientResponse> {
        let mut conn = self.acquire(addr, port, hostname).await?;
        conn.build_post(path, content_type, body, extra_headers);
        conn.send_request().await?;
        let response = conn.read_response().await?;
        self.release(conn).await;
        Ok(response)
    }

    /// GET by URL, resolving the host first.
    pub async fn get_url(
        &self,
        url: &Url,
        extra_headers: &[(&str, &str)],
    ) -> anyhow::Result<ClientResponse> {
        let host = url.host_str().context("URL missing host")?;
        let port = url.port_or_known_default().context("URL missing port")?;
        let addr = resolve(host, port).await?;
        let path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        self.get(addr, port, host, &path, extra_headers).await
    }

    /// Streams a response body straight into `target`, optionally
    /// gzip-decompressing. Returns bytes written.
    pub async fn fetch_to_file(
        &self,
        addr: IpAddr,
        port: u16,
        hostname: &str,
        path: &str,
        target: &mut tokio::fs::File,
        decompress: bool,
    ) -> anyhow::Result<u64> {
        let mut conn = self.acquire(addr, port, hostname).await?;
        conn.build_get(path, &[]);
        conn.send_request().await?;
        let written = conn.read_response_to_file(target, decompress).await?;
        self.release(conn).await;
        Ok(written)
    }
}

async fn resolve(host: &str, port: u16) -> anyhow::Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("failed to resolve {}", host))?
        .next()
        .map(|sa| sa.ip())
        .with_context(|| format!("no addresses for {}", host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_by_destination_identity() {
        let a = ClientKey::new("127.0.0.1".parse().unwrap(), 80, "example.com");
        let b = ClientKey::new("127.0.0.1".parse().unwrap(), 80, "example.com");
        let c = ClientKey::new("127.0.0.1".parse().unwrap(), 80, "other.example.com");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
