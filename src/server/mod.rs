//! HTTP server engine: accept loop, lazy fiber attach, timeout sweeper.
//!
//! Accepted connections start idle: registered, timeout-chain armed, and
//! holding no fiber slot. Only when request bytes actually arrive is a
//! slot checked out of the fiber pool and the request state machine run.
//! Fibers are a scarcer resource than idle sockets, so none is consumed
//! until real data exists.

pub mod files;
pub mod listener;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use crate::config::ServerConfig;
use crate::http::connection::{ConnError, Connection, Served};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::worker::ConnId;
use crate::worker::fiber::FiberPool;
use crate::worker::registry::{ConnectionRegistry, Owner};
use crate::worker::timeout::TimeoutChain;

/// User request logic. Runs with the connection's fiber as the current
/// execution context; nested suspensions (e.g. outbound client calls)
/// are fine.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: &Request) -> Response;
}

/// State shared by the accept loop, connection tasks, and the sweeper.
pub struct Shared {
    pub registry: ConnectionRegistry,
    pub chain: TimeoutChain,
    pub fibers: FiberPool,
    pub handler: Arc<dyn Handler>,
}

pub struct HttpServer {
    listener: TcpListener,
    request_timeout: Duration,
    sweep_interval: Duration,
    shared: Arc<Shared>,
}

impl HttpServer {
    /// Binds the listen socket and sizes the fiber pool. Setup errors
    /// are fatal here, before any connection is accepted.
    pub fn bind(cfg: &ServerConfig, handler: Arc<dyn Handler>) -> anyhow::Result<Self> {
        let listener = listener::bind(&cfg.listen_addr)?;
        let shared = Arc::new(Shared {
            registry: ConnectionRegistry::new(),
            chain: TimeoutChain::new(),
            fibers: FiberPool::new(cfg.max_fibers),
            handler,
        });
        Ok(Self {
            listener,
            request_timeout: cfg.request_timeout(),
            sweep_interval: cfg.sweep_interval(),
            shared,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    /// Runs the sweeper and the accept loop forever.
    pub async fn run(self) -> anyhow::Result<()> {
        let _sweeper = {
            let shared = self.shared.clone();
            let timeout = self.request_timeout;
            let interval = self.sweep_interval;
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                loop {
                    tick.tick().await;
                    let evicted = shared.chain.sweep(timeout).await;
                    if evicted > 0 {
                        tracing::debug!(evicted, "Timeout sweep");
                    }
                }
            })
        };

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                // Transient accept failures are swallowed; the loop
                // retries on the next readiness.
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    continue;
                }
            };
            if let Err(e) = listener::prepare_stream(&stream) {
                tracing::warn!(peer = %peer, error = %e, "Socket option setup failed");
                continue;
            }
            tracing::debug!(peer = %peer, "Accepted connection");

            let shared = self.shared.clone();
            tokio::spawn(async move {
                serve_connection(shared, stream, peer).await;
            });
        }
    }
}

/// Deregisters a connection when its task ends. Runs on every exit
/// path, including unwinds out of panicking handler code, so the
/// registry and timeout chain never retain a closed connection.
struct ConnGuard {
    shared: Arc<Shared>,
    id: ConnId,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        let shared = self.shared.clone();
        let id = self.id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                shared.chain.disarm(id).await;
                shared.registry.remove(id).await;
            });
        }
    }
}

/// Drives one connection through idle wait, lazy fiber attach, request
/// processing, and return-to-idle, until it closes or is evicted.
async fn serve_connection(shared: Arc<Shared>, stream: TcpStream, peer: SocketAddr) {
    let id = shared.registry.register().await;
    // A connection is deregistered exactly when it closes.
    let _guard = ConnGuard {
        shared: shared.clone(),
        id,
    };
    let evict = Arc::new(Notify::new());
    let mut conn = Connection::new(stream, peer, id, evict.clone(), shared.clone());

    loop {
        // Idle phase: no fiber slot held, evictable by the sweeper.
        shared.registry.set_owner(id, Owner::Idle).await;
        if conn.buffered() == 0 {
            shared.chain.arm(id, evict.clone()).await;
            let ready = tokio::select! {
                r = conn.readable() => r.is_ok(),
                _ = evict.notified() => false,
            };
            shared.chain.disarm(id).await;
            if !ready {
                tracing::debug!(peer = %peer, "Closing idle connection");
                break;
            }
        }

        // Lazy attach: request bytes exist, check a fiber out. On pool
        // exhaustion the connection keeps waiting as idle, still
        // evictable.
        let _slot = match shared.fibers.try_checkout() {
            Some(slot) => slot,
            None => {
                tracing::debug!(peer = %peer, "Fiber pool exhausted, waiting");
                shared.chain.arm(id, evict.clone()).await;
                let slot = tokio::select! {
                    slot = shared.fibers.checkout() => Some(slot),
                    _ = evict.notified() => None,
                };
                shared.chain.disarm(id).await;
                match slot {
                    Some(slot) => slot,
                    None => break,
                }
            }
        };
        shared.registry.set_owner(id, Owner::Fiber).await;

        match conn.serve_one().await {
            Ok(Served::KeepAlive) => continue,
            Ok(Served::Close) => break,
            Err(ConnError::PeerClosed) | Err(ConnError::Evicted) => break,
            Err(ConnError::Io(e)) => {
                tracing::debug!(peer = %peer, error = %e, "Connection error");
                break;
            }
        }
    }
}
