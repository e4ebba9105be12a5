//! Listen socket construction.
//!
//! Built through `socket2` because tokio's listener exposes neither the
//! backlog nor the linger option.

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

const LISTEN_BACKLOG: i32 = 32768;

/// Binds the listen socket: `SO_REUSEADDR`, non-blocking, close-on-exec
/// (socket2 default), large fixed backlog. Setup errors here are fatal;
/// the worker does not start serving without a listener.
pub fn bind(listen_addr: &str) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid listen address: {}", listen_addr))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .context("failed to create listen socket")?;
    socket
        .set_reuse_address(true)
        .context("setsockopt SO_REUSEADDR")?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("failed to bind {}", addr))?;
    socket
        .listen(LISTEN_BACKLOG)
        .context("failed to listen")?;

    let listener = TcpListener::from_std(socket.into())?;
    tracing::info!(addr = %addr, backlog = LISTEN_BACKLOG, "Listening");
    Ok(listener)
}

/// Per-accepted-socket options: `TCP_NODELAY` on, `SO_LINGER` disabled.
pub fn prepare_stream(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    socket2::SockRef::from(stream).set_linger(None)?;
    Ok(())
}
