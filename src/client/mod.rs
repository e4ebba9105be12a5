//! Outbound HTTP client with pooled, reusable connections.
//!
//! Connections are cached by destination identity (address, port,
//! hostname) and handed back for reuse only after a clean, delimited
//! exchange; anything in an indeterminate protocol state is closed.

pub mod connection;
pub mod pool;
pub mod tls;

pub use connection::{ClientConnection, ClientResponse, ClientStream};
pub use pool::{ClientKey, ClientPool};
