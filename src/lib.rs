//! Filament - Embeddable HTTP server and client connection pool
//!
//! A single-worker, cooperatively scheduled HTTP/1.x engine. Inbound
//! connections are cheap while idle and only consume a fiber slot once
//! request bytes actually arrive; outbound connections are pooled and
//! reused by destination identity.

pub mod client;
pub mod config;
pub mod http;
pub mod server;
pub mod worker;
