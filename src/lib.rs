//! # Tunnel Fetch
//!
//! An HTTP/1.1 client that tunnels requests through a SOCKS5 proxy by
//! speaking the proxy protocol directly over a raw TCP connection.
//!
//! ## Features
//!
//! - **SOCKS5 handshake** (RFC 1928/1929 subset: no-auth and
//!   username/password, domain-name addressing)
//! - **Raw HTTP/1.1 engine**: manual request serialization, close-framed
//!   response parsing, chunked-transfer decoding
//! - **TLS upgrade** of the established tunnel for https targets
//! - **Direct mode** using the same engine without a proxy
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   TunnelClient                       │
//! │        (one request/response per connection)         │
//! ├─────────────────────────────────────────────────────┤
//! │                  HTTP/1.1 Engine                     │
//! │   (serialization, response parsing, chunked bodies)  │
//! ├─────────────────────────────────────────────────────┤
//! │                  Optional TLS Layer                  │
//! │          (rustls, certificate verification)          │
//! ├─────────────────────────────────────────────────────┤
//! │                 SOCKS5 Handshake                     │
//! │      (greeting, auth subnegotiation, CONNECT)        │
//! ├─────────────────────────────────────────────────────┤
//! │                  Transport Layer                     │
//! │             (TCP, bounded connect timeout)           │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod http;
pub mod proxy;
pub mod transport;

pub use client::TunnelClient;
pub use config::Config;
pub use http::{Request, Response};
pub use proxy::ProxyEndpoint;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default SOCKS5 proxy port when the connection string omits one
pub const DEFAULT_PROXY_PORT: u16 = 1080;

/// Default `User-Agent` header value
pub const DEFAULT_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("HTTP error: {0}")]
    Http(#[from] http::HttpError),

    #[error("Configuration error: {0}")]
    Config(String),
}
