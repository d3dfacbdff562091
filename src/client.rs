//! One-shot HTTP client over a SOCKS5 tunnel
//!
//! Composes the pieces: resolve the target, open the transport, run the
//! SOCKS5 handshake, optionally upgrade to TLS, then perform a single
//! close-framed HTTP exchange. Every request opens a fresh connection and
//! carries no shared state, so concurrent requests are independent.

use crate::http::exchange::{exchange, parse_response, Target};
use crate::http::{Request, Response};
use crate::proxy::{ProxyEndpoint, Socks5Client};
use crate::transport::{self, TransportConfig};
use crate::Result;
use tracing::debug;

/// HTTP client that routes each request through a SOCKS5 proxy, or directly
/// when none is configured.
#[derive(Debug, Clone, Default)]
pub struct TunnelClient {
    proxy: Option<ProxyEndpoint>,
    transport: TransportConfig,
}

impl TunnelClient {
    /// Client that connects to targets directly
    pub fn direct() -> Self {
        Self::default()
    }

    /// Client that tunnels every request through `proxy`
    pub fn via_proxy(proxy: ProxyEndpoint) -> Self {
        Self {
            proxy: Some(proxy),
            transport: TransportConfig::default(),
        }
    }

    /// Override the transport configuration
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// The configured proxy endpoint, if any
    pub fn proxy(&self) -> Option<&ProxyEndpoint> {
        self.proxy.as_ref()
    }

    /// Perform one request/response cycle.
    ///
    /// The connection is closed after the response: requests always declare
    /// `Connection: close` and the response is framed by stream closure.
    pub async fn execute(&self, request: &Request) -> Result<Response> {
        let target = Target::resolve(&request.url)?;

        let stream = match &self.proxy {
            Some(proxy) => {
                debug!(
                    "tunneling {} {} via {}",
                    request.method, request.url, proxy
                );
                let stream =
                    transport::connect(&proxy.host, proxy.port, &self.transport).await?;
                let socks = match proxy.credentials() {
                    Some((user, pass)) => Socks5Client::with_auth(user, pass),
                    None => Socks5Client::new(),
                };
                socks.establish(stream, &target.host, target.port).await?
            }
            None => {
                debug!("direct {} {}", request.method, request.url);
                transport::connect(&target.host, target.port, &self.transport).await?
            }
        };

        let raw = if target.tls {
            exchange_tls(stream, request, &target).await?
        } else {
            let mut stream = stream;
            exchange(&mut stream, request, &target).await?
        };

        let response = parse_response(&raw)?;
        debug!(
            "{} {} -> {} ({} body bytes)",
            request.method,
            request.url,
            response.status,
            response.body.len()
        );
        Ok(response)
    }
}

/// Upgrade the tunnel to TLS and run the exchange over it.
#[cfg(feature = "tls")]
async fn exchange_tls(
    stream: tokio::net::TcpStream,
    request: &Request,
    target: &Target,
) -> Result<bytes::Bytes> {
    let mut tls_stream = transport::tls::upgrade(stream, &target.host).await?;
    Ok(exchange(&mut tls_stream, request, target).await?)
}

#[cfg(not(feature = "tls"))]
async fn exchange_tls(
    _stream: tokio::net::TcpStream,
    _request: &Request,
    _target: &Target,
) -> Result<bytes::Bytes> {
    Err(crate::Error::Config(
        "https target requires the `tls` feature".to_string(),
    ))
}
