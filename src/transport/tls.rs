//! TLS upgrade for https targets
//!
//! Wraps an established tunnel in TLS 1.2/1.3 with the webpki root store.
//! Certificate verification is mandatory; the server name used for
//! verification is the target host, not the proxy.

use super::TransportError;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{client::TlsStream, TlsConnector};
use tracing::debug;

fn client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let root_store = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };

            let mut config = ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();
            config.alpn_protocols = vec![b"http/1.1".to_vec()];

            Arc::new(config)
        })
        .clone()
}

/// Upgrade an established stream to TLS, verifying the certificate against
/// `server_name`. The returned stream presents the same read/write contract.
pub async fn upgrade<S>(stream: S, server_name: &str) -> Result<TlsStream<S>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let connector = TlsConnector::from(client_config());

    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| TransportError::Tls(format!("invalid server name: {}", e)))?;

    let tls_stream = connector
        .connect(name, stream)
        .await
        .map_err(|e| TransportError::Tls(e.to_string()))?;

    debug!("TLS established with {}", server_name);
    Ok(tls_stream)
}
