//! Client-side SOCKS5 handshake (RFC 1928, RFC 1929 subset)
//!
//! Drives the three-phase negotiation (method selection, optional
//! username/password subnegotiation, CONNECT) over an already-connected
//! stream and yields the same stream back once it is a transparent tunnel.

use super::ProxyError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// SOCKS5 version
const SOCKS_VERSION: u8 = 0x05;

/// Username/password subnegotiation version (RFC 1929)
const AUTH_VERSION: u8 = 0x01;

/// CONNECT command
const CMD_CONNECT: u8 = 0x01;

/// Reserved byte
const RESERVED: u8 = 0x00;

/// Authentication methods offered to the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMethod {
    NoAuth = 0x00,
    UsernamePassword = 0x02,
}

/// Address types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressType {
    Ipv4 = 0x01,
    Domain = 0x03,
    Ipv6 = 0x04,
}

impl TryFrom<u8> for AddressType {
    type Error = ProxyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(AddressType::Ipv4),
            0x03 => Ok(AddressType::Domain),
            0x04 => Ok(AddressType::Ipv6),
            _ => Err(ProxyError::UnsupportedAddressType(value)),
        }
    }
}

/// Handshake phases
///
/// Transitions are driven solely by bytes received from the proxy. The
/// terminal success state is `Established`; any protocol violation drops the
/// stream instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Greeting sent, awaiting method selection
    Greeting,
    /// Username/password subnegotiation sent, awaiting its reply
    Authenticating,
    /// CONNECT sent, awaiting the proxy's reply
    Connecting,
    /// Tunnel ready; every subsequent byte is application data
    Established,
}

/// SOCKS5 handshake engine
///
/// One instance per tunnel attempt. Credentials are offered only when the
/// proxy selects the username/password method.
pub struct Socks5Client {
    credentials: Option<(String, String)>,
}

impl Socks5Client {
    /// Create an engine that offers no credentials
    pub fn new() -> Self {
        Self { credentials: None }
    }

    /// Create an engine with username/password credentials
    pub fn with_auth(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((username.into(), password.into())),
        }
    }

    /// Perform the handshake for `host:port` over `stream`.
    ///
    /// On success the stream is returned unmodified in `Established` state:
    /// from that point it carries the tunneled protocol's own bytes. On any
    /// error the stream is dropped, which closes it.
    ///
    /// Each phase reads through `read_exact`, so replies split across
    /// arbitrary transport fragments are reassembled before they are acted
    /// on, and no bytes past the current message are consumed.
    pub async fn establish<S>(&self, mut stream: S, host: &str, port: u16) -> Result<S, ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if host.len() > 255 {
            return Err(ProxyError::HostTooLong(host.len()));
        }

        let mut state = HandshakeState::Greeting;
        loop {
            state = match state {
                HandshakeState::Greeting => {
                    // Offer no-auth and username/password
                    stream
                        .write_all(&[
                            SOCKS_VERSION,
                            2,
                            AuthMethod::NoAuth as u8,
                            AuthMethod::UsernamePassword as u8,
                        ])
                        .await?;

                    let mut reply = [0u8; 2];
                    stream.read_exact(&mut reply).await?;

                    if reply[0] != SOCKS_VERSION {
                        return Err(ProxyError::VersionMismatch(reply[0]));
                    }

                    match reply[1] {
                        m if m == AuthMethod::NoAuth as u8 => {
                            trace!("proxy selected no-auth");
                            self.send_connect(&mut stream, host, port).await?;
                            HandshakeState::Connecting
                        }
                        m if m == AuthMethod::UsernamePassword as u8 => {
                            let (user, pass) = self
                                .credentials
                                .as_ref()
                                .ok_or(ProxyError::AuthenticationRequired)?;
                            self.send_auth(&mut stream, user, pass).await?;
                            HandshakeState::Authenticating
                        }
                        other => return Err(ProxyError::NoAcceptableAuthMethod(other)),
                    }
                }

                HandshakeState::Authenticating => {
                    let mut reply = [0u8; 2];
                    stream.read_exact(&mut reply).await?;

                    if reply[1] != 0x00 {
                        return Err(ProxyError::AuthenticationFailed);
                    }

                    trace!("proxy accepted credentials");
                    self.send_connect(&mut stream, host, port).await?;
                    HandshakeState::Connecting
                }

                HandshakeState::Connecting => {
                    self.read_connect_reply(&mut stream).await?;
                    HandshakeState::Established
                }

                HandshakeState::Established => {
                    debug!("SOCKS5 tunnel to {}:{} established", host, port);
                    return Ok(stream);
                }
            };
        }
    }

    /// Write the username/password subnegotiation message
    /// `[0x01, ulen, user..., plen, pass...]`.
    async fn send_auth<S>(&self, stream: &mut S, user: &str, pass: &str) -> Result<(), ProxyError>
    where
        S: AsyncWrite + Unpin + Send,
    {
        // Length fields are single bytes
        if user.len() > 255 {
            return Err(ProxyError::CredentialsTooLong(user.len()));
        }
        if pass.len() > 255 {
            return Err(ProxyError::CredentialsTooLong(pass.len()));
        }

        let mut msg = Vec::with_capacity(3 + user.len() + pass.len());
        msg.push(AUTH_VERSION);
        msg.push(user.len() as u8);
        msg.extend_from_slice(user.as_bytes());
        msg.push(pass.len() as u8);
        msg.extend_from_slice(pass.as_bytes());

        stream.write_all(&msg).await?;
        Ok(())
    }

    /// Write the CONNECT request, always with the domain-name address type
    /// (no address-family branching on the client side).
    async fn send_connect<S>(&self, stream: &mut S, host: &str, port: u16) -> Result<(), ProxyError>
    where
        S: AsyncWrite + Unpin + Send,
    {
        let mut msg = Vec::with_capacity(7 + host.len());
        msg.push(SOCKS_VERSION);
        msg.push(CMD_CONNECT);
        msg.push(RESERVED);
        msg.push(AddressType::Domain as u8);
        msg.push(host.len() as u8);
        msg.extend_from_slice(host.as_bytes());
        msg.extend_from_slice(&port.to_be_bytes());

        stream.write_all(&msg).await?;
        Ok(())
    }

    /// Read and validate the CONNECT reply, consuming the variable-length
    /// bound address so no tunnel bytes are left in the reply.
    async fn read_connect_reply<S>(&self, stream: &mut S) -> Result<(), ProxyError>
    where
        S: AsyncRead + Unpin + Send,
    {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;

        if header[0] != SOCKS_VERSION {
            return Err(ProxyError::VersionMismatch(header[0]));
        }
        if header[1] != 0x00 {
            return Err(ProxyError::ConnectFailed(header[1]));
        }
        // header[2] is reserved

        match AddressType::try_from(header[3])? {
            AddressType::Ipv4 => {
                let mut addr = [0u8; 4 + 2];
                stream.read_exact(&mut addr).await?;
            }
            AddressType::Ipv6 => {
                let mut addr = [0u8; 16 + 2];
                stream.read_exact(&mut addr).await?;
            }
            AddressType::Domain => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await?;
                let mut addr = vec![0u8; len[0] as usize + 2];
                stream.read_exact(&mut addr).await?;
            }
        }

        Ok(())
    }
}

impl Default for Socks5Client {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    /// Drive a scripted proxy on the far end of a duplex pipe: read
    /// `expect.len()` bytes, assert them, write `reply`, repeat.
    async fn scripted_proxy(
        mut far: tokio::io::DuplexStream,
        script: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> tokio::io::DuplexStream {
        for (expect, reply) in script {
            let mut buf = vec![0u8; expect.len()];
            far.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, expect, "unexpected client message");
            far.write_all(&reply).await.unwrap();
        }
        far
    }

    fn connect_msg(host: &str, port: u16) -> Vec<u8> {
        let mut msg = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
        msg.extend_from_slice(host.as_bytes());
        msg.extend_from_slice(&port.to_be_bytes());
        msg
    }

    #[tokio::test]
    async fn no_auth_path() {
        let (near, far) = duplex(1024);
        let proxy = tokio::spawn(scripted_proxy(
            far,
            vec![
                (vec![0x05, 0x02, 0x00, 0x02], vec![0x05, 0x00]),
                (
                    connect_msg("example.com", 80),
                    vec![0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0],
                ),
            ],
        ));

        let client = Socks5Client::new();
        client.establish(near, "example.com", 80).await.unwrap();
        proxy.await.unwrap();
    }

    #[tokio::test]
    async fn auth_path_sends_exact_subnegotiation() {
        let (near, far) = duplex(1024);
        let proxy = tokio::spawn(scripted_proxy(
            far,
            vec![
                (vec![0x05, 0x02, 0x00, 0x02], vec![0x05, 0x02]),
                (
                    vec![0x01, 2, b'a', b'b', 3, b'x', b'y', b'z'],
                    vec![0x01, 0x00],
                ),
                (
                    connect_msg("example.com", 443),
                    vec![0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0],
                ),
            ],
        ));

        let client = Socks5Client::with_auth("ab", "xyz");
        client.establish(near, "example.com", 443).await.unwrap();
        proxy.await.unwrap();
    }

    #[tokio::test]
    async fn auth_required_but_no_credentials() {
        let (near, mut far) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 4];
            far.read_exact(&mut buf).await.unwrap();
            far.write_all(&[0x05, 0x02]).await.unwrap();
        });

        let err = Socks5Client::new()
            .establish(near, "example.com", 80)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn auth_rejected() {
        let (near, mut far) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 4];
            far.read_exact(&mut buf).await.unwrap();
            far.write_all(&[0x05, 0x02]).await.unwrap();
            let mut auth = [0u8; 6];
            far.read_exact(&mut auth).await.unwrap();
            far.write_all(&[0x01, 0x01]).await.unwrap();
        });

        let err = Socks5Client::with_auth("u", "pw")
            .establish(near, "example.com", 80)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn version_mismatch() {
        let (near, mut far) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 4];
            far.read_exact(&mut buf).await.unwrap();
            far.write_all(&[0x04, 0x00]).await.unwrap();
        });

        let err = Socks5Client::new()
            .establish(near, "example.com", 80)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::VersionMismatch(0x04)));
    }

    #[tokio::test]
    async fn no_acceptable_method() {
        let (near, mut far) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 4];
            far.read_exact(&mut buf).await.unwrap();
            far.write_all(&[0x05, 0xFF]).await.unwrap();
        });

        let err = Socks5Client::new()
            .establish(near, "example.com", 80)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::NoAcceptableAuthMethod(0xFF)));
    }

    #[tokio::test]
    async fn connect_refused_surfaces_reply_code() {
        let (near, mut far) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 4];
            far.read_exact(&mut buf).await.unwrap();
            far.write_all(&[0x05, 0x00]).await.unwrap();
            let mut req = vec![0u8; connect_msg("example.com", 80).len()];
            far.read_exact(&mut req).await.unwrap();
            far.write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();
        });

        let err = Socks5Client::new()
            .establish(near, "example.com", 80)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::ConnectFailed(0x05)));
    }

    #[tokio::test]
    async fn fragmented_replies_are_reassembled() {
        let (near, mut far) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 4];
            far.read_exact(&mut buf).await.unwrap();
            // Method selection split across two writes
            far.write_all(&[0x05]).await.unwrap();
            tokio::task::yield_now().await;
            far.write_all(&[0x00]).await.unwrap();

            let mut req = vec![0u8; connect_msg("example.com", 80).len()];
            far.read_exact(&mut req).await.unwrap();
            // CONNECT reply delivered byte by byte
            for b in [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0] {
                far.write_all(&[b]).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        Socks5Client::new()
            .establish(near, "example.com", 80)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn domain_bound_address_is_consumed() {
        let (near, mut far) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 4];
            far.read_exact(&mut buf).await.unwrap();
            far.write_all(&[0x05, 0x00]).await.unwrap();
            let mut req = vec![0u8; connect_msg("example.com", 80).len()];
            far.read_exact(&mut req).await.unwrap();

            let mut reply = vec![0x05, 0x00, 0x00, 0x03, 4];
            reply.extend_from_slice(b"gate");
            reply.extend_from_slice(&80u16.to_be_bytes());
            // First tunnel byte, directly behind the reply
            reply.push(b'!');
            far.write_all(&reply).await.unwrap();
        });

        let mut stream = Socks5Client::new()
            .establish(near, "example.com", 80)
            .await
            .unwrap();

        // The bound address must be fully consumed, leaving the tunnel byte
        let mut first = [0u8; 1];
        stream.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"!");
    }

    #[tokio::test]
    async fn oversized_host_fails_before_any_write() {
        let (near, _far) = duplex(64);
        let host = "h".repeat(256);
        let err = Socks5Client::new()
            .establish(near, &host, 80)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::HostTooLong(256)));
    }

    #[tokio::test]
    async fn oversized_credentials_fail() {
        let (near, mut far) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 4];
            far.read_exact(&mut buf).await.unwrap();
            far.write_all(&[0x05, 0x02]).await.unwrap();
        });

        let err = Socks5Client::with_auth("u".repeat(300), "p")
            .establish(near, "example.com", 80)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::CredentialsTooLong(300)));
    }
}
