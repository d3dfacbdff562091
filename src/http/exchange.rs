//! Request serialization, response parsing and the write-then-drain exchange
//!
//! Requests always declare `Connection: close`: the response is framed by
//! stream closure, so the whole body is accumulated before parsing starts.

use super::chunked::decode_chunked;
use super::{HttpError, Request, Response};
use crate::proxy::strip_brackets;
use crate::DEFAULT_USER_AGENT;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};
use url::Url;

/// A resolved request target
#[derive(Debug, Clone)]
pub(crate) struct Target {
    /// Whether the scheme requires a TLS upgrade
    pub tls: bool,
    /// Host for the tunnel CONNECT and certificate verification, brackets
    /// stripped from IPv6 literals
    pub host: String,
    /// `Host` header form, brackets kept for IPv6 literals
    pub host_header: String,
    /// Explicit port, or the scheme default (443/80)
    pub port: u16,
    /// Path plus query for the request line
    pub path_and_query: String,
}

impl Target {
    /// Resolve an absolute `http`/`https` URL into a request target.
    pub(crate) fn resolve(input: &str) -> Result<Self, HttpError> {
        let url = Url::parse(input).map_err(|source| HttpError::InvalidUrl {
            url: input.to_string(),
            source,
        })?;

        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(HttpError::UnsupportedScheme(other.to_string())),
        };

        let raw_host = url
            .host_str()
            .ok_or_else(|| HttpError::MissingHost(input.to_string()))?;
        let default_port = if tls { 443 } else { 80 };
        let port = url.port().unwrap_or(default_port);

        let host_header = if port == default_port {
            raw_host.to_string()
        } else {
            format!("{}:{}", raw_host, port)
        };

        let mut path_and_query = url.path().to_string();
        if let Some(query) = url.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        Ok(Self {
            tls,
            host: strip_brackets(raw_host).to_string(),
            host_header,
            port,
            path_and_query,
        })
    }
}

/// Serialize the request head (request line and headers) for `target`.
///
/// `Host` and `Connection` are always engine-controlled; caller-supplied
/// copies are dropped. `Content-Length` and `User-Agent` are synthesized
/// after the caller's headers when missing.
pub(crate) fn serialize_head(request: &Request, target: &Target) -> Vec<u8> {
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
        request.method, target.path_and_query, target.host_header
    );

    let mut has_content_length = false;
    let mut has_user_agent = false;

    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("connection") {
            continue;
        }
        if name.eq_ignore_ascii_case("content-length") {
            has_content_length = true;
        }
        if name.eq_ignore_ascii_case("user-agent") {
            has_user_agent = true;
        }
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }

    if let Some(body) = &request.body {
        if !has_content_length {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
    }
    if !has_user_agent {
        head.push_str(&format!("User-Agent: {}\r\n", DEFAULT_USER_AGENT));
    }

    head.push_str("\r\n");
    head.into_bytes()
}

/// Write the request onto the stream and accumulate the response until the
/// peer closes it.
pub(crate) async fn exchange<S>(stream: &mut S, request: &Request, target: &Target) -> Result<Bytes, HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let head = serialize_head(request, target);
    stream.write_all(&head).await?;
    if let Some(body) = &request.body {
        stream.write_all(body).await?;
    }
    stream.flush().await?;

    let mut raw = BytesMut::with_capacity(8 * 1024);
    let mut buf = [0u8; 8 * 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }

    trace!("response complete, {} bytes", raw.len());
    Ok(raw.freeze())
}

/// Parse an accumulated response into status, headers and body.
///
/// The header/body split point is the first `\r\n\r\n`; its absence after
/// the stream fully closed is a hard parse error.
pub(crate) fn parse_response(raw: &[u8]) -> Result<Response, HttpError> {
    let split = find_header_end(raw).ok_or(HttpError::MalformedResponse)?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let raw_body = &raw[split + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or("");
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next().unwrap_or("");
    let status = match parts.next().and_then(|s| s.parse::<u16>().ok()) {
        Some(code) => code,
        None => {
            warn!("unparseable status line {:?}, defaulting to 200", status_line);
            200
        }
    };
    let reason = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let chunked = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("transfer-encoding"))
        .map(|(_, v)| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);

    let body = if chunked {
        Bytes::from(decode_chunked(raw_body))
    } else {
        Bytes::copy_from_slice(raw_body)
    };

    Ok(Response {
        status,
        reason,
        headers,
        body,
    })
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}
