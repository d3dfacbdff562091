//! Raw HTTP/1.1 engine
//!
//! Provides:
//! - Request description and manual serialization
//! - Close-framed response accumulation and parsing
//! - Chunked transfer decoding
//!
//! The engine bypasses any full HTTP stack on purpose: it has to run over an
//! arbitrary proxy-negotiated stream, so requests are written and responses
//! parsed byte by byte.

mod chunked;
pub(crate) mod exchange;

pub use chunked::decode_chunked;

use bytes::Bytes;
use thiserror::Error;

/// HTTP engine errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid request URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("request URL has no host: {0}")]
    MissingHost(String),

    #[error("malformed response: missing header terminator")]
    MalformedResponse,
}

/// A request description
///
/// The body is held fully in memory: `Content-Length` must be computed
/// before any bytes are written, and chunked request encoding is not
/// supported.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method, e.g. `GET`
    pub method: String,
    /// Absolute target URL (`http` or `https`)
    pub url: String,
    /// Caller headers, written in the given order
    pub headers: Vec<(String, String)>,
    /// Optional request body
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Create a request with the given method and URL
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Create a POST request with a body
    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let mut request = Self::new("POST", url);
        request.body = Some(body.into());
        request
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A parsed response
///
/// Headers keep insertion order and original casing; lookup is
/// case-insensitive.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code (200 when the status line did not parse)
    pub status: u16,
    /// Reason phrase, possibly empty
    pub reason: String,
    /// Headers in wire order
    pub headers: Vec<(String, String)>,
    /// Decoded body bytes
    pub body: Bytes,
}

impl Response {
    /// First header value matching `name`, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body interpreted as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
