//! Tunnel Fetch CLI
//!
//! Fetches a URL through a SOCKS5 proxy:
//! - Parses the proxy connection string
//! - Tunnels the request over the negotiated stream (TLS for https)
//! - Falls back to a direct connection when the proxy string is malformed

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use tracing::warn;
use tunnel_fetch::transport::TransportConfig;
use tunnel_fetch::{Config, ProxyEndpoint, Request, TunnelClient};

/// Fetch a URL through a SOCKS5 proxy
#[derive(Parser, Debug)]
#[command(name = "tfetch")]
#[command(about = "Fetch a URL through a SOCKS5 proxy")]
#[command(version)]
struct Args {
    /// Target URL (http or https)
    url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header, "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long)]
    data: Option<String>,

    /// SOCKS5 proxy connection string (overrides config)
    #[arg(short, long)]
    proxy: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Include response status line and headers in the output
    #[arg(short, long)]
    include: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };

    let transport = TransportConfig {
        connect_timeout: config.connect_timeout,
    };

    // Proxy selection policy: CLI flag wins over config; a malformed
    // connection string downgrades to a direct request instead of failing.
    let proxy_url = args.proxy.as_ref().or(config.proxy.as_ref());
    let client = match proxy_url {
        Some(url) => match ProxyEndpoint::parse(url) {
            Ok(endpoint) => TunnelClient::via_proxy(endpoint),
            Err(e) => {
                warn!("invalid proxy URL {:?}: {}; using direct connection", url, e);
                TunnelClient::direct()
            }
        },
        None => TunnelClient::direct(),
    };
    let client = client.with_transport(transport);

    let mut request = Request::new(args.method.to_uppercase(), args.url.as_str());
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("malformed header {:?}", header))?;
        request = request.header(name.trim(), value.trim());
    }
    if let Some(data) = args.data {
        request = request.body(data.into_bytes());
    }

    let response = client
        .execute(&request)
        .await
        .with_context(|| format!("{} {}", request.method, request.url))?;

    let mut stdout = std::io::stdout().lock();
    if args.include {
        writeln!(stdout, "HTTP/1.1 {} {}", response.status, response.reason)?;
        for (name, value) in &response.headers {
            writeln!(stdout, "{}: {}", name, value)?;
        }
        writeln!(stdout)?;
    }
    stdout.write_all(&response.body)?;

    Ok(())
}
