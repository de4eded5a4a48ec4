//! Byte-stream transports: plain TCP or TLS.
//!
//! Sessions never open sockets themselves; they ask a [`TransportFactory`]
//! for a stream. Tests hand in `tokio::io::duplex` halves instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::error::{IrcError, Result};

/// Anything the session can read lines from and write lines to.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type Transport = Box<dyn AsyncStream>;

/// Opens a fresh connection for each session.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self) -> Result<Transport>;

    /// Human-readable address for logs.
    fn describe(&self) -> String;
}

/// Connects to `host:port`, optionally wrapping the socket in TLS.
pub struct TcpConnector {
    host: String,
    port: u16,
    tls: Option<TlsConnector>,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, ssl: bool, timeout: Duration) -> Result<Self> {
        let tls = if ssl { Some(tls_connector()?) } else { None };
        Ok(Self {
            host: host.into(),
            port,
            tls,
            timeout,
        })
    }

    async fn open(&self) -> Result<Transport> {
        // Validate the name before touching the network.
        let server_name = match &self.tls {
            Some(_) => Some(
                ServerName::try_from(self.host.clone())
                    .map_err(|_| IrcError::InvalidServerName(self.host.clone()))?,
            ),
            None => None,
        };

        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;

        match (&self.tls, server_name) {
            (Some(tls), Some(name)) => {
                let stream = tls.connect(name, stream).await?;
                debug!(addr = %self.describe(), "TLS handshake complete");
                Ok(Box::new(stream))
            }
            _ => Ok(Box::new(stream)),
        }
    }
}

#[async_trait]
impl TransportFactory for TcpConnector {
    async fn connect(&self) -> Result<Transport> {
        info!(addr = %self.describe(), tls = self.tls.is_some(), "Connecting");
        match tokio::time::timeout(self.timeout, self.open()).await {
            Ok(result) => result,
            Err(_) => Err(IrcError::ConnectTimeout {
                addr: self.describe(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// rustls client config trusting the bundled web PKI roots.
fn tls_connector() -> Result<TlsConnector> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_tcp_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"PING :x\r\n").await.unwrap();
        });

        let connector = TcpConnector::new("127.0.0.1", port, false, Duration::from_secs(5)).unwrap();
        assert_eq!(connector.describe(), format!("127.0.0.1:{port}"));

        let mut transport = connector.connect().await.unwrap();
        let mut buf = vec![0u8; 9];
        transport.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING :x\r\n");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = TcpConnector::new("127.0.0.1", port, false, Duration::from_secs(5)).unwrap();
        assert!(matches!(connector.connect().await, Err(IrcError::Io(_))));
    }

    #[tokio::test]
    async fn test_invalid_tls_name_rejected_before_connect() {
        let connector = TcpConnector::new("not a hostname", 6697, true, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            connector.connect().await,
            Err(IrcError::InvalidServerName(_))
        ));
    }
}
