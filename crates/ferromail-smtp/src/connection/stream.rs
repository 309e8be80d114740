//! Plain and encrypted transport streams.

use std::io;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

use crate::error::{Error, Result};

/// Byte stream to the server, in the clear or under TLS.
#[derive(Debug)]
pub enum SmtpStream {
    /// Cleartext TCP.
    Tcp(TcpStream),
    /// Client-side TLS over TCP.
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl SmtpStream {
    /// Reads whatever bytes the server has sent.
    ///
    /// Returns 0 at end of stream. Framing is left to the caller; SMTP
    /// replies can arrive split or coalesced arbitrarily.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying read fails.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Tcp(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        Ok(n)
    }

    /// Writes the whole buffer and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying write or flush fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Self::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    /// Wraps the connection in TLS after a STARTTLS go-ahead.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted or the TLS
    /// handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(stream) => stream,
            Self::Tls(_) => {
                return Err(Error::Io(io::Error::other("stream is already encrypted")));
            }
        };

        let connector = tls_connector();
        let server_name = server_name(hostname)?;
        let tls_stream = connector.connect(server_name, tcp_stream).await?;
        Ok(Self::Tls(Box::new(tls_stream)))
    }
}

/// Opens a cleartext connection to the server.
///
/// # Errors
///
/// Returns an error when the TCP connect fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let addr = format!("{hostname}:{port}");
    let stream = TcpStream::connect(&addr).await?;
    Ok(SmtpStream::Tcp(stream))
}

/// Opens a connection that speaks TLS from the first byte (implicit
/// TLS, port 465 style).
///
/// # Errors
///
/// Returns an error when the TCP connect or the handshake fails.
pub async fn connect_tls(hostname: &str, port: u16) -> Result<SmtpStream> {
    let addr = format!("{hostname}:{port}");
    let tcp_stream = TcpStream::connect(&addr).await?;

    let connector = tls_connector();
    let server_name = server_name(hostname)?;
    let tls_stream = connector.connect(server_name, tcp_stream).await?;
    Ok(SmtpStream::Tls(Box::new(tls_stream)))
}

fn server_name(hostname: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(hostname.to_string()).map_err(|_| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid server name: {hostname}"),
        ))
    })
}

/// Creates a TLS connector with the bundled web PKI roots.
fn tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
