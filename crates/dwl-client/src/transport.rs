//! Component C — transport abstraction.
//!
//! A fresh connection per request (§6: "No persistent-connection reuse
//! across requests"), plain TCP for `http://` and TLS (via `rustls`) for
//! `https://`. `Transport` erases the TCP/TLS distinction behind a single
//! `AsyncRead + AsyncWrite` type so the HTTP client never has to care.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::uri::PackageUri;

/// Either side of the TCP/TLS divide, behind one async-IO type.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("tcp connect to {0}:{1} failed: {2}")]
    ConnectFailed(String, u16, io::Error),
    #[error("tls handshake with {0} failed: {1}")]
    TlsHandshakeFailed(String, io::Error),
    #[error("invalid server name: {0}")]
    InvalidServerName(String),
}

/// Opens a fresh connection appropriate for `uri`'s scheme. TLS root
/// trust comes from the bundled Mozilla root set (`webpki-roots`), not
/// the host OS store, so the client behaves identically across embedded
/// targets with no system trust store.
pub async fn connect(uri: &PackageUri) -> Result<Transport, TransportError> {
    let tcp = TcpStream::connect((uri.host.as_str(), uri.port))
        .await
        .map_err(|e| TransportError::ConnectFailed(uri.host.clone(), uri.port, e))?;

    if !uri.is_secure() {
        return Ok(Transport::Plain(tcp));
    }

    let connector = tls_connector();
    let server_name = rustls_pki_types::ServerName::try_from(uri.host.clone())
        .map_err(|_| TransportError::InvalidServerName(uri.host.clone()))?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| TransportError::TlsHandshakeFailed(uri.host.clone(), e))?;
    Ok(Transport::Tls(Box::new(tls)))
}

fn tls_connector() -> TlsConnector {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}
