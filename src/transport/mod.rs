//! Line transport over plain TCP or TLS.
//!
//! A [`LineChannel`] frames a socket with the [`LineCodec`] and carries a
//! close handle: cancelling it makes every pending read fail with
//! `ConnectionAborted`. A channel is split into a [`LineReader`] and a
//! [`LineWriter`] shared by all senders as soon as it is opened; for a
//! `STARTTLS` upgrade the halves are [`reunite`](LineChannel::reunite)d,
//! upgraded in place and split again.

mod stream;
mod tls;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{HandshakeError, LineError};
use crate::line::LineCodec;

pub use self::stream::IrcStream;
pub use self::tls::default_client_config;

type FramedStream = Framed<IrcStream, LineCodec>;

fn aborted() -> LineError {
    LineError::Io(io::Error::new(
        io::ErrorKind::ConnectionAborted,
        "connection closed",
    ))
}

fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)
}

async fn tls_handshake(
    stream: TcpStream,
    host: &str,
    config: Arc<ClientConfig>,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, HandshakeError> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| HandshakeError::Tls(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    TlsConnector::from(config)
        .connect(server_name, stream)
        .await
        .map_err(HandshakeError::Tls)
}

/// A framed, closable IRC connection.
#[derive(Debug)]
pub struct LineChannel {
    framed: FramedStream,
    closer: CancellationToken,
    host: String,
}

impl LineChannel {
    /// Frame a plain TCP connection to `host`.
    pub fn plain(stream: TcpStream, host: &str) -> Self {
        if let Err(e) = enable_keepalive(&stream) {
            warn!(error = %e, "failed to enable TCP keepalive");
        }

        Self {
            framed: Framed::new(IrcStream::Plain(stream), LineCodec::new()),
            closer: CancellationToken::new(),
            host: host.to_string(),
        }
    }

    /// Wrap a fresh TCP connection in TLS before any line is exchanged.
    pub async fn tls(
        stream: TcpStream,
        host: &str,
        config: Arc<ClientConfig>,
    ) -> Result<Self, HandshakeError> {
        if let Err(e) = enable_keepalive(&stream) {
            warn!(error = %e, "failed to enable TCP keepalive");
        }
        let tls = tls_handshake(stream, host, config).await?;

        Ok(Self {
            framed: Framed::new(IrcStream::Tls(Box::new(tls)), LineCodec::new()),
            closer: CancellationToken::new(),
            host: host.to_string(),
        })
    }

    /// Swap the plain socket for TLS, keeping the close handle.
    ///
    /// Plaintext bytes already buffered past the line that triggered the
    /// upgrade are discarded; everything read afterwards comes from TLS.
    pub async fn upgrade_to_tls(self, config: Arc<ClientConfig>) -> Result<Self, HandshakeError> {
        let parts = self.framed.into_parts();
        if !parts.read_buf.is_empty() {
            warn!(
                bytes = parts.read_buf.len(),
                "discarding plaintext buffered before TLS upgrade"
            );
        }

        let tcp = match parts.io {
            IrcStream::Plain(tcp) => tcp,
            IrcStream::Tls(_) => {
                return Err(HandshakeError::Tls(io::Error::other(
                    "transport is already encrypted",
                )))
            }
        };

        let tls = tls_handshake(tcp, &self.host, config).await?;
        debug!(host = %self.host, "transport upgraded to TLS");

        Ok(Self {
            framed: Framed::new(IrcStream::Tls(Box::new(tls)), LineCodec::new()),
            closer: self.closer,
            host: self.host,
        })
    }

    /// Handle that closes this channel when cancelled.
    pub fn close_handle(&self) -> CancellationToken {
        self.closer.clone()
    }

    /// Whether the channel is encrypted.
    pub fn is_tls(&self) -> bool {
        self.framed.get_ref().is_tls()
    }

    /// Remote address of the socket.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.framed.get_ref().tcp().peer_addr()
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.framed.get_ref().tcp().local_addr()
    }

    /// Next line, or `None` at end of stream.
    pub async fn read_line(&mut self) -> Result<Option<String>, LineError> {
        tokio::select! {
            _ = self.closer.cancelled() => Err(aborted()),
            next = self.framed.next() => next.transpose(),
        }
    }

    /// Write and flush one line.
    pub async fn write_line(&mut self, line: impl Into<String>) -> Result<(), LineError> {
        if self.closer.is_cancelled() {
            return Err(aborted());
        }
        self.framed.send(line.into()).await
    }

    /// Split into independent read and write halves sharing the close handle.
    pub fn split(self) -> (LineReader, LineWriter) {
        let tls = self.is_tls();
        let (sink, stream) = self.framed.split();
        (
            LineReader {
                stream,
                closer: self.closer.clone(),
                host: self.host,
                tls,
            },
            LineWriter {
                sink,
                closer: self.closer,
            },
        )
    }

    /// Put back together the halves of one [`split`](Self::split).
    pub fn reunite(reader: LineReader, writer: LineWriter) -> Result<Self, HandshakeError> {
        let LineReader {
            stream, closer, host, ..
        } = reader;
        let framed = stream.reunite(writer.sink).map_err(|_| {
            HandshakeError::Io(io::Error::other("halves belong to different channels"))
        })?;

        Ok(Self {
            framed,
            closer,
            host,
        })
    }
}

/// Read half of a [`LineChannel`].
pub struct LineReader {
    stream: SplitStream<FramedStream>,
    closer: CancellationToken,
    host: String,
    tls: bool,
}

impl LineReader {
    /// Next line, or `None` at end of stream.
    pub async fn read_line(&mut self) -> Result<Option<String>, LineError> {
        tokio::select! {
            _ = self.closer.cancelled() => Err(aborted()),
            next = self.stream.next() => next.transpose(),
        }
    }

    /// Whether the channel was closed through its handle.
    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// Whether the underlying connection is encrypted.
    pub fn is_tls(&self) -> bool {
        self.tls
    }
}

/// Write half of a [`LineChannel`].
pub struct LineWriter {
    sink: SplitSink<FramedStream, String>,
    closer: CancellationToken,
}

impl LineWriter {
    /// Write and flush one line.
    pub async fn write_line(&mut self, line: impl Into<String>) -> Result<(), LineError> {
        if self.closer.is_cancelled() {
            return Err(aborted());
        }
        self.sink.send(line.into()).await
    }

    /// Flush and shut down the write side.
    pub async fn close(&mut self) -> Result<(), LineError> {
        self.sink.close().await
    }
}
