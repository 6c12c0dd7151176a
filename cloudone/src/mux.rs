//! One TCP port for gRPC and HTTP/1
//!
//! Every accepted connection is sniffed: connections opening with the HTTP/2
//! client preface are handed to the gRPC server, everything else to the
//! HTTP server. The sniffed bytes are replayed to whichever server gets the
//! connection.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::server::{Connected, TcpConnectInfo};
use tracing::{debug, warn};

/// First bytes every HTTP/2 client sends
pub const HTTP2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

const DEFAULT_SNIFF_TIMEOUT: Duration = Duration::from_secs(5);
const BACKLOG: usize = 128;
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Which server a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Grpc,
    Http1,
}

impl Protocol {
    /// Classify a connection from its first bytes
    ///
    /// Returns `None` while `prefix` is still a strict prefix of the HTTP/2
    /// preface and more bytes are needed.
    pub fn detect(prefix: &[u8]) -> Option<Self> {
        // gRPC is the only HTTP/2 traffic served here, so the preface stands
        // in for a `content-type: application/grpc` match.
        if prefix.len() >= HTTP2_PREFACE.len() {
            return Some(if prefix.starts_with(HTTP2_PREFACE) {
                Self::Grpc
            } else {
                Self::Http1
            });
        }
        if HTTP2_PREFACE.starts_with(prefix) {
            None
        } else {
            Some(Self::Http1)
        }
    }
}

/// A TCP stream whose sniffed bytes are read again before the socket
pub struct SniffedStream {
    prefix: Bytes,
    inner: TcpStream,
}

impl SniffedStream {
    fn new(prefix: Bytes, inner: TcpStream) -> Self {
        Self { prefix, inner }
    }
}

impl AsyncRead for SniffedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.prefix.has_remaining() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix[..n]);
            this.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SniffedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

impl Connected for SniffedStream {
    type ConnectInfo = TcpConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        self.inner.connect_info()
    }
}

/// Incoming connections for the gRPC server
pub type GrpcIncoming = ReceiverStream<io::Result<SniffedStream>>;

/// Logical listener handing HTTP/1 connections to `axum::serve`
pub struct HttpListener {
    rx: mpsc::Receiver<(SniffedStream, SocketAddr)>,
    local_addr: SocketAddr,
}

impl axum::serve::Listener for HttpListener {
    type Io = SniffedStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.rx.recv().await {
            Some(conn) => conn,
            // The demultiplexer is gone; the task group stops the server.
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

/// Accept loop routing every connection to one of the logical listeners
pub struct Demultiplexer {
    listener: TcpListener,
    sniff_timeout: Duration,
    grpc: mpsc::Sender<io::Result<SniffedStream>>,
    http: mpsc::Sender<(SniffedStream, SocketAddr)>,
}

/// Split `listener` into a demultiplexer and the two logical listeners it
/// feeds
pub fn split(listener: TcpListener) -> io::Result<(Demultiplexer, GrpcIncoming, HttpListener)> {
    let local_addr = listener.local_addr()?;
    let (grpc_tx, grpc_rx) = mpsc::channel(BACKLOG);
    let (http_tx, http_rx) = mpsc::channel(BACKLOG);

    let demux = Demultiplexer {
        listener,
        sniff_timeout: DEFAULT_SNIFF_TIMEOUT,
        grpc: grpc_tx,
        http: http_tx,
    };
    let http = HttpListener {
        rx: http_rx,
        local_addr,
    };
    Ok((demux, ReceiverStream::new(grpc_rx), http))
}

impl Demultiplexer {
    pub fn with_sniff_timeout(mut self, timeout: Duration) -> Self {
        self.sniff_timeout = timeout;
        self
    }

    /// Accept connections until both logical listeners are gone
    ///
    /// Accept errors are logged and retried. Errors other than a peer
    /// dropping its connection back off for a second first, as running out
    /// of file descriptors would otherwise spin.
    pub async fn run(self) -> io::Result<()> {
        loop {
            if self.grpc.is_closed() && self.http.is_closed() {
                return Ok(());
            }
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) if is_connection_error(&e) => {
                    debug!(error = %e, "Connection failed before accept");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed, retrying");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            let grpc = self.grpc.clone();
            let http = self.http.clone();
            let timeout = self.sniff_timeout;

            tokio::spawn(async move {
                let (protocol, stream) = match sniff(stream, timeout).await {
                    Ok(sniffed) => sniffed,
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "Dropping connection before routing");
                        return;
                    }
                };
                debug!(peer = %peer, ?protocol, "Routing connection");
                let routed = match protocol {
                    Protocol::Grpc => grpc.send(Ok(stream)).await.is_ok(),
                    Protocol::Http1 => http.send((stream, peer)).await.is_ok(),
                };
                if !routed {
                    warn!(peer = %peer, ?protocol, "No server accepting connections");
                }
            });
        }
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Read just enough of `stream` to classify it
async fn sniff(mut stream: TcpStream, timeout: Duration) -> io::Result<(Protocol, SniffedStream)> {
    let mut prefix = Vec::with_capacity(HTTP2_PREFACE.len());
    let protocol = tokio::time::timeout(timeout, async {
        let mut chunk = [0_u8; 24];
        loop {
            if let Some(protocol) = Protocol::detect(&prefix) {
                return Ok(protocol);
            }
            let wanted = HTTP2_PREFACE.len() - prefix.len();
            let n = stream.read(&mut chunk[..wanted]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while sniffing",
                ));
            }
            prefix.extend_from_slice(&chunk[..n]);
        }
    })
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "timed out sniffing connection"))??;

    Ok((protocol, SniffedStream::new(Bytes::from(prefix), stream)))
}
