use std::{future::Future, io, pin::Pin};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tracing::trace;

/// Convenience type for the future returned by [`Connector::connect`].
pub type ConnectFuture<S> = Pin<Box<dyn Future<Output = io::Result<S>> + Send + 'static>>;

/// Opens byte-stream connections to a trapper.
///
/// A connection is a plain bidirectional byte stream: the sender writes one request frame, then reads until the peer
/// closes its side. Dropping the stream terminates the connection.
pub trait Connector: Send + Sync + 'static {
    /// The connection type.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Starts connecting to `host:port`.
    fn connect(&self, host: &str, port: u16) -> ConnectFuture<Self::Stream>;
}

/// Connects over TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, host: &str, port: u16) -> ConnectFuture<TcpStream> {
        let host = host.to_string();
        Box::pin(async move {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            stream.set_nodelay(true)?;
            trace!(%host, port, peer = ?stream.peer_addr().ok(), "Connected to trapper.");
            Ok(stream)
        })
    }
}
