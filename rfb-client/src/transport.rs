//! TCP transport for RFB connections.
//!
//! A [`Transport`] is either an outgoing connection to a server or a single
//! reverse connection accepted in listen mode. Once established it is split
//! into read and write halves for [`rfb_protocol::RfbConnection`].
//!
//! # Examples
//!
//! ```no_run
//! use rfb_client::transport::Transport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Transport::connect_tcp("localhost", 5900).await?;
//! let (reader, writer) = transport.split();
//! # Ok(())
//! # }
//! ```

use crate::errors::RfbClientError;
use std::net::SocketAddr;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

/// An established TCP connection to an RFB server.
pub struct Transport {
    stream: TcpStream,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
}

impl Transport {
    /// Connect to a VNC server via plain TCP.
    ///
    /// TCP_NODELAY is enabled; requests are small and latency-bound.
    ///
    /// # Errors
    ///
    /// Returns [`RfbClientError::ConnectionFailed`] if resolution or the
    /// connection attempt fails.
    pub async fn connect_tcp(host: &str, port: u16) -> Result<Self, RfbClientError> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            RfbClientError::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e))
        })?;

        let transport = Self::from_stream(stream)?;
        match (transport.local, transport.peer) {
            (Some(local), Some(peer)) => {
                tracing::debug!("Connected via TCP: local={} -> remote={}", local, peer)
            }
            _ => tracing::debug!("Connected to {}", addr),
        }
        Ok(transport)
    }

    /// Wait for one reverse connection on `port`.
    ///
    /// The listening socket is closed once a server has connected.
    pub async fn listen(port: u16) -> Result<Self, RfbClientError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
            RfbClientError::ConnectionFailed(format!("Failed to listen on port {}: {}", port, e))
        })?;
        tracing::info!("Listening on port {}", port);

        let (stream, peer) = listener.accept().await.map_err(|e| {
            RfbClientError::ConnectionFailed(format!("Failed to accept connection: {}", e))
        })?;
        tracing::info!("Accepted reverse connection from {}", peer);
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Result<Self, RfbClientError> {
        stream.set_nodelay(true).map_err(|e| {
            RfbClientError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
        })?;
        Ok(Self {
            local: stream.local_addr().ok(),
            peer: stream.peer_addr().ok(),
            stream,
        })
    }

    /// Address of the server end, when known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// True when the server is reached through one of our own addresses.
    pub fn is_same_machine(&self) -> bool {
        same_host(self.local, self.peer)
    }

    /// Split into independently owned read and write halves.
    pub fn split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}

fn same_host(local: Option<SocketAddr>, peer: Option<SocketAddr>) -> bool {
    matches!((local, peer), (Some(l), Some(p)) if l.ip() == p.ip())
}
