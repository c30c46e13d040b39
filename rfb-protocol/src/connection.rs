//! Handshake sequencing over a pair of RFB streams.
//!
//! [`RfbConnection`] owns the input/output streams while the handshake runs
//! and enforces the order of its phases:
//!
//! ```text
//! Disconnected -> ProtocolVersion -> Security -> Authentication
//!              -> ClientInit -> ServerInit -> Normal
//! ```
//!
//! Any phase may fail into `Closed`. Once `Normal` is reached the streams are
//! handed to the session with [`RfbConnection::into_streams`].
//!
//! # Examples
//!
//! ```no_run
//! use rfb_protocol::connection::RfbConnection;
//!
//! # async fn example(socket: tokio::net::TcpStream) -> anyhow::Result<()> {
//! let (reader, writer) = socket.into_split();
//! let mut conn = RfbConnection::new(reader, writer);
//! conn.exchange_version().await?;
//! conn.negotiate_security().await?;
//! conn.authenticate(|| Ok(String::from("secret"))).await?;
//! let init = conn.initialise(true).await?;
//! println!("{} is {}x{}", init.name, init.framebuffer_width, init.framebuffer_height);
//! # Ok(())
//! # }
//! ```

use crate::auth;
use crate::handshake::{self, NegotiatedVersion, SecurityResult, SecurityType};
use crate::io::{RfbInStream, RfbOutStream};
use crate::messages::ServerInit;
use anyhow::Context;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Handshake phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    ProtocolVersion,
    Security,
    Authentication,
    ClientInit,
    ServerInit,
    /// Handshake complete; normal message exchange.
    Normal,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::ProtocolVersion => "ProtocolVersion",
            Self::Security => "Security",
            Self::Authentication => "Authentication",
            Self::ClientInit => "ClientInit",
            Self::ServerInit => "ServerInit",
            Self::Normal => "Normal",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

pub struct RfbConnection<R, W> {
    instream: RfbInStream<R>,
    outstream: RfbOutStream<W>,
    state: ConnectionState,
    version: Option<NegotiatedVersion>,
    security: Option<SecurityType>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> RfbConnection<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            instream: RfbInStream::new(reader),
            outstream: RfbOutStream::new(writer),
            state: ConnectionState::Disconnected,
            version: None,
            security: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn version(&self) -> Option<NegotiatedVersion> {
        self.version
    }

    pub fn security(&self) -> Option<SecurityType> {
        self.security
    }

    /// Move to `new_state`, rejecting anything but the next phase in order
    /// or a close.
    pub fn transition_to(&mut self, new_state: ConnectionState) -> anyhow::Result<()> {
        use ConnectionState::*;

        match (self.state, new_state) {
            (Closed, _) => anyhow::bail!("cannot transition from Closed state"),
            (_, Closed) => {}
            (Disconnected, ProtocolVersion)
            | (ProtocolVersion, Security)
            | (Security, Authentication)
            | (Authentication, ClientInit)
            | (ClientInit, ServerInit)
            | (ServerInit, Normal) => {}
            (from, to) => anyhow::bail!("invalid state transition: {} -> {}", from, to),
        }

        tracing::trace!(
            target: "rfb_protocol::connection",
            "state {} -> {}",
            self.state,
            new_state
        );
        self.state = new_state;
        Ok(())
    }

    /// Mark the connection closed when `result` is an error.
    fn closing_on_error<T>(&mut self, result: anyhow::Result<T>) -> anyhow::Result<T> {
        if result.is_err() {
            self.state = ConnectionState::Closed;
        }
        result
    }

    /// Version exchange.
    pub async fn exchange_version(&mut self) -> anyhow::Result<NegotiatedVersion> {
        self.transition_to(ConnectionState::ProtocolVersion)?;
        let result = handshake::negotiate_version(&mut self.instream, &mut self.outstream)
            .await
            .context("protocol version exchange failed");
        let version = self.closing_on_error(result)?;
        self.version = Some(version);
        Ok(version)
    }

    /// Security type negotiation.
    pub async fn negotiate_security(&mut self) -> anyhow::Result<SecurityType> {
        let version = self
            .version
            .context("security negotiation before version exchange")?;
        self.transition_to(ConnectionState::Security)?;
        let result =
            handshake::negotiate_security(&mut self.instream, &mut self.outstream, version)
                .await
                .context("security negotiation failed");
        let security = self.closing_on_error(result)?;
        self.security = Some(security);
        Ok(security)
    }

    /// Perform the chosen authentication and read the server's verdict.
    ///
    /// `password` is only called when the server demands VNC authentication,
    /// after the challenge has arrived. A `Failed` or `TooManyAttempts`
    /// result is returned as a value and leaves the connection `Closed`.
    pub async fn authenticate<F>(&mut self, password: F) -> anyhow::Result<SecurityResult>
    where
        F: FnOnce() -> anyhow::Result<String>,
    {
        let (version, security) = match (self.version, self.security) {
            (Some(v), Some(s)) => (v, s),
            _ => anyhow::bail!("authentication before security negotiation"),
        };
        self.transition_to(ConnectionState::Authentication)?;

        let result = self.run_authentication(version, security, password).await;
        let outcome = self.closing_on_error(result)?;
        if outcome != SecurityResult::Ok {
            self.state = ConnectionState::Closed;
        }
        Ok(outcome)
    }

    async fn run_authentication<F>(
        &mut self,
        version: NegotiatedVersion,
        security: SecurityType,
        password: F,
    ) -> anyhow::Result<SecurityResult>
    where
        F: FnOnce() -> anyhow::Result<String>,
    {
        if security == SecurityType::VncAuth {
            let challenge = handshake::read_challenge(&mut self.instream)
                .await
                .context("failed to read authentication challenge")?;
            let password = password()?;
            let response = auth::encrypt_challenge(&challenge, &password);
            handshake::send_challenge_response(&mut self.outstream, &response)
                .await
                .context("failed to send authentication response")?;
        }

        handshake::read_security_result(&mut self.instream, version, security)
            .await
            .context("failed to read authentication result")
    }

    /// ClientInit then ServerInit. Leaves the connection in `Normal`.
    pub async fn initialise(&mut self, shared: bool) -> anyhow::Result<ServerInit> {
        self.transition_to(ConnectionState::ClientInit)?;
        let result = handshake::send_client_init(&mut self.outstream, shared)
            .await
            .context("failed to send ClientInit");
        self.closing_on_error(result)?;

        self.transition_to(ConnectionState::ServerInit)?;
        let result = handshake::recv_server_init(&mut self.instream)
            .await
            .context("failed to read ServerInit");
        let init = self.closing_on_error(result)?;

        self.transition_to(ConnectionState::Normal)?;
        Ok(init)
    }

    pub fn instream(&mut self) -> &mut RfbInStream<R> {
        &mut self.instream
    }

    pub fn outstream(&mut self) -> &mut RfbOutStream<W> {
        &mut self.outstream
    }

    /// Hand the streams over once the handshake is complete.
    pub fn into_streams(self) -> anyhow::Result<(RfbInStream<R>, RfbOutStream<W>)> {
        if self.state != ConnectionState::Normal {
            anyhow::bail!("handshake incomplete (state {})", self.state);
        }
        Ok((self.instream, self.outstream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::types::PixelFormat;
    use tokio::io::{duplex, DuplexStream};

    type TestConnection = RfbConnection<DuplexStream, DuplexStream>;
    type ServerSide = (RfbInStream<DuplexStream>, RfbOutStream<DuplexStream>);

    fn create_test_connection() -> (TestConnection, ServerSide) {
        let (client_read, server_write) = duplex(4096);
        let (server_read, client_write) = duplex(4096);
        (
            RfbConnection::new(client_read, client_write),
            (RfbInStream::new(server_read), RfbOutStream::new(server_write)),
        )
    }

    fn server_init() -> ServerInit {
        ServerInit {
            framebuffer_width: 64,
            framebuffer_height: 48,
            pixel_format: PixelFormat {
                bits_per_pixel: 32,
                depth: 24,
                big_endian: 0,
                true_color: 1,
                red_max: 255,
                green_max: 255,
                blue_max: 255,
                red_shift: 16,
                green_shift: 8,
                blue_shift: 0,
            },
            name: "fake".into(),
        }
    }

    #[test]
    fn test_invalid_transitions() {
        let (mut conn, _) = create_test_connection();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        assert!(conn.transition_to(ConnectionState::Normal).is_err());
        conn.transition_to(ConnectionState::ProtocolVersion).unwrap();
        assert!(conn.transition_to(ConnectionState::ClientInit).is_err());
        conn.transition_to(ConnectionState::Closed).unwrap();
        assert!(conn.transition_to(ConnectionState::ProtocolVersion).is_err());
    }

    #[tokio::test]
    async fn test_full_handshake_with_vnc_auth() {
        let (mut conn, (mut server_in, mut server_out)) = create_test_connection();
        let challenge = [0x5Au8; 16];

        let server = tokio::spawn(async move {
            server_out.write_bytes(b"RFB 003.008\n");
            server_out.flush().await.unwrap();
            assert_eq!(&server_in.read_vec(12).await.unwrap(), b"RFB 003.008\n");

            server_out.write_u8(1);
            server_out.write_u8(2);
            server_out.flush().await.unwrap();
            assert_eq!(server_in.read_u8().await.unwrap(), 2);

            server_out.write_bytes(&challenge);
            server_out.flush().await.unwrap();
            let response = server_in.read_vec(16).await.unwrap();
            assert_eq!(response, auth::encrypt_challenge(&challenge, "secret").to_vec());
            server_out.write_u32(0);
            server_out.flush().await.unwrap();

            assert_eq!(server_in.read_u8().await.unwrap(), 1);
            server_init().write_to(&mut server_out);
            server_out.flush().await.unwrap();
        });

        assert_eq!(conn.exchange_version().await.unwrap(), NegotiatedVersion::V3_8);
        assert_eq!(conn.negotiate_security().await.unwrap(), SecurityType::VncAuth);
        let outcome = conn
            .authenticate(|| Ok("secret".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, SecurityResult::Ok);
        let init = conn.initialise(true).await.unwrap();
        assert_eq!(init, server_init());
        assert_eq!(conn.state(), ConnectionState::Normal);

        server.await.unwrap();
        assert!(conn.into_streams().is_ok());
    }

    #[tokio::test]
    async fn test_no_auth_3_3_never_asks_for_password() {
        let (mut conn, (mut server_in, mut server_out)) = create_test_connection();

        server_out.write_bytes(b"RFB 003.003\n");
        server_out.write_u32(1);
        server_out.flush().await.unwrap();

        conn.exchange_version().await.unwrap();
        assert_eq!(conn.negotiate_security().await.unwrap(), SecurityType::None);
        let outcome = conn
            .authenticate(|| anyhow::bail!("password must not be requested"))
            .await
            .unwrap();
        assert_eq!(outcome, SecurityResult::Ok);

        assert_eq!(&server_in.read_vec(12).await.unwrap(), b"RFB 003.003\n");
    }

    #[tokio::test]
    async fn test_auth_failure_closes_connection() {
        let (mut conn, (_server_in, mut server_out)) = create_test_connection();

        server_out.write_bytes(b"RFB 003.003\n");
        server_out.write_u32(2);
        server_out.write_bytes(&[0u8; 16]);
        server_out.write_u32(1);
        server_out.flush().await.unwrap();

        conn.exchange_version().await.unwrap();
        conn.negotiate_security().await.unwrap();
        let outcome = conn.authenticate(|| Ok("wrong".into())).await.unwrap();

        assert_eq!(outcome, SecurityResult::Failed(None));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.into_streams().is_err());
    }

    #[tokio::test]
    async fn test_io_failure_closes_connection() {
        let (mut conn, server) = create_test_connection();
        drop(server);

        assert!(conn.exchange_version().await.is_err());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
