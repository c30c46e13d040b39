//! Connection handshake.
//!
//! Runs the RFB version and security handshakes over a transport, answers a
//! VNC challenge from the configured [`PasswordSource`], sends ClientInit and
//! reads ServerInit. Returns buffered RFB input/output streams ready for
//! normal operation.

use crate::errors::RfbClientError;
use crate::password::PasswordSource;
use rfb_protocol::handshake::{NegotiatedVersion, SecurityResult, SecurityType};
use rfb_protocol::io::{RfbInStream, RfbOutStream};
use rfb_protocol::messages::ServerInit;
use rfb_protocol::RfbConnection;
use tokio::io::{AsyncRead, AsyncWrite};

/// Connected RFB session components.
pub struct Connection<R, W> {
    /// Buffered input stream for reading RFB data.
    pub input: RfbInStream<R>,
    /// Buffered output stream for writing RFB data.
    pub output: RfbOutStream<W>,
    /// Negotiated protocol version.
    pub version: NegotiatedVersion,
    /// Initial server parameters (framebuffer size, pixel format, name).
    pub server_init: ServerInit,
}

impl<R, W> Connection<R, W> {
    /// Returns the framebuffer width and height.
    #[must_use]
    pub fn size(&self) -> (u16, u16) {
        (
            self.server_init.framebuffer_width,
            self.server_init.framebuffer_height,
        )
    }
}

/// Perform the full handshake over `reader`/`writer`.
///
/// The password source is only consulted if the server asks for VNC
/// authentication.
pub async fn establish<R, W>(
    reader: R,
    writer: W,
    shared: bool,
    password: &PasswordSource,
) -> Result<Connection<R, W>, RfbClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut conn = RfbConnection::new(reader, writer);

    let version = conn
        .exchange_version()
        .await
        .map_err(|e| RfbClientError::Handshake(format!("{:#}", e)))?;
    tracing::info!("Connected using RFB protocol version {:?}", version);

    let security = conn
        .negotiate_security()
        .await
        .map_err(|e| RfbClientError::Security(format!("{:#}", e)))?;

    let mut password_error = None;
    let result = conn
        .authenticate(|| {
            password.resolve().map_err(|e| {
                let msg = e.to_string();
                password_error = Some(e);
                anyhow::anyhow!(msg)
            })
        })
        .await;
    let result = match (result, password_error) {
        (_, Some(e)) => return Err(e),
        (Err(e), None) => return Err(RfbClientError::Security(format!("{:#}", e))),
        (Ok(r), None) => r,
    };

    match (security, result) {
        (SecurityType::None, SecurityResult::Ok) => tracing::info!("No authentication needed"),
        (SecurityType::VncAuth, SecurityResult::Ok) => {
            tracing::info!("VNC authentication succeeded")
        }
        (_, SecurityResult::Failed(reason)) => {
            return Err(RfbClientError::AuthFailed(
                reason.unwrap_or_else(|| "VNC authentication failed".to_string()),
            ))
        }
        (_, SecurityResult::TooManyAttempts(reason)) => {
            return Err(RfbClientError::AuthTooMany(
                reason.unwrap_or_else(|| "too many tries".to_string()),
            ))
        }
    }

    let server_init = conn
        .initialise(shared)
        .await
        .map_err(|e| RfbClientError::Handshake(format!("{:#}", e)))?;
    tracing::info!("Desktop name \"{}\"", server_init.name);

    let (input, output) = conn
        .into_streams()
        .map_err(|e| RfbClientError::Handshake(format!("{:#}", e)))?;

    Ok(Connection {
        input,
        output,
        version,
        server_init,
    })
}
