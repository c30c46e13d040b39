//! Error types for the snapshot client.

use std::io;
use thiserror::Error;

/// Errors that can occur while connecting to a server and capturing it.
#[derive(Debug, Error)]
pub enum RfbClientError {
    /// Transport-level error (TCP, socket operations, short reads).
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// TCP connection establishment or reverse-connection accept failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RFB version exchange or initialisation failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Security negotiation failed or the server refused the connection.
    #[error("Security negotiation failed: {0}")]
    Security(String),

    /// The server rejected the password.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The server refused authentication because of too many attempts.
    #[error("Authentication failed, too many tries: {0}")]
    AuthTooMany(String),

    /// No usable password: unreadable password file, empty prompt input.
    #[error("Password error: {0}")]
    Password(String),

    /// Protocol error (malformed message, unexpected type, bad rectangle).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Rectangle decoding error.
    #[error("Encoding error: {0:#}")]
    Encoding(#[from] anyhow::Error),

    /// The server sent a rectangle in an encoding this client cannot decode.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(i32),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Writing the captured image failed.
    #[error("Image error: {0}")]
    Image(String),
}

impl RfbClientError {
    /// Returns true if this error is potentially retryable.
    ///
    /// Only transient network conditions qualify. The snapshot tool itself
    /// never retries, but callers embedding the session may.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ConnectionFailed(_))
    }

    /// Returns true if this is a fatal error that should not be retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    /// True when the peer went away or a read came up short.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Transport(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        assert!(RfbClientError::Transport(io::Error::from(io::ErrorKind::ConnectionRefused))
            .is_retryable());
        assert!(RfbClientError::ConnectionFailed("refused".to_string()).is_retryable());

        assert!(RfbClientError::AuthFailed("wrong password".to_string()).is_fatal());
        assert!(RfbClientError::AuthTooMany("locked".to_string()).is_fatal());
        assert!(RfbClientError::Config("invalid host".to_string()).is_fatal());
        assert!(RfbClientError::UnsupportedEncoding(999).is_fatal());
        assert!(RfbClientError::Handshake("bad version".to_string()).is_fatal());
    }

    #[test]
    fn test_disconnect_detection() {
        assert!(RfbClientError::ConnectionClosed.is_disconnect());
        assert!(RfbClientError::Transport(io::Error::from(io::ErrorKind::UnexpectedEof))
            .is_disconnect());
        assert!(!RfbClientError::Protocol("x".to_string()).is_disconnect());
    }

    #[test]
    fn test_error_display() {
        let err = RfbClientError::AuthFailed("wrong password".to_string());
        assert_eq!(err.to_string(), "Authentication failed: wrong password");

        let err = RfbClientError::Encoding(
            anyhow::anyhow!("short read").context("Tight: zlib stream 2 failed"),
        );
        assert_eq!(
            err.to_string(),
            "Encoding error: Tight: zlib stream 2 failed: short read"
        );
    }
}
