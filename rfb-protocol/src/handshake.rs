//! RFB connection handshake.
//!
//! The handshake runs in three phases:
//!
//! 1. **Protocol version** - the server announces `RFB xxx.yyy\n`; the client
//!    answers with the highest version both sides understand (3.3, 3.7 or 3.8).
//! 2. **Security** - the server lists (3.7+) or dictates (3.3) a security
//!    type. `None` and VNC authentication are supported; VNC authentication
//!    is a 16-byte DES challenge/response.
//! 3. **Initialisation** - ClientInit (shared flag) then ServerInit.
//!
//! All functions here are free-standing over an `RfbInStream`/`RfbOutStream`
//! pair; [`crate::connection::RfbConnection`] sequences them.

use crate::auth::CHALLENGE_SIZE;
use crate::io::{RfbInStream, RfbOutStream};
use crate::messages;
use crate::messages::types::{
    AUTH_RESULT_FAILED, AUTH_RESULT_OK, AUTH_RESULT_TOO_MANY, SECURITY_TYPE_INVALID,
    SECURITY_TYPE_NONE, SECURITY_TYPE_VNC_AUTH,
};
use tokio::io::{AsyncRead, AsyncWrite};

/// Protocol version agreed with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NegotiatedVersion {
    /// Server dictates the security type; no failure reason on auth failure.
    V3_3,
    /// Server offers a list of security types.
    V3_7,
    /// Like 3.7, plus a SecurityResult for every type and failure reasons.
    V3_8,
}

impl NegotiatedVersion {
    pub fn version_bytes(&self) -> &'static [u8; 12] {
        match self {
            Self::V3_3 => b"RFB 003.003\n",
            Self::V3_7 => b"RFB 003.007\n",
            Self::V3_8 => b"RFB 003.008\n",
        }
    }
}

/// Security type chosen for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    None,
    VncAuth,
}

/// Outcome reported by the server after authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityResult {
    Ok,
    Failed(Option<String>),
    TooManyAttempts(Option<String>),
}

fn invalid_data(msg: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

fn parse_version_digits(digits: &[u8], which: &str) -> std::io::Result<u32> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            invalid_data(format!(
                "invalid {} version number {:?}",
                which,
                String::from_utf8_lossy(digits)
            ))
        })
}

/// Read the server's version string and reply with the negotiated one.
///
/// Servers older than 3.3 are refused. Minor versions 3..=6 fall back to 3.3
/// (some servers advertise 3.5 or 3.6), 7 selects 3.7, and anything newer,
/// including a major version above 3, selects 3.8.
pub async fn negotiate_version<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
) -> std::io::Result<NegotiatedVersion> {
    let mut version_buf = [0u8; 12];
    instream.read_bytes(&mut version_buf).await?;

    if &version_buf[0..4] != b"RFB " || version_buf[7] != b'.' || version_buf[11] != b'\n' {
        return Err(invalid_data(format!(
            "not a valid VNC server: expected 'RFB xxx.yyy\\n', got {:?}",
            String::from_utf8_lossy(&version_buf)
        )));
    }

    let major = parse_version_digits(&version_buf[4..7], "major")?;
    let minor = parse_version_digits(&version_buf[8..11], "minor")?;

    if major < 3 || (major == 3 && minor < 3) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("unsupported RFB version {}.{} (< 3.3)", major, minor),
        ));
    }

    let negotiated = match (major, minor) {
        (3, m) if m < 7 => NegotiatedVersion::V3_3,
        (3, 7) => NegotiatedVersion::V3_7,
        _ => NegotiatedVersion::V3_8,
    };

    tracing::debug!(
        target: "rfb_protocol::handshake",
        "server speaks RFB {}.{}, using {:?}",
        major,
        minor,
        negotiated
    );

    outstream.write_bytes(negotiated.version_bytes());
    outstream.flush().await?;

    Ok(negotiated)
}

/// Agree on a security type.
///
/// For 3.7+ the client picks from the offered list, preferring `None` over
/// VNC authentication; the choice is written back to the server. For 3.3 the
/// server's single u32 decides.
pub async fn negotiate_security<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
    version: NegotiatedVersion,
) -> std::io::Result<SecurityType> {
    match version {
        NegotiatedVersion::V3_3 => negotiate_security_3_3(instream).await,
        NegotiatedVersion::V3_7 | NegotiatedVersion::V3_8 => {
            negotiate_security_list(instream, outstream).await
        }
    }
}

async fn negotiate_security_list<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
) -> std::io::Result<SecurityType> {
    let count = instream.read_u8().await?;
    if count == 0 {
        let reason = instream.read_string().await?;
        return Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            format!("VNC connection failed: {}", reason),
        ));
    }

    let types = instream.read_vec(count as usize).await?;

    let chosen = if types.contains(&(SECURITY_TYPE_NONE as u8)) {
        SecurityType::None
    } else if types.contains(&(SECURITY_TYPE_VNC_AUTH as u8)) {
        SecurityType::VncAuth
    } else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!(
                "no supported security type offered (got {:?}; supported: None=1, VncAuth=2)",
                types
            ),
        ));
    };

    let wire = match chosen {
        SecurityType::None => SECURITY_TYPE_NONE,
        SecurityType::VncAuth => SECURITY_TYPE_VNC_AUTH,
    };
    outstream.write_u8(wire as u8);
    outstream.flush().await?;

    Ok(chosen)
}

async fn negotiate_security_3_3<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
) -> std::io::Result<SecurityType> {
    match instream.read_u32().await? {
        SECURITY_TYPE_INVALID => {
            let reason = instream.read_string().await?;
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("VNC connection failed: {}", reason),
            ))
        }
        SECURITY_TYPE_NONE => Ok(SecurityType::None),
        SECURITY_TYPE_VNC_AUTH => Ok(SecurityType::VncAuth),
        other => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("unknown authentication scheme from VNC server: {}", other),
        )),
    }
}

/// Read the 16-byte VNC authentication challenge.
pub async fn read_challenge<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
) -> std::io::Result<[u8; CHALLENGE_SIZE]> {
    let mut challenge = [0u8; CHALLENGE_SIZE];
    instream.read_bytes(&mut challenge).await?;
    Ok(challenge)
}

pub async fn send_challenge_response<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    response: &[u8; CHALLENGE_SIZE],
) -> std::io::Result<()> {
    outstream.write_bytes(response);
    outstream.flush().await
}

/// Read the SecurityResult word, if the protocol sends one.
///
/// Before 3.8 the server sends no result for the `None` type, so this
/// returns `Ok` without reading. Failure reasons are only present on 3.8.
pub async fn read_security_result<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
    version: NegotiatedVersion,
    security: SecurityType,
) -> std::io::Result<SecurityResult> {
    if security == SecurityType::None && version < NegotiatedVersion::V3_8 {
        return Ok(SecurityResult::Ok);
    }

    let result = instream.read_u32().await?;
    let reason = if result != AUTH_RESULT_OK && version == NegotiatedVersion::V3_8 {
        Some(instream.read_string().await?)
    } else {
        None
    };

    match result {
        AUTH_RESULT_OK => Ok(SecurityResult::Ok),
        AUTH_RESULT_FAILED => Ok(SecurityResult::Failed(reason)),
        AUTH_RESULT_TOO_MANY => Ok(SecurityResult::TooManyAttempts(reason)),
        other => Err(invalid_data(format!(
            "unknown VNC authentication result: {}",
            other
        ))),
    }
}

pub async fn send_client_init<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    shared: bool,
) -> std::io::Result<()> {
    messages::ClientInit { shared }.write_to(outstream);
    outstream.flush().await
}

pub async fn recv_server_init<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
) -> std::io::Result<messages::ServerInit> {
    messages::ServerInit::read_from(instream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::types::PixelFormat;

    fn create_duplex_pair() -> (
        (RfbInStream<tokio::io::DuplexStream>, RfbOutStream<tokio::io::DuplexStream>),
        (RfbInStream<tokio::io::DuplexStream>, RfbOutStream<tokio::io::DuplexStream>),
    ) {
        let (client_read, server_write) = tokio::io::duplex(1024);
        let (server_read, client_write) = tokio::io::duplex(1024);
        (
            (RfbInStream::new(client_read), RfbOutStream::new(client_write)),
            (RfbInStream::new(server_read), RfbOutStream::new(server_write)),
        )
    }

    async fn negotiate_with(server_version: &[u8; 12]) -> (NegotiatedVersion, [u8; 12]) {
        let ((mut client_in, mut client_out), (mut server_in, mut server_out)) =
            create_duplex_pair();

        server_out.write_bytes(server_version);
        server_out.flush().await.unwrap();

        let negotiated = negotiate_version(&mut client_in, &mut client_out)
            .await
            .unwrap();
        let mut reply = [0u8; 12];
        server_in.read_bytes(&mut reply).await.unwrap();
        (negotiated, reply)
    }

    #[tokio::test]
    async fn test_version_negotiation_3_8() {
        let (negotiated, reply) = negotiate_with(b"RFB 003.008\n").await;
        assert_eq!(negotiated, NegotiatedVersion::V3_8);
        assert_eq!(&reply, b"RFB 003.008\n");
    }

    #[tokio::test]
    async fn test_version_negotiation_3_7() {
        let (negotiated, reply) = negotiate_with(b"RFB 003.007\n").await;
        assert_eq!(negotiated, NegotiatedVersion::V3_7);
        assert_eq!(&reply, b"RFB 003.007\n");
    }

    #[tokio::test]
    async fn test_version_negotiation_odd_minor_falls_back_to_3_3() {
        let (negotiated, reply) = negotiate_with(b"RFB 003.005\n").await;
        assert_eq!(negotiated, NegotiatedVersion::V3_3);
        assert_eq!(&reply, b"RFB 003.003\n");
    }

    #[tokio::test]
    async fn test_version_negotiation_newer_server() {
        let (negotiated, reply) = negotiate_with(b"RFB 004.001\n").await;
        assert_eq!(negotiated, NegotiatedVersion::V3_8);
        assert_eq!(&reply, b"RFB 003.008\n");
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let ((mut client_in, mut client_out), (_, mut server_out)) = create_duplex_pair();

        server_out.write_bytes(b"RFB 002.002\n");
        server_out.flush().await.unwrap();

        let err = negotiate_version(&mut client_in, &mut client_out)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
        assert!(err.to_string().contains("2.2"));
    }

    #[tokio::test]
    async fn test_garbage_greeting_rejected() {
        let ((mut client_in, mut client_out), (_, mut server_out)) = create_duplex_pair();

        server_out.write_bytes(b"HTTP/1.1 200");
        server_out.flush().await.unwrap();

        let err = negotiate_version(&mut client_in, &mut client_out)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_security_list_prefers_none() {
        let ((mut client_in, mut client_out), (mut server_in, mut server_out)) =
            create_duplex_pair();

        server_out.write_u8(2);
        server_out.write_bytes(&[2, 1]);
        server_out.flush().await.unwrap();

        let chosen = negotiate_security(&mut client_in, &mut client_out, NegotiatedVersion::V3_8)
            .await
            .unwrap();
        assert_eq!(chosen, SecurityType::None);
        assert_eq!(server_in.read_u8().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_security_list_vnc_auth_only() {
        let ((mut client_in, mut client_out), (mut server_in, mut server_out)) =
            create_duplex_pair();

        server_out.write_u8(1);
        server_out.write_u8(2);
        server_out.flush().await.unwrap();

        let chosen = negotiate_security(&mut client_in, &mut client_out, NegotiatedVersion::V3_7)
            .await
            .unwrap();
        assert_eq!(chosen, SecurityType::VncAuth);
        assert_eq!(server_in.read_u8().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_security_list_empty_carries_reason() {
        let ((mut client_in, mut client_out), (_, mut server_out)) = create_duplex_pair();

        server_out.write_u8(0);
        server_out.write_u32(4);
        server_out.write_bytes(b"busy");
        server_out.flush().await.unwrap();

        let err = negotiate_security(&mut client_in, &mut client_out, NegotiatedVersion::V3_8)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
        assert!(err.to_string().contains("busy"));
    }

    #[tokio::test]
    async fn test_security_3_3_schemes() {
        for (scheme, expected) in [(1u32, SecurityType::None), (2, SecurityType::VncAuth)] {
            let ((mut client_in, mut client_out), (_, mut server_out)) = create_duplex_pair();
            server_out.write_u32(scheme);
            server_out.flush().await.unwrap();

            let chosen =
                negotiate_security(&mut client_in, &mut client_out, NegotiatedVersion::V3_3)
                    .await
                    .unwrap();
            assert_eq!(chosen, expected);
        }
    }

    #[tokio::test]
    async fn test_security_3_3_unknown_scheme() {
        let ((mut client_in, mut client_out), (_, mut server_out)) = create_duplex_pair();
        server_out.write_u32(17);
        server_out.flush().await.unwrap();

        let err = negotiate_security(&mut client_in, &mut client_out, NegotiatedVersion::V3_3)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("17"));
    }

    #[tokio::test]
    async fn test_security_result_not_sent_for_none_before_3_8() {
        let ((mut client_in, _), _) = create_duplex_pair();

        let result =
            read_security_result(&mut client_in, NegotiatedVersion::V3_3, SecurityType::None)
                .await
                .unwrap();
        assert_eq!(result, SecurityResult::Ok);
    }

    #[tokio::test]
    async fn test_security_result_failure_reason_on_3_8() {
        let ((mut client_in, _), (_, mut server_out)) = create_duplex_pair();
        server_out.write_u32(1);
        server_out.write_u32(12);
        server_out.write_bytes(b"bad password");
        server_out.flush().await.unwrap();

        let result =
            read_security_result(&mut client_in, NegotiatedVersion::V3_8, SecurityType::VncAuth)
                .await
                .unwrap();
        assert_eq!(result, SecurityResult::Failed(Some("bad password".into())));
    }

    #[tokio::test]
    async fn test_security_result_too_many_on_3_3() {
        let ((mut client_in, _), (_, mut server_out)) = create_duplex_pair();
        server_out.write_u32(2);
        server_out.flush().await.unwrap();

        let result =
            read_security_result(&mut client_in, NegotiatedVersion::V3_3, SecurityType::VncAuth)
                .await
                .unwrap();
        assert_eq!(result, SecurityResult::TooManyAttempts(None));
    }

    #[tokio::test]
    async fn test_challenge_exchange() {
        let ((mut client_in, mut client_out), (mut server_in, mut server_out)) =
            create_duplex_pair();
        server_out.write_bytes(&[9u8; 16]);
        server_out.flush().await.unwrap();

        let challenge = read_challenge(&mut client_in).await.unwrap();
        assert_eq!(challenge, [9u8; 16]);

        send_challenge_response(&mut client_out, &[3u8; 16])
            .await
            .unwrap();
        assert_eq!(server_in.read_vec(16).await.unwrap(), vec![3u8; 16]);
    }

    #[tokio::test]
    async fn test_client_init_and_server_init() {
        let ((mut client_in, mut client_out), (mut server_in, mut server_out)) =
            create_duplex_pair();

        send_client_init(&mut client_out, false).await.unwrap();
        assert_eq!(server_in.read_u8().await.unwrap(), 0);

        let pf = PixelFormat {
            bits_per_pixel: 16,
            depth: 16,
            big_endian: 1,
            true_color: 1,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        };
        messages::ServerInit {
            framebuffer_width: 800,
            framebuffer_height: 600,
            pixel_format: pf.clone(),
            name: "Test Desktop".into(),
        }
        .write_to(&mut server_out);
        server_out.flush().await.unwrap();

        let server_init = recv_server_init(&mut client_in).await.unwrap();
        assert_eq!(server_init.framebuffer_width, 800);
        assert_eq!(server_init.framebuffer_height, 600);
        assert_eq!(server_init.pixel_format, pf);
        assert_eq!(server_init.name, "Test Desktop");
    }
}
