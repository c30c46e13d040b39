//! Protocol message helpers for the capture session.
//!
//! Thin wrappers over `rfb_protocol::messages` that flush, feed the protocol
//! trace and convert I/O failures into [`RfbClientError`].

use crate::errors::RfbClientError;
use crate::protocol_trace;
use rfb_protocol::io::{RfbInStream, RfbOutStream};
use rfb_protocol::messages as msg;
use rfb_protocol::messages::types::encoding_name;
use tokio::io::{AsyncRead, AsyncWrite};

/// Read the next server message type byte.
///
/// A clean EOF here means the server hung up between messages.
pub async fn read_message_type<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
) -> Result<u8, RfbClientError> {
    let t = instream.read_u8().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RfbClientError::ConnectionClosed
        } else {
            RfbClientError::Transport(e)
        }
    })?;
    protocol_trace::in_msg("ServerMessageType", &format!("type={}", t));
    Ok(t)
}

/// Read a FramebufferUpdate header (type byte already consumed).
pub async fn read_update_header<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
) -> Result<msg::FramebufferUpdateHeader, RfbClientError> {
    let header = msg::FramebufferUpdateHeader::read_from(instream).await?;
    protocol_trace::in_msg("FramebufferUpdate", &format!("rects={}", header.num_rectangles));
    Ok(header)
}

/// Read one rectangle header.
pub async fn read_rect_header<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
) -> Result<msg::Rectangle, RfbClientError> {
    let rect = msg::Rectangle::read_from(instream).await?;
    protocol_trace::in_msg(
        "Rect",
        &format!(
            "{}x{}+{}+{} enc={} ({})",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            rect.encoding,
            encoding_name(rect.encoding)
        ),
    );
    Ok(rect)
}

/// Write SetPixelFormat and flush.
pub async fn write_set_pixel_format<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    pixel_format: msg::PixelFormat,
) -> Result<(), RfbClientError> {
    protocol_trace::out_msg(
        "SetPixelFormat",
        &format!(
            "bpp={} depth={} shifts={}/{}/{}",
            pixel_format.bits_per_pixel,
            pixel_format.depth,
            pixel_format.red_shift,
            pixel_format.green_shift,
            pixel_format.blue_shift
        ),
    );
    msg::SetPixelFormat { pixel_format }.write_to(outstream);
    outstream.flush().await?;
    Ok(())
}

/// Write SetEncodings and flush.
pub async fn write_set_encodings<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    encodings: Vec<i32>,
) -> Result<(), RfbClientError> {
    if protocol_trace::enabled() {
        let names: Vec<&str> = encodings.iter().map(|&e| encoding_name(e)).collect();
        protocol_trace::out_msg("SetEncodings", &names.join(","));
    }
    tracing::debug!("Requesting {} encodings", encodings.len());
    msg::SetEncodings { encodings }.write_to(outstream);
    outstream.flush().await?;
    Ok(())
}

/// Write FramebufferUpdateRequest and flush.
pub async fn write_update_request<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    request: msg::FramebufferUpdateRequest,
) -> Result<(), RfbClientError> {
    protocol_trace::out_msg(
        "FramebufferUpdateRequest",
        &format!(
            "incremental={} {}x{}+{}+{}",
            request.incremental, request.width, request.height, request.x, request.y
        ),
    );
    request.write_to(outstream);
    outstream.flush().await?;
    Ok(())
}
