//! CopyRect encoding decoder - copy rectangle from another screen location.
//!
//! CopyRect (type 1) tells the client to copy an area it already holds to a
//! new position. Only the source position is sent:
//!
//! ```text
//! +----------+----------+
//! | src_x    | src_y    |  2 bytes each (u16, network byte order)
//! +----------+----------+
//! ```
//!
//! The rectangle header gives the destination. Source and destination may
//! overlap; [`MutablePixelBuffer::copy_rect`] handles that.
//!
//! A copy into a buffer that has never been drawn would only duplicate the
//! initial zero fill, so it is skipped after the source position is read.

use crate::{
    dest_rect, Decoder, DecoderState, MutablePixelBuffer, PixelFormat, Rectangle, RfbInStream,
    ENCODING_COPYRECT,
};
use anyhow::{bail, Context, Result};
use rfb_common::{Point, Rect};
use tokio::io::AsyncRead;

/// Decoder for CopyRect encoding.
pub struct CopyRectDecoder;

impl Decoder for CopyRectDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_COPYRECT
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        _pixel_format: &PixelFormat,
        buffer: &mut dyn MutablePixelBuffer,
        _state: &mut DecoderState,
    ) -> Result<()> {
        let src_x = stream
            .read_u16()
            .await
            .context("Failed to read CopyRect src_x")?;
        let src_y = stream
            .read_u16()
            .await
            .context("Failed to read CopyRect src_y")?;

        if !buffer.ever_written() {
            tracing::trace!(
                target: "rfb_encodings::framing",
                "CopyRect from ({},{}) ignored: nothing drawn yet",
                src_x, src_y
            );
            return Ok(());
        }

        let dest = dest_rect(rect);
        let (fb_width, fb_height) = buffer.dimensions();
        let source = Rect::new(src_x as i32, src_y as i32, dest.width, dest.height);
        if !Rect::new(0, 0, fb_width, fb_height).contains_rect(&source) {
            bail!(
                "CopyRect source {}x{} at ({}, {}) lies outside the {}x{} frame buffer",
                source.width,
                source.height,
                src_x,
                src_y,
                fb_width,
                fb_height
            );
        }

        let src_offset = Point::new(source.x - dest.x, source.y - dest.y);
        buffer
            .copy_rect(dest, src_offset)
            .context("Failed to copy rectangle within buffer")?;

        Ok(())
    }
}
