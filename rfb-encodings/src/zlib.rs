//! Zlib encoding decoder - raw pixels through a persistent zlib stream.
//!
//! ```text
//! +------------------+
//! | length           |  4 bytes (u32)
//! +------------------+
//! | zlib data        |  length bytes, inflating to w * h * bpp
//! +------------------+
//! ```

use crate::state::{inflate_exact, max_compressed_len};
use crate::{
    dest_rect, Decoder, DecoderState, MutablePixelBuffer, PixelFormat, Rectangle, RfbInStream,
    ENCODING_ZLIB,
};
use anyhow::{bail, Context, Result};
use tokio::io::AsyncRead;

/// Decoder for Zlib encoding.
pub struct ZlibDecoder;

impl Decoder for ZlibDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_ZLIB
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        buffer: &mut dyn MutablePixelBuffer,
        state: &mut DecoderState,
    ) -> Result<()> {
        let dest = dest_rect(rect);
        let expected = dest.area() as usize * pixel_format.bytes_per_pixel() as usize;

        let length = stream
            .read_u32()
            .await
            .context("Failed to read Zlib compressed length")?;
        if length as usize > max_compressed_len(expected) {
            bail!("Zlib: compressed length {} exceeds limit", length);
        }
        let compressed = stream
            .read_vec(length as usize)
            .await
            .with_context(|| format!("Failed to read {} bytes of Zlib data", length))?;

        tracing::debug!(
            target: "rfb_encodings::framing",
            "Zlib: rect=[{},{} {}x{}] compressed={}",
            rect.x, rect.y, rect.width, rect.height, length
        );

        let pixels = inflate_exact(&mut state.zlib, &compressed, expected)
            .context("Zlib: decompression failed")?;

        buffer
            .image_rect(dest, &pixels, 0)
            .context("Failed to write Zlib pixels to buffer")
    }
}
