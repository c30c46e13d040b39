//! Raw encoding decoder - uncompressed pixel data.
//!
//! Raw encoding (type 0) is the simplest VNC encoding. Pixels are sent in the
//! session pixel format, in scanline order, with no compression.
//!
//! # Wire Format
//!
//! ```text
//! +-------------+
//! | Pixel data  |  width * height * bytes_per_pixel bytes
//! +-------------+
//! ```
//!
//! The decoder streams the data in batches of whole rows sized to fit a fixed
//! scratch buffer, so a full-screen rectangle never needs a full-screen
//! allocation.

use crate::{
    dest_rect, Decoder, DecoderState, MutablePixelBuffer, PixelFormat, Rectangle, RfbInStream,
    ENCODING_RAW,
};
use anyhow::{Context, Result};
use rfb_common::Rect;
use tokio::io::AsyncRead;

/// Size of the row batch buffer in bytes.
pub const RAW_SCRATCH_BYTES: usize = 64 * 1024;

/// Decoder for raw (uncompressed) pixel data.
pub struct RawDecoder;

impl Decoder for RawDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_RAW
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        buffer: &mut dyn MutablePixelBuffer,
        _state: &mut DecoderState,
    ) -> Result<()> {
        let buffer_before = stream.available();
        tracing::debug!(
            target: "rfb_encodings::framing",
            "Raw decode start: rect=[{},{} {}x{}] buffer_before={}",
            rect.x, rect.y, rect.width, rect.height,
            buffer_before
        );

        if rect.is_empty() {
            return Ok(());
        }

        let dest = dest_rect(rect);
        let row_bytes = rect.width as usize * pixel_format.bytes_per_pixel() as usize;
        let rows_per_batch = (RAW_SCRATCH_BYTES / row_bytes).max(1);
        let mut scratch = vec![0u8; rows_per_batch * row_bytes];

        let mut row = 0u32;
        while row < dest.height {
            let rows = (rows_per_batch as u32).min(dest.height - row);
            let chunk = &mut scratch[..rows as usize * row_bytes];
            stream.read_bytes(chunk).await.with_context(|| {
                format!(
                    "Failed to read raw pixel rows {}..{} of {}",
                    row,
                    row + rows,
                    dest.height
                )
            })?;

            let band = Rect::new(dest.x, dest.y + row as i32, dest.width, rows);
            buffer
                .image_rect(band, chunk, 0)
                .context("Failed to write raw pixel data to buffer")?;
            row += rows;
        }

        let buffer_after = stream.available();
        tracing::debug!(
            target: "rfb_encodings::framing",
            "Raw decode end: bytes_consumed={}, buffer_after={}",
            buffer_before.saturating_sub(buffer_after),
            buffer_after
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bgr233, pixel_at, rect, rgb565_be, rgb_at, stream};
    use rfb_pixelbuffer::{FrameBuffer, PixelBuffer};

    async fn decode_into(fb: &mut FrameBuffer, r: Rectangle, data: Vec<u8>) -> Result<()> {
        let format = *fb.pixel_format();
        let mut input = stream(data);
        RawDecoder
            .decode(&mut input, &r, &format, fb, &mut DecoderState::new())
            .await
    }

    #[tokio::test]
    async fn test_raw_rgbx_2x2() {
        let mut fb = FrameBuffer::new(4, 4, PixelFormat::rgbx());
        let data = vec![
            255, 0, 0, 0, 0, 255, 0, 0, //
            0, 0, 255, 0, 255, 255, 255, 0,
        ];
        decode_into(&mut fb, rect(1, 1, 2, 2, ENCODING_RAW), data)
            .await
            .unwrap();

        assert_eq!(rgb_at(&fb, 1, 1), [255, 0, 0]);
        assert_eq!(rgb_at(&fb, 2, 1), [0, 255, 0]);
        assert_eq!(rgb_at(&fb, 1, 2), [0, 0, 255]);
        assert_eq!(rgb_at(&fb, 2, 2), [255, 255, 255]);
        assert_eq!(rgb_at(&fb, 0, 0), [0, 0, 0]);
    }

    #[tokio::test]
    async fn test_raw_round_trip_all_depths() {
        for format in [bgr233(), rgb565_be(), PixelFormat::rgbx()] {
            let bpp = format.bytes_per_pixel() as usize;
            let data: Vec<u8> = (0..3 * 2 * bpp).map(|i| (i * 37 + 11) as u8).collect();

            let mut fb = FrameBuffer::new(3, 2, format);
            decode_into(&mut fb, rect(0, 0, 3, 2, ENCODING_RAW), data.clone())
                .await
                .unwrap();

            // Reading back in the input format recovers the wire bytes, apart
            // from bits outside the channel masks.
            for i in 0..6 {
                let (x, y) = ((i % 3) as i32, (i / 3) as i32);
                let wire = format.read_pixel(&data[i * bpp..(i + 1) * bpp]);
                let back = format.read_pixel(&pixel_at(&fb, x, y));
                let mask = format.pack([format.red_max, format.green_max, format.blue_max]);
                assert_eq!(back, wire & mask, "{} pixel {}", format.describe(), i);
            }
        }
    }

    #[tokio::test]
    async fn test_raw_batches_large_rectangle() {
        // 200 rows of 128 RGBX pixels is well over one scratch buffer.
        let (w, h) = (128u16, 200u16);
        let mut data = Vec::with_capacity(w as usize * h as usize * 4);
        for y in 0..h {
            for _ in 0..w {
                data.extend_from_slice(&[y as u8, 0, 0, 0]);
            }
        }

        let mut fb = FrameBuffer::new(w as u32, h as u32, PixelFormat::rgbx());
        decode_into(&mut fb, rect(0, 0, w, h, ENCODING_RAW), data)
            .await
            .unwrap();

        assert_eq!(rgb_at(&fb, 0, 0), [0, 0, 0]);
        assert_eq!(rgb_at(&fb, 127, 127), [127, 0, 0]);
        assert_eq!(rgb_at(&fb, 5, 199), [199, 0, 0]);
    }

    #[tokio::test]
    async fn test_raw_empty_rectangle_reads_nothing() {
        let mut fb = FrameBuffer::new(4, 4, PixelFormat::rgbx());
        let mut input = stream(vec![0xAA]);
        RawDecoder
            .decode(
                &mut input,
                &rect(0, 0, 0, 3, ENCODING_RAW),
                &PixelFormat::rgbx(),
                &mut fb,
                &mut DecoderState::new(),
            )
            .await
            .unwrap();
        assert_eq!(input.total_read(), 0);
        assert!(!fb.ever_written());
    }

    #[tokio::test]
    async fn test_raw_short_read_fails() {
        let mut fb = FrameBuffer::new(4, 4, PixelFormat::rgbx());
        let result = decode_into(&mut fb, rect(0, 0, 2, 2, ENCODING_RAW), vec![0; 15]).await;
        assert!(result.is_err());
    }
}
