//! RRE and CoRRE decoders - background colour plus solid sub-rectangles.
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | num_subrects     |  4 bytes (u32, network byte order)
//! +------------------+
//! | background_pixel |  bytes_per_pixel bytes
//! +------------------+
//! | Subrectangle 1   |
//! |   pixel          |  bytes_per_pixel bytes
//! |   x, y, w, h     |  RRE: 4 x u16; CoRRE: 4 x u8
//! +------------------+
//! | ...              |
//! +------------------+
//! ```
//!
//! Sub-rectangle coordinates are relative to the enclosing rectangle. CoRRE
//! uses single-byte coordinates and so only covers rectangles up to 255x255.

use crate::{
    dest_rect, Decoder, DecoderState, MutablePixelBuffer, PixelFormat, Rectangle, RfbInStream,
    ENCODING_CORRE, ENCODING_RRE,
};
use anyhow::{bail, Context, Result};
use rfb_common::Rect;
use tokio::io::AsyncRead;

/// Decoder for RRE (Rise-and-Run-length Encoding).
pub struct RREDecoder;

/// Decoder for CoRRE (compact RRE with 8-bit sub-rectangle coordinates).
pub struct CoRREDecoder;

impl Decoder for RREDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_RRE
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        buffer: &mut dyn MutablePixelBuffer,
        _state: &mut DecoderState,
    ) -> Result<()> {
        decode_rre(stream, rect, pixel_format, buffer, SubrectCoords::Wide).await
    }
}

impl Decoder for CoRREDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_CORRE
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        buffer: &mut dyn MutablePixelBuffer,
        _state: &mut DecoderState,
    ) -> Result<()> {
        if rect.width > 255 || rect.height > 255 {
            bail!(
                "CoRRE rectangle {}x{} exceeds 255x255",
                rect.width,
                rect.height
            );
        }
        decode_rre(stream, rect, pixel_format, buffer, SubrectCoords::Compact).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubrectCoords {
    Wide,
    Compact,
}

impl SubrectCoords {
    fn name(self) -> &'static str {
        match self {
            Self::Wide => "RRE",
            Self::Compact => "CoRRE",
        }
    }

    async fn read<R: AsyncRead + Unpin>(self, stream: &mut RfbInStream<R>) -> Result<[u32; 4]> {
        let mut coords = [0u32; 4];
        for value in coords.iter_mut() {
            *value = match self {
                Self::Wide => stream.read_u16().await? as u32,
                Self::Compact => stream.read_u8().await? as u32,
            };
        }
        Ok(coords)
    }
}

async fn decode_rre<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    pixel_format: &PixelFormat,
    buffer: &mut dyn MutablePixelBuffer,
    coords: SubrectCoords,
) -> Result<()> {
    let name = coords.name();
    let bytes_per_pixel = pixel_format.bytes_per_pixel() as usize;

    let num_subrects = stream
        .read_u32()
        .await
        .with_context(|| format!("Failed to read {} num_subrects", name))?;

    let mut pixel = vec![0u8; bytes_per_pixel];
    stream
        .read_bytes(&mut pixel)
        .await
        .with_context(|| format!("Failed to read {} background pixel", name))?;

    let dest = dest_rect(rect);
    buffer
        .fill_rect(dest, &pixel)
        .with_context(|| format!("Failed to fill background in {} decode", name))?;

    tracing::trace!(
        target: "rfb_encodings::framing",
        "{}: rect=[{},{} {}x{}] subrects={}",
        name, rect.x, rect.y, rect.width, rect.height, num_subrects
    );

    for i in 0..num_subrects {
        stream
            .read_bytes(&mut pixel)
            .await
            .with_context(|| format!("Failed to read pixel for {} subrect {}", name, i))?;
        let [x, y, w, h] = coords
            .read(stream)
            .await
            .with_context(|| format!("Failed to read geometry for {} subrect {}", name, i))?;

        if x + w > dest.width || y + h > dest.height {
            bail!(
                "{} subrect {} ({}x{} at {},{}) extends beyond its {}x{} rectangle",
                name,
                i,
                w,
                h,
                x,
                y,
                dest.width,
                dest.height
            );
        }

        let subrect = Rect::new(dest.x + x as i32, dest.y + y as i32, w, h);
        buffer
            .fill_rect(subrect, &pixel)
            .with_context(|| format!("Failed to fill {} subrect {}", name, i))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bgr233, rect, rgb565_be, rgb_at, stream};
    use rfb_pixelbuffer::FrameBuffer;

    fn rre_packet(bg: &[u8], subrects: &[(&[u8], u16, u16, u16, u16)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(subrects.len() as u32).to_be_bytes());
        data.extend_from_slice(bg);
        for (pixel, x, y, w, h) in subrects {
            data.extend_from_slice(pixel);
            for v in [x, y, w, h] {
                data.extend_from_slice(&v.to_be_bytes());
            }
        }
        data
    }

    fn corre_packet(bg: &[u8], subrects: &[(&[u8], u8, u8, u8, u8)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(subrects.len() as u32).to_be_bytes());
        data.extend_from_slice(bg);
        for (pixel, x, y, w, h) in subrects {
            data.extend_from_slice(pixel);
            data.extend_from_slice(&[*x, *y, *w, *h]);
        }
        data
    }

    async fn run<D: Decoder>(
        decoder: D,
        fb: &mut FrameBuffer,
        format: PixelFormat,
        r: Rectangle,
        data: Vec<u8>,
    ) -> Result<u64> {
        let mut input = stream(data);
        decoder
            .decode(&mut input, &r, &format, fb, &mut DecoderState::new())
            .await?;
        Ok(input.total_read())
    }

    #[tokio::test]
    async fn test_rre_background_and_subrect() {
        let format = PixelFormat::rgbx();
        let mut fb = FrameBuffer::new(20, 20, format);
        let blue = [0, 0, 255, 0];
        let red = [255, 0, 0, 0];
        let data = rre_packet(&blue, &[(&red, 2, 2, 3, 3)]);
        let len = data.len() as u64;

        let consumed = run(RREDecoder, &mut fb, format, rect(10, 10, 10, 10, ENCODING_RRE), data)
            .await
            .unwrap();

        assert_eq!(consumed, len);
        assert_eq!(rgb_at(&fb, 10, 10), [0, 0, 255]);
        assert_eq!(rgb_at(&fb, 12, 12), [255, 0, 0]);
        assert_eq!(rgb_at(&fb, 14, 14), [255, 0, 0]);
        assert_eq!(rgb_at(&fb, 15, 15), [0, 0, 255]);
        assert_eq!(rgb_at(&fb, 9, 9), [0, 0, 0]);
    }

    #[tokio::test]
    async fn test_rre_16bpp_pixels() {
        let format = rgb565_be();
        let mut fb = FrameBuffer::new(4, 4, format);
        // Pure green then pure red in big-endian 5-6-5.
        let data = rre_packet(&[0x07, 0xE0], &[(&[0xF8, 0x00], 0, 0, 1, 1)]);
        run(RREDecoder, &mut fb, format, rect(0, 0, 4, 4, ENCODING_RRE), data)
            .await
            .unwrap();
        assert_eq!(rgb_at(&fb, 0, 0), [255, 0, 0]);
        assert_eq!(rgb_at(&fb, 3, 3), [0, 255, 0]);
    }

    #[tokio::test]
    async fn test_rre_subrect_outside_rect_rejected() {
        let format = PixelFormat::rgbx();
        let mut fb = FrameBuffer::new(20, 20, format);
        let px = [1, 2, 3, 0];
        let data = rre_packet(&px, &[(&px, 8, 0, 3, 1)]);
        let err = run(RREDecoder, &mut fb, format, rect(0, 0, 10, 10, ENCODING_RRE), data)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("extends beyond"));
    }

    #[tokio::test]
    async fn test_corre_compact_coordinates() {
        let format = bgr233();
        let mut fb = FrameBuffer::new(8, 8, format);
        // 0x07 is full red, 0xC0 is full blue.
        let data = corre_packet(&[0x07], &[(&[0xC0], 1, 1, 2, 1)]);
        let len = data.len() as u64;

        let consumed = run(CoRREDecoder, &mut fb, format, rect(4, 4, 4, 4, ENCODING_CORRE), data)
            .await
            .unwrap();

        assert_eq!(consumed, len);
        assert_eq!(rgb_at(&fb, 4, 4), [255, 0, 0]);
        assert_eq!(rgb_at(&fb, 5, 5), [0, 0, 255]);
        assert_eq!(rgb_at(&fb, 6, 5), [0, 0, 255]);
        assert_eq!(rgb_at(&fb, 7, 5), [255, 0, 0]);
    }

    #[tokio::test]
    async fn test_corre_rejects_large_rectangle() {
        let format = PixelFormat::rgbx();
        let mut fb = FrameBuffer::new(300, 10, format);
        let result = run(
            CoRREDecoder,
            &mut fb,
            format,
            rect(0, 0, 256, 1, ENCODING_CORRE),
            vec![],
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rre_truncated_subrect_fails() {
        let format = PixelFormat::rgbx();
        let mut fb = FrameBuffer::new(10, 10, format);
        let mut data = rre_packet(&[0; 4], &[(&[0; 4], 0, 0, 1, 1)]);
        data.truncate(data.len() - 2);
        let result = run(RREDecoder, &mut fb, format, rect(0, 0, 10, 10, ENCODING_RRE), data).await;
        assert!(result.is_err());
    }
}
