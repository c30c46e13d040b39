//! ZlibHex encoding decoder - Hextile with zlib-compressed tiles.
//!
//! ZlibHex (type 8) uses the Hextile tiling and flag byte, with two extra
//! bits:
//!
//! - **ZLIB_RAW (0x20)**: a u16 length and zlib data follow, inflating to the
//!   tile's raw pixels. Uses the session's "raw" inflater.
//! - **ZLIB_HEX (0x40)**: a u16 length and zlib data follow, inflating to an
//!   ordinary Hextile tile body. Uses the session's "encoded" inflater.
//!
//! ZLIB_RAW takes priority over RAW, which takes priority over ZLIB_HEX.
//! Background and foreground colours carry over between compressed and
//! uncompressed tiles alike.

use crate::hextile::{
    decode_raw_tile, decode_tile_body, read_tile_flags, TileColours, TileFlags, TILE_SIZE,
};
use crate::state::{inflate, inflate_exact};
use crate::{
    dest_rect, Decoder, DecoderState, MutablePixelBuffer, PixelFormat, Rectangle, RfbInStream,
    ENCODING_ZLIBHEX,
};
use anyhow::{bail, Context, Result};
use rfb_common::Rect;
use std::io::Cursor;
use tokio::io::AsyncRead;

/// Largest Hextile tile body for `tile`: both colours, a subrect count and
/// one coloured subrect per pixel.
fn max_tile_body_len(tile: Rect, bytes_per_pixel: usize) -> usize {
    2 * bytes_per_pixel + 1 + tile.area() as usize * (bytes_per_pixel + 2)
}

/// Decoder for ZlibHex encoding.
pub struct ZlibHexDecoder;

impl Decoder for ZlibHexDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_ZLIBHEX
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        buffer: &mut dyn MutablePixelBuffer,
        state: &mut DecoderState,
    ) -> Result<()> {
        let buffer_before = stream.available();
        tracing::debug!(
            target: "rfb_encodings::framing",
            "ZlibHex decode start: rect=[{},{} {}x{}] buffer_before={}",
            rect.x, rect.y, rect.width, rect.height,
            buffer_before
        );

        let bytes_per_pixel = pixel_format.bytes_per_pixel() as usize;
        let mut colours = TileColours::default();

        for tile in dest_rect(rect).tiles(TILE_SIZE, TILE_SIZE) {
            let flags = read_tile_flags(stream, tile).await?;

            if flags.contains(TileFlags::ZLIB_RAW) {
                let compressed = read_zlib_block(stream).await?;
                let pixels = inflate_exact(
                    &mut state.zlibhex_raw,
                    &compressed,
                    tile.area() as usize * bytes_per_pixel,
                )
                .with_context(|| format!("ZlibHex raw tile at ({}, {})", tile.x, tile.y))?;
                buffer.image_rect(tile, &pixels, 0)?;
            } else if flags.contains(TileFlags::RAW) {
                decode_raw_tile(stream, tile, bytes_per_pixel, buffer).await?;
            } else if flags.contains(TileFlags::ZLIB_HEX) {
                let compressed = read_zlib_block(stream).await?;
                let limit = max_tile_body_len(tile, bytes_per_pixel);
                let body = inflate(&mut state.zlibhex_encoded, &compressed, limit)
                    .with_context(|| format!("ZlibHex encoded tile at ({}, {})", tile.x, tile.y))?;
                let body_len = body.len() as u64;

                let mut body_stream = RfbInStream::new(Cursor::new(body));
                decode_tile_body(
                    &mut body_stream,
                    flags,
                    tile,
                    bytes_per_pixel,
                    &mut colours,
                    buffer,
                )
                .await
                .with_context(|| format!("ZlibHex encoded tile at ({}, {})", tile.x, tile.y))?;

                if body_stream.total_read() != body_len {
                    bail!(
                        "ZlibHex tile at ({}, {}) left {} of {} inflated bytes unused",
                        tile.x,
                        tile.y,
                        body_len - body_stream.total_read(),
                        body_len
                    );
                }
            } else {
                decode_tile_body(stream, flags, tile, bytes_per_pixel, &mut colours, buffer)
                    .await?;
            }
        }

        let buffer_after = stream.available();
        tracing::debug!(
            target: "rfb_encodings::framing",
            "ZlibHex decode end: bytes_consumed={}, buffer_after={}",
            buffer_before.saturating_sub(buffer_after),
            buffer_after
        );

        Ok(())
    }
}

async fn read_zlib_block<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Vec<u8>> {
    let len = stream
        .read_u16()
        .await
        .context("Failed to read ZlibHex compressed length")?;
    stream
        .read_vec(len as usize)
        .await
        .with_context(|| format!("Failed to read {} bytes of ZlibHex data", len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{rect, rgb_at, stream};
    use flate2::{Compress, Compression, FlushCompress};
    use rfb_pixelbuffer::FrameBuffer;

    fn compress_sync(compress: &mut Compress, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len() * 2 + 64);
        compress
            .compress_vec(data, &mut out, FlushCompress::Sync)
            .unwrap();
        out
    }

    fn block(compressed: &[u8]) -> Vec<u8> {
        let mut data = (compressed.len() as u16).to_be_bytes().to_vec();
        data.extend_from_slice(compressed);
        data
    }

    #[tokio::test]
    async fn test_zlib_raw_and_encoded_tiles() {
        let format = PixelFormat::rgbx();
        let mut fb = FrameBuffer::new(32, 16, format);
        let mut raw_stream = Compress::new(Compression::default(), true);
        let mut hex_stream = Compress::new(Compression::default(), true);

        // Tile 1: 16x16 red pixels through the raw stream.
        let red_tile: Vec<u8> = [255u8, 0, 0, 0].repeat(256);
        let mut data = vec![TileFlags::ZLIB_RAW.bits()];
        data.extend(block(&compress_sync(&mut raw_stream, &red_tile)));

        // Tile 2: a blue background with one green 1x1 subrect, compressed.
        let flags = TileFlags::ZLIB_HEX
            | TileFlags::BACKGROUND_SPECIFIED
            | TileFlags::FOREGROUND_SPECIFIED
            | TileFlags::ANY_SUBRECTS;
        let body = [0, 0, 255, 0, 0, 255, 0, 0, 1, 0x22, 0x00];
        data.push(flags.bits());
        data.extend(block(&compress_sync(&mut hex_stream, &body)));

        let mut input = stream(data);
        let mut state = DecoderState::new();
        ZlibHexDecoder
            .decode(
                &mut input,
                &rect(0, 0, 32, 16, ENCODING_ZLIBHEX),
                &format,
                &mut fb,
                &mut state,
            )
            .await
            .unwrap();

        assert_eq!(rgb_at(&fb, 0, 0), [255, 0, 0]);
        assert_eq!(rgb_at(&fb, 15, 15), [255, 0, 0]);
        assert_eq!(rgb_at(&fb, 16, 0), [0, 0, 255]);
        assert_eq!(rgb_at(&fb, 18, 2), [0, 255, 0]);
        assert!(state.zlibhex_raw.is_some());
        assert!(state.zlibhex_encoded.is_some());
    }

    #[tokio::test]
    async fn test_streams_persist_across_rectangles() {
        let format = PixelFormat::rgbx();
        let mut fb = FrameBuffer::new(2, 1, format);
        let mut raw_stream = Compress::new(Compression::default(), true);
        let mut state = DecoderState::new();

        for colour in [[9u8, 9, 9, 0], [200, 100, 50, 0]] {
            let mut data = vec![TileFlags::ZLIB_RAW.bits()];
            data.extend(block(&compress_sync(&mut raw_stream, &colour.repeat(2))));
            let mut input = stream(data);
            ZlibHexDecoder
                .decode(
                    &mut input,
                    &rect(0, 0, 2, 1, ENCODING_ZLIBHEX),
                    &format,
                    &mut fb,
                    &mut state,
                )
                .await
                .unwrap();
        }

        assert_eq!(rgb_at(&fb, 1, 0), [200, 100, 50]);
    }

    #[tokio::test]
    async fn test_plain_hextile_tiles_still_work() {
        let format = PixelFormat::rgbx();
        let mut fb = FrameBuffer::new(16, 16, format);
        let mut data = vec![TileFlags::BACKGROUND_SPECIFIED.bits()];
        data.extend_from_slice(&[1, 2, 3, 0]);
        let mut input = stream(data);
        ZlibHexDecoder
            .decode(
                &mut input,
                &rect(0, 0, 16, 16, ENCODING_ZLIBHEX),
                &format,
                &mut fb,
                &mut DecoderState::new(),
            )
            .await
            .unwrap();
        assert_eq!(rgb_at(&fb, 8, 8), [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_wrong_inflated_size_rejected() {
        let format = PixelFormat::rgbx();
        let mut fb = FrameBuffer::new(2, 2, format);
        let mut raw_stream = Compress::new(Compression::default(), true);
        let mut data = vec![TileFlags::ZLIB_RAW.bits()];
        data.extend(block(&compress_sync(&mut raw_stream, &[0u8; 12])));

        let mut input = stream(data);
        let result = ZlibHexDecoder
            .decode(
                &mut input,
                &rect(0, 0, 2, 2, ENCODING_ZLIBHEX),
                &format,
                &mut fb,
                &mut DecoderState::new(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_encoded_tile_body_past_worst_case_rejected() {
        let format = PixelFormat::rgbx();
        let mut fb = FrameBuffer::new(1, 1, format);
        let mut hex_stream = Compress::new(Compression::default(), true);
        // A 1x1 tile body holds at most 2 * 4 + 1 + 6 = 15 bytes.
        assert_eq!(max_tile_body_len(Rect::new(0, 0, 1, 1), 4), 15);
        let flags = TileFlags::ZLIB_HEX | TileFlags::BACKGROUND_SPECIFIED;
        let mut data = vec![flags.bits()];
        data.extend(block(&compress_sync(&mut hex_stream, &[0u8; 100_000])));

        let mut input = stream(data);
        let err = ZlibHexDecoder
            .decode(
                &mut input,
                &rect(0, 0, 1, 1, ENCODING_ZLIBHEX),
                &format,
                &mut fb,
                &mut DecoderState::new(),
            )
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("15 byte limit"), "{:#}", err);
    }
}
