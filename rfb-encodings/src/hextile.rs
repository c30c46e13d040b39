//! Hextile encoding decoder - tiled encoding with per-tile sub-encodings.
//!
//! Hextile (type 5) splits the rectangle into 16x16 tiles, row-major, with
//! smaller tiles along the right and bottom edges.
//!
//! # Wire Format
//!
//! For each tile:
//!
//! ```text
//! +------------------+
//! | tile_type        |  1 byte (bit flags)
//! +------------------+
//! | [raw_pixels]     |  tile_w * tile_h * bpp bytes (if RAW bit set)
//! +------------------+
//! | [background]     |  bpp bytes (if BACKGROUND_SPECIFIED)
//! +------------------+
//! | [foreground]     |  bpp bytes (if FOREGROUND_SPECIFIED)
//! +------------------+
//! | [num_subrects]   |  1 byte (if ANY_SUBRECTS)
//! +------------------+
//! | [subrects...]    |  For each subrect:
//! |   [pixel]        |    bpp bytes (if SUBRECTS_COLOURED)
//! |   xy             |    1 byte: x=(xy>>4), y=(xy&0xF)
//! |   wh             |    1 byte: w=((wh>>4)+1), h=((wh&0xF)+1)
//! +------------------+
//! ```
//!
//! Background and foreground persist from tile to tile within one rectangle.
//! A raw tile ignores every other flag bit and leaves both colours alone.
//!
//! The tile body parser here is shared with [`ZlibHex`](crate::zlibhex),
//! which may carry the same body inside a zlib stream.

use crate::{
    dest_rect, Decoder, DecoderState, MutablePixelBuffer, PixelFormat, Rectangle, RfbInStream,
    ENCODING_HEXTILE,
};
use anyhow::{anyhow, bail, Context, Result};
use bitflags::bitflags;
use rfb_common::Rect;
use tokio::io::AsyncRead;

/// Standard Hextile tile size (tiles at rectangle edges may be smaller).
pub const TILE_SIZE: u32 = 16;

bitflags! {
    /// Hextile and ZlibHex tile sub-encoding bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TileFlags: u8 {
        const RAW = 1 << 0;
        const BACKGROUND_SPECIFIED = 1 << 1;
        const FOREGROUND_SPECIFIED = 1 << 2;
        const ANY_SUBRECTS = 1 << 3;
        const SUBRECTS_COLOURED = 1 << 4;
        /// ZlibHex only: tile pixels arrive through the raw zlib stream.
        const ZLIB_RAW = 1 << 5;
        /// ZlibHex only: the tile body arrives through the encoded zlib stream.
        const ZLIB_HEX = 1 << 6;
    }
}

/// Colours carried from one tile to the next within a rectangle.
#[derive(Debug, Default)]
pub(crate) struct TileColours {
    background: Option<Vec<u8>>,
    foreground: Option<Vec<u8>>,
}

/// Decoder for Hextile encoding.
pub struct HextileDecoder;

impl Decoder for HextileDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_HEXTILE
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
            "Hextile decode start: rect=[{},{} {}x{}] buffer_before={}",
            rect.x, rect.y, rect.width, rect.height,
            buffer_before
        );

        let bytes_per_pixel = pixel_format.bytes_per_pixel() as usize;
        let mut colours = TileColours::default();

        for tile in dest_rect(rect).tiles(TILE_SIZE, TILE_SIZE) {
            let flags = read_tile_flags(stream, tile).await?;
            if flags.contains(TileFlags::RAW) {
                decode_raw_tile(stream, tile, bytes_per_pixel, buffer).await?;
            } else {
                decode_tile_body(stream, flags, tile, bytes_per_pixel, &mut colours, buffer)
                    .await?;
            }
        }

        let buffer_after = stream.available();
        tracing::debug!(
            target: "rfb_encodings::framing",
            "Hextile decode end: bytes_consumed={}, buffer_after={}",
            buffer_before.saturating_sub(buffer_after),
            buffer_after
        );

        Ok(())
    }
}

pub(crate) async fn read_tile_flags<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    tile: Rect,
) -> Result<TileFlags> {
    let bits = stream
        .read_u8()
        .await
        .with_context(|| format!("Failed to read tile type for tile at ({}, {})", tile.x, tile.y))?;
    Ok(TileFlags::from_bits_retain(bits))
}

/// Read `tile` as uncompressed pixels.
pub(crate) async fn decode_raw_tile<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    tile: Rect,
    bytes_per_pixel: usize,
    buffer: &mut dyn MutablePixelBuffer,
) -> Result<()> {
    let len = tile.area() as usize * bytes_per_pixel;
    let pixels = stream.read_vec(len).await.with_context(|| {
        format!(
            "Failed to read {} bytes of raw data for tile at ({}, {})",
            len, tile.x, tile.y
        )
    })?;
    buffer
        .image_rect(tile, &pixels, 0)
        .with_context(|| format!("Failed to write raw tile at ({}, {})", tile.x, tile.y))
}

/// Decode the non-raw part of a tile: optional colours, background fill and
/// sub-rectangles.
pub(crate) async fn decode_tile_body<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    flags: TileFlags,
    tile: Rect,
    bytes_per_pixel: usize,
    colours: &mut TileColours,
    buffer: &mut dyn MutablePixelBuffer,
) -> Result<()> {
    if flags.contains(TileFlags::BACKGROUND_SPECIFIED) {
        let bg = stream.read_vec(bytes_per_pixel).await.with_context(|| {
            format!("Failed to read background for tile at ({}, {})", tile.x, tile.y)
        })?;
        colours.background = Some(bg);
    }

    let background = colours.background.as_deref().ok_or_else(|| {
        anyhow!(
            "tile at ({}, {}) needs a background but none has been specified",
            tile.x,
            tile.y
        )
    })?;
    buffer
        .fill_rect(tile, background)
        .with_context(|| format!("Failed to fill background of tile at ({}, {})", tile.x, tile.y))?;

    if flags.contains(TileFlags::FOREGROUND_SPECIFIED) {
        let fg = stream.read_vec(bytes_per_pixel).await.with_context(|| {
            format!("Failed to read foreground for tile at ({}, {})", tile.x, tile.y)
        })?;
        colours.foreground = Some(fg);
    }

    if !flags.contains(TileFlags::ANY_SUBRECTS) {
        return Ok(());
    }

    let count = stream.read_u8().await.with_context(|| {
        format!("Failed to read subrect count for tile at ({}, {})", tile.x, tile.y)
    })?;
    let coloured = flags.contains(TileFlags::SUBRECTS_COLOURED);

    let mut own_colour = vec![0u8; bytes_per_pixel];
    for i in 0..count {
        if coloured {
            stream.read_bytes(&mut own_colour).await.with_context(|| {
                format!("Failed to read colour of subrect {} in tile at ({}, {})", i, tile.x, tile.y)
            })?;
        }
        let xy = stream.read_u8().await?;
        let wh = stream.read_u8().await?;

        let (x, y) = ((xy >> 4) as u32, (xy & 0x0F) as u32);
        let (w, h) = ((wh >> 4) as u32 + 1, (wh & 0x0F) as u32 + 1);
        if x + w > tile.width || y + h > tile.height {
            bail!(
                "subrect {} ({}x{} at {},{}) extends beyond the {}x{} tile at ({}, {})",
                i,
                w,
                h,
                x,
                y,
                tile.width,
                tile.height,
                tile.x,
                tile.y
            );
        }

        let colour = if coloured {
            own_colour.as_slice()
        } else {
            colours.foreground.as_deref().ok_or_else(|| {
                anyhow!(
                    "tile at ({}, {}) has monochrome subrects but no foreground colour",
                    tile.x,
                    tile.y
                )
            })?
        };
        buffer.fill_rect(Rect::new(tile.x + x as i32, tile.y + y as i32, w, h), colour)?;
    }

    Ok(())
}
