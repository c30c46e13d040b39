//! ZRLE encoding decoder - zlib-compressed RLE with 64x64 tiling.
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | length           |  4 bytes (u32 big-endian)
//! +------------------+
//! | zlib_data        |  'length' bytes from the session's ZRLE stream
//! +------------------+
//! ```
//!
//! The inflated data holds the rectangle's tiles in row-major order, 64x64
//! (smaller at the right and bottom edges). Each tile starts with a
//! subencoding byte:
//!
//! | value     | tile contents                                         |
//! |-----------|-------------------------------------------------------|
//! | 0         | raw CPIXELs                                           |
//! | 1         | one CPIXEL, solid fill                                |
//! | 2..=16    | palette, then packed indices (1, 2 or 4 bits, MSB first, rows byte-aligned) |
//! | 128       | plain RLE: (CPIXEL, run length) pairs                 |
//! | 130..=255 | palette of (value - 128) entries, then palette RLE    |
//!
//! Everything else (17..=127, 129) is a protocol error.
//!
//! # CPIXEL
//!
//! At 32 bpp (true colour, depth 24 or less) a pixel whose channels fit in
//! three bytes travels as three bytes. When the used bits are the low three
//! bytes of a little-endian pixel, or the high three of a big-endian one, the
//! three wire bytes are the first three bytes in memory (the "24A" layout). In the mirror cases
//! they are the last three (the "24B" layout). Any other 32 bpp format, and
//! all 8 and 16 bpp formats, send pixels whole.
//!
//! # Run Length
//!
//! `1 + sum(bytes)`, where every byte except the last is 255.

use crate::state::{inflate, max_compressed_len};
use crate::{
    dest_rect, Decoder, DecoderState, MutablePixelBuffer, PixelFormat, Rectangle, RfbInStream,
    ENCODING_ZRLE,
};
use anyhow::{anyhow, bail, Context, Result};
use rfb_common::Rect;
use tokio::io::AsyncRead;

/// ZRLE tile size.
pub const TILE_SIZE: u32 = 64;

/// Largest palette a tile can carry (palette RLE with 127 entries).
const MAX_PALETTE: usize = 127;

/// Upper bound on the inflated tile stream for `dest`. Plain RLE with runs
/// of one costs a pixel plus a length byte per pixel, which beats raw and
/// palette tiles; each tile adds a subencoding byte and at most a full
/// palette on top.
fn max_tile_stream_len(dest: Rect, bytes_per_pixel: usize) -> usize {
    let tiles = dest.tiles(TILE_SIZE, TILE_SIZE).count();
    tiles * (1 + MAX_PALETTE * bytes_per_pixel) + dest.area() as usize * (bytes_per_pixel + 1)
}

/// Decoder for ZRLE encoding. The zlib stream lives in [`DecoderState`].
pub struct ZRLEDecoder;

impl Decoder for ZRLEDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_ZRLE
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
        let bytes_per_pixel = pixel_format.bytes_per_pixel() as usize;
        let inflated_limit = max_tile_stream_len(dest, bytes_per_pixel);

        let compressed_len = stream
            .read_u32()
            .await
            .context("ZRLE: failed to read compressed data length")?;
        if compressed_len as usize > max_compressed_len(inflated_limit) {
            bail!("ZRLE: compressed length {} exceeds limit", compressed_len);
        }

        tracing::debug!(
            target: "rfb_encodings::framing",
            "ZRLE: rect=[{},{} {}x{}] compressed_len={} buffer={}",
            rect.x, rect.y, rect.width, rect.height,
            compressed_len,
            stream.available()
        );

        let compressed = stream
            .read_vec(compressed_len as usize)
            .await
            .context("ZRLE: failed to read compressed data")?;
        let decompressed = inflate(&mut state.zrle, &compressed, inflated_limit)
            .context("ZRLE: zlib decompression failed")?;

        let mut cursor = DataCursor::new(&decompressed);
        let mode = CPixelMode::detect(pixel_format);

        for tile in dest.tiles(TILE_SIZE, TILE_SIZE) {
            let pixels = decode_tile(&mut cursor, tile, bytes_per_pixel, mode).with_context(|| {
                format!(
                    "ZRLE: failed to decode {}x{} tile at ({}, {})",
                    tile.width, tile.height, tile.x, tile.y
                )
            })?;
            match pixels {
                TilePixels::Solid(pixel) => buffer.fill_rect(tile, &pixel)?,
                TilePixels::Image(data) => buffer.image_rect(tile, &data, 0)?,
            }
        }

        if cursor.remaining() > 0 {
            bail!(
                "ZRLE: {} inflated bytes left after the last tile",
                cursor.remaining()
            );
        }

        Ok(())
    }
}

enum TilePixels {
    Solid(Vec<u8>),
    Image(Vec<u8>),
}

fn decode_tile(
    cursor: &mut DataCursor,
    tile: Rect,
    bytes_per_pixel: usize,
    mode: CPixelMode,
) -> Result<TilePixels> {
    let subencoding = cursor
        .read_u8()
        .context("failed to read subencoding byte")?;
    let area = tile.area() as usize;
    let mut out = Vec::with_capacity(area * bytes_per_pixel);

    match subencoding {
        0 => {
            for _ in 0..area {
                mode.read(cursor, bytes_per_pixel, &mut out)?;
            }
        }
        1 => {
            mode.read(cursor, bytes_per_pixel, &mut out)?;
            return Ok(TilePixels::Solid(out));
        }
        2..=16 => {
            let palette = read_palette(cursor, subencoding as usize, bytes_per_pixel, mode)?;
            let bits = match subencoding {
                2 => 1,
                3..=4 => 2,
                _ => 4,
            };
            let width = tile.width as usize;
            let row_bytes = (width * bits).div_ceil(8);
            for _ in 0..tile.height {
                let row = cursor
                    .read_exact(row_bytes)
                    .context("failed to read packed palette row")?;
                for x in 0..width {
                    let bit = x * bits;
                    let shift = 8 - bits - bit % 8;
                    let index = ((row[bit / 8] >> shift) as usize) & ((1 << bits) - 1);
                    out.extend_from_slice(palette.entry(index)?);
                }
            }
        }
        128 => {
            while out.len() < area * bytes_per_pixel {
                let start = out.len();
                mode.read(cursor, bytes_per_pixel, &mut out)?;
                let run = read_rle_length(cursor)?;
                emit_run(&mut out, start, run, area, bytes_per_pixel)?;
            }
        }
        130..=255 => {
            let palette = read_palette(cursor, (subencoding - 128) as usize, bytes_per_pixel, mode)?;
            while out.len() < area * bytes_per_pixel {
                let code = cursor
                    .read_u8()
                    .context("failed to read palette RLE code")?;
                let start = out.len();
                out.extend_from_slice(palette.entry((code & 0x7F) as usize)?);
                let run = if code & 0x80 != 0 {
                    read_rle_length(cursor)?
                } else {
                    1
                };
                emit_run(&mut out, start, run, area, bytes_per_pixel)?;
            }
        }
        other => bail!("invalid subencoding {}", other),
    }

    Ok(TilePixels::Image(out))
}

/// Extend the pixel at `start` to a run of `run` pixels.
fn emit_run(
    out: &mut Vec<u8>,
    start: usize,
    run: usize,
    area: usize,
    bytes_per_pixel: usize,
) -> Result<()> {
    let done = start / bytes_per_pixel;
    if done + run > area {
        bail!(
            "run length {} exceeds the {} pixels left in the tile",
            run,
            area - done
        );
    }
    for _ in 1..run {
        out.extend_from_within(start..start + bytes_per_pixel);
    }
    Ok(())
}

/// Byte cursor over inflated tile data.
struct DataCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DataCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    fn read_exact(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            bail!(
                "inflated data exhausted: need {} bytes, have {}",
                count,
                self.remaining()
            );
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }
}

/// How a pixel is laid out in the inflated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CPixelMode {
    Full,
    /// Three wire bytes fill memory bytes 0..3.
    Low24,
    /// Three wire bytes fill memory bytes 1..4.
    High24,
}

impl CPixelMode {
    fn detect(pf: &PixelFormat) -> Self {
        if pf.bits_per_pixel != 32 || pf.depth > 24 || !pf.true_color {
            return Self::Full;
        }

        let channels = [
            (pf.red_max, pf.red_shift),
            (pf.green_max, pf.green_shift),
            (pf.blue_max, pf.blue_shift),
        ];
        let fits_ls3 = channels
            .iter()
            .all(|&(max, shift)| ((max as u64) << shift) < (1 << 24));
        let fits_ms3 = channels.iter().all(|&(_, shift)| shift > 7);

        if (fits_ls3 && !pf.big_endian) || (fits_ms3 && pf.big_endian) {
            Self::Low24
        } else if (fits_ls3 && pf.big_endian) || (fits_ms3 && !pf.big_endian) {
            Self::High24
        } else {
            Self::Full
        }
    }

    /// Read one pixel and append it to `out` in the session's byte layout.
    fn read(self, cursor: &mut DataCursor, bytes_per_pixel: usize, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Full => out.extend_from_slice(cursor.read_exact(bytes_per_pixel)?),
            Self::Low24 => {
                out.extend_from_slice(cursor.read_exact(3)?);
                out.push(0);
            }
            Self::High24 => {
                out.push(0);
                out.extend_from_slice(cursor.read_exact(3)?);
            }
        }
        Ok(())
    }
}

struct Palette {
    pixels: Vec<u8>,
    bytes_per_pixel: usize,
}

impl Palette {
    fn len(&self) -> usize {
        self.pixels.len() / self.bytes_per_pixel
    }

    fn entry(&self, index: usize) -> Result<&[u8]> {
        if index >= self.len() {
            return Err(anyhow!(
                "palette index {} out of range (palette size {})",
                index,
                self.len()
            ));
        }
        let start = index * self.bytes_per_pixel;
        Ok(&self.pixels[start..start + self.bytes_per_pixel])
    }
}

fn read_palette(
    cursor: &mut DataCursor,
    size: usize,
    bytes_per_pixel: usize,
    mode: CPixelMode,
) -> Result<Palette> {
    let mut pixels = Vec::with_capacity(size * bytes_per_pixel);
    for _ in 0..size {
        mode.read(cursor, bytes_per_pixel, &mut pixels)
            .context("failed to read palette")?;
    }
    Ok(Palette {
        pixels,
        bytes_per_pixel,
    })
}

/// Read a run length: 1 plus every byte up to and including the first that
/// is not 255.
fn read_rle_length(cursor: &mut DataCursor) -> Result<usize> {
    let mut length = 1usize;
    loop {
        let byte = cursor.read_u8().context("failed to read run length")?;
        length += byte as usize;
        if byte != 255 {
            return Ok(length);
        }
    }
}
