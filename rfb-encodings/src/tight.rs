//! Tight encoding decoder - fill, JPEG and filtered zlib payloads.
//!
//! Tight (type 7) starts every rectangle with a compression control byte:
//!
//! ```text
//!   bit 7..4  kind: 0x8 = fill, 0x9 = JPEG, 0x0..0x7 = basic
//!   bit 3..0  reset zlib stream 3..0 before decoding
//! ```
//!
//! For basic rectangles the kind nibble is further split: bits 4-5 select one
//! of four zlib streams and bit 6 says an explicit filter id byte follows.
//!
//! # Payloads
//!
//! - **Fill**: one TPIXEL; the rectangle is a single colour.
//! - **JPEG**: compact length, then a JFIF image exactly the rectangle's size.
//! - **Basic**: optional filter id, filter parameters, then pixel data. Data
//!   shorter than 12 bytes is sent as is; longer data is a compact length
//!   followed by zlib data from the selected stream.
//!
//! # Filters
//!
//! - **Copy**: TPIXELs in scanline order.
//! - **Palette**: count-1 byte and that many TPIXELs, then indices: packed
//!   1 bit per pixel (rows byte-aligned) for two colours, otherwise one byte.
//! - **Gradient**: per-channel residuals against the prediction
//!   `clamp(left + above - above_left, 0, max)`.
//!
//! # TPIXEL
//!
//! When the session format is 32 bpp, depth 24 with every channel max 255, a
//! pixel is sent as three bytes R, G, B. Otherwise it is sent in the session
//! format.
//!
//! # Compact Length
//!
//! One to three bytes, seven bits at a time, least significant group first;
//! the high bit of the first two bytes means another byte follows and the
//! third byte contributes all eight bits.

use crate::state::{inflate_exact, max_compressed_len};
use crate::{
    dest_rect, Decoder, DecoderState, MutablePixelBuffer, PixelFormat, Rectangle, RfbInStream,
    ENCODING_TIGHT,
};
use anyhow::{anyhow, bail, Context, Result};
use std::io::Cursor;
use tokio::io::AsyncRead;

const TIGHT_FILL: u8 = 0x08;
const TIGHT_JPEG: u8 = 0x09;
const TIGHT_MAX_SUBENCODING: u8 = 0x09;
const TIGHT_EXPLICIT_FILTER: u8 = 0x04;

const TIGHT_FILTER_COPY: u8 = 0x00;
const TIGHT_FILTER_PALETTE: u8 = 0x01;
const TIGHT_FILTER_GRADIENT: u8 = 0x02;

/// Widest rectangle a basic Tight payload may cover.
pub const TIGHT_MAX_WIDTH: u16 = 2048;

/// Data shorter than this is sent without compression.
pub const TIGHT_MIN_TO_COMPRESS: usize = 12;

/// Decoder for Tight encoding. The four zlib streams live in [`DecoderState`].
pub struct TightDecoder;

impl Decoder for TightDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_TIGHT
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
            "Tight decode start: rect=[{},{} {}x{}] buffer_before={}",
            rect.x, rect.y, rect.width, rect.height,
            buffer_before
        );

        let comp_ctl = stream.read_u8().await.with_context(|| {
            format!(
                "Failed to read Tight compression control at ({}, {})",
                rect.x, rect.y
            )
        })?;
        state.reset_tight_streams(comp_ctl & 0x0F);

        let comp_type = comp_ctl >> 4;
        let tpixels = TightPixels::new(pixel_format);

        match comp_type {
            TIGHT_FILL => {
                let mut raw = vec![0u8; tpixels.size()];
                stream
                    .read_bytes(&mut raw)
                    .await
                    .context("Failed to read Tight fill colour")?;
                buffer
                    .fill_rect(dest_rect(rect), &tpixels.to_native(&raw))
                    .context("Failed to fill Tight rectangle")?;
            }
            TIGHT_JPEG => decode_jpeg(stream, rect, pixel_format, buffer).await?,
            t if t > TIGHT_MAX_SUBENCODING => {
                bail!("Tight: invalid compression type {:#x}", t);
            }
            _ => decode_basic(stream, comp_ctl, rect, &tpixels, buffer, state).await?,
        }

        let buffer_after = stream.available();
        tracing::debug!(
            target: "rfb_encodings::framing",
            "Tight decode end: kind={:#x} bytes_consumed={}, buffer_after={}",
            comp_type,
            buffer_before.saturating_sub(buffer_after),
            buffer_after
        );

        Ok(())
    }
}

/// How pixel values travel in Tight payloads for one session format.
#[derive(Debug, Clone, Copy)]
struct TightPixels {
    format: PixelFormat,
    compact: bool,
}

impl TightPixels {
    fn new(format: &PixelFormat) -> Self {
        let compact = format.bits_per_pixel == 32
            && format.depth == 24
            && format.red_max == 255
            && format.green_max == 255
            && format.blue_max == 255;
        Self {
            format: *format,
            compact,
        }
    }

    fn size(&self) -> usize {
        if self.compact {
            3
        } else {
            self.format.bytes_per_pixel() as usize
        }
    }

    fn components(&self, bytes: &[u8]) -> [u16; 3] {
        if self.compact {
            [bytes[0] as u16, bytes[1] as u16, bytes[2] as u16]
        } else {
            self.format.components(self.format.read_pixel(bytes))
        }
    }

    fn maxes(&self) -> [u16; 3] {
        [
            self.format.red_max,
            self.format.green_max,
            self.format.blue_max,
        ]
    }

    fn pack_native(&self, components: [u16; 3], out: &mut [u8]) {
        self.format.write_pixel(self.format.pack(components), out);
    }

    /// Convert a run of TPIXELs to session-format pixels.
    fn to_native(&self, data: &[u8]) -> Vec<u8> {
        if !self.compact {
            return data.to_vec();
        }
        let bpp = self.format.bytes_per_pixel() as usize;
        let mut out = vec![0u8; data.len() / 3 * bpp];
        for (src, dst) in data.chunks_exact(3).zip(out.chunks_exact_mut(bpp)) {
            self.pack_native(self.components(src), dst);
        }
        out
    }
}

/// Read a Tight compact length value (1-3 bytes).
pub(crate) async fn read_compact_length<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
) -> Result<usize> {
    let b0 = stream
        .read_u8()
        .await
        .context("Failed to read compact length byte 0")?;
    let mut length = (b0 & 0x7F) as usize;
    if b0 & 0x80 == 0 {
        return Ok(length);
    }

    let b1 = stream
        .read_u8()
        .await
        .context("Failed to read compact length byte 1")?;
    length |= ((b1 & 0x7F) as usize) << 7;
    if b1 & 0x80 == 0 {
        return Ok(length);
    }

    let b2 = stream
        .read_u8()
        .await
        .context("Failed to read compact length byte 2")?;
    Ok(length | (b2 as usize) << 14)
}

async fn decode_jpeg<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    pixel_format: &PixelFormat,
    buffer: &mut dyn MutablePixelBuffer,
) -> Result<()> {
    let jpeg_len = read_compact_length(stream).await?;
    let jpeg_data = stream
        .read_vec(jpeg_len)
        .await
        .with_context(|| format!("Failed to read {} bytes of Tight JPEG data", jpeg_len))?;

    let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(&jpeg_data));
    let pixels = decoder.decode().context("Tight: JPEG decoding failed")?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("Tight: JPEG decoder returned no image info"))?;

    if info.width != rect.width || info.height != rect.height {
        bail!(
            "Tight: JPEG is {}x{} but the rectangle is {}x{}",
            info.width,
            info.height,
            rect.width,
            rect.height
        );
    }

    let channels = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => 3,
        jpeg_decoder::PixelFormat::L8 => 1,
        other => bail!("Tight: unsupported JPEG pixel format {:?}", other),
    };

    let bpp = pixel_format.bytes_per_pixel() as usize;
    let mut converted = vec![0u8; pixels.len() / channels * bpp];
    for (src, dst) in pixels
        .chunks_exact(channels)
        .zip(converted.chunks_exact_mut(bpp))
    {
        let rgb = if channels == 3 {
            [src[0], src[1], src[2]]
        } else {
            [src[0]; 3]
        };
        pixel_format.write_pixel(pixel_format.rgb_to_value(rgb), dst);
    }

    buffer
        .image_rect(dest_rect(rect), &converted, 0)
        .context("Failed to write Tight JPEG pixels")
}

async fn decode_basic<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    comp_ctl: u8,
    rect: &Rectangle,
    tpixels: &TightPixels,
    buffer: &mut dyn MutablePixelBuffer,
    state: &mut DecoderState,
) -> Result<()> {
    if rect.width > TIGHT_MAX_WIDTH {
        bail!(
            "Tight: rectangle too wide ({} > {} max)",
            rect.width,
            TIGHT_MAX_WIDTH
        );
    }

    let slot = ((comp_ctl >> 4) & 0x03) as usize;
    let filter = if (comp_ctl >> 4) & TIGHT_EXPLICIT_FILTER != 0 {
        stream
            .read_u8()
            .await
            .context("Failed to read Tight filter id")?
    } else {
        TIGHT_FILTER_COPY
    };

    let width = rect.width as usize;
    let height = rect.height as usize;
    let dest = dest_rect(rect);

    match filter {
        TIGHT_FILTER_COPY => {
            let data = read_data(stream, state, slot, width * height * tpixels.size()).await?;
            buffer.image_rect(dest, &tpixels.to_native(&data), 0)?;
        }
        TIGHT_FILTER_PALETTE => {
            let count = stream
                .read_u8()
                .await
                .context("Failed to read Tight palette size")? as usize
                + 1;
            let entries = stream
                .read_vec(count * tpixels.size())
                .await
                .context("Failed to read Tight palette")?;
            let palette = tpixels.to_native(&entries);

            let data_size = if count == 2 {
                width.div_ceil(8) * height
            } else {
                width * height
            };
            let indices = read_data(stream, state, slot, data_size).await?;
            let bpp = tpixels.format.bytes_per_pixel() as usize;
            let pixels = expand_palette(&indices, &palette, count, width, height, bpp)?;
            buffer.image_rect(dest, &pixels, 0)?;
        }
        TIGHT_FILTER_GRADIENT => {
            let data = read_data(stream, state, slot, width * height * tpixels.size()).await?;
            let residuals: Vec<[u16; 3]> = data
                .chunks_exact(tpixels.size())
                .map(|px| tpixels.components(px))
                .collect();
            let values = gradient_decode(&residuals, width, tpixels.maxes());

            let bpp = tpixels.format.bytes_per_pixel() as usize;
            let mut pixels = vec![0u8; values.len() * bpp];
            for (value, dst) in values.iter().zip(pixels.chunks_exact_mut(bpp)) {
                tpixels.pack_native(*value, dst);
            }
            buffer.image_rect(dest, &pixels, 0)?;
        }
        other => bail!("Tight: unknown filter id {}", other),
    }

    tracing::trace!(
        target: "rfb_encodings::framing",
        "Tight basic: slot={} filter={} rect=[{},{} {}x{}]",
        slot, filter, rect.x, rect.y, rect.width, rect.height
    );

    Ok(())
}

/// Read `size` bytes of filter output, inflating through stream `slot` when
/// the payload is large enough to have been compressed.
async fn read_data<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    state: &mut DecoderState,
    slot: usize,
    size: usize,
) -> Result<Vec<u8>> {
    if size < TIGHT_MIN_TO_COMPRESS {
        return stream
            .read_vec(size)
            .await
            .context("Failed to read uncompressed Tight data");
    }

    let compressed_len = read_compact_length(stream).await?;
    if compressed_len > max_compressed_len(size) {
        bail!("Tight: compressed length {} exceeds limit", compressed_len);
    }
    let compressed = stream
        .read_vec(compressed_len)
        .await
        .with_context(|| format!("Failed to read {} bytes of Tight zlib data", compressed_len))?;
    inflate_exact(&mut state.tight[slot], &compressed, size)
        .with_context(|| format!("Tight: zlib stream {} failed", slot))
}

fn expand_palette(
    indices: &[u8],
    palette: &[u8],
    count: usize,
    width: usize,
    height: usize,
    bpp: usize,
) -> Result<Vec<u8>> {
    let mut pixels = vec![0u8; width * height * bpp];
    let row_bytes = width.div_ceil(8);

    for y in 0..height {
        for x in 0..width {
            let index = if count == 2 {
                ((indices[y * row_bytes + x / 8] >> (7 - x % 8)) & 1) as usize
            } else {
                indices[y * width + x] as usize
            };
            if index >= count {
                bail!(
                    "Tight: palette index {} out of range (palette size {})",
                    index,
                    count
                );
            }
            let dst = (y * width + x) * bpp;
            pixels[dst..dst + bpp].copy_from_slice(&palette[index * bpp..(index + 1) * bpp]);
        }
    }

    Ok(pixels)
}

/// Undo the gradient filter.
///
/// Each channel is predicted from its left, above and above-left neighbours
/// (zero outside the rectangle), clamped to `0..=max`, and the residual is
/// added modulo `max + 1`.
pub fn gradient_decode(residuals: &[[u16; 3]], width: usize, maxes: [u16; 3]) -> Vec<[u16; 3]> {
    let mut out: Vec<[u16; 3]> = Vec::with_capacity(residuals.len());
    for (i, residual) in residuals.iter().enumerate() {
        let (x, y) = (i % width, i / width);
        let mut value = [0u16; 3];
        for c in 0..3 {
            let predicted = gradient_predict(&out, width, x, y, c, maxes[c]);
            value[c] = (predicted.wrapping_add(residual[c])) & maxes[c];
        }
        out.push(value);
    }
    out
}

fn gradient_predict(
    decoded: &[[u16; 3]],
    width: usize,
    x: usize,
    y: usize,
    channel: usize,
    max: u16,
) -> u16 {
    let at = |x: usize, y: usize| decoded[y * width + x][channel] as i32;
    let left = if x > 0 { at(x - 1, y) } else { 0 };
    let above = if y > 0 { at(x, y - 1) } else { 0 };
    let above_left = if x > 0 && y > 0 { at(x - 1, y - 1) } else { 0 };
    (left + above - above_left).clamp(0, max as i32) as u16
}
