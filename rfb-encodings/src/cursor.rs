//! Cursor shape pseudo-encodings (XCursor and RichCursor).
//!
//! For both, the rectangle header carries the hotspot in `x`/`y` and the
//! cursor size in `width`/`height`.
//!
//! ```text
//! XCursor:    fore R,G,B | back R,G,B | bitmap | mask
//! RichCursor: width * height pixels in the session format | mask
//! ```
//!
//! Bitmap and mask are 1 bit per pixel, MSB first, rows padded to a byte. In
//! the XCursor bitmap a set bit selects the foreground colour.

use crate::{PixelFormat, RfbInStream, PSEUDO_ENCODING_RICH_CURSOR, PSEUDO_ENCODING_X_CURSOR};
use anyhow::{Context, Result};
use rfb_pixelbuffer::CursorShape;
use tokio::io::AsyncRead;

/// Which cursor pseudo-encoding a rectangle used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    X,
    Rich,
}

impl CursorKind {
    pub fn from_encoding(encoding: i32) -> Option<Self> {
        match encoding {
            PSEUDO_ENCODING_X_CURSOR => Some(Self::X),
            PSEUDO_ENCODING_RICH_CURSOR => Some(Self::Rich),
            _ => None,
        }
    }
}

/// Read a cursor shape payload and convert it to RGBX pixels with a
/// byte-per-pixel mask.
///
/// A zero-sized cursor has no payload and yields an empty shape.
pub async fn read_cursor_shape<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    kind: CursorKind,
    hot_x: u16,
    hot_y: u16,
    width: u16,
    height: u16,
    pixel_format: &PixelFormat,
) -> Result<CursorShape> {
    let count = width as usize * height as usize;
    let bitmap_len = (width as usize).div_ceil(8) * height as usize;

    let mut pixels = Vec::with_capacity(count * 4);
    if count > 0 {
        match kind {
            CursorKind::X => {
                let colours = stream
                    .read_vec(6)
                    .await
                    .context("Failed to read XCursor colours")?;
                // Round both colours through the session format like any other pixel.
                let fore = quantize(pixel_format, [colours[0], colours[1], colours[2]]);
                let back = quantize(pixel_format, [colours[3], colours[4], colours[5]]);
                let bitmap = stream
                    .read_vec(bitmap_len)
                    .await
                    .context("Failed to read XCursor bitmap")?;
                for bit in expand_bitmap(&bitmap, width, height) {
                    let rgb = if bit != 0 { fore } else { back };
                    pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 0]);
                }
            }
            CursorKind::Rich => {
                let bpp = pixel_format.bytes_per_pixel() as usize;
                let raw = stream
                    .read_vec(count * bpp)
                    .await
                    .context("Failed to read RichCursor pixels")?;
                for px in raw.chunks_exact(bpp) {
                    let rgb = pixel_format.to_rgb888(px);
                    pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 0]);
                }
            }
        }
    }

    let mask = if count > 0 {
        let bits = stream
            .read_vec(bitmap_len)
            .await
            .context("Failed to read cursor mask")?;
        expand_bitmap(&bits, width, height)
    } else {
        Vec::new()
    };

    tracing::debug!(
        "Cursor shape {:?}: {}x{} hotspot ({}, {})",
        kind,
        width,
        height,
        hot_x,
        hot_y
    );

    Ok(CursorShape {
        hot_x: hot_x as i32,
        hot_y: hot_y as i32,
        width: width as u32,
        height: height as u32,
        pixels,
        mask,
    })
}

fn quantize(pixel_format: &PixelFormat, rgb: [u8; 3]) -> [u8; 3] {
    pixel_format.value_to_rgb(pixel_format.rgb_to_value(rgb))
}

/// One byte (0 or 1) per pixel from an MSB-first, row-padded bitmap.
fn expand_bitmap(bits: &[u8], width: u16, height: u16) -> Vec<u8> {
    let row_bytes = (width as usize).div_ceil(8);
    let mut out = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height as usize {
        let row = &bits[y * row_bytes..(y + 1) * row_bytes];
        out.extend((0..width as usize).map(|x| (row[x / 8] >> (7 - x % 8)) & 1));
    }
    out
}
