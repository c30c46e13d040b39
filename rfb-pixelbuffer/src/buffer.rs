//! Pixel buffer traits used by the decoders.
//!
//! - [`PixelBuffer`]: dimensions, input format and read access
//! - [`MutablePixelBuffer`]: the three drawing primitives every decoder is
//!   built from
//!
//! Pixel slices passed to these traits are in the buffer's
//! [`pixel_format`](PixelBuffer::pixel_format), which is the format
//! negotiated with the server. Implementations convert to whatever they
//! store internally.
//!
//! # Stride
//!
//! Strides are measured in **pixels**, not bytes:
//!
//! ```text
//! byte_offset = (y * stride + x) * bytes_per_pixel
//! ```
//!
//! A stride of 0 means "tightly packed" (stride == rectangle width).

use crate::PixelFormat;
use anyhow::Result;
use rfb_common::{Point, Rect};

pub trait PixelBuffer {
    /// `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Format of pixel slices accepted and returned by this buffer.
    fn pixel_format(&self) -> &PixelFormat;

    /// Read `rect` as tightly packed pixels in [`pixel_format`](Self::pixel_format).
    fn read_rect(&self, rect: Rect) -> Result<Vec<u8>>;

    /// Whether any drawing primitive has touched the buffer yet.
    fn ever_written(&self) -> bool;
}

pub trait MutablePixelBuffer: PixelBuffer {
    /// Fill `rect` with a single pixel.
    fn fill_rect(&mut self, rect: Rect, pixel: &[u8]) -> Result<()>;

    /// Copy the area at `dest + src_offset` onto `dest`. Overlapping source
    /// and destination are handled.
    fn copy_rect(&mut self, dest: Rect, src_offset: Point) -> Result<()>;

    /// Blit `pixels` (row stride `stride` pixels, 0 = packed) into `dest`.
    fn image_rect(&mut self, dest: Rect, pixels: &[u8], stride: usize) -> Result<()>;
}
