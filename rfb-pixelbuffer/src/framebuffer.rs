//! The capture raster.
//!
//! [`FrameBuffer`] stores every pixel as four bytes `R, G, B, 0` regardless
//! of the negotiated wire format. Pixels arriving through the
//! [`MutablePixelBuffer`] primitives are converted from the buffer's input
//! format; the conversion is a straight copy when the input format is
//! already [`PixelFormat::rgbx`].
//!
//! Two sticky flags are maintained on every write:
//! - *written*: set by the first write of any kind
//! - *blank*: starts true and is cleared by the first non-black pixel
//!
//! Neither flag is ever reset.

use crate::buffer::{MutablePixelBuffer, PixelBuffer};
use crate::PixelFormat;
use anyhow::{anyhow, Result};
use rfb_common::{Point, Rect};

/// Bytes per stored pixel.
pub const INTERNAL_BPP: usize = 4;

#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    /// Format of pixels handed to the drawing primitives.
    input_format: PixelFormat,
    /// Row-major RGBX, no padding.
    data: Vec<u8>,
    written: bool,
    blank: bool,
}

impl FrameBuffer {
    /// Allocate a zeroed (black) raster. Pixels passed to the drawing
    /// primitives are expected in `input_format`.
    pub fn new(width: u32, height: u32, input_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            input_format,
            data: vec![0u8; width as usize * height as usize * INTERNAL_BPP],
            written: false,
            blank: true,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The whole raster as a rectangle at the origin.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Raw RGBX storage.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True until a non-black pixel has been written.
    pub fn is_blank(&self) -> bool {
        self.blank
    }

    fn validate_rect(&self, rect: Rect) -> Result<()> {
        if rect.x < 0 || rect.y < 0 || !self.bounds().contains_rect(&rect) {
            return Err(anyhow!(
                "rectangle out of bounds: {:?} (buffer size: {}x{})",
                rect,
                self.width,
                self.height
            ));
        }
        Ok(())
    }

    fn offset(&self, x: i32, y: i32) -> usize {
        (y as usize * self.width as usize + x as usize) * INTERNAL_BPP
    }

    fn note_written<'a>(&mut self, pixels: impl IntoIterator<Item = &'a [u8]>) {
        self.written = true;
        if self.blank {
            self.blank = pixels.into_iter().all(|p| p[..3] == [0, 0, 0]);
        }
    }

    /// Write tightly packed RGBX pixels into `rect`.
    pub fn write_internal(&mut self, rect: Rect, rgbx: &[u8]) -> Result<()> {
        self.validate_rect(rect)?;
        let row_bytes = rect.width as usize * INTERNAL_BPP;
        if rgbx.len() < row_bytes * rect.height as usize {
            return Err(anyhow!(
                "insufficient pixel data: got {} bytes for {}x{} rectangle",
                rgbx.len(),
                rect.width,
                rect.height
            ));
        }
        if rect.is_empty() {
            return Ok(());
        }

        for (row, src) in rgbx.chunks_exact(row_bytes).take(rect.height as usize).enumerate() {
            let start = self.offset(rect.x, rect.y + row as i32);
            self.data[start..start + row_bytes].copy_from_slice(src);
        }
        self.note_written(rgbx[..row_bytes * rect.height as usize].chunks_exact(INTERNAL_BPP));
        Ok(())
    }

    /// Read `rect` as tightly packed RGBX pixels.
    pub fn read_internal(&self, rect: Rect) -> Result<Vec<u8>> {
        self.validate_rect(rect)?;
        let row_bytes = rect.width as usize * INTERNAL_BPP;
        let mut out = Vec::with_capacity(row_bytes * rect.height as usize);
        for row in 0..rect.height as i32 {
            let start = self.offset(rect.x, rect.y + row);
            out.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Ok(out)
    }

    /// Copy `rect` out as packed 3-byte RGB, ready for an image encoder.
    pub fn crop_rgb(&self, rect: Rect) -> Result<Vec<u8>> {
        self.validate_rect(rect)?;
        let mut out = Vec::with_capacity(rect.area() as usize * 3);
        for row in 0..rect.height as i32 {
            let start = self.offset(rect.x, rect.y + row);
            let end = start + rect.width as usize * INTERNAL_BPP;
            for pixel in self.data[start..end].chunks_exact(INTERNAL_BPP) {
                out.extend_from_slice(&pixel[..3]);
            }
        }
        Ok(out)
    }

    fn to_internal(&self, pixel: &[u8]) -> [u8; INTERNAL_BPP] {
        if self.input_format.is_rgbx() {
            [pixel[0], pixel[1], pixel[2], 0]
        } else {
            let [r, g, b] = self.input_format.to_rgb888(pixel);
            [r, g, b, 0]
        }
    }

    fn input_bpp(&self) -> usize {
        self.input_format.bytes_per_pixel() as usize
    }
}

impl PixelBuffer for FrameBuffer {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn pixel_format(&self) -> &PixelFormat {
        &self.input_format
    }

    fn read_rect(&self, rect: Rect) -> Result<Vec<u8>> {
        let internal = self.read_internal(rect)?;
        if self.input_format.is_rgbx() {
            return Ok(internal);
        }
        let bpp = self.input_bpp();
        let mut out = vec![0u8; rect.area() as usize * bpp];
        for (src, dst) in internal.chunks_exact(INTERNAL_BPP).zip(out.chunks_exact_mut(bpp)) {
            let value = self.input_format.rgb_to_value([src[0], src[1], src[2]]);
            self.input_format.write_pixel(value, dst);
        }
        Ok(out)
    }

    fn ever_written(&self) -> bool {
        self.written
    }
}

impl MutablePixelBuffer for FrameBuffer {
    fn fill_rect(&mut self, rect: Rect, pixel: &[u8]) -> Result<()> {
        self.validate_rect(rect)?;
        let bpp = self.input_bpp();
        if pixel.len() != bpp {
            return Err(anyhow!(
                "invalid pixel size: got {} bytes, expected {}",
                pixel.len(),
                bpp
            ));
        }

        let internal = self.to_internal(pixel);
        for row in 0..rect.height as i32 {
            let start = self.offset(rect.x, rect.y + row);
            let end = start + rect.width as usize * INTERNAL_BPP;
            for dst in self.data[start..end].chunks_exact_mut(INTERNAL_BPP) {
                dst.copy_from_slice(&internal);
            }
        }
        self.note_written([&internal[..]]);
        Ok(())
    }

    fn copy_rect(&mut self, dest: Rect, src_offset: Point) -> Result<()> {
        self.validate_rect(dest)?;
        let src = Rect::new(
            dest.x + src_offset.x,
            dest.y + src_offset.y,
            dest.width,
            dest.height,
        );
        self.validate_rect(src)?;

        let row_bytes = dest.width as usize * INTERNAL_BPP;
        let copy_row = |fb: &mut Self, row: i32| {
            let from = fb.offset(src.x, src.y + row);
            let to = fb.offset(dest.x, dest.y + row);
            fb.data.copy_within(from..from + row_bytes, to);
        };

        // Walk rows away from the destination so overlapping rows are read
        // before they are overwritten.
        if src_offset.y < 0 {
            for row in (0..dest.height as i32).rev() {
                copy_row(self, row);
            }
        } else {
            for row in 0..dest.height as i32 {
                copy_row(self, row);
            }
        }

        let copied = self.read_internal(dest)?;
        self.note_written(copied.chunks_exact(INTERNAL_BPP));
        Ok(())
    }

    fn image_rect(&mut self, dest: Rect, pixels: &[u8], stride: usize) -> Result<()> {
        self.validate_rect(dest)?;
        let bpp = self.input_bpp();
        let src_stride = if stride == 0 {
            dest.width as usize
        } else {
            stride
        };
        let row_bytes = dest.width as usize * bpp;

        if dest.is_empty() {
            return Ok(());
        }
        let required = src_stride * bpp * (dest.height as usize - 1) + row_bytes;
        if pixels.len() < required {
            return Err(anyhow!(
                "insufficient source data: got {} bytes, need at least {}",
                pixels.len(),
                required
            ));
        }

        let mut converted = Vec::with_capacity(dest.area() as usize * INTERNAL_BPP);
        for row in 0..dest.height as usize {
            let src = &pixels[row * src_stride * bpp..row * src_stride * bpp + row_bytes];
            if self.input_format.is_rgbx() {
                converted.extend_from_slice(src);
            } else {
                for pixel in src.chunks_exact(bpp) {
                    converted.extend_from_slice(&self.to_internal(pixel));
                }
            }
        }
        if self.input_format.is_rgbx() {
            for pixel in converted.chunks_exact_mut(INTERNAL_BPP) {
                pixel[3] = 0;
            }
        }
        self.write_internal(dest, &converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::{bgr233, rgb565_be};

    fn rgbx_fb(w: u32, h: u32) -> FrameBuffer {
        FrameBuffer::new(w, h, PixelFormat::rgbx())
    }

    #[test]
    fn test_new_buffer_is_blank_and_unwritten() {
        let fb = rgbx_fb(4, 3);
        assert_eq!(fb.data().len(), 4 * 3 * 4);
        assert!(fb.is_blank());
        assert!(!fb.ever_written());
    }

    #[test]
    fn test_black_write_sets_written_but_keeps_blank() {
        let mut fb = rgbx_fb(4, 4);
        fb.fill_rect(Rect::new(0, 0, 4, 4), &[0, 0, 0, 0]).unwrap();
        assert!(fb.ever_written());
        assert!(fb.is_blank());

        fb.fill_rect(Rect::new(1, 1, 1, 1), &[0, 0, 1, 0]).unwrap();
        assert!(!fb.is_blank());

        // Blank never comes back.
        fb.fill_rect(Rect::new(0, 0, 4, 4), &[0, 0, 0, 0]).unwrap();
        assert!(!fb.is_blank());
    }

    #[test]
    fn test_unused_byte_does_not_affect_blank() {
        let mut fb = rgbx_fb(2, 1);
        fb.image_rect(Rect::new(0, 0, 2, 1), &[0, 0, 0, 9, 0, 0, 0, 7], 0)
            .unwrap();
        assert!(fb.is_blank());
        assert_eq!(fb.data(), &[0; 8]);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut fb = rgbx_fb(15, 2);
        assert!(fb.fill_rect(Rect::new(10, 0, 10, 1), &[1, 1, 1, 0]).is_err());
        assert!(fb.fill_rect(Rect::new(5, 0, 10, 1), &[1, 1, 1, 0]).is_ok());
        assert!(fb.fill_rect(Rect::new(-1, 0, 1, 1), &[1, 1, 1, 0]).is_err());
    }

    #[test]
    fn test_image_rect_with_stride() {
        let mut fb = rgbx_fb(4, 4);
        let mut pixels = Vec::new();
        for i in 0..6u8 {
            pixels.extend_from_slice(&[i, i, i, 0]);
        }
        // 2x2 image out of a 3-pixel-wide source.
        fb.image_rect(Rect::new(1, 1, 2, 2), &pixels, 3).unwrap();

        let out = fb.read_internal(Rect::new(1, 1, 2, 2)).unwrap();
        assert_eq!(out, vec![0, 0, 0, 0, 1, 1, 1, 0, 3, 3, 3, 0, 4, 4, 4, 0]);
    }

    #[test]
    fn test_conversion_from_16bpp() {
        let mut fb = FrameBuffer::new(2, 1, rgb565_be());
        fb.image_rect(Rect::new(0, 0, 2, 1), &[0xF8, 0x00, 0x00, 0x1F], 0)
            .unwrap();
        assert_eq!(fb.crop_rgb(fb.bounds()).unwrap(), vec![255, 0, 0, 0, 0, 255]);

        assert_eq!(
            fb.read_rect(fb.bounds()).unwrap(),
            vec![0xF8, 0x00, 0x00, 0x1F]
        );
    }

    #[test]
    fn test_fill_from_8bpp() {
        let mut fb = FrameBuffer::new(1, 1, bgr233());
        fb.fill_rect(Rect::new(0, 0, 1, 1), &[0b00_111_000]).unwrap();
        assert_eq!(fb.crop_rgb(fb.bounds()).unwrap(), vec![0, 255, 0]);
    }

    #[test]
    fn test_copy_rect_overlapping_down() {
        let mut fb = rgbx_fb(1, 4);
        for y in 0..4 {
            fb.fill_rect(Rect::new(0, y, 1, 1), &[y as u8 + 1, 0, 0, 0])
                .unwrap();
        }
        // Move rows 0..3 down by one.
        fb.copy_rect(Rect::new(0, 1, 1, 3), Point::new(0, -1)).unwrap();

        let reds: Vec<u8> = fb.crop_rgb(fb.bounds()).unwrap().chunks(3).map(|p| p[0]).collect();
        assert_eq!(reds, vec![1, 1, 2, 3]);
    }

    #[test]
    fn test_copy_rect_overlapping_up() {
        let mut fb = rgbx_fb(1, 4);
        for y in 0..4 {
            fb.fill_rect(Rect::new(0, y, 1, 1), &[y as u8 + 1, 0, 0, 0])
                .unwrap();
        }
        fb.copy_rect(Rect::new(0, 0, 1, 3), Point::new(0, 1)).unwrap();

        let reds: Vec<u8> = fb.crop_rgb(fb.bounds()).unwrap().chunks(3).map(|p| p[0]).collect();
        assert_eq!(reds, vec![2, 3, 4, 4]);
    }

    #[test]
    fn test_copy_rect_source_out_of_bounds() {
        let mut fb = rgbx_fb(4, 4);
        assert!(fb.copy_rect(Rect::new(0, 0, 2, 2), Point::new(3, 0)).is_err());
    }

    #[test]
    fn test_crop_rgb_drops_unused_byte() {
        let mut fb = rgbx_fb(3, 2);
        fb.fill_rect(Rect::new(1, 0, 2, 2), &[10, 20, 30, 0]).unwrap();
        let crop = fb.crop_rgb(Rect::new(1, 1, 2, 1)).unwrap();
        assert_eq!(crop, vec![10, 20, 30, 10, 20, 30]);
    }
}
