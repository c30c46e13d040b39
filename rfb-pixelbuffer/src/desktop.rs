//! Frame buffer plus cursor overlay, as seen by the decoders.

use crate::buffer::{MutablePixelBuffer, PixelBuffer};
use crate::cursor::{CursorShape, SoftCursor};
use crate::framebuffer::FrameBuffer;
use crate::PixelFormat;
use anyhow::Result;
use rfb_common::{Point, Rect};

/// The session's raster and soft cursor.
///
/// Decoders draw through the [`MutablePixelBuffer`] impl. A copy keeps the
/// cursor out of its source area, so a CopyRect never duplicates the cursor
/// image.
#[derive(Debug, Clone)]
pub struct Desktop {
    framebuffer: FrameBuffer,
    cursor: SoftCursor,
}

impl Desktop {
    pub fn new(width: u32, height: u32, input_format: PixelFormat, draw_cursor: bool) -> Self {
        Self {
            framebuffer: FrameBuffer::new(width, height, input_format),
            cursor: SoftCursor::new(draw_cursor),
        }
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    pub fn cursor(&self) -> &SoftCursor {
        &self.cursor
    }

    pub fn set_cursor_shape(&mut self, shape: CursorShape) -> Result<()> {
        self.cursor.set_shape(&mut self.framebuffer, shape)
    }

    /// Move the cursor hotspot, clamping to the frame buffer.
    pub fn move_cursor(&mut self, x: u16, y: u16) -> Result<()> {
        let x = (x as u32).min(self.framebuffer.width().saturating_sub(1)) as i32;
        let y = (y as u32).min(self.framebuffer.height().saturating_sub(1)) as i32;
        self.cursor.move_to(&mut self.framebuffer, x, y)
    }

    pub fn lock_area(&mut self, rect: Rect) -> Result<()> {
        self.cursor.lock_area(&mut self.framebuffer, rect)
    }

    pub fn unlock(&mut self) -> Result<()> {
        self.cursor.unlock(&mut self.framebuffer)
    }
}

impl PixelBuffer for Desktop {
    fn dimensions(&self) -> (u32, u32) {
        self.framebuffer.dimensions()
    }

    fn pixel_format(&self) -> &PixelFormat {
        self.framebuffer.pixel_format()
    }

    fn read_rect(&self, rect: Rect) -> Result<Vec<u8>> {
        self.framebuffer.read_rect(rect)
    }

    fn ever_written(&self) -> bool {
        self.framebuffer.ever_written()
    }
}

impl MutablePixelBuffer for Desktop {
    fn fill_rect(&mut self, rect: Rect, pixel: &[u8]) -> Result<()> {
        self.framebuffer.fill_rect(rect, pixel)
    }

    fn copy_rect(&mut self, dest: Rect, src_offset: Point) -> Result<()> {
        let src = Rect::new(
            dest.x + src_offset.x,
            dest.y + src_offset.y,
            dest.width,
            dest.height,
        );
        self.cursor.lock_area(&mut self.framebuffer, src)?;
        self.framebuffer.copy_rect(dest, src_offset)
    }

    fn image_rect(&mut self, dest: Rect, pixels: &[u8], stride: usize) -> Result<()> {
        self.framebuffer.image_rect(dest, pixels, stride)
    }
}
