//! Soft cursor overlay.
//!
//! The server can send the cursor as a shape plus position instead of
//! painting it into the frame buffer. [`SoftCursor`] keeps that shape,
//! snapshots the pixels underneath it and, when drawing is enabled,
//! composites it onto the raster so it shows up in the capture.
//!
//! While a rectangle is being decoded its area is *locked*: if the cursor
//! overlaps the locked region it is removed first (the saved pixels are put
//! back) and redrawn on unlock over the freshly decoded content.

use crate::buffer::PixelBuffer;
use crate::framebuffer::{FrameBuffer, INTERNAL_BPP};
use anyhow::{anyhow, Result};
use rfb_common::{Point, Rect};

/// A decoded cursor image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorShape {
    pub hot_x: i32,
    pub hot_y: i32,
    pub width: u32,
    pub height: u32,
    /// Packed RGBX pixels, `width * height` of them.
    pub pixels: Vec<u8>,
    /// One byte per pixel, non-zero where the cursor is opaque.
    pub mask: Vec<u8>,
}

impl CursorShape {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn validate(&self) -> Result<()> {
        let count = self.width as usize * self.height as usize;
        if self.pixels.len() != count * INTERNAL_BPP || self.mask.len() != count {
            return Err(anyhow!(
                "cursor shape {}x{} has {} pixel bytes and {} mask bytes",
                self.width,
                self.height,
                self.pixels.len(),
                self.mask.len()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SoftCursor {
    shape: Option<CursorShape>,
    /// Hotspot position in frame buffer coordinates.
    position: Point,
    /// Pixels under the cursor and where they came from.
    saved: Option<(Rect, Vec<u8>)>,
    hidden: bool,
    lock: Option<Rect>,
    draw_enabled: bool,
}

impl SoftCursor {
    /// `draw_enabled` controls whether the cursor is composited into the
    /// raster; the save/restore bookkeeping runs either way.
    pub fn new(draw_enabled: bool) -> Self {
        Self {
            draw_enabled,
            ..Default::default()
        }
    }

    pub fn has_shape(&self) -> bool {
        self.shape.is_some()
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn locked_region(&self) -> Option<Rect> {
        self.lock
    }

    /// Unclipped area covered by the cursor image.
    fn area(&self) -> Option<Rect> {
        self.shape.as_ref().map(|shape| {
            Rect::new(
                self.position.x - shape.hot_x,
                self.position.y - shape.hot_y,
                shape.width,
                shape.height,
            )
        })
    }

    fn in_locked_area(&self) -> bool {
        match (self.lock, self.area()) {
            (Some(lock), Some(area)) => lock.intersects(&area),
            _ => false,
        }
    }

    fn save_under(&mut self, fb: &FrameBuffer) -> Result<()> {
        self.saved = match self.area().and_then(|a| a.intersection(&fb.bounds())) {
            Some(clip) => Some((clip, fb.read_internal(clip)?)),
            None => None,
        };
        Ok(())
    }

    fn restore_under(&self, fb: &mut FrameBuffer) -> Result<()> {
        if let Some((rect, pixels)) = &self.saved {
            fb.write_internal(*rect, pixels)?;
        }
        Ok(())
    }

    /// Composite the masked-in pixels onto the raster.
    fn draw(&self, fb: &mut FrameBuffer) -> Result<()> {
        let (Some(shape), Some(area)) = (self.shape.as_ref(), self.area()) else {
            return Ok(());
        };
        let bounds = fb.bounds();
        for row in 0..shape.height as usize {
            for col in 0..shape.width as usize {
                let idx = row * shape.width as usize + col;
                if shape.mask[idx] == 0 {
                    continue;
                }
                let (x, y) = (area.x + col as i32, area.y + row as i32);
                if !bounds.contains_point(x, y) {
                    continue;
                }
                let pixel = &shape.pixels[idx * INTERNAL_BPP..(idx + 1) * INTERNAL_BPP];
                fb.write_internal(Rect::new(x, y, 1, 1), pixel)?;
            }
        }
        Ok(())
    }

    fn show(&mut self, fb: &mut FrameBuffer) -> Result<()> {
        self.save_under(fb)?;
        if self.draw_enabled {
            self.draw(fb)?;
        }
        self.hidden = false;
        Ok(())
    }

    /// Replace the cursor image.
    ///
    /// The previous cursor is removed from the raster. The area under the
    /// new cursor is snapshotted, but nothing is drawn until a position
    /// arrives. An empty shape just removes the cursor.
    pub fn set_shape(&mut self, fb: &mut FrameBuffer, shape: CursorShape) -> Result<()> {
        if self.shape.is_some() && !self.hidden {
            self.restore_under(fb)?;
        }
        self.shape = None;
        self.saved = None;

        if shape.is_empty() {
            return Ok(());
        }
        shape.validate()?;

        self.shape = Some(shape);
        self.save_under(fb)?;
        self.hidden = false;
        self.lock = None;
        Ok(())
    }

    /// Move the hotspot to `(x, y)`, which is assumed to be clamped already.
    pub fn move_to(&mut self, fb: &mut FrameBuffer, x: i32, y: i32) -> Result<()> {
        if self.shape.is_some() && !self.hidden {
            self.restore_under(fb)?;
            self.hidden = true;
        }

        self.position = Point::new(x, y);

        if self.shape.is_some() && !self.in_locked_area() {
            self.show(fb)?;
        }
        Ok(())
    }

    /// Add `rect` to the locked region, hiding the cursor if it overlaps.
    ///
    /// Does nothing before the first frame buffer write or without a shape.
    pub fn lock_area(&mut self, fb: &mut FrameBuffer, rect: Rect) -> Result<()> {
        if !fb.ever_written() || self.shape.is_none() {
            return Ok(());
        }

        self.lock = Some(match self.lock {
            Some(lock) => lock.union(&rect),
            None => rect,
        });

        if !self.hidden && self.in_locked_area() {
            self.restore_under(fb)?;
            self.hidden = true;
        }
        Ok(())
    }

    /// Clear the locked region, putting a hidden cursor back.
    pub fn unlock(&mut self, fb: &mut FrameBuffer) -> Result<()> {
        if self.shape.is_none() {
            return Ok(());
        }
        if self.hidden {
            self.show(fb)?;
        }
        self.lock = None;
        Ok(())
    }
}
