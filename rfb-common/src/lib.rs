//! Geometry shared by the snapshot client crates.
//!
//! - [`Point`] - a signed 2D position (cursor positions can sit off-screen)
//! - [`Rect`] - a positioned region with unsigned size
//!
//! The tile iterator ([`Rect::tiles`]) is the single place where hextile and
//! ZRLE partition a rectangle, so edge clipping behaves identically for both.

/// A 2D point with integer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A rectangle defined by its top-left corner and dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge (x + width).
    pub const fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    /// Exclusive bottom edge (y + height).
    pub const fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const fn contains_point(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// True when `other` lies entirely inside `self`.
    pub const fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// True when the two rectangles share at least one pixel.
    pub const fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.y < other.bottom()
            && other.x < self.right()
            && other.y < self.bottom()
    }

    /// The overlapping part of two rectangles, or `None` when disjoint.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Rect::new(x, y, (right - x) as u32, (bottom - y) as u32))
    }

    /// Smallest rectangle covering both inputs.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, (right - x) as u32, (bottom - y) as u32)
    }

    /// Partition into `tile_w` x `tile_h` tiles in row-major order.
    ///
    /// Tiles on the right and bottom edges are clipped to the remaining
    /// width/height rather than padded.
    pub fn tiles(&self, tile_w: u32, tile_h: u32) -> Tiles {
        Tiles {
            area: *self,
            tile_w: tile_w.max(1),
            tile_h: tile_h.max(1),
            dx: 0,
            dy: 0,
        }
    }
}

/// Iterator returned by [`Rect::tiles`].
#[derive(Debug, Clone)]
pub struct Tiles {
    area: Rect,
    tile_w: u32,
    tile_h: u32,
    dx: u32,
    dy: u32,
}

impl Iterator for Tiles {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        if self.area.is_empty() || self.dy >= self.area.height {
            return None;
        }
        let w = self.tile_w.min(self.area.width - self.dx);
        let h = self.tile_h.min(self.area.height - self.dy);
        let tile = Rect::new(
            self.area.x + self.dx as i32,
            self.area.y + self.dy as i32,
            w,
            h,
        );
        self.dx += w;
        if self.dx >= self.area.width {
            self.dx = 0;
            self.dy += h;
        }
        Some(tile)
    }
}
