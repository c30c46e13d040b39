//! Pixel formats, the capture raster and the soft cursor overlay.
//!
//! - [`PixelFormat`] - true-colour pixel layouts and RGB conversion
//! - [`PixelBuffer`] / [`MutablePixelBuffer`] - the drawing surface decoders see
//! - [`FrameBuffer`] - RGBX raster with written/blank tracking
//! - [`SoftCursor`] - cursor save/restore/composite with area locking
//! - [`Desktop`] - frame buffer and cursor together

pub mod buffer;
pub mod cursor;
pub mod desktop;
pub mod format;
pub mod framebuffer;

pub use buffer::{MutablePixelBuffer, PixelBuffer};
pub use cursor::{CursorShape, SoftCursor};
pub use desktop::Desktop;
pub use format::PixelFormat;
pub use framebuffer::FrameBuffer;
