//! RFB pixel format descriptions and conversions.
//!
//! A [`PixelFormat`] describes how a true-colour pixel is packed: its storage
//! width, byte order, and a `(max, shift)` pair per channel. Colour-mapped
//! formats are not supported; the client always asks for true colour.
//!
//! # Channel extraction
//!
//! 1. Assemble the pixel value from `bytes_per_pixel()` bytes in the format's
//!    byte order.
//! 2. `component = (value >> shift) & max`
//! 3. Scale to 8 bits: `component * 255 / max` (rounded).
//!
//! # Example
//!
//! ```
//! use rfb_pixelbuffer::PixelFormat;
//!
//! let pf = PixelFormat::rgbx();
//! assert_eq!(pf.bytes_per_pixel(), 4);
//!
//! // Internal layout is R, G, B, unused.
//! assert_eq!(pf.to_rgb888(&[0x11, 0x22, 0x33, 0x00]), [0x11, 0x22, 0x33]);
//! assert_eq!(pf.from_rgb888([0xAA, 0xBB, 0xCC]), vec![0xAA, 0xBB, 0xCC, 0x00]);
//! ```

use anyhow::{bail, Result};

/// Describes an RFB true-colour pixel format.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct PixelFormat {
    /// Storage width in bits: 8, 16 or 32.
    pub bits_per_pixel: u8,

    /// Significant bits (e.g. 24 for 8-bit channels in 32-bit storage).
    pub depth: u8,

    /// Byte order for multi-byte pixels.
    pub big_endian: bool,

    pub true_color: bool,

    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,

    /// Bit position of each channel's least significant bit.
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Storage width in bytes, rounded up.
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bits_per_pixel.div_ceil(8)
    }

    /// The frame buffer's internal format: 32 bpp, depth 24, little-endian,
    /// red at bit 0, green at 8, blue at 16. In memory a pixel is the four
    /// bytes R, G, B, 0.
    pub fn rgbx() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_color: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
        }
    }

    /// Check that this format can be decoded.
    ///
    /// Requires true colour, 8/16/32 bpp, every channel max of the form
    /// 2^n - 1, and channels that fit in the pixel without overlapping.
    pub fn validate(&self) -> Result<()> {
        if !self.true_color {
            bail!("colour-mapped pixel formats are not supported");
        }
        if !matches!(self.bits_per_pixel, 8 | 16 | 32) {
            bail!("unsupported bits per pixel: {}", self.bits_per_pixel);
        }

        let mut used = 0u64;
        for (name, max, shift) in self.channels() {
            if max == 0 || (max as u32 + 1).count_ones() != 1 {
                bail!("{} max {} is not a power of two minus one", name, max);
            }
            let mask = (max as u64) << shift;
            if mask >> self.bits_per_pixel != 0 {
                bail!(
                    "{} channel (max {}, shift {}) does not fit in {} bits",
                    name,
                    max,
                    shift,
                    self.bits_per_pixel
                );
            }
            if used & mask != 0 {
                bail!("{} channel overlaps another channel", name);
            }
            used |= mask;
        }
        Ok(())
    }

    fn channels(&self) -> [(&'static str, u16, u8); 3] {
        [
            ("red", self.red_max, self.red_shift),
            ("green", self.green_max, self.green_shift),
            ("blue", self.blue_max, self.blue_shift),
        ]
    }

    /// Assemble a pixel value from its bytes. Only the first
    /// `bytes_per_pixel()` bytes are used.
    pub fn read_pixel(&self, bytes: &[u8]) -> u32 {
        let bpp = self.bytes_per_pixel() as usize;
        if self.big_endian {
            bytes
                .iter()
                .take(bpp)
                .fold(0u32, |acc, &b| (acc << 8) | b as u32)
        } else {
            bytes
                .iter()
                .take(bpp)
                .enumerate()
                .fold(0u32, |acc, (i, &b)| acc | (b as u32) << (i * 8))
        }
    }

    /// Write a pixel value into `out`, which must hold `bytes_per_pixel()`
    /// bytes; extra bytes are left untouched.
    pub fn write_pixel(&self, value: u32, out: &mut [u8]) {
        let bpp = self.bytes_per_pixel() as usize;
        for (i, slot) in out.iter_mut().take(bpp).enumerate() {
            let shift = if self.big_endian {
                (bpp - 1 - i) * 8
            } else {
                i * 8
            };
            *slot = (value >> shift) as u8;
        }
    }

    /// Split a pixel value into its raw channel components.
    pub fn components(&self, value: u32) -> [u16; 3] {
        [
            ((value >> self.red_shift) & self.red_max as u32) as u16,
            ((value >> self.green_shift) & self.green_max as u32) as u16,
            ((value >> self.blue_shift) & self.blue_max as u32) as u16,
        ]
    }

    /// Pack raw channel components into a pixel value. Components are masked
    /// to their channel max.
    pub fn pack(&self, components: [u16; 3]) -> u32 {
        ((components[0] & self.red_max) as u32) << self.red_shift
            | ((components[1] & self.green_max) as u32) << self.green_shift
            | ((components[2] & self.blue_max) as u32) << self.blue_shift
    }

    pub fn value_to_rgb(&self, value: u32) -> [u8; 3] {
        let [r, g, b] = self.components(value);
        [
            scale_to_8(r, self.red_max),
            scale_to_8(g, self.green_max),
            scale_to_8(b, self.blue_max),
        ]
    }

    pub fn rgb_to_value(&self, rgb: [u8; 3]) -> u32 {
        self.pack([
            scale_from_8(rgb[0], self.red_max),
            scale_from_8(rgb[1], self.green_max),
            scale_from_8(rgb[2], self.blue_max),
        ])
    }

    /// Convert one pixel in this format to `[R, G, B]`.
    pub fn to_rgb888(&self, pixel: &[u8]) -> [u8; 3] {
        self.value_to_rgb(self.read_pixel(pixel))
    }

    /// Convert `[R, G, B]` to this format's byte representation.
    pub fn from_rgb888(&self, rgb: [u8; 3]) -> Vec<u8> {
        let mut out = vec![0u8; self.bytes_per_pixel() as usize];
        self.write_pixel(self.rgb_to_value(rgb), &mut out);
        out
    }

    pub fn is_rgbx(&self) -> bool {
        *self == Self::rgbx()
    }

    /// True when both formats produce identical pixel bytes. Byte order is
    /// irrelevant for 8 bpp formats.
    pub fn is_equivalent(&self, other: &PixelFormat) -> bool {
        self.bits_per_pixel == other.bits_per_pixel
            && self.depth == other.depth
            && (self.big_endian == other.big_endian || self.bits_per_pixel == 8)
            && self.true_color == other.true_color
            && self.channels() == other.channels()
    }

    /// Multi-line human-readable description, for startup logging.
    pub fn describe(&self) -> String {
        let mut text = format!("  {} bits per pixel.\n", self.bits_per_pixel);
        if self.bits_per_pixel != 8 {
            text.push_str(if self.big_endian {
                "  Most significant byte first in each pixel.\n"
            } else {
                "  Least significant byte first in each pixel.\n"
            });
        }
        if self.true_color {
            text.push_str(&format!(
                "  True colour: max red {} green {} blue {}, shift red {} green {} blue {}",
                self.red_max,
                self.green_max,
                self.blue_max,
                self.red_shift,
                self.green_shift,
                self.blue_shift
            ));
        } else {
            text.push_str("  Colour map (not true colour).");
        }
        text
    }
}

fn scale_to_8(component: u16, max: u16) -> u8 {
    if max == 0 {
        return 0;
    }
    ((component as u32 * 255 + max as u32 / 2) / max as u32) as u8
}

fn scale_from_8(channel: u8, max: u16) -> u16 {
    ((channel as u32 * max as u32 + 127) / 255) as u16
}

impl From<rfb_protocol::messages::types::PixelFormat> for PixelFormat {
    fn from(pf: rfb_protocol::messages::types::PixelFormat) -> Self {
        Self {
            bits_per_pixel: pf.bits_per_pixel,
            depth: pf.depth,
            big_endian: pf.big_endian != 0,
            true_color: pf.true_color != 0,
            red_max: pf.red_max,
            green_max: pf.green_max,
            blue_max: pf.blue_max,
            red_shift: pf.red_shift,
            green_shift: pf.green_shift,
            blue_shift: pf.blue_shift,
        }
    }
}

impl From<PixelFormat> for rfb_protocol::messages::types::PixelFormat {
    fn from(pf: PixelFormat) -> Self {
        Self {
            bits_per_pixel: pf.bits_per_pixel,
            depth: pf.depth,
            big_endian: pf.big_endian as u8,
            true_color: pf.true_color as u8,
            red_max: pf.red_max,
            green_max: pf.green_max,
            blue_max: pf.blue_max,
            red_shift: pf.red_shift,
            green_shift: pf.green_shift,
            blue_shift: pf.blue_shift,
        }
    }
}
