//! Core RFB wire types and tag values.
//!
//! - [`PixelFormat`] - the 16-byte pixel format structure
//! - [`Rectangle`] - a FramebufferUpdate rectangle header
//! - encoding, pseudo-encoding, security and message-type constants

use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// Pixel format as it appears on the wire.
///
/// Boolean fields are kept as raw bytes; [`read_from`](Self::read_from)
/// rejects anything other than 0 or 1 so a corrupt header cannot slip
/// through as "true".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: u8,
    pub true_color: u8,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bits_per_pixel.div_ceil(8)
    }

    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let bits_per_pixel = stream.read_u8().await?;
        let depth = stream.read_u8().await?;
        let big_endian = stream.read_u8().await?;
        let true_color = stream.read_u8().await?;
        let red_max = stream.read_u16().await?;
        let green_max = stream.read_u16().await?;
        let blue_max = stream.read_u16().await?;
        let red_shift = stream.read_u8().await?;
        let green_shift = stream.read_u8().await?;
        let blue_shift = stream.read_u8().await?;
        stream.skip(3).await?;

        if big_endian > 1 || true_color > 1 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "pixel format flags must be 0 or 1 (big_endian={}, true_color={})",
                    big_endian, true_color
                ),
            ));
        }

        Ok(Self {
            bits_per_pixel,
            depth,
            big_endian,
            true_color,
            red_max,
            green_max,
            blue_max,
            red_shift,
            green_shift,
            blue_shift,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(self.bits_per_pixel);
        stream.write_u8(self.depth);
        stream.write_u8(self.big_endian);
        stream.write_u8(self.true_color);
        stream.write_u16(self.red_max);
        stream.write_u16(self.green_max);
        stream.write_u16(self.blue_max);
        stream.write_u8(self.red_shift);
        stream.write_u8(self.green_shift);
        stream.write_u8(self.blue_shift);
        stream.write_bytes(&[0, 0, 0]);
    }
}

/// A FramebufferUpdate rectangle header.
///
/// The encoding is carried as `i32` because pseudo-encodings are negative
/// numbers in the protocol documents (e.g. RichCursor is -239, 0xFFFFFF11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl Rectangle {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
            width: stream.read_u16().await?,
            height: stream.read_u16().await?,
            encoding: stream.read_i32().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u16(self.x);
        stream.write_u16(self.y);
        stream.write_u16(self.width);
        stream.write_u16(self.height);
        stream.write_i32(self.encoding);
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the rectangle lies inside a `fb_width` x `fb_height` frame.
    /// Computed in u32 so `x + width` cannot wrap.
    pub fn fits_within(&self, fb_width: u16, fb_height: u16) -> bool {
        self.x as u32 + self.width as u32 <= fb_width as u32
            && self.y as u32 + self.height as u32 <= fb_height as u32
    }
}

// Encodings

pub const ENCODING_RAW: i32 = 0;
pub const ENCODING_COPYRECT: i32 = 1;
pub const ENCODING_RRE: i32 = 2;
pub const ENCODING_CORRE: i32 = 4;
pub const ENCODING_HEXTILE: i32 = 5;
pub const ENCODING_ZLIB: i32 = 6;
pub const ENCODING_TIGHT: i32 = 7;
pub const ENCODING_ZLIBHEX: i32 = 8;
pub const ENCODING_ZRLE: i32 = 16;

// Pseudo-encodings

/// CompressLevel0 (0xFFFFFF00); levels 1..=9 follow consecutively.
pub const PSEUDO_ENCODING_COMPRESS_LEVEL_0: i32 = -256;
pub const PSEUDO_ENCODING_X_CURSOR: i32 = -240;
pub const PSEUDO_ENCODING_RICH_CURSOR: i32 = -239;
pub const PSEUDO_ENCODING_POINTER_POS: i32 = -232;
pub const PSEUDO_ENCODING_LAST_RECT: i32 = -224;
pub const PSEUDO_ENCODING_DESKTOP_SIZE: i32 = -223;
/// QualityLevel0 (0xFFFFFFE0); levels 1..=9 follow consecutively.
pub const PSEUDO_ENCODING_QUALITY_LEVEL_0: i32 = -32;

/// Pseudo-encoding for a compression level hint, `level` in 0..=9.
pub const fn compress_level(level: u8) -> i32 {
    PSEUDO_ENCODING_COMPRESS_LEVEL_0 + level as i32
}

/// Pseudo-encoding for a JPEG quality hint, `level` in 0..=9.
pub const fn quality_level(level: u8) -> i32 {
    PSEUDO_ENCODING_QUALITY_LEVEL_0 + level as i32
}

/// Human-readable name for an encoding tag, for logs.
pub fn encoding_name(encoding: i32) -> &'static str {
    match encoding {
        ENCODING_RAW => "Raw",
        ENCODING_COPYRECT => "CopyRect",
        ENCODING_RRE => "RRE",
        ENCODING_CORRE => "CoRRE",
        ENCODING_HEXTILE => "Hextile",
        ENCODING_ZLIB => "Zlib",
        ENCODING_TIGHT => "Tight",
        ENCODING_ZLIBHEX => "ZlibHex",
        ENCODING_ZRLE => "ZRLE",
        PSEUDO_ENCODING_X_CURSOR => "XCursor",
        PSEUDO_ENCODING_RICH_CURSOR => "RichCursor",
        PSEUDO_ENCODING_POINTER_POS => "PointerPos",
        PSEUDO_ENCODING_LAST_RECT => "LastRect",
        PSEUDO_ENCODING_DESKTOP_SIZE => "DesktopSize",
        e if (PSEUDO_ENCODING_COMPRESS_LEVEL_0..=PSEUDO_ENCODING_COMPRESS_LEVEL_0 + 9)
            .contains(&e) =>
        {
            "CompressLevel"
        }
        e if (PSEUDO_ENCODING_QUALITY_LEVEL_0..=PSEUDO_ENCODING_QUALITY_LEVEL_0 + 9)
            .contains(&e) =>
        {
            "QualityLevel"
        }
        _ => "Unknown",
    }
}

// Security types

pub const SECURITY_TYPE_INVALID: u32 = 0;
pub const SECURITY_TYPE_NONE: u32 = 1;
pub const SECURITY_TYPE_VNC_AUTH: u32 = 2;

// VNC authentication results

pub const AUTH_RESULT_OK: u32 = 0;
pub const AUTH_RESULT_FAILED: u32 = 1;
pub const AUTH_RESULT_TOO_MANY: u32 = 2;

// Server -> client message types

pub const MSG_FRAMEBUFFER_UPDATE: u8 = 0;
pub const MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;
pub const MSG_BELL: u8 = 2;
pub const MSG_SERVER_CUT_TEXT: u8 = 3;

// Client -> server message types

pub const MSG_SET_PIXEL_FORMAT: u8 = 0;
pub const MSG_SET_ENCODINGS: u8 = 2;
pub const MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
