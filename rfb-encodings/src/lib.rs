//! Decoders for RFB (VNC) rectangle encodings.
//!
//! A decoder reads one framebuffer update rectangle from the network stream,
//! converts its pixels to the session's pixel format and draws them through a
//! [`MutablePixelBuffer`].
//!
//! # Key Concepts
//!
//! - **Async decoding**: decoders read from a tokio [`AsyncRead`]-backed [`RfbInStream`]
//! - **Explicit state**: zlib inflaters live in a [`DecoderState`] owned by the
//!   session and lent to each call, so decoders themselves are stateless
//! - **Fail-fast policy**: short reads and inconsistent data are errors; there
//!   are no fallbacks
//! - **Registry**: [`DecoderRegistry`] maps an encoding tag to a [`DecoderEntry`]
//!
//! # Example
//!
//! ```no_run
//! use anyhow::Result;
//! use rfb_encodings::{Decoder, DecoderState, ENCODING_RAW, RfbInStream};
//! use rfb_encodings::{PixelFormat, Rectangle, MutablePixelBuffer};
//! use tokio::io::AsyncRead;
//!
//! struct NoopDecoder;
//!
//! impl Decoder for NoopDecoder {
//!     fn encoding_type(&self) -> i32 {
//!         ENCODING_RAW
//!     }
//!
//!     async fn decode<R: AsyncRead + Unpin>(
//!         &self,
//!         _stream: &mut RfbInStream<R>,
//!         _rect: &Rectangle,
//!         _pixel_format: &PixelFormat,
//!         _buffer: &mut dyn MutablePixelBuffer,
//!         _state: &mut DecoderState,
//!     ) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```

use anyhow::Result;
use rfb_common::Rect;
use tokio::io::AsyncRead;

pub use rfb_pixelbuffer::{MutablePixelBuffer, PixelFormat};
pub use rfb_protocol::io::RfbInStream;
pub use rfb_protocol::messages::types::{
    Rectangle, ENCODING_COPYRECT, ENCODING_CORRE, ENCODING_HEXTILE, ENCODING_RAW, ENCODING_RRE,
    ENCODING_TIGHT, ENCODING_ZLIB, ENCODING_ZLIBHEX, ENCODING_ZRLE, PSEUDO_ENCODING_RICH_CURSOR,
    PSEUDO_ENCODING_X_CURSOR,
};

pub mod copyrect;
pub mod cursor;
pub mod hextile;
pub mod raw;
pub mod registry;
pub mod rre;
pub mod state;
pub mod tight;
pub mod zlib;
pub mod zlibhex;
pub mod zrle;

pub use copyrect::CopyRectDecoder;
pub use cursor::{read_cursor_shape, CursorKind};
pub use hextile::HextileDecoder;
pub use raw::RawDecoder;
pub use registry::{DecoderEntry, DecoderRegistry};
pub use rre::{CoRREDecoder, RREDecoder};
pub use state::DecoderState;
pub use tight::TightDecoder;
pub use zlib::ZlibDecoder;
pub use zlibhex::ZlibHexDecoder;
pub use zrle::ZRLEDecoder;

/// Core trait for all RFB rectangle decoders.
///
/// Implementors must read exactly the bytes their encoding defines for
/// `rect`, and write every decoded pixel through `buffer` in `pixel_format`.
/// Compression contexts that outlive a rectangle belong in `state`.
#[allow(async_fn_in_trait)]
pub trait Decoder {
    /// The encoding tag this decoder handles.
    fn encoding_type(&self) -> i32;

    /// Decode a single rectangle from the input stream into the pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends early, the encoded data is
    /// inconsistent, or the buffer rejects a write.
    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        buffer: &mut dyn MutablePixelBuffer,
        state: &mut DecoderState,
    ) -> Result<()>;
}

/// Frame buffer rectangle covered by a wire rectangle header.
pub(crate) fn dest_rect(rect: &Rectangle) -> Rect {
    Rect::new(
        rect.x as i32,
        rect.y as i32,
        rect.width as u32,
        rect.height as u32,
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use rfb_common::Rect;
    use rfb_pixelbuffer::{FrameBuffer, PixelBuffer, PixelFormat};
    use rfb_protocol::messages::types::Rectangle;
    use std::io::Cursor;

    use crate::RfbInStream;

    pub fn stream(bytes: Vec<u8>) -> RfbInStream<Cursor<Vec<u8>>> {
        RfbInStream::new(Cursor::new(bytes))
    }

    pub fn rect(x: u16, y: u16, width: u16, height: u16, encoding: i32) -> Rectangle {
        Rectangle {
            x,
            y,
            width,
            height,
            encoding,
        }
    }

    /// 16 bpp big-endian 5-6-5.
    pub fn rgb565_be() -> PixelFormat {
        PixelFormat {
            bits_per_pixel: 16,
            depth: 16,
            big_endian: true,
            true_color: true,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        }
    }

    /// 8 bpp 2-3-3 with blue in the top bits.
    pub fn bgr233() -> PixelFormat {
        PixelFormat {
            bits_per_pixel: 8,
            depth: 8,
            big_endian: false,
            true_color: true,
            red_max: 7,
            green_max: 7,
            blue_max: 3,
            red_shift: 0,
            green_shift: 3,
            blue_shift: 6,
        }
    }

    /// The pixel at (x, y) as R, G, B.
    pub fn rgb_at(fb: &FrameBuffer, x: i32, y: i32) -> [u8; 3] {
        let px = fb.read_internal(Rect::new(x, y, 1, 1)).unwrap();
        [px[0], px[1], px[2]]
    }

    /// The pixel at (x, y) in the buffer's input format.
    pub fn pixel_at(fb: &FrameBuffer, x: i32, y: i32) -> Vec<u8> {
        fb.read_rect(Rect::new(x, y, 1, 1)).unwrap()
    }

    pub fn zlib(payload: &[u8]) -> Vec<u8> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }
}
