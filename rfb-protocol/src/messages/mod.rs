//! RFB message definitions.
//!
//! - [`types`] - pixel format, rectangle header and tag constants
//! - [`server`] - server-to-client messages
//! - [`client`] - client-to-server messages

pub mod client;
pub mod server;
pub mod types;

pub use types::{
    PixelFormat, Rectangle, ENCODING_COPYRECT, ENCODING_CORRE, ENCODING_HEXTILE, ENCODING_RAW,
    ENCODING_RRE, ENCODING_TIGHT, ENCODING_ZLIB, ENCODING_ZLIBHEX, ENCODING_ZRLE,
};

pub use server::{
    Bell, ColorMapEntry, FramebufferUpdateHeader, ServerCutText, ServerInit, SetColorMapEntries,
};

pub use client::{ClientInit, FramebufferUpdateRequest, SetEncodings, SetPixelFormat};
