//! Server-to-client messages.
//!
//! The message-type byte is read by the caller (the dispatch loop), so every
//! `read_from` here starts at the first byte after it. `write_to` emits the
//! full message including the type byte; it exists for test servers.

use super::types::{
    PixelFormat, Rectangle, MSG_BELL, MSG_FRAMEBUFFER_UPDATE, MSG_SERVER_CUT_TEXT,
    MSG_SET_COLOUR_MAP_ENTRIES,
};
use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// ServerInit: framebuffer size, default pixel format and desktop name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

impl ServerInit {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let framebuffer_width = stream.read_u16().await?;
        let framebuffer_height = stream.read_u16().await?;
        let pixel_format = PixelFormat::read_from(stream).await?;
        let name = stream.read_string().await?;

        Ok(Self {
            framebuffer_width,
            framebuffer_height,
            pixel_format,
            name,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u16(self.framebuffer_width);
        stream.write_u16(self.framebuffer_height);
        self.pixel_format.write_to(stream);
        stream.write_u32(self.name.len() as u32);
        stream.write_bytes(self.name.as_bytes());
    }
}

/// FramebufferUpdate header. Rectangles follow and are read one at a time
/// by the dispatch loop, because each one's body must be decoded before the
/// next header can be located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateHeader {
    pub num_rectangles: u16,
}

impl FramebufferUpdateHeader {
    /// Count value some servers send to mean "read until LastRect".
    pub const UNTIL_LAST_RECT: u16 = 0xFFFF;

    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(1).await?;
        Ok(Self {
            num_rectangles: stream.read_u16().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(MSG_FRAMEBUFFER_UPDATE);
        stream.write_u8(0);
        stream.write_u16(self.num_rectangles);
    }

    /// Convenience for test servers: header plus one rectangle header.
    pub fn write_single<W: AsyncWrite + Unpin>(rect: &Rectangle, stream: &mut RfbOutStream<W>) {
        Self { num_rectangles: 1 }.write_to(stream);
        rect.write_to(stream);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMapEntry {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

/// SetColourMapEntries. Only relevant to colour-mapped formats, which this
/// client never requests, so callers read it to stay in sync and drop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetColorMapEntries {
    pub first_color: u16,
    pub colors: Vec<ColorMapEntry>,
}

impl SetColorMapEntries {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(1).await?;
        let first_color = stream.read_u16().await?;
        let num_colors = stream.read_u16().await? as usize;

        let mut colors = Vec::with_capacity(num_colors);
        for _ in 0..num_colors {
            colors.push(ColorMapEntry {
                red: stream.read_u16().await?,
                green: stream.read_u16().await?,
                blue: stream.read_u16().await?,
            });
        }

        Ok(Self {
            first_color,
            colors,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(MSG_SET_COLOUR_MAP_ENTRIES);
        stream.write_u8(0);
        stream.write_u16(self.first_color);
        stream.write_u16(self.colors.len() as u16);
        for color in &self.colors {
            stream.write_u16(color.red);
            stream.write_u16(color.green);
            stream.write_u16(color.blue);
        }
    }
}

/// Bell has no body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bell;

impl Bell {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(MSG_BELL);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCutText {
    pub text: String,
}

impl ServerCutText {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(3).await?;
        Ok(Self {
            text: stream.read_string().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(MSG_SERVER_CUT_TEXT);
        stream.write_bytes(&[0, 0, 0]);
        stream.write_u32(self.text.len() as u32);
        stream.write_bytes(self.text.as_bytes());
    }
}
