//! Encoding tag to decoder lookup.
//!
//! [`Decoder`] uses `async fn` and so is not object safe; [`DecoderEntry`]
//! is the closed set of decoders this crate provides, dispatched by `match`.

use crate::{
    CoRREDecoder, CopyRectDecoder, Decoder, DecoderState, HextileDecoder, MutablePixelBuffer,
    PixelFormat, RREDecoder, RawDecoder, Rectangle, RfbInStream, TightDecoder, ZRLEDecoder,
    ZlibDecoder, ZlibHexDecoder,
};
use anyhow::Result;
use std::collections::HashMap;
use tokio::io::AsyncRead;

/// One of the concrete decoders.
pub enum DecoderEntry {
    Raw(RawDecoder),
    CopyRect(CopyRectDecoder),
    RRE(RREDecoder),
    CoRRE(CoRREDecoder),
    Hextile(HextileDecoder),
    Zlib(ZlibDecoder),
    Tight(TightDecoder),
    ZlibHex(ZlibHexDecoder),
    ZRLE(ZRLEDecoder),
}

impl DecoderEntry {
    pub fn encoding_type(&self) -> i32 {
        match self {
            Self::Raw(d) => d.encoding_type(),
            Self::CopyRect(d) => d.encoding_type(),
            Self::RRE(d) => d.encoding_type(),
            Self::CoRRE(d) => d.encoding_type(),
            Self::Hextile(d) => d.encoding_type(),
            Self::Zlib(d) => d.encoding_type(),
            Self::Tight(d) => d.encoding_type(),
            Self::ZlibHex(d) => d.encoding_type(),
            Self::ZRLE(d) => d.encoding_type(),
        }
    }

    pub async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        buffer: &mut dyn MutablePixelBuffer,
        state: &mut DecoderState,
    ) -> Result<()> {
        match self {
            Self::Raw(d) => d.decode(stream, rect, pixel_format, buffer, state).await,
            Self::CopyRect(d) => d.decode(stream, rect, pixel_format, buffer, state).await,
            Self::RRE(d) => d.decode(stream, rect, pixel_format, buffer, state).await,
            Self::CoRRE(d) => d.decode(stream, rect, pixel_format, buffer, state).await,
            Self::Hextile(d) => d.decode(stream, rect, pixel_format, buffer, state).await,
            Self::Zlib(d) => d.decode(stream, rect, pixel_format, buffer, state).await,
            Self::Tight(d) => d.decode(stream, rect, pixel_format, buffer, state).await,
            Self::ZlibHex(d) => d.decode(stream, rect, pixel_format, buffer, state).await,
            Self::ZRLE(d) => d.decode(stream, rect, pixel_format, buffer, state).await,
        }
    }
}

/// Registry of decoders keyed by encoding tag.
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: HashMap<i32, DecoderEntry>,
}

impl DecoderRegistry {
    /// Create a registry with every rectangle encoding registered.
    pub fn with_standard() -> Self {
        let mut reg = Self::default();
        reg.register(DecoderEntry::Raw(RawDecoder));
        reg.register(DecoderEntry::CopyRect(CopyRectDecoder));
        reg.register(DecoderEntry::RRE(RREDecoder));
        reg.register(DecoderEntry::CoRRE(CoRREDecoder));
        reg.register(DecoderEntry::Hextile(HextileDecoder));
        reg.register(DecoderEntry::Zlib(ZlibDecoder));
        reg.register(DecoderEntry::Tight(TightDecoder));
        reg.register(DecoderEntry::ZlibHex(ZlibHexDecoder));
        reg.register(DecoderEntry::ZRLE(ZRLEDecoder));
        reg
    }

    /// Register a decoder entry, replacing any previous one for its tag.
    pub fn register(&mut self, decoder: DecoderEntry) {
        self.decoders.insert(decoder.encoding_type(), decoder);
    }

    /// Get a decoder by encoding tag.
    pub fn get(&self, encoding: i32) -> Option<&DecoderEntry> {
        self.decoders.get(&encoding)
    }

    pub fn supports(&self, encoding: i32) -> bool {
        self.decoders.contains_key(&encoding)
    }
}
