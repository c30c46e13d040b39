//! Zlib inflaters that persist across rectangles.
//!
//! Compressed encodings share one deflate stream per context for the whole
//! session: Tight has four slots selected per rectangle, Zlib and ZRLE have
//! one each, and ZlibHex keeps separate streams for raw and encoded tiles.
//! An inflater is created lazily on first use and dropped only when the
//! server asks for a reset.

use anyhow::{bail, Context, Result};
use flate2::{Decompress, FlushDecompress, Status};

/// Number of independent Tight zlib streams.
pub const TIGHT_STREAMS: usize = 4;

/// Output chunk size used while inflating.
const INFLATE_CHUNK: usize = 64 * 1024;

/// Every persistent decompression context a session needs.
#[derive(Debug, Default)]
pub struct DecoderState {
    pub(crate) tight: [Option<Decompress>; TIGHT_STREAMS],
    pub(crate) zlib: Option<Decompress>,
    pub(crate) zrle: Option<Decompress>,
    pub(crate) zlibhex_raw: Option<Decompress>,
    pub(crate) zlibhex_encoded: Option<Decompress>,
}

impl DecoderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether Tight slot `slot` holds a live inflater.
    pub fn tight_stream_active(&self, slot: usize) -> bool {
        self.tight.get(slot).is_some_and(Option::is_some)
    }

    /// Drop the Tight inflaters whose bits are set in `mask` (bits 0-3).
    pub fn reset_tight_streams(&mut self, mask: u8) {
        for (slot, stream) in self.tight.iter_mut().enumerate() {
            if mask & (1 << slot) != 0 && stream.take().is_some() {
                tracing::debug!(target: "rfb_encodings::framing", "Tight: reset zlib stream {}", slot);
            }
        }
    }

    /// Drop every inflater, as for a fresh session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Largest compressed payload accepted for `inflated` bytes of output:
/// zlib's stored-block worst case plus room for the header and sync flush.
pub(crate) fn max_compressed_len(inflated: usize) -> usize {
    inflated + (inflated >> 12) + (inflated >> 14) + (inflated >> 25) + 64
}

/// Inflate all of `input` through the stream held in `slot`, creating it on
/// first use. Fails as soon as the output would pass `limit` bytes.
///
/// Servers flush each rectangle with a sync flush, so the stream never ends;
/// a stream end before the input is used up is an error.
pub(crate) fn inflate(
    slot: &mut Option<Decompress>,
    input: &[u8],
    limit: usize,
) -> Result<Vec<u8>> {
    let inflater = slot.get_or_insert_with(|| Decompress::new(true));

    let mut output = Vec::with_capacity(input.len().saturating_mul(2).min(limit));
    let mut in_pos = 0;
    let mut chunk = vec![0u8; INFLATE_CHUNK];

    loop {
        let before_in = inflater.total_in();
        let before_out = inflater.total_out();

        let status = inflater
            .decompress(&input[in_pos..], &mut chunk, FlushDecompress::Sync)
            .with_context(|| {
                format!(
                    "zlib inflate failed at input offset {} of {}",
                    in_pos,
                    input.len()
                )
            })?;

        let consumed = (inflater.total_in() - before_in) as usize;
        let produced = (inflater.total_out() - before_out) as usize;
        in_pos += consumed;
        if output.len() + produced > limit {
            bail!("zlib data inflates past the {} byte limit", limit);
        }
        output.extend_from_slice(&chunk[..produced]);

        match status {
            Status::StreamEnd if in_pos < input.len() => {
                bail!(
                    "zlib stream ended with {} of {} input bytes unused",
                    input.len() - in_pos,
                    input.len()
                );
            }
            Status::StreamEnd => break,
            // A full output chunk may hide more pending output.
            _ if produced == chunk.len() => continue,
            _ if in_pos >= input.len() => break,
            _ if consumed == 0 && produced == 0 => {
                bail!("zlib inflate stalled at input offset {}", in_pos);
            }
            _ => continue,
        }
    }

    Ok(output)
}

/// Inflate `input` and require exactly `expected` bytes of output.
pub(crate) fn inflate_exact(
    slot: &mut Option<Decompress>,
    input: &[u8],
    expected: usize,
) -> Result<Vec<u8>> {
    let output = inflate(slot, input, expected)?;
    if output.len() != expected {
        bail!(
            "zlib data inflated to {} bytes, expected {}",
            output.len(),
            expected
        );
    }
    Ok(output)
}
