//! Optional one-line-per-message protocol trace.
//!
//! Enabled by `VNCSNAPSHOT_TRACE=1` (or `true`), logged at the
//! `protocol_trace` target so it can also be filtered through `RUST_LOG`.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};

pub const TRACE_ENV: &str = "VNCSNAPSHOT_TRACE";

static TRACE_ENABLED: Lazy<AtomicBool> = Lazy::new(|| {
    let on = std::env::var(TRACE_ENV)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE"))
        .unwrap_or(false);
    AtomicBool::new(on)
});

#[inline]
pub fn enabled() -> bool {
    TRACE_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn set_enabled(on: bool) {
    TRACE_ENABLED.store(on, Ordering::Relaxed)
}

#[inline]
pub fn out_msg(name: &str, fields: &str) {
    if enabled() {
        tracing::info!(target: "protocol_trace", "OUT {} {}", name, fields);
    }
}

#[inline]
pub fn in_msg(name: &str, fields: &str) {
    if enabled() {
        tracing::info!(target: "protocol_trace", "IN  {} {}", name, fields);
    }
}

/// Hex dump of the first `max` bytes, 16 per line.
pub fn hexdump(prefix: &str, data: &[u8], max: usize) {
    if !enabled() || data.is_empty() {
        return;
    }
    for line in hex_lines(&data[..max.min(data.len())]) {
        tracing::info!(target: "protocol_trace", "{}{}", prefix, line);
    }
}

fn hex_lines(data: &[u8]) -> Vec<String> {
    use std::fmt::Write as _;
    data.chunks(16)
        .map(|chunk| {
            let mut line = String::with_capacity(chunk.len() * 3);
            for b in chunk {
                let _ = write!(line, " {:02X}", b);
            }
            line
        })
        .collect()
}
