//! What to capture and when: rectangle specs, output names and cadence.

use crate::errors::RfbClientError;
use rfb_common::Rect;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// A `WxH±X±Y` capture rectangle as given by the user, before the screen
/// size is known.
///
/// A `-` before X (or Y) measures from the right (bottom) edge to the far
/// side of the rectangle. A negative number after either sign counts from
/// the far edge of the screen to the rectangle's near side. A width or
/// height of 0 extends to the screen edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RectSpec {
    pub width: i64,
    pub height: i64,
    pub x: i64,
    pub y: i64,
    pub x_from_right: bool,
    pub y_from_bottom: bool,
}

impl FromStr for RectSpec {
    type Err = RfbClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || RfbClientError::Config(format!("Invalid rectangle <{}>, expected WxH+X+Y", s));

        let (width, rest) = take_number(s).ok_or_else(invalid)?;
        let rest = rest.strip_prefix('x').ok_or_else(invalid)?;
        let (height, rest) = take_number(rest).ok_or_else(invalid)?;
        let (x_from_right, rest) = take_sign(rest).ok_or_else(invalid)?;
        let (x, rest) = take_number(rest).ok_or_else(invalid)?;
        let (y_from_bottom, rest) = take_sign(rest).ok_or_else(invalid)?;
        let (y, rest) = take_number(rest).ok_or_else(invalid)?;
        if !rest.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            width,
            height,
            x,
            y,
            x_from_right,
            y_from_bottom,
        })
    }
}

/// Leading optionally signed decimal number and the remainder.
fn take_number(s: &str) -> Option<(i64, &str)> {
    let sign_len = usize::from(s.starts_with(['+', '-']));
    let digits = s[sign_len..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let end = sign_len + digits;
    Some((s[..end].parse().ok()?, &s[end..]))
}

/// `+` or `-` separator; true for `-`.
fn take_sign(s: &str) -> Option<(bool, &str)> {
    if let Some(rest) = s.strip_prefix('-') {
        Some((true, rest))
    } else {
        s.strip_prefix('+').map(|rest| (false, rest))
    }
}

impl RectSpec {
    /// Place the rectangle on a `fb_width` x `fb_height` screen.
    ///
    /// Anything that does not fit is pulled back onto the screen with a
    /// warning, so the result is always a non-empty rectangle inside it
    /// (for a non-empty screen).
    pub fn resolve(&self, fb_width: u16, fb_height: u16) -> Rect {
        let (x, width) = resolve_axis(
            self.x,
            self.width,
            self.x_from_right,
            fb_width as i64,
            "x",
            "width",
        );
        let (y, height) = resolve_axis(
            self.y,
            self.height,
            self.y_from_bottom,
            fb_height as i64,
            "y",
            "height",
        );
        Rect::new(x as i32, y as i32, width as u32, height as u32)
    }
}

fn resolve_axis(
    offset: i64,
    size: i64,
    from_far_edge: bool,
    screen: i64,
    offset_name: &str,
    size_name: &str,
) -> (i64, i64) {
    let mut offset = if offset < 0 {
        screen.saturating_add(offset)
    } else if from_far_edge {
        screen.saturating_sub(offset).saturating_sub(size)
    } else {
        offset
    };
    if offset < 0 || offset >= screen {
        tracing::warn!(
            "Requested rectangle {} <{}> is outside screen {} <{}>, using 0",
            offset_name,
            offset,
            size_name,
            screen
        );
        offset = 0;
    }

    let room = screen - offset;
    let mut size = if size == 0 { room } else { size };
    if size <= 0 || size > room {
        tracing::warn!(
            "Requested rectangle {} <{}> plus offset <{}> is larger than screen {} <{}>, using {}",
            size_name,
            size,
            offset,
            size_name,
            screen,
            room
        );
        size = room;
    }
    (offset, size)
}

impl fmt::Display for RectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}{}{}{}{}",
            self.width,
            self.height,
            if self.x_from_right { '-' } else { '+' },
            self.x,
            if self.y_from_bottom { '-' } else { '+' },
            self.y
        )
    }
}

/// Output file names for a series of captures.
///
/// A single capture writes to the given name unchanged. For a series, a
/// five-digit sequence number goes before a `.jpg`/`.jpeg` suffix (matched
/// without regard to case, and kept as written), or else `NNNNN.jpg` is
/// appended to the whole name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNamer {
    stem: String,
    suffix: String,
    numbered: bool,
}

impl FileNamer {
    pub fn new(output: &str, count: u32) -> Self {
        if count <= 1 {
            return Self {
                stem: output.to_string(),
                suffix: String::new(),
                numbered: false,
            };
        }

        let jpeg_suffix = output.rfind('.').filter(|&dot| {
            let ext = &output[dot + 1..];
            ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
        });
        let (stem, suffix) = match jpeg_suffix {
            Some(dot) => (&output[..dot], &output[dot..]),
            None => (output, ".jpg"),
        };
        Self {
            stem: stem.to_string(),
            suffix: suffix.to_string(),
            numbered: true,
        }
    }

    /// File name for capture number `index` (counting from 0).
    pub fn name(&self, index: u32) -> String {
        if self.numbered {
            format!("{}{:05}{}", self.stem, index, self.suffix)
        } else {
            self.stem.clone()
        }
    }
}

/// Paces repeated captures `interval` apart, start to start.
#[derive(Debug, Clone)]
pub struct CaptureSchedule {
    interval: Duration,
    last: Instant,
}

impl CaptureSchedule {
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last: start,
        }
    }

    /// Time left until the next capture is due.
    pub fn delay(&self, now: Instant) -> Duration {
        (self.last + self.interval).saturating_duration_since(now)
    }

    /// Record that a capture started at `at`.
    pub fn mark(&mut self, at: Instant) {
        self.last = at;
    }

    /// Sleep until the next capture is due, then mark it started.
    pub async fn wait(&mut self) {
        let delay = self.delay(Instant::now());
        if !delay.is_zero() {
            tracing::debug!("Next capture in {:.1}s", delay.as_secs_f64());
            tokio::time::sleep(delay).await;
        }
        self.mark(Instant::now());
    }
}
