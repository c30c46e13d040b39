//! The capture session: negotiates formats and encodings, then reads server
//! messages into a [`Desktop`] until a usable frame has arrived.

use crate::config::{BlankPolicy, CaptureConfig, CursorMode};
use crate::connection::Connection;
use crate::errors::RfbClientError;
use crate::protocol;
use crate::protocol_trace;
use rfb_common::Rect;
use rfb_encodings::cursor::{read_cursor_shape, CursorKind};
use rfb_encodings::{DecoderRegistry, DecoderState};
use rfb_pixelbuffer::{Desktop, FrameBuffer, PixelFormat};
use rfb_protocol::io::{RfbInStream, RfbOutStream};
use rfb_protocol::messages as msg;
use rfb_protocol::messages::types::{
    encoding_name, MSG_BELL, MSG_FRAMEBUFFER_UPDATE, MSG_SERVER_CUT_TEXT,
    MSG_SET_COLOUR_MAP_ENTRIES, PSEUDO_ENCODING_LAST_RECT, PSEUDO_ENCODING_POINTER_POS,
};
use tokio::io::{AsyncRead, AsyncWrite};

const BLANK_SCREEN_WARNING: &str = "discarding received blank screen \
     (use --allowblank to accept, or --ignoreblank to suppress this message)";

/// What one server message meant for the capture in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// A framebuffer update finished and the image is ready to save.
    FrameComplete,
    /// Keep reading.
    Continue,
}

/// A negotiated connection plus the decoded screen.
pub struct Session<R, W> {
    input: RfbInStream<R>,
    output: RfbOutStream<W>,
    server_init: msg::ServerInit,
    desktop: Desktop,
    decoders: DecoderRegistry,
    decoder_state: DecoderState,
    pixel_format: PixelFormat,
    blank: BlankPolicy,
    quiet: bool,
    blank_warned: bool,
    pointer_pos_seen: bool,
    cut_text: Option<String>,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap an established connection. The desktop starts all black at the
    /// server's size.
    pub fn new(conn: Connection<R, W>, capture: &CaptureConfig, quiet: bool) -> Self {
        let pixel_format = PixelFormat::rgbx();
        let desktop = Desktop::new(
            conn.server_init.framebuffer_width as u32,
            conn.server_init.framebuffer_height as u32,
            pixel_format,
            capture.cursor == CursorMode::Include,
        );
        Self {
            input: conn.input,
            output: conn.output,
            server_init: conn.server_init,
            desktop,
            decoders: DecoderRegistry::with_standard(),
            decoder_state: DecoderState::new(),
            pixel_format,
            blank: capture.blank,
            quiet,
            blank_warned: false,
            pointer_pos_seen: false,
            cut_text: None,
        }
    }

    pub fn server_init(&self) -> &msg::ServerInit {
        &self.server_init
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        self.desktop.framebuffer()
    }

    /// True once the server has sent a PointerPos rectangle.
    pub fn supports_pointer_pos(&self) -> bool {
        self.pointer_pos_seen
    }

    /// Most recent clipboard text from the server.
    pub fn cut_text(&self) -> Option<&str> {
        self.cut_text.as_deref()
    }

    /// Ask for pixels in the session format and announce `encodings`.
    pub async fn negotiate(&mut self, encodings: Vec<i32>) -> Result<(), RfbClientError> {
        let server_format = PixelFormat::from(self.server_init.pixel_format.clone());
        tracing::info!("Server pixel format:\n{}", server_format.describe());
        tracing::debug!("Using pixel format:\n{}", self.pixel_format.describe());

        protocol::write_set_pixel_format(&mut self.output, self.pixel_format.into())
            .await?;
        protocol::write_set_encodings(&mut self.output, encodings).await
    }

    /// Send a FramebufferUpdateRequest for `rect`.
    pub async fn request_update(
        &mut self,
        rect: Rect,
        incremental: bool,
    ) -> Result<(), RfbClientError> {
        protocol::write_update_request(
            &mut self.output,
            msg::FramebufferUpdateRequest {
                incremental,
                x: rect.x as u16,
                y: rect.y as u16,
                width: rect.width as u16,
                height: rect.height as u16,
            },
        )
        .await
    }

    /// Request `rect` afresh and read messages until a frame is complete.
    pub async fn capture(&mut self, rect: Rect) -> Result<(), RfbClientError> {
        self.request_update(rect, false).await?;
        while self.handle_message(rect).await? == MessageOutcome::Continue {}
        Ok(())
    }

    /// Read and act on one server message. `rect` is the area being
    /// captured, re-requested when a blank frame is discarded.
    pub async fn handle_message(
        &mut self,
        rect: Rect,
    ) -> Result<MessageOutcome, RfbClientError> {
        match protocol::read_message_type(&mut self.input).await? {
            MSG_FRAMEBUFFER_UPDATE => self.handle_update(rect).await,
            MSG_SET_COLOUR_MAP_ENTRIES => {
                let entries = msg::SetColorMapEntries::read_from(&mut self.input).await?;
                tracing::warn!(
                    "Ignoring SetColourMapEntries ({} colours from {})",
                    entries.colors.len(),
                    entries.first_color
                );
                Ok(MessageOutcome::Continue)
            }
            MSG_BELL => {
                protocol_trace::in_msg("Bell", "");
                Ok(MessageOutcome::Continue)
            }
            MSG_SERVER_CUT_TEXT => {
                let cut = msg::ServerCutText::read_from(&mut self.input).await?;
                protocol_trace::in_msg("ServerCutText", &format!("{} bytes", cut.text.len()));
                self.cut_text = Some(cut.text);
                Ok(MessageOutcome::Continue)
            }
            other => Err(RfbClientError::Protocol(format!(
                "Unknown message type {} from VNC server",
                other
            ))),
        }
    }

    async fn handle_update(&mut self, rect: Rect) -> Result<MessageOutcome, RfbClientError> {
        let header = protocol::read_update_header(&mut self.input).await?;
        let (fb_width, fb_height) = (
            self.server_init.framebuffer_width,
            self.server_init.framebuffer_height,
        );

        for _ in 0..header.num_rectangles {
            let r = protocol::read_rect_header(&mut self.input).await?;

            if r.encoding == PSEUDO_ENCODING_LAST_RECT {
                break;
            }
            if let Some(kind) = CursorKind::from_encoding(r.encoding) {
                let shape = read_cursor_shape(
                    &mut self.input,
                    kind,
                    r.x,
                    r.y,
                    r.width,
                    r.height,
                    &self.pixel_format,
                )
                .await?;
                self.desktop.set_cursor_shape(shape)?;
                continue;
            }
            if r.encoding == PSEUDO_ENCODING_POINTER_POS {
                self.desktop.move_cursor(r.x, r.y)?;
                self.pointer_pos_seen = true;
                continue;
            }

            if !r.fits_within(fb_width, fb_height) {
                return Err(RfbClientError::Protocol(format!(
                    "Rect too large: {}x{} at ({}, {})",
                    r.width, r.height, r.x, r.y
                )));
            }
            if r.is_empty() {
                tracing::debug!(
                    "Zero size rect ({}) - ignoring",
                    encoding_name(r.encoding)
                );
                continue;
            }

            let decoder = self
                .decoders
                .get(r.encoding)
                .ok_or(RfbClientError::UnsupportedEncoding(r.encoding))?;
            let area = Rect::new(r.x as i32, r.y as i32, r.width as u32, r.height as u32);
            self.desktop.lock_area(area)?;
            decoder
                .decode(
                    &mut self.input,
                    &r,
                    &self.pixel_format,
                    &mut self.desktop,
                    &mut self.decoder_state,
                )
                .await?;
            self.desktop.unlock()?;
        }

        if self.framebuffer().is_blank() && self.blank.suppresses_blank() {
            if !self.blank_warned && !self.quiet && self.blank == BlankPolicy::Discard {
                tracing::warn!("{}", BLANK_SCREEN_WARNING);
                self.blank_warned = true;
            }
            self.request_update(rect, true).await?;
            return Ok(MessageOutcome::Continue);
        }
        Ok(MessageOutcome::FrameComplete)
    }
}
