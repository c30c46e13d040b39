//! One snapshot run: connect, negotiate, then capture and save `count`
//! images of the configured rectangle.

use crate::capture::{CaptureSchedule, FileNamer};
use crate::config::{Config, CursorMode};
use crate::connection;
use crate::encodings::{build_encoding_list, LinkInfo};
use crate::errors::RfbClientError;
use crate::password::PasswordSource;
use crate::session::Session;
use crate::sink::{ImageSink, STDOUT_NAME};
use crate::transport::Transport;
use rfb_common::Rect;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Names handed to the sink, in capture order.
    pub files: Vec<String>,
    /// Server screen size.
    pub screen: (u16, u16),
    /// Captured area.
    pub rect: Rect,
    pub desktop_name: String,
}

/// Connect (or wait for a reverse connection) and run the captures.
pub async fn run(
    config: &Config,
    sink: &mut dyn ImageSink,
) -> Result<SnapshotReport, RfbClientError> {
    config.validate()?;

    let transport = match config.connection.listen_port {
        Some(port) => Transport::listen(port).await?,
        None => {
            let host = config.effective_host();
            tracing::debug!("Connecting to {}:{}", host, config.connection.port);
            Transport::connect_tcp(host, config.connection.port).await?
        }
    };
    let link = LinkInfo {
        same_machine: transport.is_same_machine(),
        tunneled: config.connection.tunneled,
    };
    let (reader, writer) = transport.split();
    run_over(reader, writer, link, config, sink).await
}

/// Run the captures over an already connected byte stream.
pub async fn run_over<R, W>(
    reader: R,
    writer: W,
    link: LinkInfo,
    config: &Config,
    sink: &mut dyn ImageSink,
) -> Result<SnapshotReport, RfbClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let password = PasswordSource::from_config(&config.auth);
    let conn = connection::establish(reader, writer, config.connection.shared, &password).await?;
    let screen = conn.size();

    let encodings = build_encoding_list(&config.encodings, link)?;
    let mut session = Session::new(conn, &config.capture, config.logging.quiet);
    session.negotiate(encodings).await?;

    let rect = config.rect_spec()?.resolve(screen.0, screen.1);
    tracing::debug!(
        "Capturing {}x{}+{}+{} of {}x{} screen",
        rect.width,
        rect.height,
        rect.x,
        rect.y,
        screen.0,
        screen.1
    );

    let capture = &config.capture;
    let namer = FileNamer::new(&capture.output, capture.count);
    let mut schedule = CaptureSchedule::new(config.interval(), Instant::now());
    let mut files = Vec::with_capacity(capture.count as usize);

    // Every capture, the first included, asks for the rectangle afresh with
    // one non-incremental request. No extra incremental full-screen request
    // follows the sleep: a non-incremental update already carries every
    // pixel of the rectangle.
    for index in 0..capture.count {
        if index > 0 {
            schedule.wait().await;
        }
        session.capture(rect).await?;

        let rgb = session
            .framebuffer()
            .crop_rgb(rect)
            .map_err(|e| RfbClientError::Image(format!("{:#}", e)))?;
        let name = namer.name(index);
        sink.write_rgb(&name, &rgb, rect.width, rect.height, capture.save_quality)?;

        tracing::info!(
            "Image saved from {} {}x{} screen to {} using {}x{}+{}+{} rectangle",
            host_label(config),
            screen.0,
            screen.1,
            if name == STDOUT_NAME { "- (stdout)" } else { name.as_str() },
            rect.width,
            rect.height,
            rect.x,
            rect.y
        );
        files.push(name);
    }

    if !config.logging.quiet && !session.supports_pointer_pos() {
        warn_cursor_unsupported(capture.cursor);
    }

    Ok(SnapshotReport {
        files,
        screen,
        rect,
        desktop_name: session.server_init().name.clone(),
    })
}

fn warn_cursor_unsupported(mode: CursorMode) {
    match mode {
        CursorMode::Include => tracing::warn!(
            "Warning: --cursor not supported by server, cursor may not be included in image."
        ),
        CursorMode::Exclude => tracing::warn!(
            "Warning: --nocursor not supported by server, cursor may be included in image."
        ),
        CursorMode::Unspecified => {}
    }
}

fn host_label(config: &Config) -> &str {
    if config.connection.host.is_empty() {
        "(local host)"
    } else {
        &config.connection.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_label() {
        let mut config = Config::default();
        config.connection.host = String::new();
        assert_eq!(host_label(&config), "(local host)");
        config.connection.host = "box".to_string();
        assert_eq!(host_label(&config), "box");
    }
}
