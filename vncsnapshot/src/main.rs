//! vncsnapshot - capture a VNC desktop to a JPEG file.

use anyhow::{Context, Result};
use rfb_client::args::Args;
use rfb_client::config::LoggingConfig;
use rfb_client::{Config, JpegSink};

fn init_logging(logging: &LoggingConfig) {
    // Log lines go to stderr; stdout may be carrying the JPEG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| logging.default_filter().into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_args(args).context("Invalid arguments")?;
    init_logging(&config.logging);

    tracing::debug!("Configuration: {:?}", config);

    let report = rfb_client::run(&config, &mut JpegSink::new())
        .await
        .context("Snapshot failed")?;
    tracing::debug!(
        "Saved {} image(s) from \"{}\"",
        report.files.len(),
        report.desktop_name
    );
    Ok(())
}
