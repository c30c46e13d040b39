//! Command-line argument parsing for the snapshot tool.
//!
//! This module is only available when the `cli` feature is enabled.
//! [`Args`] mirrors the classic `vncsnapshot` option set and converts into a
//! [`Config`] with [`Config::from_args`].
//!
//! # Examples
//!
//! ```no_run
//! use rfb_client::args::Args;
//! use rfb_client::Config;
//!
//! let args = Args::parse();
//! let config = Config::from_args(args)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::config::{BlankPolicy, Config, ConfigBuilder, CursorMode};
use crate::errors::RfbClientError;
use clap::Parser;
use std::path::PathBuf;

/// Capture a VNC desktop to a JPEG file.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = None,
    override_usage = "vncsnapshot [OPTIONS] <HOST:DISPLAY|HOST::PORT> <FILE>\n       vncsnapshot [OPTIONS] --listen <DISPLAY> <FILE>"
)]
pub struct Args {
    /// Server address followed by the output file, or just the output file
    /// with --listen.
    ///
    /// Server forms:
    ///   - host:1 (display 1 = port 5901)
    ///   - host::5999 (port 5999)
    ///   - :0 (localhost, display 0)
    #[arg(value_name = "TARGET", num_args = 1..=2, required = true)]
    pub targets: Vec<String>,

    /// Listen for a reverse connection on port 5500 + DISPLAY
    #[arg(long, value_name = "DISPLAY")]
    pub listen: Option<u16>,

    /// Accept an all-black screen as a valid image
    #[arg(long, conflicts_with = "ignoreblank")]
    pub allowblank: bool,

    /// Silently discard all-black screens and wait for real content
    #[arg(long)]
    pub ignoreblank: bool,

    /// Compression level hint sent to the server (0-9)
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=9))]
    pub compresslevel: Option<u8>,

    /// Draw the remote cursor into the image
    #[arg(long, conflicts_with = "nocursor")]
    pub cursor: bool,

    /// Keep the remote cursor out of the image
    #[arg(long)]
    pub nocursor: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Encodings to use, in order of preference (space or comma separated)
    ///
    /// Available: copyrect, tight, hextile, zlib, zlibhex, zrle, corre, rre, raw
    #[arg(long, value_name = "LIST")]
    pub encodings: Option<String>,

    /// Allow JPEG compression in Tight rectangles
    #[arg(long, conflicts_with = "nojpeg")]
    pub jpeg: bool,

    /// Disallow JPEG compression in Tight rectangles
    #[arg(long)]
    pub nojpeg: bool,

    /// Password file, as written by vncpasswd
    #[arg(long, value_name = "FILE")]
    pub passwd: Option<PathBuf>,

    /// Answer authentication with an empty password
    #[arg(long, conflicts_with = "passwd")]
    pub nullpasswd: bool,

    /// JPEG quality of the saved image (0-100)
    #[arg(long, value_name = "QUALITY", value_parser = clap::value_parser!(u8).range(0..=100))]
    pub quality: Option<u8>,

    /// Only print warnings and errors
    #[arg(long, overrides_with = "verbose")]
    pub quiet: bool,

    /// Print informational messages (the default)
    #[arg(long, overrides_with = "quiet")]
    pub verbose: bool,

    /// Capture only this rectangle: WxH+X+Y, with -X/-Y measured from the
    /// right and bottom edges
    #[arg(long, value_name = "WxH+X+Y", allow_hyphen_values = true)]
    pub rect: Option<String>,

    /// JPEG quality level hint sent to the server (0-9)
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=9))]
    pub vnc_quality: Option<u8>,

    /// Seconds between snapshots
    #[arg(long, value_name = "SECONDS")]
    pub fps: Option<u64>,

    /// Number of snapshots to take
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub count: Option<u32>,

    /// Configuration file path (TOML format)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Parse command-line arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse arguments from an iterator.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid.
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Split the positionals into server address and output file.
    fn server_and_output(&self) -> Result<(Option<&str>, &str), RfbClientError> {
        match (self.listen.is_some(), self.targets.as_slice()) {
            (true, [output]) => Ok((None, output)),
            (false, [server, output]) => Ok((Some(server), output)),
            (true, _) => Err(RfbClientError::Config(
                "With --listen only the output file is given".to_string(),
            )),
            (false, _) => Err(RfbClientError::Config(
                "Both a server address and an output file are required".to_string(),
            )),
        }
    }
}

impl Config {
    /// Create a configuration from command-line arguments.
    ///
    /// If a config file is specified in the arguments, it is loaded first
    /// and then overridden by the options actually given on the command line.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file cannot be read or parsed
    /// - The server address is invalid
    /// - The configuration validation fails
    pub fn from_args(args: Args) -> Result<Self, RfbClientError> {
        let base = match &args.config {
            Some(path) => Config::from_toml_file(path)?,
            None => Config::default(),
        };
        let mut builder = ConfigBuilder::from(base);

        let (server, output) = args.server_and_output()?;
        builder = builder.output(output);
        if let Some(server) = server {
            builder = builder.server(server)?;
        }
        if let Some(display) = args.listen {
            builder = builder.listen(display)?;
        }

        if args.allowblank {
            builder = builder.blank(BlankPolicy::Allow);
        } else if args.ignoreblank {
            builder = builder.blank(BlankPolicy::Ignore);
        }

        if args.cursor {
            builder = builder.cursor(CursorMode::Include);
        } else if args.nocursor {
            builder = builder.cursor(CursorMode::Exclude);
        }

        if let Some(level) = args.compresslevel {
            builder = builder.compress_level(Some(level));
        }
        if let Some(level) = args.vnc_quality {
            builder = builder.quality_level(level);
        }
        if args.jpeg {
            builder = builder.jpeg(true);
        } else if args.nojpeg {
            builder = builder.jpeg(false);
        }
        if let Some(list) = &args.encodings {
            builder = builder.encodings(split_encoding_names(list));
        }

        if let Some(path) = args.passwd {
            builder = builder.password_file(path);
        }
        if args.nullpasswd {
            builder = builder.null_password(true);
        }

        if let Some(quality) = args.quality {
            builder = builder.save_quality(quality);
        }
        if let Some(rect) = args.rect {
            builder = builder.rect(rect);
        }
        if let Some(secs) = args.fps {
            builder = builder.interval_secs(secs);
        }
        if let Some(count) = args.count {
            builder = builder.count(count);
        }

        if args.quiet {
            builder = builder.quiet(true);
        } else if args.verbose {
            builder = builder.quiet(false);
        }
        if args.debug {
            builder = builder.debug(true);
        }

        builder.build()
    }
}

fn split_encoding_names(list: &str) -> Vec<String> {
    list.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
