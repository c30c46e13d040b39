//! Headless VNC snapshot client.
//!
//! This crate connects to an RFB (VNC) server, or accepts a reverse
//! connection, decodes framebuffer updates with `rfb-encodings` and saves
//! a rectangle of the remote screen as JPEG, once or on a fixed cadence.
//!
//! # Features
//!
//! - **Async I/O**: built on tokio; one connection, one capture loop
//! - **Security types**: None and VNC password (DES challenge/response)
//! - **Standard encodings**: Raw, CopyRect, RRE, CoRRE, Hextile, ZlibHex,
//!   Zlib, Tight and ZRLE, plus the cursor and LastRect pseudo-encodings
//! - **Soft cursor**: optionally drawn into the capture
//! - **Blank suppression**: an all-black frame can be discarded and re-requested
//! - **Configuration**: TOML files, a builder, and (with `cli`) clap arguments
//!
//! # Quick Start
//!
//! ```no_run
//! use rfb_client::{Config, JpegSink};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::builder()
//!         .server("localhost:1")?
//!         .null_password(true)
//!         .output("desk.jpg")
//!         .build()?;
//!
//!     let report = rfb_client::run(&config, &mut JpegSink::new()).await?;
//!     println!("saved {:?}", report.files);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Every failure ends the run with an [`RfbClientError`]. There is no
//! reconnection: a snapshot either completes or reports why it did not.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod config;
pub mod connection;
pub mod encodings;
pub mod errors;
pub mod password;
pub mod protocol_trace;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod transport;

mod protocol;

#[cfg(feature = "cli")]
pub mod args;

pub use capture::{CaptureSchedule, FileNamer, RectSpec};
pub use config::{BlankPolicy, Config, ConfigBuilder, CursorMode};
pub use errors::RfbClientError;
pub use session::{MessageOutcome, Session};
pub use sink::{ImageSink, JpegSink, MemorySink};
pub use snapshot::{run, run_over, SnapshotReport};
pub use transport::Transport;
