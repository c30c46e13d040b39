//! RFB (Remote Framebuffer) protocol layer for a capture client.
//!
//! # Modules
//!
//! - [`io`] - buffered big-endian streams ([`RfbInStream`], [`RfbOutStream`])
//! - [`messages`] - wire structures and tag constants
//! - [`handshake`] - version, security and init exchanges
//! - [`auth`] - VNC DES challenge/response and password obfuscation
//! - [`connection`] - ordered handshake over a stream pair

pub mod auth;
pub mod connection;
pub mod handshake;
pub mod io;
pub mod messages;

pub use connection::{ConnectionState, RfbConnection};
pub use handshake::{NegotiatedVersion, SecurityResult, SecurityType};
pub use io::{RfbInStream, RfbOutStream};
