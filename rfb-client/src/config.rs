//! Configuration types for the snapshot client.
//!
//! A [`Config`] can be built in code, loaded from TOML, or produced from the
//! command line (see [`crate::args`]). Every section has defaults, so a TOML
//! file only needs the keys it changes.

use crate::capture::RectSpec;
use crate::encodings::parse_encoding_list;
use crate::errors::RfbClientError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Base TCP port for `host:N` display numbers.
pub const SERVER_PORT_OFFSET: u16 = 5900;

/// Base TCP port for reverse connections in listen mode.
pub const LISTEN_PORT_OFFSET: u16 = 5500;

/// Complete snapshot client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where to connect, or where to listen.
    pub connection: ConnectionConfig,
    /// Password sources.
    pub auth: AuthConfig,
    /// Encoding negotiation.
    pub encodings: EncodingConfig,
    /// What to capture and where to save it.
    pub capture: CaptureConfig,
    /// Console output.
    pub logging: LoggingConfig,
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server hostname or IP address. Empty means localhost.
    pub host: String,
    /// Server port (typically 5900 + display number).
    pub port: u16,
    /// Accept a reverse connection on this port instead of connecting out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    /// Ask the server to keep other clients connected.
    pub shared: bool,
    /// The connection goes through a tunnel; affects encoding choice.
    pub tunneled: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: SERVER_PORT_OFFSET,
            listen_port: None,
            shared: true,
            tunneled: false,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Answer a VNC challenge with the empty password.
    pub null_password: bool,
    /// Obfuscated password file, as written by `vncpasswd`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
}

/// Encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Explicit encoding names in preference order. `None` uses the
    /// built-in policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<String>>,
    /// Compression level hint, 0-9.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress_level: Option<u8>,
    /// JPEG quality hint for Tight, 0-9.
    pub quality_level: u8,
    /// Allow the server to send Tight rectangles as JPEG.
    pub jpeg: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            list: None,
            compress_level: Some(4),
            quality_level: 9,
            jpeg: true,
        }
    }
}

/// Whether the remote cursor should appear in the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    /// Nothing requested; whatever the server paints is kept.
    #[default]
    Unspecified,
    /// Composite the cursor shape into the image.
    Include,
    /// Keep the cursor out of the image.
    Exclude,
}

impl CursorMode {
    pub fn draws_cursor(self) -> bool {
        self == Self::Include
    }
}

/// What to do with an update that leaves the screen entirely black.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlankPolicy {
    /// Accept blank images.
    Allow,
    /// Discard them and ask again, warning the first time.
    #[default]
    Discard,
    /// Discard them and ask again without a warning.
    Ignore,
}

impl BlankPolicy {
    pub fn suppresses_blank(self) -> bool {
        self != Self::Allow
    }
}

/// Capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Output file; `-` writes the image to standard output.
    pub output: String,
    /// `WxH+X+Y` rectangle; `None` captures the whole screen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rect: Option<String>,
    /// Number of images to take.
    pub count: u32,
    /// Seconds between the starts of consecutive captures.
    pub interval_secs: u64,
    /// JPEG quality of the saved file, 0-100.
    pub save_quality: u8,
    pub cursor: CursorMode,
    pub blank: BlankPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output: String::new(),
            rect: None,
            count: 1,
            interval_secs: 60,
            save_quality: 100,
            cursor: CursorMode::default(),
            blank: BlankPolicy::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Only warnings and errors.
    pub quiet: bool,
    /// Debug output.
    pub debug: bool,
}

impl LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

impl Config {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, RfbClientError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RfbClientError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&text).map_err(|e| {
            RfbClientError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Validates the configuration.
    ///
    /// Everything that can be checked before touching the network is checked
    /// here: output name, numeric ranges, encoding names and the rectangle.
    pub fn validate(&self) -> Result<(), RfbClientError> {
        if self.capture.output.is_empty() {
            return Err(RfbClientError::Config(
                "Output file name cannot be empty".to_string(),
            ));
        }

        if self.connection.listen_port.is_none() && self.connection.port == 0 {
            return Err(RfbClientError::Config("Port cannot be 0".to_string()));
        }

        if let Some(level) = self.encodings.compress_level {
            if level > 9 {
                return Err(RfbClientError::Config(format!(
                    "Compression level must be 0-9, got {}",
                    level
                )));
            }
        }

        if self.encodings.quality_level > 9 {
            return Err(RfbClientError::Config(format!(
                "Transmission quality level must be 0-9, got {}",
                self.encodings.quality_level
            )));
        }

        if self.capture.save_quality > 100 {
            return Err(RfbClientError::Config(format!(
                "Image quality must be 0-100, got {}",
                self.capture.save_quality
            )));
        }

        if self.capture.count == 0 {
            return Err(RfbClientError::Config(
                "Capture count must be at least 1".to_string(),
            ));
        }

        if let Some(names) = &self.encodings.list {
            parse_encoding_list(names)?;
        }

        self.rect_spec()?;

        Ok(())
    }

    /// The parsed capture rectangle.
    pub fn rect_spec(&self) -> Result<RectSpec, RfbClientError> {
        match &self.capture.rect {
            Some(spec) => spec.parse(),
            None => Ok(RectSpec::default()),
        }
    }

    /// Time between the starts of consecutive captures.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.capture.interval_secs)
    }

    /// Host to connect to, with the empty host meaning localhost.
    #[must_use]
    pub fn effective_host(&self) -> &str {
        if self.connection.host.is_empty() {
            "localhost"
        } else {
            &self.connection.host
        }
    }
}

/// Builder for creating a `Config`.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Sets the server hostname or IP address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.connection.host = host.into();
        self
    }

    /// Sets the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.connection.port = port;
        self
    }

    /// Sets host and port from a `host:display` or `host::port` string.
    pub fn server(self, server: &str) -> Result<Self, RfbClientError> {
        let (host, port) = parse_server_address(server)?;
        Ok(self.host(host).port(port))
    }

    /// Listen for a reverse connection on `5500 + display`.
    pub fn listen(mut self, display: u16) -> Result<Self, RfbClientError> {
        let port = LISTEN_PORT_OFFSET.checked_add(display).ok_or_else(|| {
            RfbClientError::Config(format!("Listen display {} is out of range", display))
        })?;
        self.config.connection.listen_port = Some(port);
        Ok(self)
    }

    #[must_use]
    pub fn tunneled(mut self, tunneled: bool) -> Self {
        self.config.connection.tunneled = tunneled;
        self
    }

    #[must_use]
    pub fn null_password(mut self, on: bool) -> Self {
        self.config.auth.null_password = on;
        self
    }

    #[must_use]
    pub fn password_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.auth.password_file = Some(path.into());
        self
    }

    /// Explicit encoding names, e.g. `["tight", "copyrect"]`.
    #[must_use]
    pub fn encodings<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.encodings.list = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn compress_level(mut self, level: Option<u8>) -> Self {
        self.config.encodings.compress_level = level;
        self
    }

    #[must_use]
    pub fn quality_level(mut self, level: u8) -> Self {
        self.config.encodings.quality_level = level;
        self
    }

    #[must_use]
    pub fn jpeg(mut self, on: bool) -> Self {
        self.config.encodings.jpeg = on;
        self
    }

    #[must_use]
    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.config.capture.output = output.into();
        self
    }

    #[must_use]
    pub fn rect(mut self, spec: impl Into<String>) -> Self {
        self.config.capture.rect = Some(spec.into());
        self
    }

    #[must_use]
    pub fn count(mut self, count: u32) -> Self {
        self.config.capture.count = count;
        self
    }

    #[must_use]
    pub fn interval_secs(mut self, secs: u64) -> Self {
        self.config.capture.interval_secs = secs;
        self
    }

    #[must_use]
    pub fn save_quality(mut self, quality: u8) -> Self {
        self.config.capture.save_quality = quality;
        self
    }

    #[must_use]
    pub fn cursor(mut self, mode: CursorMode) -> Self {
        self.config.capture.cursor = mode;
        self
    }

    #[must_use]
    pub fn blank(mut self, policy: BlankPolicy) -> Self {
        self.config.capture.blank = policy;
        self
    }

    #[must_use]
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.config.logging.quiet = quiet;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.logging.debug = debug;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<Config, RfbClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl From<Config> for ConfigBuilder {
    fn from(config: Config) -> Self {
        Self { config }
    }
}

/// Parse a server address.
///
/// - `host:N` is display N, port 5900 + N
/// - `host::P` is port P
/// - `host` alone is port 5900
///
/// The host may be empty, meaning localhost.
pub fn parse_server_address(server: &str) -> Result<(String, u16), RfbClientError> {
    let Some((host, rest)) = server.split_once(':') else {
        return Ok((server.to_string(), SERVER_PORT_OFFSET));
    };

    let (digits, offset) = match rest.strip_prefix(':') {
        Some(port) => (port, 0),
        None => (rest, SERVER_PORT_OFFSET),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RfbClientError::Config(format!(
            "Invalid display or port number in '{}'",
            server
        )));
    }

    let port = digits
        .parse::<u16>()
        .ok()
        .and_then(|n| n.checked_add(offset))
        .ok_or_else(|| {
            RfbClientError::Config(format!("Display or port number out of range in '{}'", server))
        })?;

    Ok((host.to_string(), port))
}
