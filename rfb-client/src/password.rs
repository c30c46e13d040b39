//! Password files and password sources for VNC authentication.
//!
//! A password file holds exactly eight bytes: the password, zero padded,
//! encrypted with the fixed VNC obfuscation key (see
//! [`rfb_protocol::auth::obfuscate_password`]).

use crate::config::AuthConfig;
use crate::errors::RfbClientError;
use rfb_protocol::auth::{obfuscate_password, reveal_password};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

pub use rfb_protocol::auth::MAX_PASSWORD_LEN;

/// Shortest password `vncpasswd` will store.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Read and decrypt a password file.
pub fn read_password_file(path: &Path) -> Result<String, RfbClientError> {
    let bytes = std::fs::read(path).map_err(|e| {
        RfbClientError::Password(format!(
            "Cannot read valid password from file \"{}\": {}",
            path.display(),
            e
        ))
    })?;
    let block: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            RfbClientError::Password(format!(
                "Cannot read valid password from file \"{}\": file is shorter than 8 bytes",
                path.display()
            ))
        })?;
    Ok(reveal_password(&block))
}

/// Encrypt `password` and store it at `path`, readable only by the owner.
///
/// Missing parent directories are created.
pub fn write_password_file(path: &Path, password: &str) -> Result<(), RfbClientError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(&obfuscate_password(password))?;

    // `mode` only applies on creation; tighten an existing file too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// `~/.vnc/passwd` for the current user.
pub fn default_password_path() -> Result<PathBuf, RfbClientError> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".vnc").join("passwd"))
        .ok_or_else(|| RfbClientError::Password("Cannot determine home directory".to_string()))
}

/// Where the password for a VNC challenge comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordSource {
    /// The empty password.
    Null,
    /// An obfuscated password file.
    File(PathBuf),
    /// A line typed on standard input.
    Prompt,
}

impl PasswordSource {
    /// Null password first, then the password file, then the prompt.
    pub fn from_config(auth: &AuthConfig) -> Self {
        if auth.null_password {
            Self::Null
        } else if let Some(path) = &auth.password_file {
            Self::File(path.clone())
        } else {
            Self::Prompt
        }
    }

    /// Produce the password, truncated to eight bytes.
    pub fn resolve(&self) -> Result<String, RfbClientError> {
        let password = match self {
            Self::Null => return Ok(String::new()),
            Self::File(path) => read_password_file(path)?,
            Self::Prompt => {
                let stdin = std::io::stdin();
                prompt_password("Password: ", &mut stdin.lock())?
            }
        };
        if password.is_empty() {
            tracing::warn!("Null password provided, proceeding with authentication");
        }
        Ok(truncate_password(password))
    }
}

/// Print `prompt` on stderr and read one line from `input`.
///
/// End of input means no password could be read at all.
pub fn prompt_password(prompt: &str, input: &mut impl BufRead) -> Result<String, RfbClientError> {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "{}", prompt);
    let _ = stderr.flush();

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(RfbClientError::Password("Reading password failed".to_string()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Cut a password to the bytes VNC authentication uses, on a char boundary.
pub fn truncate_password(mut password: String) -> String {
    if password.len() > MAX_PASSWORD_LEN {
        let mut end = MAX_PASSWORD_LEN;
        while !password.is_char_boundary(end) {
            end -= 1;
        }
        password.truncate(end);
    }
    password
}
