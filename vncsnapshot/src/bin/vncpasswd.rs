//! vncpasswd - store a VNC password in an obfuscated password file.

use anyhow::{Context, Result};
use clap::Parser;
use rfb_client::password::{
    default_password_path, prompt_password, truncate_password, write_password_file,
    MAX_PASSWORD_LEN, MIN_PASSWORD_LEN,
};
use std::path::PathBuf;

/// Create a password file for vncsnapshot --passwd.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Password file to write (default: ~/.vnc/passwd)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let path = match args.file {
        Some(path) => path,
        None => default_password_path()?,
    };

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    loop {
        let password = prompt_password("Password: ", &mut input)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            eprintln!("Password must be at least {} characters - try again", MIN_PASSWORD_LEN);
            continue;
        }
        if password.len() > MAX_PASSWORD_LEN {
            eprintln!(
                "Password too long - only the first {} characters will be used",
                MAX_PASSWORD_LEN
            );
        }
        let password = truncate_password(password);

        let verify = truncate_password(prompt_password("Verify:   ", &mut input)?);
        if verify != password {
            eprintln!("Passwords do not match. Please try again.");
            continue;
        }

        write_password_file(&path, &password)
            .with_context(|| format!("Cannot write password file {}", path.display()))?;
        return Ok(());
    }
}
