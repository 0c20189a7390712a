//! CLI command definitions and dispatch.

mod list;
mod login;
mod logout;
mod pin;
mod resolve;
mod version;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use relimg_core::{LogFormat, LogLevel, RelimgConfig};

/// relimg: pin Operator bundle manifest images by digest.
#[derive(Parser)]
#[command(name = "relimg", version, about)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Pin every image reference in a manifest by digest
    Pin(pin::PinArgs),
    /// List image references found in a manifest
    List(list::ListArgs),
    /// Resolve one image reference to its digest form
    Resolve(resolve::ResolveArgs),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Load the configuration file, or defaults when none is given.
pub fn load_config(path: Option<&Path>) -> relimg_core::Result<RelimgConfig> {
    match path {
        Some(path) => RelimgConfig::load(path),
        None => Ok(RelimgConfig::default()),
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Pin(args) => pin::execute(args, load_config(cli.config.as_deref())?).await,
        Command::List(args) => list::execute(args, load_config(cli.config.as_deref())?).await,
        Command::Resolve(args) => {
            resolve::execute(args, load_config(cli.config.as_deref())?).await
        }
        Command::Login(args) => login::execute(args).await,
        Command::Logout(args) => logout::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
